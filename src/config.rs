//! Session configuration
//!
//! Configuration for an exam session, loaded from environment variables.

use std::sync::OnceLock;
use tracing::warn;

/// Exam session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-test-case execution deadline in milliseconds (default: 5000ms = 5s)
    pub case_deadline_ms: u64,
    /// Number of violations that terminates the session (default: 3)
    pub violation_threshold: u32,
    /// Total session duration in seconds (default: 1500s = 25min)
    pub session_duration_secs: u64,
    /// Interval of the fullscreen presence backstop poll in milliseconds
    pub fullscreen_poll_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            case_deadline_ms: 5_000,
            violation_threshold: 3,
            session_duration_secs: 1_500,
            fullscreen_poll_ms: 1_500,
        }
    }
}

/// Global session configuration
static SESSION_CONFIG: OnceLock<SessionConfig> = OnceLock::new();

/// Initialize session configuration from environment variables
pub fn init_config_from_env() -> anyhow::Result<()> {
    let defaults = SessionConfig::default();
    let config = SessionConfig {
        case_deadline_ms: env_u64("EXAM_CASE_DEADLINE_MS", defaults.case_deadline_ms),
        violation_threshold: env_u64("EXAM_VIOLATION_THRESHOLD", defaults.violation_threshold as u64)
            as u32,
        session_duration_secs: env_u64("EXAM_SESSION_DURATION_SECS", defaults.session_duration_secs),
        fullscreen_poll_ms: env_u64("EXAM_FULLSCREEN_POLL_MS", defaults.fullscreen_poll_ms),
    };

    SESSION_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("Session configuration already initialized"))?;

    Ok(())
}

/// Get session configuration
pub fn get_config() -> &'static SessionConfig {
    SESSION_CONFIG.get().unwrap_or_else(|| {
        static DEFAULT: OnceLock<SessionConfig> = OnceLock::new();

        warn!("Session configuration not initialized, using default");
        DEFAULT.get_or_init(SessionConfig::default)
    })
}

fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Invalid value for {}: {:?}, using default {}", name, value, default);
                default
            }
        },
        Err(_) => default,
    }
}
