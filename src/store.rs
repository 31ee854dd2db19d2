//! Synchronized session store client
//!
//! All externally visible session state flows through here: inbound commands
//! (BLPOP), incremental violation counts, run reports, the final aggregate
//! report and session events. Writes are stored with an expiry and published
//! for real-time subscribers. Callers treat write failures as non-fatal:
//! locally computed state is never rolled back because a remote write failed.

use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::orchestrator::RunReport;
use crate::session::{FinalReport, SessionCommand};

/// Store key and channel constants
pub mod keys {
    /// Final report channel (for pub/sub)
    pub const RESULT_CHANNEL: &str = "exam:results";

    /// Run report channel (for pub/sub)
    pub const RUN_REPORT_CHANNEL: &str = "exam:run_reports";

    pub fn commands_key(session_id: &str) -> String {
        format!("exam:session:{}:commands", session_id)
    }

    pub fn status_key(session_id: &str) -> String {
        format!("exam:session:{}:status", session_id)
    }

    pub fn violations_key(session_id: &str) -> String {
        format!("exam:session:{}:violations", session_id)
    }

    pub fn result_key(session_id: &str) -> String {
        format!("exam:session:{}:result", session_id)
    }

    pub fn run_report_key(session_id: &str, seq: u64) -> String {
        format!("exam:session:{}:run:{}", session_id, seq)
    }

    pub fn events_channel(session_id: &str) -> String {
        format!("exam:session:{}:events", session_id)
    }
}

const RESULT_EXPIRY_SECS: u64 = 3600; // 1 hour

/// Event published on the session channel for the rendering side
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Navigate to the terminal results view
    Navigate { view: String, report: FinalReport },
    /// A violation was recorded
    ViolationRecorded { label: String, count: u32 },
    /// The fullscreen blocker state changed
    FullscreenRequired { required: bool },
    /// The active question changed
    QuestionSelected {
        question_id: u32,
        title: String,
        description: String,
    },
}

/// Client for the synchronized session store
#[derive(Clone)]
pub struct StoreClient {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl StoreClient {
    async fn with_url(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let conn = get_connection_with_retry(&client).await?;
        info!("Connected to session store at {}", redis_url);
        Ok(Self { client, conn })
    }

    /// Create a client from the REDIS_URL environment variable.
    pub async fn from_env() -> Result<Self> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        Self::with_url(&url).await
    }

    /// Open a second connection for blocking command intake, so BLPOP never
    /// stalls the write path sharing the multiplexed connection.
    pub async fn split(&self) -> Result<Self> {
        let conn = get_connection_with_retry(&self.client).await?;
        Ok(Self {
            client: self.client.clone(),
            conn,
        })
    }

    /// Block and wait for the next session command (BLPOP). Reconnects on
    /// connection failure and skips unparseable entries.
    pub async fn pop_command(&mut self, session_id: &str) -> Result<SessionCommand> {
        let queue = keys::commands_key(session_id);
        loop {
            let result: Option<(String, String)> = match self.conn.blpop(&queue, 0.0).await {
                Ok(res) => res,
                Err(e) => {
                    warn!("Store BLPOP failed: {}. Reconnecting...", e);
                    self.reconnect().await?;
                    continue;
                }
            };

            if let Some((_, payload)) = result {
                match serde_json::from_str::<SessionCommand>(&payload) {
                    Ok(command) => return Ok(command),
                    Err(e) => {
                        warn!("Failed to parse session command: {}. Data: {}", e, payload);
                        continue;
                    }
                }
            }
        }
    }

    /// Read the session's approval status, if any has been written.
    pub async fn read_session_status(&mut self, session_id: &str) -> Result<Option<String>> {
        let key = keys::status_key(session_id);
        let status: Option<String> = self
            .conn
            .get(&key)
            .await
            .context("Failed to read session status")?;
        Ok(status)
    }

    /// Synchronize the violation count after an increment. Best-effort from
    /// the caller's perspective; the count itself lives in the session.
    pub async fn sync_violation_count(&mut self, session_id: &str, count: u32) -> Result<()> {
        let key = keys::violations_key(session_id);
        let payload = json!({ "total_violations": count }).to_string();

        if let Err(e) = self.conn.set::<_, _, ()>(&key, &payload).await {
            warn!("Failed to sync violation count: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn.set::<_, _, ()>(&key, &payload).await?;
        }
        Ok(())
    }

    /// Store a run report and publish it for real-time subscribers.
    pub async fn store_run_report(
        &mut self,
        session_id: &str,
        seq: u64,
        report: &RunReport,
    ) -> Result<()> {
        self.store_result(
            &keys::run_report_key(session_id, seq),
            Some(keys::RUN_REPORT_CHANNEL),
            report,
        )
        .await
    }

    /// Store the final aggregate report and publish it.
    pub async fn sync_final(&mut self, report: &FinalReport) -> Result<()> {
        self.store_result(
            &keys::result_key(&report.session_id),
            Some(keys::RESULT_CHANNEL),
            report,
        )
        .await
    }

    /// Publish a session event (navigation request, violation notice, ...).
    pub async fn publish_event(&mut self, session_id: &str, event: &SessionEvent) -> Result<()> {
        let channel = keys::events_channel(session_id);
        let payload = serde_json::to_string(event)?;

        // Ignore publish errors beyond one reconnect attempt; events are
        // advisory for the rendering side.
        if let Err(e) = self.conn.publish::<_, _, ()>(&channel, &payload).await {
            warn!("Failed to publish session event: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn.publish::<_, _, ()>(&channel, &payload).await?;
        }
        Ok(())
    }

    /// Internal helper to store and publish a serializable result
    async fn store_result<T: Serialize>(
        &mut self,
        key: &str,
        channel: Option<&str>,
        result: &T,
    ) -> Result<()> {
        let payload = serde_json::to_string(result)?;

        if let Err(e) = self
            .conn
            .set_ex::<_, _, ()>(key, &payload, RESULT_EXPIRY_SECS)
            .await
        {
            warn!("Failed to store result: {}. Reconnecting...", e);
            self.reconnect().await?;
            self.conn
                .set_ex::<_, _, ()>(key, &payload, RESULT_EXPIRY_SECS)
                .await?;
        }

        if let Some(chan) = channel {
            let _ = self.conn.publish::<_, _, ()>(chan, &payload).await;
        }

        Ok(())
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.conn = get_connection_with_retry(&self.client).await?;
        Ok(())
    }
}

/// Get a store connection with retry logic
async fn get_connection_with_retry(client: &redis::Client) -> Result<MultiplexedConnection> {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!("Failed to connect to session store: {}. Retrying in 3 seconds...", e);
                sleep(Duration::from_secs(3)).await;
            }
        }
    }
}
