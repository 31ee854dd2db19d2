//! Integrity monitoring
//!
//! A violation-counting state machine with a zero-tolerance escalation
//! policy. Raw environment signals are translated by thin adapters into
//! violation kinds; all counting and escalation happens in one place,
//! `ViolationTracker::record`. The `Terminated` state is absorbing: once
//! reached, every further signal is ignored.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Raw environment signal, as reported by the candidate's environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvironmentSignal {
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        alt: bool,
        #[serde(default)]
        meta: bool,
    },
    ContextMenu,
    ClipboardCopy,
    ClipboardCut,
    ClipboardPaste,
    VisibilityChange {
        hidden: bool,
    },
    FullscreenChange {
        active: bool,
    },
}

/// One detected instance of prohibited candidate behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    RestrictedKey,
    InspectorAttempt,
    ContextMenu,
    CopyAttempt,
    CutAttempt,
    PasteAttempt,
    TabSwitch,
    FullscreenExit,
}

impl ViolationKind {
    /// Human-readable label, synced to the store and shown to the candidate
    pub fn label(&self) -> &'static str {
        match self {
            ViolationKind::RestrictedKey => "Restricted Key",
            ViolationKind::InspectorAttempt => "Inspector / Tools Attempt",
            ViolationKind::ContextMenu => "Right Click",
            ViolationKind::CopyAttempt => "Copy Attempt",
            ViolationKind::CutAttempt => "Cut Attempt",
            ViolationKind::PasteAttempt => "Paste Attempt",
            ViolationKind::TabSwitch => "Tab Switch",
            ViolationKind::FullscreenExit => "Exited Fullscreen",
        }
    }
}

/// How a signal must be handled by the environment adapter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub violation: Option<ViolationKind>,
    /// Whether the event's default behavior (copying, opening a menu, ...)
    /// must be suppressed
    pub suppress_default: bool,
}

impl Classification {
    fn none() -> Self {
        Self {
            violation: None,
            suppress_default: false,
        }
    }

    fn violation(kind: ViolationKind, suppress_default: bool) -> Self {
        Self {
            violation: Some(kind),
            suppress_default,
        }
    }
}

/// Map a raw environment signal to at most one violation plus a suppression
/// decision. Pure; the counting lives in `ViolationTracker`.
pub fn classify(signal: &EnvironmentSignal) -> Classification {
    match signal {
        EnvironmentSignal::KeyDown {
            key,
            ctrl,
            shift,
            alt,
            meta,
        } => {
            if key == "Alt" || *alt || *meta || key.eq_ignore_ascii_case("contextmenu") {
                return Classification::violation(ViolationKind::RestrictedKey, true);
            }
            if key == "F12" || (*ctrl && *shift && key == "I") || (*ctrl && key == "p") {
                return Classification::violation(ViolationKind::InspectorAttempt, true);
            }
            Classification::none()
        }
        EnvironmentSignal::ContextMenu => {
            Classification::violation(ViolationKind::ContextMenu, true)
        }
        EnvironmentSignal::ClipboardCopy => {
            Classification::violation(ViolationKind::CopyAttempt, true)
        }
        EnvironmentSignal::ClipboardCut => Classification::violation(ViolationKind::CutAttempt, true),
        EnvironmentSignal::ClipboardPaste => {
            Classification::violation(ViolationKind::PasteAttempt, true)
        }
        EnvironmentSignal::VisibilityChange { hidden } => {
            if *hidden {
                Classification::violation(ViolationKind::TabSwitch, false)
            } else {
                Classification::none()
            }
        }
        EnvironmentSignal::FullscreenChange { active } => {
            if !*active {
                Classification::violation(ViolationKind::FullscreenExit, false)
            } else {
                Classification::none()
            }
        }
    }
}

/// State transition produced by recording a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Signal ignored (already terminated, or not a violation)
    Ignored,
    /// Count incremented, session still active
    Recorded(u32),
    /// Threshold reached; the session is now terminated
    Terminated(u32),
}

/// Violation counter with threshold escalation. The count is monotonically
/// non-decreasing; the terminated flag is one-way.
#[derive(Debug)]
pub struct ViolationTracker {
    count: u32,
    threshold: u32,
    terminated: bool,
}

impl ViolationTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
            terminated: false,
        }
    }

    /// Record one violation event. Absorbing after termination.
    pub fn record(&mut self, kind: ViolationKind) -> Transition {
        if self.terminated {
            return Transition::Ignored;
        }

        self.count += 1;
        warn!(
            "Violation recorded: {} ({}/{})",
            kind.label(),
            self.count,
            self.threshold
        );

        if self.count >= self.threshold {
            self.terminated = true;
            Transition::Terminated(self.count)
        } else {
            Transition::Recorded(self.count)
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: &str, ctrl: bool, shift: bool) -> EnvironmentSignal {
        EnvironmentSignal::KeyDown {
            key: key.into(),
            ctrl,
            shift,
            alt: false,
            meta: false,
        }
    }

    #[test]
    fn test_classify_restricted_keys() {
        assert_eq!(
            classify(&key("Alt", false, false)).violation,
            Some(ViolationKind::RestrictedKey)
        );
        assert_eq!(
            classify(&key("F12", false, false)).violation,
            Some(ViolationKind::InspectorAttempt)
        );
        assert_eq!(
            classify(&key("I", true, true)).violation,
            Some(ViolationKind::InspectorAttempt)
        );
        assert_eq!(
            classify(&key("p", true, false)).violation,
            Some(ViolationKind::InspectorAttempt)
        );
        assert_eq!(classify(&key("a", false, false)).violation, None);
    }

    #[test]
    fn test_classify_suppression_decisions() {
        assert!(classify(&EnvironmentSignal::ClipboardCopy).suppress_default);
        assert!(classify(&EnvironmentSignal::ContextMenu).suppress_default);
        assert!(!classify(&EnvironmentSignal::VisibilityChange { hidden: true }).suppress_default);
        assert!(!classify(&EnvironmentSignal::FullscreenChange { active: false }).suppress_default);
        assert!(!classify(&key("a", false, false)).suppress_default);
    }

    #[test]
    fn test_classify_visibility_and_fullscreen() {
        assert_eq!(
            classify(&EnvironmentSignal::VisibilityChange { hidden: true }).violation,
            Some(ViolationKind::TabSwitch)
        );
        assert_eq!(
            classify(&EnvironmentSignal::VisibilityChange { hidden: false }).violation,
            None
        );
        assert_eq!(
            classify(&EnvironmentSignal::FullscreenChange { active: false }).violation,
            Some(ViolationKind::FullscreenExit)
        );
        assert_eq!(
            classify(&EnvironmentSignal::FullscreenChange { active: true }).violation,
            None
        );
    }

    #[test]
    fn test_third_violation_terminates() {
        let mut tracker = ViolationTracker::new(3);

        assert_eq!(tracker.record(ViolationKind::TabSwitch), Transition::Recorded(1));
        assert_eq!(tracker.record(ViolationKind::CopyAttempt), Transition::Recorded(2));
        assert_eq!(
            tracker.record(ViolationKind::ContextMenu),
            Transition::Terminated(3)
        );
        assert!(tracker.is_terminated());
    }

    #[test]
    fn test_terminated_state_is_absorbing() {
        let mut tracker = ViolationTracker::new(3);
        for _ in 0..3 {
            tracker.record(ViolationKind::TabSwitch);
        }

        assert_eq!(tracker.record(ViolationKind::PasteAttempt), Transition::Ignored);
        assert_eq!(tracker.record(ViolationKind::TabSwitch), Transition::Ignored);
        assert_eq!(tracker.count(), 3);
        assert!(tracker.is_terminated());
    }

    #[test]
    fn test_signal_round_trip_serde() {
        let json = r#"{"type":"key_down","key":"F12"}"#;
        let signal: EnvironmentSignal = serde_json::from_str(json).unwrap();
        assert_eq!(
            classify(&signal).violation,
            Some(ViolationKind::InspectorAttempt)
        );

        let json = r#"{"type":"visibility_change","hidden":true}"#;
        let signal: EnvironmentSignal = serde_json::from_str(json).unwrap();
        assert_eq!(classify(&signal).violation, Some(ViolationKind::TabSwitch));
    }
}
