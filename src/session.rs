//! Exam session state and lifecycle
//!
//! `Session` owns the state the two core subsystems share: the question set,
//! the solved set, the violation tracker and the one-way terminated flag.
//! The solved set is mutated only by submissions, the violation count only by
//! environment signals; once terminated, both entry points become no-ops.

use std::collections::HashSet;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Question;
use crate::config::get_config;
use crate::dispatch::Dispatcher;
use crate::orchestrator::{self, RunMode, RunReport};
use crate::proctor::{classify, EnvironmentSignal, Transition, ViolationKind, ViolationTracker};

const POINTS_PER_QUESTION: u32 = 10;

/// Command consumed from the session queue
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Run the public (sample) cases only
    Run {
        question_id: u32,
        language: String,
        source: String,
    },
    /// Run every case; a full pass marks the question solved
    Submit {
        question_id: u32,
        language: String,
        source: String,
    },
    /// An environment signal observed on the candidate's side
    Signal { signal: EnvironmentSignal },
    /// Switch the active question
    Select { question_id: u32 },
    /// Finish the exam and produce the final report
    Finish,
}

/// Final status written to the store at session end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Completed,
    Disqualified,
    AutoSubmitted,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Completed => "completed",
            SessionStatus::Disqualified => "disqualified",
            SessionStatus::AutoSubmitted => "auto_submitted",
        };
        write!(f, "{}", s)
    }
}

/// Aggregate state pushed to the store when the session ends
#[derive(Debug, Clone, Serialize)]
pub struct FinalReport {
    pub session_id: String,
    pub score: u32,
    pub max_score: u32,
    pub total_violations: u32,
    pub status: SessionStatus,
    pub logout_time: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("session is terminated; no further submissions are accepted")]
    Terminated,
    #[error("unknown question id {0}")]
    UnknownQuestion(u32),
}

/// Outcome of feeding one environment signal into the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalResponse {
    pub violation: Option<ViolationKind>,
    pub suppress_default: bool,
    pub transition: Transition,
}

pub struct Session {
    session_id: String,
    questions: Vec<Question>,
    current: usize,
    solved: HashSet<u32>,
    tracker: ViolationTracker,
    dispatcher: Dispatcher,
    fullscreen_active: bool,
    fullscreen_required: bool,
}

impl Session {
    pub fn new(session_id: String, questions: Vec<Question>, dispatcher: Dispatcher) -> Self {
        Self {
            session_id,
            questions,
            current: 0,
            solved: HashSet::new(),
            tracker: ViolationTracker::new(get_config().violation_threshold),
            dispatcher,
            fullscreen_active: true,
            fullscreen_required: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    /// Switch the active question. Unknown ids leave the selection unchanged.
    pub fn select_question(&mut self, question_id: u32) -> bool {
        match self.questions.iter().position(|q| q.id == question_id) {
            Some(index) => {
                self.current = index;
                true
            }
            None => false,
        }
    }

    /// Run a submission against a question's cases. Rejected once the session
    /// is terminated; a fully passing `Full` run adds to the solved set.
    pub async fn run(
        &mut self,
        question_id: u32,
        language: &str,
        source: &str,
        mode: RunMode,
    ) -> Result<RunReport, SessionError> {
        if self.tracker.is_terminated() {
            return Err(SessionError::Terminated);
        }

        let report = {
            let question = self
                .questions
                .iter()
                .find(|q| q.id == question_id)
                .ok_or(SessionError::UnknownQuestion(question_id))?;

            // An empty editor grades whatever it was seeded with.
            let submitted = if source.trim().is_empty() {
                starter_source(question, language).unwrap_or_default()
            } else {
                source.to_string()
            };

            orchestrator::run_cases(&self.dispatcher, question, &submitted, language, mode).await
        };

        if report.solved {
            self.solved.insert(report.question_id);
        }

        Ok(report)
    }

    /// Feed one environment signal through the adapter and the violation
    /// tracker. After termination all signals are absorbed without effect.
    pub fn handle_signal(&mut self, signal: &EnvironmentSignal) -> SignalResponse {
        if self.tracker.is_terminated() {
            return SignalResponse {
                violation: None,
                suppress_default: false,
                transition: Transition::Ignored,
            };
        }

        if let EnvironmentSignal::FullscreenChange { active } = signal {
            self.fullscreen_active = *active;
            self.fullscreen_required = !*active;
        }

        let classification = classify(signal);
        let transition = match classification.violation {
            Some(kind) => self.tracker.record(kind),
            None => Transition::Ignored,
        };

        SignalResponse {
            violation: classification.violation,
            suppress_default: classification.suppress_default,
            transition,
        }
    }

    /// Fixed-interval backstop for fullscreen presence. Returns the new
    /// blocker state when it changed, None otherwise. Never a violation.
    pub fn poll_fullscreen(&mut self) -> Option<bool> {
        let required = !self.fullscreen_active && !self.tracker.is_terminated();
        if required != self.fullscreen_required {
            self.fullscreen_required = required;
            Some(required)
        } else {
            None
        }
    }

    pub fn score(&self) -> u32 {
        self.solved.len() as u32 * POINTS_PER_QUESTION
    }

    pub fn max_score(&self) -> u32 {
        self.questions.len() as u32 * POINTS_PER_QUESTION
    }

    pub fn solved_count(&self) -> usize {
        self.solved.len()
    }

    pub fn violations(&self) -> u32 {
        self.tracker.count()
    }

    pub fn is_terminated(&self) -> bool {
        self.tracker.is_terminated()
    }

    /// Build the final aggregate report for the given terminal status.
    pub fn final_report(&self, status: SessionStatus) -> FinalReport {
        FinalReport {
            session_id: self.session_id.clone(),
            score: self.score(),
            max_score: self.max_score(),
            total_violations: self.tracker.count(),
            status,
            logout_time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Starter source for a question, resolved through the language registry so
/// aliases find the canonical starter entry.
fn starter_source(question: &Question, language: &str) -> Option<String> {
    let spec = crate::languages::get_language_spec(language)?;
    question.starter_code.get(&spec.id).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages;
    use std::time::Duration;

    const SOLVED_SCRIPT: &str = r#"
fn two_sum(nums, target) {
    for i in 0..nums.len() {
        for j in (i + 1)..nums.len() {
            if nums[i] + nums[j] == target {
                return [i, j];
            }
        }
    }
    []
}
"#;

    fn test_session() -> Session {
        languages::init_languages().unwrap();
        let questions: Vec<Question> = serde_json::from_str(
            r#"[
              {
                "id": 1,
                "title": "Two Sum",
                "description": "",
                "function_name": "two_sum",
                "test_cases": [
                  { "input": "2 7 11 15\n9", "output": "0 1", "hidden": false },
                  { "input": "3 3\n6", "output": "0 1", "hidden": true }
                ]
              },
              {
                "id": 2,
                "title": "Palindrome",
                "description": "",
                "function_name": "is_palindrome",
                "test_cases": [
                  { "input": "121", "output": "true", "hidden": false }
                ]
              }
            ]"#,
        )
        .unwrap();

        Session::new(
            "test-session".into(),
            questions,
            Dispatcher::new(Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn test_full_pass_adds_to_solved_set_once() {
        let mut session = test_session();

        let report = session.run(1, "rhai", SOLVED_SCRIPT, RunMode::Full).await.unwrap();
        assert!(report.solved);
        assert_eq!(session.solved_count(), 1);
        assert_eq!(session.score(), 10);
        assert_eq!(session.max_score(), 20);

        // Resubmitting the same question does not double-count.
        session.run(1, "rhai", SOLVED_SCRIPT, RunMode::Full).await.unwrap();
        assert_eq!(session.solved_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_question_is_rejected() {
        let mut session = test_session();
        let err = session.run(99, "rhai", SOLVED_SCRIPT, RunMode::Full).await.unwrap_err();
        assert_eq!(err, SessionError::UnknownQuestion(99));
    }

    #[tokio::test]
    async fn test_terminated_session_rejects_submissions() {
        let mut session = test_session();

        for _ in 0..3 {
            session.handle_signal(&EnvironmentSignal::ClipboardCopy);
        }
        assert!(session.is_terminated());

        let err = session
            .run(1, "rhai", SOLVED_SCRIPT, RunMode::Full)
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::Terminated);
        assert_eq!(session.solved_count(), 0);
    }

    #[test]
    fn test_signals_after_termination_are_absorbed() {
        let mut session = test_session();

        assert_eq!(
            session.handle_signal(&EnvironmentSignal::ClipboardCopy).transition,
            Transition::Recorded(1)
        );
        assert_eq!(
            session
                .handle_signal(&EnvironmentSignal::VisibilityChange { hidden: true })
                .transition,
            Transition::Recorded(2)
        );
        assert_eq!(
            session.handle_signal(&EnvironmentSignal::ContextMenu).transition,
            Transition::Terminated(3)
        );

        let response = session.handle_signal(&EnvironmentSignal::ClipboardPaste);
        assert_eq!(response.transition, Transition::Ignored);
        assert!(!response.suppress_default);
        assert_eq!(session.violations(), 3);
    }

    #[test]
    fn test_fullscreen_poll_reports_changes_only() {
        let mut session = test_session();

        assert_eq!(session.poll_fullscreen(), None);

        session.handle_signal(&EnvironmentSignal::FullscreenChange { active: false });
        // The signal handler already set the blocker; the poll sees no change.
        assert_eq!(session.poll_fullscreen(), None);

        session.handle_signal(&EnvironmentSignal::FullscreenChange { active: true });
        assert_eq!(session.poll_fullscreen(), None);
        assert_eq!(session.violations(), 1);
    }

    #[test]
    fn test_final_report_statuses() {
        let session = test_session();

        let completed = session.final_report(SessionStatus::Completed);
        assert_eq!(completed.status.to_string(), "completed");
        assert_eq!(completed.score, 0);
        assert_eq!(completed.max_score, 20);
        assert!(!completed.logout_time.is_empty());

        let auto = session.final_report(SessionStatus::AutoSubmitted);
        assert_eq!(auto.status.to_string(), "auto_submitted");

        let dq = session.final_report(SessionStatus::Disqualified);
        assert_eq!(dq.status.to_string(), "disqualified");
    }

    #[tokio::test]
    async fn test_empty_source_falls_back_to_starter_code() {
        languages::init_languages().unwrap();
        let questions: Vec<Question> = serde_json::from_str(
            r#"[
              {
                "id": 7,
                "title": "Palindrome",
                "description": "",
                "function_name": "is_palindrome",
                "test_cases": [
                  { "input": "121", "output": "true", "hidden": false }
                ],
                "starter_code": {
                  "rhai": "fn is_palindrome(x) { x >= 0 }"
                }
              }
            ]"#,
        )
        .unwrap();
        let mut session = Session::new(
            "starter".into(),
            questions,
            Dispatcher::new(Duration::from_secs(5)),
        );

        let report = session.run(7, "rhai", "   ", RunMode::Full).await.unwrap();
        assert_eq!(report.passed_count, 1);
        assert!(report.solved);
    }

    #[test]
    fn test_select_question() {
        let mut session = test_session();
        assert_eq!(session.current_question().unwrap().id, 1);
        assert!(session.select_question(2));
        assert_eq!(session.current_question().unwrap().id, 2);
        assert!(!session.select_question(42));
        assert_eq!(session.current_question().unwrap().id, 2);
    }
}
