//! Test run orchestrator
//!
//! Iterates a question's test cases strictly sequentially (the embedded
//! interpreter is not reentrant), dispatches each case, verifies output and
//! redacts hidden cases. One failing case never aborts the batch.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Question, TestCase};
use crate::dispatch::Dispatcher;
use crate::harness::CallMeta;
use crate::verifier;

/// Run semantics: `Sample` restricts to public cases, `Full` runs every case
/// and can mark the question solved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Sample,
    Full,
}

/// Verification of one test case, with hidden-case fields withheld
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub passed: bool,
    pub hidden: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate outcome of a run or submission
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub question_id: u32,
    pub mode: RunMode,
    pub results: Vec<CaseResult>,
    pub passed_count: usize,
    pub total_count: usize,
    /// Percentage of passed cases in this run
    pub score: u32,
    /// True only for a fully passing `Full` run
    pub solved: bool,
}

/// Execute the question's cases for one submission.
pub async fn run_cases(
    dispatcher: &Dispatcher,
    question: &Question,
    source: &str,
    language: &str,
    mode: RunMode,
) -> RunReport {
    let cases: Vec<&TestCase> = match mode {
        RunMode::Sample => question.test_cases.iter().filter(|tc| !tc.hidden).collect(),
        RunMode::Full => question.test_cases.iter().collect(),
    };

    let mut results = Vec::with_capacity(cases.len());
    let mut passed_count = 0;

    for case in &cases {
        let meta = CallMeta {
            function_name: question.function_name.clone(),
            args: case.args.clone().unwrap_or_default(),
        };

        let result = match dispatcher.dispatch(language, source, &case.input, &meta).await {
            Ok(execution) => {
                if !execution.is_accepted() {
                    debug!(
                        "Backend returned {} for question {}",
                        execution.status, question.id
                    );
                }
                let check = verifier::check_case(&execution.stdout, &case.output);
                build_case_result(case, check.passed, check.actual, check.expected, execution.stderr)
            }
            Err(e) => {
                warn!(
                    "Case execution escaped the dispatcher for question {}: {:#}",
                    question.id, e
                );
                CaseResult {
                    passed: false,
                    hidden: case.hidden,
                    input: None,
                    expected: None,
                    actual: None,
                    error: Some(format!("System Error: {}", e)),
                }
            }
        };

        if result.passed {
            passed_count += 1;
        }
        results.push(result);
    }

    let total_count = results.len();
    let passed_flags: Vec<bool> = results.iter().map(|r| r.passed).collect();
    let solved = mode == RunMode::Full && total_count > 0 && passed_count == total_count;

    info!(
        "Run finished: question_id={}, mode={:?}, passed={}/{}",
        question.id, mode, passed_count, total_count
    );

    RunReport {
        question_id: question.id,
        mode,
        results,
        passed_count,
        total_count,
        score: verifier::score(&passed_flags),
        solved,
    }
}

fn build_case_result(
    case: &TestCase,
    passed: bool,
    actual: String,
    expected: String,
    stderr: String,
) -> CaseResult {
    let error = if !passed && !stderr.is_empty() {
        Some(stderr)
    } else {
        None
    };

    if case.hidden {
        CaseResult {
            passed,
            hidden: true,
            input: None,
            expected: None,
            actual: None,
            error,
        }
    } else {
        CaseResult {
            passed,
            hidden: false,
            input: Some(case.input.clone()),
            expected: Some(expected),
            actual: Some(actual),
            error,
        }
    }
}
