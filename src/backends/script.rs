//! Local sandboxed script backend
//!
//! Evaluates the synthesized program in a fresh engine and scope per call
//! with a minimal console-like print capture, so no state is shared between
//! executions. Thrown script errors are mapped to `RuntimeError` with the
//! error text as stderr.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rhai::Engine;

use super::{ExecutionBackend, ExecutionResult};
use crate::languages::LanguageSpec;

#[derive(Debug, Clone, Default)]
pub struct ScriptBackend;

impl ScriptBackend {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one program. CPU-bound, so it runs on the blocking pool.
    pub async fn run_program(&self, program: String) -> ExecutionResult {
        let outcome = tokio::task::spawn_blocking(move || evaluate(&program)).await;

        match outcome {
            Ok(result) => result,
            Err(join_error) => {
                ExecutionResult::runtime_error(format!("Script evaluation aborted: {}", join_error))
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for ScriptBackend {
    async fn execute(&self, _language: &LanguageSpec, program: &str, _stdin: &str) -> ExecutionResult {
        self.run_program(program.to_string()).await
    }
}

fn evaluate(program: &str) -> ExecutionResult {
    let buffer = Arc::new(Mutex::new(String::new()));

    let mut engine = Engine::new();

    let sink = buffer.clone();
    engine.on_print(move |text| {
        if let Ok(mut captured) = sink.lock() {
            captured.push_str(text);
            captured.push('\n');
        }
    });
    let sink = buffer.clone();
    engine.on_debug(move |text, _source, _pos| {
        if let Ok(mut captured) = sink.lock() {
            captured.push_str(text);
            captured.push('\n');
        }
    });

    match engine.run(program) {
        Ok(()) => {
            let stdout = buffer.lock().map(|captured| captured.clone()).unwrap_or_default();
            ExecutionResult::accepted(stdout.trim(), "")
        }
        Err(error) => ExecutionResult::runtime_error(error.to_string()),
    }
}
