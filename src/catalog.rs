//! Question catalog
//!
//! Read-only fetch of the ordered question set at session start. A failed
//! load is the one fatal, user-visible session-start error; the caller gets
//! a typed error and decides when to retry. There is no automatic retry.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

/// A single input/output test case
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    /// Raw stdin-style input text
    pub input: String,
    /// Expected raw output text
    pub output: String,
    /// Hidden cases never reveal input/expected/actual, only pass/fail
    #[serde(default)]
    pub hidden: bool,
    /// Structured call arguments for function-call harnesses
    #[serde(default)]
    pub args: Option<Vec<Value>>,
}

/// An exam question. Immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub id: u32,
    pub title: String,
    pub description: String,
    /// Target function the harness looks up and invokes
    pub function_name: String,
    pub test_cases: Vec<TestCase>,
    /// Starter source text per language id
    #[serde(default)]
    pub starter_code: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read question catalog at {path}: {source} (fix the catalog and restart to retry)")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("question catalog at {path} is malformed: {source} (fix the catalog and restart to retry)")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("question catalog at {path} is empty (fix the catalog and restart to retry)")]
    Empty { path: String },
}

/// Load the ordered question set from a JSON file.
pub fn load_catalog(path: &str) -> Result<Vec<Question>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Unreadable {
        path: path.to_string(),
        source,
    })?;

    let questions = parse_catalog(path, &content)?;
    info!("Loaded {} questions from {}", questions.len(), path);
    Ok(questions)
}

fn parse_catalog(path: &str, content: &str) -> Result<Vec<Question>, CatalogError> {
    let questions: Vec<Question> =
        serde_json::from_str(content).map_err(|source| CatalogError::Malformed {
            path: path.to_string(),
            source,
        })?;

    if questions.is_empty() {
        return Err(CatalogError::Empty {
            path: path.to_string(),
        });
    }

    Ok(questions)
}
