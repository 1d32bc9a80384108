use thiserror::Error;

use crate::validate::Violation;

#[derive(Error, Debug)]
pub enum ChatterError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Malformed rule in {source_name} at entry {index}: {message}")]
    MalformedRule {
        source_name: String,
        index: usize,
        message: String,
    },
    #[error("Alias source '{from}' points at both '{first}' and '{second}'")]
    DuplicateAlias {
        from: String,
        first: String,
        second: String,
    },
    #[error(
        "Rule conflict: block rule ('{block_a}', '{block_b}') contradicts alias chain {}",
        .alias_chain.join(" -> ")
    )]
    RuleConflict {
        alias_chain: Vec<String>,
        block_a: String,
        block_b: String,
    },
    #[error("Alias cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },
    #[error(
        "Baseline regression: {} violation(s): {}",
        .violations.len(),
        .violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; ")
    )]
    BaselineRegression { violations: Vec<Violation> },
}

pub type Result<T> = std::result::Result<T, ChatterError>;

// Helper conversions
impl From<serde_json::Error> for ChatterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
impl From<config::ConfigError> for ChatterError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

impl ChatterError {
    pub fn io(path: impl AsRef<std::path::Path>, e: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        }
    }
}
