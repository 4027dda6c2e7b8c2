//! Error types for building and running batch scripts.

use std::io;

use thiserror::Error;

/// Failure raised by a stage while producing its command or output path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("input file pattern is empty")]
    EmptyInput,

    #[error("{0}")]
    Invalid(String),
}

/// Errors surfaced by [`Batch`](crate::Batch) and [`BatchRunner`](crate::BatchRunner).
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("stage {index} ({name}) failed: {source}")]
    Stage {
        index: usize,
        name: String,
        #[source]
        source: StageError,
    },

    #[error("`{command}` exited with {}", describe_code(.code))]
    ProcessFailure { command: String, code: Option<i32> },

    #[error("batch script file error: {0}")]
    Resource(#[from] io::Error),

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

impl BatchError {
    /// Exit code of the failed child, if this is a process failure that
    /// ended with one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            BatchError::ProcessFailure { code, .. } => *code,
            _ => None,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;
