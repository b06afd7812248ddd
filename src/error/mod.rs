use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod codes;
pub mod helpers;

pub use codes::{describe_error_code, ErrorCode};
pub use helpers::ErrorExt;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The unified error type for Burrow
#[derive(Error, Debug)]
pub enum BurrowError {
    #[error("[E{code:04}] Configuration error: {message}")]
    Config {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Session '{session_id}' not found")]
    NotFound { code: u16, session_id: String },

    #[error("[E{code:04}] Invalid input for '{field}': {message}")]
    InvalidInput {
        code: u16,
        field: String,
        message: String,
    },

    #[error("[E{code:04}] Session '{session_id}' is {current}, expected {expected}")]
    InvalidState {
        code: u16,
        session_id: String,
        current: String,
        expected: String,
    },

    #[error("[E{code:04}] Session '{session_id}' is corrupted: {message}")]
    Corrupted {
        code: u16,
        session_id: String,
        message: String,
    },

    #[error("[E{code:04}] Execution error: {message}")]
    Execution {
        code: u16,
        message: String,
        command: Option<String>,
        exit_code: Option<i32>,
        output: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Git {operation} failed: {message}")]
    Git {
        code: u16,
        operation: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Store error: {message}")]
    Store {
        code: u16,
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] Template error: {message}")]
    Template {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("[E{code:04}] {operation} cancelled")]
    Cancelled { code: u16, operation: String },

    #[error("[E{code:04}] {message}")]
    Other {
        code: u16,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },
}

impl BurrowError {
    /// Create a configuration error with default code
    pub fn config(message: impl Into<String>) -> Self {
        Self::config_with_code(ErrorCode::CONFIG_GENERIC, message)
    }

    /// Create a configuration error with specific code
    pub fn config_with_code(code: u16, message: impl Into<String>) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::NotFound {
            code: ErrorCode::SESSION_NOT_FOUND,
            session_id: session_id.into(),
        }
    }

    pub fn invalid_input(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            code: ErrorCode::VALIDATION_INVALID_FORMAT,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn already_exists(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self::InvalidInput {
            code: ErrorCode::SESSION_ALREADY_EXISTS,
            field: "id".to_string(),
            message: format!("session '{session_id}' already exists"),
        }
    }

    pub fn invalid_state(
        session_id: impl Into<String>,
        current: impl Display,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            code: ErrorCode::SESSION_INVALID_STATE,
            session_id: session_id.into(),
            current: current.to_string(),
            expected: expected.into(),
        }
    }

    pub fn corrupted(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            code: ErrorCode::SESSION_CORRUPTED,
            session_id: session_id.into(),
            message: message.into(),
        }
    }

    /// Create an execution error with default code
    pub fn execution(message: impl Into<String>) -> Self {
        Self::execution_with_code(ErrorCode::EXEC_GENERIC, message, None)
    }

    /// Create an execution error with specific code
    pub fn execution_with_code(
        code: u16,
        message: impl Into<String>,
        command: Option<String>,
    ) -> Self {
        Self::Execution {
            code,
            message: message.into(),
            command,
            exit_code: None,
            output: String::new(),
            source: None,
        }
    }

    /// A command ran to completion but exited non-zero
    pub fn command_failed(command: impl Into<String>, exit_code: Option<i32>, output: String) -> Self {
        let command = command.into();
        let message = match exit_code {
            Some(code) => format!("command `{command}` exited with status {code}"),
            None => format!("command `{command}` did not exit cleanly"),
        };
        Self::Execution {
            code: ErrorCode::EXEC_SUBPROCESS_FAILED,
            message,
            command: Some(command),
            exit_code,
            output,
            source: None,
        }
    }

    pub fn git(code: u16, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            code,
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn store(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Store {
            code: ErrorCode::STORE_GENERIC,
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            code: ErrorCode::TEMPLATE_RENDER_FAILED,
            message: message.into(),
            source: None,
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            code: ErrorCode::EXEC_INTERRUPTED,
            operation: operation.into(),
        }
    }

    pub fn io(operation: &str, path: &Path, err: std::io::Error) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_IO,
            message: format!("{operation} failed for {}", path.display()),
            source: Some(Box::new(err)),
        }
    }

    /// Create a generic other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            code: ErrorCode::OTHER_GENERIC,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error to this error
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        match &mut self {
            Self::Config { source: src, .. }
            | Self::Execution { source: src, .. }
            | Self::Git { source: src, .. }
            | Self::Store { source: src, .. }
            | Self::Template { source: src, .. }
            | Self::Other { source: src, .. } => {
                *src = Some(source.into());
            }
            Self::NotFound { .. }
            | Self::InvalidInput { .. }
            | Self::InvalidState { .. }
            | Self::Corrupted { .. }
            | Self::Cancelled { .. } => {}
        }
        self
    }

    /// Prefix the message with the operation that produced the error.
    ///
    /// Identity-carrying variants (not found, invalid state, cancelled) already
    /// name their subject and are left untouched.
    pub fn with_context(mut self, context: impl Display) -> Self {
        match &mut self {
            Self::Config { message, .. }
            | Self::InvalidInput { message, .. }
            | Self::Corrupted { message, .. }
            | Self::Execution { message, .. }
            | Self::Git { message, .. }
            | Self::Store { message, .. }
            | Self::Template { message, .. }
            | Self::Other { message, .. } => {
                *message = format!("{context}: {message}");
            }
            Self::NotFound { .. } | Self::InvalidState { .. } | Self::Cancelled { .. } => {}
        }
        self
    }

    /// Get the error code
    pub fn code(&self) -> u16 {
        match self {
            Self::Config { code, .. }
            | Self::NotFound { code, .. }
            | Self::InvalidInput { code, .. }
            | Self::InvalidState { code, .. }
            | Self::Corrupted { code, .. }
            | Self::Execution { code, .. }
            | Self::Git { code, .. }
            | Self::Store { code, .. }
            | Self::Template { code, .. }
            | Self::Cancelled { code, .. }
            | Self::Other { code, .. } => *code,
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::NotFound { .. } | Self::InvalidState { .. } | Self::Corrupted { .. } => 3,
            Self::Store { .. } => 4,
            Self::Execution { .. } | Self::Template { .. } => 5,
            Self::Git { .. } => 7,
            Self::InvalidInput { .. } => 8,
            Self::Cancelled { .. } => 130,
            Self::Other { .. } => 1,
        }
    }

    /// Captured output of the failing command, if any
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::Execution { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Type alias for Results using BurrowError
pub type Result<T> = std::result::Result<T, BurrowError>;
