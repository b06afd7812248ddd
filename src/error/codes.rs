/// Error code registry for Burrow
///
/// Error codes are organized by category:
/// - 1000-1999: Configuration errors
/// - 2000-2999: Session errors
/// - 3000-3999: Store errors
/// - 4000-4999: Execution errors
/// - 5000-5999: Template errors
/// - 6000-6999: Git errors
/// - 7000-7999: Validation errors
/// - 9000-9999: Other errors
pub struct ErrorCode;

impl ErrorCode {
    // Configuration errors (1000-1999)
    pub const CONFIG_GENERIC: u16 = 1000;
    pub const CONFIG_NOT_FOUND: u16 = 1001;
    pub const CONFIG_INVALID_YAML: u16 = 1002;
    pub const CONFIG_INVALID_PATTERN: u16 = 1003;
    pub const CONFIG_NO_SPAWN_STRATEGY: u16 = 1004;

    // Session errors (2000-2999)
    pub const SESSION_GENERIC: u16 = 2000;
    pub const SESSION_NOT_FOUND: u16 = 2001;
    pub const SESSION_ALREADY_EXISTS: u16 = 2002;
    pub const SESSION_CORRUPTED: u16 = 2003;
    pub const SESSION_INVALID_STATE: u16 = 2006;

    // Store errors (3000-3999)
    pub const STORE_GENERIC: u16 = 3000;
    pub const STORE_IO_ERROR: u16 = 3001;
    pub const STORE_SERIALIZATION_ERROR: u16 = 3011;

    // Execution errors (4000-4999)
    pub const EXEC_GENERIC: u16 = 4000;
    pub const EXEC_COMMAND_NOT_FOUND: u16 = 4001;
    pub const EXEC_TIMEOUT: u16 = 4002;
    pub const EXEC_SUBPROCESS_FAILED: u16 = 4003;
    pub const EXEC_SIGNAL_RECEIVED: u16 = 4005;
    pub const EXEC_INTERRUPTED: u16 = 4006;
    pub const EXEC_SPAWN_FAILED: u16 = 4007;

    // Template errors (5000-5999)
    pub const TEMPLATE_RENDER_FAILED: u16 = 5001;

    // Git errors (6000-6999)
    pub const GIT_GENERIC: u16 = 6000;
    pub const GIT_NOT_REPO: u16 = 6001;
    pub const GIT_CLONE_FAILED: u16 = 6002;
    pub const GIT_PULL_FAILED: u16 = 6003;
    pub const GIT_WORKTREE_FAILED: u16 = 6004;

    // Validation errors (7000-7999)
    pub const VALIDATION_GENERIC: u16 = 7000;
    pub const VALIDATION_REQUIRED_FIELD: u16 = 7001;
    pub const VALIDATION_INVALID_FORMAT: u16 = 7002;

    // Other errors (9000-9999)
    pub const OTHER_GENERIC: u16 = 9000;
    pub const OTHER_IO: u16 = 9001;
}

/// Get a human-readable description for an error code
pub fn describe_error_code(code: u16) -> &'static str {
    match code {
        ErrorCode::CONFIG_NOT_FOUND => "Configuration file not found",
        ErrorCode::CONFIG_INVALID_YAML => "Configuration is not valid YAML",
        ErrorCode::CONFIG_INVALID_PATTERN => "A rule pattern could not be compiled",
        ErrorCode::CONFIG_NO_SPAWN_STRATEGY => "No spawn commands or windows are configured",
        ErrorCode::SESSION_NOT_FOUND => "Session not found",
        ErrorCode::SESSION_ALREADY_EXISTS => "Session already exists",
        ErrorCode::SESSION_CORRUPTED => "Session workspace is corrupted",
        ErrorCode::SESSION_INVALID_STATE => "Session is not in the required state",
        ErrorCode::STORE_IO_ERROR => "Session store could not be read or written",
        ErrorCode::STORE_SERIALIZATION_ERROR => "Session store contents are malformed",
        ErrorCode::EXEC_COMMAND_NOT_FOUND => "Command not found",
        ErrorCode::EXEC_TIMEOUT => "Command timed out",
        ErrorCode::EXEC_SUBPROCESS_FAILED => "Command exited with a non-zero status",
        ErrorCode::EXEC_SIGNAL_RECEIVED => "Command was terminated by a signal",
        ErrorCode::EXEC_INTERRUPTED => "Operation was cancelled",
        ErrorCode::EXEC_SPAWN_FAILED => "Command could not be started",
        ErrorCode::TEMPLATE_RENDER_FAILED => "Template rendering failed",
        ErrorCode::GIT_NOT_REPO => "Not a git repository",
        ErrorCode::GIT_CLONE_FAILED => "Git clone failed",
        ErrorCode::GIT_PULL_FAILED => "Git pull failed",
        ErrorCode::GIT_WORKTREE_FAILED => "Git worktree operation failed",
        ErrorCode::VALIDATION_REQUIRED_FIELD => "Required field is missing",
        ErrorCode::VALIDATION_INVALID_FORMAT => "Value has an invalid format",
        c if (1000..2000).contains(&c) => "Configuration error",
        c if (2000..3000).contains(&c) => "Session error",
        c if (3000..4000).contains(&c) => "Store error",
        c if (4000..5000).contains(&c) => "Execution error",
        c if (5000..6000).contains(&c) => "Template error",
        c if (6000..7000).contains(&c) => "Git error",
        c if (7000..8000).contains(&c) => "Validation error",
        _ => "Unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_codes_have_descriptions() {
        assert_eq!(
            describe_error_code(ErrorCode::SESSION_NOT_FOUND),
            "Session not found"
        );
        assert_eq!(
            describe_error_code(ErrorCode::EXEC_INTERRUPTED),
            "Operation was cancelled"
        );
    }

    #[test]
    fn test_unknown_codes_fall_back_to_category() {
        assert_eq!(describe_error_code(6099), "Git error");
        assert_eq!(describe_error_code(9999), "Unknown error");
    }
}
