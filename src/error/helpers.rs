use super::{BurrowError, ErrorCode};
use std::error::Error as _;
use std::path::PathBuf;

/// Extension trait for convenient error conversion
pub trait ErrorExt<T> {
    /// Convert to BurrowError with context
    fn to_burrow(self, context: impl Into<String>) -> Result<T, BurrowError>;

    fn to_config_error(self, message: impl Into<String>) -> Result<T, BurrowError>;
    fn to_store_error(self, message: impl Into<String>, path: Option<PathBuf>)
        -> Result<T, BurrowError>;
    fn to_template_error(self, message: impl Into<String>) -> Result<T, BurrowError>;
}

impl<T, E> ErrorExt<T> for Result<T, E>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    fn to_burrow(self, context: impl Into<String>) -> Result<T, BurrowError> {
        self.map_err(|e| BurrowError::other(context).with_source(e))
    }

    fn to_config_error(self, message: impl Into<String>) -> Result<T, BurrowError> {
        self.map_err(|e| BurrowError::config(message).with_source(e))
    }

    fn to_store_error(
        self,
        message: impl Into<String>,
        path: Option<PathBuf>,
    ) -> Result<T, BurrowError> {
        self.map_err(|e| {
            let err: Box<dyn std::error::Error + Send + Sync> = e.into();
            let code = if err.is::<serde_json::Error>() {
                ErrorCode::STORE_SERIALIZATION_ERROR
            } else if err.is::<std::io::Error>() {
                ErrorCode::STORE_IO_ERROR
            } else {
                ErrorCode::STORE_GENERIC
            };
            BurrowError::Store {
                code,
                message: message.into(),
                path,
                source: Some(err),
            }
        })
    }

    fn to_template_error(self, message: impl Into<String>) -> Result<T, BurrowError> {
        self.map_err(|e| {
            let err: Box<dyn std::error::Error + Send + Sync> = e.into();
            // tera nests the useful detail in the source chain
            let mut detail = err.to_string();
            let mut current = err.source();
            while let Some(inner) = current {
                detail.push_str(": ");
                detail.push_str(&inner.to_string());
                current = inner.source();
            }
            BurrowError::template(format!("{}: {detail}", message.into())).with_source(err)
        })
    }
}
