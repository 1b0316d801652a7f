//! Error types for the docflow pipeline.

use std::path::PathBuf;

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Why a single work item did not produce a value.
///
/// Task errors never escape a batch: they are logged, counted in
/// `tasks_failed` and turned into an empty result slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task cancelled")]
    Cancelled,
}

impl TaskError {
    /// Map a join error from a spawned work unit
    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            return Self::Cancelled;
        }
        match err.try_into_panic() {
            Ok(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                Self::Panicked(message)
            }
            Err(_) => Self::Failed("work unit aborted".to_string()),
        }
    }
}

/// Errors raised by the document collaborators
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error reading {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("chunker error: {0}")]
    Chunk(String),

    #[error("embedder error: {0}")]
    Embed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_payload_is_captured() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(TaskError::from_join(err), TaskError::Panicked("boom".to_string()));
    }

    #[tokio::test]
    async fn test_formatted_panic_payload_is_captured() {
        let id = 7;
        let err = tokio::spawn(async move { panic!("item {id} exploded") })
            .await
            .unwrap_err();
        assert_eq!(
            TaskError::from_join(err),
            TaskError::Panicked("item 7 exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_aborted_task_maps_to_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let err = handle.await.unwrap_err();
        assert_eq!(TaskError::from_join(err), TaskError::Cancelled);
    }

    #[test]
    fn test_load_error_message() {
        let err = DocumentError::Load {
            path: PathBuf::from("missing.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("I/O error reading missing.txt"));
        assert!(msg.contains("no such file"));
    }
}
