use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlatError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job already exists: {0}")]
    JobExists(String),

    #[error("invalid job name '{0}': must start with a letter or '_' and contain only alphanumerics, '-' or '_'")]
    InvalidJobName(String),

    #[error("step {index} not found in job '{job}'")]
    StepNotFound { job: String, index: usize },

    #[error("invalid sql format '{0}': expected csv or json")]
    InvalidSqlFormat(String),

    #[error("document parse failed: {0}")]
    Parse(#[from] crate::deserialize::ParseFailure),

    #[error("session closed")]
    SessionClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlatError>;
