#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: &'static str, value: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
