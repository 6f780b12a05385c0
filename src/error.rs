use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZoiError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Extraction error: {0}")]
    Extraction(String),
    #[error("Output error: {0}")]
    Output(String),
}
