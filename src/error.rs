use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid loan terms: {0}")]
    InvalidLoanTerms(String),

    #[error("Invalid override for '{target}': {details}")]
    InvalidOverride { target: String, details: String },

    #[error("Stage '{stage}' violated its contract: {details}")]
    StageContract { stage: String, details: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
