use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Invalid company input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No detailed financials available for fiscal year {year}")]
    MissingFinancials { year: i32 },

    #[error("Document type {0} is not rendered locally")]
    NotLocal(String),

    #[error("Document type {0} is not generated through the LLM")]
    NotHeavy(String),

    #[error("No API key found (checked: {0})")]
    MissingCredential(String),

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("Could not parse LLM response: {0}")]
    Parse(String),

    #[error("Accounting identity violation in {year}: Assets ({assets}) != Liabilities ({liabilities}) + Net Assets ({net_assets})")]
    AccountingIdentityViolation {
        year: i32,
        assets: f64,
        liabilities: f64,
        net_assets: f64,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
