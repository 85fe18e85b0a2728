use thiserror::Error;

/// Why a renewal was refused. Nothing is written to the store in any of these cases.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenewalError {
    #[error("billing end date {0:?} is not a YYYY-MM-DD date")]
    InvalidDate(String),
    #[error("billing cycle {0:?} has no renewable length")]
    UnsupportedCycle(String),
    #[error("record {id} cannot be renewed: {reason}")]
    InvalidState { id: i64, reason: String },
    #[error("record {0} not found")]
    RecordNotFound(i64),
    #[error("record store error: {0}")]
    Storage(String),
}

impl RenewalError {
    /// Stable tag for API payloads and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RenewalError::InvalidDate(_) => "invalid_date",
            RenewalError::UnsupportedCycle(_) => "unsupported_cycle",
            RenewalError::InvalidState { .. } => "invalid_state",
            RenewalError::RecordNotFound(_) => "record_not_found",
            RenewalError::Storage(_) => "storage",
        }
    }
}

impl From<anyhow::Error> for RenewalError {
    fn from(err: anyhow::Error) -> Self {
        RenewalError::Storage(format!("{:#}", err))
    }
}
