use crate::service::ServiceError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid geometry: {what}")]
    InvalidGeometry { what: String },
    #[error("expected {expected} pieces, service returned {found}")]
    CountMismatch { expected: usize, found: usize },
    #[error("placement is missing {} of {expected} pieces", missing.len())]
    IncompletePlacement { expected: usize, missing: Vec<String> },
    #[error("frame for run {generation} ignored, current run is {current}")]
    StaleRunIgnored { generation: u64, current: u64 },
    #[error("unknown piece identifier: {id}")]
    UnknownPiece { id: String },
    #[error("piece identifier listed twice: {id}")]
    DuplicatePiece { id: String },
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl EngineError {
    pub(crate) fn geometry(what: impl Into<String>) -> Self {
        EngineError::InvalidGeometry { what: what.into() }
    }
}
