use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("zone lock poisoned: {0}")]
    ZoneLock(String),
    #[error("unknown zone: {0}")]
    UnknownZone(String),
}

/// Why a reading was refused. Every variant is terminal for that reading only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MalformedPayload,
    UnmappedSensor,
    StaleReading,
    InvalidValue,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::UnmappedSensor => "unmapped_sensor",
            RejectReason::StaleReading => "stale_reading",
            RejectReason::InvalidValue => "invalid_value",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {detail}")]
pub struct Rejection {
    pub reason: RejectReason,
    pub detail: String,
}

/// Failure of a write into the pipeline: either the caller's reading was refused,
/// or the service itself could not complete the write.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Internal(#[from] AppError),
}

impl IngestError {
    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            IngestError::Rejected(rejection) => Some(rejection.reason),
            IngestError::Internal(_) => None,
        }
    }
}

impl Rejection {
    pub fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(RejectReason::MalformedPayload, detail)
    }

    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(RejectReason::InvalidValue, detail)
    }
}
