use thiserror::Error;

/// The external SDK never became available. Every caller waiting on the same
/// acquisition receives a clone of the same value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to acquire the SDK from {location}: {reason}")]
pub struct ShimAcquisitionError {
    pub location: String,
    pub reason:   String,
}

impl ShimAcquisitionError {
    pub fn new(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ShimAcquisitionError { location: location.into(), reason: reason.into() }
    }
}

/// `set_location` was called after acquisition started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the SDK location is locked to {current} once loading has started")]
pub struct LocationLocked {
    pub current: String,
}
