use crate::model::PriorityClass;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AllocError {
    /// Bad token, or batch parameters missing/unexpected for the target.
    InvalidRequest(String),
    /// No free basic-tier slot inside the search horizon.
    SchedulingExhausted(PriorityClass),
    LimitExceeded(&'static str),
    Store(StoreError),
}

impl std::fmt::Display for AllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            AllocError::SchedulingExhausted(class) => {
                write!(f, "no free {class} slot within the search horizon")
            }
            AllocError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            AllocError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for AllocError {
    fn from(e: StoreError) -> Self {
        AllocError::Store(e)
    }
}
