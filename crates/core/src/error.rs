use thiserror::Error;

pub type LookupResult<T> = Result<T, LookupError>;

/// Terminal outcome of a failed profile lookup.
///
/// Cloneable so a single upstream failure can be handed to every caller
/// whose request rode in the same batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Steam API request failed: {0}")]
    Upstream(String),

    #[error("No Steam profile found for {0}")]
    NotFound(String),

    #[error("Lookup cancelled by caller")]
    Cancelled,

    #[error("Lookup deadline exceeded")]
    DeadlineExceeded,

    #[error("Summary batcher shut down before the lookup completed")]
    Shutdown,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LookupError {
    /// True when the caller gave up, as opposed to the lookup itself failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LookupError::Cancelled | LookupError::DeadlineExceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_kinds() {
        assert!(LookupError::Cancelled.is_cancellation());
        assert!(LookupError::DeadlineExceeded.is_cancellation());
        assert!(!LookupError::Shutdown.is_cancellation());
        assert!(!LookupError::NotFound("76561197960265729".into()).is_cancellation());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = LookupError::Upstream("steam api returned 503".into());
        assert_eq!(err.to_string(), "Steam API request failed: steam api returned 503");
    }
}
