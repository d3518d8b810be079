use thiserror::Error;

/// Result type for rate limiting operations
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Errors raised by rate limiter construction and calls
///
/// Running out of capacity is not an error: it is reported as
/// [`AcquireResult::Rejected`](crate::AcquireResult::Rejected).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Construction parameters are non-positive or inconsistent. No limiter is created.
    #[error("Invalid rate limiter construction: {0}")]
    InvalidConstruction(&'static str),

    /// Per-call argument is out of range. The call had no side effect.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(RateLimitError::InvalidArgument("permits must be positive").to_string(), "Invalid argument: permits must be positive");
        assert_eq!(
            RateLimitError::InvalidConstruction("rate must be positive").to_string(),
            "Invalid rate limiter construction: rate must be positive"
        );
    }
}
