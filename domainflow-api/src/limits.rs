use thiserror::Error;

pub const MIN_BATCH_SIZE: i32 = 1;
pub const MAX_BATCH_SIZE: i32 = 10_000;
pub const MIN_RETRY_ATTEMPTS: i32 = 0;
pub const MAX_RETRY_ATTEMPTS: i32 = 10;
pub const MAX_DOMAIN_NAME_LEN: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} out of range: {actual} (allowed {min}..={max})")]
    OutOfRange { field: &'static str, min: i64, max: i64, actual: i64 },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ValidationResult = Result<(), ValidationError>;

pub fn enforce_batch_size(batch_size: i32) -> ValidationResult {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(ValidationError::OutOfRange {
            field: "batch_size",
            min: MIN_BATCH_SIZE as i64,
            max: MAX_BATCH_SIZE as i64,
            actual: batch_size as i64,
        });
    }
    Ok(())
}

pub fn enforce_retry_attempts(retry_attempts: i32) -> ValidationResult {
    if !(MIN_RETRY_ATTEMPTS..=MAX_RETRY_ATTEMPTS).contains(&retry_attempts) {
        return Err(ValidationError::OutOfRange {
            field: "retry_attempts",
            min: MIN_RETRY_ATTEMPTS as i64,
            max: MAX_RETRY_ATTEMPTS as i64,
            actual: retry_attempts as i64,
        });
    }
    Ok(())
}

pub fn enforce_port(port: i32) -> ValidationResult {
    if !(1..=65_535).contains(&port) {
        return Err(ValidationError::OutOfRange {
            field: "target_http_ports",
            min: 1,
            max: 65_535,
            actual: port as i64,
        });
    }
    Ok(())
}

/// Lowercase hostname shape check used everywhere a domain name crosses the
/// boundary.
pub fn is_valid_domain(s: &str) -> bool {
    if s.is_empty() || s.len() > MAX_DOMAIN_NAME_LEN {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_bounds() {
        assert!(enforce_batch_size(1).is_ok());
        assert!(enforce_batch_size(10_000).is_ok());
        assert!(enforce_batch_size(0).is_err());
        assert!(enforce_batch_size(10_001).is_err());
    }

    #[test]
    fn retry_attempt_bounds() {
        assert!(enforce_retry_attempts(0).is_ok());
        assert!(enforce_retry_attempts(10).is_ok());
        assert!(enforce_retry_attempts(-1).is_err());
        assert!(enforce_retry_attempts(11).is_err());
    }

    #[test]
    fn port_bounds() {
        assert!(enforce_port(1).is_ok());
        assert!(enforce_port(65_535).is_ok());
        assert!(enforce_port(0).is_err());
        assert!(enforce_port(65_536).is_err());
    }

    #[test]
    fn domain_shape() {
        assert!(is_valid_domain("ax.com"));
        assert!(is_valid_domain("a-b.example.net"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("No.Caps"));
        assert!(!is_valid_domain("under_score.com"));
    }
}
