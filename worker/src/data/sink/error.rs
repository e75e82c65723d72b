//! Sink error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Sink unreachable at {addr}: {source}")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to forward record: {0}")]
    Write(#[from] std::io::Error),

    #[error("Forwarding aborted after {failed} failed records")]
    ThresholdExceeded { failed: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_error_display() {
        let err = SinkError::Unreachable {
            addr: "splunk.local:9500".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(
            err.to_string(),
            "Sink unreachable at splunk.local:9500: refused"
        );
    }

    #[test]
    fn test_threshold_error_display() {
        let err = SinkError::ThresholdExceeded { failed: 10 };
        assert_eq!(err.to_string(), "Forwarding aborted after 10 failed records");
    }
}
