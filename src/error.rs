//! Error types shared across the crate.

use std::fmt;
use std::time::Duration;

/// Result type for vibium operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a browser.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport ended with an orderly shutdown.
    #[error("transport closed")]
    TransportClosed,

    /// The transport failed abnormally.
    #[error("transport error: {0}")]
    TransportIo(String),

    /// The browser answered a command with `type: "error"`.
    #[error("{error}: {message}")]
    Bidi { error: String, message: String },

    /// A DOM query matched nothing.
    #[error("element not found")]
    ElementNotFound,

    /// A wait exhausted its deadline.
    #[error("{0}")]
    Timeout(TimeoutError),

    /// An in-flight command hit the absolute response cap.
    #[error("timeout waiting for response to {0}")]
    CommandTimeout(String),

    /// The operation raced a session that is shutting down.
    #[error("session closed")]
    SessionClosed,

    /// The browser reported no open browsing contexts.
    #[error("no browsing contexts available")]
    NoContext,

    /// A frame or script result did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("launch error: {0}")]
    Launch(String),

    #[error("install error: {0}")]
    Install(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Deadline failure raised by the waiter, carrying the last observed reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutError {
    pub selector: String,
    pub timeout: Duration,
    pub reason: String,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeout after {} waiting for '{}'",
            format_duration(self.timeout),
            self.selector
        )?;
        if !self.reason.is_empty() {
            write!(f, ": {}", self.reason)?;
        }
        Ok(())
    }
}

/// Renders whole seconds as `Ns`, anything finer as `Nms`.
fn format_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 && d.as_secs() > 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_formats_millis() {
        let err = TimeoutError {
            selector: "#missing".into(),
            timeout: Duration::from_millis(500),
            reason: "element not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "timeout after 500ms waiting for '#missing': element not found"
        );
    }

    #[test]
    fn timeout_error_formats_whole_seconds() {
        let err = TimeoutError {
            selector: "input".into(),
            timeout: Duration::from_secs(30),
            reason: "check 'Editable' failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "timeout after 30s waiting for 'input': check 'Editable' failed"
        );
    }

    #[test]
    fn timeout_error_without_reason() {
        let err = TimeoutError {
            selector: "a".into(),
            timeout: Duration::from_secs(5),
            reason: String::new(),
        };
        assert_eq!(err.to_string(), "timeout after 5s waiting for 'a'");
    }
}
