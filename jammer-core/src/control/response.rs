//! Control responses and their text encoding.

use core::fmt::{self, Write as _};

use heapless::String;

/// Longest description carried in a response; longer text is truncated.
pub const MAX_DESCRIPTION: usize = 160;

/// Reply sent for every control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlResponse {
    pub success: bool,
    pub description: Option<String<MAX_DESCRIPTION>>,
}

impl ControlResponse {
    /// Successful reply without a description.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            description: None,
        }
    }

    /// Failed reply carrying `description`.
    #[must_use]
    pub fn failure(description: &str) -> Self {
        Self::failure_fmt(format_args!("{description}"))
    }

    /// Failed reply for a request line that could not be decoded.
    #[must_use]
    pub fn syntax_error(error: &impl fmt::Display) -> Self {
        Self::failure_fmt(format_args!("syntax {error}"))
    }

    fn failure_fmt(args: fmt::Arguments<'_>) -> Self {
        let mut writer = TruncatingWriter(String::new());
        // The writer never reports an error.
        let _ = writer.write_fmt(args);
        Self {
            success: false,
            description: Some(writer.0),
        }
    }
}

impl fmt::Display for ControlResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.success, self.description.as_deref()) {
            (true, None) => f.write_str("OK"),
            (true, Some(description)) => write!(f, "OK {description}"),
            (false, None) => f.write_str("ERR"),
            (false, Some(description)) => write!(f, "ERR {description}"),
        }
    }
}

struct TruncatingWriter(String<MAX_DESCRIPTION>);

impl fmt::Write for TruncatingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if ch == '\n' || ch == '\r' {
                continue;
            }
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}
