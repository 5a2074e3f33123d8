//! Decoded control requests and their validation into commands.

use core::fmt;

use crate::command::{Command, OnParameters};

/// Kind tag carried by a request line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestKind {
    On,
    Off,
}

impl RequestKind {
    const KEYWORDS: [(&'static str, RequestKind); 4] = [
        ("on", RequestKind::On),
        ("off", RequestKind::Off),
        ("command_on", RequestKind::On),
        ("command_off", RequestKind::Off),
    ];

    /// Resolves a request keyword, ignoring ASCII case.
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::KEYWORDS
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(keyword))
            .map(|(_, kind)| *kind)
    }
}

/// Request as it arrives on the wire. Kind and payload are independent here.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlRequest {
    pub kind: RequestKind,
    pub on: Option<OnParameters>,
}

impl ControlRequest {
    #[must_use]
    pub const fn on(parameters: OnParameters) -> Self {
        Self {
            kind: RequestKind::On,
            on: Some(parameters),
        }
    }

    #[must_use]
    pub const fn off() -> Self {
        Self {
            kind: RequestKind::Off,
            on: None,
        }
    }

    /// Converts the request into a [`Command`], rejecting kind/payload mismatches.
    pub fn into_command(self) -> Result<Command, MalformedRequest> {
        match (self.kind, self.on) {
            (RequestKind::On, Some(parameters)) => Ok(Command::On(parameters)),
            (RequestKind::On, None) => Err(MalformedRequest::OnMissingPayload),
            (RequestKind::Off, None) => Ok(Command::Off),
            (RequestKind::Off, Some(_)) => Err(MalformedRequest::OffWithPayload),
        }
    }
}

/// Wire combinations that decode but cannot become a [`Command`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MalformedRequest {
    OnMissingPayload,
    OffWithPayload,
}

impl MalformedRequest {
    /// Description returned to the client.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            MalformedRequest::OnMissingPayload => "malformed on request missing on payload",
            MalformedRequest::OffWithPayload => "malformed off request has on payload",
        }
    }
}

impl fmt::Display for MalformedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}
