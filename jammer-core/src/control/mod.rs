//! Control request surface shared by every host.
//!
//! Request lines are decoded by [`grammar`] into a [`request::ControlRequest`],
//! validated into a [`crate::command::Command`], and answered with a
//! [`response::ControlResponse`].

pub mod grammar;
pub mod request;
pub mod response;

pub use grammar::{ParseError, parse};
pub use request::{ControlRequest, MalformedRequest, RequestKind};
pub use response::ControlResponse;
