use std::fmt;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Lifecycle phase of the service.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Created,
    Initialized,
    Running,
    Stopped,
    Destroyed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Created => "created",
            Phase::Initialized => "initialized",
            Phase::Running => "running",
            Phase::Stopped => "stopped",
            Phase::Destroyed => "destroyed",
        })
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to bind control endpoint {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to open ota channel")]
    Channel(#[source] io::Error),
    #[error("control transport stopped unexpectedly")]
    TransportClosed,
    #[error("cannot {operation} while {phase}")]
    Lifecycle {
        operation: &'static str,
        phase: Phase,
    },
}
