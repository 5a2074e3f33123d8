//! Multicast channel that carries transmission frames to the emulated network.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};

use jammer_core::{Delivery, TransmissionEmitter, TransmissionEvent};
use tokio::net::UdpSocket;
use tracing::warn;

use crate::config::OtaChannelConfig;
use crate::frame;

/// Fire-and-forget UDP multicast sender.
pub struct MulticastChannel {
    socket: UdpSocket,
    target: SocketAddrV4,
    buffer: Vec<u8>,
    sent: u64,
    dropped: u64,
}

impl MulticastChannel {
    /// Binds a sending socket on the configured device and applies multicast options.
    pub async fn open(config: &OtaChannelConfig) -> io::Result<Self> {
        let local = SocketAddrV4::new(config.device.unwrap_or(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpSocket::bind(local).await?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_multicast_loop_v4(config.loopback)?;

        Ok(Self {
            socket,
            target: config.target(),
            buffer: Vec::new(),
            sent: 0,
            dropped: 0,
        })
    }

    pub fn target(&self) -> SocketAddrV4 {
        self.target
    }

    /// Frames handed to the socket.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Frames the socket refused.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TransmissionEmitter for MulticastChannel {
    fn emit(&mut self, event: &TransmissionEvent<'_>) -> Delivery {
        frame::encode(event, &mut self.buffer);

        match self.socket.try_send_to(&self.buffer, self.target.into()) {
            Ok(_) => {
                self.sent += 1;
                Delivery::Sent
            }
            Err(error) => {
                self.dropped += 1;
                warn!(
                    sequence = event.transmission_sequence,
                    target = %self.target,
                    %error,
                    "multicast send failed, dropping transmission"
                );
                Delivery::Dropped
            }
        }
    }
}
