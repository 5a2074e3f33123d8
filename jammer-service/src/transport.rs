//! Line-oriented TCP control transport.
//!
//! Each connection is served by its own task. A connection sends one request
//! line, waits for the reply, then reads the next line; requests from all
//! connections are funnelled into a single queue consumed by the event loop.
//! Lines that are not UTF-8 are answered here. A line longer than
//! [`MAX_LINE_LEN`] is answered and the connection is closed.

use std::io;
use std::net::SocketAddr;

use jammer_core::control::ControlResponse;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Depth of the queue between connection tasks and the event loop.
pub const REQUEST_QUEUE_DEPTH: usize = 16;

/// Longest request line accepted, excluding the line terminator.
pub const MAX_LINE_LEN: usize = 1024;

/// One request line and the slot its reply goes to.
#[derive(Debug)]
pub struct RequestLine {
    pub peer: SocketAddr,
    pub line: String,
    pub reply: oneshot::Sender<String>,
}

/// Accepts control connections until the task is aborted.
pub fn spawn_listener(listener: TcpListener, requests: mpsc::Sender<RequestLine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "control client connected");
                    tokio::spawn(serve_connection(stream, peer, requests.clone()));
                }
                Err(error) => warn!(%error, "failed to accept control connection"),
            }
        }
    })
}

enum Inbound {
    Line(String),
    NotUtf8,
    TooLong,
    Closed,
}

async fn next_line<R>(reader: &mut R, buffer: &mut Vec<u8>) -> io::Result<Inbound>
where
    R: AsyncBufRead + Unpin,
{
    buffer.clear();
    let limit = u64::try_from(MAX_LINE_LEN + 1).unwrap_or(u64::MAX);
    let read = (&mut *reader).take(limit).read_until(b'\n', buffer).await?;
    if read == 0 {
        return Ok(Inbound::Closed);
    }

    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    } else if buffer.len() > MAX_LINE_LEN {
        return Ok(Inbound::TooLong);
    }

    Ok(match String::from_utf8(std::mem::take(buffer)) {
        Ok(line) => Inbound::Line(line),
        Err(_) => Inbound::NotUtf8,
    })
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, requests: mpsc::Sender<RequestLine>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        let (mut response, last) = match next_line(&mut reader, &mut buffer).await {
            Ok(Inbound::Line(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let (reply, response) = oneshot::channel();
                if requests
                    .send(RequestLine { peer, line, reply })
                    .await
                    .is_err()
                {
                    debug!(%peer, "event loop gone, closing control connection");
                    break;
                }
                let Ok(response) = response.await else {
                    break;
                };
                (response, false)
            }
            Ok(Inbound::NotUtf8) => {
                warn!(%peer, "control request is not valid UTF-8");
                (syntax_reply("request is not valid UTF-8"), false)
            }
            Ok(Inbound::TooLong) => {
                warn!(%peer, limit = MAX_LINE_LEN, "control request too long, closing");
                (syntax_reply("request line is too long"), true)
            }
            Ok(Inbound::Closed) => break,
            Err(error) => {
                warn!(%peer, %error, "control read failed");
                break;
            }
        };

        response.push('\n');
        if let Err(error) = writer.write_all(response.as_bytes()).await {
            warn!(%peer, %error, "control write failed");
            break;
        }
        if last {
            break;
        }
    }

    info!(%peer, "control client disconnected");
}

fn syntax_reply(detail: &str) -> String {
    ControlResponse::syntax_error(&detail).to_string()
}
