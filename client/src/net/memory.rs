//! In-process transport
//!
//! [`memory_pair`] returns a connector for an [`NTClient`] and the server end it connects to.
//! Each successful dial hands the server a [`MemoryPeer`], which plays the NT4 server for
//! that one connection. Dropping the peer closes the connection.
//!
//! [`memory_pair`]: ./fn.memory_pair.html
//! [`NTClient`]: ../../struct.NTClient.html
//! [`MemoryPeer`]: ./struct.MemoryPeer.html

use super::{BoxSocket, Connector};
use crate::error::{Error, Result};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::BoxFuture;
use futures::prelude::*;
use proto::prelude::{Frame, NTMessage};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (tx, rx) = unbounded();
    let refusing = Arc::new(AtomicBool::new(false));
    let attempts = Arc::new(AtomicUsize::new(0));
    (
        MemoryConnector {
            incoming: tx,
            refusing: refusing.clone(),
            attempts: attempts.clone(),
        },
        MemoryServer {
            incoming: rx,
            refusing,
            attempts,
        },
    )
}

#[derive(Clone)]
pub struct MemoryConnector {
    incoming: UnboundedSender<MemoryPeer>,
    refusing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxSocket>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.refusing.load(Ordering::SeqCst) {
            Err(Error::Connection(format!("{} refused the connection", url)))
        } else {
            let (to_server, from_client) = unbounded();
            let (to_client, from_server) = unbounded();
            let peer = MemoryPeer {
                url: url.to_string(),
                tx: to_client,
                rx: from_client,
            };
            match self.incoming.unbounded_send(peer) {
                Ok(()) => Ok(Box::new(MemorySocket {
                    tx: to_server,
                    rx: from_server,
                }) as BoxSocket),
                Err(_) => Err(Error::Connection(format!("{} is gone", url))),
            }
        };
        future::ready(result).boxed()
    }
}

pub struct MemoryServer {
    incoming: UnboundedReceiver<MemoryPeer>,
    refusing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryServer {
    /// Waits for the next client connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.next().await
    }

    /// Makes further connection attempts fail, as if the server were down
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

/// The server side of one in-process connection
pub struct MemoryPeer {
    url: String,
    tx: UnboundedSender<Frame>,
    rx: UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn send(&self, msg: &NTMessage) -> Result<()> {
        let frame = msg.encode()?;
        self.send_frame(frame)
    }

    pub fn send_frame(&self, frame: Frame) -> Result<()> {
        self.tx
            .unbounded_send(frame)
            .map_err(|_| Error::Connection("client closed the connection".to_string()))
    }

    /// Next frame from the client, `None` once the client closed the connection
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.next().await
    }

    /// Next decodable message from the client
    pub async fn recv_message(&mut self) -> Option<NTMessage> {
        while let Some(frame) = self.rx.next().await {
            match NTMessage::decode(&frame) {
                Ok(msg) => return Some(msg),
                Err(e) => log::warn!("Memory peer received an undecodable frame: {}", e),
            }
        }
        None
    }
}

struct MemorySocket {
    tx: UnboundedSender<Frame>,
    rx: UnboundedReceiver<Frame>,
}

impl Stream for MemorySocket {
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx).map(|frame| frame.map(Ok))
    }
}

fn peer_gone<E>(_: E) -> Error {
    Error::Connection("memory peer closed the connection".to_string())
}

impl Sink<Frame> for MemorySocket {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_ready(Pin::new(&mut self.tx), cx).map_err(peer_gone)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<()> {
        Sink::start_send(Pin::new(&mut self.tx), item).map_err(peer_gone)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_flush(Pin::new(&mut self.tx), cx).map_err(peer_gone)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_close(Pin::new(&mut self.tx), cx).map_err(peer_gone)
    }
}
