//! WebSocket transport
//!
//! The connection loop only sees [`Socket`]s produced by a [`Connector`], a stream of received
//! [`Frame`]s and a sink of frames to send. [`WsConnector`] dials a real NT4 server,
//! [`MemoryConnector`] connects to an in-process peer.
//!
//! [`Socket`]: ./trait.Socket.html
//! [`Connector`]: ./trait.Connector.html
//! [`Frame`]: ../../nt4_proto/enum.Frame.html
//! [`WsConnector`]: ./struct.WsConnector.html
//! [`MemoryConnector`]: ./memory/struct.MemoryConnector.html

use crate::error::{Error, Result};
use async_tungstenite::async_std::{connect_async, ConnectStream};
use async_tungstenite::tungstenite::client::IntoClientRequest;
use async_tungstenite::tungstenite::http::HeaderValue;
use async_tungstenite::tungstenite::Message;
use async_tungstenite::WebSocketStream;
use futures::future::BoxFuture;
use futures::prelude::*;
use proto::prelude::Frame;
use std::pin::Pin;
use std::task::{Context, Poll};

pub mod memory;
pub use memory::{memory_pair, MemoryConnector, MemoryPeer, MemoryServer};

/// Subprotocols offered to the server, newest revision first
pub const SUBPROTOCOLS: &str = "v4.1.networktables.first.wpi.edu, networktables.first.wpi.edu";

/// A connected, frame oriented socket
pub trait Socket: Stream<Item = Result<Frame>> + Sink<Frame, Error = Error> + Send + Unpin {}

impl<T> Socket for T where
    T: Stream<Item = Result<Frame>> + Sink<Frame, Error = Error> + Send + Unpin
{
}

pub type BoxSocket = Box<dyn Socket>;

/// Opens connections for the connection loop
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxSocket>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<BoxSocket>> {
        let url = url.to_string();
        async move {
            let mut request = url.as_str().into_client_request()?;
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOLS));

            let (sock, response) = connect_async(request).await?;
            let protocol = response
                .headers()
                .get("Sec-WebSocket-Protocol")
                .and_then(|value| value.to_str().ok())
                .unwrap_or("none");
            log::debug!("WebSocket open to {} using subprotocol {}", url, protocol);

            Ok(Box::new(NTSocket::new(sock)) as BoxSocket)
        }
        .boxed()
    }
}

pub struct NTSocket {
    sock: WebSocketStream<ConnectStream>,
}

impl NTSocket {
    pub fn new(sock: WebSocketStream<ConnectStream>) -> NTSocket {
        NTSocket { sock }
    }
}

impl Stream for NTSocket {
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match futures::ready!(Stream::poll_next(Pin::new(&mut self.sock), cx)) {
                Some(Ok(Message::Text(text))) => return Poll::Ready(Some(Ok(Frame::Text(text)))),
                Some(Ok(Message::Binary(blob))) => {
                    return Poll::Ready(Some(Ok(Frame::Binary(blob))))
                }
                Some(Ok(Message::Close(reason))) => {
                    log::debug!("Server closed the connection: {:?}", reason);
                    return Poll::Ready(None);
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Poll::Ready(Some(Err(e.into()))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl Sink<Frame> for NTSocket {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_ready(Pin::new(&mut self.sock), cx).map_err(Into::into)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Frame) -> Result<()> {
        let msg = match item {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(blob) => Message::Binary(blob),
        };
        Sink::start_send(Pin::new(&mut self.sock), msg).map_err(Into::into)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_flush(Pin::new(&mut self.sock), cx).map_err(Into::into)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Sink::poll_close(Pin::new(&mut self.sock), cx).map_err(Into::into)
    }
}
