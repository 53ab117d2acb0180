//! # The connection loop of the NT4 client
//!
//! [`connection_loop`] is spawned once per client and owns the socket. It dials the server, runs a
//! session until the socket fails or closes, and dials again after an exponential backoff,
//! until the client is closed.
//!
//! A session merges four event sources: frames from the server, frames queued by the client state,
//! a timer tick driving the handshake and heartbeat timeouts, and the shutdown signal.
//!
//! [`connection_loop`]: ./fn.connection_loop.html

use crate::backoff::Backoff;
use crate::client::Shared;
use crate::error::Result;
use crate::net::{BoxSocket, Connector};
use crate::state::ClientState;
use async_std::channel::Receiver;
use async_std::task;
use futures::future::{self, Either};
use futures::prelude::*;
use futures::stream;
use proto::prelude::Frame;
use std::sync::Arc;
use std::time::{Duration, Instant};

enum Event {
    Inbound(Result<Frame>),
    /// The server closed the socket
    Eof,
    Outbound(Frame),
    Tick,
    Shutdown,
}

pub(crate) async fn connection_loop(
    shared: Arc<Shared>,
    connector: Box<dyn Connector>,
    outbound: Receiver<Frame>,
    shutdown: Receiver<()>,
) {
    let config = shared.read(|state| state.config().clone());
    let url = config.server_url();
    let mut backoff = Backoff::new(config.reconnect.clone());

    loop {
        if shared.read(ClientState::is_closed) {
            break;
        }
        shared.notify(ClientState::on_dial);
        log::info!("Connecting to {}", url);

        let dial = future::select(connector.connect(&url), Box::pin(shutdown.recv())).await;
        match dial {
            Either::Left((Ok(socket), _)) => {
                log::info!("Connected to {}", url);
                backoff.reset();
                run_session(&shared, socket, &outbound, &shutdown, config.tick_interval).await;
                shared.notify(ClientState::on_close);
            }
            Either::Left((Err(e), _)) => log::warn!("Could not connect to {}: {}", url, e),
            Either::Right(_) => break,
        }

        if shared.read(ClientState::is_closed) {
            break;
        }
        let delay = backoff.next_delay();
        log::info!(
            "Reconnecting in {:?} (attempt {})",
            delay,
            backoff.attempt()
        );
        shared.notify(ClientState::on_dial);

        let wait = future::select(Box::pin(task::sleep(delay)), Box::pin(shutdown.recv())).await;
        if let Either::Right(_) = wait {
            break;
        }
    }

    shared.notify(ClientState::close);
    log::info!("Connection loop for {} stopped", url);
}

async fn run_session(
    shared: &Arc<Shared>,
    socket: BoxSocket,
    outbound: &Receiver<Frame>,
    shutdown: &Receiver<()>,
    tick: Duration,
) {
    let (mut sink, stream) = socket.split();

    // Anything queued before this session belongs to a dead connection
    let mut stale = 0;
    while outbound.try_recv().is_ok() {
        stale += 1;
    }
    if stale > 0 {
        log::debug!("Discarded {} frames queued while disconnected", stale);
    }

    shared.notify(|state| state.on_open(Instant::now()));

    let inbound = stream
        .map(Event::Inbound)
        .chain(stream::once(future::ready(Event::Eof)));
    let queued = outbound
        .clone()
        .map(Event::Outbound)
        .chain(stream::once(future::ready(Event::Shutdown)));
    let ticks = stream::unfold((), move |_| async move {
        task::sleep(tick).await;
        Some((Event::Tick, ()))
    });
    let stop = shutdown
        .clone()
        .map(|_| Event::Shutdown)
        .chain(stream::once(future::ready(Event::Shutdown)));

    let mut events = stream::select_all(vec![
        inbound.boxed(),
        queued.boxed(),
        ticks.boxed(),
        stop.boxed(),
    ]);

    while let Some(event) = events.next().await {
        match event {
            Event::Inbound(Ok(frame)) => {
                shared.notify(|state| state.on_frame(&frame, Instant::now()))
            }
            Event::Inbound(Err(e)) => {
                log::warn!("Connection lost: {}", e);
                break;
            }
            Event::Eof => {
                log::info!("Server closed the connection");
                break;
            }
            Event::Outbound(frame) => {
                if let Err(e) = sink.send(frame).await {
                    log::warn!("Failed to send frame: {}", e);
                    break;
                }
            }
            Event::Tick => shared.notify(|state| state.tick(Instant::now())),
            Event::Shutdown => {
                if let Err(e) = sink.close().await {
                    log::debug!("Error while closing the socket: {}", e);
                }
                break;
            }
        }
    }
}
