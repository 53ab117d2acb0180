use crate::config::ClientConfig;
use crate::entry::Topic;
use crate::error::Result;
use crate::net::{Connector, WsConnector};
use crate::registry::{
    deliver_all, FlagCallback, ListenerId, Notification, Pattern, Signal, TopicCallback,
};
use crate::state::ClientState;
use crate::status::{RobotState, TransportState};
use async_std::channel::{bounded, unbounded, Sender};
use async_std::task::{self, JoinHandle};
use parking_lot::{Mutex, ReentrantMutex};
use proto::prelude::{NTValue, PropertyMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

mod loop_;
use loop_::connection_loop;

/// State shared between the client handle, its bindings and the connection loop
///
/// `dispatch` is always taken before `state`. Notifications are collected under both locks
/// and delivered once `state` is released, so callbacks may call back into the client,
/// while deliveries from different threads never interleave.
pub(crate) struct Shared {
    dispatch: ReentrantMutex<()>,
    state: Mutex<ClientState>,
    shutdown: Sender<()>,
}

impl Shared {
    pub(crate) fn apply<R>(&self, f: impl FnOnce(&mut ClientState) -> (R, Vec<Notification>)) -> R {
        let _dispatch = self.dispatch.lock();
        let (result, notifications) = f(&mut self.state.lock());
        deliver_all(notifications);
        result
    }

    pub(crate) fn notify(&self, f: impl FnOnce(&mut ClientState) -> Vec<Notification>) {
        self.apply(|state| ((), f(state)))
    }

    pub(crate) fn try_notify(
        &self,
        f: impl FnOnce(&mut ClientState) -> Result<Vec<Notification>>,
    ) -> Result<()> {
        self.apply(|state| match f(state) {
            Ok(notifications) => (Ok(()), notifications),
            Err(e) => (Err(e), vec![]),
        })
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&ClientState) -> R) -> R {
        f(&self.state.lock())
    }

    pub(crate) fn set(&self, path: &str, value: NTValue) -> Result<()> {
        self.try_notify(|state| state.set(path, value, Instant::now()))
    }

    fn unsubscribe(&self, id: ListenerId) {
        let removed = self.apply(|state| (state.unsubscribe(id), vec![]));
        // the callback is dropped here, with no lock held
        drop(removed);
    }
}

/// Handle to a listener registered on an [`NTClient`]
///
/// The listener is removed by [`unsubscribe`] or when the handle is dropped. Once either returns,
/// the callback will not run again.
///
/// [`NTClient`]: ./struct.NTClient.html
/// [`unsubscribe`]: #method.unsubscribe
pub struct Subscription {
    shared: Weak<Shared>,
    id: ListenerId,
    done: AtomicBool,
}

impl Subscription {
    fn new(shared: &Arc<Shared>, id: ListenerId) -> Subscription {
        Subscription {
            shared: Arc::downgrade(shared),
            id,
            done: AtomicBool::new(false),
        }
    }

    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// A NetworkTables 4 client
///
/// The client keeps a live copy of every topic it subscribed to, and keeps reconnecting to the
/// server until it is closed. All methods return immediately; network IO happens on a task
/// spawned by [`create`].
///
/// [`create`]: #method.create
pub struct NTClient {
    shared: Arc<Shared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl NTClient {
    /// Connects to the server described by `config` over WebSocket
    pub fn create(config: ClientConfig) -> Result<NTClient> {
        NTClient::with_connector(config, WsConnector)
    }

    pub fn with_connector(config: ClientConfig, connector: impl Connector) -> Result<NTClient> {
        config.validate()?;

        let (outbound_tx, outbound_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let shared = Arc::new(Shared {
            dispatch: ReentrantMutex::new(()),
            state: Mutex::new(ClientState::new(config, outbound_tx, Instant::now())),
            shutdown: shutdown_tx,
        });

        let driver = task::spawn(connection_loop(
            shared.clone(),
            Box::new(connector),
            outbound_rx,
            shutdown_rx,
        ));

        Ok(NTClient {
            shared,
            driver: Mutex::new(Some(driver)),
        })
    }

    pub(crate) fn shared(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    fn listen(&self, pattern: Pattern, callback: TopicCallback) -> Subscription {
        let id = self
            .shared
            .apply(|state| state.subscribe(pattern, callback));
        Subscription::new(&self.shared, id)
    }

    /// Calls `callback` with the value of `path` now, and again whenever it changes.
    /// `None` means the topic is absent.
    pub fn subscribe<F>(&self, path: &str, callback: F) -> Subscription
    where
        F: Fn(&str, Option<&NTValue>) + Send + Sync + 'static,
    {
        self.listen(Pattern::Exact(path.to_string()), Arc::new(callback))
    }

    /// Like [`subscribe`], for every topic whose path starts with `prefix`
    ///
    /// [`subscribe`]: #method.subscribe
    pub fn subscribe_prefix<F>(&self, prefix: &str, callback: F) -> Subscription
    where
        F: Fn(&str, Option<&NTValue>) + Send + Sync + 'static,
    {
        self.listen(Pattern::Prefix(prefix.to_string()), Arc::new(callback))
    }

    /// Subscribes to `pattern`, passing `default` to `callback` whenever a matching topic is absent
    pub fn subscribe_with_default<F>(
        &self,
        pattern: Pattern,
        default: NTValue,
        callback: F,
    ) -> Subscription
    where
        F: Fn(&str, &NTValue) + Send + Sync + 'static,
    {
        self.listen(
            pattern,
            Arc::new(move |name: &str, value: Option<&NTValue>| {
                callback(name, value.unwrap_or(&default))
            }),
        )
    }

    fn watch(&self, signal: Signal, callback: FlagCallback) -> Subscription {
        let id = self.shared.apply(|state| state.watch(signal, callback));
        Subscription::new(&self.shared, id)
    }

    pub fn watch_connection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.watch(Signal::Transport, Arc::new(callback))
    }

    pub fn watch_robot<F>(&self, callback: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.watch(Signal::Robot, Arc::new(callback))
    }

    pub fn get(&self, path: &str) -> Option<NTValue> {
        self.shared.read(|state| state.get(path))
    }

    pub fn topic(&self, path: &str) -> Option<Topic> {
        self.shared.read(|state| state.topic(path))
    }

    /// Paths of every announced topic, sorted
    pub fn topics(&self) -> Vec<String> {
        self.shared.read(ClientState::topics)
    }

    /// Writes `value` to `path`
    ///
    /// Fails with [`Error::NotConnected`] while the handshake with the server is not complete,
    /// and with [`Error::TypeMismatch`] when the topic has another type. Nothing is sent in either case.
    ///
    /// [`Error::NotConnected`]: ./enum.Error.html#variant.NotConnected
    /// [`Error::TypeMismatch`]: ./enum.Error.html#variant.TypeMismatch
    pub fn set(&self, path: &str, value: NTValue) -> Result<()> {
        self.shared.set(path, value)
    }

    pub fn unpublish(&self, path: &str) -> Result<()> {
        self.shared.apply(|state| (state.unpublish(path), vec![]))
    }

    pub fn set_properties(&self, path: &str, update: PropertyMap) -> Result<()> {
        self.shared
            .apply(|state| (state.set_properties(path, update), vec![]))
    }

    pub fn is_connected(&self) -> bool {
        self.shared.read(ClientState::is_connected)
    }

    pub fn is_robot_connected(&self) -> bool {
        self.shared.read(ClientState::is_robot_connected)
    }

    pub fn transport_state(&self) -> TransportState {
        self.shared.read(ClientState::transport_state)
    }

    pub fn robot_state(&self) -> RobotState {
        self.shared.read(ClientState::robot_state)
    }

    /// Estimated offset between the server clock and this client's, in microseconds
    pub fn clock_offset(&self) -> Option<i64> {
        self.shared.read(ClientState::clock_offset)
    }

    /// Disconnects and stops reconnecting. Further writes fail with [`Error::Closed`].
    ///
    /// [`Error::Closed`]: ./enum.Error.html#variant.Closed
    pub fn close(&self) {
        if self.shared.read(ClientState::is_closed) {
            return;
        }
        log::info!("Closing NetworkTables client");
        self.shared.notify(ClientState::close);
        self.shared.shutdown.close();
    }

    /// Closes the client and waits for its connection task to finish
    pub async fn dispose(self) {
        self.close();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            driver.await;
        }
    }
}

impl Drop for NTClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for NTClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NTClient")
            .field("transport", &self.transport_state())
            .field("robot", &self.robot_state())
            .finish()
    }
}
