//! # The state of an NT4 client
//!
//! [`ClientState`] owns the topic store, the listener registry, the connection status and the
//! publishers of this client. It never blocks and never calls listeners itself: every event
//! (a frame, a timer tick, a socket opening or closing, an API call) returns the [`Notification`]s
//! it caused, and frames to send are pushed onto the outbound channel drained by the connection loop.
//!
//! Time is always passed in, which keeps the handshake, time synchronization and heartbeat logic testable.
//!
//! [`ClientState`]: ./struct.ClientState.html
//! [`Notification`]: ../registry/struct.Notification.html

use crate::config::{ClientConfig, WritePolicy};
use crate::entry::{Publisher, Topic};
use crate::error::{Error, Result};
use crate::registry::{
    FlagCallback, Listener, ListenerId, Notification, Pattern, Registry, Signal, TopicCallback,
};
use crate::status::{RobotState, StatusTracker, TransportState};
use crate::store::{TopicStore, UpdateOutcome};
use crate::util::{batch_messages, micros_since, MAX_BATCHING_SIZE};
use async_std::channel::Sender;
use proto::prelude::{
    Announce, Frame, MessageBody, MessageValue, NTBinaryMessage, NTMessage, NTTextMessage, NTValue,
    PropertyMap, PublishRel, PublishReq, SetProperties, TIMESYNC_ID,
};
use std::collections::HashMap;
use std::time::Instant;

pub struct ClientState {
    config: ClientConfig,
    store: TopicStore,
    registry: Registry,
    status: StatusTracker,
    publishers: HashMap<String, Publisher>,
    next_pubuid: i64,
    outbound: Sender<Frame>,
    epoch: Instant,
    session_open: bool,
    handshake_deadline: Option<Instant>,
    clock_offset: Option<i64>,
    last_timesync: Option<Instant>,
    closed: bool,
}

impl ClientState {
    pub fn new(config: ClientConfig, outbound: Sender<Frame>, epoch: Instant) -> ClientState {
        let mut registry = Registry::new();
        // Held for the lifetime of the client, replayed with the others on every connect
        registry
            .wire
            .acquire(&Pattern::Exact(config.heartbeat_topic.clone()));

        ClientState {
            status: StatusTracker::new(config.robot_timeout),
            config,
            store: TopicStore::new(),
            registry,
            publishers: HashMap::new(),
            next_pubuid: 0,
            outbound,
            epoch,
            session_open: false,
            handshake_deadline: None,
            clock_offset: None,
            last_timesync: None,
            closed: false,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn get(&self, path: &str) -> Option<NTValue> {
        self.store.value(path).cloned()
    }

    pub fn topic(&self, path: &str) -> Option<Topic> {
        self.store.get(path).cloned()
    }

    pub fn topics(&self) -> Vec<String> {
        self.store.names()
    }

    pub fn transport_state(&self) -> TransportState {
        self.status.transport()
    }

    pub fn robot_state(&self) -> RobotState {
        self.status.robot()
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected()
    }

    pub fn is_robot_connected(&self) -> bool {
        self.status.is_robot_connected()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Estimated offset of the server clock, in microseconds, once time has been synchronized
    pub fn clock_offset(&self) -> Option<i64> {
        self.clock_offset
    }

    /// Current time in the server's time base, or 0 ("now" for the server) before synchronization
    pub fn server_time(&self, now: Instant) -> u64 {
        match self.clock_offset {
            Some(offset) => (micros_since(self.epoch, now) as i64 + offset).max(0) as u64,
            None => 0,
        }
    }

    fn flags(&self) -> (bool, bool) {
        (self.status.is_connected(), self.status.is_robot_connected())
    }

    fn flag_notifications(&self, before: (bool, bool)) -> Vec<Notification> {
        let (connected, robot) = self.flags();
        let mut notifications = Vec::new();
        if before.0 != connected {
            notifications.extend(self.registry.flag_changed(Signal::Transport, connected));
        }
        if before.1 != robot {
            notifications.extend(self.registry.flag_changed(Signal::Robot, robot));
        }
        notifications
    }

    fn send(&self, msg: NTMessage) -> Result<()> {
        let frame = msg.encode()?;
        self.outbound.try_send(frame).map_err(|_| Error::Closed)
    }

    fn send_control<M: MessageBody>(&self, body: M) -> Result<()> {
        self.send(NTMessage::single_text(body.into_message()?))
    }

    fn send_batched(&self, messages: Vec<NTTextMessage>) -> Result<()> {
        for batch in batch_messages(messages, MAX_BATCHING_SIZE) {
            self.send(batch)?;
        }
        Ok(())
    }

    fn send_timesync(&mut self, now: Instant) {
        self.last_timesync = Some(now);
        let local = micros_since(self.epoch, now) as i64;
        let ping = NTBinaryMessage::new(TIMESYNC_ID, 0, NTValue::Int(local));
        if let Err(e) = self.send(NTMessage::single_bin(ping)) {
            log::warn!("Failed to send time synchronization request: {}", e);
        }
    }

    /// Registers a topic listener and returns the notifications it gets right away
    pub fn subscribe(
        &mut self,
        pattern: Pattern,
        callback: TopicCallback,
    ) -> (ListenerId, Vec<Notification>) {
        let (id, subscribe) = self.registry.add_topic(pattern, callback);
        if let Some(subscribe) = subscribe {
            if self.session_open {
                log::debug!("Subscribing to {:?}", subscribe.topics);
                if let Err(e) = self.send_control(subscribe) {
                    log::warn!("Failed to send subscription: {}", e);
                }
            }
        }
        let initial = self.registry.initial_topic(id, &self.store);
        (id, initial)
    }

    pub fn watch(
        &mut self,
        signal: Signal,
        callback: FlagCallback,
    ) -> (ListenerId, Vec<Notification>) {
        let id = self.registry.add_flag(signal, callback);
        let value = match signal {
            Signal::Transport => self.status.is_connected(),
            Signal::Robot => self.status.is_robot_connected(),
        };
        let initial = self.registry.initial_flag(id, value);
        (id, initial)
    }

    /// Removes a listener, returning it so it is dropped outside the state lock
    pub fn unsubscribe(&mut self, id: ListenerId) -> Option<Listener> {
        let (listener, unsubscribe) = self.registry.remove(id)?;
        if let Some(unsubscribe) = unsubscribe {
            if self.session_open {
                if let Err(e) = self.send_control(unsubscribe) {
                    log::warn!("Failed to send unsubscribe: {}", e);
                }
            }
        }
        Some(listener)
    }

    /// Writes a value to a topic, publishing the topic first if this client never wrote to it
    ///
    /// The value is converted to the announced or previously published type of the topic,
    /// and rejected with [`Error::TypeMismatch`] before anything is sent when that is impossible.
    ///
    /// [`Error::TypeMismatch`]: ../error/enum.Error.html#variant.TypeMismatch
    pub fn set(&mut self, path: &str, value: NTValue, now: Instant) -> Result<Vec<Notification>> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.status.is_connected() {
            return Err(Error::NotConnected);
        }

        let declared = self
            .store
            .get(path)
            .map(|topic| topic.data_type.clone())
            .or_else(|| self.publishers.get(path).map(|p| p.data_type.clone()));
        let value = match &declared {
            Some(ty) => {
                let found = value.data_type();
                value.coerce_to(ty).ok_or_else(|| Error::TypeMismatch {
                    path: path.to_string(),
                    expected: ty.clone(),
                    found,
                })?
            }
            None => value,
        };

        if !self.publishers.contains_key(path) {
            self.next_pubuid += 1;
            let publisher = Publisher {
                pubuid: self.next_pubuid,
                name: path.to_string(),
                data_type: declared.unwrap_or_else(|| value.data_type()),
                pending: None,
            };
            log::info!(
                "Publishing {} as {} (pubuid {})",
                path,
                publisher.data_type,
                publisher.pubuid
            );
            self.send_control(PublishReq {
                name: publisher.name.clone(),
                pubuid: publisher.pubuid,
                data_type: publisher.data_type.clone(),
                properties: PropertyMap::new(),
            })?;
            self.publishers.insert(path.to_string(), publisher);
        }

        let pubuid = self.publishers[path].pubuid;
        let timestamp = self.server_time(now);
        self.send(NTMessage::single_bin(NTBinaryMessage::new(
            pubuid,
            timestamp,
            value.clone(),
        )))?;

        if self.config.write_policy == WritePolicy::Confirmed {
            return Ok(vec![]);
        }

        match self.store.get(path) {
            Some(topic) => {
                let timestamp = timestamp.max(topic.timestamp);
                Ok(self.apply_local(path, value, timestamp))
            }
            None => {
                if let Some(publisher) = self.publishers.get_mut(path) {
                    publisher.pending = Some((value, timestamp));
                }
                Ok(vec![])
            }
        }
    }

    /// Stops publishing a topic. The server deletes it once no client publishes it.
    pub fn unpublish(&mut self, path: &str) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        match self.publishers.remove(path) {
            Some(publisher) if self.session_open => {
                log::info!("Unpublishing {}", path);
                self.send_control(PublishRel {
                    pubuid: publisher.pubuid,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn set_properties(&mut self, path: &str, update: PropertyMap) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if !self.status.is_connected() {
            return Err(Error::NotConnected);
        }
        self.send_control(SetProperties {
            name: path.to_string(),
            update,
        })
    }

    fn apply_local(&mut self, path: &str, value: NTValue, timestamp: u64) -> Vec<Notification> {
        match self.store.apply_local(path, value, timestamp) {
            UpdateOutcome::Changed(name) => {
                self.registry.topic_changed(&name, self.store.value(&name))
            }
            UpdateOutcome::WrongType => {
                log::warn!("Local write to {} does not match its announced type", path);
                vec![]
            }
            _ => vec![],
        }
    }

    /// A connection attempt is about to start, or a reconnect has been scheduled
    pub fn on_dial(&mut self) -> Vec<Notification> {
        if self.closed {
            return vec![];
        }
        let before = self.flags();
        self.status.set_transport(TransportState::Connecting);
        self.flag_notifications(before)
    }

    /// The socket is open: replay subscriptions and publishers, then start time synchronization.
    /// The handshake completes when the server answers the time synchronization request.
    pub fn on_open(&mut self, now: Instant) -> Vec<Notification> {
        let before = self.flags();
        self.status.set_transport(TransportState::Connecting);
        self.session_open = true;
        self.handshake_deadline = Some(now + self.config.handshake_timeout);

        let mut publishers = self.publishers.values().collect::<Vec<_>>();
        publishers.sort_by_key(|publisher| publisher.pubuid);

        let messages = self
            .registry
            .wire
            .all()
            .into_iter()
            .map(MessageBody::into_message)
            .chain(publishers.into_iter().map(|publisher| {
                PublishReq {
                    name: publisher.name.clone(),
                    pubuid: publisher.pubuid,
                    data_type: publisher.data_type.clone(),
                    properties: PropertyMap::new(),
                }
                .into_message()
            }))
            .collect::<std::result::Result<Vec<_>, _>>();

        match messages {
            Ok(messages) => {
                log::debug!("Sending {} control messages after connecting", messages.len());
                if let Err(e) = self.send_batched(messages) {
                    log::warn!("Failed to replay subscriptions: {}", e);
                }
            }
            Err(e) => log::warn!("Failed to encode subscriptions: {}", e),
        }
        self.send_timesync(now);

        self.flag_notifications(before)
    }

    fn complete_handshake(&mut self) -> Vec<Notification> {
        self.handshake_deadline = None;
        if !self.session_open || self.status.transport() != TransportState::Connecting {
            return vec![];
        }

        let before = self.flags();
        self.status.set_transport(TransportState::Connected);
        log::info!(
            "Connected to NetworkTables server, {} topics announced",
            self.store.len()
        );
        self.flag_notifications(before)
    }

    /// Handles a frame received from the server. Malformed frames are logged and dropped.
    pub fn on_frame(&mut self, frame: &Frame, now: Instant) -> Vec<Notification> {
        let msg = match NTMessage::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Dropping malformed frame from server: {}", e);
                return vec![];
            }
        };

        let mut notifications = Vec::new();
        match msg {
            NTMessage::Text(msgs) => {
                for msg in msgs {
                    notifications.extend(self.handle_control(msg));
                }
            }
            NTMessage::Binary(updates) => {
                for update in updates {
                    notifications.extend(self.handle_update(update, now));
                }
            }
        }
        notifications
    }

    fn handle_control(&mut self, msg: NTTextMessage) -> Vec<Notification> {
        match msg.data() {
            Ok(MessageValue::Announce(announce)) => self.announce(announce),
            Ok(MessageValue::Unannounce(unannounce)) => {
                log::debug!("Topic {} unannounced", unannounce.name);
                match self.store.unannounce(&unannounce.name, unannounce.id) {
                    Some(topic) if topic.value.is_some() => {
                        self.registry.topic_changed(&topic.name, None)
                    }
                    _ => vec![],
                }
            }
            Ok(MessageValue::Properties(properties)) => {
                if !self.store.update_properties(&properties.name, properties.update) {
                    log::debug!("Properties for unknown topic {}", properties.name);
                }
                vec![]
            }
            Ok(other) => {
                log::debug!("Ignoring message meant for a server: {:?}", other);
                vec![]
            }
            Err(e) if e.is_forward_compatible() => {
                log::debug!("Ignoring control message: {}", e);
                vec![]
            }
            Err(e) => {
                log::warn!("Dropping malformed control message: {}", e);
                vec![]
            }
        }
    }

    fn announce(&mut self, announce: Announce) -> Vec<Notification> {
        log::debug!(
            "Topic {} announced as {} (id {})",
            announce.name,
            announce.data_type,
            announce.id
        );
        let name = announce.name.clone();

        let mut notifications = Vec::new();
        if self.store.announce(announce) {
            notifications.extend(self.registry.topic_changed(&name, None));
        }

        let pending = self
            .publishers
            .get_mut(&name)
            .and_then(|publisher| publisher.pending.take());
        if let Some((value, timestamp)) = pending {
            notifications.extend(self.apply_local(&name, value, timestamp));
        }
        notifications
    }

    fn handle_update(&mut self, update: NTBinaryMessage, now: Instant) -> Vec<Notification> {
        if update.id == TIMESYNC_ID {
            return self.timesync_reply(update, now);
        }

        let outcome = self.store.apply_update(&update);
        let mut notifications = Vec::new();
        match &outcome {
            UpdateOutcome::Changed(name) => {
                log::trace!("{} = {:?}", name, update.value);
                notifications.extend(self.registry.topic_changed(name, self.store.value(name)));
            }
            UpdateOutcome::Unchanged(_) => {}
            UpdateOutcome::Stale => log::trace!("Discarding stale update for id {}", update.id),
            UpdateOutcome::UnknownTopic => {
                log::debug!("Update for unannounced topic id {}", update.id)
            }
            UpdateOutcome::WrongType => log::warn!(
                "Update for topic id {} does not match its announced type",
                update.id
            ),
        }

        if outcome.accepted() == Some(self.config.heartbeat_topic.as_str()) {
            if self.is_stale_heartbeat(update.timestamp, now) {
                log::debug!(
                    "Ignoring heartbeat stamped {}us, older than the robot timeout",
                    update.timestamp
                );
            } else {
                let before = self.flags();
                self.status.heartbeat(now);
                notifications.extend(self.flag_notifications(before));
            }
        }
        notifications
    }

    /// A heartbeat the server retained from before the robot timeout does not prove robot code
    /// is running. Without a synchronized clock every heartbeat counts as fresh.
    fn is_stale_heartbeat(&self, timestamp: u64, now: Instant) -> bool {
        if self.clock_offset.is_none() {
            return false;
        }
        let age = self.server_time(now).saturating_sub(timestamp);
        age > self.config.robot_timeout.as_micros() as u64
    }

    fn timesync_reply(&mut self, update: NTBinaryMessage, now: Instant) -> Vec<Notification> {
        let sent = match update.value {
            NTValue::Int(sent) => sent,
            other => {
                log::warn!("Invalid time synchronization reply {:?}", other);
                return vec![];
            }
        };

        let local = micros_since(self.epoch, now) as i64;
        let rtt = (local - sent).max(0);
        let offset = update.timestamp as i64 + rtt / 2 - local;
        log::debug!("Clock synchronized: offset {}us, round trip {}us", offset, rtt);
        self.clock_offset = Some(offset);

        self.complete_handshake()
    }

    /// Timer driven work: handshake timeout, periodic time synchronization, heartbeat expiry
    pub fn tick(&mut self, now: Instant) -> Vec<Notification> {
        let mut notifications = Vec::new();

        if let Some(deadline) = self.handshake_deadline {
            if now >= deadline {
                log::warn!(
                    "No time synchronization reply from server, assuming handshake complete"
                );
                notifications.extend(self.complete_handshake());
            }
        }

        let resync = self.last_timesync.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.timesync_interval
        });
        if self.session_open && resync {
            self.send_timesync(now);
        }

        let before = self.flags();
        self.status.check(now);
        notifications.extend(self.flag_notifications(before));
        notifications
    }

    /// The socket closed. Every topic becomes absent until the server announces it again.
    pub fn on_close(&mut self) -> Vec<Notification> {
        let was_open = self.session_open;
        self.session_open = false;
        self.handshake_deadline = None;
        self.clock_offset = None;
        self.last_timesync = None;
        for publisher in self.publishers.values_mut() {
            publisher.pending = None;
        }

        let before = self.flags();
        let cleared = self.store.clear();
        let mut notifications = Vec::new();
        for topic in &cleared {
            notifications.extend(self.registry.topic_changed(&topic.name, None));
        }
        self.status.set_transport(TransportState::Disconnected);
        notifications.extend(self.flag_notifications(before));

        if was_open {
            log::info!(
                "Disconnected from NetworkTables server, {} cached values dropped",
                cleared.len()
            );
        }
        notifications
    }

    /// Marks the client closed. No further connection attempts or writes are accepted.
    pub fn close(&mut self) -> Vec<Notification> {
        if self.closed {
            return vec![];
        }
        self.closed = true;
        self.outbound.close();
        self.on_close()
    }
}

#[cfg(test)]
mod tests {
    use super::ClientState;
    use crate::config::{ClientConfig, WritePolicy};
    use crate::error::Error;
    use crate::registry::{deliver_all, Pattern, Signal};
    use crate::status::RobotState;
    use async_std::channel::{unbounded, Receiver};
    use parking_lot::Mutex;
    use proto::prelude::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    const NUMBER: &str = "/SmartDashboard/someNumber";

    fn config() -> ClientConfig {
        ClientConfig {
            heartbeat_topic: "/Robot/Heartbeat".to_string(),
            robot_timeout: Duration::from_millis(500),
            handshake_timeout: Duration::from_millis(200),
            ..ClientConfig::default()
        }
    }

    fn client(config: ClientConfig) -> (ClientState, Receiver<Frame>, Instant) {
        let (tx, rx) = unbounded();
        let epoch = Instant::now();
        (ClientState::new(config, tx, epoch), rx, epoch)
    }

    fn drain(rx: &Receiver<Frame>) -> Vec<NTMessage> {
        let mut msgs = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            msgs.push(NTMessage::decode(&frame).unwrap());
        }
        msgs
    }

    fn control(msgs: &[NTMessage]) -> Vec<MessageValue> {
        msgs.iter()
            .filter_map(|msg| match msg {
                NTMessage::Text(batch) => Some(batch.clone()),
                _ => None,
            })
            .flatten()
            .map(|msg| msg.data().unwrap())
            .collect()
    }

    fn values(msgs: &[NTMessage]) -> Vec<NTBinaryMessage> {
        msgs.iter()
            .filter_map(|msg| match msg {
                NTMessage::Binary(batch) => Some(batch.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn announce_frame(name: &str, id: i64, data_type: DataType, pubuid: Option<i64>) -> Frame {
        NTMessage::single_text(
            Announce {
                name: name.to_string(),
                id,
                data_type,
                pubuid,
                properties: PropertyMap::new(),
            }
            .into_message()
            .unwrap(),
        )
        .encode()
        .unwrap()
    }

    fn value_frame(id: i64, timestamp: u64, value: NTValue) -> Frame {
        NTMessage::single_bin(NTBinaryMessage::new(id, timestamp, value))
            .encode()
            .unwrap()
    }

    /// Connects and completes the handshake by answering the time synchronization request
    fn connect(state: &mut ClientState, rx: &Receiver<Frame>, now: Instant) -> Vec<NTMessage> {
        deliver_all(state.on_dial());
        deliver_all(state.on_open(now));
        let sent = drain(rx);
        let ping = values(&sent)
            .into_iter()
            .find(|msg| msg.id == TIMESYNC_ID)
            .unwrap();
        deliver_all(state.on_frame(&value_frame(TIMESYNC_ID, 1_000_000, ping.value), now));
        sent
    }

    fn recorder(state: &mut ClientState, path: &str) -> Arc<Mutex<Vec<Option<NTValue>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let (_, initial) = state.subscribe(
            Pattern::Exact(path.to_string()),
            Arc::new(move |_: &str, value: Option<&NTValue>| {
                sink.lock().push(value.cloned())
            }),
        );
        deliver_all(initial);
        seen
    }

    #[test]
    fn test_handshake_replays_subscriptions() {
        let (mut state, rx, epoch) = client(config());
        let _seen = recorder(&mut state, NUMBER);
        assert!(drain(&rx).is_empty());

        deliver_all(state.on_dial());
        assert_eq!(state.transport_state(), crate::status::TransportState::Connecting);
        deliver_all(state.on_open(epoch));

        let sent = drain(&rx);
        let subscribed = control(&sent)
            .into_iter()
            .map(|msg| match msg {
                MessageValue::Subscribe(sub) => sub.topics,
                other => panic!("unexpected {:?}", other),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            subscribed,
            vec![vec!["/Robot/Heartbeat".to_string()], vec![NUMBER.to_string()]]
        );
        assert_eq!(values(&sent)[0].id, TIMESYNC_ID);
        assert!(!state.is_connected());

        deliver_all(state.on_frame(
            &value_frame(TIMESYNC_ID, 5_000_000, NTValue::Int(0)),
            epoch + Duration::from_millis(10),
        ));
        assert!(state.is_connected());
        // 5s server time, 10ms round trip
        assert_eq!(state.clock_offset(), Some(5_000_000 + 5_000 - 10_000));
    }

    #[test]
    fn test_handshake_timeout() {
        let (mut state, rx, epoch) = client(config());
        deliver_all(state.on_dial());
        deliver_all(state.on_open(epoch));
        drain(&rx);

        deliver_all(state.tick(epoch + Duration::from_millis(100)));
        assert!(!state.is_connected());
        deliver_all(state.tick(epoch + Duration::from_millis(200)));
        assert!(state.is_connected());
    }

    #[test]
    fn test_number_scenario() {
        let (mut state, rx, epoch) = client(config());
        let seen = recorder(&mut state, NUMBER);
        connect(&mut state, &rx, epoch);

        deliver_all(state.on_frame(&announce_frame(NUMBER, 7, DataType::Double, None), epoch));
        deliver_all(state.on_frame(&value_frame(7, 1_000_000, NTValue::Double(5.0)), epoch));
        assert_eq!(state.get(NUMBER), Some(NTValue::Double(5.0)));

        deliver_all(state.set(NUMBER, NTValue::Int(6), epoch).unwrap());
        let sent = drain(&rx);
        match &control(&sent)[..] {
            [MessageValue::PublishReq(req)] => {
                assert_eq!(req.name, NUMBER);
                assert_eq!(req.data_type, DataType::Double);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(values(&sent)[0].value, NTValue::Double(6.0));

        deliver_all(state.on_frame(&value_frame(7, 1_000_100, NTValue::Double(6.0)), epoch));
        assert_eq!(state.get(NUMBER), Some(NTValue::Double(6.0)));
        assert_eq!(
            *seen.lock(),
            vec![None, Some(NTValue::Double(5.0)), Some(NTValue::Double(6.0))]
        );
    }

    #[test]
    fn test_confirmed_writes_wait_for_the_server() {
        let (mut state, rx, epoch) = client(ClientConfig {
            write_policy: WritePolicy::Confirmed,
            ..config()
        });
        let seen = recorder(&mut state, NUMBER);
        connect(&mut state, &rx, epoch);
        deliver_all(state.on_frame(&announce_frame(NUMBER, 7, DataType::Double, None), epoch));
        deliver_all(state.on_frame(&value_frame(7, 1_000_000, NTValue::Double(5.0)), epoch));

        deliver_all(state.set(NUMBER, NTValue::Double(6.0), epoch).unwrap());
        deliver_all(state.set(NUMBER, NTValue::Double(7.0), epoch).unwrap());
        assert_eq!(state.get(NUMBER), Some(NTValue::Double(5.0)));

        deliver_all(state.on_frame(&value_frame(7, 1_000_100, NTValue::Double(6.0)), epoch));
        assert_eq!(state.get(NUMBER), Some(NTValue::Double(6.0)));
        deliver_all(state.on_frame(&value_frame(7, 1_000_200, NTValue::Double(7.0)), epoch));

        assert_eq!(
            *seen.lock(),
            vec![
                None,
                Some(NTValue::Double(5.0)),
                Some(NTValue::Double(6.0)),
                Some(NTValue::Double(7.0))
            ]
        );
    }

    #[test]
    fn test_write_to_unannounced_topic() {
        let (mut state, rx, epoch) = client(config());
        let seen = recorder(&mut state, "/SmartDashboard/enabled");
        connect(&mut state, &rx, epoch);

        deliver_all(state.set("/SmartDashboard/enabled", NTValue::Boolean(true), epoch).unwrap());
        assert_eq!(state.get("/SmartDashboard/enabled"), None);
        let sent = drain(&rx);
        let pubuid = match &control(&sent)[..] {
            [MessageValue::PublishReq(req)] => {
                assert_eq!(req.data_type, DataType::Boolean);
                req.pubuid
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(values(&sent)[0].id, pubuid);

        deliver_all(state.on_frame(
            &announce_frame("/SmartDashboard/enabled", 9, DataType::Boolean, Some(pubuid)),
            epoch,
        ));
        assert_eq!(state.get("/SmartDashboard/enabled"), Some(NTValue::Boolean(true)));
        assert_eq!(*seen.lock(), vec![None, Some(NTValue::Boolean(true))]);

        // already published, so the type is fixed
        match state.set("/SmartDashboard/enabled", NTValue::String("yes".to_string()), epoch) {
            Err(Error::TypeMismatch { expected, found, .. }) => {
                assert_eq!(expected, DataType::Boolean);
                assert_eq!(found, DataType::String);
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_writes_rejected_while_disconnected() {
        let (mut state, rx, _) = client(config());
        assert!(matches!(
            state.set(NUMBER, NTValue::Double(1.0), Instant::now()),
            Err(Error::NotConnected)
        ));
        assert!(drain(&rx).is_empty());

        deliver_all(state.close());
        assert!(matches!(
            state.set(NUMBER, NTValue::Double(1.0), Instant::now()),
            Err(Error::Closed)
        ));
    }

    #[test]
    fn test_unpublish_and_set_properties() {
        let (mut state, rx, epoch) = client(config());
        connect(&mut state, &rx, epoch);
        deliver_all(state.set(NUMBER, NTValue::Double(1.0), epoch).unwrap());
        let pubuid = match &control(&drain(&rx))[..] {
            [MessageValue::PublishReq(req)] => req.pubuid,
            other => panic!("unexpected {:?}", other),
        };

        let update = serde_json::json!({"persistent": true})
            .as_object()
            .cloned()
            .unwrap();
        state.set_properties(NUMBER, update.clone()).unwrap();
        match &control(&drain(&rx))[..] {
            [MessageValue::SetProperties(props)] => {
                assert_eq!(props.name, NUMBER);
                assert_eq!(props.update, update);
            }
            other => panic!("unexpected {:?}", other),
        }

        state.unpublish(NUMBER).unwrap();
        match &control(&drain(&rx))[..] {
            [MessageValue::PublishRel(rel)] => assert_eq!(rel.pubuid, pubuid),
            other => panic!("unexpected {:?}", other),
        }
        state.unpublish(NUMBER).unwrap();
        assert!(drain(&rx).is_empty());

        // writing again declares a new publisher
        deliver_all(state.set(NUMBER, NTValue::Double(2.0), epoch).unwrap());
        match &control(&drain(&rx))[..] {
            [MessageValue::PublishReq(req)] => assert_ne!(req.pubuid, pubuid),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unpublish_while_disconnected() {
        let (mut state, rx, epoch) = client(config());
        connect(&mut state, &rx, epoch);
        deliver_all(state.set(NUMBER, NTValue::Double(1.0), epoch).unwrap());
        drain(&rx);

        deliver_all(state.on_close());
        state.unpublish(NUMBER).unwrap();
        assert!(matches!(
            state.set_properties(NUMBER, PropertyMap::new()),
            Err(Error::NotConnected)
        ));
        assert!(drain(&rx).is_empty());

        let replayed = control(&connect(&mut state, &rx, epoch));
        assert!(!replayed
            .iter()
            .any(|msg| matches!(msg, MessageValue::PublishReq(_) | MessageValue::PublishRel(_))));

        deliver_all(state.close());
        assert!(matches!(state.unpublish(NUMBER), Err(Error::Closed)));
    }

    #[test]
    fn test_reconnect_clears_store_and_resubscribes() {
        let (mut state, rx, epoch) = client(config());
        let seen = recorder(&mut state, NUMBER);
        connect(&mut state, &rx, epoch);
        deliver_all(state.on_frame(&announce_frame(NUMBER, 7, DataType::Double, None), epoch));
        deliver_all(state.on_frame(&value_frame(7, 1, NTValue::Double(5.0)), epoch));
        deliver_all(state.set(NUMBER, NTValue::Double(6.0), epoch).unwrap());
        drain(&rx);

        deliver_all(state.on_close());
        assert!(!state.is_connected());
        assert_eq!(state.get(NUMBER), None);
        assert!(state.topics().is_empty());

        // a stale update for the old id is not applied
        deliver_all(state.on_frame(&value_frame(7, 2, NTValue::Double(9.0)), epoch));
        assert_eq!(state.get(NUMBER), None);

        let sent = connect(&mut state, &rx, epoch);
        let replayed = control(&sent);
        assert!(replayed.iter().any(|msg| match msg {
            MessageValue::Subscribe(sub) => sub.topics == vec![NUMBER.to_string()],
            _ => false,
        }));
        assert!(replayed.iter().any(|msg| match msg {
            MessageValue::PublishReq(req) => req.name == NUMBER,
            _ => false,
        }));
        // the last written value is not replayed
        assert!(values(&sent).iter().all(|msg| msg.id == TIMESYNC_ID));

        deliver_all(state.on_frame(&announce_frame(NUMBER, 12, DataType::Double, None), epoch));
        deliver_all(state.on_frame(&value_frame(12, 1, NTValue::Double(8.0)), epoch));
        assert_eq!(
            *seen.lock(),
            vec![
                None,
                Some(NTValue::Double(5.0)),
                Some(NTValue::Double(6.0)),
                None,
                Some(NTValue::Double(8.0))
            ]
        );
    }

    #[test]
    fn test_robot_heartbeat() {
        let (mut state, rx, epoch) = client(config());
        let robot = Arc::new(Mutex::new(Vec::new()));
        let sink = robot.clone();
        let callback = Arc::new(move |value: bool| sink.lock().push(value));
        let (_, initial) = state.watch(Signal::Robot, callback);
        deliver_all(initial);
        connect(&mut state, &rx, epoch);

        let heartbeat = announce_frame("/Robot/Heartbeat", 1, DataType::Int, None);
        deliver_all(state.on_frame(&heartbeat, epoch));
        deliver_all(state.on_frame(&value_frame(1, 1_000_010, NTValue::Int(1)), epoch));
        assert!(state.is_robot_connected());

        let later = epoch + Duration::from_millis(400);
        deliver_all(state.on_frame(&value_frame(1, 1_400_000, NTValue::Int(2)), later));
        deliver_all(state.tick(later + Duration::from_millis(400)));
        assert!(state.is_robot_connected());

        deliver_all(state.tick(later + Duration::from_millis(501)));
        assert!(!state.is_robot_connected());
        assert!(state.is_connected());

        deliver_all(state.on_frame(
            &value_frame(1, 2_400_000, NTValue::Int(3)),
            later + Duration::from_secs(1),
        ));
        assert!(state.is_robot_connected());

        deliver_all(state.on_close());
        assert!(!state.is_robot_connected());
        assert_eq!(*robot.lock(), vec![false, true, false, true, false]);
    }

    #[test]
    fn test_retained_heartbeat_does_not_prove_robot_code() {
        let (mut state, rx, epoch) = client(config());
        connect(&mut state, &rx, epoch);
        let heartbeat = announce_frame("/Robot/Heartbeat", 1, DataType::Int, None);
        deliver_all(state.on_frame(&heartbeat, epoch));

        // the server replays the last heartbeat, stamped one second before now
        deliver_all(state.on_frame(&value_frame(1, 1, NTValue::Int(41)), epoch));
        assert_eq!(state.get("/Robot/Heartbeat"), Some(NTValue::Int(41)));
        assert!(!state.is_robot_connected());
        assert_eq!(state.robot_state(), RobotState::Unknown);

        let now = epoch + Duration::from_millis(100);
        deliver_all(state.on_frame(&value_frame(1, 1_090_000, NTValue::Int(42)), now));
        assert!(state.is_robot_connected());
    }

    #[test]
    fn test_heartbeat_before_time_sync_counts() {
        let (mut state, rx, epoch) = client(config());
        deliver_all(state.on_dial());
        deliver_all(state.on_open(epoch));
        drain(&rx);
        let heartbeat = announce_frame("/Robot/Heartbeat", 1, DataType::Int, None);
        deliver_all(state.on_frame(&heartbeat, epoch));
        deliver_all(state.on_frame(&value_frame(1, 1, NTValue::Int(1)), epoch));
        assert!(state.is_robot_connected());
    }

    #[test]
    fn test_unannounce_and_properties() {
        let (mut state, rx, epoch) = client(config());
        let seen = recorder(&mut state, NUMBER);
        connect(&mut state, &rx, epoch);
        deliver_all(state.on_frame(&announce_frame(NUMBER, 7, DataType::Double, None), epoch));
        deliver_all(state.on_frame(&value_frame(7, 1, NTValue::Double(5.0)), epoch));

        let properties = Frame::Text(format!(
            r#"[{{"method":"properties","params":{{"name":"{}","update":{{"persistent":true}}}}}}]"#,
            NUMBER
        ));
        deliver_all(state.on_frame(&properties, epoch));
        assert!(state.topic(NUMBER).unwrap().is_persistent());

        let unannounce = Frame::Text(format!(
            r#"[{{"method":"unannounce","params":{{"name":"{}","id":7}}}}]"#,
            NUMBER
        ));
        deliver_all(state.on_frame(&unannounce, epoch));
        assert_eq!(state.topic(NUMBER), None);
        assert_eq!(*seen.lock(), vec![None, Some(NTValue::Double(5.0)), None]);
    }

    #[test]
    fn test_bad_frames_are_dropped() {
        let (mut state, rx, epoch) = client(config());
        connect(&mut state, &rx, epoch);

        assert!(state.on_frame(&Frame::Text("not json".to_string()), epoch).is_empty());
        assert!(state.on_frame(&Frame::Binary(vec![0x94, 0x01]), epoch).is_empty());
        assert!(state
            .on_frame(&Frame::Text(r#"[{"method":"hello","params":{}}]"#.to_string()), epoch)
            .is_empty());
        assert!(state.is_connected());
    }

    #[test]
    fn test_unsubscribe_releases_the_wire_subscription() {
        let (mut state, rx, epoch) = client(config());
        connect(&mut state, &rx, epoch);

        let fms = Pattern::Prefix("/FMSInfo/".to_string());
        let (first, _) = state.subscribe(fms.clone(), Arc::new(|_: &str, _: Option<&NTValue>| {}));
        let (second, _) = state.subscribe(fms, Arc::new(|_: &str, _: Option<&NTValue>| {}));
        let subuid = match &control(&drain(&rx))[..] {
            [MessageValue::Subscribe(sub)] => {
                assert_eq!(sub.options.prefix, Some(true));
                sub.subuid
            }
            other => panic!("unexpected {:?}", other),
        };

        assert!(state.unsubscribe(first).is_some());
        assert!(drain(&rx).is_empty());
        assert!(state.unsubscribe(second).is_some());
        assert!(state.unsubscribe(second).is_none());
        match &control(&drain(&rx))[..] {
            [MessageValue::Unsubscribe(unsub)] => assert_eq!(unsub.subuid, subuid),
            other => panic!("unexpected {:?}", other),
        }
    }
}
