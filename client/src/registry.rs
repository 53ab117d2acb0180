//! Local listeners and the wire subscriptions that feed them
//!
//! Listeners never run while the registry is borrowed: every operation returns [`Notification`]s
//! which the caller delivers once the client state is unlocked.
//!
//! [`Notification`]: ./struct.Notification.html

use crate::store::TopicStore;
use proto::prelude::{NTValue, Subscribe, SubscriptionOptions, Unsubscribe};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type TopicCallback = Arc<dyn Fn(&str, Option<&NTValue>) + Send + Sync>;
pub type FlagCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Which topics a subscription covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    Exact(String),
    Prefix(String),
}

impl Pattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(path) => path == name,
            Pattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Exact(path) | Pattern::Prefix(path) => path,
        }
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Pattern::Prefix(_))
    }
}

/// Connection signals a listener can watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Transport,
    Robot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    Topic(Pattern),
    Flag(Signal),
}

#[derive(Clone)]
enum Callback {
    Topic(TopicCallback),
    Flag(FlagCallback),
}

pub struct Listener {
    id: ListenerId,
    interest: Interest,
    active: Arc<AtomicBool>,
    callback: Callback,
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("interest", &self.interest)
            .finish()
    }
}

enum Call {
    Topic {
        callback: TopicCallback,
        name: String,
        value: Option<NTValue>,
    },
    Flag {
        callback: FlagCallback,
        value: bool,
    },
}

/// A pending callback invocation
pub struct Notification {
    active: Arc<AtomicBool>,
    call: Call,
}

impl Notification {
    /// Runs the callback, unless its listener was removed in the meantime
    pub fn deliver(self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        match self.call {
            Call::Topic {
                callback,
                name,
                value,
            } => callback(&name, value.as_ref()),
            Call::Flag { callback, value } => callback(value),
        }
    }
}

pub fn deliver_all(notifications: Vec<Notification>) {
    for notification in notifications {
        notification.deliver();
    }
}

/// Server-side subscriptions, one per distinct pattern, reference counted by listeners
#[derive(Debug, Default)]
pub struct WireSubscriptions {
    next_subuid: i64,
    by_pattern: HashMap<Pattern, (i64, usize)>,
}

impl WireSubscriptions {
    /// Takes a reference on `pattern`. Returns the subscribe message when the pattern is new.
    pub fn acquire(&mut self, pattern: &Pattern) -> Option<Subscribe> {
        if let Some((_, count)) = self.by_pattern.get_mut(pattern) {
            *count += 1;
            return None;
        }

        self.next_subuid += 1;
        let subuid = self.next_subuid;
        self.by_pattern.insert(pattern.clone(), (subuid, 1));
        Some(subscribe_message(pattern, subuid))
    }

    /// Releases a reference on `pattern`. Returns the unsubscribe message when it was the last one.
    pub fn release(&mut self, pattern: &Pattern) -> Option<Unsubscribe> {
        let (subuid, count) = self.by_pattern.get_mut(pattern)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }

        let subuid = *subuid;
        self.by_pattern.remove(pattern);
        Some(Unsubscribe { subuid })
    }

    /// Every live subscription, oldest first, for replay after a reconnect
    pub fn all(&self) -> Vec<Subscribe> {
        let mut subs = self
            .by_pattern
            .iter()
            .map(|(pattern, (subuid, _))| subscribe_message(pattern, *subuid))
            .collect::<Vec<_>>();
        subs.sort_by_key(|sub| sub.subuid);
        subs
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.by_pattern.is_empty()
    }
}

fn subscribe_message(pattern: &Pattern, subuid: i64) -> Subscribe {
    Subscribe {
        topics: vec![pattern.as_str().to_string()],
        subuid,
        options: SubscriptionOptions {
            prefix: if pattern.is_prefix() { Some(true) } else { None },
            ..Default::default()
        },
    }
}

#[derive(Default)]
pub struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
    pub wire: WireSubscriptions,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    fn add(&mut self, interest: Interest, callback: Callback) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            interest,
            active: Arc::new(AtomicBool::new(true)),
            callback,
        });
        id
    }

    /// Adds a topic listener. The second element is the subscribe message to send,
    /// when no other listener covered this pattern yet.
    pub fn add_topic(
        &mut self,
        pattern: Pattern,
        callback: TopicCallback,
    ) -> (ListenerId, Option<Subscribe>) {
        let subscribe = self.wire.acquire(&pattern);
        let id = self.add(Interest::Topic(pattern), Callback::Topic(callback));
        (id, subscribe)
    }

    pub fn add_flag(&mut self, signal: Signal, callback: FlagCallback) -> ListenerId {
        self.add(Interest::Flag(signal), Callback::Flag(callback))
    }

    /// Removes a listener. It is deactivated at once, so notifications already
    /// handed out for it are skipped. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: ListenerId) -> Option<(Listener, Option<Unsubscribe>)> {
        let idx = self.listeners.iter().position(|listener| listener.id == id)?;
        let listener = self.listeners.remove(idx);
        listener.active.store(false, Ordering::SeqCst);

        let unsubscribe = match &listener.interest {
            Interest::Topic(pattern) => self.wire.release(pattern),
            Interest::Flag(_) => None,
        };
        Some((listener, unsubscribe))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Notifications for every listener matching `name`, in registration order
    pub fn topic_changed(&self, name: &str, value: Option<&NTValue>) -> Vec<Notification> {
        self.listeners
            .iter()
            .filter_map(|listener| match (&listener.interest, &listener.callback) {
                (Interest::Topic(pattern), Callback::Topic(callback)) if pattern.matches(name) => {
                    Some(Notification {
                        active: listener.active.clone(),
                        call: Call::Topic {
                            callback: callback.clone(),
                            name: name.to_string(),
                            value: value.cloned(),
                        },
                    })
                }
                _ => None,
            })
            .collect()
    }

    pub fn flag_changed(&self, signal: Signal, value: bool) -> Vec<Notification> {
        self.listeners
            .iter()
            .filter_map(|listener| match (&listener.interest, &listener.callback) {
                (Interest::Flag(watched), Callback::Flag(callback)) if *watched == signal => {
                    Some(Notification {
                        active: listener.active.clone(),
                        call: Call::Flag {
                            callback: callback.clone(),
                            value,
                        },
                    })
                }
                _ => None,
            })
            .collect()
    }

    /// The notifications a new topic listener receives right away
    ///
    /// An exact listener gets the cached value or `None`. A prefix listener gets one call per
    /// matching topic holding a value, or a single `None` call on the prefix when there is none.
    pub fn initial_topic(&self, id: ListenerId, store: &TopicStore) -> Vec<Notification> {
        let listener = match self.listeners.iter().find(|listener| listener.id == id) {
            Some(listener) => listener,
            None => return vec![],
        };
        let (pattern, callback) = match (&listener.interest, &listener.callback) {
            (Interest::Topic(pattern), Callback::Topic(callback)) => (pattern, callback),
            _ => return vec![],
        };

        let notification = |name: &str, value: Option<&NTValue>| Notification {
            active: listener.active.clone(),
            call: Call::Topic {
                callback: callback.clone(),
                name: name.to_string(),
                value: value.cloned(),
            },
        };

        match pattern {
            Pattern::Exact(path) => vec![notification(path, store.value(path))],
            Pattern::Prefix(prefix) => {
                let notifications = store
                    .names()
                    .into_iter()
                    .filter(|name| pattern.matches(name))
                    .filter_map(|name| {
                        store
                            .value(&name)
                            .map(|value| notification(&name, Some(value)))
                    })
                    .collect::<Vec<_>>();
                if notifications.is_empty() {
                    vec![notification(prefix, None)]
                } else {
                    notifications
                }
            }
        }
    }

    pub fn initial_flag(&self, id: ListenerId, value: bool) -> Vec<Notification> {
        self.listeners
            .iter()
            .filter(|listener| listener.id == id)
            .filter_map(|listener| match &listener.callback {
                Callback::Flag(callback) => Some(Notification {
                    active: listener.active.clone(),
                    call: Call::Flag {
                        callback: callback.clone(),
                        value,
                    },
                }),
                Callback::Topic(_) => None,
            })
            .collect()
    }
}
