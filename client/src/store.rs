//! The topic store, the single authoritative copy of everything the server announced
//!
//! Values are applied last-writer-by-timestamp: an update older than the stored value is discarded,
//! so the store converges on the newest update no matter in which order updates arrive.

use crate::entry::Topic;
use proto::prelude::{Announce, NTBinaryMessage, NTValue, PropertyMap};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// No announced topic has this id
    UnknownTopic,
    /// The value's type does not match the announced type
    WrongType,
    /// Older than the stored value, discarded
    Stale,
    /// Accepted, but equal to the stored value
    Unchanged(String),
    Changed(String),
}

impl UpdateOutcome {
    pub fn accepted(&self) -> Option<&str> {
        match self {
            UpdateOutcome::Unchanged(name) | UpdateOutcome::Changed(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TopicStore {
    topics: HashMap<String, Topic>,
    ids: HashMap<i64, String>,
}

impl TopicStore {
    pub fn new() -> TopicStore {
        TopicStore::default()
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&NTValue> {
        self.topics.get(name).and_then(|topic| topic.value.as_ref())
    }

    #[cfg(test)]
    pub fn by_id(&self, id: i64) -> Option<&Topic> {
        self.ids.get(&id).and_then(|name| self.topics.get(name))
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Names of all announced topics, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names = self.topics.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Records an announced topic. Returns whether a previously stored value was discarded.
    ///
    /// A repeated announce with the same type only refreshes the id and properties.
    /// One with a different type replaces the topic.
    pub fn announce(&mut self, announce: Announce) -> bool {
        if let Some(existing) = self.topics.get_mut(&announce.name) {
            if existing.data_type == announce.data_type {
                self.ids.remove(&existing.id);
                existing.id = announce.id;
                existing.properties = announce.properties;
                self.ids.insert(announce.id, announce.name);
                return false;
            }
        }

        let topic = Topic::new(announce);
        self.ids.insert(topic.id, topic.name.clone());
        let replaced = self.topics.insert(topic.name.clone(), topic);
        if let Some(old) = &replaced {
            log::warn!(
                "Topic {} re-announced with a different type, dropping its value",
                old.name
            );
        }
        replaced.map_or(false, |old| old.value.is_some())
    }

    pub fn unannounce(&mut self, name: &str, id: i64) -> Option<Topic> {
        match self.topics.get(name) {
            Some(topic) if topic.id == id => {
                self.ids.remove(&id);
                self.topics.remove(name)
            }
            _ => None,
        }
    }

    pub fn update_properties(&mut self, name: &str, update: PropertyMap) -> bool {
        match self.topics.get_mut(name) {
            Some(topic) => {
                topic.update_properties(update);
                true
            }
            None => false,
        }
    }

    /// Applies a value update received from the server
    pub fn apply_update(&mut self, msg: &NTBinaryMessage) -> UpdateOutcome {
        match self.ids.get(&msg.id) {
            Some(name) => {
                let name = name.clone();
                self.apply(&name, msg.value.clone(), msg.timestamp)
            }
            None => UpdateOutcome::UnknownTopic,
        }
    }

    /// Applies a value written by this client, before the server has seen it
    pub fn apply_local(&mut self, name: &str, value: NTValue, timestamp: u64) -> UpdateOutcome {
        self.apply(name, value, timestamp)
    }

    fn apply(&mut self, name: &str, value: NTValue, timestamp: u64) -> UpdateOutcome {
        let topic = match self.topics.get_mut(name) {
            Some(topic) => topic,
            None => return UpdateOutcome::UnknownTopic,
        };

        if !value.fits(&topic.data_type) {
            return UpdateOutcome::WrongType;
        }
        if topic.value.is_some() && timestamp < topic.timestamp {
            return UpdateOutcome::Stale;
        }

        topic.timestamp = timestamp;
        if topic.value.as_ref() == Some(&value) {
            UpdateOutcome::Unchanged(topic.name.clone())
        } else {
            topic.value = Some(value);
            UpdateOutcome::Changed(topic.name.clone())
        }
    }

    /// Forgets every topic, returning the ones that held a value
    pub fn clear(&mut self) -> Vec<Topic> {
        self.ids.clear();
        self.topics
            .drain()
            .map(|(_, topic)| topic)
            .filter(|topic| topic.value.is_some())
            .collect()
    }
}
