use proto::prelude::{Announce, DataType, NTValue, PropertyMap};

/// A topic announced by the server, and its latest known value
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub name: String,
    pub id: i64,
    pub data_type: DataType,
    pub properties: PropertyMap,
    pub value: Option<NTValue>,
    /// Server time of `value`, in microseconds
    pub timestamp: u64,
}

impl Topic {
    pub fn new(announce: Announce) -> Topic {
        Topic {
            name: announce.name,
            id: announce.id,
            data_type: announce.data_type,
            properties: announce.properties,
            value: None,
            timestamp: 0,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.flag("persistent")
    }

    pub fn is_retained(&self) -> bool {
        self.flag("retained")
    }

    fn flag(&self, name: &str) -> bool {
        self.properties
            .get(name)
            .and_then(|value| value.as_bool())
            .unwrap_or(false)
    }

    /// Merges a properties update, a `null` removes the property
    pub fn update_properties(&mut self, update: PropertyMap) {
        for (key, value) in update {
            if value.is_null() {
                self.properties.remove(&key);
            } else {
                self.properties.insert(key, value);
            }
        }
    }
}

/// A topic this client writes to
#[derive(Debug, Clone)]
pub struct Publisher {
    pub pubuid: i64,
    pub name: String,
    pub data_type: DataType,
    /// Last value written, kept until the server announces the topic
    pub pending: Option<(NTValue, u64)>,
}
