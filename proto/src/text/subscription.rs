use super::MessageBody;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscribe {
    /// Topic names, or name prefixes when [`SubscriptionOptions::prefix`] is set
    ///
    /// [`SubscriptionOptions::prefix`]: ./struct.SubscriptionOptions.html#structfield.prefix
    pub topics: Vec<String>,
    pub subuid: i64,
    #[serde(default)]
    pub options: SubscriptionOptions,
}

/// Options of a subscription. Anything left as `None` takes the server default.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SubscriptionOptions {
    /// Period in seconds at which the server batches updates (0.1 by default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic: Option<f64>,
    /// Send every value change instead of only the latest one per period
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<bool>,
    /// Only send announcements, never values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topicsonly: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Unsubscribe {
    pub subuid: i64,
}

impl_message!(Subscribe => "subscribe", Unsubscribe => "unsubscribe");
