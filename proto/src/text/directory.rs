//! Strongly-typed message bodies for messages related to metadata about topics
//! The messages here are sent by the server to describe which topics exist, and how they are configured.

use super::{MessageBody, PropertyMap};
use crate::text::DataType;
use serde::{Deserialize, Serialize};

/// Topic Announcement Message
///
/// Sent from the server to a client when a topic matching one of its subscriptions is created,
/// or in response to the client publishing a topic.
///
/// See: [`Subscribe`], [`PublishReq`]
///
/// [`Subscribe`]: ../subscription/struct.Subscribe.html
/// [`PublishReq`]: ../publish/struct.PublishReq.html
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Announce {
    /// The full name of the topic
    pub name: String,
    /// The ID used by the server when sending MessagePack value updates for this topic.
    pub id: i64,
    /// The type of the data associated with this topic
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Present only when this announce answers a [`PublishReq`] sent by this client.
    ///
    /// [`PublishReq`]: ../publish/struct.PublishReq.html
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubuid: Option<i64>,
    #[serde(default)]
    pub properties: PropertyMap,
}

/// Topic Removed Message
///
/// Sent from the server to indicate that a topic previously shared by [`Announce`] has been deleted.
/// The ID must not be used for value updates after this message.
///
/// [`Announce`]: ./struct.Announce.html
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Unannounce {
    /// The name of the topic
    pub name: String,
    /// The ID that was used when sending value updates for this topic.
    pub id: i64,
}

/// Properties Update Message
///
/// Sent from the server when the properties of an announced topic change.
/// A `null` value in `update` removes that property.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Properties {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<bool>,
    pub update: PropertyMap,
}

impl_message!(Announce => "announce", Unannounce => "unannounce", Properties => "properties");
