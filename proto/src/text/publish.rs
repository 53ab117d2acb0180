use super::{DataType, MessageBody, PropertyMap};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublishReq {
    pub name: String,
    /// Client chosen id, used in place of the topic id for value updates sent by this publisher
    pub pubuid: i64,
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub properties: PropertyMap,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublishRel {
    pub pubuid: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetProperties {
    pub name: String,
    pub update: PropertyMap,
}

impl_message!(PublishReq => "publish", PublishRel => "unpublish", SetProperties => "setproperties");
