use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

macro_rules! impl_message {
    ($($name:ident => $method:literal),+) => {
        $(
        impl MessageBody for $name {
            const METHOD: &'static str = $method;
        }
        )+
    }
}

mod directory;
mod publish;
mod subscription;

pub use directory::{Announce, Properties, Unannounce};
pub use publish::{PublishReq, PublishRel, SetProperties};
pub use subscription::{Subscribe, SubscriptionOptions, Unsubscribe};

/// A JSON object of topic properties, e.g. `{"persistent": true}`
pub type PropertyMap = serde_json::Map<String, Value>;

pub trait MessageBody: Serialize + Sized {
    /// The value of the `method` key identifying this body on the wire
    const METHOD: &'static str;

    fn into_message(self) -> Result<NTTextMessage> {
        Ok(NTTextMessage {
            method: Self::METHOD.to_string(),
            params: serde_json::to_value(self)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageValue {
    PublishReq(PublishReq),
    PublishRel(PublishRel),
    SetProperties(SetProperties),
    Subscribe(Subscribe),
    Unsubscribe(Unsubscribe),
    Announce(Announce),
    Unannounce(Unannounce),
    Properties(Properties),
}

/// The type of a topic, as named in announce and publish messages
///
/// Anything the protocol does not define (`struct:Pose2d`, `proto:...`) is kept in [`DataType::Other`]
/// and carries raw bytes.
///
/// [`DataType::Other`]: ./enum.DataType.html#variant.Other
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum DataType {
    Boolean,
    Double,
    Int,
    Float,
    String,
    Json,
    Raw,
    Rpc,
    MsgPack,
    Protobuf,
    BooleanArray,
    DoubleArray,
    IntArray,
    FloatArray,
    StringArray,
    Other(String),
}

impl DataType {
    pub fn as_str(&self) -> &str {
        match self {
            DataType::Boolean => "boolean",
            DataType::Double => "double",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Json => "json",
            DataType::Raw => "raw",
            DataType::Rpc => "rpc",
            DataType::MsgPack => "msgpack",
            DataType::Protobuf => "protobuf",
            DataType::BooleanArray => "boolean[]",
            DataType::DoubleArray => "double[]",
            DataType::IntArray => "int[]",
            DataType::FloatArray => "float[]",
            DataType::StringArray => "string[]",
            DataType::Other(name) => name,
        }
    }

    /// The index written in the third slot of binary value updates
    pub fn type_index(&self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Double => 1,
            DataType::Int => 2,
            DataType::Float => 3,
            DataType::String | DataType::Json => 4,
            DataType::Raw
            | DataType::Rpc
            | DataType::MsgPack
            | DataType::Protobuf
            | DataType::Other(_) => 5,
            DataType::BooleanArray => 16,
            DataType::DoubleArray => 17,
            DataType::IntArray => 18,
            DataType::FloatArray => 19,
            DataType::StringArray => 20,
        }
    }
}

impl From<String> for DataType {
    fn from(name: String) -> DataType {
        match name.as_str() {
            "boolean" => DataType::Boolean,
            "double" => DataType::Double,
            "int" => DataType::Int,
            "float" => DataType::Float,
            "string" => DataType::String,
            "json" => DataType::Json,
            "raw" => DataType::Raw,
            "rpc" => DataType::Rpc,
            "msgpack" => DataType::MsgPack,
            "protobuf" => DataType::Protobuf,
            "boolean[]" => DataType::BooleanArray,
            "double[]" => DataType::DoubleArray,
            "int[]" => DataType::IntArray,
            "float[]" => DataType::FloatArray,
            "string[]" => DataType::StringArray,
            _ => DataType::Other(name),
        }
    }
}

impl From<DataType> for String {
    fn from(ty: DataType) -> String {
        match ty {
            DataType::Other(name) => name,
            ty => ty.as_str().to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single control message, as found in the JSON array of a TEXT frame
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NTTextMessage {
    pub method: String,
    pub params: Value,
}

macro_rules! to_data_body {
    ($self:ident, $($ty:ident),+) => {
        $(
        if $self.method == <$ty as MessageBody>::METHOD {
            return Ok(MessageValue::$ty(serde_json::from_value::<$ty>($self.params)?));
        }
        )+
    }
}

impl NTTextMessage {
    pub fn data(self) -> Result<MessageValue> {
        to_data_body!(
            self,
            PublishReq,
            PublishRel,
            SetProperties,
            Subscribe,
            Unsubscribe,
            Announce,
            Unannounce,
            Properties
        );
        Err(Error::UnknownMethod(self.method))
    }
}
