//! # The protocol for NetworkTables v4 (NT over WebSockets)
//!
//! This crate contains Rust representations of the messages described in the NTv4 specification.
//! Control messages travel in WebSocket TEXT frames as JSON arrays of `{"method", "params"}` objects,
//! value updates travel in BINARY frames as concatenated MessagePack arrays `[id, timestamp, type, value]`.
//!
//! This crate does not prescribe a runtime that must be used, a [`Frame`] is decoded from and encoded to
//! plain strings and byte vectors. Implementation details of the transport are left to consumers of the crate.
//!
//! [`Frame`]: ./prelude/enum.Frame.html

mod bin;
mod error;
mod ext;
mod message;
mod text;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::bin::*;
    pub use crate::error::{Error, Result};
    pub use crate::ext::ValueExt;
    pub use crate::message::*;
    pub use crate::text::*;
}
