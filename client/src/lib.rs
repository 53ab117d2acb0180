//! # A reactive NetworkTables 4 client
//!
//! [`NTClient`] connects to the NetworkTables server running on an FRC robot and keeps a live,
//! typed copy of the topics it subscribed to. It reconnects on its own, and tracks whether
//! robot code is running through a heartbeat topic.
//!
//! UI code reads the copy through bindings: [`use_nt_value`] for one topic,
//! [`use_nt_connection`] and [`use_robot_connection`] for the connection flags.
//!
//! ```no_run
//! use nt4_client::{use_nt_value, ClientConfig, NTClient};
//!
//! # fn main() -> nt4_client::Result<()> {
//! let client = NTClient::create(ClientConfig::new("10.12.34.2"))?;
//! let speed = use_nt_value(&client, "/SmartDashboard/speed", 0.0);
//! println!("speed is {}", speed.get());
//! # Ok(())
//! # }
//! ```
//!
//! [`NTClient`]: ./struct.NTClient.html
//! [`use_nt_value`]: ./fn.use_nt_value.html
//! [`use_nt_connection`]: ./fn.use_nt_connection.html
//! [`use_robot_connection`]: ./fn.use_robot_connection.html

mod backoff;
mod binding;
mod client;
mod config;
mod entry;
mod error;
pub mod net;
mod registry;
mod state;
mod status;
mod store;
mod util;

pub use binding::{
    use_nt_connection, use_nt_connection_with, use_nt_value, use_nt_value_with,
    use_robot_connection, use_robot_connection_with, NtFlag, NtType, NtValue, Setter,
};
pub use client::{NTClient, Subscription};
pub use config::{ClientConfig, ReconnectConfig, WritePolicy, DEFAULT_PORT};
pub use entry::Topic;
pub use error::{Error, Result};
pub use registry::Pattern;
pub use status::{RobotState, TransportState};

pub use proto::prelude::{DataType, NTValue, PropertyMap};
