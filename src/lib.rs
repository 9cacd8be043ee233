//! Device-side client for Azure IoT Hub over MQTT
//!
//! Connects a single device to a hub with SAS-token authentication and
//! exposes the device-facing surface of the hub protocol:
//! - Device twin reads and reported-property updates, correlated by
//!   request id
//! - Direct-method invocations delivered over a channel, answered with an
//!   explicit status
//! - Desired-property patches with version tracking and acknowledgement
//!   payload construction
//! - Fire-and-forget device-to-cloud telemetry
//!
//! # Quick Start
//!
//! ```no_run
//! use aziot_device::{DeviceClient, DeviceConfig};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeviceConfig::load_from_file(Path::new("device.toml"))?;
//! let mut client = DeviceClient::new(config);
//!
//! client.connect().await?;
//!
//! let twin = client.get_twin().await?;
//! println!("desired version: {:?}", twin.desired_version());
//!
//! client
//!     .update_twin(r#"{"firmwareVersion":"1.2.3"}"#)
//!     .await?;
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod protocol;

pub use auth::SasToken;
pub use client::{DeviceClient, SessionState};
pub use config::{DeviceConfig, DeviceSection, TimeoutSection};
pub use error::{DeviceError, DeviceResult};
pub use protocol::{ack_payload, DesiredPropertyPatch, MethodInvocation, Twin};
