//! Pure session-state and connection-setup helpers
//!
//! Everything here is computable without I/O: the session state machine,
//! the MQTT user name grammar, broker option assembly, and the wait-for-
//! confirmation primitive the impure client drives.

use crate::config::DeviceSection;
use crate::error::{DeviceError, DeviceResult};
use rumqttc::{MqttOptions, Transport};
use std::time::Duration;
use tokio::sync::watch;

/// Hub REST/MQTT api-version the user name pins.
pub const API_VERSION: &str = "2020-05-31-preview";

/// TLS MQTT port the hub listens on.
const HUB_MQTT_PORT: u16 = 8883;

/// Keep-alive matching the hub's recommended 120s window.
const KEEP_ALIVE: Duration = Duration::from_secs(120);

/// Connection state for one device session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No transport session; `reason` carries the last error, if any
    Disconnected { reason: Option<String> },
    /// Connect in progress, before the broker acknowledged
    Connecting,
    /// Session established and subscriptions issued
    Connected,
}

impl SessionState {
    /// Fresh state for a client that has never connected.
    pub fn initial() -> Self {
        SessionState::Disconnected { reason: None }
    }
}

/// Build the MQTT user name: `<host>/<deviceId>/?api-version=<pinned>`,
/// plus `&model-id=` when the device announces a digital-twin model.
pub fn build_username(host: &str, device_id: &str, model_id: Option<&str>) -> String {
    let mut username = format!("{host}/{device_id}/?api-version={API_VERSION}");
    if let Some(model_id) = model_id {
        username.push_str("&model-id=");
        username.push_str(model_id);
    }
    username
}

/// Assemble broker options for one connection attempt. The password is a
/// freshly signed SAS token; clean-session is always on, so the hub holds
/// no state for us between sessions.
pub fn configure_mqtt_options(device: &DeviceSection, sas_token: &str) -> MqttOptions {
    let mut options = MqttOptions::new(&device.device_id, &device.host, HUB_MQTT_PORT);
    options.set_transport(Transport::tls_with_default_config());
    options.set_credentials(
        build_username(&device.host, &device.device_id, device.model_id.as_deref()),
        sas_token,
    );
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(true);
    options
}

/// Wait until the session reaches `Connected`, or fail with the first
/// disconnect reason or the timeout.
///
/// ```
/// use aziot_device::client::connection::{wait_for_connected, SessionState};
/// use std::time::Duration;
/// use tokio::sync::watch;
///
/// let (_state_tx, state_rx) = watch::channel(SessionState::Connected);
/// tokio_test::block_on(async {
///     wait_for_connected(state_rx, Duration::from_millis(10))
///         .await
///         .unwrap();
/// });
/// ```
pub async fn wait_for_connected(
    mut state_rx: watch::Receiver<SessionState>,
    timeout: Duration,
) -> DeviceResult<()> {
    let wait = tokio::time::timeout(timeout, async {
        loop {
            match &*state_rx.borrow_and_update() {
                SessionState::Connected => return Ok(()),
                SessionState::Disconnected {
                    reason: Some(reason),
                } => return Err(DeviceError::Connect(reason.clone())),
                _ => {}
            }
            if state_rx.changed().await.is_err() {
                return Err(DeviceError::Connect("state channel closed".to_string()));
            }
        }
    })
    .await;

    match wait {
        Ok(result) => result,
        Err(_) => Err(DeviceError::Connect(
            "no connection acknowledgement before timeout".to_string(),
        )),
    }
}
