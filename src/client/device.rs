//! The device client: owns the transport session and coordinates I/O
//!
//! One `DeviceClient` is one logical hub session. Outbound twin calls
//! register with the correlator before publishing; a spawned task polls the
//! transport event loop and dispatches everything inbound: correlated
//! responses, method invocations, desired patches. A transport failure
//! stops the loop, fails every pending call and moves the session to
//! `Disconnected`; reconnection is the caller's policy, not ours.

use super::connection::{configure_mqtt_options, wait_for_connected, SessionState};
use super::correlator::{CorrelatedResponse, Correlator, RequestKind};
use super::dispatch::{self, EventForwarder, EventRoute, InboundMessage};
use crate::auth::SasToken;
use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::protocol::topics;
use crate::protocol::{DesiredPropertyPatch, MethodInvocation, Twin};
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// MQTT client for a single hub device session
pub struct DeviceClient {
    config: DeviceConfig,
    client: Option<AsyncClient>,
    correlator: Arc<Mutex<Correlator>>,
    forwarder: Arc<Mutex<EventForwarder>>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    shutdown_tx: Option<watch::Sender<bool>>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl DeviceClient {
    pub fn new(config: DeviceConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::initial());
        Self {
            config,
            client: None,
            correlator: Arc::new(Mutex::new(Correlator::new())),
            forwarder: Arc::new(Mutex::new(EventForwarder::new())),
            state_tx,
            state_rx,
            shutdown_tx: None,
            event_loop_handle: None,
        }
    }

    /// Register the receiver for direct-method invocations. Without one,
    /// invocations are logged and dropped.
    pub async fn set_method_sender(&self, sender: mpsc::Sender<MethodInvocation>) {
        self.forwarder.lock().await.set_method_sender(sender);
    }

    /// Register the receiver for desired-property patches.
    pub async fn set_desired_sender(&self, sender: mpsc::Sender<DesiredPropertyPatch>) {
        self.forwarder.lock().await.set_desired_sender(sender);
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// Watch the session state machine; the receiver doubles as the
    /// disconnect notification channel.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Authenticate and open the session: sign a fresh SAS token, connect
    /// with clean-session semantics, wait for the broker's acknowledgement,
    /// then subscribe to twin responses, method invocations and desired
    /// patches. Subscribe failures abort the attempt.
    pub async fn connect(&mut self) -> DeviceResult<()> {
        if matches!(&*self.state_rx.borrow(), SessionState::Connected) {
            debug!("connect called on an already-connected client");
            return Ok(());
        }
        self.state_tx.send_replace(SessionState::Connecting);

        match self.try_connect().await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.teardown(Some(error.to_string())).await;
                Err(error)
            }
        }
    }

    async fn try_connect(&mut self) -> DeviceResult<()> {
        let device = &self.config.device;
        let key = self.config.device_key()?;
        let resource_uri = format!("{}/devices/{}", device.host, device.device_id);
        let token = SasToken::generate(
            &resource_uri,
            &key,
            None,
            self.config.timeouts.token_ttl_mins,
        )?;

        let options = configure_mqtt_options(device, token.as_str());
        let (client, event_loop) = AsyncClient::new(options, 10);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_event_loop(
            event_loop,
            self.state_tx.clone(),
            shutdown_rx,
            Arc::clone(&self.correlator),
            Arc::clone(&self.forwarder),
            device.device_id.clone(),
        ));

        self.client = Some(client.clone());
        self.shutdown_tx = Some(shutdown_tx);
        self.event_loop_handle = Some(handle);

        wait_for_connected(
            self.state_rx.clone(),
            Duration::from_secs(self.config.timeouts.connect_secs),
        )
        .await?;

        for filter in [
            topics::TWIN_RESPONSE_FILTER,
            topics::METHOD_POST_FILTER,
            topics::DESIRED_PATCH_FILTER,
        ] {
            client
                .subscribe(filter, QoS::AtMostOnce)
                .await
                .map_err(|e| DeviceError::Subscribe(Box::new(e)))?;
        }

        info!(device_id = %self.config.device.device_id, "connected to hub");
        Ok(())
    }

    /// Close the session. Pending twin calls fail with `Disconnected`.
    pub async fn disconnect(&mut self) -> DeviceResult<()> {
        self.teardown(None).await;
        info!("device client disconnected");
        Ok(())
    }

    async fn teardown(&mut self, reason: Option<String>) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(client) = self.client.take() {
            let _ = client.disconnect().await;
        }

        let detail = reason
            .clone()
            .unwrap_or_else(|| "client disconnected".to_string());
        self.correlator
            .lock()
            .await
            .fail_all(|| DeviceError::Disconnected(detail.clone()));
        self.state_tx
            .send_replace(SessionState::Disconnected { reason });

        if let Some(handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => debug!("event loop task shut down gracefully"),
                Ok(Err(join_error)) if !join_error.is_cancelled() => {
                    warn!(%join_error, "event loop task ended with error");
                }
                Err(_) => warn!("event loop task did not stop in time, aborting"),
                _ => {}
            }
        }
    }

    /// Read the full twin document. Requires a connected session; resolves
    /// when the matching `res/200` arrives, or fails on timeout.
    pub async fn get_twin(&self) -> DeviceResult<Twin> {
        let client = self.connected_client()?;
        let (request_id, rx) = self
            .correlator
            .lock()
            .await
            .register(RequestKind::GetTwin);

        debug!(request_id, "requesting twin document");
        if let Err(e) = client
            .publish(topics::twin_get_topic(request_id), QoS::AtMostOnce, false, "")
            .await
        {
            self.correlator.lock().await.abort(request_id);
            return Err(DeviceError::Publish(Box::new(e)));
        }

        let response = self.await_twin_response(request_id, rx).await?;
        parse_twin_document(&response.body)
    }

    /// Patch reported properties with a caller-supplied JSON object,
    /// published verbatim. Resolves with the hub's status (204) once the
    /// matching acknowledgement arrives.
    pub async fn update_twin(&self, reported_properties: &str) -> DeviceResult<u16> {
        let client = self.connected_client()?;
        let (request_id, rx) = self
            .correlator
            .lock()
            .await
            .register(RequestKind::UpdateTwin);

        debug!(request_id, "patching reported properties");
        if let Err(e) = client
            .publish(
                topics::twin_patch_topic(request_id),
                QoS::AtMostOnce,
                false,
                reported_properties,
            )
            .await
        {
            self.correlator.lock().await.abort(request_id);
            return Err(DeviceError::Publish(Box::new(e)));
        }

        let response = self.await_twin_response(request_id, rx).await?;
        Ok(response.status)
    }

    /// Fire-and-forget device-to-cloud telemetry; nothing is correlated or
    /// acknowledged.
    pub async fn send_telemetry(&self, payload: &str) -> DeviceResult<()> {
        let client = self.connected_client()?;
        client
            .publish(
                topics::telemetry_topic(&self.config.device.device_id),
                QoS::AtMostOnce,
                false,
                payload,
            )
            .await
            .map_err(|e| DeviceError::Publish(Box::new(e)))
    }

    /// Answer a direct-method invocation. The status code goes into the
    /// response topic verbatim; the method name is only for the logs.
    pub async fn respond_to_method(
        &self,
        method_name: &str,
        payload: &str,
        request_id: u64,
        status: u16,
    ) -> DeviceResult<()> {
        let client = self.connected_client()?;
        debug!(method_name, request_id, status, "publishing method response");
        client
            .publish(
                topics::method_response_topic(status, request_id),
                QoS::AtMostOnce,
                false,
                payload,
            )
            .await
            .map_err(|e| DeviceError::Publish(Box::new(e)))
    }

    fn connected_client(&self) -> DeviceResult<AsyncClient> {
        let state = self.state_rx.borrow().clone();
        if state != SessionState::Connected {
            return Err(DeviceError::NotConnected { state });
        }
        self.client
            .clone()
            .ok_or(DeviceError::NotConnected { state })
    }

    async fn await_twin_response(
        &self,
        request_id: u64,
        rx: tokio::sync::oneshot::Receiver<DeviceResult<CorrelatedResponse>>,
    ) -> DeviceResult<CorrelatedResponse> {
        let window = Duration::from_secs(self.config.timeouts.twin_secs);
        match tokio::time::timeout(window, rx).await {
            Err(_) => {
                self.correlator.lock().await.abort(request_id);
                Err(DeviceError::Timeout { request_id })
            }
            Ok(Err(_)) => Err(DeviceError::Disconnected(
                "response channel closed".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        // No async in Drop; callers wanting a graceful close use
        // disconnect() explicitly.
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    state_tx: watch::Sender<SessionState>,
    mut shutdown_rx: watch::Receiver<bool>,
    correlator: Arc<Mutex<Correlator>>,
    forwarder: Arc<Mutex<EventForwarder>>,
    device_id: String,
) {
    info!(%device_id, "starting hub event loop");
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!("shutdown signal received, stopping event loop");
                    break;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(event) => match dispatch::route_event(&event) {
                    EventRoute::ConnAck => {
                        info!("broker acknowledged connection");
                        state_tx.send_replace(SessionState::Connected);
                    }
                    EventRoute::Message { topic, payload } => {
                        handle_inbound(&topic, &payload, &correlator, &forwarder).await;
                    }
                    EventRoute::SubAck { return_codes } => {
                        match dispatch::validate_suback(&return_codes) {
                            Ok(()) => debug!(?return_codes, "subscription confirmed"),
                            Err(reason) => {
                                error!(%reason, "subscription rejected by broker");
                                fail_session(&state_tx, &correlator, reason).await;
                                break;
                            }
                        }
                    }
                    EventRoute::Disconnect => {
                        warn!("broker closed the session");
                        fail_session(
                            &state_tx,
                            &correlator,
                            "broker closed the session".to_string(),
                        )
                        .await;
                        break;
                    }
                    EventRoute::Infrastructure => {}
                },
                Err(connection_error) => {
                    let reason = connection_error.to_string();
                    error!(%reason, "transport error, stopping event loop");
                    fail_session(&state_tx, &correlator, reason).await;
                    break;
                }
            }
        }
    }
    info!(%device_id, "hub event loop stopped");
}

/// Fail every pending call, then broadcast the disconnect. Callers with no
/// in-flight request learn of the drop through the state channel only.
async fn fail_session(
    state_tx: &watch::Sender<SessionState>,
    correlator: &Arc<Mutex<Correlator>>,
    reason: String,
) {
    correlator
        .lock()
        .await
        .fail_all(|| DeviceError::Disconnected(reason.clone()));
    state_tx.send_replace(SessionState::Disconnected {
        reason: Some(reason),
    });
}

/// Parse a `res/200` body into a twin document. A malformed body rejects
/// only the call that was awaiting it.
fn parse_twin_document(body: &str) -> DeviceResult<Twin> {
    serde_json::from_str(body).map_err(|source| DeviceError::ProtocolDecode {
        context: "twin document",
        source,
    })
}

async fn handle_inbound(
    topic: &str,
    payload: &[u8],
    correlator: &Arc<Mutex<Correlator>>,
    forwarder: &Arc<Mutex<EventForwarder>>,
) {
    match dispatch::decode_inbound(topic, payload) {
        InboundMessage::TwinResponse {
            status,
            request_id,
            body,
        } => {
            let outcome = if (200..300).contains(&status) {
                Ok(CorrelatedResponse { status, body })
            } else {
                Err(DeviceError::TwinStatus { status })
            };
            if correlator
                .lock()
                .await
                .resolve(request_id, outcome)
                .is_none()
            {
                debug!(request_id, status, "twin response with no pending request");
            }
        }
        InboundMessage::Method(invocation) => {
            debug!(
                method = %invocation.method_name,
                request_id = invocation.request_id,
                "direct method invoked"
            );
            forwarder.lock().await.forward_method(invocation).await;
        }
        InboundMessage::DesiredPatch(patch) => {
            debug!(version = patch.version, "desired-property patch received");
            forwarder.lock().await.forward_desired(patch).await;
        }
        InboundMessage::Ignored => {}
    }
}
