//! Pure routing of transport events and inbound messages
//!
//! Routing decisions are separated from the I/O loop so they can be tested
//! against hand-built packets: one function classifies raw rumqttc events,
//! another decodes recognized publishes into protocol messages, and the
//! forwarder hands server-initiated events to whoever registered for them.

use crate::protocol::topics::{self, InboundTopic};
use crate::protocol::{DesiredPropertyPatch, MethodInvocation};
use rumqttc::{Event, Packet, SubscribeReasonCode};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routing decision for one transport event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Broker acknowledged the connection
    ConnAck,
    /// Message delivered on a subscribed topic
    Message { topic: String, payload: Vec<u8> },
    /// Subscription acknowledged with per-filter return codes
    SubAck { return_codes: Vec<SubscribeReasonCode> },
    /// Broker closed the session
    Disconnect,
    /// Housekeeping traffic (pings, outgoing acks); nothing to do
    Infrastructure,
}

/// Classify a rumqttc event.
pub fn route_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnAck,
        Event::Incoming(Packet::Publish(publish)) => EventRoute::Message {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
        },
        Event::Incoming(Packet::SubAck(suback)) => EventRoute::SubAck {
            return_codes: suback.return_codes.clone(),
        },
        Event::Incoming(Packet::Disconnect) => EventRoute::Disconnect,
        Event::Incoming(_) | Event::Outgoing(_) => EventRoute::Infrastructure,
    }
}

/// Reject a suback carrying any failed filter.
pub fn validate_suback(return_codes: &[SubscribeReasonCode]) -> Result<(), String> {
    if return_codes
        .iter()
        .any(|code| matches!(code, SubscribeReasonCode::Failure))
    {
        Err(format!(
            "broker rejected subscription: {return_codes:?}"
        ))
    } else {
        Ok(())
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Response to a pending twin get/update
    TwinResponse {
        status: u16,
        request_id: u64,
        body: String,
    },
    /// Direct-method invocation
    Method(MethodInvocation),
    /// Desired-property patch, already parsed
    DesiredPatch(DesiredPropertyPatch),
    /// Topic matched no registered pattern, or the patch body was invalid
    Ignored,
}

/// Decode a delivered message against the topic grammar. Unrecognized
/// topics and malformed desired payloads are dropped here, never raised.
pub fn decode_inbound(topic: &str, payload: &[u8]) -> InboundMessage {
    let body = String::from_utf8_lossy(payload).into_owned();
    match topics::parse_inbound(topic) {
        Some(InboundTopic::TwinResponse { status, request_id }) => InboundMessage::TwinResponse {
            status,
            request_id,
            body,
        },
        Some(InboundTopic::MethodInvocation { method, request_id }) => {
            InboundMessage::Method(MethodInvocation {
                method_name: method,
                payload: body,
                request_id,
            })
        }
        Some(InboundTopic::DesiredPatch) => match DesiredPropertyPatch::from_payload(&body) {
            Ok(patch) => InboundMessage::DesiredPatch(patch),
            Err(error) => {
                warn!(%topic, %error, "dropping unparseable desired-property patch");
                InboundMessage::Ignored
            }
        },
        None => {
            debug!(%topic, "ignoring message on unrecognized topic");
            InboundMessage::Ignored
        }
    }
}

/// Delivers server-initiated events to registered consumers. Replaces the
/// original's single reassignable callback fields: consumers hand over an
/// mpsc sender and keep the receiving end.
pub struct EventForwarder {
    method_tx: Option<mpsc::Sender<MethodInvocation>>,
    desired_tx: Option<mpsc::Sender<DesiredPropertyPatch>>,
}

impl EventForwarder {
    pub fn new() -> Self {
        Self {
            method_tx: None,
            desired_tx: None,
        }
    }

    pub fn set_method_sender(&mut self, sender: mpsc::Sender<MethodInvocation>) {
        self.method_tx = Some(sender);
    }

    pub fn set_desired_sender(&mut self, sender: mpsc::Sender<DesiredPropertyPatch>) {
        self.desired_tx = Some(sender);
    }

    pub async fn forward_method(&self, invocation: MethodInvocation) {
        match &self.method_tx {
            Some(sender) => {
                if let Err(error) = sender.send(invocation).await {
                    warn!(%error, "method invocation receiver dropped; event lost");
                }
            }
            None => {
                warn!("received method invocation but no handler registered; event dropped");
            }
        }
    }

    pub async fn forward_desired(&self, patch: DesiredPropertyPatch) {
        match &self.desired_tx {
            Some(sender) => {
                if let Err(error) = sender.send(patch).await {
                    warn!(%error, "desired-patch receiver dropped; event lost");
                }
            }
            None => {
                debug!("received desired-property patch but no handler registered");
            }
        }
    }
}

impl Default for EventForwarder {
    fn default() -> Self {
        Self::new()
    }
}
