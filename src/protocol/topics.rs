//! Topic grammar for the hub's twin, direct-method and telemetry channels
//!
//! Every operation the hub exposes over MQTT is addressed by a fixed topic
//! shape; request/response correlation rides in the `?$rid=` suffix. This
//! module is pure string transforms: builders for outbound topics and a
//! parser for inbound ones.

/// Subscription filter covering every twin get/update response.
pub const TWIN_RESPONSE_FILTER: &str = "$iothub/twin/res/#";
/// Subscription filter for direct-method invocations.
pub const METHOD_POST_FILTER: &str = "$iothub/methods/POST/#";
/// Subscription filter for desired-property patches.
pub const DESIRED_PATCH_FILTER: &str = "$iothub/twin/PATCH/properties/desired/#";

const TWIN_RESPONSE_PREFIX: &str = "$iothub/twin/res/";
const METHOD_POST_PREFIX: &str = "$iothub/methods/POST/";
const DESIRED_PATCH_PREFIX: &str = "$iothub/twin/PATCH/properties/desired";

/// Twin read request: the response arrives on `twin/res/200` with the same id.
pub fn twin_get_topic(request_id: u64) -> String {
    format!("$iothub/twin/GET/?$rid={request_id}")
}

/// Reported-property patch: acknowledged on `twin/res/204` with the same id.
pub fn twin_patch_topic(request_id: u64) -> String {
    format!("$iothub/twin/PATCH/properties/reported/?$rid={request_id}")
}

/// Direct-method response, echoing the invocation's request id.
pub fn method_response_topic(status: u16, request_id: u64) -> String {
    format!("$iothub/methods/res/{status}/?$rid={request_id}")
}

/// Device-to-cloud telemetry topic.
pub fn telemetry_topic(device_id: &str) -> String {
    format!("devices/{device_id}/messages/events/")
}

/// A recognized inbound topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    /// `$iothub/twin/res/<status>/?$rid=<id>`: response to a twin get/update.
    TwinResponse { status: u16, request_id: u64 },
    /// `$iothub/methods/POST/<method>/?$rid=<id>`: direct-method invocation.
    MethodInvocation { method: String, request_id: u64 },
    /// `$iothub/twin/PATCH/properties/desired/...`: desired-property patch.
    DesiredPatch,
}

/// Classify an inbound topic. Topics matching none of the registered
/// patterns return `None`; the dispatcher drops them.
pub fn parse_inbound(topic: &str) -> Option<InboundTopic> {
    if let Some(rest) = topic.strip_prefix(TWIN_RESPONSE_PREFIX) {
        let (status, query) = rest.split_once("/?")?;
        return Some(InboundTopic::TwinResponse {
            status: status.parse().ok()?,
            request_id: parse_rid(query)?,
        });
    }
    if let Some(rest) = topic.strip_prefix(METHOD_POST_PREFIX) {
        let (method, query) = rest.split_once("/?")?;
        if method.is_empty() || method.contains('/') {
            return None;
        }
        return Some(InboundTopic::MethodInvocation {
            method: method.to_string(),
            request_id: parse_rid(query)?,
        });
    }
    if topic.starts_with(DESIRED_PATCH_PREFIX) {
        return Some(InboundTopic::DesiredPatch);
    }
    None
}

// The hub may append further pairs after the rid (`?$rid=7&$version=3`).
fn parse_rid(query: &str) -> Option<u64> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("$rid="))
        .and_then(|value| value.parse().ok())
}
