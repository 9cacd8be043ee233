//! Inbound event payloads delivered to registered consumers

use serde_json::{Map, Value};

/// A direct-method call received from the hub. Consumed exactly once; the
/// handler is expected to eventually publish a matching response via
/// `DeviceClient::respond_to_method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInvocation {
    pub method_name: String,
    /// Raw payload; the hub does not guarantee JSON here.
    pub payload: String,
    pub request_id: u64,
}

/// Reply to a [`MethodInvocation`]. The status code is embedded verbatim in
/// the response topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResponse {
    pub request_id: u64,
    pub status: u16,
    pub payload: String,
}

/// A desired-property patch pushed by the hub.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredPropertyPatch {
    /// The patch object as received, `$version` included; feed it to
    /// [`ack_payload`](crate::protocol::ack_payload) unchanged.
    pub properties: Map<String, Value>,
    pub version: i64,
}

impl DesiredPropertyPatch {
    /// Parse the raw payload of a desired-patch message.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        let properties: Map<String, Value> = serde_json::from_str(payload)?;
        let version = properties
            .get("$version")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(Self {
            properties,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_patch_parses_version() {
        let patch =
            DesiredPropertyPatch::from_payload(r#"{ "interval": 30, "$version": 7 }"#).unwrap();
        assert_eq!(patch.version, 7);
        assert_eq!(patch.properties["interval"], 30);
        assert!(patch.properties.contains_key("$version"));
    }

    #[test]
    fn desired_patch_without_version_defaults_to_zero() {
        let patch = DesiredPropertyPatch::from_payload(r#"{ "interval": 30 }"#).unwrap();
        assert_eq!(patch.version, 0);
    }

    #[test]
    fn desired_patch_rejects_non_object_payloads() {
        assert!(DesiredPropertyPatch::from_payload("[1, 2]").is_err());
        assert!(DesiredPropertyPatch::from_payload("not json").is_err());
    }
}
