//! Device twin document and the reported-property acknowledgement encoder

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Marker key identifying a component object in a twin property bag.
pub const COMPONENT_TAG: &str = "__t";

/// The full twin document as returned by a twin read (`res/200` payload).
/// Rebuilt from scratch on every read; never diffed or cached.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Twin {
    #[serde(default)]
    pub desired: Map<String, Value>,
    #[serde(default)]
    pub reported: Map<String, Value>,
}

impl Twin {
    /// Version counter the hub stamps on the desired section.
    pub fn desired_version(&self) -> Option<i64> {
        self.desired.get("$version").and_then(Value::as_i64)
    }
}

/// Encode a desired-property object into the acknowledgement shape the hub
/// expects back as reported properties.
///
/// The reserved `$version` key is dropped. Component-tagged values
/// (`__t == "c"`) keep their tag and have each member wrapped individually;
/// everything else is wrapped whole. `ac` (status) and `av` (acked version)
/// apply uniformly to every leaf. Component members are never themselves
/// components, so wrapping stops one level down.
pub fn ack_payload(properties: &Map<String, Value>, ac: i64, av: i64) -> Map<String, Value> {
    let mut payload = Map::new();
    for (name, value) in properties {
        if name == "$version" {
            continue;
        }
        let acked = match component_members(value) {
            Some(members) => {
                let mut wrapped = Map::new();
                wrapped.insert(COMPONENT_TAG.to_string(), Value::from("c"));
                for (member, member_value) in members {
                    if member != COMPONENT_TAG {
                        wrapped.insert(member.clone(), wrap_leaf(member_value, ac, av));
                    }
                }
                Value::Object(wrapped)
            }
            None => wrap_leaf(value, ac, av),
        };
        payload.insert(name.clone(), acked);
    }
    payload
}

fn component_members(value: &Value) -> Option<&Map<String, Value>> {
    value
        .as_object()
        .filter(|object| object.get(COMPONENT_TAG).and_then(Value::as_str) == Some("c"))
}

fn wrap_leaf(value: &Value, ac: i64, av: i64) -> Value {
    json!({ "ac": ac, "av": av, "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn single_prop_at_root() {
        let ack = ack_payload(&object(json!({ "aSingleProp": 1 })), 200, 1);
        assert_eq!(
            Value::Object(ack),
            json!({ "aSingleProp": { "ac": 200, "av": 1, "value": 1 } })
        );
    }

    #[test]
    fn single_prop_in_component() {
        let props = object(json!({ "MyComponent": { "__t": "c", "aSingleProp": "aValue" } }));
        let ack = ack_payload(&props, 200, 1);
        assert_eq!(
            Value::Object(ack),
            json!({
                "MyComponent": {
                    "__t": "c",
                    "aSingleProp": { "ac": 200, "av": 1, "value": "aValue" }
                }
            })
        );
    }

    #[test]
    fn plain_object_is_wrapped_whole() {
        let props = object(json!({ "aComplexObj": { "prop1": 1, "prop2": 2 } }));
        let ack = ack_payload(&props, 200, 1);
        assert_eq!(
            Value::Object(ack),
            json!({
                "aComplexObj": { "ac": 200, "av": 1, "value": { "prop1": 1, "prop2": 2 } }
            })
        );
    }

    #[test]
    fn version_key_is_dropped() {
        let props = object(json!({ "speed": 3, "$version": 17 }));
        let ack = ack_payload(&props, 200, 17);
        assert!(!ack.contains_key("$version"));
        assert_eq!(ack.len(), 1);
    }

    #[test]
    fn key_set_is_preserved_minus_version() {
        let props = object(json!({
            "a": 1,
            "b": { "x": true },
            "Comp": { "__t": "c", "y": 2 },
            "$version": 9
        }));
        let ack = ack_payload(&props, 200, 9);
        let mut keys: Vec<_> = ack.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["Comp", "a", "b"]);
    }

    #[test]
    fn ac_and_av_apply_to_every_leaf() {
        let props = object(json!({
            "plain": 1,
            "Comp": { "__t": "c", "m1": 1, "m2": 2 }
        }));
        let ack = ack_payload(&props, 404, 5);
        assert_eq!(ack["plain"]["ac"], 404);
        assert_eq!(ack["plain"]["av"], 5);
        assert_eq!(ack["Comp"]["m1"]["ac"], 404);
        assert_eq!(ack["Comp"]["m2"]["av"], 5);
    }

    #[test]
    fn empty_input_yields_empty_payload() {
        assert!(ack_payload(&Map::new(), 200, 1).is_empty());
    }

    #[test]
    fn twin_document_parses_with_defaults() {
        let twin: Twin = serde_json::from_str(
            r#"{ "desired": { "interval": 15, "$version": 4 }, "reported": { "interval": 10 } }"#,
        )
        .unwrap();
        assert_eq!(twin.desired_version(), Some(4));
        assert_eq!(twin.reported["interval"], 10);

        let empty: Twin = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.desired_version(), None);
        assert!(empty.reported.is_empty());
    }
}
