//! Acknowledgement-payload encoding against hand-written expected documents

use aziot_device::protocol::ack_payload;
use serde_json::{json, Map, Value};

fn object(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

#[test]
fn acks_a_single_root_property() {
    let desired = object(json!({ "fanSpeed": 2 }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 7)),
        json!({ "fanSpeed": { "ac": 200, "av": 7, "value": 2 } })
    );
}

#[test]
fn acks_multiple_root_properties() {
    let desired = object(json!({ "fanSpeed": 2, "mode": "eco" }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 3)),
        json!({
            "fanSpeed": { "ac": 200, "av": 3, "value": 2 },
            "mode": { "ac": 200, "av": 3, "value": "eco" }
        })
    );
}

#[test]
fn acks_a_component_with_one_member() {
    let desired = object(json!({
        "thermostat": { "__t": "c", "targetTemperature": 21.5 }
    }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 4)),
        json!({
            "thermostat": {
                "__t": "c",
                "targetTemperature": { "ac": 200, "av": 4, "value": 21.5 }
            }
        })
    );
}

#[test]
fn acks_a_component_with_multiple_members() {
    let desired = object(json!({
        "thermostat": { "__t": "c", "targetTemperature": 21.5, "mode": "heat" }
    }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 9)),
        json!({
            "thermostat": {
                "__t": "c",
                "targetTemperature": { "ac": 200, "av": 9, "value": 21.5 },
                "mode": { "ac": 200, "av": 9, "value": "heat" }
            }
        })
    );
}

#[test]
fn acks_root_and_component_properties_together() {
    let desired = object(json!({
        "fanSpeed": 2,
        "thermostat": { "__t": "c", "targetTemperature": 21.5 }
    }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 11)),
        json!({
            "fanSpeed": { "ac": 200, "av": 11, "value": 2 },
            "thermostat": {
                "__t": "c",
                "targetTemperature": { "ac": 200, "av": 11, "value": 21.5 }
            }
        })
    );
}

#[test]
fn version_marker_never_survives_into_the_ack() {
    let desired = object(json!({ "fanSpeed": 2, "$version": 11 }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 200, 11)),
        json!({ "fanSpeed": { "ac": 200, "av": 11, "value": 2 } })
    );
}

#[test]
fn untagged_object_is_wrapped_whole() {
    let desired = object(json!({
        "settings": { "brightness": 80, "contrast": 50 }
    }));
    assert_eq!(
        Value::Object(ack_payload(&desired, 400, 2)),
        json!({
            "settings": {
                "ac": 400,
                "av": 2,
                "value": { "brightness": 80, "contrast": 50 }
            }
        })
    );
}
