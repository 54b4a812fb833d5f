//! Home Assistant MQTT discovery payload construction.
//!
//! Plain JSON built field-by-field, as the source does — key ordering is
//! not semantically significant to the consumer (§9), so `serde_json::json!`
//! is used directly rather than a typed struct per component.

use serde_json::{json, Value};

/// One bus-exposed entity and how it should be discovered.
pub struct EntityDef {
    pub key: &'static str,
    pub component: &'static str,
    pub device_class: Option<&'static str>,
    pub settable: bool,
    pub fixed_options: Option<&'static [&'static str]>,
}

/// Every entity §6 names under `<root>/<device-hex>/<param>`.
pub const ENTITIES: &[EntityDef] = &[
    EntityDef { key: "uptime", component: "sensor", device_class: Some("duration"), settable: false, fixed_options: None },
    EntityDef { key: "switch_state", component: "binary_sensor", device_class: None, settable: false, fixed_options: None },
    EntityDef { key: "load_detected", component: "binary_sensor", device_class: Some("problem"), settable: false, fixed_options: None },
    EntityDef { key: "advance_mode", component: "switch", device_class: None, settable: true, fixed_options: None },
    EntityDef { key: "load_was_detected_previously", component: "binary_sensor", device_class: None, settable: false, fixed_options: None },
    EntityDef { key: "boost", component: "select", device_class: None, settable: true, fixed_options: Some(&["Off", "1 hour", "2 hours"]) },
    EntityDef { key: "work_mode", component: "select", device_class: None, settable: true, fixed_options: Some(&["Auto", "Always off", "Always on", "Holiday"]) },
    EntityDef { key: "boost_duration_left", component: "sensor", device_class: None, settable: false, fixed_options: None },
    EntityDef { key: "code_version", component: "sensor", device_class: None, settable: false, fixed_options: None },
    EntityDef { key: "active_schedule", component: "select", device_class: None, settable: true, fixed_options: None },
    EntityDef { key: "active_schedule_id", component: "sensor", device_class: None, settable: false, fixed_options: None },
];

pub fn find_entity(key: &str) -> Option<&'static EntityDef> {
    ENTITIES.iter().find(|e| e.key == key)
}

fn friendly_name(key: &str) -> String {
    let mut out = String::new();
    for (i, word) in key.split('_').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
        }
        out.push_str(chars.as_str());
    }
    out
}

/// Builds `(discovery_topic, payload)` for one entity on one device.
///
/// `options` overrides `entity.fixed_options` for the `active_schedule`
/// selector, whose choices depend on that device's cached schedule names.
pub fn build_config(
    discovery_root: &str,
    root_topic: &str,
    device_hex: &str,
    device_id: u32,
    entity: &EntityDef,
    options: Option<&[String]>,
) -> (String, Value) {
    let unique_id = format!("timeguard_{device_hex}_{}", entity.key);
    let base = format!("{root_topic}/{device_hex}");
    let gateway_lwt = format!("{root_topic}/lwt");
    let device_lwt = format!("{base}/lwt");

    let mut payload = json!({
        "~": base,
        "name": friendly_name(entity.key),
        "unique_id": unique_id,
        "state_topic": format!("~/{}", entity.key),
        "availability_mode": "all",
        "availability": [
            { "topic": gateway_lwt },
            { "topic": device_lwt },
        ],
        "device": {
            "identifiers": [format!("tg:{device_id}")],
            "manufacturer": "Timeguard",
            "name": format!("Timeguard Timeswitch {device_hex}"),
        },
    });

    if let Some(device_class) = entity.device_class {
        payload["device_class"] = json!(device_class);
    }
    if entity.settable {
        payload["command_topic"] = json!(format!("~/{}/set", entity.key));
    }
    if let Some(fixed) = entity.fixed_options {
        payload["options"] = json!(fixed);
    } else if let Some(dynamic) = options {
        payload["options"] = json!(dynamic);
    }

    let topic = format!("{discovery_root}/{}/{unique_id}/config", entity.component);
    (topic, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_name_splits_and_titlecases() {
        assert_eq!(friendly_name("load_detected"), "Load Detected");
        assert_eq!(friendly_name("uptime"), "Uptime");
    }

    #[test]
    fn settable_entity_gets_command_topic() {
        let entity = find_entity("advance_mode").unwrap();
        let (topic, payload) = build_config("homeassistant", "timeguard", "12345678", 0x1234_5678, entity, None);
        assert_eq!(topic, "homeassistant/switch/timeguard_12345678_advance_mode/config");
        assert_eq!(payload["command_topic"], "~/advance_mode/set");
    }

    #[test]
    fn active_schedule_uses_dynamic_options() {
        let entity = find_entity("active_schedule").unwrap();
        let options = vec!["#1: A".to_string(), "#2: B".to_string()];
        let (_, payload) = build_config("homeassistant", "timeguard", "00000001", 1, entity, Some(&options));
        assert_eq!(payload["options"], json!(["#1: A", "#2: B"]));
    }
}
