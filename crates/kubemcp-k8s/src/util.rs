//! Small parsing and conversion helpers shared by the tool modules

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::DynamicObject;
use kubemcp_types::ConditionInfo;
use regex::Regex;
use serde_json::Value;

use crate::error::{Result, invalid};

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+|Ki|Mi|Gi|Ti|Pi|Ei|n|u|m|k|M|G|T|P|E)?$")
        .expect("quantity regex is valid")
});

/// Parse `<n>s|m|h|d` into seconds
pub fn parse_duration(input: &str) -> Result<i64> {
    let input = input.trim();
    let malformed = || {
        invalid(format!(
            "invalid duration '{}': expected <number>s|m|h|d",
            input
        ))
    };

    let (split, unit) = input.char_indices().last().ok_or_else(malformed)?;
    let multiplier: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86400,
        _ => return Err(malformed()),
    };
    let value: i64 = input[..split]
        .parse()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            invalid(format!(
                "invalid duration '{}': expected a positive number",
                input
            ))
        })?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid(format!("invalid duration '{}': too large", input)))
}

/// Validate a Kubernetes resource quantity (e.g. `500m`, `1.5Gi`)
pub fn validate_quantity(field: &str, value: &str) -> Result<()> {
    if QUANTITY.is_match(value.trim()) {
        Ok(())
    } else {
        Err(invalid(format!(
            "{} '{}' is not a valid Kubernetes quantity",
            field, value
        )))
    }
}

/// Parse `k=v,k2=v2` into a map
pub fn parse_selector(selector: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in selector.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| invalid(format!("invalid selector '{}': expected key=value", pair)))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(format!("invalid selector '{}': empty key", pair)));
        }
        labels.insert(key.to_string(), value.trim().to_string());
    }
    Ok(labels)
}

/// Render a label map as a `k=v,...` selector string
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn time(t: &Option<Time>) -> Option<DateTime<Utc>> {
    t.as_ref().map(|t| t.0)
}

/// Parse an RFC 3339 string from a JSON value
pub fn json_time(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Serialize an object and drop `metadata.managedFields`
pub fn clean_object(obj: &DynamicObject) -> Result<Value> {
    let mut value = serde_json::to_value(obj)?;
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove("managedFields");
    }
    Ok(value)
}

/// Read `status.conditions` from any object
pub fn conditions(value: &Value) -> Vec<ConditionInfo> {
    value
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conds| {
            conds
                .iter()
                .map(|c| ConditionInfo {
                    type_: str_at(c, "/type").unwrap_or_default(),
                    status: str_at(c, "/status").unwrap_or_default(),
                    reason: str_at(c, "/reason"),
                    message: str_at(c, "/message"),
                    last_transition: c
                        .pointer("/lastTransitionTime")
                        .and_then(json_time),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Human age like `3d4h`, `12m`
pub fn age(created: Option<DateTime<Utc>>) -> String {
    let Some(created) = created else {
        return "<unknown>".to_string();
    };
    let secs = (Utc::now() - created).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86400 => format!("{}h{}m", s / 3600, (s % 3600) / 60),
        s => format!("{}d{}h", s / 86400, (s % 86400) / 3600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("5m").unwrap(), 300);
        assert_eq!(parse_duration("2h").unwrap(), 7200);
        assert_eq!(parse_duration("1d").unwrap(), 86400);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for bad in [
            "", "s", "10", "10x", "-5m", "0s", "1.5h", "abc", "5\u{e9}", "\u{e9}",
            "9223372036854775807d", "99999999999999999999s",
        ] {
            assert!(parse_duration(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_validate_quantity() {
        for ok in ["100m", "1", "0.5", "1.5Gi", "512Mi", "2G", "1e3", "250k"] {
            assert!(validate_quantity("cpu", ok).is_ok(), "{ok} should pass");
        }
        for bad in ["", "lots", "1 Gi", "12MB", "Gi", "1.2.3"] {
            assert!(validate_quantity("memory", bad).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_parse_selector() {
        let labels = parse_selector("app=web, tier = frontend").unwrap();
        assert_eq!(labels["app"], "web");
        assert_eq!(labels["tier"], "frontend");
        assert_eq!(selector_string(&labels), "app=web,tier=frontend");

        assert!(parse_selector("app").is_err());
        assert!(parse_selector("=web").is_err());
        assert!(parse_selector("").unwrap().is_empty());
    }

    #[test]
    fn test_conditions_from_value() {
        let value = serde_json::json!({
            "status": {"conditions": [
                {"type": "Available", "status": "True", "reason": "MinimumReplicasAvailable",
                 "lastTransitionTime": "2024-01-01T00:00:00Z"}
            ]}
        });
        let conds = conditions(&value);
        assert_eq!(conds.len(), 1);
        assert_eq!(conds[0].type_, "Available");
        assert!(conds[0].last_transition.is_some());
        assert!(conds[0].message.is_none());
    }

    #[test]
    fn test_age() {
        assert_eq!(age(None), "<unknown>");
        let created = Utc::now() - chrono::Duration::minutes(90);
        assert_eq!(age(Some(created)), "1h30m");
    }
}
