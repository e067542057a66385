// src/core/flatten.rs

//! Projection of the nested report into ordered `(key, value)` pairs for
//! tabular export.
//!
//! List policy: a list whose elements are all scalars becomes one pair whose
//! value is the elements joined with `list_delimiter`. A list holding at least
//! one map or list is expanded per index (`key_0`, `key_1`, ...). Empty lists
//! and empty maps still produce one pair with an empty value, so the key is
//! visible in the CSV.

use serde_json::Value;

/// Ordered tabular projection of a report.
pub type FlatRecord = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flattener {
    pub separator: String,
    pub list_delimiter: String,
}

impl Default for Flattener {
    fn default() -> Self {
        Self {
            separator: "_".to_string(),
            list_delimiter: ", ".to_string(),
        }
    }
}

impl Flattener {
    pub fn new(separator: impl Into<String>, list_delimiter: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
            list_delimiter: list_delimiter.into(),
        }
    }

    /// Flattens `value` into pairs. A bare scalar at the root yields a single
    /// pair with an empty key.
    pub fn flatten(&self, value: &Value) -> FlatRecord {
        let mut out = Vec::new();
        self.walk("", value, &mut out);
        out
    }

    fn join(&self, parent: &str, key: &str) -> String {
        if parent.is_empty() {
            key.to_string()
        } else {
            format!("{parent}{}{key}", self.separator)
        }
    }

    fn walk(&self, key: &str, value: &Value, out: &mut FlatRecord) {
        match value {
            Value::Object(map) if map.is_empty() => out.push((key.to_string(), String::new())),
            Value::Object(map) => {
                for (child, v) in map {
                    self.walk(&self.join(key, child), v, out);
                }
            }
            Value::Array(items) if items.is_empty() => out.push((key.to_string(), String::new())),
            Value::Array(items) if items.iter().all(is_scalar) => {
                let joined = items
                    .iter()
                    .map(render_scalar)
                    .collect::<Vec<_>>()
                    .join(&self.list_delimiter);
                out.push((key.to_string(), joined));
            }
            Value::Array(items) => {
                for (index, v) in items.iter().enumerate() {
                    self.walk(&self.join(key, &index.to_string()), v, out);
                }
            }
            scalar => out.push((key.to_string(), render_scalar(scalar))),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Leaves as the flattener counts them: one per scalar, one per all-scalar
    /// list, one per empty container.
    fn count_leaves(value: &Value) -> usize {
        match value {
            Value::Object(map) if map.is_empty() => 1,
            Value::Object(map) => map.values().map(count_leaves).sum(),
            Value::Array(items) if items.is_empty() => 1,
            Value::Array(items) if items.iter().all(is_scalar) => 1,
            Value::Array(items) => items.iter().map(count_leaves).sum(),
            _ => 1,
        }
    }

    fn sample() -> Value {
        json!({
            "domain_info": {
                "registrar": "Example Registrar, Inc.",
                "name_servers": ["a.iana-servers.net", "b.iana-servers.net"],
                "emails": null
            },
            "geolocation_info": {
                "ip_addresses": {"ipv4": ["93.184.216.34"], "ipv6": []},
                "ip_details": [
                    {"ip": "93.184.216.34", "error": "timed out"},
                    {"ip": "2606:2800::1", "country": "US", "latitude": 42.1}
                ]
            },
            "ports_info": {"open_ports": {}, "ports_scanned": 18},
            "ping_info": {"reachable": false}
        })
    }

    #[test]
    fn nested_keys_are_joined_with_separator() {
        let flat = Flattener::default().flatten(&json!({"a": {"b": {"c": 1}}}));
        assert_eq!(flat, vec![("a_b_c".to_string(), "1".to_string())]);
    }

    #[test]
    fn scalar_lists_join_into_one_value() {
        let flat = Flattener::default().flatten(&sample());
        let ns = flat.iter().find(|(k, _)| k == "domain_info_name_servers").unwrap();
        assert_eq!(ns.1, "a.iana-servers.net, b.iana-servers.net");
    }

    #[test]
    fn lists_of_maps_expand_per_index() {
        let flat = Flattener::default().flatten(&sample());
        let keys: Vec<&str> = flat.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"geolocation_info_ip_details_0_ip"));
        assert!(keys.contains(&"geolocation_info_ip_details_0_error"));
        assert!(keys.contains(&"geolocation_info_ip_details_1_latitude"));
    }

    #[test]
    fn mixed_list_keeps_scalars_at_indexed_keys() {
        let flat = Flattener::default().flatten(&json!({"x": [1, {"y": true}]}));
        assert_eq!(
            flat,
            vec![
                ("x_0".to_string(), "1".to_string()),
                ("x_1_y".to_string(), "true".to_string())
            ]
        );
    }

    #[test]
    fn nulls_and_empty_containers_render_empty() {
        let flat = Flattener::default().flatten(&sample());
        let lookup = |key: &str| flat.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());
        assert_eq!(lookup("domain_info_emails"), Some(String::new()));
        assert_eq!(lookup("ports_info_open_ports"), Some(String::new()));
        assert_eq!(lookup("geolocation_info_ip_addresses_ipv6"), Some(String::new()));
        assert_eq!(lookup("ping_info_reachable"), Some("false".to_string()));
    }

    #[test]
    fn flattening_is_total() {
        let value = sample();
        assert_eq!(Flattener::default().flatten(&value).len(), count_leaves(&value));
    }

    #[test]
    fn flattening_is_deterministic_and_order_preserving() {
        let value = sample();
        let first = Flattener::default().flatten(&value);
        let second = Flattener::default().flatten(&value);
        assert_eq!(first, second);
        assert_eq!(first[0].0, "domain_info_registrar");
        assert_eq!(first.last().unwrap().0, "ping_info_reachable");
    }

    #[test]
    fn custom_separator_and_delimiter() {
        let flattener = Flattener::new(".", "|");
        let flat = flattener.flatten(&json!({"a": {"b": ["x", "y"]}}));
        assert_eq!(flat, vec![("a.b".to_string(), "x|y".to_string())]);
    }

    #[test]
    fn deep_nesting_terminates() {
        let mut value = json!("leaf");
        for i in 0..64 {
            let mut map = serde_json::Map::new();
            map.insert(format!("k{i}"), value);
            value = Value::Object(map);
        }
        let flat = Flattener::default().flatten(&value);
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].1, "leaf");
    }
}
