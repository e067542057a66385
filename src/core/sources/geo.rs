// src/core/sources/geo.rs

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use std::net::IpAddr;
use tracing::debug;

use super::http::get_text;
use super::GeoLocator;
use crate::core::models::{ProbeError, SectionData};

/// Output key → ip-api.com field.
const FIELD_MAP: &[(&str, &str)] = &[
    ("country", "country"),
    ("country_code", "countryCode"),
    ("region", "regionName"),
    ("city", "city"),
    ("zip", "zip"),
    ("latitude", "lat"),
    ("longitude", "lon"),
    ("timezone", "timezone"),
    ("isp", "isp"),
    ("organization", "org"),
    ("as_number", "as"),
    ("as_name", "asname"),
];

/// Maps an ip-api.com JSON document onto the per-IP geolocation fields.
pub fn parse_ip_api(body: &Value) -> Result<SectionData, ProbeError> {
    if body.get("status").and_then(Value::as_str) == Some("fail") {
        let message = body.get("message").and_then(Value::as_str).unwrap_or("lookup failed");
        return Err(ProbeError::not_found(format!("geolocation: {message}")));
    }
    let object = body
        .as_object()
        .ok_or_else(|| ProbeError::parse("geolocation response is not an object"))?;
    let mut section = Map::new();
    for (key, field) in FIELD_MAP {
        section.insert(key.to_string(), object.get(*field).cloned().unwrap_or(Value::Null));
    }
    Ok(section)
}

/// Geolocation through an ip-api.com compatible HTTP endpoint.
pub struct IpApiLocator {
    client: Client,
    url_template: String,
}

impl IpApiLocator {
    pub fn new(client: Client, url_template: String) -> Self {
        Self { client, url_template }
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: IpAddr) -> Result<SectionData, ProbeError> {
        let url = self.url_template.replace("{ip}", &ip.to_string());
        debug!(%ip, url = %url, "Querying geolocation service.");
        let (status, body) = get_text(&self.client, &url).await?;
        if status == 429 {
            return Err(ProbeError::unreachable("geolocation: rate limited"));
        }
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ProbeError::parse(format!("geolocation response is not JSON ({status}): {e}")))?;
        parse_ip_api(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ErrorKind;
    use serde_json::json;

    #[test]
    fn maps_ip_api_fields() {
        let body = json!({
            "status": "success", "country": "United States", "countryCode": "US",
            "regionName": "Massachusetts", "city": "Norwell", "zip": "02061",
            "lat": 42.1508, "lon": -70.8228, "timezone": "America/New_York",
            "isp": "Edgecast Inc.", "org": "Verizon", "as": "AS15133 Verizon Digital Media Services"
        });
        let section = parse_ip_api(&body).unwrap();
        assert_eq!(section["country_code"], json!("US"));
        assert_eq!(section["latitude"], json!(42.1508));
        assert_eq!(section["as_name"], Value::Null);
        assert_eq!(section.keys().next().map(String::as_str), Some("country"));
    }

    #[test]
    fn fail_status_is_not_found() {
        let err = parse_ip_api(&json!({"status": "fail", "message": "reserved range"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(err.message.contains("reserved range"));
    }
}
