// src/core/sources/rdap.rs

//! Registration data over RDAP, the structured registry protocol.
//!
//! Two chain links share the same response parser: `RdapBootstrap` asks the
//! authoritative server for the TLD (found through the IANA bootstrap
//! registry), `RemoteLookup` asks a fixed public RDAP service.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::http::get_text;
use crate::core::models::{ProbeError, SectionData};
use crate::core::scanner::fallback::ChainLink;
use crate::core::target::Target;

/// Finds the RDAP base URL serving `tld` in an IANA bootstrap document.
pub fn rdap_base_for(bootstrap: &Value, tld: &str) -> Option<String> {
    let tld = tld.to_lowercase();
    bootstrap
        .get("services")?
        .as_array()?
        .iter()
        .find_map(|service| {
            let entry = service.as_array()?;
            let tlds = entry.first()?.as_array()?;
            if !tlds.iter().any(|t| t.as_str().map(str::to_lowercase).as_deref() == Some(tld.as_str())) {
                return None;
            }
            let urls: Vec<&str> = entry.get(1)?.as_array()?.iter().filter_map(Value::as_str).collect();
            let base = urls.iter().find(|u| u.starts_with("https://")).or_else(|| urls.first())?;
            Some(if base.ends_with('/') { base.to_string() } else { format!("{base}/") })
        })
}

/// Parses an RDAP domain response into the registration section shape.
pub fn parse_rdap(body: &Value) -> Result<SectionData, ProbeError> {
    if let Some(code) = body.get("errorCode").and_then(Value::as_u64) {
        let title = body.get("title").and_then(Value::as_str).unwrap_or("RDAP error");
        return Err(if code == 404 {
            ProbeError::not_found(format!("RDAP: {title}"))
        } else {
            ProbeError::unreachable(format!("RDAP error {code}: {title}"))
        });
    }
    if body.get("objectClassName").and_then(Value::as_str) != Some("domain") {
        return Err(ProbeError::parse("RDAP response is not a domain object"));
    }

    let entities: Vec<&Value> = body
        .get("entities")
        .and_then(Value::as_array)
        .map(|list| list.iter().collect())
        .unwrap_or_default();

    let with_role = |role: &str| entities.iter().copied().find(|e| has_role(e, role));
    let registrar = with_role("registrar").and_then(|e| vcard_text(e, "fn"));
    let registrant = with_role("registrant");
    let admin = with_role("administrative");

    let mut emails = Vec::new();
    for entity in &entities {
        collect_emails(entity, &mut emails);
    }

    let name_servers: Vec<Value> = body
        .get("nameservers")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|ns| ns.get("ldhName").and_then(Value::as_str))
                .map(|n| Value::String(n.to_lowercase()))
                .collect()
        })
        .unwrap_or_default();

    let status = body.get("status").cloned().unwrap_or(Value::Array(Vec::new()));

    let mut section = Map::new();
    section.insert("registrar".into(), opt(registrar));
    section.insert("creation_date".into(), opt(event_date(body, "registration")));
    section.insert("expiration_date".into(), opt(event_date(body, "expiration")));
    section.insert("last_updated".into(), opt(event_date(body, "last changed")));
    section.insert("name_servers".into(), Value::Array(name_servers));
    section.insert("status".into(), status);
    section.insert(
        "emails".into(),
        if emails.is_empty() { Value::Null } else { Value::Array(emails.into_iter().map(Value::String).collect()) },
    );
    section.insert("organization".into(), opt(registrant.and_then(|e| vcard_text(e, "org").or_else(|| vcard_text(e, "fn")))));
    section.insert("registrant_country".into(), opt(registrant.and_then(vcard_country)));
    section.insert("admin_country".into(), opt(admin.and_then(vcard_country)));
    Ok(section)
}

fn opt(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

fn has_role(entity: &Value, role: &str) -> bool {
    entity
        .get("roles")
        .and_then(Value::as_array)
        .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(role)))
}

fn event_date(body: &Value, action: &str) -> Option<String> {
    body.get("events")?
        .as_array()?
        .iter()
        .find(|event| event.get("eventAction").and_then(Value::as_str) == Some(action))?
        .get("eventDate")?
        .as_str()
        .map(str::to_string)
}

/// vCard properties of an entity: `["vcard", [[name, params, type, value], ...]]`.
fn vcard_properties(entity: &Value) -> impl Iterator<Item = &Vec<Value>> {
    entity
        .get("vcardArray")
        .and_then(|v| v.get(1))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
}

fn vcard_text(entity: &Value, name: &str) -> Option<String> {
    vcard_properties(entity)
        .find(|prop| prop.first().and_then(Value::as_str) == Some(name))
        .and_then(|prop| prop.get(3))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Country of the `adr` property: the `cc` parameter if present, else the
/// country-name component of the structured address.
fn vcard_country(entity: &Value) -> Option<String> {
    let adr = vcard_properties(entity).find(|prop| prop.first().and_then(Value::as_str) == Some("adr"))?;
    if let Some(cc) = adr.get(1).and_then(|p| p.get("cc")).and_then(Value::as_str) {
        return Some(cc.to_string());
    }
    adr.get(3)?
        .as_array()?
        .get(6)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn collect_emails(entity: &Value, out: &mut Vec<String>) {
    for prop in vcard_properties(entity) {
        if prop.first().and_then(Value::as_str) == Some("email") {
            if let Some(email) = prop.get(3).and_then(Value::as_str) {
                let email = email.to_lowercase();
                if !out.contains(&email) {
                    out.push(email);
                }
            }
        }
    }
    if let Some(children) = entity.get("entities").and_then(Value::as_array) {
        for child in children {
            collect_emails(child, out);
        }
    }
}

async fn fetch_rdap(client: &Client, url: &str) -> Result<SectionData, ProbeError> {
    let (status, body) = get_text(client, url).await?;
    if status == 404 {
        return Err(ProbeError::not_found(format!("RDAP: no record at {url}")));
    }
    let json: Value = serde_json::from_str(&body)
        .map_err(|e| ProbeError::parse(format!("RDAP response is not JSON ({status}): {e}")))?;
    parse_rdap(&json)
}

fn registrable(target: &Target) -> Result<String, ProbeError> {
    target
        .registrable_domain()
        .ok_or_else(|| ProbeError::not_found(format!("{} has no registrable domain", target.host())))
}

/// Authoritative RDAP server located through the IANA bootstrap registry.
pub struct RdapBootstrap {
    client: Client,
    bootstrap_url: String,
}

impl RdapBootstrap {
    pub fn new(client: Client, bootstrap_url: String) -> Self {
        Self { client, bootstrap_url }
    }
}

#[async_trait]
impl ChainLink for RdapBootstrap {
    fn name(&self) -> &str {
        "rdap"
    }

    async fn attempt(&self, target: &Target) -> Result<SectionData, ProbeError> {
        let domain = registrable(target)?;
        let tld = domain.rsplit('.').next().unwrap_or_default().to_string();

        let (_, body) = get_text(&self.client, &self.bootstrap_url).await?;
        let bootstrap: Value = serde_json::from_str(&body)
            .map_err(|e| ProbeError::parse(format!("RDAP bootstrap is not JSON: {e}")))?;
        let base = rdap_base_for(&bootstrap, &tld).ok_or_else(|| {
            warn!(tld = %tld, "No RDAP service registered for TLD.");
            ProbeError::not_found(format!("no RDAP service for .{tld}"))
        })?;

        let url = format!("{base}domain/{domain}");
        debug!(url = %url, "Querying authoritative RDAP server.");
        let section = fetch_rdap(&self.client, &url).await?;
        info!(domain = %domain, "RDAP registration data retrieved.");
        Ok(section)
    }
}

/// Public RDAP lookup service, e.g. `https://rdap.org/domain/{domain}`.
pub struct RemoteLookup {
    client: Client,
    url_template: String,
}

impl RemoteLookup {
    pub fn new(client: Client, url_template: String) -> Self {
        Self { client, url_template }
    }
}

#[async_trait]
impl ChainLink for RemoteLookup {
    fn name(&self) -> &str {
        "remote-lookup"
    }

    async fn attempt(&self, target: &Target) -> Result<SectionData, ProbeError> {
        let domain = registrable(target)?;
        let url = self.url_template.replace("{domain}", &domain);
        debug!(url = %url, "Querying remote lookup service.");
        fetch_rdap(&self.client, &url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ErrorKind;
    use serde_json::json;

    fn sample_response() -> Value {
        json!({
            "objectClassName": "domain",
            "ldhName": "EXAMPLE.COM",
            "status": ["client delete prohibited", "client transfer prohibited"],
            "events": [
                {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2026-08-13T04:00:00Z"},
                {"eventAction": "last changed", "eventDate": "2025-08-14T07:01:39Z"}
            ],
            "nameservers": [
                {"objectClassName": "nameserver", "ldhName": "A.IANA-SERVERS.NET"},
                {"objectClassName": "nameserver", "ldhName": "B.IANA-SERVERS.NET"}
            ],
            "entities": [
                {
                    "objectClassName": "entity",
                    "roles": ["registrar"],
                    "vcardArray": ["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", "RESERVED-Internet Assigned Numbers Authority"]]],
                    "entities": [{
                        "roles": ["abuse"],
                        "vcardArray": ["vcard", [["email", {}, "text", "Abuse@IANA.org"]]]
                    }]
                },
                {
                    "roles": ["registrant"],
                    "vcardArray": ["vcard", [
                        ["org", {}, "text", "Internet Assigned Numbers Authority"],
                        ["adr", {"cc": "US"}, "text", ["", "", "", "", "", "", ""]]
                    ]]
                },
                {
                    "roles": ["administrative"],
                    "vcardArray": ["vcard", [["adr", {}, "text", ["", "", "12025 Waterfront Drive", "Los Angeles", "CA", "90094", "United States"]]]]
                }
            ]
        })
    }

    #[test]
    fn parses_registration_fields() {
        let section = parse_rdap(&sample_response()).unwrap();
        assert_eq!(section["registrar"], json!("RESERVED-Internet Assigned Numbers Authority"));
        assert_eq!(section["creation_date"], json!("1995-08-14T04:00:00Z"));
        assert_eq!(section["expiration_date"], json!("2026-08-13T04:00:00Z"));
        assert_eq!(section["last_updated"], json!("2025-08-14T07:01:39Z"));
        assert_eq!(section["name_servers"], json!(["a.iana-servers.net", "b.iana-servers.net"]));
        assert_eq!(section["emails"], json!(["abuse@iana.org"]));
        assert_eq!(section["organization"], json!("Internet Assigned Numbers Authority"));
        assert_eq!(section["registrant_country"], json!("US"));
        assert_eq!(section["admin_country"], json!("United States"));
    }

    #[test]
    fn section_keys_come_in_fixed_order() {
        let section = parse_rdap(&sample_response()).unwrap();
        let keys: Vec<&str> = section.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "registrar",
                "creation_date",
                "expiration_date",
                "last_updated",
                "name_servers",
                "status",
                "emails",
                "organization",
                "registrant_country",
                "admin_country"
            ]
        );
    }

    #[test]
    fn error_document_is_not_found() {
        let err = parse_rdap(&json!({"errorCode": 404, "title": "Not Found"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn non_domain_object_is_parse_error() {
        let err = parse_rdap(&json!({"objectClassName": "entity"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }

    #[test]
    fn bootstrap_lookup_prefers_https_and_normalizes_slash() {
        let bootstrap = json!({
            "services": [
                [["net", "com"], ["http://rdap.verisign.com/com/v1", "https://rdap.verisign.com/com/v1"]],
                [["org"], ["https://rdap.publicinterestregistry.org/rdap/"]]
            ]
        });
        assert_eq!(rdap_base_for(&bootstrap, "COM").as_deref(), Some("https://rdap.verisign.com/com/v1/"));
        assert_eq!(rdap_base_for(&bootstrap, "org").as_deref(), Some("https://rdap.publicinterestregistry.org/rdap/"));
        assert_eq!(rdap_base_for(&bootstrap, "io"), None);
    }
}
