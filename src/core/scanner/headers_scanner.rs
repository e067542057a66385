// src/core/scanner/headers_scanner.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{PriorResults, Probe};
use crate::core::models::{ProbeResult, Section};
use crate::core::sources::{HttpFetcher, HttpResponse, NetworkGate};
use crate::core::target::Target;

/// Security-relevant response headers, reported under their canonical names.
pub const SECURITY_HEADERS: &[&str] = &[
    "Strict-Transport-Security",
    "Content-Security-Policy",
    "X-Frame-Options",
    "X-Content-Type-Options",
    "X-XSS-Protection",
    "Referrer-Policy",
    "Permissions-Policy",
    "Feature-Policy",
    "Access-Control-Allow-Origin",
];

static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap());

/// Checks for the presence of a header, returning its value or null.
fn check_header(response: &HttpResponse, name: &str) -> Value {
    match response.header(name) {
        Some(value) => {
            debug!(header_name = name, value = %value, "Header found.");
            Value::String(value)
        }
        None => {
            debug!(header_name = name, "Header not found.");
            Value::Null
        }
    }
}

/// Every element matching `css`, in document order.
fn select_all<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => doc.select(&selector).collect(),
        Err(e) => {
            debug!(selector = css, error = ?e, "Invalid selector.");
            Vec::new()
        }
    }
}

/// Element text with runs of whitespace collapsed.
fn text_of(el: &ElementRef) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn attr_value(el: &ElementRef, name: &str) -> Value {
    el.value().attr(name).map_or(Value::Null, |v| Value::String(v.trim().to_string()))
}

/// Reads the content of a `<meta name=...>` tag.
fn meta_content(doc: &Html, name: &str) -> Value {
    select_all(doc, &format!("meta[name='{}']", name))
        .first()
        .map_or(Value::Null, |el| attr_value(el, "content"))
}

/// Every `<meta>` carrying content, keyed by its `name` or `property`.
fn meta_tags(doc: &Html) -> Map<String, Value> {
    let mut tags = Map::new();
    for el in select_all(doc, "meta") {
        let attrs = el.value();
        let (Some(key), Some(content)) = (attrs.attr("name").or_else(|| attrs.attr("property")), attrs.attr("content"))
        else {
            continue;
        };
        if !key.is_empty() && !content.is_empty() {
            tags.insert(key.to_string(), Value::String(content.to_string()));
        }
    }
    tags
}

fn headings(doc: &Html) -> Map<String, Value> {
    let mut levels = Map::new();
    for level in ["h1", "h2", "h3"] {
        let texts: Vec<String> = select_all(doc, level)
            .iter()
            .map(text_of)
            .filter(|t| !t.is_empty())
            .collect();
        levels.insert(level.to_string(), json!(texts));
    }
    levels
}

/// Anchors with an `href`, one entry per distinct target. Nothing is followed.
fn links(doc: &Html) -> Vec<Value> {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = Vec::new();
    for el in select_all(doc, "a[href]") {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if seen.contains(&href) {
            continue;
        }
        seen.push(href);
        out.push(json!({ "text": text_of(&el), "href": href }));
    }
    out
}

fn images(doc: &Html) -> Vec<Value> {
    select_all(doc, "img")
        .iter()
        .map(|el| json!({ "src": attr_value(el, "src"), "alt": attr_value(el, "alt") }))
        .collect()
}

/// Page facts of an HTML body: title, meta tags, headings, links, images and
/// e-mail addresses.
pub fn page_metadata(body: &str) -> Map<String, Value> {
    let document = Html::parse_document(body);

    let title = select_all(&document, "title")
        .first()
        .map(text_of)
        .filter(|t| !t.is_empty())
        .map_or(Value::Null, Value::String);

    let mut emails: Vec<String> = Vec::new();
    for found in RE_EMAIL.find_iter(body) {
        let email = found.as_str().to_lowercase();
        if !emails.contains(&email) {
            emails.push(email);
        }
    }

    let mut page = Map::new();
    page.insert("title".into(), title);
    page.insert("meta_description".into(), meta_content(&document, "description"));
    page.insert("meta_keywords".into(), meta_content(&document, "keywords"));
    page.insert("meta_tags".into(), Value::Object(meta_tags(&document)));
    page.insert("headings".into(), Value::Object(headings(&document)));
    page.insert("links".into(), Value::Array(links(&document)));
    page.insert("images".into(), Value::Array(images(&document)));
    page.insert("emails".into(), json!(emails));
    page
}

/// Every received header, in received order; repeats joined with `, `.
fn response_headers(response: &HttpResponse) -> Map<String, Value> {
    let mut all = Map::new();
    for (name, _) in &response.headers {
        if !all.contains_key(name) {
            all.insert(name.clone(), response.header(name).map_or(Value::Null, Value::String));
        }
    }
    all
}

/// Builds the section from one HTTP exchange.
pub fn analyze_response(response: &HttpResponse) -> Map<String, Value> {
    let mut headers = Map::new();
    for name in SECURITY_HEADERS {
        headers.insert(name.to_string(), check_header(response, name));
    }
    let present = headers.values().filter(|v| !v.is_null()).count();

    let mut section = Map::new();
    section.insert("status_code".into(), json!(response.status));
    section.insert("final_url".into(), json!(response.final_url));
    section.insert("server".into(), response.header("server").map_or(Value::Null, Value::String));
    section.insert("content_type".into(), response.header("content-type").map_or(Value::Null, Value::String));
    section.insert("headers".into(), Value::Object(headers));
    section.insert("headers_present".into(), json!(present));
    section.insert("response_headers".into(), Value::Object(response_headers(response)));
    section.insert("page".into(), Value::Object(page_metadata(&response.body)));
    section
}

pub struct SecurityHeadersProbe {
    http: Arc<dyn HttpFetcher>,
    gate: NetworkGate,
    timeout: Duration,
}

impl SecurityHeadersProbe {
    pub fn new(http: Arc<dyn HttpFetcher>, gate: NetworkGate, timeout: Duration) -> Self {
        Self { http, gate, timeout }
    }
}

#[async_trait]
impl Probe for SecurityHeadersProbe {
    fn section(&self) -> Section {
        Section::SecurityHeaders
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn run(&self, target: &Target, _prior: &PriorResults) -> ProbeResult {
        let url = target.base_url().to_string();
        info!(url = %url, "Starting headers scan.");
        match self.gate.call("http", self.http.get(&url)).await {
            Ok(response) => {
                let section = analyze_response(&response);
                info!(status = response.status, present = ?section.get("headers_present"), "Headers scan finished.");
                ProbeResult::Ok(section)
            }
            Err(e) => {
                error!(url = %url, error = %e, "HTTP request failed for headers scan.");
                e.into()
            }
        }
    }
}
