// src/core/sources/tls.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use serde_json::{json, Map, Value};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use super::CertificateSource;
use crate::core::models::{ErrorKind, ProbeError, SectionData};

const OCSP_ACCESS_METHOD: &str = "1.3.6.1.5.5.7.48.1";

/// Certificate retrieval over a blocking native-tls handshake.
pub struct NativeTlsSource {
    timeout: Duration,
}

impl NativeTlsSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CertificateSource for NativeTlsSource {
    async fn fetch(&self, host: &str, port: u16) -> Result<SectionData, ProbeError> {
        let host = host.to_string();
        let timeout = self.timeout;
        debug!(host = %host, port, "Spawning blocking task for TLS connection.");
        spawn_blocking(move || perform_tls_fetch(&host, port, timeout))
            .await
            .unwrap_or_else(|e| {
                error!(panic = %e, "Blocking TLS task panicked!");
                Err(ProbeError::new(ErrorKind::Internal, format!("Task panicked: {}", e)))
            })
    }
}

fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ProbeError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProbeError::unreachable(format!("Could not resolve {host}: {e}")))?
        .next()
        .ok_or_else(|| ProbeError::not_found(format!("No address for {host}")))?;
    debug!(host, %addr, "Connecting TCP stream.");
    let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
        if e.kind() == std::io::ErrorKind::TimedOut {
            ProbeError::timeout(format!("TCP connection to {addr} timed out"))
        } else {
            ProbeError::unreachable(format!("TCP Connection Error: {}", e))
        }
    })?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| ProbeError::unreachable(format!("TCP socket setup failed: {}", e)))?;
    Ok(stream)
}

/// Why a handshake attempt produced no certificate.
#[derive(Debug)]
enum HandshakeError {
    /// The peer refused the TLS negotiation, typically over certificate checks.
    Rejected(ProbeError),
    /// Anything before or after negotiation; retrying unverified won't help.
    Other(ProbeError),
}

impl HandshakeError {
    fn into_probe_error(self) -> ProbeError {
        match self {
            HandshakeError::Rejected(e) | HandshakeError::Other(e) => e,
        }
    }
}

impl From<ProbeError> for HandshakeError {
    fn from(e: ProbeError) -> Self {
        HandshakeError::Other(e)
    }
}

/// Handshakes and returns the peer certificate in DER form.
fn handshake(host: &str, port: u16, timeout: Duration, verify: bool) -> Result<Vec<u8>, HandshakeError> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify)
        .build()
        .map_err(|e| ProbeError::new(ErrorKind::Internal, format!("TlsConnector Error: {}", e)))?;

    let stream = connect(host, port, timeout)?;
    debug!(host, verify, "Performing TLS handshake.");
    let stream = connector
        .connect(host, stream)
        .map_err(|e| HandshakeError::Rejected(ProbeError::unreachable(format!("TLS Handshake Error: {}", e))))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| ProbeError::unreachable(format!("Could not get peer certificate: {}", e)))?
        .ok_or_else(|| ProbeError::not_found("TLS connection succeeded but no peer certificate was provided"))?;
    Ok(cert
        .to_der()
        .map_err(|e| ProbeError::parse(format!("Could not convert certificate to DER: {}", e)))?)
}

/// Certificate bytes plus the verification failure, if the verified attempt
/// was rejected and the unverified one went through.
fn certificate_with<F>(host: &str, attempt: F) -> Result<(Vec<u8>, Option<String>), ProbeError>
where
    F: Fn(bool) -> Result<Vec<u8>, HandshakeError>,
{
    match attempt(true) {
        Ok(der) => Ok((der, None)),
        Err(HandshakeError::Rejected(e)) => {
            warn!(host, error = %e, "Verified handshake rejected, retrying without verification.");
            let der = attempt(false).map_err(HandshakeError::into_probe_error)?;
            Ok((der, Some(e.message)))
        }
        Err(other) => Err(other.into_probe_error()),
    }
}

fn perform_tls_fetch(host: &str, port: u16, timeout: Duration) -> Result<SectionData, ProbeError> {
    let (der, verification_error) = certificate_with(host, |verify| handshake(host, port, timeout, verify))?;
    let mut section = parse_certificate(&der)?;
    section.insert("verified".into(), Value::Bool(verification_error.is_none()));
    section.insert("verification_error".into(), verification_error.map_or(Value::Null, Value::String));
    Ok(section)
}

/// Certificate facts of a DER-encoded X.509 certificate.
pub fn parse_certificate(der: &[u8]) -> Result<SectionData, ProbeError> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        ProbeError::parse(format!("X.509 Parse Error: {}", e))
    })?;
    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let days_until_expiry = not_after.signed_duration_since(Utc::now()).num_days();

    let serial: String = x509.raw_serial().iter().map(|b| format!("{b:02X}")).collect();

    let mut san = Vec::new();
    if let Ok(Some(ext)) = x509.subject_alternative_name() {
        san.extend(ext.value.general_names.iter().map(render_general_name));
    }

    let mut ocsp = Vec::new();
    let mut crl = Vec::new();
    for ext in x509.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => {
                ocsp.extend(
                    aia.accessdescs
                        .iter()
                        .filter(|desc| desc.access_method.to_id_string() == OCSP_ACCESS_METHOD)
                        .map(|desc| render_location(&desc.access_location)),
                );
            }
            ParsedExtension::CRLDistributionPoints(points) => {
                for point in points.points.iter() {
                    if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                        crl.extend(names.iter().map(render_location));
                    }
                }
            }
            _ => {}
        }
    }

    let mut section = Map::new();
    section.insert("issuer".into(), Value::Object(name_attributes(x509.issuer())));
    section.insert("subject".into(), Value::Object(name_attributes(x509.subject())));
    section.insert("version".into(), json!(x509.version().0 + 1));
    section.insert("serial_number".into(), json!(serial));
    section.insert("not_before".into(), json!(not_before.to_rfc3339()));
    section.insert("not_after".into(), json!(not_after.to_rfc3339()));
    section.insert("days_until_expiry".into(), json!(days_until_expiry));
    section.insert("san".into(), json!(san));
    section.insert("ocsp".into(), json!(ocsp));
    section.insert("crl_distribution_points".into(), json!(crl));
    Ok(section)
}

fn name_attributes(name: &X509Name) -> Map<String, Value> {
    let mut attributes = Map::new();
    let mut put = |key: &str, values: Vec<&str>| {
        if !values.is_empty() {
            attributes.insert(key.to_string(), Value::String(values.join(", ")));
        }
    };
    put("countryName", name.iter_country().filter_map(|a| a.as_str().ok()).collect());
    put("stateOrProvinceName", name.iter_state_or_province().filter_map(|a| a.as_str().ok()).collect());
    put("localityName", name.iter_locality().filter_map(|a| a.as_str().ok()).collect());
    put("organizationName", name.iter_organization().filter_map(|a| a.as_str().ok()).collect());
    put("organizationalUnitName", name.iter_organizational_unit().filter_map(|a| a.as_str().ok()).collect());
    put("commonName", name.iter_common_name().filter_map(|a| a.as_str().ok()).collect());
    attributes
}

fn render_general_name(name: &GeneralName) -> String {
    match name {
        GeneralName::DNSName(dns) => format!("DNS:{dns}"),
        GeneralName::RFC822Name(mail) => format!("email:{mail}"),
        GeneralName::URI(uri) => format!("URI:{uri}"),
        GeneralName::IPAddress(bytes) => match bytes.len() {
            4 => format!("IP Address:{}", std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])),
            16 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(bytes);
                format!("IP Address:{}", std::net::Ipv6Addr::from(octets))
            }
            _ => "IP Address:<invalid>".to_string(),
        },
        other => format!("{other:?}"),
    }
}

fn render_location(name: &GeneralName) -> String {
    match name {
        GeneralName::URI(uri) => uri.to_string(),
        other => render_general_name(other),
    }
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}
