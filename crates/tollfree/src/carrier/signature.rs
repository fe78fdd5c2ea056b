//! Webhook signature verification.
//!
//! The carrier sends `x-surge-signature: t=<unix-seconds>,v1=<hex>` where the hex digest is
//! HMAC-SHA256 over `"{t}.{raw_body}"` keyed with the shared signing secret. Several `v1`
//! entries may be present while the carrier rotates secrets; any match passes.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-surge-signature";

/// Parsed form of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Timestamp exactly as sent; it is part of the signed payload.
    pub raw_timestamp: String,
    pub timestamp: i64,
    pub signatures: Vec<Vec<u8>>,
}

pub fn parse_signature_header(value: &str) -> Option<SignatureHeader> {
    let mut raw_timestamp = None;
    let mut signatures = Vec::new();

    for part in value.split(',') {
        let Some((key, val)) = part.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => raw_timestamp = Some(val.trim().to_string()),
            "v1" => {
                if let Ok(bytes) = hex::decode(val.trim()) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let raw_timestamp = raw_timestamp?;
    let timestamp = raw_timestamp.parse::<i64>().ok()?;
    if signatures.is_empty() {
        return None;
    }

    Some(SignatureHeader {
        raw_timestamp,
        timestamp,
        signatures,
    })
}

fn signed_mac(raw_timestamp: &str, raw_body: &[u8], signing_key: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(signing_key.as_bytes()).ok()?;
    mac.update(raw_timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    Some(mac)
}

/// Returns true when the request carries a valid signature for `raw_body`.
///
/// Header lookup is case-insensitive and the digest comparison is constant time.
pub fn verify_signature(headers: &HeaderMap, raw_body: &[u8], signing_key: &str) -> bool {
    if signing_key.is_empty() {
        return false;
    }
    let Some(header) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_signature_header)
    else {
        return false;
    };
    let Some(mac) = signed_mac(&header.raw_timestamp, raw_body, signing_key) else {
        return false;
    };

    header
        .signatures
        .iter()
        .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
}

/// Produces a header value the way the carrier does.
pub fn sign_payload(timestamp: i64, raw_body: &[u8], signing_key: &str) -> String {
    let raw_timestamp = timestamp.to_string();
    let digest = signed_mac(&raw_timestamp, raw_body, signing_key)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("t={raw_timestamp},v1={digest}")
}

pub fn signature_timestamp(headers: &HeaderMap) -> Option<i64> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_signature_header)
        .map(|header| header.timestamp)
}

/// Tolerance of zero disables the check.
pub fn is_fresh(timestamp: i64, now: i64, tolerance_secs: u64) -> bool {
    if tolerance_secs == 0 {
        return true;
    }
    let skew = now.saturating_sub(timestamp).unsigned_abs();
    skew <= tolerance_secs
}
