//! Webhook signature verification.
//!
//! The sender signs `"{timestamp}.{raw_body}"` with HMAC-SHA256 over the
//! client secret and ships both parts in a single header:
//!
//! ```text
//! TikTok-Signature: t=1700000000,s=5f2d...
//! ```
//!
//! Verification runs against the raw request bytes, before any JSON parsing,
//! so body re-serialization can never change what is being checked. The
//! staleness check runs after the MAC comparison; a stale-but-valid signature
//! is reported distinctly from a forged one.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature mismatch")]
    Mismatch,

    #[error("timestamp outside tolerance")]
    StaleTimestamp,
}

/// Parsed `t=<unix seconds>,s=<hex digest>` header
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub digest: Vec<u8>,
}

pub fn parse_header(raw: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut digest = None;

    for part in raw.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?);
            }
            Some(("s", value)) => {
                digest = Some(hex::decode(value).map_err(|_| SignatureError::MalformedHeader)?);
            }
            _ => return Err(SignatureError::MalformedHeader),
        }
    }

    match (timestamp, digest) {
        (Some(timestamp), Some(digest)) => Ok(SignatureHeader { timestamp, digest }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

/// Verify a parsed header against the raw body bytes.
///
/// `tolerance_secs` bounds `|now - t|`; replays of old captures and senders
/// with skewed clocks both fall out here.
pub fn verify(
    secret: &str,
    header: &SignatureHeader,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Mismatch)?;
    mac.update(header.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.len() != header.digest.len()
        || !bool::from(expected.ct_eq(header.digest.as_slice()))
    {
        return Err(SignatureError::Mismatch);
    }

    if (now - header.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::StaleTimestamp);
    }

    Ok(())
}

/// Produce the signed-payload digest for a body at a timestamp, hex encoded
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Format a full header value the way the sender does
pub fn header_value(secret: &str, timestamp: i64, body: &[u8]) -> String {
    format!("t={},s={}", timestamp, sign(secret, timestamp, body))
}
