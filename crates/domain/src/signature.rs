//! Webhook signature verification.
//!
//! The provider signs every delivery with `HMAC-SHA256(secret, "<t>.<body>")`
//! and sends the result in a header of the form
//! `t=<unix>,v1=<hex>[,v1=<hex>...]`. A request is authentic when the
//! timestamp is within the tolerance window and at least one candidate
//! matches the expected MAC for at least one active secret.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default replay window in seconds.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Reasons a signature is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The header could not be parsed into a timestamp and candidates.
    #[error("Malformed signature header: {0}")]
    Malformed(&'static str),

    /// No candidate matched the expected signature.
    #[error("Signature mismatch")]
    Mismatch,

    /// The signed timestamp is outside the tolerance window.
    #[error("Signature timestamp {timestamp} is outside the {tolerance}s tolerance (now {now})")]
    StaleTimestamp {
        timestamp: i64,
        now: i64,
        tolerance: i64,
    },

    /// The secret could not be used as an HMAC key.
    #[error("Webhook secret rejected as HMAC key")]
    InvalidKey,
}

impl SignatureError {
    fn outcome(&self) -> &'static str {
        match self {
            SignatureError::Malformed(_) => "malformed",
            SignatureError::Mismatch => "mismatch",
            SignatureError::StaleTimestamp { .. } => "stale",
            SignatureError::InvalidKey => "invalid_key",
        }
    }
}

/// A parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// The `t` value exactly as sent; the MAC covers this text.
    pub timestamp_text: String,
    pub candidates: Vec<String>,
}

impl SignatureHeader {
    /// Parses `t=<unix>,v1=<hex>,...`.
    ///
    /// Exactly one `t` is required, and at least one `v<N>` candidate. Other
    /// keys are ignored.
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for element in header.split(',') {
            let (key, value) = element
                .split_once('=')
                .ok_or(SignatureError::Malformed("element without '='"))?;
            let key = key.trim();
            let value = value.trim();

            if key == "t" {
                if timestamp.is_some() {
                    return Err(SignatureError::Malformed("duplicate timestamp"));
                }
                let parsed = value
                    .parse::<i64>()
                    .map_err(|_| SignatureError::Malformed("timestamp is not an integer"))?;
                timestamp = Some((parsed, value.to_string()));
            } else if is_scheme_key(key) {
                candidates.push(value.to_string());
            }
        }

        let (timestamp, timestamp_text) =
            timestamp.ok_or(SignatureError::Malformed("missing timestamp"))?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed("no signature candidates"));
        }

        Ok(Self {
            timestamp,
            timestamp_text,
            candidates,
        })
    }
}

fn is_scheme_key(key: &str) -> bool {
    key.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn keyed_mac(secret: &[u8], timestamp: &str, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Computes the hex signature the provider would send for `payload`.
pub fn sign_payload(secret: &[u8], timestamp: i64, payload: &[u8]) -> Result<String, SignatureError> {
    let mac = keyed_mac(secret, &timestamp.to_string(), payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Builds a complete `t=...,v1=...` header for `payload`.
pub fn signature_header(
    secret: &[u8],
    timestamp: i64,
    payload: &[u8],
) -> Result<String, SignatureError> {
    Ok(format!("t={timestamp},v1={}", sign_payload(secret, timestamp, payload)?))
}

/// Validates webhook authenticity and freshness.
#[derive(Debug, Clone, Copy)]
pub struct SignatureVerifier {
    tolerance_secs: i64,
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_SECS)
    }
}

impl SignatureVerifier {
    /// Creates a verifier with the given replay window.
    pub fn new(tolerance_secs: i64) -> Self {
        Self { tolerance_secs }
    }

    pub fn tolerance_secs(&self) -> i64 {
        self.tolerance_secs
    }

    /// Returns true if `header` is a valid, fresh signature of `payload`.
    pub fn verify(&self, payload: &[u8], header: &str, secret: &[u8]) -> bool {
        self.check(payload, header, secret).is_ok()
    }

    /// Like [`verify`](Self::verify), trying every active secret in order.
    pub fn verify_any(&self, payload: &[u8], header: &str, secrets: &[&[u8]]) -> bool {
        self.check_any(payload, header, secrets).is_ok()
    }

    /// Verifies against the current clock, returning the rejection reason.
    pub fn check(&self, payload: &[u8], header: &str, secret: &[u8]) -> Result<(), SignatureError> {
        self.check_at(payload, header, secret, Utc::now().timestamp())
    }

    /// Verifies against an explicit `now` in unix seconds.
    pub fn check_at(
        &self,
        payload: &[u8],
        header: &str,
        secret: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        self.check_any_at(payload, header, &[secret], now)
    }

    pub fn check_any(
        &self,
        payload: &[u8],
        header: &str,
        secrets: &[&[u8]],
    ) -> Result<(), SignatureError> {
        self.check_any_at(payload, header, secrets, Utc::now().timestamp())
    }

    /// Verifies against each secret until one validates.
    ///
    /// The header is parsed and the timestamp checked once; the outcome is
    /// counted once per call regardless of how many secrets were tried.
    pub fn check_any_at(
        &self,
        payload: &[u8],
        header: &str,
        secrets: &[&[u8]],
        now: i64,
    ) -> Result<(), SignatureError> {
        let result = self.evaluate(payload, header, secrets, now);

        let outcome = match &result {
            Ok(()) => "valid",
            Err(e) => e.outcome(),
        };
        metrics::counter!("webhook_signature_verifications", "outcome" => outcome).increment(1);

        if let Err(ref e) = result {
            tracing::warn!(error = %e, "Webhook signature rejected");
        }
        result
    }

    fn evaluate(
        &self,
        payload: &[u8],
        header: &str,
        secrets: &[&[u8]],
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header)?;

        if now.abs_diff(header.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(SignatureError::StaleTimestamp {
                timestamp: header.timestamp,
                now,
                tolerance: self.tolerance_secs,
            });
        }

        // Non-hex candidates can never match.
        let candidates: Vec<Vec<u8>> = header
            .candidates
            .iter()
            .filter_map(|c| hex::decode(c).ok())
            .collect();

        for secret in secrets {
            let mac = keyed_mac(secret, &header.timestamp_text, payload)?;
            if candidates
                .iter()
                .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
            {
                return Ok(());
            }
        }

        Err(SignatureError::Mismatch)
    }
}
