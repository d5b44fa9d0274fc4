use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>,...`) against the
/// raw request body. Any `v1` entry may match.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in header.split(',') {
        let mut kv = part.trim().splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(value)) => {
                timestamp = value.parse().ok();
            }
            (Some("v1"), Some(value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| Error::InvalidSignature("missing timestamp".into()))?;
    if signatures.is_empty() {
        return Err(Error::InvalidSignature("no v1 signature".into()));
    }
    let skew = now_unix.checked_sub(timestamp).and_then(i64::checked_abs);
    if !matches!(skew, Some(skew) if skew <= tolerance_secs) {
        return Err(Error::InvalidSignature("timestamp outside tolerance".into()));
    }

    let expected = hex::encode(sign(payload, timestamp, secret)?);
    let matched = signatures
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(Error::InvalidSignature("signature mismatch".into()))
    }
}

/// Header value a sender would attach for `payload` at `timestamp`.
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(sign(payload, timestamp, secret)?)
    ))
}

fn sign(payload: &[u8], timestamp: i64, secret: &str) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("hmac key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}
