//! Slack request signing (`X-Slack-Signature`, version `v0`).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Requests older than this are rejected as replays
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

/// Check a signed request body against the app's signing secret.
pub fn verify_signature(
    signing_secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now_unix: i64,
) -> anyhow::Result<()> {
    let raw_ts = timestamp.trim();
    let ts: i64 = raw_ts
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid Slack request timestamp"))?;
    if (now_unix - ts).abs() > MAX_REQUEST_AGE_SECS {
        anyhow::bail!("Stale Slack request timestamp");
    }

    let provided = signature
        .strip_prefix("v0=")
        .ok_or_else(|| anyhow::anyhow!("Unsupported Slack signature version"))?;
    let provided = hex::decode(provided).map_err(|_| anyhow::anyhow!("Malformed Slack signature"))?;

    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("Invalid signing secret"))?;
    mac.update(b"v0:");
    mac.update(raw_ts.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| anyhow::anyhow!("Slack signature mismatch"))
}

#[cfg(test)]
pub(crate) fn sign(signing_secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).unwrap();
    mac.update(format!("v0:{}:", timestamp).as_bytes());
    mac.update(body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}
