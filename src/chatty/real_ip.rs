//! Real-client-IP resolution for reverse-proxied deployments (§4.6).
//!
//! Fixed header priority: `CF-Connecting-IP`, `X-Real-IP`, `X-Forwarded-For` (leftmost value,
//! trimmed). Falls back to the transport peer address, then to the literal `"unknown"`. No
//! header beyond this list is ever trusted.

use axum::http::HeaderMap;

const HEADER_PRIORITY: [&str; 3] = ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"];

/// Resolve the real client IP from `headers`, falling back to `peer_addr` and finally
/// `"unknown"`.
pub fn resolve_real_ip(headers: &HeaderMap, peer_addr: Option<&str>) -> String {
    for name in HEADER_PRIORITY {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            let candidate = if name == "x-forwarded-for" {
                value.split(',').next().unwrap_or(value)
            } else {
                value
            };
            let trimmed = candidate.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    peer_addr
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
