//! Prefixed opaque identifier generation.
//!
//! Every identifier the service hands out (`conv_`, `trace_`, `msg_`) is a prefix followed by
//! a random, URL-safe suffix with comfortably more than 71 bits of entropy. Collisions are
//! treated as impossible; callers never coordinate to avoid them.

use rand::Rng;

const SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
/// 16 base62 characters is ~95 bits of entropy, comfortably above the ~71 bit floor.
const SUFFIX_LEN: usize = 16;

fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    (0..SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect()
}

fn prefixed(prefix: &str) -> String {
    format!("{}_{}", prefix, random_suffix())
}

/// Mint a fresh `conv_` conversation identifier.
pub fn new_conversation_id() -> String {
    prefixed("conv")
}

/// Mint a fresh `trace_` identifier, generated once per request.
pub fn new_trace_id() -> String {
    prefixed("trace")
}

/// Mint a fresh `msg_` identifier for a single message.
pub fn new_message_id() -> String {
    prefixed("msg")
}
