//! Address normalization
//!
//! Maps a raw client address to the key sessions are tracked under.
//! Long colon-delimited forms (IPv6) are shortened to
//! `first:second:...second_last:last` so keys stay readable in listings.

use std::net::{IpAddr, SocketAddr};

/// Segment count above which an address is abbreviated.
const MAX_SEGMENTS: usize = 4;

/// Normalize a raw textual address into its tracking key.
///
/// Total: anything that does not look like a long colon-delimited
/// address is returned unchanged. Idempotent, since an abbreviated key
/// has exactly four segments.
pub fn normalize(raw: &str) -> String {
    if !raw.contains(':') {
        return raw.to_string();
    }

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() <= MAX_SEGMENTS {
        return raw.to_string();
    }

    let n = parts.len();
    format!("{}:{}:...{}:{}", parts[0], parts[1], parts[n - 2], parts[n - 1])
}

/// Tracking key for an IP, using the standard textual form of the address.
pub fn key_for_ip(ip: IpAddr) -> String {
    normalize(&ip.to_string())
}

/// Tracking key for a peer socket address (the port is ignored).
pub fn key_for_peer(peer: &SocketAddr) -> String {
    key_for_ip(peer.ip())
}
