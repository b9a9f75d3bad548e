//! Host-pattern filtering of trusted public keys.

use glob::Pattern;

use peertrust_jwk::JWK;

/// Filter public keys on their extended `hosts` member: a key is kept when
/// any of its glob patterns matches `host`. Keys carrying no patterns are
/// kept only when `include_empty` is set.
pub fn filter_by_hosts(
    keys: &[JWK],
    host: &str,
    include_empty: bool,
) -> Result<Vec<JWK>, glob::PatternError> {
    let mut filtered = Vec::with_capacity(keys.len());
    for key in keys {
        let patterns = match &key.hosts {
            Some(hosts) if !hosts.is_empty() => hosts,
            _ => {
                if include_empty {
                    filtered.push(key.clone());
                }
                continue;
            }
        };
        for pattern in patterns {
            if Pattern::new(pattern)?.matches(host) {
                filtered.push(key.clone());
                break;
            }
        }
    }
    Ok(filtered)
}
