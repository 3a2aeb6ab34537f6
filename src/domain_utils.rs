//! Minimal sender-domain helpers shared by the rule engine and scanner.

/// Extract the lowercased domain of the sender address in a `From` header.
///
/// Handles both bare addresses and `Display Name <user@host>` forms; the
/// domain is everything after the last `@`. Returns `None` when no usable
/// domain is present.
pub fn sender_domain(from_header: &str) -> Option<String> {
    let addr = address_in(from_header);
    let at = addr.rfind('@')?;
    let domain = addr[at + 1..].trim().trim_end_matches('>').trim();
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

/// Extract the address part from a header like `Display Name <user@host>`.
fn address_in(header: &str) -> &str {
    if let (Some(start), Some(end)) = (header.rfind('<'), header.rfind('>')) {
        if start < end {
            return &header[start + 1..end];
        }
    }
    header.trim()
}

/// Check whether `domain` ends in any of the given top-level domains.
pub fn has_disallowed_tld(domain: &str, tlds: &[String]) -> bool {
    let domain = domain.to_lowercase();
    tlds.iter()
        .any(|tld| domain.ends_with(&format!(".{}", tld.to_lowercase())))
}
