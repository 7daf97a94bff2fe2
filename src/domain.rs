/// Canonical store key for an owner name: trimmed, lowercased, without the
/// trailing root dot. Returns `None` for names that are empty after that.
pub fn canonical_domain(name: &str) -> Option<String> {
    let trimmed = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}

/// Canonical form of a resolved address as it is stored in a candidate's set.
pub fn canonical_address(addr: &str) -> String {
    addr.trim().to_string()
}
