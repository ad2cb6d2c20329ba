/// Canonical form of a public channel handle: `@name`, lowercase.
///
/// Accepts `name`, `@name`, `t.me/name` and `https://t.me/name`. Returns
/// `None` when nothing usable is left after stripping.
pub fn normalize_channel(raw: &str) -> Option<String> {
    let mut name = raw.trim();

    for prefix in ["https://t.me/", "http://t.me/", "t.me/"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            name = rest;
            break;
        }
    }

    let name = name.trim_start_matches('@').trim_end_matches('/');
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }

    Some(format!("@{}", name.to_ascii_lowercase()))
}
