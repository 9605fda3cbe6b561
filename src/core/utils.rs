use chrono::{SecondsFormat, Utc};

/// Truncate a string to at most `max_bytes` bytes at a safe UTF-8 char boundary.
///
/// # Examples
/// ```
/// use sandchat::core::utils::safe_truncate;
/// assert_eq!(safe_truncate("hello", 10), "hello");
/// assert_eq!(safe_truncate("hello", 3), "hel");
/// assert_eq!(safe_truncate("\u{4f60}\u{597d}", 5), "\u{4f60}");
/// ```
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let safe = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max_bytes)
        .last()
        .unwrap_or(0);
    &s[..safe]
}

/// Fresh message / conversation identifier (uuid v4, simple hex form).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn utcnow_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Owner segment used for callers without a user id. `@` is always
/// percent-encoded by [`path_key`], so no user id can produce it.
pub const ANONYMOUS_KEY: &str = "@anonymous";

/// Injective mapping of an arbitrary string to a single path component.
///
/// Percent-encodes everything outside `[A-Za-z0-9-_.~]`; names made only of
/// dots have their dots encoded as well.
pub fn path_key(raw: &str) -> String {
    let encoded = urlencoding::encode(raw).into_owned();
    if encoded.is_empty() {
        return "%".to_string();
    }
    if encoded.chars().all(|c| c == '.') {
        return encoded.replace('.', "%2E");
    }
    encoded
}

/// Path component for a caller, [`ANONYMOUS_KEY`] when there is none.
pub fn user_key(user: Option<&str>) -> String {
    match user {
        Some(user) => path_key(user),
        None => ANONYMOUS_KEY.to_string(),
    }
}
