//! User-agent normalization.
//!
//! Reduces a raw `User-Agent` header to `<browser-family>/<os-family>` so that
//! version bumps leave the fingerprint unchanged while a browser or OS switch
//! does not.

/// Returned for an empty or whitespace-only user agent.
pub const UNKNOWN_USER_AGENT: &str = "unknown";

/// Browser families, checked in order. Derived browsers come before the
/// engines they embed.
const BROWSER_FAMILIES: &[(&str, &[&str])] = &[
    ("edge", &["edg/", "edge"]),
    ("opera", &["opr/", "opera"]),
    ("chrome", &["chrome", "crios"]),
    ("firefox", &["firefox", "fxios"]),
    ("safari", &["safari"]),
];

/// OS families, checked in order. Mobile platforms come before the desktop
/// systems whose tokens they also carry.
const OS_FAMILIES: &[(&str, &[&str])] = &[
    ("ios", &["iphone", "ipad", "ipod"]),
    ("android", &["android"]),
    ("windows", &["windows"]),
    ("mac", &["mac"]),
    ("linux", &["linux"]),
];

/// Normalizes a user agent to coarse browser and OS family tokens.
///
/// The result is `"<browser>/<os>"`, with `other` and `unknown` standing in
/// for unrecognized families. An empty input yields [`UNKNOWN_USER_AGENT`].
pub fn normalize_user_agent(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNKNOWN_USER_AGENT.to_string();
    }

    let ua = trimmed.to_lowercase();
    let browser = detect(&ua, BROWSER_FAMILIES).unwrap_or("other");
    let os = detect(&ua, OS_FAMILIES).unwrap_or("unknown");
    format!("{}/{}", browser, os)
}

fn detect(ua: &str, families: &[(&'static str, &[&str])]) -> Option<&'static str> {
    families
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| ua.contains(n)))
        .map(|(family, _)| *family)
}
