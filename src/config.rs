//! Configuration for the mirror's HTTP side.
//!
//! Most users can rely on [`MirrorConfig::new`], which points at the public
//! EDGAR archives with SEC-compliant defaults. Custom configurations are
//! useful for testing against a mock server or mirroring an internal copy of
//! the archive tree.
//!
//! Request headers come from a *properties* resource: one `name = value` per
//! line, `#` starting a comment, blank lines ignored, and surrounding double
//! quotes on the value stripped. A default set ships with the crate; callers
//! can layer their own on top with [`MirrorConfig::with_properties`]. The
//! parsed map is built once and handed to the HTTP client at construction,
//! after which it is immutable.

use std::collections::BTreeMap;
use std::time::Duration;

/// Header defaults bundled with the crate.
const DEFAULT_PROPERTIES: &str = include_str!("http.properties");

/// Settings for the remote (HTTP) side of a mirror.
///
/// # Examples
///
/// ```rust
/// use mirrorkit::MirrorConfig;
///
/// let config = MirrorConfig::new("my_mirror/1.0 (ops@example.com)")
///     .with_properties("X-Trace = mirror\n");
/// assert_eq!(config.headers.get("X-Trace").map(String::as_str), Some("mirror"));
/// ```
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// User agent sent with every request; the SEC requires a descriptive
    /// value with a contact address.
    pub user_agent: String,

    /// Rate limit in requests per second (default: 10, the SEC fair-access
    /// ceiling).
    pub rate_limit: u32,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Base URL of the remote index tree.
    pub base_url: String,

    /// Fixed header map sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("mirrorkit/", env!("CARGO_PKG_VERSION")).to_string(),
            rate_limit: 10,
            timeout: Duration::from_secs(30),
            base_url: "https://www.sec.gov/Archives/edgar/".to_string(),
            headers: parse_properties(DEFAULT_PROPERTIES),
        }
    }
}

impl MirrorConfig {
    /// Default configuration with the given user agent.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            ..Self::default()
        }
    }

    /// Overlays headers parsed from a properties string onto the current
    /// header map.
    pub fn with_properties(mut self, text: &str) -> Self {
        self.headers.extend(parse_properties(text));
        self
    }

    /// Points the config at a different remote tree.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Parses a properties resource into a header map.
///
/// Lines are `name = value`; `#` introduces a comment, blank lines are
/// skipped, whitespace around name and value is trimmed, and a value wrapped
/// in double quotes loses the quotes. An `=` inside the value is kept.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        properties.insert(name.to_string(), value.to_string());
    }
    properties
}
