//! Extraction of the hydration payload embedded in SoundCloud pages.
//!
//! Pages bootstrap their client-side rendering with a script of the form
//! `window.__sc_hydration = [ {"hydratable": "...", "data": {...}}, ... ];`.
//! Entries are looked up by their `hydratable` discriminator, never by position.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ParseError, Result};

/// Marker identifying the hydration script.
pub const HYDRATION_MARKER: &str = "window.__sc_hydration";

/// Discriminator of the playlist entry.
pub const PLAYLIST_KIND: &str = "playlist";

/// Discriminator of the single-track entry.
pub const SOUND_KIND: &str = "sound";

#[allow(clippy::expect_used)]
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>(.*?)</script\s*>").expect("script pattern is valid")
});

/// Parsed hydration payload: the ordered list of tagged entries.
#[derive(Debug, Clone, PartialEq)]
pub struct HydrationPayload {
    entries: Vec<Value>,
}

impl HydrationPayload {
    /// All entries in page order.
    #[must_use]
    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// The `data` object of the first entry tagged `kind`.
    #[must_use]
    pub fn find(&self, kind: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|entry| entry.get("hydratable").and_then(Value::as_str) == Some(kind))
            .and_then(|entry| entry.get("data"))
    }

    /// Like [`find`](Self::find) but fails with [`ParseError::EntryNotFound`].
    pub fn require(&self, kind: &str) -> Result<&Value> {
        self.find(kind).ok_or_else(|| {
            ParseError::EntryNotFound {
                kind: kind.to_string(),
            }
            .into()
        })
    }
}

/// Extracts [`HydrationPayload`]s from HTML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageHydrationParser;

impl PageHydrationParser {
    /// Create a new parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Scan every script element and return the first one whose content is a
    /// marker assignment of a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::HydrationNotFound`] when no script qualifies.
    pub fn extract(&self, html: &str) -> Result<HydrationPayload> {
        for (index, caps) in SCRIPT_RE.captures_iter(html).enumerate() {
            let Some(body) = caps.get(1).map(|m| m.as_str()) else {
                continue;
            };
            if !body.contains(HYDRATION_MARKER) {
                continue;
            }

            match parse_assignment(body) {
                Some(entries) => {
                    debug!(
                        script_index = index,
                        entries = entries.len(),
                        "Found hydration payload"
                    );
                    return Ok(HydrationPayload { entries });
                }
                None => trace!(
                    script_index = index,
                    "Script mentions hydration marker but carries no payload"
                ),
            }
        }

        Err(ParseError::HydrationNotFound.into())
    }
}

/// Strip `... window.__sc_hydration =` and the trailing `;`, then parse.
fn parse_assignment(body: &str) -> Option<Vec<Value>> {
    let (_, after_marker) = body.split_once(HYDRATION_MARKER)?;
    let (_, rhs) = after_marker.split_once('=')?;
    let json = rhs.trim().trim_end_matches(';').trim_end();

    match serde_json::from_str::<Value>(json).ok()? {
        Value::Array(entries) => Some(entries),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn page(scripts: &[&str]) -> String {
        let mut html = String::from("<html><head><title>t</title></head><body>");
        for script in scripts {
            html.push_str("<script>");
            html.push_str(script);
            html.push_str("</script>");
        }
        html.push_str("</body></html>");
        html
    }

    #[test]
    fn test_extract_payload() {
        let html = page(&[
            "var x = 1;",
            r#"window.__sc_hydration = [{"hydratable":"user","data":{}},{"hydratable":"playlist","data":{"id":7}}];"#,
        ]);
        let payload = PageHydrationParser::new().extract(&html).unwrap();
        assert_eq!(payload.entries().len(), 2);
        assert_eq!(payload.find(PLAYLIST_KIND).unwrap()["id"], 7);
    }

    #[test]
    fn test_selects_by_content_not_position() {
        // The first marker-bearing script is a reference, not an assignment.
        let html = page(&[
            "if (window.__sc_hydration) { boot(); }",
            r#"window.__sc_hydration = [{"hydratable":"sound","data":{"title":"x"}}];"#,
        ]);
        let payload = PageHydrationParser::new().extract(&html).unwrap();
        assert_eq!(payload.find(SOUND_KIND).unwrap()["title"], "x");
    }

    #[test]
    fn test_skips_non_array_payload() {
        let html = page(&[
            r#"window.__sc_hydration = {"not":"an array"};"#,
            r#"window.__sc_hydration = [{"hydratable":"playlist","data":{}}];"#,
        ]);
        assert!(PageHydrationParser::new().extract(&html).is_ok());
    }

    #[test]
    fn test_script_with_attributes() {
        let html = r#"<script type="text/javascript" crossorigin>window.__sc_hydration = [];</script>"#;
        let payload = PageHydrationParser::new().extract(html).unwrap();
        assert!(payload.entries().is_empty());
    }

    #[test]
    fn test_not_found() {
        let html = page(&["var a = 1;", "console.log('hi');"]);
        let err = PageHydrationParser::new().extract(&html).unwrap_err();
        assert_eq!(err, Error::Parse(ParseError::HydrationNotFound));
    }

    #[test]
    fn test_marker_outside_script_ignored() {
        let html = r#"<p>window.__sc_hydration = [{"hydratable":"playlist","data":{}}];</p>"#;
        assert!(PageHydrationParser::new().extract(html).is_err());
    }

    #[test]
    fn test_require_missing_kind() {
        let html = page(&[r#"window.__sc_hydration = [{"hydratable":"user","data":{}}];"#]);
        let payload = PageHydrationParser::new().extract(&html).unwrap();
        let err = payload.require(PLAYLIST_KIND).unwrap_err();
        assert!(matches!(err, Error::Parse(ParseError::EntryNotFound { .. })));
    }
}
