// src/harvest/listing.rs

//! Parser for the HTML index pages served by a static file server.
//!
//! Only anchor tags matter. Text between tags is ignored; an unterminated
//! tag at the end of the body, or an `<html>` document that never closes,
//! marks the listing as truncated. Links found before the truncation point
//! are still returned.

use std::sync::LazyLock;

use regex::Regex;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("href pattern is valid")
});

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^a\s").expect("anchor pattern is valid"));

/// Links of one listing page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Relative links in document order. Entries ending in `/` are
    /// directories.
    pub links: Vec<String>,
    /// Set when the page was cut short.
    pub error: Option<String>,
}

impl Listing {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub fn parse_listing(body: &str) -> Listing {
    let mut listing = Listing::default();
    let mut rest = body;
    let mut offset = 0;

    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            listing.error = Some(format!("unterminated tag at byte {}", offset + lt));
            return listing;
        };

        let tag = after[..gt].trim_start();
        if ANCHOR.is_match(tag) {
            if let Some(link) = href(tag).map(decode_entities).and_then(entry_link) {
                listing.links.push(link);
            }
        }

        let consumed = lt + 1 + gt + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    let lower = body.to_ascii_lowercase();
    if lower.contains("<html") && !lower.contains("</html>") {
        listing.error = Some("document ends before </html>".to_string());
    }
    listing
}

fn href(tag: &str) -> Option<&str> {
    let caps = HREF.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

/// Decode the predefined XML entities an index page uses inside attributes.
fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Normalised link of a listing entry, or `None` for sort links, self and
/// parent links, absolute paths and other hosts.
fn entry_link(link: String) -> Option<String> {
    if link.starts_with('?')
        || link.starts_with('#')
        || link.starts_with('/')
        || link.starts_with("../")
        || link == ".."
        || link.contains("://")
    {
        return None;
    }

    let mut rest = link.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    match rest {
        "" | "." => None,
        entry => Some(entry.to_string()),
    }
}
