//! Link facet extraction for AT Protocol rich text.
//!
//! Bluesky posts annotate spans of their text with *facets*. Facet indices
//! are UTF-8 byte offsets into the post text, not character offsets, so a
//! post containing Japanese text before a URL has a `byteStart` much larger
//! than the URL's character position.
//!
//! This crate only detects `http://` / `https://` links. A link runs from
//! the scheme up to the first whitespace character (or the end of the text).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Record type of a link facet feature.
pub const LINK_FEATURE_TYPE: &str = "app.bsky.richtext.facet#link";

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("link regex is valid"));

/// Byte range a facet applies to. `byte_end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

/// A single facet feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#link")]
    Link { uri: String },
}

/// A rich-text facet as serialized into a post record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    /// Create a link facet.
    pub fn link(byte_start: usize, byte_end: usize, uri: impl Into<String>) -> Self {
        Self {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![FacetFeature::Link { uri: uri.into() }],
        }
    }

    /// The linked URI, if this is a link facet.
    pub fn uri(&self) -> Option<&str> {
        self.features.iter().find_map(|f| match f {
            FacetFeature::Link { uri } => Some(uri.as_str()),
        })
    }
}

/// Find every link in `text` and return one facet per link, in order.
pub fn link_facets(text: &str) -> Vec<Facet> {
    LINK_RE
        .find_iter(text)
        .map(|m| Facet::link(m.start(), m.end(), m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_offsets() {
        let text = "Live now: https://youtu.be/abc123 go";
        let facets = link_facets(text);
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].index.byte_start, 10);
        assert_eq!(facets[0].index.byte_end, 33);
        assert_eq!(facets[0].uri(), Some("https://youtu.be/abc123"));
        assert_eq!(
            &text[facets[0].index.byte_start..facets[0].index.byte_end],
            "https://youtu.be/abc123"
        );
    }

    #[test]
    fn test_multibyte_prefix_uses_byte_offsets() {
        // Each of these kana is 3 bytes in UTF-8.
        let text = "配信開始 https://example.com/watch";
        let facets = link_facets(text);
        assert_eq!(facets.len(), 1);
        assert_eq!(facets[0].index.byte_start, "配信開始 ".len());
        assert_eq!(facets[0].index.byte_start, 13);
        assert_eq!(facets[0].index.byte_end, text.len());
    }

    #[test]
    fn test_link_stops_at_whitespace() {
        let text = "a http://x.test/1\nb https://y.test/2\tc";
        let uris: Vec<_> = link_facets(text)
            .iter()
            .map(|f| f.uri().unwrap().to_string())
            .collect();
        assert_eq!(uris, vec!["http://x.test/1", "https://y.test/2"]);
    }

    #[test]
    fn test_no_links() {
        assert!(link_facets("no links here, ftp://nope").is_empty());
        assert!(link_facets("").is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let facet = Facet::link(0, 5, "https://a");
        let json = serde_json::to_value(&facet).unwrap();
        assert_eq!(json["index"]["byteStart"], 0);
        assert_eq!(json["index"]["byteEnd"], 5);
        assert_eq!(json["features"][0]["$type"], LINK_FEATURE_TYPE);
        assert_eq!(json["features"][0]["uri"], "https://a");
    }
}
