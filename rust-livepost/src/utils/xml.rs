//! Minimal path-tracking walker over `quick-xml` events.
//!
//! Feed parsers only need "element at this path opened with these
//! attributes" and "element at this path closed with this text", so the
//! walker flattens the event stream into exactly those two callbacks.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::Result;

/// One structural event. `path` is the qualified element names from the
/// root down to (and including) the current element.
#[derive(Debug)]
pub enum XmlNode<'a> {
    Open {
        path: &'a [String],
        attrs: &'a [(String, String)],
    },
    Close {
        path: &'a [String],
        text: &'a str,
    },
}

impl XmlNode<'_> {
    fn path(&self) -> &[String] {
        match self {
            Self::Open { path, .. } | Self::Close { path, .. } => path,
        }
    }

    /// Whether the current path ends with `suffix`.
    pub fn at(&self, suffix: &[&str]) -> bool {
        let path = self.path();
        path.len() >= suffix.len()
            && path[path.len() - suffix.len()..]
                .iter()
                .zip(suffix)
                .all(|(a, b)| a == b)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Open { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            Self::Close { .. } => None,
        }
    }
}

fn attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}

/// Walk `xml`, calling `visit` for every element open and close.
pub fn walk(xml: &str, mut visit: impl FnMut(XmlNode<'_>)) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let attrs = attributes(&e)?;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                texts.push(String::new());
                visit(XmlNode::Open {
                    path: &path,
                    attrs: &attrs,
                });
            }
            Event::Empty(e) => {
                let attrs = attributes(&e)?;
                path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                visit(XmlNode::Open {
                    path: &path,
                    attrs: &attrs,
                });
                visit(XmlNode::Close {
                    path: &path,
                    text: "",
                });
                path.pop();
            }
            Event::Text(t) => {
                if let Some(buf) = texts.last_mut() {
                    buf.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(buf) = texts.last_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let text = texts.pop().unwrap_or_default();
                visit(XmlNode::Close {
                    path: &path,
                    text: text.trim(),
                });
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(())
}
