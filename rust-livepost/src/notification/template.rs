//! Post body templates.
//!
//! Placeholders: `{title}`, `{channel}`, `{url}`, `{start}`. Unknown
//! placeholders are left as-is.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::Local;
use regex::{Captures, Regex};

use crate::domain::{PostKind, VideoRecord};

/// Bluesky counts graphemes; chars are a close, conservative stand-in.
pub const MAX_POST_CHARS: usize = 300;

const ELLIPSIS: char = '…';

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(title|channel|url|start)\}").unwrap());

fn default_template(kind: PostKind, premiere: bool) -> &'static str {
    match (kind, premiere) {
        (PostKind::Video, _) => "📺 New video from {channel}\n{title}\n{url}",
        (PostKind::Schedule, false) => "📅 {channel} scheduled a stream for {start}\n{title}\n{url}",
        (PostKind::Schedule, true) => "📅 {channel} scheduled a premiere for {start}\n{title}\n{url}",
        (PostKind::Live, false) => "🔴 {channel} is live now!\n{title}\n{url}",
        (PostKind::Live, true) => "🎬 {channel}'s premiere has started!\n{title}\n{url}",
        (PostKind::LiveEnd, _) => "{channel} has finished streaming.\n{title}\n{url}",
        (PostKind::Archive, _) => "🎞 Archive available: {title}\n{url}",
    }
}

/// Per-kind templates with built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Templates {
    overrides: HashMap<PostKind, String>,
}

impl Templates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, kind: PostKind, template: impl Into<String>) -> Self {
        self.overrides.insert(kind, template.into());
        self
    }

    pub fn template_for(&self, kind: PostKind, premiere: bool) -> &str {
        self.overrides
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_template(kind, premiere))
    }

    /// Render a post body, shortening the title if the result would exceed
    /// `max_chars`.
    pub fn render(&self, kind: PostKind, record: &VideoRecord, max_chars: usize) -> String {
        let template = self.template_for(kind, record.is_premiere());
        let text = fill(template, record, &record.title);
        let over = text.chars().count().saturating_sub(max_chars);
        if over == 0 {
            return text;
        }

        let title_len = record.title.chars().count();
        let keep = title_len.saturating_sub(over + 1);
        let mut title: String = record.title.chars().take(keep).collect();
        title.push(ELLIPSIS);
        fill(template, record, &title)
    }
}

fn fill(template: &str, record: &VideoRecord, title: &str) -> String {
    let start = record
        .published_at
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string();
    // Substituted values are never rescanned.
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "title" => title,
            "channel" => record.channel_name.as_str(),
            "url" => record.video_url.as_str(),
            _ => start.as_str(),
        })
        .into_owned()
}
