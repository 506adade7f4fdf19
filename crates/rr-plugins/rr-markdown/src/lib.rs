//! # rr-markdown
//!
//! CommonMark implementation of `MarkdownRenderer`.
//! Raw HTML in the input is escaped, and links or images with script-capable
//! schemes are pointed at `#`.

use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag};
use rr_core::error::{AppError, Result};
use rr_core::traits::MarkdownRenderer;

/// Inputs above this size are refused rather than rendered.
pub const MAX_INPUT_BYTES: usize = 64 * 1024;

const BLOCKED_SCHEMES: [&str; 3] = ["javascript:", "vbscript:", "data:"];

#[derive(Debug, Clone)]
pub struct CommonMarkRenderer {
    options: Options,
}

impl CommonMarkRenderer {
    pub fn new() -> Self {
        Self {
            options: Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES,
        }
    }
}

impl Default for CommonMarkRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer for CommonMarkRenderer {
    fn render(&self, raw: &str) -> Result<String> {
        if raw.len() > MAX_INPUT_BYTES {
            return Err(AppError::Render(format!(
                "input is {} bytes, limit is {MAX_INPUT_BYTES}",
                raw.len()
            )));
        }
        if raw.contains('\0') {
            return Err(AppError::Render("input contains NUL bytes".into()));
        }

        let events = Parser::new_ext(raw, self.options).map(|event| match event {
            // push_html escapes Text, so raw markup shows up literally
            Event::Html(markup) | Event::InlineHtml(markup) => Event::Text(markup),
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Link {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => Event::Start(Tag::Image {
                link_type,
                dest_url: safe_url(dest_url),
                title,
                id,
            }),
            other => other,
        });

        let mut out = String::with_capacity(raw.len() * 3 / 2);
        html::push_html(&mut out, events);
        Ok(out)
    }
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let normalized: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    if BLOCKED_SCHEMES.iter().any(|s| normalized.starts_with(s)) {
        CowStr::Borrowed("#")
    } else {
        url
    }
}
