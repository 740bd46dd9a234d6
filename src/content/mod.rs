pub mod headings;
pub mod metadata;
pub mod sections;
pub mod takeaways;

use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;
use serde::Serialize;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// One ordered unit of post content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Section {
    RichText {
        html: String,
    },
    Image {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl Section {
    pub fn html(&self) -> Option<&str> {
        match self {
            Section::RichText { html } => Some(html),
            Section::Image { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeroImage {
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Takeaway {
    pub title: String,
    pub description: Option<String>,
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TocItem {
    pub id: String,
    pub text: String,
    pub level: u8,
}

/// Which schema served a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSource {
    Primary,
    Secondary,
}

impl PostSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PostSource::Primary => "primary",
            PostSource::Secondary => "secondary",
        }
    }
}

/// The rendering model handed to the page layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPost {
    pub slug: String,
    pub path: String,
    pub source: PostSource,
    pub title: String,
    pub author: Option<String>,
    pub excerpt: Option<String>,
    pub sections: Vec<Section>,
    pub takeaways: Vec<Takeaway>,
    pub hero: Option<HeroImage>,
    pub tags: Vec<String>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub canonical_url: Option<String>,
}

/// A post plus the metadata derived from its sections.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub post: NormalizedPost,
    pub toc: Vec<TocItem>,
    pub reading_time: String,
    pub date_label: Option<String>,
}

/// Rich-text sections in document order.
pub fn rich_text(sections: &[Section]) -> impl Iterator<Item = &str> {
    sections.iter().filter_map(Section::html)
}

/// Strip tags (each replaced by a space) and collapse whitespace.
pub fn text_content(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    collapse_whitespace(&decode_html_entities(&stripped))
}

/// Strip tags without inserting separators, for inline content like headings.
pub fn inline_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, "");
    collapse_whitespace(&decode_html_entities(&stripped))
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
