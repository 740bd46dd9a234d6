use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::headings::{Heading, HEADING_RE};
use super::{collapse_whitespace, inline_text, rich_text, text_content, NormalizedPost, PostView, Section, TocItem};

pub const WORDS_PER_MINUTE: usize = 200;
pub const EXCERPT_MAX_CHARS: usize = 280;
const ELLIPSIS: char = '…';

/// Attach toc, reading time and date label to a post.
pub fn build_view(post: NormalizedPost) -> PostView {
    let toc = table_of_contents(&post.sections);
    let reading_time = reading_time(&post.sections);
    let date_label = date_label(
        post.updated_at.as_deref(),
        post.published_at.as_deref(),
        Some(reading_time.as_str()),
    );
    PostView {
        post,
        toc,
        reading_time,
        date_label,
    }
}

fn joined_html(sections: &[Section]) -> String {
    rich_text(sections).collect::<Vec<_>>().join(" ")
}

pub fn word_count(sections: &[Section]) -> usize {
    text_content(&joined_html(sections)).split_whitespace().count()
}

pub fn reading_minutes(words: usize) -> usize {
    let minutes = (words as f64 / WORDS_PER_MINUTE as f64).round() as usize;
    minutes.max(1)
}

pub fn reading_time(sections: &[Section]) -> String {
    format!("{} min read", reading_minutes(word_count(sections)))
}

/// `<h2>`/`<h3>` headings that carry an id and visible text, in document order.
pub fn table_of_contents(sections: &[Section]) -> Vec<TocItem> {
    let html = joined_html(sections);
    HEADING_RE
        .captures_iter(&html)
        .filter_map(|caps| {
            let heading = Heading::from_captures(&caps)?;
            let id = heading.id().filter(|id| !id.is_empty())?;
            let text = inline_text(heading.inner);
            if text.is_empty() {
                return None;
            }
            Some(TocItem {
                id: id.to_string(),
                text,
                level: heading.level,
            })
        })
        .collect()
}

/// Explicit excerpt when it has text, otherwise one derived from the body.
pub fn resolve_excerpt(explicit: Option<&str>, sections: &[Section]) -> Option<String> {
    explicit
        .map(collapse_whitespace)
        .filter(|e| !e.is_empty())
        .or_else(|| derive_excerpt(sections, EXCERPT_MAX_CHARS))
}

pub fn derive_excerpt(sections: &[Section], max_chars: usize) -> Option<String> {
    let text = collapse_whitespace(
        &rich_text(sections)
            .map(text_content)
            .collect::<Vec<_>>()
            .join(" "),
    );
    if text.is_empty() {
        return None;
    }
    if text.chars().count() <= max_chars {
        return Some(text);
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.truncate(cut.trim_end().len());
    cut.push(ELLIPSIS);
    Some(cut)
}

/// "Updated Mar 2024 · 6 min read". Falls back to the reading time alone when
/// there is no usable date.
pub fn date_label(
    updated_at: Option<&str>,
    published_at: Option<&str>,
    reading_time: Option<&str>,
) -> Option<String> {
    let raw = updated_at
        .filter(|d| !d.trim().is_empty())
        .or_else(|| published_at.filter(|d| !d.trim().is_empty()));
    let reading_time = reading_time.map(str::to_string);

    let Some(date) = raw.and_then(parse_date) else {
        return reading_time;
    };
    let label = format!("Updated {}", date.format("%b %Y"));
    Some(match reading_time {
        Some(rt) => format!("{} · {}", label, rt),
        None => label,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    // Postgres text output, e.g. "2024-03-05 10:00:00.123+00"
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(dt.date_naive());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
