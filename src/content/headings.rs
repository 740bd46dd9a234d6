use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::inline_text;

/// `<h2>`/`<h3>` elements in document order. No backreferences in `regex`,
/// so each level is its own alternative: groups 1-2 for h2, 3-4 for h3.
/// Quoted attribute values may contain `>`.
pub(crate) static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<h2(\s(?:[^>"']|"[^"]*"|'[^']*')*)?>(.*?)</h2\s*>|<h3(\s(?:[^>"']|"[^"]*"|'[^']*')*)?>(.*?)</h3\s*>"#,
    )
    .unwrap()
});
/// One attribute per match: name in group 1, value (if any) in 2, 3 or 4.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

/// A matched heading element.
pub(crate) struct Heading<'h> {
    pub level: u8,
    pub attrs: &'h str,
    pub inner: &'h str,
}

impl<'h> Heading<'h> {
    pub fn from_captures(caps: &Captures<'h>) -> Option<Self> {
        let (level, attrs, inner) = match (caps.get(2), caps.get(4)) {
            (Some(inner), _) => (2, caps.get(1), inner),
            (None, Some(inner)) => (3, caps.get(3), inner),
            (None, None) => return None,
        };
        Some(Heading {
            level,
            attrs: attrs.map_or("", |m| m.as_str()),
            inner: inner.as_str(),
        })
    }

    /// Value of the `id` attribute; `Some("")` for a bare or empty `id`.
    pub fn id(&self) -> Option<&'h str> {
        let caps = ATTR_RE
            .captures_iter(self.attrs)
            .find(|caps| caps[1].eq_ignore_ascii_case("id"))?;
        Some(
            caps.get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map_or("", |m| m.as_str()),
        )
    }
}

/// Injects anchor ids into headings. One instance covers one document, so
/// ids stay unique across every fragment it augments.
#[derive(Debug, Default)]
pub struct HeadingAugmenter {
    used: HashSet<String>,
    counter: usize,
}

impl HeadingAugmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the author ids in `html` as taken. Call for every fragment of a
    /// document before augmenting any of them.
    pub fn reserve(&mut self, html: &str) {
        for caps in HEADING_RE.captures_iter(html) {
            if let Some(id) = Heading::from_captures(&caps).and_then(|h| h.id()) {
                if !id.is_empty() {
                    self.used.insert(id.to_string());
                }
            }
        }
    }

    /// Give every `<h2>`/`<h3>` without an `id` a generated one. Headings that
    /// already carry an id are left byte-for-byte alone.
    pub fn augment(&mut self, html: &str) -> String {
        self.reserve(html);

        HEADING_RE
            .replace_all(html, |caps: &Captures| {
                let heading = match Heading::from_captures(caps) {
                    Some(h) if h.id().is_none() => h,
                    _ => return caps[0].to_string(),
                };
                let id = self.next_id(&slugify(&inline_text(heading.inner)));
                format!(
                    "<h{level}{attrs} id=\"{id}\">{inner}</h{level}>",
                    level = heading.level,
                    attrs = heading.attrs,
                    inner = heading.inner,
                )
            })
            .into_owned()
    }

    fn next_id(&mut self, base: &str) -> String {
        let id = if base.is_empty() {
            loop {
                self.counter += 1;
                let candidate = format!("section-{}", self.counter);
                if !self.used.contains(&candidate) {
                    break candidate;
                }
            }
        } else if self.used.contains(base) {
            (2..)
                .map(|n| format!("{}-{}", base, n))
                .find(|candidate| !self.used.contains(candidate))
                .unwrap_or_default()
        } else {
            base.to_string()
        };
        self.used.insert(id.clone());
        id
    }
}

/// Lower-case, collapse runs of anything but `[a-z0-9]` into one hyphen, trim hyphens.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Convenience for single fragments.
pub fn augment_headings(html: &str) -> String {
    HeadingAugmenter::new().augment(html)
}
