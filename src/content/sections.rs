use pulldown_cmark::{html::push_html, Options, Parser};
use serde_json::Value;

use super::headings::HeadingAugmenter;
use super::{escape_html, Section};

type BodyParser = fn(&Value) -> Option<Vec<Section>>;

/// Body shapes in priority order; the first one that yields sections wins.
const PARSERS: &[BodyParser] = &[from_structured, from_html, from_markdown];

/// Turn a post body into ordered sections. Never empty: when nothing can be
/// extracted a single placeholder naming `fallback_label` is returned.
pub fn normalize_sections(body: &Value, fallback_label: &str) -> Vec<Section> {
    parse_sections(body).unwrap_or_else(|| vec![placeholder(fallback_label)])
}

/// Like [`normalize_sections`] but reports "nothing extractable" as `None`.
pub fn parse_sections(body: &Value) -> Option<Vec<Section>> {
    PARSERS.iter().find_map(|parse| parse(body))
}

pub fn placeholder(fallback_label: &str) -> Section {
    Section::RichText {
        html: format!(
            "<p>Content coming soon for {}</p>",
            escape_html(fallback_label)
        ),
    }
}

fn from_structured(body: &Value) -> Option<Vec<Section>> {
    let entries = body.get("sections")?.as_array()?;
    let mut headings = HeadingAugmenter::new();
    for entry in entries {
        if let Some(html) = rich_text_html(entry) {
            headings.reserve(html);
        }
    }
    let sections: Vec<Section> = entries
        .iter()
        .filter_map(|entry| parse_entry(entry, &mut headings))
        .collect();
    non_empty(sections)
}

fn rich_text_html(entry: &Value) -> Option<&str> {
    match entry.get("type").and_then(Value::as_str) {
        Some("richText") => non_blank_str(entry, "html"),
        _ => None,
    }
}

fn parse_entry(entry: &Value, headings: &mut HeadingAugmenter) -> Option<Section> {
    if let Some(html) = rich_text_html(entry) {
        return Some(Section::RichText {
            html: headings.augment(html),
        });
    }
    if entry.get("type").and_then(Value::as_str) == Some("image") {
        if let Some(url) = non_blank_str(entry, "url") {
            return Some(Section::Image {
                url: url.to_string(),
                alt: owned(non_blank_str(entry, "alt")),
                caption: owned(non_blank_str(entry, "caption")),
            });
        }
    }

    // Media blocks nest the asset: { image: { url, alt }, caption }
    let image = entry.get("image")?;
    let url = non_blank_str(image, "url")?;
    Some(Section::Image {
        url: url.to_string(),
        alt: owned(non_blank_str(entry, "alt").or_else(|| non_blank_str(image, "alt"))),
        caption: owned(non_blank_str(entry, "caption").or_else(|| non_blank_str(image, "caption"))),
    })
}

fn from_html(body: &Value) -> Option<Vec<Section>> {
    let html = non_blank_str(body, "html")?;
    Some(vec![Section::RichText {
        html: HeadingAugmenter::new().augment(html),
    }])
}

fn from_markdown(body: &Value) -> Option<Vec<Section>> {
    let markdown = non_blank_str(body, "markdown")?;
    Some(vec![Section::RichText {
        html: HeadingAugmenter::new().augment(&render_markdown(markdown)),
    }])
}

/// CommonMark plus tables, strikethrough and `{#id}` heading attributes.
fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_HEADING_ATTRIBUTES;
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    push_html(&mut html, Parser::new_ext(markdown, options));
    html
}

fn non_blank_str<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(|s| s.trim().to_string())
}

fn non_empty(sections: Vec<Section>) -> Option<Vec<Section>> {
    if sections.is_empty() {
        None
    } else {
        Some(sections)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(name: &str) -> Value {
        let raw = std::fs::read_to_string(format!("tests/fixtures/{}.json", name)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn structured_rich_text_gets_anchor() {
        let body = json!({
            "sections": [{ "type": "richText", "html": "<h2>Reef Safety</h2><p>Text</p>" }]
        });
        let sections = normalize_sections(&body, "/blog/reef/");
        assert_eq!(
            sections,
            vec![Section::RichText {
                html: "<h2 id=\"reef-safety\">Reef Safety</h2><p>Text</p>".into()
            }]
        );
    }

    #[test]
    fn empty_body_gets_placeholder() {
        let sections = normalize_sections(&json!({}), "/blog/my-post/");
        assert_eq!(sections.len(), 1);
        let html = sections[0].html().unwrap();
        assert!(html.contains("Content coming soon for /blog/my-post/"));
    }

    #[test]
    fn never_empty() {
        for body in [
            Value::Null,
            json!({}),
            json!([]),
            json!("just a string"),
            json!({ "sections": [] }),
            json!({ "sections": [{ "foo": 1 }, { "type": "video" }, 3, null] }),
            json!({ "sections": "not an array", "html": "   " }),
            json!({ "markdown": 42 }),
        ] {
            let sections = normalize_sections(&body, "/x/");
            assert!(!sections.is_empty(), "empty for {}", body);
            assert!(parse_sections(&body).is_none(), "parsed {}", body);
        }
    }

    #[test]
    fn mixed_fixture_keeps_order_and_skips_unknown() {
        let sections = normalize_sections(&fixture("mixed_sections"), "/blog/manta-night/");
        assert_eq!(sections.len(), 4);
        assert!(matches!(&sections[0], Section::RichText { html } if html.contains("id=\"before-you-go\"")));
        assert_eq!(
            sections[1],
            Section::Image {
                url: "https://cdn.example.com/manta.jpg".into(),
                alt: Some("Manta ray at night".into()),
                caption: None,
            }
        );
        assert_eq!(
            sections[2],
            Section::Image {
                url: "https://cdn.example.com/torch.png".into(),
                alt: Some("Dive torch".into()),
                caption: Some("Bring two lights".into()),
            }
        );
        assert!(matches!(&sections[3], Section::RichText { html } if html.contains("id=\"on-the-boat\"")));
    }

    #[test]
    fn ids_unique_across_sections() {
        let body = json!({ "sections": [
            { "type": "richText", "html": "<h2>Gear</h2>" },
            { "type": "richText", "html": "<h2>Gear</h2>" }
        ]});
        let sections = normalize_sections(&body, "/x/");
        assert!(sections[1].html().unwrap().contains("id=\"gear-2\""));
    }

    #[test]
    fn structured_beats_flat_html() {
        let body = json!({
            "sections": [{ "type": "image", "url": "https://cdn.example.com/a.webp" }],
            "html": "<p>ignored</p>"
        });
        let sections = normalize_sections(&body, "/x/");
        assert_eq!(sections.len(), 1);
        assert!(matches!(sections[0], Section::Image { .. }));
    }

    #[test]
    fn falls_back_to_flat_html_when_sections_unusable() {
        let body = json!({
            "sections": [{ "type": "richText", "html": 5 }],
            "html": "<h3>Why Go</h3><p>Because.</p>"
        });
        let sections = normalize_sections(&body, "/x/");
        assert_eq!(
            sections,
            vec![Section::RichText {
                html: "<h3 id=\"why-go\">Why Go</h3><p>Because.</p>".into()
            }]
        );
    }

    #[test]
    fn author_id_in_later_section_is_never_repeated() {
        let body = json!({ "sections": [
            { "type": "richText", "html": "<h2>Gear</h2>" },
            { "type": "richText", "html": "<h2 id=\"gear\">Own</h2>" }
        ]});
        let sections = normalize_sections(&body, "/x/");
        assert_eq!(sections[0].html(), Some("<h2 id=\"gear-2\">Gear</h2>"));
        assert_eq!(sections[1].html(), Some("<h2 id=\"gear\">Own</h2>"));
    }

    #[test]
    fn markdown_headings_are_rendered_and_augmented() {
        let body = json!({ "markdown": "## Dive Sites\n\nFirst line\nsecond line\n\n### Tips ##\nStay calm & breathe\n\n## C# Divers" });
        let sections = normalize_sections(&body, "/x/");
        let html = sections[0].html().unwrap();
        assert!(html.contains("<h2 id=\"dive-sites\">Dive Sites</h2>"));
        assert!(html.contains("<h3 id=\"tips\">Tips</h3>"));
        assert!(html.contains("<p>Stay calm &amp; breathe</p>"));
        assert!(html.contains("<h2 id=\"c-divers\">C# Divers</h2>"));
    }

    #[test]
    fn markdown_inline_and_block_syntax_is_rendered() {
        let body = json!({ "markdown": "Read **this** and [book](/tours/)\n\n- one\n- two\n\n## Gear {#kit}" });
        let sections = normalize_sections(&body, "/x/");
        let html = sections[0].html().unwrap();
        assert!(html.contains("<strong>this</strong>"));
        assert!(html.contains("<a href=\"/tours/\">book</a>"));
        assert!(html.contains("<li>one</li>"));
        assert!(html.contains("<li>two</li>"));
        assert!(html.contains("<h2 id=\"kit\">Gear</h2>"));
        assert!(!html.contains("**"));
    }

    #[test]
    fn placeholder_label_is_escaped() {
        let html = placeholder("<script>").html().unwrap().to_string();
        assert!(html.contains("&lt;script&gt;"));
    }
}
