use serde_json::Value;

use super::Takeaway;

struct Curated {
    title: &'static str,
    description: &'static str,
    href: Option<&'static str>,
}

/// Hand-picked takeaways for articles whose bodies predate the takeaways field.
static CURATED: &[(&str, &[Curated])] = &[(
    "is-scuba-diving-dangerous",
    &[
        Curated {
            title: "Training removes most of the risk",
            description: "Certified divers who follow their training and dive within their limits have a very low incident rate.",
            href: Some("/certifications/"),
        },
        Curated {
            title: "Plan the dive, dive the plan",
            description: "Agree on depth, time and air turn points with your buddy before you descend, then stick to them.",
            href: None,
        },
        Curated {
            title: "Fitness and conditions matter",
            description: "Skip the dive if you feel unwell or conditions are beyond your experience; a guided dive is the safer way to try new sites.",
            href: Some("/tours/"),
        },
    ],
)];

/// Takeaways from the body, or the curated set for `slug` when the body has none.
pub fn resolve_takeaways(body: &Value, slug: &str) -> Vec<Takeaway> {
    let extracted = extract(body);
    if !extracted.is_empty() {
        return extracted;
    }
    curated(slug).unwrap_or_default()
}

fn extract(body: &Value) -> Vec<Takeaway> {
    let Some(entries) = body.get("takeaways").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let title = text_field(entry, "title")?;
            Some(Takeaway {
                title,
                description: text_field(entry, "description"),
                href: text_field(entry, "href"),
            })
        })
        .collect()
}

fn curated(slug: &str) -> Option<Vec<Takeaway>> {
    let (_, entries) = CURATED.iter().find(|(s, _)| *s == slug)?;
    Some(
        entries
            .iter()
            .map(|c| Takeaway {
                title: c.title.to_string(),
                description: Some(c.description.to_string()),
                href: c.href.map(str::to_string),
            })
            .collect(),
    )
}

fn text_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
