pub mod cache;
pub mod storage;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::content::{HeroImage, Section};
use cache::HeroCache;
use storage::AssetStore;

/// Probe order; the first file that exists wins.
pub const HERO_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Hero declared by the content itself: a `heroImage` body field, else the
/// first image section.
pub fn explicit_hero(body: &Value, sections: &[Section]) -> Option<HeroImage> {
    from_body_field(body).or_else(|| {
        sections.iter().find_map(|s| match s {
            Section::Image { url, alt, .. } => Some(HeroImage {
                src: url.clone(),
                alt: alt.clone(),
            }),
            Section::RichText { .. } => None,
        })
    })
}

fn from_body_field(body: &Value) -> Option<HeroImage> {
    let field = body.get("heroImage")?;
    let (src, alt) = match field {
        Value::String(src) => (src.as_str(), None),
        Value::Object(obj) => (
            obj.get("url").or_else(|| obj.get("src"))?.as_str()?,
            obj.get("alt").and_then(Value::as_str),
        ),
        _ => return None,
    };
    let src = src.trim();
    if src.is_empty() {
        return None;
    }
    Some(HeroImage {
        src: src.to_string(),
        alt: alt.map(str::trim).filter(|a| !a.is_empty()).map(str::to_string),
    })
}

/// Finds cover images by probing storage for `{slug}.{ext}`.
pub struct HeroResolver<S> {
    store: Option<S>,
    cache: Arc<dyn HeroCache>,
}

impl<S: AssetStore> HeroResolver<S> {
    /// `store` is `None` when no storage origin is configured.
    pub fn new(store: Option<S>, cache: Arc<dyn HeroCache>) -> Self {
        Self { store, cache }
    }

    pub async fn resolve(
        &self,
        explicit: Option<HeroImage>,
        slug: &str,
        title: &str,
    ) -> Option<HeroImage> {
        if explicit.is_some() {
            return explicit;
        }
        if slug.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(slug) {
            debug!(slug, found = cached.is_some(), "hero cache hit");
            return cached;
        }
        let Some(store) = &self.store else {
            self.cache.set(slug, None);
            return None;
        };

        let hero = self.probe(store, slug, title).await;
        self.cache.set(slug, hero.clone());
        hero
    }

    async fn probe(&self, store: &S, slug: &str, title: &str) -> Option<HeroImage> {
        for ext in HERO_EXTENSIONS {
            let filename = format!("{}.{}", slug, ext);

            let url = match store.find(&filename).await {
                Ok(Some(url)) => url,
                Ok(None) => store.public_url(&filename),
                Err(e) => {
                    warn!(slug, %filename, error = %e, "hero listing failed");
                    continue;
                }
            };

            match store.exists(&url).await {
                Ok(true) => {
                    info!(slug, %url, "hero found");
                    let alt = Some(title.trim()).filter(|t| !t.is_empty()).map(str::to_string);
                    return Some(HeroImage { src: url, alt });
                }
                Ok(false) => debug!(slug, %url, "hero candidate missing"),
                Err(e) => warn!(slug, %url, error = %e, "hero probe failed"),
            }
        }
        debug!(slug, "no hero in storage");
        None
    }
}
