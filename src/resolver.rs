use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::content::metadata::{build_view, resolve_excerpt};
use crate::content::sections::{normalize_sections, parse_sections};
use crate::content::takeaways::resolve_takeaways;
use crate::content::{NormalizedPost, PostSource, PostView, Section};
use crate::db::{self, PostRecord};
use crate::hero::storage::AssetStore;
use crate::hero::{explicit_hero, HeroResolver};

const PUBLISHED: &str = "published";

/// Why one schema could not serve a post.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("database query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("no matching row")]
    NotFound,
    #[error("status is {0:?}, not published")]
    Unpublished(String),
    #[error("body has no extractable content")]
    EmptyContent,
}

/// Location of a post: canonical `/category/slug/` path plus its slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteKey {
    pub path: String,
    pub slug: String,
}

impl RouteKey {
    pub fn new(category: Option<&str>, slug: &str) -> Self {
        let segments: Vec<&str> = category
            .into_iter()
            .chain(std::iter::once(slug))
            .flat_map(|part| part.split('/'))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let path = if segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", segments.join("/"))
        };
        RouteKey {
            slug: segments.last().map(|s| s.to_string()).unwrap_or_default(),
            path,
        }
    }
}

struct Resolved {
    source: PostSource,
    record: PostRecord,
    body: Value,
    sections: Vec<Section>,
}

/// Looks posts up through the primary schema, then the secondary one, and
/// assembles the rendering model.
pub struct ContentResolver<S> {
    conn: Connection,
    tenant_id: String,
    heroes: HeroResolver<S>,
}

impl<S: AssetStore> ContentResolver<S> {
    pub fn new(conn: Connection, tenant_id: &str, heroes: HeroResolver<S>) -> Self {
        Self {
            conn,
            tenant_id: tenant_id.to_string(),
            heroes,
        }
    }

    pub fn heroes(&self) -> &HeroResolver<S> {
        &self.heroes
    }

    /// Resolve a post, or `None` when neither schema can serve it. Never errors.
    pub async fn resolve(&self, category: Option<&str>, slug: &str) -> Option<PostView> {
        let route = RouteKey::new(category, slug);
        if route.slug.is_empty() {
            debug!(path = %route.path, "no slug in route");
            return None;
        }

        let resolved = match self.from_primary(&route) {
            Ok(found) => found,
            Err(e) => {
                log_miss(PostSource::Primary, &route, &e);
                match self.from_secondary(&route) {
                    Ok(found) => found,
                    Err(e) => {
                        log_miss(PostSource::Secondary, &route, &e);
                        info!(path = %route.path, "post not found");
                        return None;
                    }
                }
            }
        };

        Some(self.assemble(&route, resolved).await)
    }

    fn from_primary(&self, route: &RouteKey) -> Result<Resolved, ResolveError> {
        let record = db::fetch_primary(&self.conn, &self.tenant_id, &route.path)?
            .ok_or(ResolveError::NotFound)?;
        if let Some(status) = record.status.as_deref() {
            if status != PUBLISHED {
                return Err(ResolveError::Unpublished(status.to_string()));
            }
        }
        let body = db::parse_body(record.body.as_deref());
        // An empty primary post defers to the secondary schema.
        let sections = parse_sections(&body).ok_or(ResolveError::EmptyContent)?;
        Ok(Resolved {
            source: PostSource::Primary,
            record,
            body,
            sections,
        })
    }

    fn from_secondary(&self, route: &RouteKey) -> Result<Resolved, ResolveError> {
        let record = db::fetch_secondary(&self.conn, &route.slug)?.ok_or(ResolveError::NotFound)?;
        let body = db::parse_body(record.body.as_deref());
        let sections = normalize_sections(&body, &route.path);
        Ok(Resolved {
            source: PostSource::Secondary,
            record,
            body,
            sections,
        })
    }

    async fn assemble(&self, route: &RouteKey, resolved: Resolved) -> PostView {
        let Resolved {
            source,
            record,
            body,
            sections,
        } = resolved;

        let title = record
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| route.slug.clone());

        let hero = self
            .heroes
            .resolve(explicit_hero(&body, &sections), &route.slug, &title)
            .await;
        let takeaways = resolve_takeaways(&body, &route.slug);
        let excerpt = resolve_excerpt(record.excerpt.as_deref(), &sections);

        info!(
            slug = %route.slug,
            source = source.as_str(),
            sections = sections.len(),
            hero = hero.is_some(),
            "post resolved"
        );

        build_view(NormalizedPost {
            slug: route.slug.clone(),
            path: record.path.unwrap_or_else(|| route.path.clone()),
            source,
            title,
            author: record.author.filter(|a| !a.trim().is_empty()),
            excerpt,
            sections,
            takeaways,
            hero,
            tags: db::parse_tags(record.tags.as_deref()),
            published_at: record.published_at,
            updated_at: record.updated_at,
            canonical_url: record.canonical_url,
        })
    }
}

fn log_miss(source: PostSource, route: &RouteKey, err: &ResolveError) {
    match err {
        ResolveError::Query(e) => warn!(
            source = source.as_str(),
            path = %route.path,
            error = %e,
            "post lookup failed"
        ),
        other => debug!(
            source = source.as_str(),
            path = %route.path,
            reason = %other,
            "post lookup missed"
        ),
    }
}
