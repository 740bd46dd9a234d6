use std::time::Duration;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::Value;
use tracing::warn;

pub fn connect(path: &str, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

/// Both post schemas as written by the editorial system.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Primary schema: posts addressed through routes
        CREATE TABLE IF NOT EXISTS routes (
            id            TEXT PRIMARY KEY,
            tenant_id     TEXT NOT NULL,
            path          TEXT NOT NULL,
            canonical_url TEXT,
            route_type    TEXT NOT NULL DEFAULT 'page'
        );
        CREATE INDEX IF NOT EXISTS idx_routes_path ON routes(tenant_id, path);

        CREATE TABLE IF NOT EXISTS posts (
            id                TEXT PRIMARY KEY,
            tenant_id         TEXT NOT NULL,
            route_id          TEXT REFERENCES routes(id),
            title             TEXT,
            author            TEXT,
            status            TEXT,
            excerpt           TEXT,
            body              TEXT,
            tags              TEXT,
            published_at      TEXT,
            post_published_at TEXT,
            updated_at        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_posts_route ON posts(route_id);

        -- Secondary schema: denormalized blog view keyed by slug
        CREATE TABLE IF NOT EXISTS blog_post_view (
            id            TEXT PRIMARY KEY,
            slug          TEXT NOT NULL,
            title         TEXT,
            excerpt       TEXT,
            body          TEXT,
            tags          TEXT,
            author        TEXT,
            status        TEXT,
            published_at  TEXT,
            updated_at    TEXT,
            canonical_url TEXT,
            path          TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_view_slug ON blog_post_view(slug, status);
        ",
    )?;
    Ok(())
}

/// A post row from either schema, columns aligned.
#[derive(Debug, Clone, Default)]
pub struct PostRecord {
    pub id: String,
    pub slug: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub status: Option<String>,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub tags: Option<String>,
    pub published_at: Option<String>,
    pub updated_at: Option<String>,
    pub canonical_url: Option<String>,
    pub path: Option<String>,
}

const PRIMARY_SELECT: &str = "
    SELECT p.id, NULL, p.title, p.author, p.status, p.excerpt, p.body, p.tags,
           COALESCE(p.post_published_at, p.published_at), p.updated_at,
           r.canonical_url, r.path
    FROM posts p
    JOIN routes r ON r.id = p.route_id
    WHERE p.tenant_id = ?1 AND r.route_type = 'post'";

const SECONDARY_SELECT: &str = "
    SELECT id, slug, title, author, status, excerpt, body, tags,
           published_at, updated_at, canonical_url, path
    FROM blog_post_view";

fn map_record(row: &Row) -> rusqlite::Result<PostRecord> {
    Ok(PostRecord {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        status: row.get(4)?,
        excerpt: row.get(5)?,
        body: row.get(6)?,
        tags: row.get(7)?,
        published_at: row.get(8)?,
        updated_at: row.get(9)?,
        canonical_url: row.get(10)?,
        path: row.get(11)?,
    })
}

// ── Lookups ──

/// Primary schema lookup by route path, with or without the trailing slash.
pub fn fetch_primary(
    conn: &Connection,
    tenant_id: &str,
    path: &str,
) -> rusqlite::Result<Option<PostRecord>> {
    let trimmed = path.trim_end_matches('/');
    let slashed = format!("{}/", trimmed);
    let sql = format!("{} AND r.path IN (?2, ?3) LIMIT 1", PRIMARY_SELECT);
    conn.query_row(&sql, rusqlite::params![tenant_id, slashed, trimmed], map_record)
        .optional()
}

/// Secondary schema lookup: newest published row for `slug`.
pub fn fetch_secondary(conn: &Connection, slug: &str) -> rusqlite::Result<Option<PostRecord>> {
    let sql = format!(
        "{} WHERE slug = ?1 AND status = 'published' ORDER BY published_at DESC LIMIT 1",
        SECONDARY_SELECT
    );
    conn.query_row(&sql, [slug], map_record).optional()
}

/// Every post row in both schemas, for auditing.
pub fn fetch_all(
    conn: &Connection,
    tenant_id: &str,
    limit: Option<usize>,
) -> Result<(Vec<PostRecord>, Vec<PostRecord>)> {
    let limit_clause = match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    };

    let mut stmt = conn.prepare(&format!("{} ORDER BY p.id{}", PRIMARY_SELECT, limit_clause))?;
    let primary = stmt
        .query_map([tenant_id], map_record)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(&format!("{} ORDER BY id{}", SECONDARY_SELECT, limit_clause))?;
    let secondary = stmt
        .query_map([], map_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((primary, secondary))
}

// ── Column decoding ──

/// Parse a JSON body column. Unparseable text is malformed content and
/// becomes `null`; a JSON string holding a JSON object is unwrapped once.
pub fn parse_body(raw: Option<&str>) -> Value {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Value::Null;
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::String(inner)) => match serde_json::from_str::<Value>(&inner) {
            Ok(value @ Value::Object(_)) => value,
            _ => Value::String(inner),
        },
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "unparseable post body");
            Value::Null
        }
    }
}

/// Tags as a JSON array of strings or a comma-separated list.
pub fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Vec::new();
    };
    let tags: Vec<String> = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => raw.split(',').map(str::to_string).collect(),
    };
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ── Test helpers ──


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_matches_either_slash_form() {
        let conn = memory_db();
        insert_primary(&conn, &PrimaryPost { path: "/blog/reef-safety", ..Default::default() });
        let rec = fetch_primary(&conn, "default", "/blog/reef-safety/").unwrap().unwrap();
        assert_eq!(rec.id, "p1");
        assert_eq!(rec.published_at.as_deref(), Some("2024-01-12T09:00:00Z"));
        assert_eq!(rec.canonical_url.as_deref(), Some("https://tours.example.com/blog/reef-safety"));
    }

    #[test]
    fn primary_scoped_by_tenant_and_route_type() {
        let conn = memory_db();
        insert_primary(&conn, &PrimaryPost { tenant_id: "other", ..Default::default() });
        insert_primary(&conn, &PrimaryPost { id: "p2", route_type: "page", ..Default::default() });
        assert!(fetch_primary(&conn, "default", "/blog/reef-safety/").unwrap().is_none());
    }

    #[test]
    fn secondary_picks_newest_published() {
        let conn = memory_db();
        insert_secondary(&conn, "a", "wrecks", "published", "2023-01-01", None);
        insert_secondary(&conn, "b", "wrecks", "published", "2024-05-01", None);
        insert_secondary(&conn, "c", "wrecks", "draft", "2025-01-01", None);
        let rec = fetch_secondary(&conn, "wrecks").unwrap().unwrap();
        assert_eq!(rec.id, "b");
        assert_eq!(rec.slug.as_deref(), Some("wrecks"));
    }

    #[test]
    fn fetch_all_reads_both_schemas() {
        let conn = memory_db();
        insert_primary(&conn, &PrimaryPost::default());
        insert_secondary(&conn, "a", "wrecks", "published", "2023-01-01", None);
        let (primary, secondary) = fetch_all(&conn, "default", None).unwrap();
        assert_eq!(primary.len(), 1);
        assert_eq!(secondary.len(), 1);
    }

    #[test]
    fn body_parsing_degrades() {
        assert_eq!(parse_body(None), Value::Null);
        assert_eq!(parse_body(Some("{not json")), Value::Null);
        assert_eq!(parse_body(Some(r#"{"html":"<p>x</p>"}"#)), json!({ "html": "<p>x</p>" }));
        assert_eq!(
            parse_body(Some(r##""{\"markdown\":\"# Hi\"}""##)),
            json!({ "markdown": "# Hi" })
        );
        assert_eq!(parse_body(Some(r#""plain""#)), json!("plain"));
    }

    #[test]
    fn tags_from_json_or_csv() {
        assert_eq!(parse_tags(Some(r#"["reef", " safety ", 3]"#)), ["reef", "safety"]);
        assert_eq!(parse_tags(Some("wreck, night ,")), ["wreck", "night"]);
        assert!(parse_tags(Some("  ")).is_empty());
    }
}
