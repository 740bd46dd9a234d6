use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use blog_resolver::content::metadata::word_count;
use blog_resolver::content::sections::parse_sections;
use blog_resolver::content::{PostSource, Section};
use blog_resolver::db::{self, PostRecord};
use blog_resolver::hero::cache::MemoryHeroCache;
use blog_resolver::hero::storage::StorageClient;
use blog_resolver::hero::HeroResolver;
use blog_resolver::resolver::ContentResolver;
use blog_resolver::settings::Settings;

#[derive(Parser)]
#[command(name = "blog_resolver", about = "Resolve and normalize blog posts from the content database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create both post schemas if missing
    Init,
    /// Resolve a post and print its rendering model as JSON
    Resolve {
        /// Post slug, or a full route path like /blog/my-post/
        slug: String,
        /// Route category (e.g. "blog")
        #[arg(short, long)]
        category: Option<String>,
        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Print a post's table of contents
    Toc {
        slug: String,
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Look for a hero image in storage by slug
    ProbeHero {
        slug: String,
        /// Alt text for a found image
        #[arg(short, long, default_value = "")]
        title: String,
    },
    /// Normalize every stored post and report the ones without usable content
    Audit {
        /// Max rows per schema
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Init => {
            let conn = db::connect(&settings.database_path, settings.db_timeout())?;
            db::init_schema(&conn)?;
            println!("Schema ready in {}", settings.database_path);
            Ok(())
        }
        Commands::Resolve {
            slug,
            category,
            compact,
        } => {
            let resolver = build_resolver(&settings)?;
            match resolver.resolve(category.as_deref(), &slug).await {
                Some(view) => {
                    let json = if compact {
                        serde_json::to_string(&view)?
                    } else {
                        serde_json::to_string_pretty(&view)?
                    };
                    println!("{}", json);
                }
                None => println!("Not found: {}", slug),
            }
            Ok(())
        }
        Commands::Toc { slug, category } => {
            let resolver = build_resolver(&settings)?;
            let Some(view) = resolver.resolve(category.as_deref(), &slug).await else {
                println!("Not found: {}", slug);
                return Ok(());
            };
            println!("{}", view.post.title);
            if let Some(label) = &view.date_label {
                println!("{}", label);
            }
            if view.toc.is_empty() {
                println!("(no headings)");
            }
            for item in &view.toc {
                let indent = if item.level == 3 { "    " } else { "  " };
                println!("{}{}  #{}", indent, item.text, item.id);
            }
            Ok(())
        }
        Commands::ProbeHero { slug, title } => {
            let heroes = build_heroes(&settings)?;
            match heroes.resolve(None, &slug, &title).await {
                Some(hero) => println!("{}", hero.src),
                None => println!("No hero for {}", slug),
            }
            Ok(())
        }
        Commands::Audit { limit } => {
            let conn = db::connect(&settings.database_path, settings.db_timeout())?;
            let (primary, secondary) = db::fetch_all(&conn, &settings.tenant_id, limit)?;
            if primary.is_empty() && secondary.is_empty() {
                println!("No posts found. Run 'init' and load content first.");
                return Ok(());
            }
            println!(
                "Auditing {} primary + {} secondary posts...",
                primary.len(),
                secondary.len()
            );
            let rows = audit_posts(&primary, &secondary)?;
            print_audit(&rows);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_heroes(settings: &Settings) -> anyhow::Result<HeroResolver<StorageClient>> {
    let http = reqwest::Client::builder()
        .timeout(settings.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let store = settings.storage_base().map(|base| {
        StorageClient::new(http, base, &settings.hero_bucket, settings.storage_key())
    });
    if store.is_none() {
        tracing::info!("BLOG_STORAGE_BASE_URL not set, hero probing disabled");
    }
    let cache = Arc::new(MemoryHeroCache::new(settings.hero_cache_ttl()));
    Ok(HeroResolver::new(store, cache))
}

fn build_resolver(settings: &Settings) -> anyhow::Result<ContentResolver<StorageClient>> {
    let conn = db::connect(&settings.database_path, settings.db_timeout())
        .with_context(|| format!("Failed to open {}", settings.database_path))?;
    Ok(ContentResolver::new(
        conn,
        &settings.tenant_id,
        build_heroes(settings)?,
    ))
}

// ── Audit ──

struct AuditRow {
    source: PostSource,
    id: String,
    label: String,
    sections: usize,
    images: usize,
    words: usize,
    /// Nothing extractable; readers get the placeholder.
    empty: bool,
}

fn audit_record(source: PostSource, record: &PostRecord) -> AuditRow {
    let body = db::parse_body(record.body.as_deref());
    let label = record
        .path
        .clone()
        .or_else(|| record.slug.clone())
        .unwrap_or_else(|| record.id.clone());
    let sections = parse_sections(&body).unwrap_or_default();
    AuditRow {
        source,
        id: record.id.clone(),
        label,
        sections: sections.len(),
        images: sections
            .iter()
            .filter(|s| matches!(s, Section::Image { .. }))
            .count(),
        words: word_count(&sections),
        empty: sections.is_empty(),
    }
}

fn audit_posts(primary: &[PostRecord], secondary: &[PostRecord]) -> anyhow::Result<Vec<AuditRow>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let work: Vec<(PostSource, &PostRecord)> = primary
        .iter()
        .map(|r| (PostSource::Primary, r))
        .chain(secondary.iter().map(|r| (PostSource::Secondary, r)))
        .collect();

    let pb = ProgressBar::new(work.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut rows = Vec::with_capacity(work.len());
    for chunk in work.chunks(500) {
        let results: Vec<AuditRow> = chunk
            .par_iter()
            .map(|(source, record)| audit_record(*source, record))
            .collect();
        rows.extend(results);
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(rows)
}

fn print_audit(rows: &[AuditRow]) {
    let empty: Vec<&AuditRow> = rows.iter().filter(|r| r.empty).collect();
    if !empty.is_empty() {
        println!(
            "{:<9} | {:<12} | {:<40}",
            "Schema", "Id", "Path"
        );
        println!("{}", "-".repeat(67));
        for r in &empty {
            println!(
                "{:<9} | {:<12} | {:<40}",
                r.source.as_str(),
                truncate(&r.id, 12),
                truncate(&r.label, 40)
            );
        }
        println!();
    }

    let sections: usize = rows.iter().map(|r| r.sections).sum();
    let images: usize = rows.iter().map(|r| r.images).sum();
    let words: usize = rows.iter().map(|r| r.words).sum();
    println!(
        "{} posts | {} without content | {} sections ({} images) | {} words",
        rows.len(),
        empty.len(),
        sections,
        images,
        words
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, body: Option<&str>) -> PostRecord {
        PostRecord {
            id: id.to_string(),
            slug: Some(format!("{}-slug", id)),
            body: body.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn audit_flags_empty_bodies() {
        let primary = vec![
            record("a", Some(r#"{"sections":[{"type":"image","url":"x.jpg"},{"type":"richText","html":"<p>one two</p>"}]}"#)),
            record("b", Some("{}")),
        ];
        let secondary = vec![record("c", Some("not json"))];
        let rows = audit_posts(&primary, &secondary).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].sections, 2);
        assert_eq!(rows[0].images, 1);
        assert_eq!(rows[0].words, 2);
        assert!(!rows[0].empty);
        assert!(rows[1].empty);
        assert!(rows[2].empty);
        assert_eq!(rows[2].source, PostSource::Secondary);
        assert_eq!(rows[2].label, "c-slug");
    }

    #[test]
    fn truncate_marks_cut() {
        assert_eq!(truncate("reef", 10), "reef");
        assert_eq!(truncate("night-dive-guide", 5), "night...");
    }
}
