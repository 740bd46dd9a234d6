use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::content::HeroImage;

/// Memo of hero lookups keyed by slug. `Some(None)` from `get` means the slug
/// was probed and has no hero; `None` means it was never looked up.
pub trait HeroCache: Send + Sync {
    fn get(&self, slug: &str) -> Option<Option<HeroImage>>;
    fn set(&self, slug: &str, hero: Option<HeroImage>);
}

struct Entry {
    hero: Option<HeroImage>,
    stored_at: Instant,
}

/// In-process cache. Live entries are never overwritten; with a TTL,
/// expired entries behave as if they were never written.
#[derive(Default)]
pub struct MemoryHeroCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Option<Duration>,
}

impl MemoryHeroCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A panic mid-insert cannot leave a half-written entry, so poison is ignorable.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_live(&self, entry: &Entry) -> bool {
        self.ttl.map_or(true, |ttl| entry.stored_at.elapsed() < ttl)
    }
}

impl HeroCache for MemoryHeroCache {
    fn get(&self, slug: &str) -> Option<Option<HeroImage>> {
        let mut entries = self.lock();
        match entries.get(slug) {
            Some(entry) if self.is_live(entry) => Some(entry.hero.clone()),
            Some(_) => {
                entries.remove(slug);
                None
            }
            None => None,
        }
    }

    fn set(&self, slug: &str, hero: Option<HeroImage>) {
        let mut entries = self.lock();
        if entries.get(slug).is_some_and(|e| self.is_live(e)) {
            return;
        }
        entries.insert(
            slug.to_string(),
            Entry {
                hero,
                stored_at: Instant::now(),
            },
        );
    }
}
