//! The signed-in identity of one browser.
//!
//! Every change of identity bumps a generation counter. Consumers that hold
//! privilege-dependent state (grant list views, cached listings) compare
//! generations and start over when theirs is older instead of patching it.

use crate::models::Session;
use crate::services::browser::{BrowserStorage, Navigation};
use crate::services::grant_cache::GrantListCache;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub const SESSION_KEY: &str = "session";
pub const LOGIN_PATH: &str = "/login";

pub struct SessionStore {
    current: RwLock<Option<Session>>,
    generation: AtomicU64,
    cache: Arc<GrantListCache>,
}

impl SessionStore {
    pub fn new(cache: Arc<GrantListCache>) -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            cache,
        }
    }

    /// The current session, if any and not yet expired.
    pub fn current(&self) -> Option<Session> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|s| !s.is_expired_at(Utc::now()))
            .cloned()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the current session. Cached listings computed for the previous
    /// identity are dropped.
    pub fn establish(&self, session: Session) -> u64 {
        tracing::info!(
            user_id = %session.user_id,
            org_id = %session.organization_id,
            "Session established"
        );
        self.replace(Some(session))
    }

    /// Log out and send the browser to the login page.
    pub fn clear(&self) -> Navigation {
        self.replace(None);
        tracing::info!("Session cleared");
        Navigation::to(LOGIN_PATH)
    }

    fn replace(&self, session: Option<Session>) -> u64 {
        {
            let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
            *guard = session;
        }
        self.cache.invalidate_all();
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn persist(&self, storage: &dyn BrowserStorage) -> Result<(), serde_json::Error> {
        match self.current() {
            Some(session) => storage.set(SESSION_KEY, serde_json::to_string(&session)?),
            None => storage.remove(SESSION_KEY),
        }
        Ok(())
    }

    /// Load a session saved by `persist`. Unreadable or expired entries are
    /// discarded.
    pub fn restore(&self, storage: &dyn BrowserStorage) -> Option<Session> {
        let raw = storage.get(SESSION_KEY)?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) if !session.is_expired_at(Utc::now()) => {
                self.establish(session.clone());
                Some(session)
            }
            Ok(_) => {
                storage.remove(SESSION_KEY);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable stored session");
                storage.remove(SESSION_KEY);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grant, GrantFilter, NewGrant, OrgId, Page, Subject, UserId};
    use crate::services::browser::MemoryStorage;
    use chrono::Duration;

    fn session(minutes: i64) -> Session {
        Session {
            user_id: UserId::new(),
            organization_id: OrgId::new(),
            expires_at: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_establish_drops_cached_listings() {
        let cache = Arc::new(GrantListCache::new());
        let store = SessionStore::new(cache.clone());
        let org = OrgId::new();
        let grant = Grant::new(
            org,
            NewGrant::new(Subject::User(UserId::new()), "infra", "admin"),
            None,
        );
        let epoch = cache.epoch(org);
        cache.put(org, GrantFilter::default(), Page::paginate(vec![grant], 1, 100), 0, epoch);

        let generation = store.establish(session(60));
        assert_eq!(generation, 1);
        assert!(cache.is_empty());
        assert!(store.current().is_some());
    }

    #[test]
    fn test_clear_bumps_generation_and_navigates_to_login() {
        let store = SessionStore::new(Arc::new(GrantListCache::new()));
        store.establish(session(60));
        let before = store.generation();

        let nav = store.clear();
        assert_eq!(nav.location, "/login");
        assert!(store.current().is_none());
        assert!(store.generation() > before);
    }

    #[test]
    fn test_expired_session_is_not_current() {
        let store = SessionStore::new(Arc::new(GrantListCache::new()));
        store.establish(session(-1));
        assert!(store.current().is_none());
    }

    #[test]
    fn test_persist_and_restore() {
        let storage = MemoryStorage::new();
        let store = SessionStore::new(Arc::new(GrantListCache::new()));
        let original = session(60);
        store.establish(original.clone());
        store.persist(&storage).unwrap();

        let reloaded = SessionStore::new(Arc::new(GrantListCache::new()));
        assert_eq!(reloaded.restore(&storage), Some(original));

        storage.set(SESSION_KEY, "{not json".into());
        assert!(reloaded.restore(&storage).is_none());
        assert!(storage.get(SESSION_KEY).is_none());
    }
}
