//! Cached grant listings and the consumer-side view of one listing.
//!
//! Cache entries are keyed by organization and normalized filter. A mutation
//! drops every entry whose filter could include the changed row; a session
//! change drops everything.

use crate::models::{Grant, GrantFilter, OrgId, Page};
use crate::services::error::ServiceError;
use crate::services::repository::GrantRepository;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ENTRIES: usize = 1024;
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedList {
    page: Page<Grant>,
    /// Directory membership version the page was computed against. Only
    /// meaningful for filters that expand group membership.
    membership_version: u64,
    cached_at: Instant,
}

/// Invalidation count observed before a listing was read from the store.
/// A fill carrying an older epoch than the cache holds is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEpoch {
    org: u64,
    generation: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<(OrgId, GrantFilter), CachedList>,
    epochs: HashMap<OrgId, u64>,
    generation: u64,
}

impl CacheState {
    fn epoch(&self, org_id: OrgId) -> CacheEpoch {
        CacheEpoch {
            org: self.epochs.get(&org_id).copied().unwrap_or(0),
            generation: self.generation,
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, cached)| cached.cached_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Bounded listing cache with a time-to-live per entry.
pub struct GrantListCache {
    state: Mutex<CacheState>,
    max_entries: usize,
    ttl: Duration,
}

impl Default for GrantListCache {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl GrantListCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_entries: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read before querying the store; pass to [`put`](Self::put).
    pub fn epoch(&self, org_id: OrgId) -> CacheEpoch {
        self.lock().epoch(org_id)
    }

    pub fn get(
        &self,
        org_id: OrgId,
        filter: &GrantFilter,
        membership_version: u64,
    ) -> Option<Page<Grant>> {
        let mut state = self.lock();
        let key = (org_id, filter.clone());
        let usable = {
            let entry = state.entries.get(&key)?;
            let expired = entry.cached_at.elapsed() > self.ttl;
            let outdated = filter.include_inherited_from_groups
                && entry.membership_version != membership_version;
            (!expired && !outdated).then(|| entry.page.clone())
        };
        if usable.is_none() {
            state.entries.remove(&key);
        }
        usable
    }

    /// Store a page read under `epoch`. Returns `false` and stores nothing
    /// when a mutation for the organization invalidated the cache since.
    pub fn put(
        &self,
        org_id: OrgId,
        filter: GrantFilter,
        page: Page<Grant>,
        membership_version: u64,
        epoch: CacheEpoch,
    ) -> bool {
        let mut state = self.lock();
        if state.epoch(org_id) != epoch {
            tracing::debug!(org_id = %org_id, "Discarding grant listing read before a mutation");
            return false;
        }

        let ttl = self.ttl;
        state.entries.retain(|_, cached| cached.cached_at.elapsed() <= ttl);
        let key = (org_id, filter);
        if !state.entries.contains_key(&key) && state.entries.len() >= self.max_entries {
            state.evict_oldest();
        }
        state.entries.insert(
            key,
            CachedList {
                page,
                membership_version,
                cached_at: Instant::now(),
            },
        );
        true
    }

    /// Drop every entry of `org_id` whose filter matches. Returns how many
    /// were dropped.
    pub fn invalidate(&self, org_id: OrgId, predicate: impl Fn(&GrantFilter) -> bool) -> usize {
        let mut state = self.lock();
        *state.epochs.entry(org_id).or_insert(0) += 1;
        let before = state.entries.len();
        state
            .entries
            .retain(|(org, filter), _| *org != org_id || !predicate(filter));
        before.saturating_sub(state.entries.len())
    }

    /// Drop entries that could list `grant`.
    pub fn invalidate_for(&self, grant: &Grant) -> usize {
        self.invalidate(grant.organization_id, |filter| filter.could_include(grant))
    }

    pub fn invalidate_all(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

/// Issued for each listing request a view makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken {
    seq: u64,
    generation: u64,
}

/// What a view currently shows.
#[derive(Debug, Clone, Default)]
pub struct ViewSnapshot {
    pub page: Option<Page<Grant>>,
    /// The last refresh failed; `page` is what was shown before it.
    pub stale: bool,
    pub error: Option<String>,
}

#[derive(Default)]
struct ViewState {
    snapshot: ViewSnapshot,
    applied: u64,
    generation: u64,
}

/// One rendered grant listing. Responses apply in request order: a response
/// older than the newest one already applied is dropped, and a failed
/// refresh keeps the previous rows and marks them stale.
pub struct GrantListView {
    org_id: OrgId,
    filter: GrantFilter,
    issued: AtomicU64,
    state: Mutex<ViewState>,
}

impl GrantListView {
    pub fn new(org_id: OrgId, filter: GrantFilter, generation: u64) -> Self {
        Self {
            org_id,
            filter,
            issued: AtomicU64::new(0),
            state: Mutex::new(ViewState {
                generation,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn filter(&self) -> &GrantFilter {
        &self.filter
    }

    /// Start a request under the session `generation`. A generation the view
    /// has not seen discards everything it holds.
    pub fn begin(&self, generation: u64) -> RequestToken {
        {
            let mut state = self.lock();
            if state.generation != generation {
                *state = ViewState {
                    generation,
                    ..Default::default()
                };
            }
        }
        RequestToken {
            seq: self.issued.fetch_add(1, Ordering::AcqRel) + 1,
            generation,
        }
    }

    /// Apply a response. Returns whether it changed what the view shows.
    pub fn apply(&self, token: RequestToken, result: Result<Page<Grant>, ServiceError>) -> bool {
        let mut state = self.lock();
        if token.generation != state.generation || token.seq <= state.applied {
            tracing::debug!(seq = token.seq, applied = state.applied, "Dropping out-of-date grant listing");
            return false;
        }
        state.applied = token.seq;

        match result {
            Ok(page) => {
                state.snapshot = ViewSnapshot {
                    page: Some(page),
                    stale: false,
                    error: None,
                };
            }
            Err(err) => {
                tracing::warn!(error = %err, "Grant listing failed, keeping previous rows");
                state.snapshot.stale = true;
                state.snapshot.error = Some(err.to_string());
            }
        }
        true
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.lock().snapshot.clone()
    }

    pub async fn refresh(&self, repository: &GrantRepository, generation: u64) -> ViewSnapshot {
        let token = self.begin(generation);
        let result = repository.list(self.org_id, self.filter.clone()).await;
        self.apply(token, result);
        self.snapshot()
    }
}
