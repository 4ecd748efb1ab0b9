//! Cursor-paginated result cache.
//!
//! Each key owns one [`PaginatedCollection`]. Keys never share an entry;
//! the map lock is only held between awaits, never across a fetch. Within
//! a key at most one page request is in flight, and every request is
//! tagged with the entry generation and cursor it was issued for, so a
//! reply that arrives after `invalidate`/`release` is dropped.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Where a newly fetched page lands relative to what is already loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDirection {
    /// Feed order: newest first, later pages go to the bottom.
    Append,
    /// Thread order: later pages are older and go on top.
    Prepend,
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Item: Clone + Send + Sync + 'static;

    fn direction(&self) -> MergeDirection;

    async fn fetch_page(
        &self,
        key: &Self::Key,
        cursor: Option<&str>,
    ) -> Result<Page<Self::Item>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct PaginatedCollection<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub is_fetching_more: bool,
    pub status: FetchStatus,
    pub error: Option<String>,
}

impl<T> PaginatedCollection<T> {
    fn pending() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            is_fetching_more: false,
            status: FetchStatus::Pending,
            error: None,
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.next_cursor.is_some()
    }
}

struct Entry<T> {
    collection: PaginatedCollection<T>,
    generation: u64,
    in_flight: bool,
    first_loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Load {
    First,
    Next,
}

struct Ticket {
    load: Load,
    generation: u64,
    cursor: Option<String>,
}

/// Runs its cleanup when a request future is dropped before its reply is
/// applied, so an abandoned fetch never leaves an entry marked in flight.
struct InFlight<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> InFlight<F> {
    fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    fn disarm(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for InFlight<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

pub struct PaginatedCache<S: PageSource> {
    source: S,
    entries: Mutex<HashMap<S::Key, Entry<S::Item>>>,
    generations: AtomicU64,
}

impl<S: PageSource> PaginatedCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn snapshot(&self, key: &S::Key) -> Option<PaginatedCollection<S::Item>> {
        self.entries.lock().get(key).map(|e| e.collection.clone())
    }

    /// Cached collection for `key`. The first access, or the first access
    /// after a failed first page, fetches page one.
    pub async fn get_or_create(&self, key: &S::Key) -> PaginatedCollection<S::Item> {
        let ticket = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
                collection: PaginatedCollection::pending(),
                generation: self.generations.fetch_add(1, Ordering::Relaxed),
                in_flight: false,
                first_loaded: false,
            });
            if entry.in_flight || entry.first_loaded {
                return entry.collection.clone();
            }
            entry.in_flight = true;
            entry.collection.status = FetchStatus::Pending;
            Ticket {
                load: Load::First,
                generation: entry.generation,
                cursor: None,
            }
        };
        self.run(key, ticket).await
    }

    /// Fetch the page after the current cursor. No-op (returns the current
    /// snapshot) when there is no next page, the first page never loaded,
    /// or a fetch for this key is already running. `None` for unknown keys.
    pub async fn fetch_next(&self, key: &S::Key) -> Option<PaginatedCollection<S::Item>> {
        let ticket = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(key)?;
            let cursor = match &entry.collection.next_cursor {
                Some(c) if !entry.in_flight && entry.first_loaded => c.clone(),
                _ => {
                    debug!(?key, "fetch_next skipped");
                    return Some(entry.collection.clone());
                }
            };
            entry.in_flight = true;
            entry.collection.is_fetching_more = true;
            Ticket {
                load: Load::Next,
                generation: entry.generation,
                cursor: Some(cursor),
            }
        };
        Some(self.run(key, ticket).await)
    }

    /// Drop the cached collection; the next `get_or_create` starts over.
    pub fn invalidate(&self, key: &S::Key) {
        if self.entries.lock().remove(key).is_some() {
            debug!(?key, "invalidated");
        }
    }

    /// Pull-to-refresh.
    pub async fn refresh(&self, key: &S::Key) -> PaginatedCollection<S::Item> {
        self.invalidate(key);
        self.get_or_create(key).await
    }

    /// Forget a key nobody is looking at any more. A request still in
    /// flight for it will have its result discarded.
    pub fn release(&self, key: &S::Key) {
        if self.entries.lock().remove(key).is_some() {
            debug!(?key, "released");
        }
    }

    async fn run(&self, key: &S::Key, ticket: Ticket) -> PaginatedCollection<S::Item> {
        debug!(?key, load = ?ticket.load, cursor = ?ticket.cursor, "fetching page");
        let generation = ticket.generation;
        let guard = InFlight::new(|| {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) {
                debug!(?key, "page request abandoned");
                entry.in_flight = false;
                entry.collection.is_fetching_more = false;
            }
        });
        let result = self
            .source
            .fetch_page(key, ticket.cursor.as_deref())
            .await;
        guard.disarm();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            debug!(?key, "dropping page for released key");
            return PaginatedCollection::pending();
        };
        let stale = entry.generation != ticket.generation
            || (ticket.load == Load::Next && entry.collection.next_cursor != ticket.cursor);
        if stale {
            debug!(?key, "dropping stale page");
            return entry.collection.clone();
        }

        entry.in_flight = false;
        let collection = &mut entry.collection;
        collection.is_fetching_more = false;

        match result {
            Ok(page) => {
                match (ticket.load, self.source.direction()) {
                    (Load::First, _) => collection.items = page.items,
                    (Load::Next, MergeDirection::Append) => collection.items.extend(page.items),
                    (Load::Next, MergeDirection::Prepend) => {
                        let older = std::mem::take(&mut collection.items);
                        collection.items = page.items;
                        collection.items.extend(older);
                    }
                }
                collection.next_cursor = page.next_cursor;
                collection.status = FetchStatus::Success;
                collection.error = None;
                entry.first_loaded = true;
            }
            Err(e) => {
                warn!(?key, error = %e, "page fetch failed");
                collection.status = FetchStatus::Error;
                collection.error = Some(e.user_message());
            }
        }

        entry.collection.clone()
    }
}

#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Record: Clone + Send + Sync + 'static;

    async fn fetch(&self, key: &Self::Key) -> Result<Self::Record, ApiError>;
}

#[derive(Debug, Clone)]
pub struct RecordState<T> {
    pub value: Option<T>,
    pub status: FetchStatus,
    pub error: Option<String>,
}

struct RecordEntry<T> {
    state: RecordState<T>,
    generation: u64,
    in_flight: bool,
}

/// Cache for single-record queries such as a post detail.
pub struct RecordCache<S: RecordSource> {
    source: S,
    entries: Mutex<HashMap<S::Key, RecordEntry<S::Record>>>,
    generations: AtomicU64,
}

impl<S: RecordSource> RecordCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self, key: &S::Key) -> Option<RecordState<S::Record>> {
        self.entries.lock().get(key).map(|e| e.state.clone())
    }

    pub async fn get_or_fetch(&self, key: &S::Key) -> RecordState<S::Record> {
        let generation = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(key.clone()).or_insert_with(|| RecordEntry {
                state: RecordState {
                    value: None,
                    status: FetchStatus::Pending,
                    error: None,
                },
                generation: self.generations.fetch_add(1, Ordering::Relaxed),
                in_flight: false,
            });
            if entry.in_flight || entry.state.status == FetchStatus::Success {
                return entry.state.clone();
            }
            entry.in_flight = true;
            entry.generation
        };

        let guard = InFlight::new(|| {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) {
                debug!(?key, "record request abandoned");
                entry.in_flight = false;
            }
        });
        let result = self.source.fetch(key).await;
        guard.disarm();

        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key).filter(|e| e.generation == generation) else {
            debug!(?key, "dropping stale record");
            return RecordState {
                value: None,
                status: FetchStatus::Pending,
                error: None,
            };
        };
        entry.in_flight = false;
        match result {
            Ok(record) => {
                entry.state = RecordState {
                    value: Some(record),
                    status: FetchStatus::Success,
                    error: None,
                };
            }
            Err(e) => {
                warn!(?key, error = %e, "record fetch failed");
                entry.state.status = FetchStatus::Error;
                entry.state.error = Some(e.user_message());
            }
        }
        entry.state.clone()
    }

    pub fn invalidate(&self, key: &S::Key) {
        self.entries.lock().remove(key);
    }
}
