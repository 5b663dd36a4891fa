//! Deduplicating catalog fetcher with a stale-response guard.
//!
//! Every call to [`CatalogFetcher::fetch`] marks its query as the latest one.
//! A response is only applied to the observable state when its query is still
//! the latest when it arrives; older responses are discarded. A query already
//! in flight is not requested a second time. Observers are notified one page
//! at a time, and only for a page whose query is still the latest.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packdeck_core::{
    CatalogPage, CatalogProvider, CatalogQuery, CatalogResult, PageObserver, QueryKey,
    SortOption, error_chain,
};
use packdeck_events::{Event, EventBus};
use packdeck_telemetry::{FetchOutcomeLabel, Metrics};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, warn};

/// Observable state of the catalog view.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogState {
    /// A request for the latest query is outstanding.
    Loading,
    /// The latest query resolved to this page.
    Ready(Arc<CatalogPage>),
    /// The latest query failed with this message.
    Error(String),
}

impl CatalogState {
    /// Page currently on display, if any.
    #[must_use]
    pub fn page(&self) -> Option<&Arc<CatalogPage>> {
        match self {
            Self::Ready(page) => Some(page),
            Self::Loading | Self::Error(_) => None,
        }
    }
}

/// Result of a single [`CatalogFetcher::fetch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The page was accepted and published.
    Ready(Arc<CatalogPage>),
    /// The same query was already outstanding; no request was sent.
    AlreadyInFlight,
    /// A newer query was issued before this response arrived.
    Superseded,
}

#[derive(Default)]
struct Tracker {
    latest: Option<QueryKey>,
    in_flight: HashSet<QueryKey>,
}

/// Fetches catalog pages and exposes the latest one through a watch channel.
pub struct CatalogFetcher {
    provider: Arc<dyn CatalogProvider>,
    observer: Option<Arc<dyn PageObserver>>,
    events: EventBus,
    metrics: Metrics,
    state: watch::Sender<CatalogState>,
    tracker: Mutex<Tracker>,
    notify: AsyncMutex<()>,
}

impl CatalogFetcher {
    /// Fetcher backed by `provider`, reporting lifecycle events on `events`.
    #[must_use]
    pub fn new(provider: Arc<dyn CatalogProvider>, events: EventBus, metrics: Metrics) -> Self {
        let (state, _) = watch::channel(CatalogState::Loading);
        Self {
            provider,
            observer: None,
            events,
            metrics,
            state,
            tracker: Mutex::new(Tracker::default()),
            notify: AsyncMutex::new(()),
        }
    }

    /// Notify `observer` whenever a page is accepted.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn PageObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Watch the catalog state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CatalogState> {
        self.state.subscribe()
    }

    /// Snapshot of the current catalog state.
    #[must_use]
    pub fn state(&self) -> CatalogState {
        self.state.borrow().clone()
    }

    /// Sort options offered by the provider.
    #[must_use]
    pub fn sort_options(&self) -> Vec<SortOption> {
        self.provider.sort_options()
    }

    /// Fetch the page for `query`.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the latest query fails. Failures of
    /// superseded queries are discarded and reported as
    /// [`FetchOutcome::Superseded`].
    pub async fn fetch(&self, query: &CatalogQuery) -> CatalogResult<FetchOutcome> {
        let key = query.key();
        {
            let mut tracker = self.lock();
            tracker.latest = Some(key.clone());
            if !tracker.in_flight.insert(key.clone()) {
                drop(tracker);
                self.metrics.inc_catalog_fetch(FetchOutcomeLabel::Coalesced);
                debug!(query = %key, "catalog query already in flight");
                return Ok(FetchOutcome::AlreadyInFlight);
            }
            self.state.send_replace(CatalogState::Loading);
        }
        let mut in_flight = InFlight {
            tracker: &self.tracker,
            key: key.clone(),
            armed: true,
        };

        let result = self.provider.list_packs(query).await;

        // Compare and publish under the lock so a newer fetch cannot slip in
        // between the check and the state update.
        let accepted = {
            let mut tracker = self.lock();
            tracker.in_flight.remove(&key);
            in_flight.armed = false;
            if tracker.latest.as_ref() != Some(&key) {
                None
            } else {
                let result = result.map(Arc::new);
                self.state.send_replace(match &result {
                    Ok(page) => CatalogState::Ready(Arc::clone(page)),
                    Err(err) => CatalogState::Error(error_chain(err)),
                });
                Some(result)
            }
        };

        let page = match accepted {
            None => return Ok(self.superseded(&key)),
            Some(Err(err)) => {
                self.metrics.inc_catalog_fetch(FetchOutcomeLabel::Error);
                warn!(query = %key, error = %error_chain(&err), "catalog fetch failed");
                return Err(err);
            }
            Some(Ok(page)) => page,
        };

        // Held until observers return so a newer page cannot be reconciled
        // before an older one.
        let _notifying = self.notify.lock().await;
        if self.lock().latest.as_ref() != Some(&key) {
            return Ok(self.superseded(&key));
        }
        self.metrics.inc_catalog_fetch(FetchOutcomeLabel::Ready);
        let event_id = self.events.publish(Event::CatalogLoaded {
            page: page.meta.current_page,
            last_page: page.meta.last_page,
            total: page.meta.total,
            pack_ids: page.pack_ids(),
        });
        self.metrics.inc_event("catalog_loaded");
        debug!(query = %key, event_id, packs = page.data.len(), "catalog page loaded");
        if let Some(observer) = &self.observer {
            observer.page_loaded(&page).await;
        }
        Ok(FetchOutcome::Ready(page))
    }

    fn superseded(&self, key: &QueryKey) -> FetchOutcome {
        self.metrics.inc_catalog_fetch(FetchOutcomeLabel::Superseded);
        debug!(query = %key, "discarding superseded catalog response");
        FetchOutcome::Superseded
    }

    fn lock(&self) -> MutexGuard<'_, Tracker> {
        lock_tracker(&self.tracker)
    }
}

fn lock_tracker(tracker: &Mutex<Tracker>) -> MutexGuard<'_, Tracker> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight mark when the fetch future is dropped before the
/// response arrives.
struct InFlight<'a> {
    tracker: &'a Mutex<Tracker>,
    key: QueryKey,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock_tracker(self.tracker).in_flight.remove(&self.key);
        }
    }
}
