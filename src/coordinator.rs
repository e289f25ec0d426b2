//! Client-side front door to the news proxy.
//!
//! Every headline request goes through three gates in order: an in-flight
//! map (identical concurrent requests share one network call), the TTL cache,
//! and finally the network. The in-flight map is keyed per request, so fetches
//! for unrelated categories never wait on each other.
//!
//! Network calls run on spawned tasks. Once issued they finish even if every
//! caller has gone away, and their results still land in the cache.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, error, info};

use crate::article::{normalize_articles, ApiResponse, HeadlinesPage, NormalizedArticle};
use crate::cache::TtlCache;
use crate::config::CoordinatorConfig;
use crate::error::FetchError;

pub const LATEST: &str = "latest";
pub const TRENDING_KEY: &str = "trending";

type Flight = Shared<BoxFuture<'static, Option<Arc<HeadlinesPage>>>>;

/// What the coordinator keeps in its TTL cache.
#[derive(Debug, Clone)]
pub enum CachedNews {
    Headlines(Arc<HeadlinesPage>),
    Trending(Arc<Vec<NormalizedArticle>>),
}

/// The listing a pagination token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorScope {
    Category(String),
    Search(String),
}

impl fmt::Display for CursorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorScope::Category(category) => write!(f, "category '{}'", category),
            CursorScope::Search(query) => write!(f, "search '{}'", query),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationCursor {
    pub scope: Option<CursorScope>,
    /// Upstream token for page `page + 1`
    pub next_page: Option<String>,
    pub page: u32,
    /// Token for every page of `scope` reached so far, by page number
    pub tokens: BTreeMap<u32, String>,
}

/// In-flight map key. Headline and search flights live in separate
/// namespaces, whatever their category or query text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Headlines(String),
    Search { query: String, page: u32 },
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlightKey::Headlines(key) => f.write_str(key),
            FlightKey::Search { query, page } => write!(f, "search '{}' page {}", query, page),
        }
    }
}

/// Identifies the caller's current selection. Issuing a new one through
/// [`FetchCoordinator::select`] supersedes every older token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionToken(u64);

#[derive(Debug, Clone)]
pub struct HeadlinesRequest {
    pub category: Option<String>,
    pub page: u32,
    pub force_fetch: bool,
    pub selection: Option<SelectionToken>,
}

impl Default for HeadlinesRequest {
    fn default() -> Self {
        Self {
            category: None,
            page: 1,
            force_fetch: false,
            selection: None,
        }
    }
}

impl HeadlinesRequest {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..Self::default()
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn force_fetch(mut self) -> Self {
        self.force_fetch = true;
        self
    }

    pub fn with_selection(mut self, selection: SelectionToken) -> Self {
        self.selection = Some(selection);
        self
    }

    /// The category to fetch. Absent and empty both mean `latest`.
    pub fn resolved_category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|category| !category.is_empty())
            .unwrap_or(LATEST)
    }

    /// `<category>_page<N>`, with `latest` standing in for no category.
    pub fn cache_key(&self) -> String {
        format!("{}_page{}", self.resolved_category(), self.page)
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub page: u32,
    pub selection: Option<SelectionToken>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            selection: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_selection(mut self, selection: SelectionToken) -> Self {
        self.selection = Some(selection);
        self
    }

    fn flight_key(&self) -> FlightKey {
        FlightKey::Search {
            query: self.query.clone(),
            page: self.page,
        }
    }
}

#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    placeholder_image: String,
    cache: Arc<TtlCache<CachedNews>>,
    in_flight: DashMap<FlightKey, Flight>,
    cursor: Mutex<PaginationCursor>,
    generation: AtomicU64,
}

impl FetchCoordinator {
    pub fn new(
        config: &CoordinatorConfig,
        cache: Arc<TtlCache<CachedNews>>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent("Newsdesk/1.0")
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_string(),
                placeholder_image: config.placeholder_image.clone(),
                cache,
                in_flight: DashMap::new(),
                cursor: Mutex::new(PaginationCursor::default()),
                generation: AtomicU64::new(0),
            }),
        })
    }

    pub fn cache(&self) -> &Arc<TtlCache<CachedNews>> {
        &self.inner.cache
    }

    pub fn cursor(&self) -> PaginationCursor {
        self.inner.lock_cursor().clone()
    }

    /// Number of requests currently on the wire.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Start a new selection, superseding all earlier tokens.
    pub fn select(&self) -> SelectionToken {
        SelectionToken(self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, selection: SelectionToken) -> bool {
        self.inner.is_current(Some(selection))
    }

    /// Fetch one page of headlines for a category (or the latest news).
    ///
    /// Returns `None` on any failure, and when the request's selection was
    /// superseded before the result arrived. Callers keep what they already
    /// show in that case.
    pub async fn fetch_headlines(&self, request: HeadlinesRequest) -> Option<Arc<HeadlinesPage>> {
        let key = request.cache_key();
        let flight_key = FlightKey::Headlines(key.clone());
        let scope = CursorScope::Category(request.resolved_category().to_string());
        let (page_number, selection) = (request.page, request.selection);

        let pending = self
            .inner
            .in_flight
            .get(&flight_key)
            .map(|flight| flight.clone());
        let page = if let Some(flight) = pending {
            debug!("Joining in-flight request for {}", key);
            flight.await
        } else if let Some(page) = self
            .inner
            .cached_page(&key)
            .filter(|_| !request.force_fetch)
        {
            debug!("Using cached data for {}", key);
            Some(page)
        } else {
            let inner = Arc::clone(&self.inner);
            let recheck = (!request.force_fetch).then(|| key.clone());
            self.single_flight(flight_key, recheck.as_deref(), async move {
                inner
                    .load_headlines(&key, request)
                    .await
                    .map_err(|e| error!("Error fetching news for {}: {}", key, e))
                    .ok()
            })
            .await
        };

        if let Some(page) = &page {
            self.inner.advance_cursor(scope, page_number, page, selection);
        }
        self.deliver(page, selection)
    }

    /// Search headlines. Results are never cached, but identical concurrent
    /// searches still share one request.
    pub async fn search_headlines(&self, request: SearchRequest) -> Option<Arc<HeadlinesPage>> {
        if request.query.trim().is_empty() {
            debug!("Ignoring empty search");
            return None;
        }

        let inner = Arc::clone(&self.inner);
        let scope = CursorScope::Search(request.query.clone());
        let (page_number, selection) = (request.page, request.selection);
        let key = request.flight_key();
        let page = self
            .single_flight(key, None, async move {
                let query = request.query.clone();
                inner
                    .search(request)
                    .await
                    .map_err(|e| error!("Error searching news for '{}': {}", query, e))
                    .ok()
            })
            .await;

        if let Some(page) = &page {
            self.inner.advance_cursor(scope, page_number, page, selection);
        }
        self.deliver(page, selection)
    }

    /// Trending articles, served from the long-lived cache tier when fresh.
    ///
    /// Not deduplicated: trending is requested rarely enough that concurrent
    /// calls may each go to the network.
    pub async fn fetch_trending(&self) -> Option<Arc<Vec<NormalizedArticle>>> {
        if let Some(CachedNews::Trending(articles)) = self.inner.cache.get(TRENDING_KEY) {
            debug!("Using cached trending articles");
            return Some(articles);
        }

        match self.inner.trending().await {
            Ok(articles) => Some(articles),
            Err(e) => {
                error!("Error fetching trending: {}", e);
                None
            }
        }
    }

    /// Continue whatever listing the cursor points at.
    pub async fn load_more(&self, selection: Option<SelectionToken>) -> Option<Arc<HeadlinesPage>> {
        let cursor = self.cursor();
        let (Some(scope), Some(_)) = (cursor.scope, cursor.next_page) else {
            debug!("Nothing more to load");
            return None;
        };
        let page = cursor.page + 1;

        match scope {
            CursorScope::Category(category) => {
                self.fetch_headlines(HeadlinesRequest {
                    category: Some(category),
                    page,
                    force_fetch: false,
                    selection,
                })
                .await
            }
            CursorScope::Search(query) => {
                self.search_headlines(SearchRequest {
                    query,
                    page,
                    selection,
                })
                .await
            }
        }
    }

    /// Join the flight for `key`, or start one running `work`.
    ///
    /// With `cached` set, the cache is consulted again while the key is held,
    /// since a flight may have landed there after the caller's own lookup.
    async fn single_flight<F>(
        &self,
        key: FlightKey,
        cached: Option<&str>,
        work: F,
    ) -> Option<Arc<HeadlinesPage>>
    where
        F: Future<Output = Option<Arc<HeadlinesPage>>> + Send + 'static,
    {
        let flight = match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight request for {}", key);
                entry.get().clone()
            }
            Entry::Vacant(slot) => {
                let landed = cached.and_then(|cache_key| self.inner.cached_page(cache_key));
                if let Some(page) = landed {
                    debug!("Using cached data for {}", key);
                    return Some(page);
                }
                let inner = Arc::clone(&self.inner);
                let task = tokio::spawn(async move {
                    let result = work.await;
                    // Leave the map before any waiter sees the result.
                    inner.in_flight.remove(&key);
                    result
                });
                let flight = task
                    .map(|joined| {
                        joined.unwrap_or_else(|e| {
                            error!("Request task failed: {}", e);
                            None
                        })
                    })
                    .boxed()
                    .shared();
                slot.insert(flight.clone());
                flight
            }
        };
        flight.await
    }

    fn deliver(
        &self,
        page: Option<Arc<HeadlinesPage>>,
        selection: Option<SelectionToken>,
    ) -> Option<Arc<HeadlinesPage>> {
        if page.is_some() && !self.inner.is_current(selection) {
            debug!("Discarding result for a superseded selection");
            return None;
        }
        page
    }
}

impl Inner {
    fn lock_cursor(&self) -> MutexGuard<'_, PaginationCursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, selection: Option<SelectionToken>) -> bool {
        selection.map_or(true, |SelectionToken(generation)| {
            self.generation.load(Ordering::SeqCst) == generation
        })
    }

    fn cached_page(&self, key: &str) -> Option<Arc<HeadlinesPage>> {
        match self.cache.get(key) {
            Some(CachedNews::Headlines(page)) => Some(page),
            _ => None,
        }
    }

    /// Token to send for `page` of `scope`. Page one never needs one.
    fn page_token(&self, scope: &CursorScope, page: u32) -> Result<Option<String>, FetchError> {
        if page <= 1 {
            return Ok(None);
        }
        let cursor = self.lock_cursor();
        let token = match cursor.scope.as_ref() {
            Some(current) if current == scope => cursor.tokens.get(&page).cloned(),
            _ => None,
        };
        token.map(Some).ok_or_else(|| FetchError::NoCursor {
            scope: scope.to_string(),
            page,
        })
    }

    fn advance_cursor(
        &self,
        scope: CursorScope,
        page: u32,
        result: &HeadlinesPage,
        selection: Option<SelectionToken>,
    ) {
        if !self.is_current(selection) {
            debug!("Selection superseded, leaving cursor at its current position");
            return;
        }
        let mut cursor = self.lock_cursor();
        if cursor.scope.as_ref() != Some(&scope) {
            cursor.tokens.clear();
        }
        if let Some(token) = &result.token {
            cursor.tokens.insert(page, token.clone());
        }
        if let Some(token) = &result.next_page {
            cursor.tokens.insert(page + 1, token.clone());
        }
        cursor.scope = Some(scope);
        cursor.next_page = result.next_page.clone();
        cursor.page = page;
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<ApiResponse, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        info!("Fetching from: {} {:?}", url, params);

        let response = self
            .client
            .get(&url)
            .query(params)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Error payloads ride on non-2xx responses; keep their message.
        match serde_json::from_slice::<ApiResponse>(&body) {
            Ok(payload) if status.is_success() || payload.error.is_some() => Ok(payload),
            Ok(_) => Err(FetchError::Http(status)),
            Err(_) if !status.is_success() => Err(FetchError::Http(status)),
            Err(e) => Err(e.into()),
        }
    }

    async fn load_headlines(
        &self,
        key: &str,
        request: HeadlinesRequest,
    ) -> Result<Arc<HeadlinesPage>, FetchError> {
        let category = request.resolved_category().to_string();
        let scope = CursorScope::Category(category.clone());

        let mut params = Vec::new();
        if category != LATEST {
            params.push(("category", category.clone()));
        }
        let token = self.page_token(&scope, request.page)?;
        if let Some(token) = &token {
            params.push(("page", token.clone()));
        }

        let response = self.get_json("/api/news", &params).await?;
        let page = Arc::new(HeadlinesPage {
            token,
            ..HeadlinesPage::from_response(response, &self.placeholder_image)?
        });

        self.advance_cursor(scope, request.page, &page, request.selection);
        self.cache.set(
            key,
            CachedNews::Headlines(Arc::clone(&page)),
            category == LATEST,
        );
        Ok(page)
    }

    async fn search(&self, request: SearchRequest) -> Result<Arc<HeadlinesPage>, FetchError> {
        let scope = CursorScope::Search(request.query.clone());

        let mut params = vec![("q", request.query.clone())];
        let token = self.page_token(&scope, request.page)?;
        if let Some(token) = &token {
            params.push(("page", token.clone()));
        }

        let response = self.get_json("/api/news/search", &params).await?;
        let page = Arc::new(HeadlinesPage {
            token,
            ..HeadlinesPage::from_response(response, &self.placeholder_image)?
        });

        self.advance_cursor(scope, request.page, &page, request.selection);
        Ok(page)
    }

    async fn trending(&self) -> Result<Arc<Vec<NormalizedArticle>>, FetchError> {
        let response = self.get_json("/api/news/trending", &[]).await?.into_success()?;
        let results = response.results.ok_or(FetchError::MissingField("results"))?;

        let articles = Arc::new(normalize_articles(results, &self.placeholder_image));
        self.cache
            .set(TRENDING_KEY, CachedNews::Trending(Arc::clone(&articles)), true);
        Ok(articles)
    }
}
