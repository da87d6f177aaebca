//! Pagination over the list and incremental-export endpoints.
//!
//! The Support API paginates three different ways (cursor links, offset
//! links, and incremental-export timestamps) and the Chat export endpoints
//! add a fourth (limit-counted batches). Each response envelope implements
//! [`PagedResponse`], which reduces every style to a single [`Continuation`]
//! the shared drive loop in [`Client::paginate`] can follow.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::Error;
use crate::transport::{Client, Endpoint};

/// What to do after consuming a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// The listing is complete.
    Done,
    /// Fetch this URL next. May be absolute (the API returns full links).
    NextUrl(String),
    /// Re-issue the original request with `start_time` replaced.
    Resume {
        /// Unix seconds to resume the export from.
        start_time: i64,
    },
}

/// A response envelope that knows how to continue its own listing.
pub trait PagedResponse: DeserializeOwned {
    /// Computes the continuation for the page.
    ///
    /// `limit` is the per-request cap for limit-counted styles; link- and
    /// timestamp-based styles ignore it.
    fn continuation(&self, limit: Option<i64>) -> Continuation;
}

/// Sort direction for endpoints that take a `sort_by`-style field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (the API default, no prefix).
    Ascending,
    /// Descending order, expressed as a `-` field prefix.
    Descending,
}

impl SortDirection {
    /// The prefix to prepend to a sort field.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Ascending => "",
            Self::Descending => "-",
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct CursorMeta {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    pub(crate) after_cursor: Option<String>,
    #[serde(default)]
    pub(crate) before_cursor: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub(crate) struct CursorLinks {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    pub(crate) prev: Option<String>,
}

/// Cursor-paginated envelope: `meta.has_more` plus a `links.next` URL.
#[derive(Debug, Deserialize)]
pub struct CursorPage<T> {
    #[serde(default)]
    pub(crate) meta: CursorMeta,
    #[serde(default)]
    pub(crate) links: CursorLinks,
    /// The endpoint-specific payload (e.g. a `tickets` array).
    #[serde(flatten)]
    pub body: T,
}

impl<T> CursorPage<T> {
    /// Cursor pointing past the last record of this page.
    pub fn after_cursor(&self) -> Option<&str> {
        self.meta.after_cursor.as_deref()
    }

    /// Cursor pointing before the first record of this page.
    pub fn before_cursor(&self) -> Option<&str> {
        self.meta.before_cursor.as_deref()
    }

    /// Link to the previous page, when the API provides one.
    pub fn prev_link(&self) -> Option<&str> {
        self.links.prev.as_deref()
    }
}

impl<T: DeserializeOwned> PagedResponse for CursorPage<T> {
    fn continuation(&self, _limit: Option<i64>) -> Continuation {
        match (self.meta.has_more, &self.links.next) {
            (true, Some(next)) if !next.is_empty() => Continuation::NextUrl(next.clone()),
            _ => Continuation::Done,
        }
    }
}

/// Offset-paginated envelope: `next_page`/`previous_page` URLs and a total
/// `count`.
#[derive(Debug, Deserialize)]
pub struct OffsetPage<T> {
    #[serde(default)]
    pub(crate) next_page: Option<String>,
    #[serde(default)]
    pub(crate) previous_page: Option<String>,
    /// Total records matching the listing, across all pages.
    #[serde(default)]
    pub count: i64,
    /// The endpoint-specific payload.
    #[serde(flatten)]
    pub body: T,
}

impl<T> OffsetPage<T> {
    /// Link to the previous page, when the API provides one.
    pub fn previous_page(&self) -> Option<&str> {
        self.previous_page.as_deref()
    }
}

impl<T: DeserializeOwned> PagedResponse for OffsetPage<T> {
    fn continuation(&self, _limit: Option<i64>) -> Continuation {
        match &self.next_page {
            Some(next) if !next.is_empty() => Continuation::NextUrl(next.clone()),
            _ => Continuation::Done,
        }
    }
}

/// Incremental-export envelope for the Support API: a watermark in Unix
/// seconds plus an end-of-stream flag.
#[derive(Debug, Deserialize)]
pub struct ExportPage<T> {
    /// Watermark to resume from. Valid even when the page is empty.
    pub end_time: i64,
    /// True when the export has caught up with the present.
    #[serde(default)]
    pub end_of_stream: bool,
    /// The endpoint-specific payload.
    #[serde(flatten)]
    pub body: T,
}

impl<T: DeserializeOwned> PagedResponse for ExportPage<T> {
    fn continuation(&self, _limit: Option<i64>) -> Continuation {
        if self.end_of_stream {
            Continuation::Done
        } else {
            Continuation::Resume { start_time: self.end_time }
        }
    }
}

/// Incremental-export envelope for the Chat API: a record count, a
/// fractional-seconds watermark, and a pre-built `next_page` URL.
#[derive(Debug, Deserialize)]
pub struct ChatExportPage<T> {
    /// Records in this page.
    pub count: i64,
    /// Watermark in Unix seconds with a fractional part.
    pub end_time: f64,
    #[serde(default)]
    pub(crate) next_page: Option<String>,
    /// The endpoint-specific payload.
    #[serde(flatten)]
    pub body: T,
}

impl<T> ChatExportPage<T> {
    /// The watermark truncated to whole seconds.
    pub fn end_time(&self) -> DateTime<Utc> {
        #[allow(clippy::cast_possible_truncation)]
        let seconds = self.end_time as i64;
        DateTime::from_timestamp(seconds, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl<T: DeserializeOwned> PagedResponse for ChatExportPage<T> {
    fn continuation(&self, limit: Option<i64>) -> Continuation {
        // A short page means the export is drained; following next_page
        // anyway would cost one guaranteed-empty request per sweep.
        let Some(limit) = limit else { return Continuation::Done };
        if self.count < limit {
            return Continuation::Done;
        }
        match &self.next_page {
            Some(next) if !next.is_empty() => Continuation::NextUrl(next.clone()),
            _ => Continuation::Done,
        }
    }
}

/// Which API family a paginated listing runs against, which decides the
/// base host and the authentication scheme.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Route {
    Support,
    Chat,
    RealTimeChat,
}

impl Client {
    async fn fetch_page_bytes(&self, route: Route, url: &str) -> Result<Vec<u8>, Error> {
        match route {
            Route::Support => {
                let url = self.endpoint_url(Endpoint::Support, url)?;
                let builder = self.credentials.apply(self.http.get(url));
                self.send_with_retry(builder).await
            }
            Route::Chat => self.chat_execute(Endpoint::Chat, url).await,
            Route::RealTimeChat => self.chat_execute(Endpoint::RealTimeChat, url).await,
        }
    }

    /// Drives a paginated listing to completion, handing each decoded page
    /// to `handler`. A handler error stops the listing and is returned
    /// unmodified.
    pub(crate) async fn paginate<P, H>(
        &self,
        route: Route,
        first: String,
        limit: Option<i64>,
        mut handler: H,
    ) -> Result<(), Error>
    where
        P: PagedResponse,
        H: FnMut(P) -> Result<(), Error>,
    {
        let mut next = first;
        loop {
            let bytes = self.fetch_page_bytes(route, &next).await?;
            let page: P = serde_json::from_slice(&bytes)?;
            // Continuation is computed before the handler consumes the page.
            let continuation = page.continuation(limit);
            handler(page)?;

            match continuation {
                Continuation::Done => return Ok(()),
                Continuation::NextUrl(url) => {
                    debug!(%url, "following next page link");
                    next = url;
                }
                Continuation::Resume { start_time } => {
                    next = with_start_time(&next, start_time);
                    debug!(url = %next, "resuming export");
                }
            }
        }
    }

    /// Lists a cursor-paginated Support endpoint.
    pub async fn list_cursor<T, H>(&self, path: &str, handler: H) -> Result<(), Error>
    where
        T: DeserializeOwned,
        H: FnMut(CursorPage<T>) -> Result<(), Error>,
    {
        self.paginate(Route::Support, path.to_owned(), None, handler).await
    }

    /// Lists an offset-paginated Support endpoint.
    pub async fn list_offset<T, H>(&self, path: &str, handler: H) -> Result<(), Error>
    where
        T: DeserializeOwned,
        H: FnMut(OffsetPage<T>) -> Result<(), Error>,
    {
        self.paginate(Route::Support, path.to_owned(), None, handler).await
    }

    /// Runs a Support incremental export from `start_time` to end of stream.
    ///
    /// `sideloads` are joined into an `include` query parameter when
    /// non-empty.
    pub async fn incremental_export<T, H>(
        &self,
        path: &str,
        start_time: DateTime<Utc>,
        per_page: u32,
        sideloads: &[&str],
        handler: H,
    ) -> Result<(), Error>
    where
        T: DeserializeOwned,
        H: FnMut(ExportPage<T>) -> Result<(), Error>,
    {
        let mut first = format!("{path}?start_time={}&per_page={per_page}", start_time.timestamp());
        if !sideloads.is_empty() {
            first.push_str("&include=");
            first.push_str(&sideloads.join(","));
        }
        self.paginate(Route::Support, first, None, handler).await
    }

    /// Runs a Chat incremental export from `start_time`, fetching up to
    /// `limit` records per request and stopping on the first short page.
    pub async fn chat_incremental_export<T, H>(
        &self,
        path: &str,
        start_time: DateTime<Utc>,
        limit: i64,
        handler: H,
    ) -> Result<(), Error>
    where
        T: DeserializeOwned,
        H: FnMut(ChatExportPage<T>) -> Result<(), Error>,
    {
        let first = format!("{path}?start_time={}&limit={limit}", start_time.timestamp());
        self.paginate(Route::Chat, first, Some(limit), handler).await
    }
}

/// Replaces (or appends) the `start_time` query parameter on a path or URL.
fn with_start_time(url: &str, start_time: i64) -> String {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, query),
        None => (url, ""),
    };

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut replaced = false;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == "start_time" {
            serializer.append_pair("start_time", &start_time.to_string());
            replaced = true;
        } else {
            serializer.append_pair(&key, &value);
        }
    }
    if !replaced {
        serializer.append_pair("start_time", &start_time.to_string());
    }

    format!("{base}?{}", serializer.finish())
}
