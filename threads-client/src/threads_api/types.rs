//! Shared types and pagination for the Threads API client.

use crate::error::{Error, Result};
use crate::threads_api::ThreadsClient;
use crate::transport::RequestSpec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::marker::PhantomData;
use tokio_stream::Stream;

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque token for the following page; `None` on the last page.
    pub cursor: Option<String>,
}

/// Paging details attached to list responses.
///
/// See: <https://developers.facebook.com/docs/threads/overview#pagination>
#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    cursors: Option<Cursors>,
    /// Link to the next page. Absent on the last page, even when `cursors.after` is echoed.
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Cursors {
    #[serde(default)]
    after: Option<String>,
}

impl<T: DeserializeOwned> Page<T> {
    /// Decodes a list response.
    ///
    /// List endpoints normally answer `{"data": [...], "paging": {...}}`, but some answer with a
    /// bare JSON array. The object form is tried first; a bare array is accepted as a single,
    /// final page. Any other JSON shape is an API error; malformed JSON is a decode error.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(body).map_err(|source| Error::Decode {
                what: "list response",
                source,
            })?;
        match value {
            serde_json::Value::Object(mut object) if object.contains_key("data") => {
                let data = object.remove("data").unwrap_or_default();
                let items = Vec::<T>::deserialize(data).map_err(|source| Error::Decode {
                    what: "list response data",
                    source,
                })?;
                let paging = match object.remove("paging") {
                    Some(paging) => {
                        Paging::deserialize(paging).map_err(|source| Error::Decode {
                            what: "list response paging",
                            source,
                        })?
                    }
                    None => Paging::default(),
                };
                let cursor = paging
                    .next
                    .and(paging.cursors.and_then(|c| c.after))
                    .filter(|after| !after.is_empty());
                Ok(Self { items, cursor })
            }
            array @ serde_json::Value::Array(_) => {
                let items = Vec::<T>::deserialize(array).map_err(|source| Error::Decode {
                    what: "list response array",
                    source,
                })?;
                Ok(Self {
                    items,
                    cursor: None,
                })
            }
            _ => Err(Error::Api {
                status: None,
                message: "list response is neither {\"data\": [...]} nor an array".to_string(),
                body: Some(String::from_utf8_lossy(body).into_owned()),
                request_id: None,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    /// Nothing fetched yet; the first page needs no cursor.
    First,
    After(String),
    Exhausted,
}

/// Walks a cursor-paginated list endpoint one page at a time.
///
/// Pages are fetched lazily and strictly in order. Once a page arrives without a forward
/// cursor the pager is exhausted for good; build a new one to traverse the list again.
#[derive(Debug)]
pub struct Pager<T> {
    client: ThreadsClient,
    request: RequestSpec,
    position: Position,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Pager<T> {
    pub(crate) fn new(client: ThreadsClient, request: RequestSpec) -> Self {
        Self {
            client,
            request,
            position: Position::First,
            _item: PhantomData,
        }
    }

    /// Whether another page can be fetched.
    pub fn has_next(&self) -> bool {
        self.position != Position::Exhausted
    }

    /// Fetches the next page.
    ///
    /// Calling this after the last page has been returned fails with a validation error on
    /// `cursor` without touching the network. A failed fetch leaves the position unchanged, so
    /// the same page can be requested again.
    pub async fn next_page(&mut self) -> Result<Page<T>> {
        let mut request = self.request.clone();
        match &self.position {
            Position::First => {}
            Position::After(cursor) => request = request.query("after", cursor.clone()),
            Position::Exhausted => {
                return Err(Error::validation("cursor", "pagination is already exhausted"));
            }
        }

        let response = self.client.send(request).await?;
        let page = Page::<T>::decode(&response.body)?;
        tracing::debug!(
            path = %self.request.path,
            returned_items = page.items.len(),
            has_more = page.cursor.is_some(),
            "fetched page"
        );
        self.position = match &page.cursor {
            Some(cursor) => Position::After(cursor.clone()),
            None => Position::Exhausted,
        };
        Ok(page)
    }

    /// Fetches every remaining page and concatenates their items.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while self.has_next() {
            items.extend(self.next_page().await?.items);
        }
        Ok(items)
    }

    /// Yields items one by one, fetching pages as needed. The stream ends after the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<T>>
    where
        T: Send + 'static,
    {
        async_stream::try_stream! {
            while self.has_next() {
                let page = self.next_page().await?;
                for item in page.items {
                    yield item;
                }
            }
        }
    }
}

/// Accepts ids that the API sometimes sends as JSON numbers and sometimes as strings.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
