// src/services/paginate.rs

//! Paginated fetch protocol shared by every source.
//!
//! `fetch_page(offset, limit)` is called with `offset = page_index * limit`,
//! starting at page 0, until it yields `None` or an empty page. The first
//! error aborts the whole fetch; nothing is retried and no partial result is
//! returned.

use std::future::Future;

use futures::stream::{self, Stream, TryStreamExt};

use crate::error::{SourceError, SourceResult};

/// Pages accumulated in fetch order, plus caller bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Paginated<T, M = ()> {
    pub pages: Vec<Vec<T>>,
    pub meta: M,
}

impl<T, M> Paginated<T, M> {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Flatten pages into one list, preserving order.
    pub fn into_items(self) -> Vec<T> {
        self.pages.into_iter().flatten().collect()
    }
}

/// Lazily yield non-empty pages until the source runs dry.
///
/// The stream ends after the first error it yields.
pub fn page_stream<T, F, Fut>(limit: usize, fetch_page: F) -> impl Stream<Item = SourceResult<Vec<T>>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = SourceResult<Option<Vec<T>>>>,
{
    stream::unfold(Some((0usize, fetch_page)), move |state| async move {
        let (page_index, mut fetch_page) = state?;
        if limit == 0 {
            return Some((Err(SourceError::config("page size must be > 0")), None));
        }
        match fetch_page(page_index * limit, limit).await {
            Ok(Some(page)) if !page.is_empty() => {
                Some((Ok(page), Some((page_index + 1, fetch_page))))
            }
            Ok(_) => None,
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Fetch every page and return them together with `meta`.
pub async fn fetch_paginated<T, M, F, Fut>(
    limit: usize,
    meta: M,
    fetch_page: F,
) -> SourceResult<Paginated<T, M>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = SourceResult<Option<Vec<T>>>>,
{
    let pages: Vec<Vec<T>> = page_stream(limit, fetch_page).try_collect().await?;
    Ok(Paginated { pages, meta })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::{Arc, Mutex};

    /// Serves `pages` full pages then `None`, recording offsets.
    fn stub(
        pages: usize,
        offsets: Arc<Mutex<Vec<usize>>>,
    ) -> impl FnMut(usize, usize) -> futures::future::Ready<SourceResult<Option<Vec<usize>>>> {
        move |offset, limit| {
            offsets.lock().unwrap().push(offset);
            let result = if offset / limit < pages {
                Some((offset..offset + limit).collect())
            } else {
                None
            };
            futures::future::ready(Ok(result))
        }
    }

    #[tokio::test]
    async fn test_three_pages_then_null() {
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let result = fetch_paginated(10, "query-1", stub(3, Arc::clone(&offsets)))
            .await
            .unwrap();

        assert_eq!(result.page_count(), 3);
        assert_eq!(result.item_count(), 30);
        assert_eq!(result.meta, "query-1");
        assert_eq!(*offsets.lock().unwrap(), vec![0, 10, 20, 30]);
        assert_eq!(result.into_items()[25], 25);
    }

    #[tokio::test]
    async fn test_empty_page_terminates() {
        let mut calls = 0;
        let result = fetch_paginated(5, (), |_, _| {
            calls += 1;
            let page = if calls == 1 { vec![1, 2] } else { Vec::new() };
            futures::future::ready(Ok(Some(page)))
        })
        .await
        .unwrap();

        assert_eq!(result.pages, vec![vec![1, 2]]);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_error_aborts_without_partial_results() {
        let mut calls = 0;
        let result: SourceResult<Paginated<u8>> = fetch_paginated(2, (), |_, _| {
            calls += 1;
            let outcome = if calls < 3 {
                Ok(Some(vec![1, 2]))
            } else {
                Err(SourceError::fetch("503 Service Unavailable"))
            };
            futures::future::ready(outcome)
        })
        .await;

        assert_eq!(result, Err(SourceError::Fetch("503 Service Unavailable".into())));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_zero_limit_is_config_error() {
        let result: SourceResult<Paginated<u8>> =
            fetch_paginated(0, (), |_, _| futures::future::ready(Ok(Some(vec![1]))))
                .await;
        assert!(matches!(result, Err(SourceError::Config(_))));
    }

    #[tokio::test]
    async fn test_page_stream_is_lazy() {
        let offsets = Arc::new(Mutex::new(Vec::new()));
        let mut pages = Box::pin(page_stream(4, stub(5, Arc::clone(&offsets))));

        let first = pages.next().await.unwrap().unwrap();
        assert_eq!(first, vec![0, 1, 2, 3]);
        assert_eq!(*offsets.lock().unwrap(), vec![0]);
    }
}
