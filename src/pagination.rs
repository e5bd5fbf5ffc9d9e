//! Quota-aware traversal of paginated remote result sets
//!
//! A traversal fetches the first page, sizes the whole walk from the reported
//! total, and checks the quota gate once before fetching the rest. Pages are
//! fetched lazily; a new `PageIterator` always starts from the first page.

use crate::error::{HarvestError, HarvestResult};
use crate::quota::QuotaGate;
use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use std::collections::VecDeque;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default extra calls reserved on top of the page estimate
pub const DEFAULT_SAFETY_MARGIN: u32 = 10;

/// Position within a paginated result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Beginning of the result set
    Start,
    /// Opaque continuation token
    Token(String),
    /// 1-based page number
    Number(u32),
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Token(token) => write!(f, "token:{}", token),
            Self::Number(n) => write!(f, "page:{}", n),
        }
    }
}

/// One page of results
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// Cursor for the following page, if the source provides one
    pub next_cursor: Option<PageCursor>,

    /// Whether more pages follow
    pub has_more: bool,

    /// Total item count; only meaningful on the first page
    pub total_count: Option<u64>,

    /// Remaining quota reported alongside this page
    pub remaining_quota: Option<u32>,
}

/// A remote result set that can be fetched one page at a time
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Items per page requested from the remote
    fn page_size(&self) -> u32;

    /// Cursor for the first page
    fn first_cursor(&self) -> PageCursor {
        PageCursor::Start
    }

    /// Fetch the page at `cursor`
    async fn fetch_page(&self, cursor: &PageCursor) -> HarvestResult<Page<T>>;
}

/// Calls needed to walk `total_count` items, plus a safety margin
pub fn estimate_calls(total_count: u64, page_size: u32, margin: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total_count.div_ceil(page_size);
    u32::try_from(pages)
        .unwrap_or(u32::MAX)
        .saturating_add(margin)
}

/// Lazy, finite traversal over a `PageSource`
pub struct PageIterator<'a, T: Send> {
    source: &'a dyn PageSource<T>,
    gate: &'a mut QuotaGate,
    cancel: &'a CancellationToken,
    margin: u32,
    cursor: Option<PageCursor>,
    buffer: VecDeque<T>,
    quota_requested: Option<u32>,
    pages_fetched: u32,
}

impl<'a, T: Send> PageIterator<'a, T> {
    /// Start a traversal at the source's first page
    pub fn new(
        source: &'a dyn PageSource<T>,
        gate: &'a mut QuotaGate,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            cursor: Some(source.first_cursor()),
            source,
            gate,
            cancel,
            margin: DEFAULT_SAFETY_MARGIN,
            buffer: VecDeque::new(),
            quota_requested: None,
            pages_fetched: 0,
        }
    }

    /// Override the safety margin added to the quota request
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Size of the one-time quota check, once it has been made
    pub fn quota_requested(&self) -> Option<u32> {
        self.quota_requested
    }

    /// Number of pages fetched so far
    pub fn pages_fetched(&self) -> u32 {
        self.pages_fetched
    }

    /// Fetch the next page's items, or `None` once the traversal is done
    pub async fn next_page(&mut self) -> HarvestResult<Option<Vec<T>>> {
        let Some(cursor) = self.cursor.take() else {
            return Ok(None);
        };

        if self.cancel.is_cancelled() {
            return Err(HarvestError::Cancelled);
        }

        debug!("Fetching page at {}", cursor);
        let page = self.source.fetch_page(&cursor).await?;
        self.pages_fetched += 1;

        if let Some(remaining) = page.remaining_quota {
            self.gate.state_mut().observe(remaining);
        }

        if page.has_more && self.quota_requested.is_none() {
            self.check_quota(&page).await?;
        }

        self.cursor = if page.has_more {
            Some(Self::advance(&cursor, page.next_cursor)?)
        } else {
            None
        };

        Ok(Some(page.items))
    }

    /// Next single item, fetching pages as needed
    pub async fn next_item(&mut self) -> HarvestResult<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            match self.next_page().await? {
                Some(items) => self.buffer.extend(items),
                None => return Ok(None),
            }
        }
    }

    /// Drain the whole traversal into a vector
    pub async fn collect_all(mut self) -> HarvestResult<Vec<T>> {
        let mut all = Vec::new();
        while let Some(items) = self.next_page().await? {
            all.extend(items);
        }
        Ok(all)
    }

    /// Turn the traversal into a stream of items
    pub fn into_stream(self) -> impl Stream<Item = HarvestResult<T>> + 'a
    where
        T: 'a,
    {
        stream::try_unfold(self, |mut iter| async move {
            Ok(iter.next_item().await?.map(|item| (item, iter)))
        })
    }

    async fn check_quota(&mut self, first: &Page<T>) -> HarvestResult<()> {
        let needed = match first.total_count {
            Some(total) => estimate_calls(total, self.source.page_size(), self.margin),
            None => {
                warn!(
                    "First page reported no total count; reserving only the safety margin of {}",
                    self.margin
                );
                self.margin
            }
        };

        self.quota_requested = Some(needed);
        self.gate
            .ensure_capacity_from(needed, first.remaining_quota, self.cancel)
            .await
    }

    fn advance(current: &PageCursor, next: Option<PageCursor>) -> HarvestResult<PageCursor> {
        match (next, current) {
            (Some(next), _) => Ok(next),
            (None, PageCursor::Number(n)) => Ok(PageCursor::Number(n + 1)),
            (None, _) => Err(HarvestError::Pagination(format!(
                "page at {} reported more results without a continuation cursor",
                current
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::tests::ScriptedProbe;
    use crate::quota::QuotaState;
    use futures_util::TryStreamExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Token-paginated source over fixed pages
    struct FixedPages {
        pages: Vec<Vec<u32>>,
        total: Option<u64>,
        size: u32,
        seen: Mutex<Vec<PageCursor>>,
    }

    impl FixedPages {
        fn new(total: Option<u64>, size: u32, pages: Vec<Vec<u32>>) -> Self {
            Self {
                pages,
                total,
                size,
                seen: Mutex::new(vec![]),
            }
        }

        fn seen(&self) -> Vec<PageCursor> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource<u32> for FixedPages {
        fn page_size(&self) -> u32 {
            self.size
        }

        async fn fetch_page(&self, cursor: &PageCursor) -> HarvestResult<Page<u32>> {
            self.seen.lock().unwrap().push(cursor.clone());
            let index = match cursor {
                PageCursor::Start => 0,
                PageCursor::Token(t) => t.parse::<usize>().unwrap(),
                PageCursor::Number(_) => unreachable!(),
            };
            let has_more = index + 1 < self.pages.len();
            Ok(Page {
                items: self.pages[index].clone(),
                next_cursor: has_more.then(|| PageCursor::Token((index + 1).to_string())),
                has_more,
                total_count: if index == 0 { self.total } else { None },
                remaining_quota: None,
            })
        }
    }

    /// Page-number source that never returns a next cursor
    struct NumberedPages;

    #[async_trait]
    impl PageSource<String> for NumberedPages {
        fn page_size(&self) -> u32 {
            2
        }

        fn first_cursor(&self) -> PageCursor {
            PageCursor::Number(1)
        }

        async fn fetch_page(&self, cursor: &PageCursor) -> HarvestResult<Page<String>> {
            let PageCursor::Number(n) = cursor else {
                return Err(HarvestError::Pagination("expected page number".into()));
            };
            Ok(Page {
                items: vec![format!("p{}a", n), format!("p{}b", n)],
                next_cursor: None,
                has_more: *n < 3,
                total_count: Some(6),
                remaining_quota: Some(4000),
            })
        }
    }

    fn gate(probe: Arc<ScriptedProbe>) -> QuotaGate {
        QuotaGate::new(probe, QuotaState::new(5000, 5)).with_backoff(Duration::from_millis(1))
    }

    #[test]
    fn estimate_rounds_pages_up() {
        assert_eq!(estimate_calls(301, 100, 10), 14);
        assert_eq!(estimate_calls(300, 100, 10), 13);
        assert_eq!(estimate_calls(0, 100, 2), 2);
    }

    #[tokio::test]
    async fn one_quota_check_per_traversal() {
        let source = FixedPages::new(
            Some(301),
            100,
            vec![vec![1, 2], vec![3], vec![4, 5], vec![6]],
        );
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(5000)]));
        let mut gate = gate(probe.clone());
        let cancel = CancellationToken::new();

        let mut iter = PageIterator::new(&source, &mut gate, &cancel);
        let mut items = vec![];
        while let Some(page) = iter.next_page().await.unwrap() {
            items.extend(page);
        }

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(iter.pages_fetched(), 4);
        assert_eq!(iter.quota_requested(), Some(14));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn quota_check_is_sized_from_total() {
        // 13 remaining is one short of the 14 needed, so the gate waits once
        let source = FixedPages::new(Some(301), 100, vec![vec![1], vec![2]]);
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(13), Ok(14)]));
        let mut gate = gate(probe.clone());
        let cancel = CancellationToken::new();

        let items = PageIterator::new(&source, &mut gate, &cancel)
            .collect_all()
            .await
            .unwrap();

        assert_eq!(items, vec![1, 2]);
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn single_page_skips_quota_check() {
        let source = FixedPages::new(Some(2), 100, vec![vec![7, 8]]);
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(5000)]));
        let mut gate = gate(probe.clone());
        let cancel = CancellationToken::new();

        let mut iter = PageIterator::new(&source, &mut gate, &cancel);
        assert_eq!(iter.next_page().await.unwrap(), Some(vec![7, 8]));
        assert_eq!(iter.next_page().await.unwrap(), None);
        assert_eq!(iter.quota_requested(), None);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn missing_total_still_reserves_margin() {
        let source = FixedPages::new(None, 100, vec![vec![1], vec![2]]);
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(5000)]));
        let mut gate = gate(probe.clone());
        let cancel = CancellationToken::new();

        let mut iter = PageIterator::new(&source, &mut gate, &cancel).with_margin(3);
        while iter.next_page().await.unwrap().is_some() {}

        assert_eq!(iter.quota_requested(), Some(3));
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_iterator_restarts_from_first_page() {
        let source = FixedPages::new(Some(3), 1, vec![vec![1], vec![2], vec![3]]);
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(5000)]));
        let mut gate = gate(probe);
        let cancel = CancellationToken::new();

        let mut first = PageIterator::new(&source, &mut gate, &cancel);
        assert_eq!(first.next_item().await.unwrap(), Some(1));
        drop(first);

        let again = PageIterator::new(&source, &mut gate, &cancel)
            .collect_all()
            .await
            .unwrap();
        assert_eq!(again, vec![1, 2, 3]);

        let seen = source.seen();
        assert_eq!(seen[0], PageCursor::Start);
        assert_eq!(seen[1], PageCursor::Start);
    }

    #[tokio::test]
    async fn page_numbers_advance_without_cursor() {
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(0)]));
        let mut gate = gate(probe.clone());
        let cancel = CancellationToken::new();

        let items: Vec<String> = PageIterator::new(&NumberedPages, &mut gate, &cancel)
            .into_stream()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(items.len(), 6);
        assert_eq!(items[5], "p3b");
        // The first page's reported quota stands in for a probe
        assert_eq!(probe.calls(), 0);
        assert_eq!(gate.state().remaining, 4000);
    }

    #[tokio::test]
    async fn cancelled_traversal_stops() {
        let source = FixedPages::new(Some(2), 1, vec![vec![1], vec![2]]);
        let probe = Arc::new(ScriptedProbe::new(vec![Ok(5000)]));
        let mut gate = gate(probe);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = PageIterator::new(&source, &mut gate, &cancel)
            .collect_all()
            .await;
        assert!(matches!(result, Err(HarvestError::Cancelled)));
    }
}
