//! Capacity-bounded, insertion-ordered store of captured content.
//!
//! Items are appended at the back and evicted from the front, so the store
//! is a FIFO log: index 0 is always the oldest surviving capture. Running
//! token and byte sums are updated in the same step as every push or pop,
//! so no reader ever sees them out of sync with the item list.

use std::collections::VecDeque;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::item::{CHARS_PER_TOKEN, ContentItem, Metadata, estimate_tokens};

/// Default capacity: ~25 MB of raw text at 4 characters per token.
pub const DEFAULT_MAX_TOKENS: u64 = 25 * 1024 * 1024 / CHARS_PER_TOKEN;

/// What to do with a single capture whose own estimate exceeds the store's
/// entire capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Empty the store and keep the oversized item anyway. The most recent
    /// capture always wins.
    #[default]
    AcceptNewest,
    /// Leave the store untouched and drop the new item.
    Reject,
    /// Keep only the leading characters that fit the capacity.
    Truncate,
}

/// How an [`insert`](BoundedContentStore::insert) call was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertOutcome {
    /// The item fit (possibly after evicting older items).
    Stored,
    /// The item alone exceeds capacity; the store now holds only it.
    StoredOversized,
    /// The item was cut down to capacity before storing.
    Truncated,
    /// The item exceeded capacity and was dropped.
    Rejected,
}

/// Store totals after an insert.
#[derive(Debug, Clone, Serialize)]
pub struct InsertResult {
    pub outcome: InsertOutcome,
    /// Number of older items evicted to make room.
    pub evicted: usize,
    pub item_count: usize,
    pub tokens: u64,
    /// Total stored size in kilobytes, rounded.
    pub kb: u64,
}

/// A chronologically ordered selection of stored items with its totals.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSlice<'a> {
    pub items: Vec<&'a ContentItem>,
    pub item_count: usize,
    pub tokens: u64,
    pub kb: u64,
}

impl<'a> CacheSlice<'a> {
    fn from_items(items: Vec<&'a ContentItem>) -> Self {
        let tokens = items.iter().map(|i| i.token_estimate()).sum();
        let bytes = items.iter().map(|i| i.byte_size()).sum();
        Self {
            item_count: items.len(),
            items,
            tokens,
            kb: bytes_to_kb(bytes),
        }
    }
}

/// Read-only occupancy snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSize {
    pub tokens: u64,
    pub kb: u64,
    pub mb: f64,
    pub max_tokens: u64,
    pub max_kb: u64,
    pub max_mb: f64,
    /// `round(tokens / max_tokens * 100)`.
    pub percent_full: u32,
    pub item_count: usize,
}

impl CacheSize {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "cache: {} items, ~{} tokens ({} KB, {}% of {} tokens)",
            self.item_count, self.tokens, self.kb, self.percent_full, self.max_tokens,
        )
    }
}

/// Append-only, FIFO-evicting store of captured page content.
///
/// Owned by exactly one page-tracking session. Every operation is
/// synchronous and total; nothing here performs I/O.
///
/// # Example
///
/// ```
/// use scrape_cache::store::{BoundedContentStore, Metadata};
///
/// let mut store = BoundedContentStore::new(1000);
/// store.update_tracked_url("https://example.com/feed");
/// store.insert("x".repeat(1600), Metadata::new());
/// store.insert("y".repeat(1600), Metadata::new());
/// store.insert("z".repeat(1600), Metadata::new());
///
/// let size = store.get_size();
/// assert_eq!(size.item_count, 2);
/// assert_eq!(size.percent_full, 80);
/// ```
#[derive(Debug)]
pub struct BoundedContentStore {
    items: VecDeque<ContentItem>,
    total_tokens: u64,
    total_bytes: u64,
    max_tokens: u64,
    oversize_policy: OversizePolicy,
    tracked_url: Option<String>,
    next_sequence: u64,
}

impl Default for BoundedContentStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl BoundedContentStore {
    /// Create an empty store holding at most `max_tokens` estimated tokens.
    pub fn new(max_tokens: u64) -> Self {
        Self {
            items: VecDeque::new(),
            total_tokens: 0,
            total_bytes: 0,
            max_tokens,
            oversize_policy: OversizePolicy::default(),
            tracked_url: None,
            next_sequence: 0,
        }
    }

    /// Override how captures larger than the whole capacity are handled.
    pub fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = policy;
        self
    }

    /// Append a capture, evicting the oldest items until it fits.
    ///
    /// Eviction is strictly by age: items are popped from the front one at
    /// a time until `total_tokens + new <= max_tokens` or the store is
    /// empty. Captures larger than the entire capacity are resolved by the
    /// store's [`OversizePolicy`].
    pub fn insert(&mut self, content: impl Into<String>, metadata: Metadata) -> InsertResult {
        let mut content = content.into();
        let mut outcome = InsertOutcome::Stored;

        if estimate_tokens(&content) > self.max_tokens {
            match self.oversize_policy {
                OversizePolicy::AcceptNewest => {
                    warn!(
                        tokens = estimate_tokens(&content),
                        max_tokens = self.max_tokens,
                        "capture exceeds cache capacity, storing it alone"
                    );
                    outcome = InsertOutcome::StoredOversized;
                }
                OversizePolicy::Reject => {
                    warn!(
                        tokens = estimate_tokens(&content),
                        max_tokens = self.max_tokens,
                        "capture exceeds cache capacity, rejected"
                    );
                    return self.insert_result(InsertOutcome::Rejected, 0);
                }
                OversizePolicy::Truncate => {
                    let keep_chars = self.max_tokens.saturating_mul(CHARS_PER_TOKEN);
                    truncate_chars(&mut content, keep_chars);
                    warn!(
                        kept_chars = keep_chars,
                        max_tokens = self.max_tokens,
                        "capture exceeds cache capacity, truncated"
                    );
                    outcome = InsertOutcome::Truncated;
                }
            }
        }

        let item = ContentItem::new(content, metadata, self.next_sequence);
        self.next_sequence += 1;

        let mut evicted = 0;
        let mut freed_tokens = 0;
        while self.total_tokens.saturating_add(item.token_estimate()) > self.max_tokens {
            let Some(oldest) = self.items.pop_front() else {
                break;
            };
            self.total_tokens = self.total_tokens.saturating_sub(oldest.token_estimate());
            self.total_bytes = self.total_bytes.saturating_sub(oldest.byte_size());
            freed_tokens += oldest.token_estimate();
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, freed_tokens, "evicted oldest captures");
        }

        self.total_tokens += item.token_estimate();
        self.total_bytes += item.byte_size();
        self.items.push_back(item);

        self.insert_result(outcome, evicted)
    }

    /// Every stored item, oldest first.
    pub fn get_all_items(&self) -> CacheSlice<'_> {
        CacheSlice {
            items: self.items.iter().collect(),
            item_count: self.items.len(),
            tokens: self.total_tokens,
            kb: bytes_to_kb(self.total_bytes),
        }
    }

    /// The longest run of newest whole items whose combined estimate stays
    /// within `max_tokens`.
    ///
    /// Walks backward from the newest item and stops at the first item that
    /// would overflow the limit; items are never split and older items past
    /// that boundary are never considered. The returned items keep their
    /// chronological order.
    pub fn get_newest_up_to_tokens(&self, max_tokens: u64) -> CacheSlice<'_> {
        let mut accumulated = 0u64;
        let mut start = self.items.len();
        for (idx, item) in self.items.iter().enumerate().rev() {
            let next = accumulated.saturating_add(item.token_estimate());
            if next > max_tokens {
                break;
            }
            accumulated = next;
            start = idx;
        }
        CacheSlice::from_items(self.items.range(start..).collect())
    }

    /// Current occupancy against capacity.
    pub fn get_size(&self) -> CacheSize {
        let max_bytes = self.max_tokens.saturating_mul(CHARS_PER_TOKEN);
        CacheSize {
            tokens: self.total_tokens,
            kb: bytes_to_kb(self.total_bytes),
            mb: bytes_to_mb(self.total_bytes),
            max_tokens: self.max_tokens,
            max_kb: bytes_to_kb(max_bytes),
            max_mb: bytes_to_mb(max_bytes),
            percent_full: percent_of(self.total_tokens, self.max_tokens),
            item_count: self.items.len(),
        }
    }

    /// Drop every item and reset the sums. Idempotent.
    pub fn clear(&mut self) {
        self.items.clear();
        self.total_tokens = 0;
        self.total_bytes = 0;
    }

    /// Associate the store with `url`, clearing it if it was tracking a
    /// different page.
    pub fn update_tracked_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if let Some(current) = &self.tracked_url
            && *current != url
        {
            info!(
                from = %current,
                to = %url,
                dropped = self.items.len(),
                "tracked page changed, clearing cache"
            );
            self.clear();
        }
        self.tracked_url = Some(url);
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stored items, oldest first.
    pub fn items(&self) -> impl DoubleEndedIterator<Item = &ContentItem> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_tokens(&self) -> u64 {
        self.max_tokens
    }

    pub fn oversize_policy(&self) -> OversizePolicy {
        self.oversize_policy
    }

    pub fn tracked_url(&self) -> Option<&str> {
        self.tracked_url.as_deref()
    }

    fn insert_result(&self, outcome: InsertOutcome, evicted: usize) -> InsertResult {
        InsertResult {
            outcome,
            evicted,
            item_count: self.items.len(),
            tokens: self.total_tokens,
            kb: bytes_to_kb(self.total_bytes),
        }
    }
}

/// `round(part / whole * 100)`, treating an empty whole as 0% (or 100% if
/// anything is present).
pub(crate) fn percent_of(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return if part == 0 { 0 } else { 100 };
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

pub(crate) fn bytes_to_kb(bytes: u64) -> u64 {
    (bytes as f64 / 1024.0).round() as u64
}

fn bytes_to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

/// Shorten `s` to at most `max_chars` characters, on a char boundary.
fn truncate_chars(s: &mut String, max_chars: u64) {
    let max_chars = usize::try_from(max_chars).unwrap_or(usize::MAX);
    if let Some((idx, _)) = s.char_indices().nth(max_chars) {
        s.truncate(idx);
    }
}
