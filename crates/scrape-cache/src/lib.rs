//! Bounded page-capture cache with model-aware token allocation.
//!
//! `scrape-cache` is the resource-management core of an AI page scraper. As
//! a page is scrolled, HTML snapshots are pushed into a capacity-bounded
//! store; before each extraction request, an allocation policy decides how
//! much of that store a chosen model may receive without exceeding its
//! per-minute token budget. Nothing in this crate performs network or DOM
//! I/O: it takes text blobs and model ids and returns decisions.
//!
//! # Getting started
//!
//! ```
//! use scrape_cache::prelude::*;
//!
//! let config = EngineConfig::new().with_max_tokens(1000).with_model(
//!     "budgeted-model",
//!     ModelPolicy::Budgeted(ModelLimits::new("Budgeted", 700, 600, 60)),
//! );
//! let mut session = ScrapeSession::new(&config);
//!
//! session.update_tracked_url("https://example.com/feed");
//! for _ in 0..3 {
//!     // 1600 characters ≈ 400 tokens each.
//!     session.insert("x".repeat(1600), Metadata::new());
//! }
//!
//! // Capacity 1000: the first capture was evicted.
//! assert_eq!(session.get_size().tokens, 800);
//!
//! // Over the 600-token safe budget: only the newest capture goes out.
//! let allocation = session.allocate("budgeted-model").unwrap();
//! assert!(!allocation.send_all_cache);
//! assert_eq!(allocation.tokens_to_send, 400);
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | [`BoundedContentStore`](store::BoundedContentStore): FIFO capture log with token/byte accounting |
//! | [`policy`] | [`ModelAllocationPolicy`](policy::ModelAllocationPolicy), the per-model [`ModelTable`](policy::ModelTable) |
//! | [`config`] | [`EngineConfig`](config::EngineConfig): capacity, oversize handling, model table, JSON loading |
//! | [`session`] | [`ScrapeSession`](session::ScrapeSession): one owned store + policy per tracked page |
//!
//! # Token estimates
//!
//! Every size in this crate is an estimate at a fixed 4 characters per
//! token ([`CHARS_PER_TOKEN`](store::CHARS_PER_TOKEN)). There is no
//! tokenizer; budgets are safety-derated to absorb the error.

pub mod config;
pub mod policy;
pub mod prelude;
pub mod session;
pub mod store;
