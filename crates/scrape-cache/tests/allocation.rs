//! End-to-end tests for the capture cache and allocation policy through the
//! public API.

use std::io::Write;

use scrape_cache::prelude::*;
use scrape_cache::store::CHARS_PER_TOKEN;

/// Content whose estimate is exactly `tokens`, tagged by its first character.
fn capture(tokens: u64, tag: char) -> String {
    std::iter::repeat_n(tag, (tokens * CHARS_PER_TOKEN) as usize).collect()
}

fn tags(items: &[&ContentItem]) -> Vec<char> {
    items
        .iter()
        .filter_map(|item| item.content().chars().next())
        .collect()
}

fn budgeted_config(max_tokens: u64, safe_tpm: u64) -> EngineConfig {
    EngineConfig::new()
        .with_max_tokens(max_tokens)
        .without_builtin_models()
        .with_model(
            "budgeted-model",
            ModelPolicy::Budgeted(ModelLimits::new("Budgeted", safe_tpm + 100, safe_tpm, 60)),
        )
}

#[test]
fn eviction_then_truncated_allocation() {
    let mut session = ScrapeSession::new(&budgeted_config(1000, 600));
    session.update_tracked_url("https://example.com/feed");

    session.insert(capture(400, 'a'), Metadata::new());
    session.insert(capture(400, 'b'), Metadata::new());
    let result = session.insert(capture(400, 'c'), Metadata::new());

    assert_eq!(result.evicted, 1);
    assert_eq!(result.item_count, 2);
    assert_eq!(result.tokens, 800);

    let size = session.get_size();
    assert_eq!(size.percent_full, 80);
    assert_eq!(tags(&session.store().get_all_items().items), vec!['b', 'c']);

    let allocation = session.allocate("budgeted-model").unwrap();
    assert!(!allocation.send_all_cache);
    assert_eq!(tags(&allocation.items), vec!['c']);
    assert_eq!(allocation.items_to_send, 1);
    assert_eq!(allocation.tokens_to_send, 400);
    assert_eq!(allocation.percent_used, 90);
    assert!(allocation.warning.is_some());
}

#[test]
fn newest_slice_is_a_maximal_suffix() {
    let mut store = BoundedContentStore::new(100_000);
    let sizes = [120u64, 40, 300, 75, 90, 10, 260, 55];
    for (i, &tokens) in sizes.iter().enumerate() {
        store.insert(capture(tokens, char::from(b'a' + i as u8)), Metadata::new());
    }

    for limit in [0u64, 54, 55, 65, 300, 400, 500, 950, 10_000] {
        let slice = store.get_newest_up_to_tokens(limit);
        assert!(slice.tokens <= limit);

        // Contiguous suffix of the store, in order.
        let all: Vec<&ContentItem> = store.items().collect();
        let suffix = &all[all.len() - slice.item_count..];
        assert_eq!(tags(&slice.items), tags(suffix));

        // The next older item would not have fit.
        if slice.item_count < all.len() {
            let next_older = all[all.len() - slice.item_count - 1];
            assert!(slice.tokens + next_older.token_estimate() > limit);
        }
    }
}

#[test]
fn url_change_invalidates_and_same_url_keeps() {
    let mut session = ScrapeSession::new(&budgeted_config(1000, 600));
    session.update_tracked_url("https://a.example");
    session.insert(capture(10, 'a'), Metadata::new());
    session.insert(capture(10, 'b'), Metadata::new());

    session.update_tracked_url("https://a.example");
    assert_eq!(session.get_size().item_count, 2);

    session.update_tracked_url("https://b.example");
    assert_eq!(session.get_size().item_count, 0);
    assert_eq!(session.get_size().tokens, 0);
}

#[test]
fn builtin_send_all_model_gets_full_default_cache() {
    let mut session = ScrapeSession::default();
    for tag in ['a', 'b', 'c'] {
        session.insert(capture(2_000_000, tag), Metadata::new());
    }
    // 6M of the 6.55M default capacity; the send-all model still gets everything.
    let allocation = session.allocate("gemini-2.5-flash").unwrap();
    assert!(allocation.send_all_cache);
    assert_eq!(allocation.items_to_send, 3);
    assert_eq!(allocation.tokens_to_send, 6_000_000);
    assert_eq!(allocation.percent_used, 86);
    assert!(allocation.warning.is_none());

    let capped = session.allocate("gpt-4o").unwrap();
    assert!(!capped.send_all_cache);
    assert_eq!(capped.items_to_send, 0);
    assert!(capped.tokens_to_send <= 27_000);
}

#[test]
fn unknown_model_blocks_allocation() {
    let mut session = ScrapeSession::default();
    session.insert("<html></html>", Metadata::new());
    match session.allocate("claude-unknown") {
        Err(AllocationError::UnknownModel { model_id }) => assert_eq!(model_id, "claude-unknown"),
        Ok(_) => panic!("unknown model must not allocate"),
    }
}

#[test]
fn config_file_drives_session() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "max_tokens": 500,
            "oversize_policy": "reject",
            "include_builtin_models": false,
            "models": {{
                "tiny": {{
                    "strategy": "budgeted",
                    "display_name": "Tiny",
                    "declared_tpm": 250,
                    "safe_tpm": 200,
                    "rpm": 3
                }}
            }}
        }}"#
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    let mut session = ScrapeSession::new(&config);

    let rejected = session.insert(capture(600, 'x'), Metadata::new());
    assert_eq!(rejected.outcome, InsertOutcome::Rejected);
    assert_eq!(rejected.item_count, 0);

    session.insert(capture(150, 'a'), Metadata::new());
    session.insert(capture(150, 'b'), Metadata::new());
    let allocation = session.allocate("tiny").unwrap();
    assert_eq!(tags(&allocation.items), vec!['b']);
    assert!(session.allocate("gpt-4o").is_err());

    let info = session.get_model_info("tiny").unwrap();
    assert_eq!(info.max_kb, 1); // 800 bytes
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(err.contains("failed to read config"));
}
