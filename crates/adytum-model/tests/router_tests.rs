// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Fallback-chain behaviour of the model router against scripted adapters.

use std::collections::HashMap;
use std::sync::Arc;

use adytum_config::ModelsConfig;
use adytum_model::{
    AdapterFactory, ApiFamily, Catalog, ChatOptions, ChatOutcome, CredentialResolver, Message,
    ModelCatalogEntry, ModelRouter, ProviderAdapter, ProviderError, ResolvedAuth, RouterError,
    RuntimeState, ScriptedMockAdapter,
};

/// Factory that hands out one pre-built scripted adapter per qualified id.
struct TestFactory {
    adapters: HashMap<String, Arc<ScriptedMockAdapter>>,
}

impl AdapterFactory for TestFactory {
    fn adapter_for(
        &self,
        entry: &ModelCatalogEntry,
        _auth: &ResolvedAuth,
    ) -> Arc<dyn ProviderAdapter> {
        self.adapters
            .get(&entry.qualified_id())
            .cloned()
            .expect("test factory must know every model id")
    }
}

fn entry(id: &str) -> ModelCatalogEntry {
    ModelCatalogEntry {
        id: id.into(),
        name: id.into(),
        provider: "mock".into(),
        api: ApiFamily::Mock,
        base_url: None,
        context_window: 100_000,
        max_output_tokens: 8192,
        input_cost_per_mtok: 1.0,
        output_cost_per_mtok: 2.0,
        description: String::new(),
    }
}

fn router_with(
    chain: Vec<&str>,
    adapters: Vec<(&str, ScriptedMockAdapter)>,
) -> (ModelRouter, HashMap<String, Arc<ScriptedMockAdapter>>) {
    let mut models = ModelsConfig::default();
    models.roles.insert(
        "thinking".into(),
        chain.iter().map(|s| s.to_string()).collect(),
    );

    let entries = adapters
        .iter()
        .map(|(qid, _)| {
            let bare = qid.split('/').nth(1).unwrap();
            entry(bare)
        })
        .collect();
    let catalog = Catalog::from_entries(entries);

    let map: HashMap<String, Arc<ScriptedMockAdapter>> = adapters
        .into_iter()
        .map(|(qid, a)| (qid.to_string(), Arc::new(a)))
        .collect();
    let factory = TestFactory {
        adapters: map.clone(),
    };
    let credentials = Arc::new(CredentialResolver::new(HashMap::new(), "default"));
    let router = ModelRouter::new(&models, catalog, credentials, Box::new(factory));
    (router, map)
}

#[tokio::test]
async fn chain_falls_through_transient_and_quota_to_success() {
    // A fails transient, B hits quota, C succeeds.
    let (router, adapters) = router_with(
        vec!["mock/m-a", "mock/m-b", "mock/m-c"],
        vec![
            (
                "mock/m-a",
                ScriptedMockAdapter::always_err(ProviderError::Transport("connection reset".into())),
            ),
            (
                "mock/m-b",
                ScriptedMockAdapter::always_err(ProviderError::QuotaExceeded(
                    "monthly quota".into(),
                )),
            ),
            ("mock/m-c", ScriptedMockAdapter::always_text("from C")),
        ],
    );

    let reply = router
        .chat("thinking", &[Message::user("hi")], &ChatOptions::default())
        .await
        .expect("C must succeed");
    assert_eq!(reply.model_id, "mock/m-c");
    assert_eq!(reply.message.content, "from C");

    // Exactly one successful result; B is in cooldown, A is not.
    let status = router.runtime_status();
    let b = status.get("mock/m-b").expect("B has runtime state");
    assert_eq!(b.state, RuntimeState::QuotaExceeded);
    assert!(b.cooldown_until.is_some());
    let a_cooling = status
        .get("mock/m-a")
        .and_then(|s| s.cooldown_until)
        .is_some();
    assert!(!a_cooling, "transient failures must not cool the model down");

    // Each adapter was consulted exactly once.
    assert_eq!(adapters["mock/m-a"].call_count(), 1);
    assert_eq!(adapters["mock/m-b"].call_count(), 1);
    assert_eq!(adapters["mock/m-c"].call_count(), 1);
}

#[tokio::test]
async fn cooled_model_is_skipped_on_the_next_call() {
    let (router, adapters) = router_with(
        vec!["mock/m-a", "mock/m-b"],
        vec![
            (
                "mock/m-a",
                ScriptedMockAdapter::always_err(ProviderError::RateLimited("429".into())),
            ),
            ("mock/m-b", {
                let a = ScriptedMockAdapter::new(vec![
                    Ok(ChatOutcome::text("one")),
                    Ok(ChatOutcome::text("two")),
                ]);
                a
            }),
        ],
    );

    let r1 = router
        .chat("thinking", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(r1.model_id, "mock/m-b");
    assert_eq!(adapters["mock/m-a"].call_count(), 1);

    // Second call: A is inside its 30 s cooldown window, so it must be
    // skipped without another adapter call.
    let r2 = router
        .chat("thinking", &[Message::user("y")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(r2.model_id, "mock/m-b");
    assert_eq!(
        adapters["mock/m-a"].call_count(),
        1,
        "cooled model must be skipped"
    );
}

#[tokio::test]
async fn all_candidates_failing_yields_composite_error() {
    let (router, _) = router_with(
        vec!["mock/m-a", "mock/m-b"],
        vec![
            (
                "mock/m-a",
                ScriptedMockAdapter::always_err(ProviderError::Transport("boom".into())),
            ),
            (
                "mock/m-b",
                ScriptedMockAdapter::always_err(ProviderError::Transport("bust".into())),
            ),
        ],
    );

    let err = router
        .chat("thinking", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap_err();
    match &err {
        RouterError::AllFailed { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert!(attempts[0].starts_with("[mock/m-a]"));
            assert!(attempts[1].starts_with("[mock/m-b]"));
        }
        other => panic!("expected AllFailed, got {other:?}"),
    }
    let text = err.to_string();
    assert!(text.contains("boom") && text.contains("bust"));
}

#[tokio::test]
async fn unknown_role_is_a_no_chain_error() {
    let (router, _) = router_with(vec!["mock/m-a"], vec![(
        "mock/m-a",
        ScriptedMockAdapter::always_text("x"),
    )]);
    let err = router
        .chat("no-such-role", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NoChain(_)));
}

#[tokio::test]
async fn update_chains_swaps_routing_at_runtime() {
    let (router, adapters) = router_with(
        vec!["mock/m-a"],
        vec![
            ("mock/m-a", ScriptedMockAdapter::always_text("from A")),
            ("mock/m-b", ScriptedMockAdapter::always_text("from B")),
        ],
    );

    let r1 = router
        .chat("thinking", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(r1.model_id, "mock/m-a");

    router.update_chains("thinking", vec!["mock/m-b".into()]);
    let r2 = router
        .chat("thinking", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(r2.model_id, "mock/m-b");
    assert_eq!(adapters["mock/m-b"].call_count(), 1);
}

#[tokio::test]
async fn success_records_usage_and_cost() {
    let (router, _) = router_with(vec!["mock/m-a"], vec![(
        "mock/m-a",
        ScriptedMockAdapter::always_text("ok"),
    )]);
    router
        .chat("thinking", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap();
    let totals = router.usage_totals();
    let u = totals.get("mock/m-a").expect("usage recorded");
    assert_eq!(u.calls, 1);
    assert!(u.prompt_tokens > 0);
    assert!(u.estimated_cost > 0.0);
}

#[tokio::test]
async fn legacy_single_model_map_supplies_a_chain() {
    let mut models = ModelsConfig::default();
    models
        .legacy
        .insert("fast".into(), "mock/m-a".to_string());
    let catalog = Catalog::from_entries(vec![entry("m-a")]);
    let mut map = HashMap::new();
    map.insert(
        "mock/m-a".to_string(),
        Arc::new(ScriptedMockAdapter::always_text("legacy ok")),
    );
    let factory = TestFactory {
        adapters: map,
    };
    let credentials = Arc::new(CredentialResolver::new(HashMap::new(), "default"));
    let router = ModelRouter::new(&models, catalog, credentials, Box::new(factory));

    let reply = router
        .chat("fast", &[Message::user("x")], &ChatOptions::default())
        .await
        .unwrap();
    assert_eq!(reply.message.content, "legacy ok");
}
