//! Property tests for the matcher and tokenizer
//!
//! The standalone `topic_matches_filter` oracle and the trie-based engine
//! must agree on every (topic, filter) pair, and structural operations
//! must round-trip cleanly.

mod common;

use std::collections::HashSet;

use bytes::Bytes;
use proptest::prelude::*;

use common::RecordingHooks;
use routemq::topic::{tokenize_filter, topic_matches_filter};
use routemq::{
    ClientInfo, EngineConfig, ProtocolVersion, QoS, ReasonCode, StoredMessage, SubscribeSpec,
    SubscriptionEngine, SubscriptionOptions,
};

fn topic_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "dd"]), 1..=4)
        .prop_map(|levels| levels.join("/"))
}

fn filter_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "dd", "+"]), 1..=4),
        prop::bool::ANY,
    )
        .prop_map(|(levels, trailing_hash)| {
            let mut filter = levels.join("/");
            if trailing_hash {
                filter.push_str("/#");
            }
            filter
        })
}

proptest! {
    #[test]
    fn trie_matcher_agrees_with_oracle(
        topic in topic_strategy(),
        filters in prop::collection::vec(filter_strategy(), 1..8),
    ) {
        let hooks = RecordingHooks::new();
        let engine = SubscriptionEngine::new(EngineConfig::default(), hooks.clone());

        for (i, filter) in filters.iter().enumerate() {
            let client = ClientInfo::new(format!("c{}", i), ProtocolVersion::V5);
            engine
                .sub_add(
                    &client,
                    &SubscribeSpec::new(filter.clone(), SubscriptionOptions::default()),
                )
                .unwrap();
        }

        let msg = StoredMessage::new(
            topic.as_str(),
            Bytes::from_static(b"p"),
            QoS::AtMostOnce,
            false,
        );
        engine
            .messages_queue(None, &topic, QoS::AtMostOnce, false, &msg)
            .unwrap();

        let got: Vec<String> = hooks
            .deliveries()
            .iter()
            .map(|e| e.client_id.clone())
            .collect();
        let want: HashSet<String> = filters
            .iter()
            .enumerate()
            .filter(|(_, filter)| topic_matches_filter(&topic, filter))
            .map(|(i, _)| format!("c{}", i))
            .collect();

        // every expected client exactly once, nobody else
        prop_assert_eq!(got.len(), want.len());
        let got_set: HashSet<String> = got.into_iter().collect();
        prop_assert_eq!(got_set, want);
    }

    #[test]
    fn subscribe_unsubscribe_roundtrip(
        filters in prop::collection::vec(filter_strategy(), 1..8),
    ) {
        let hooks = RecordingHooks::new();
        let engine = SubscriptionEngine::new(EngineConfig::default(), hooks.clone());
        let client = ClientInfo::new("c0", ProtocolVersion::V5);

        let unique: HashSet<String> = filters.into_iter().collect();
        for filter in &unique {
            engine
                .sub_add(
                    &client,
                    &SubscribeSpec::new(filter.clone(), SubscriptionOptions::default()),
                )
                .unwrap();
        }
        prop_assert_eq!(engine.subscription_count(), unique.len());

        for filter in &unique {
            prop_assert_eq!(
                engine.sub_remove("c0", filter).unwrap(),
                ReasonCode::Success
            );
        }
        prop_assert_eq!(engine.subscription_count(), 0);
        prop_assert!(engine.subscriptions_of("c0").is_empty());
    }

    #[test]
    fn tokenizer_never_panics_and_roundtrips(input in "[a-c+#/$]{0,12}") {
        if let Ok(tokens) = tokenize_filter(&input) {
            if tokens.share_group.is_none() {
                prop_assert_eq!(tokens.levels.join("/"), input.as_str());
            }
        }
    }
}
