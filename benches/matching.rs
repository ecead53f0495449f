//! Subscribe and match throughput benchmarks

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;

use routemq::{
    ClientInfo, DefaultHooks, EngineConfig, ProtocolVersion, QoS, StoredMessage, SubscribeSpec,
    SubscriptionEngine, SubscriptionOptions,
};

const DEVICES: usize = 1_000;

fn populated_engine(config: EngineConfig) -> SubscriptionEngine {
    let engine = SubscriptionEngine::new(config, Arc::new(DefaultHooks));
    for i in 0..DEVICES {
        let client = ClientInfo::new(format!("device{}", i), ProtocolVersion::V5);
        engine
            .sub_add(
                &client,
                &SubscribeSpec::new(
                    format!("sensors/device{}/temp", i),
                    SubscriptionOptions::default(),
                ),
            )
            .unwrap();
        if i % 10 == 0 {
            engine
                .sub_add(
                    &client,
                    &SubscribeSpec::new(
                        format!("sensors/device{}/#", i),
                        SubscriptionOptions::default(),
                    ),
                )
                .unwrap();
        }
    }
    // a handful of broad wildcard listeners
    let monitor = ClientInfo::new("monitor", ProtocolVersion::V5);
    engine
        .sub_add(
            &monitor,
            &SubscribeSpec::new("sensors/+/temp", SubscriptionOptions::default()),
        )
        .unwrap();
    engine
}

fn bench_match(c: &mut Criterion) {
    let uncached = populated_engine(EngineConfig {
        match_cache_size: 0,
        ..EngineConfig::default()
    });
    let cached = populated_engine(EngineConfig::default());
    let msg = StoredMessage::new(
        "sensors/device500/temp",
        Bytes::from_static(b"21.5"),
        QoS::AtMostOnce,
        false,
    );

    c.bench_function("match_trie_descent", |b| {
        b.iter(|| {
            uncached
                .messages_queue(
                    None,
                    black_box("sensors/device500/temp"),
                    QoS::AtMostOnce,
                    false,
                    &msg,
                )
                .unwrap()
        })
    });

    c.bench_function("match_cached", |b| {
        b.iter(|| {
            cached
                .messages_queue(
                    None,
                    black_box("sensors/device500/temp"),
                    QoS::AtMostOnce,
                    false,
                    &msg,
                )
                .unwrap()
        })
    });

    c.bench_function("match_random_topic", |b| {
        let mut rng = rand::thread_rng();
        b.iter(|| {
            let topic = format!("sensors/device{}/temp", rng.gen_range(0..DEVICES));
            let msg = StoredMessage::new(topic.as_str(), Bytes::new(), QoS::AtMostOnce, false);
            uncached
                .messages_queue(None, &topic, QoS::AtMostOnce, false, &msg)
                .unwrap()
        })
    });
}

fn bench_subscribe_churn(c: &mut Criterion) {
    let engine = SubscriptionEngine::new(EngineConfig::default(), Arc::new(DefaultHooks));
    let client = ClientInfo::new("churn", ProtocolVersion::V5);

    c.bench_function("subscribe_unsubscribe", |b| {
        b.iter(|| {
            engine
                .sub_add(
                    &client,
                    &SubscribeSpec::new("a/b/c/d/e", SubscriptionOptions::default()),
                )
                .unwrap();
            engine.sub_remove("churn", "a/b/c/d/e").unwrap()
        })
    });
}

criterion_group!(benches, bench_match, bench_subscribe_churn);
criterion_main!(benches);
