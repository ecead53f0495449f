//! Topic subscription engine
//!
//! Maintains the trie of client subscriptions and routes every published
//! message to the subscribers entitled to receive it, resolving QoS
//! downgrade, no-local, and retain-as-published per subscription before
//! handing each delivery to the outbound sink.
//!
//! The engine is an explicit context: it owns its root, counters, and
//! configuration, so multiple engines coexist in one process. Every
//! top-level operation takes the state lock once and runs to completion,
//! which makes operations atomic with respect to each other; collaborators
//! invoked from inside (ACL, sinks, persistence) must not call back into
//! the engine.

mod cache;
mod error;
mod matcher;
mod trie;


pub use error::EngineError;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::hooks::{Access, AclDecision, EngineHooks};
use crate::message::StoredMessage;
use crate::metrics::Metrics;
use crate::protocol::{ProtocolVersion, QoS, ReasonCode, SubscriptionOptions};
use crate::topic;

use cache::MatchCache;
use matcher::{match_publish, Delivery, MatchContext};
use trie::{Leaf, TrieNode};

/// Topic prefix for the per-filter subscriber-count retained messages
const SUBSCRIBED_TOPICS_PREFIX: &str = "$SYS/broker/subscribed_topics";

/// Identity of a subscribing client as the session layer sees it
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub id: Arc<str>,
    pub protocol_version: ProtocolVersion,
}

impl ClientInfo {
    pub fn new(id: impl Into<Arc<str>>, protocol_version: ProtocolVersion) -> Self {
        Self {
            id: id.into(),
            protocol_version,
        }
    }
}

/// One decoded SUBSCRIBE entry
#[derive(Debug, Clone)]
pub struct SubscribeSpec {
    /// Full filter text, including any `$share/<group>/` prefix
    pub filter: String,
    pub options: SubscriptionOptions,
    /// v5 subscription identifier (28-bit), 0 when absent
    pub identifier: u32,
}

impl SubscribeSpec {
    pub fn new(filter: impl Into<String>, options: SubscriptionOptions) -> Self {
        Self {
            filter: filter.into(),
            options,
            identifier: 0,
        }
    }

    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }
}

/// Result of a successful `sub_add`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// The subscription is new as far as the caller is concerned;
    /// retained-message replay applies
    Subscribed,
    /// An existing subscription was updated in place. Only surfaced to
    /// clients whose protocol elides retained replay on re-subscribe;
    /// v3.1.1 callers see `Subscribed` so the session layer replays.
    Updated,
}

/// Result of a successful `messages_queue`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Number of deliveries handed to the outbound sink
    Delivered(usize),
    /// No subscriber was entitled to the message
    NoSubscribers,
}

/// A live subscription as recorded in the client index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSubscription {
    pub filter: String,
    pub options: SubscriptionOptions,
    pub identifier: u32,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    options: SubscriptionOptions,
    identifier: u32,
}

/// Per-client subscription index, keyed by the full filter text as
/// subscribed (share prefix included). Authoritative enumeration for
/// session cleanup.
#[derive(Debug, Default)]
struct ClientIndex {
    entries: ahash::AHashMap<String, IndexEntry>,
}

#[derive(Default)]
struct EngineState {
    root: TrieNode,
    clients: ahash::AHashMap<Arc<str>, ClientIndex>,
    subscription_count: usize,
    shared_subscription_count: usize,
}

/// The subscription engine
pub struct SubscriptionEngine {
    state: RwLock<EngineState>,
    hooks: Arc<dyn EngineHooks>,
    config: EngineConfig,
    metrics: Option<Arc<Metrics>>,
    cache: MatchCache,
}

impl SubscriptionEngine {
    pub fn new(config: EngineConfig, hooks: Arc<dyn EngineHooks>) -> Self {
        let cache = MatchCache::new(config.match_cache_size);
        Self {
            state: RwLock::new(EngineState::default()),
            hooks,
            config,
            metrics: None,
            cache,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Add or update a subscription.
    pub fn sub_add(
        &self,
        client: &ClientInfo,
        spec: &SubscribeSpec,
    ) -> Result<SubscribeOutcome, EngineError> {
        let tokens = topic::tokenize_filter(&spec.filter).map_err(EngineError::InvalidTopic)?;
        if self.config.max_topic_levels > 0 && tokens.levels.len() > self.config.max_topic_levels {
            return Err(EngineError::InvalidTopic(
                "topic filter exceeds maximum allowed levels",
            ));
        }
        if tokens.is_shared() && !self.config.shared_subscriptions {
            return Err(EngineError::NotSupported("shared subscriptions are disabled"));
        }
        if tokens.has_wildcards() && !self.config.wildcard_subscriptions {
            return Err(EngineError::NotSupported(
                "wildcard subscriptions are disabled",
            ));
        }

        let mut guard = self.state.write();
        let state = &mut *guard;

        // The quota only applies to brand-new leaves; refusing before any
        // mutation keeps the rejection a clean no-op.
        let update_in_place = state
            .clients
            .get(&*client.id)
            .map_or(false, |index| index.entries.contains_key(&spec.filter));
        if !update_in_place
            && self.config.max_subscriptions > 0
            && state.subscription_count >= self.config.max_subscriptions
        {
            return Err(EngineError::OutOfMemory);
        }

        let leaf = Leaf {
            client_id: client.id.clone(),
            options: spec.options,
            identifier: spec.identifier,
        };
        let result = state.root.insert(&tokens.levels, tokens.share_group, leaf);

        let index = state.clients.entry(client.id.clone()).or_default();
        index.entries.insert(
            spec.filter.clone(),
            IndexEntry {
                options: spec.options,
                identifier: spec.identifier,
            },
        );

        if !result.existed {
            state.subscription_count += 1;
            if tokens.is_shared() {
                state.shared_subscription_count += 1;
            }
            if let Some(count) = result.normal_count {
                self.publish_sub_count(&tokens.levels, count);
            }
        }
        if let Some(metrics) = &self.metrics {
            metrics.subscribe_total.inc();
            metrics
                .subscriptions_current
                .set(state.subscription_count as i64);
            metrics
                .shared_subscriptions_current
                .set(state.shared_subscription_count as i64);
        }

        drop(guard);
        self.cache.invalidate();

        debug!(client = %client.id, filter = %spec.filter, updated = result.existed, "subscribe");

        if result.existed && client.protocol_version.elides_retained_replay() {
            Ok(SubscribeOutcome::Updated)
        } else {
            Ok(SubscribeOutcome::Subscribed)
        }
    }

    /// Remove one subscription. The returned reason code is `Success` when
    /// a leaf was removed and `NoSubscriptionExisted` otherwise.
    pub fn sub_remove(&self, client_id: &str, filter: &str) -> Result<ReasonCode, EngineError> {
        let tokens = topic::tokenize_filter(filter).map_err(EngineError::InvalidTopic)?;

        let mut guard = self.state.write();
        let state = &mut *guard;

        let result = state.root.remove(&tokens.levels, tokens.share_group, client_id);
        if result.removed.is_none() {
            return Ok(ReasonCode::NoSubscriptionExisted);
        }

        if let Some(index) = state.clients.get_mut(client_id) {
            index.entries.remove(filter);
        }
        state.subscription_count -= 1;
        if tokens.is_shared() {
            state.shared_subscription_count -= 1;
        }
        if let Some(count) = result.normal_count {
            self.publish_sub_count(&tokens.levels, count);
        }
        if let Some(metrics) = &self.metrics {
            metrics.unsubscribe_total.inc();
            metrics
                .subscriptions_current
                .set(state.subscription_count as i64);
            metrics
                .shared_subscriptions_current
                .set(state.shared_subscription_count as i64);
        }

        drop(guard);
        self.cache.invalidate();

        debug!(client = client_id, filter, "unsubscribe");
        Ok(ReasonCode::Success)
    }

    /// Route one publish to every entitled subscriber.
    ///
    /// `source_client_id` identifies the publishing client for no-local
    /// filtering; pass `None` for bridged or internally generated
    /// messages. With the retain flag set, the retained store is updated
    /// after matching regardless of the subscriber count.
    pub fn messages_queue(
        &self,
        source_client_id: Option<&str>,
        topic_name: &str,
        publish_qos: QoS,
        retain: bool,
        stored: &Arc<StoredMessage>,
    ) -> Result<PublishOutcome, EngineError> {
        let levels = topic::tokenize_publish(topic_name).map_err(EngineError::InvalidTopic)?;
        if self.config.max_topic_levels > 0 && levels.len() > self.config.max_topic_levels {
            return Err(EngineError::InvalidTopic(
                "topic name exceeds maximum allowed levels",
            ));
        }
        let system = topic_name.starts_with('$');

        if let Some(metrics) = &self.metrics {
            metrics.publishes_total.inc();
        }

        let mut sent: usize = 0;
        let mut failed: usize = 0;

        {
            let mut guard = self.state.write();
            let state = &mut *guard;

            let hooks = &self.hooks;
            let upgrade_qos = self.config.upgrade_outgoing_qos;
            let mut deliver = |leaf: &Leaf| -> Delivery {
                if leaf.options.no_local && source_client_id == Some(&*leaf.client_id) {
                    return Delivery::Skipped;
                }

                match hooks.acl_check(
                    &leaf.client_id,
                    topic_name,
                    &stored.payload,
                    publish_qos,
                    retain,
                    Access::Read,
                ) {
                    Ok(AclDecision::Allow) => {}
                    Ok(AclDecision::Deny) => {
                        trace!(client = %leaf.client_id, topic = topic_name, "delivery denied by acl");
                        return Delivery::Skipped;
                    }
                    Err(e) => {
                        warn!(client = %leaf.client_id, topic = topic_name, error = %e, "acl check failed");
                        failed += 1;
                        return Delivery::Failed;
                    }
                }

                let qos = if upgrade_qos {
                    leaf.options.qos
                } else {
                    publish_qos.min(leaf.options.qos)
                };
                let mid = if qos > QoS::AtMostOnce {
                    hooks.mid_generate(&leaf.client_id)
                } else {
                    0
                };
                let out_retain = leaf.options.retain_as_published && retain;

                match hooks.msg_enqueue_outgoing(
                    &leaf.client_id,
                    mid,
                    qos,
                    out_retain,
                    stored,
                    leaf.identifier,
                ) {
                    Ok(()) => {
                        trace!(client = %leaf.client_id, topic = topic_name, %qos, "delivery enqueued");
                        sent += 1;
                        Delivery::Sent
                    }
                    Err(e) => {
                        warn!(client = %leaf.client_id, topic = topic_name, error = %e, "enqueue failed");
                        failed += 1;
                        Delivery::Failed
                    }
                }
            };

            if let Some(cached) = self.cache.lookup(topic_name) {
                if let Some(metrics) = &self.metrics {
                    metrics.match_cache_hits.inc();
                }
                for leaf in &cached {
                    deliver(leaf);
                }
            } else {
                let generation = self.cache.generation();
                let want_cache = self.cache.enabled();
                let mut snapshot: SmallVec<[Leaf; 8]> = SmallVec::new();
                let mut ctx = MatchContext {
                    deliver: &mut deliver,
                    rotate_on_denied: self.config.shared_rotation_on_denied,
                    snapshot: if want_cache { Some(&mut snapshot) } else { None },
                    had_shared: false,
                };
                match_publish(&mut state.root, &levels, system, &mut ctx);
                let had_shared = ctx.had_shared;
                if want_cache && !had_shared {
                    self.cache.store(topic_name, snapshot, generation);
                }
            }
        }

        if retain {
            if let Err(e) = self.hooks.retain_store(topic_name, stored, &levels, true) {
                warn!(topic = topic_name, error = %e, "retained store update failed");
                return Err(EngineError::Downstream);
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.deliveries_total.inc_by(sent as u64);
            metrics.delivery_failures_total.inc_by(failed as u64);
        }

        if sent == 0 && failed > 0 {
            return Err(EngineError::Downstream);
        }
        if sent == 0 {
            return Ok(PublishOutcome::NoSubscribers);
        }
        Ok(PublishOutcome::Delivered(sent))
    }

    /// Drop every subscription of a departing client. Idempotent: cleaning
    /// an unknown client is a no-op.
    pub fn clean_session(&self, client_id: &str) {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let Some(index) = state.clients.remove(client_id) else {
            return;
        };

        let mut dropped = 0usize;
        for (filter, _) in index.entries {
            // the index only ever holds filters that tokenized on the way in
            let Ok(tokens) = topic::tokenize_filter(&filter) else {
                continue;
            };
            let result = state.root.remove(&tokens.levels, tokens.share_group, client_id);
            if result.removed.is_some() {
                state.subscription_count -= 1;
                if tokens.is_shared() {
                    state.shared_subscription_count -= 1;
                }
                dropped += 1;
                self.hooks.subscription_deleted(client_id, &filter);
                if let Some(count) = result.normal_count {
                    self.publish_sub_count(&tokens.levels, count);
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics
                .subscriptions_current
                .set(state.subscription_count as i64);
            metrics
                .shared_subscriptions_current
                .set(state.shared_subscription_count as i64);
        }

        drop(guard);
        if dropped > 0 {
            self.cache.invalidate();
        }

        debug!(client = client_id, dropped, "session cleaned");
    }

    /// Live subscriptions of one client, as recorded in its index.
    pub fn subscriptions_of(&self, client_id: &str) -> Vec<ClientSubscription> {
        let state = self.state.read();
        state
            .clients
            .get(client_id)
            .map(|index| {
                index
                    .entries
                    .iter()
                    .map(|(filter, entry)| ClientSubscription {
                        filter: filter.clone(),
                        options: entry.options,
                        identifier: entry.identifier,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total live subscriptions (normal and shared)
    pub fn subscription_count(&self) -> usize {
        self.state.read().subscription_count
    }

    /// Live shared subscriptions
    pub fn shared_subscription_count(&self) -> usize {
        self.state.read().shared_subscription_count
    }

    /// Publish the per-filter subscriber count as a retained
    /// `$SYS/broker/subscribed_topics/<path>` message; an emptied node
    /// expires the retained entry with an empty payload.
    fn publish_sub_count(&self, filter_levels: &[&str], count: usize) {
        if !self.config.publish_sub_counts {
            return;
        }

        let mut sys_topic = String::with_capacity(
            SUBSCRIBED_TOPICS_PREFIX.len()
                + filter_levels.iter().map(|l| l.len() + 1).sum::<usize>(),
        );
        sys_topic.push_str(SUBSCRIBED_TOPICS_PREFIX);
        for level in filter_levels {
            sys_topic.push('/');
            sys_topic.push_str(level);
        }

        let payload = if count == 0 {
            Bytes::new()
        } else {
            Bytes::from(count.to_string())
        };
        let msg = StoredMessage::new(sys_topic.as_str(), payload, QoS::AtMostOnce, true);
        let levels: SmallVec<[&str; 8]> = sys_topic.split('/').collect();
        if let Err(e) = self.hooks.retain_store(&sys_topic, &msg, &levels, true) {
            warn!(topic = %sys_topic, error = %e, "subscribed-topics count update failed");
        }
    }

    /// Structural self-check used by the test suite.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let state = self.state.read();
        state.root.assert_structure();

        let mut seen: Vec<(String, String)> = Vec::new();
        state.root.for_each_leaf(&mut |path, group, leaf| {
            let effective = path.join("/");
            let full = match group {
                Some(name) => format!("$share/{}/{}", name, effective),
                None => effective,
            };
            seen.push((leaf.client_id.to_string(), full));
        });

        assert_eq!(seen.len(), state.subscription_count, "count drift");

        for (client, filter) in &seen {
            let index = state
                .clients
                .get(client.as_str())
                .unwrap_or_else(|| panic!("no index for client {}", client));
            assert!(
                index.entries.contains_key(filter.as_str()),
                "trie leaf {} missing from {}'s index",
                filter,
                client
            );
        }

        let mut indexed = 0usize;
        for (client, index) in &state.clients {
            for filter in index.entries.keys() {
                indexed += 1;
                assert!(
                    seen.iter().any(|(c, f)| c == &**client && f == filter),
                    "index entry {} of {} missing from trie",
                    filter,
                    client
                );
            }
        }
        assert_eq!(indexed, seen.len(), "index/trie leaf count mismatch");
    }
}
