//! RouteMQ - MQTT topic subscription and message routing engine
//!
//! The subscription core of an MQTT v3.1.1/v5.0 broker: a hierarchical
//! topic trie with `+`/`#` wildcards and `$share` groups, publish-time
//! subscriber matching, and per-delivery option resolution (QoS downgrade,
//! no-local, retain-as-published). Transport, wire codecs, session
//! persistence, and the retained store live in the layers around it and
//! plug in through [`hooks::EngineHooks`].

pub mod config;
pub mod engine;
pub mod hooks;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod topic;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    ClientInfo, ClientSubscription, EngineError, PublishOutcome, SubscribeOutcome, SubscribeSpec,
    SubscriptionEngine,
};
pub use hooks::{Access, AclDecision, DefaultHooks, EngineHooks, HookError, HookResult};
pub use message::StoredMessage;
pub use metrics::Metrics;
pub use protocol::{ProtocolVersion, QoS, ReasonCode, RetainHandling, SubscriptionOptions};
