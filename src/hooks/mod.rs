//! Engine hooks
//!
//! The collaborators the subscription engine depends on: access control,
//! packet-id generation, the outbound queue, the retained-message store,
//! and subscription persistence. The session/transport layer implements
//! this trait once and hands it to every engine it creates.
//!
//! All methods are synchronous and run inside the engine's critical
//! section: implementations must not block and must not call back into the
//! engine.

use std::fmt;
use std::sync::Arc;

use crate::message::StoredMessage;
use crate::protocol::QoS;


/// Hook error types
#[derive(Debug)]
pub enum HookError {
    /// Internal error
    Internal(String),
    /// Downstream queue rejected the delivery
    QueueFull,
    /// Retained store failure
    RetainStore(String),
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Internal(msg) => write!(f, "Internal error: {}", msg),
            HookError::QueueFull => write!(f, "Outbound queue full"),
            HookError::RetainStore(msg) => write!(f, "Retained store error: {}", msg),
        }
    }
}

impl std::error::Error for HookError {}

/// Hook result type
pub type HookResult<T> = Result<T, HookError>;

/// Kind of access an ACL check authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Receiving a message on a topic
    Read,
    /// Publishing a message to a topic
    Write,
}

/// Outcome of an ACL check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    /// Delivery proceeds
    Allow,
    /// Delivery is skipped silently
    Deny,
}

/// Engine collaborator trait
///
/// All methods have default implementations that allow everything and
/// discard deliveries, so tests and minimal embeddings only override what
/// they observe.
pub trait EngineHooks: Send + Sync {
    /// Authorization check run once per candidate delivery (and by the
    /// caller before accepting a publish).
    ///
    /// # Returns
    /// * `Ok(AclDecision::Allow)` - delivery proceeds
    /// * `Ok(AclDecision::Deny)` - subscriber is skipped silently
    /// * `Err(_)` - counted as a failed delivery, other subscribers proceed
    fn acl_check(
        &self,
        _client_id: &str,
        _topic: &str,
        _payload: &[u8],
        _qos: QoS,
        _retain: bool,
        _access: Access,
    ) -> HookResult<AclDecision> {
        Ok(AclDecision::Allow)
    }

    /// Allocate a packet identifier for a QoS 1/2 delivery to `client_id`.
    /// Must be non-zero; the engine passes 0 itself for QoS 0 deliveries.
    fn mid_generate(&self, _client_id: &str) -> u16 {
        1
    }

    /// Hand one resolved delivery to the outbound queue. Must not block.
    ///
    /// `identifier` is the v5 subscription identifier, 0 when absent.
    fn msg_enqueue_outgoing(
        &self,
        _client_id: &str,
        _mid: u16,
        _qos: QoS,
        _retain: bool,
        _msg: &Arc<StoredMessage>,
        _identifier: u32,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Store (or, for an empty payload, expire) the retained message for a
    /// topic. `levels` is the tokenized topic so stores indexing by level
    /// don't re-split.
    fn retain_store(
        &self,
        _topic: &str,
        _msg: &Arc<StoredMessage>,
        _levels: &[&str],
        _replace: bool,
    ) -> HookResult<()> {
        Ok(())
    }

    /// Persistence notification fired when session cleanup drops a
    /// subscription.
    fn subscription_deleted(&self, _client_id: &str, _filter: &str) {}
}

/// Default hooks implementation that allows everything
pub struct DefaultHooks;

impl EngineHooks for DefaultHooks {
    // All methods use default implementations (allow all, discard)
}

impl Default for DefaultHooks {
    fn default() -> Self {
        Self
    }
}

/// Implement EngineHooks for Arc<T> where T: EngineHooks
/// This allows Arc-wrapped collaborators to be used directly
impl<T: EngineHooks + ?Sized> EngineHooks for Arc<T> {
    fn acl_check(
        &self,
        client_id: &str,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        access: Access,
    ) -> HookResult<AclDecision> {
        (**self).acl_check(client_id, topic, payload, qos, retain, access)
    }

    fn mid_generate(&self, client_id: &str) -> u16 {
        (**self).mid_generate(client_id)
    }

    fn msg_enqueue_outgoing(
        &self,
        client_id: &str,
        mid: u16,
        qos: QoS,
        retain: bool,
        msg: &Arc<StoredMessage>,
        identifier: u32,
    ) -> HookResult<()> {
        (**self).msg_enqueue_outgoing(client_id, mid, qos, retain, msg, identifier)
    }

    fn retain_store(
        &self,
        topic: &str,
        msg: &Arc<StoredMessage>,
        levels: &[&str],
        replace: bool,
    ) -> HookResult<()> {
        (**self).retain_store(topic, msg, levels, replace)
    }

    fn subscription_deleted(&self, client_id: &str, filter: &str) {
        (**self).subscription_deleted(client_id, filter)
    }
}
