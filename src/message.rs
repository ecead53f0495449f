//! Stored message shared across a routing pass

use std::sync::Arc;

use bytes::Bytes;

use crate::protocol::QoS;

/// A publish payload pinned for the duration of one routing pass.
///
/// The engine never copies the payload: every delivery and the retained
/// store receive clones of the same `Arc<StoredMessage>`, which keeps the
/// bytes alive until the last outbound queue drops its reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Topic the message was published to
    pub topic: Arc<str>,
    /// Application payload
    pub payload: Bytes,
    /// QoS the publisher sent with
    pub qos: QoS,
    /// Retain flag as published
    pub retain: bool,
}

impl StoredMessage {
    pub fn new(topic: impl Into<Arc<str>>, payload: Bytes, qos: QoS, retain: bool) -> Arc<Self> {
        Arc::new(Self {
            topic: topic.into(),
            payload,
            qos,
            retain,
        })
    }
}
