#![allow(dead_code)]

//! Test collaborators shared by the integration suites
//!
//! A recording implementation of the engine hooks: deliveries, retained
//! updates, and persistence notifications land in plain vectors the tests
//! inspect, and per-client packet identifiers count up from 1.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use routemq::{
    Access, AclDecision, EngineHooks, HookError, HookResult, QoS, StoredMessage,
};

/// Install a test-friendly subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One delivery handed to the outbound sink
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub client_id: String,
    pub mid: u16,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub payload: Vec<u8>,
    pub identifier: u32,
}

/// One retained-store update
#[derive(Debug, Clone)]
pub struct Retained {
    pub topic: String,
    pub payload: Vec<u8>,
    pub levels: Vec<String>,
}

#[derive(Default)]
pub struct RecordingHooks {
    pub enqueued: Mutex<Vec<Enqueued>>,
    pub retained: Mutex<Vec<Retained>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    /// Clients whose deliveries the ACL denies
    pub denied: Mutex<HashSet<String>>,
    /// Clients whose ACL check errors out
    pub acl_errors: Mutex<HashSet<String>>,
    /// Clients whose enqueue fails
    pub enqueue_errors: Mutex<HashSet<String>>,
    next_mid: AtomicU16,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        init_tracing();
        Arc::new(Self {
            next_mid: AtomicU16::new(1),
            ..Self::default()
        })
    }

    pub fn deny(&self, client_id: &str) {
        self.denied.lock().insert(client_id.to_string());
    }

    pub fn fail_acl(&self, client_id: &str) {
        self.acl_errors.lock().insert(client_id.to_string());
    }

    pub fn fail_enqueue(&self, client_id: &str) {
        self.enqueue_errors.lock().insert(client_id.to_string());
    }

    pub fn deliveries(&self) -> Vec<Enqueued> {
        self.enqueued.lock().clone()
    }

    pub fn deliveries_to(&self, client_id: &str) -> Vec<Enqueued> {
        self.enqueued
            .lock()
            .iter()
            .filter(|e| e.client_id == client_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.enqueued.lock().clear();
        self.retained.lock().clear();
        self.deleted.lock().clear();
    }
}

impl EngineHooks for RecordingHooks {
    fn acl_check(
        &self,
        client_id: &str,
        _topic: &str,
        _payload: &[u8],
        _qos: QoS,
        _retain: bool,
        _access: Access,
    ) -> HookResult<AclDecision> {
        if self.acl_errors.lock().contains(client_id) {
            return Err(HookError::Internal("acl backend down".to_string()));
        }
        if self.denied.lock().contains(client_id) {
            return Ok(AclDecision::Deny);
        }
        Ok(AclDecision::Allow)
    }

    fn mid_generate(&self, _client_id: &str) -> u16 {
        // wraps long before a test needs it to
        self.next_mid.fetch_add(1, Ordering::SeqCst).max(1)
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
        if self.enqueue_errors.lock().contains(client_id) {
            return Err(HookError::QueueFull);
        }
        self.enqueued.lock().push(Enqueued {
            client_id: client_id.to_string(),
            mid,
            qos,
            retain,
            topic: msg.topic.to_string(),
            payload: msg.payload.to_vec(),
            identifier,
        });
        Ok(())
    }

    fn retain_store(
        &self,
        topic: &str,
        msg: &Arc<StoredMessage>,
        levels: &[&str],
        _replace: bool,
    ) -> HookResult<()> {
        self.retained.lock().push(Retained {
            topic: topic.to_string(),
            payload: msg.payload.to_vec(),
            levels: levels.iter().map(|l| l.to_string()).collect(),
        });
        Ok(())
    }

    fn subscription_deleted(&self, client_id: &str, filter: &str) {
        self.deleted
            .lock()
            .push((client_id.to_string(), filter.to_string()));
    }
}
