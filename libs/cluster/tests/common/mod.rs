//! Shared fixtures for cluster integration tests
#![allow(dead_code)]

use cluster::{
    ActorFactory, ActorType, ClusterConfig, ClusterTimings, EnvelopeRouter, Envelope, LocalRuntime,
    Message, MessageTypeId, SystemConfig, SystemId,
};
use network::TcpAcceptor;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const APP_ACTOR: ActorType = ActorType(120);
pub const GREETING: MessageTypeId = MessageTypeId(1);

/// Initialize tracing for tests (call once per test)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Greeting {
    pub text: String,
}

impl Message for Greeting {
    fn message_type(&self) -> Option<MessageTypeId> {
        Some(GREETING)
    }
}

/// Local runtime that forwards every delivery to a channel
pub struct ChannelRuntime {
    delivered: mpsc::UnboundedSender<Envelope>,
    pub actor_types: Mutex<Vec<ActorType>>,
    pub router: Mutex<Option<Arc<dyn EnvelopeRouter>>>,
}

impl ChannelRuntime {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                delivered: tx,
                actor_types: Mutex::new(Vec::new()),
                router: Mutex::new(None),
            }),
            rx,
        )
    }
}

impl LocalRuntime for ChannelRuntime {
    fn local_route(&self, envelope: Envelope) {
        let _ = self.delivered.send(envelope);
    }

    fn register_actor_type(&self, actor_type: ActorType, _factory: ActorFactory) {
        self.actor_types.lock().push(actor_type);
    }

    fn install_router(&self, router: Arc<dyn EnvelopeRouter>) {
        *self.router.lock() = Some(router);
    }
}

pub fn fast_timings() -> ClusterTimings {
    ClusterTimings {
        reconnect_interval_ms: 50,
        startup_poll_interval_ms: 20,
        watch_proxy_idle_ms: 100,
        connect_timeout_ms: 1_000,
        ..ClusterTimings::default()
    }
}

/// Bind loopback listeners for every member that accepts links.
///
/// The last member never listens, so it gets no acceptor and port 0.
pub async fn bind_members(count: u32) -> (Vec<SystemConfig>, Vec<Option<TcpAcceptor>>) {
    let mut systems = Vec::new();
    let mut acceptors = Vec::new();
    for id in 1..=count {
        if id < count {
            let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
            let port = acceptor.local_addr().unwrap().port();
            systems.push(SystemConfig::new(SystemId(id), "127.0.0.1", port, vec![APP_ACTOR]));
            acceptors.push(Some(acceptor));
        } else {
            systems.push(SystemConfig::new(SystemId(id), "127.0.0.1", 0, vec![APP_ACTOR]));
            acceptors.push(None);
        }
    }
    (systems, acceptors)
}

pub fn member_config(local: u32, systems: &[SystemConfig]) -> ClusterConfig {
    ClusterConfig::new(SystemId(local), systems.to_vec()).with_timings(fast_timings())
}

/// Poll `condition` until it holds or `limit` elapses
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Next delivered envelope, failing the test after two seconds
pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Envelope {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("runtime channel closed")
}
