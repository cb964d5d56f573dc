//! Cluster System
//!
//! Wires the message registry, codec, transport, router and proxy actors
//! into a local runtime. Construct it, register message and actor types,
//! then call [`ClusterSystem::start`].

use crate::codec::EnvelopeCodec;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::message::{Message, MessageRegistry};
use crate::placement::Placement;
use crate::proxy::{RequestProxy, WatchProxy};
use crate::router::Router;
use crate::runtime::{Actor, ActorFactory, EnvelopeRouter, LocalRuntime};
use crate::transport::ClusterTransport;
use crate::types::{ActorType, MessageTypeId, SystemId};
use network::{Connector, TcpAcceptor, TcpConfig, TcpConnector};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

pub struct ClusterSystem {
    config: ClusterConfig,
    registry: Arc<MessageRegistry>,
    placement: Arc<Placement>,
    transport: Arc<ClusterTransport>,
    router: Arc<Router>,
    runtime: Arc<dyn LocalRuntime>,
}

impl ClusterSystem {
    /// Build a system that dials peers over TCP
    pub fn new(config: ClusterConfig, runtime: Arc<dyn LocalRuntime>) -> Result<Self> {
        let connector = TcpConnector::new(TcpConfig {
            connect_timeout: config.timings.connect_timeout(),
            ..TcpConfig::default()
        });
        Self::with_connector(config, runtime, Arc::new(connector))
    }

    pub fn with_connector(
        config: ClusterConfig,
        runtime: Arc<dyn LocalRuntime>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(MessageRegistry::new());
        let placement = Arc::new(Placement::from_config(&config));
        let transport = Arc::new(ClusterTransport::new(
            &config,
            EnvelopeCodec::new(Arc::clone(&registry)),
            Arc::clone(&runtime),
            connector,
        )?);
        let router = Arc::new(Router::new(
            config.local_system_id,
            Arc::clone(&placement),
            Arc::clone(&runtime),
            transport.clone(),
        ));

        let watch_placement = Arc::clone(&placement);
        let idle_grace = config.timings.watch_proxy_idle();
        runtime.register_actor_type(
            ActorType::WATCH_PROXY,
            Arc::new(move || Box::new(WatchProxy::new(Arc::clone(&watch_placement), idle_grace)) as Box<dyn Actor>),
        );
        runtime.register_actor_type(
            ActorType::REQUEST_PROXY,
            Arc::new(|| Box::new(RequestProxy::new()) as Box<dyn Actor>),
        );
        runtime.install_router(router.clone());

        info!(
            system_id = %config.local_system_id,
            members = config.member_count(),
            "Cluster system created"
        );

        Ok(Self {
            config,
            registry,
            placement,
            transport,
            router,
            runtime,
        })
    }

    /// Register an application actor type.
    ///
    /// # Panics
    ///
    /// Panics if `actor_type` lies in the range reserved for the runtime and
    /// the cluster proxies.
    pub fn register_actor_type(&self, actor_type: ActorType, factory: ActorFactory) {
        assert!(
            !actor_type.is_reserved(),
            "actor type {} is below {}",
            actor_type,
            ActorType::USER_START
        );
        self.runtime.register_actor_type(actor_type, factory);
    }

    /// Make `T` transportable under `type_id`
    pub fn register_message_type<T>(&self, type_id: MessageTypeId)
    where
        T: Message + Serialize + DeserializeOwned + 'static,
    {
        self.registry.register::<T>(type_id);
    }

    /// Bring up every peer link; returns once the whole cluster is connected
    pub async fn start(&self) -> Result<()> {
        self.transport.start().await
    }

    pub async fn start_with_listener(&self, acceptor: Option<TcpAcceptor>) -> Result<()> {
        self.transport.start_with_listener(acceptor).await
    }

    pub fn local_system_id(&self) -> SystemId {
        self.config.local_system_id
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    pub fn placement(&self) -> &Arc<Placement> {
        &self.placement
    }

    pub fn transport(&self) -> &Arc<ClusterTransport> {
        &self.transport
    }

    pub fn router(&self) -> Arc<dyn EnvelopeRouter> {
        self.router.clone()
    }
}
