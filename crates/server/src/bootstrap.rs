use std::sync::Arc;

use parley_core::config::{AppConfig, ConfigError, LoadOptions};
use parley_core::{CodecError, NamespaceSet};
use parley_interaction::events::{CancelCommandHandler, DispatchError, EventDispatcher};
use parley_interaction::socket::{GatewayRunner, NoopEventSource, ReconnectPolicy};
use parley_interaction::surface::{NoopSurface, Surface};
use parley_interaction::{DialogueEngine, EngineConfig};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::workflows::{
    GroupAdjustment, GroupAdjustmentEntry, InMemoryLedger, RoleOption, StaticRoleDirectory,
    GROUP_ADJUSTMENT_NAMESPACE,
};

pub const CANCEL_COMMAND: &str = "cancel";

pub struct Application {
    pub config: AppConfig,
    pub engine: DialogueEngine,
    pub runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("namespace registration failed: {0}")]
    Namespace(#[from] CodecError),
    #[error("handler registration failed: {0}")]
    Dispatch(#[from] DispatchError),
}

#[allow(dead_code)]
pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let surface: Arc<dyn Surface> = Arc::new(NoopSurface);
    let engine = DialogueEngine::new(EngineConfig::from(&config.dialogue), surface.clone());

    let mut namespaces = NamespaceSet::new();
    let group_namespace = namespaces.register(GROUP_ADJUSTMENT_NAMESPACE)?;

    let mut dispatcher = EventDispatcher::with_registry(engine.registry().clone());
    dispatcher.register(GroupAdjustmentEntry::new(GroupAdjustment {
        engine: engine.clone(),
        namespace: group_namespace,
        roles: Arc::new(StaticRoleDirectory::new(vec![RoleOption::new(
            "everyone",
            "Everyone",
            Decimal::ONE,
        )])),
        ledger: Arc::new(InMemoryLedger::default()),
    }))?;
    dispatcher.register(CancelCommandHandler::new(CANCEL_COMMAND, engine.registry().clone()))?;

    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        namespaces = namespaces.len(),
        handlers = dispatcher.handler_count(),
        "interaction handlers registered"
    );

    let runner = GatewayRunner::new(
        Arc::new(NoopEventSource),
        dispatcher,
        surface,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, engine, runner })
}
