use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use parley_core::{ApplicationError, InterfaceError, TokenCodec};
use tracing::{debug, info, warn};

use crate::blocks::{error_message, MessageTemplate};
use crate::events::{
    DispatchError, EventContext, EventDispatcher, EventHandlerError, HandlerResult,
    InteractionEnvelope,
};
use crate::surface::{NoopSurface, RenderTarget, Surface, SurfaceSpec, TransportError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound half of the platform contract.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<InteractionEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopEventSource;

#[async_trait]
impl EventSource for NoopEventSource {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<InteractionEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub struct GatewayRunner {
    source: Arc<dyn EventSource>,
    dispatcher: EventDispatcher,
    surface: Arc<dyn Surface>,
    reconnect_policy: ReconnectPolicy,
}

impl Default for GatewayRunner {
    fn default() -> Self {
        Self {
            source: Arc::new(NoopEventSource),
            dispatcher: EventDispatcher::default(),
            surface: Arc::new(NoopSurface),
            reconnect_policy: ReconnectPolicy::default(),
        }
    }
}

impl GatewayRunner {
    pub fn new(
        source: Arc<dyn EventSource>,
        dispatcher: EventDispatcher,
        surface: Arc<dyn Surface>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, dispatcher, surface, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway connection");
        self.source.connect().await?;
        info!(attempt, "gateway connected");

        loop {
            let Some(envelope) = self.source.next_envelope().await? else {
                info!(attempt, "gateway stream closed");
                self.source.disconnect().await?;
                return Ok(());
            };
            let (user_id, namespace) = correlation_fields(&envelope);

            info!(
                event_name = "ingress.gateway.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = user_id.unwrap_or("unknown"),
                namespace = namespace.as_deref().unwrap_or("none"),
                "received gateway envelope"
            );

            if let Err(error) = self.source.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge gateway envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged gateway envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Responded(message)) => {
                    self.reply(&envelope, &context, message).await;
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        user_id = user_id.unwrap_or("unknown"),
                        namespace = namespace.as_deref().unwrap_or("none"),
                        error = %error,
                        "event dispatch failed; continuing gateway loop"
                    );
                    let interface = interface_error(error, &context.correlation_id);
                    let message =
                        error_message(interface.user_message(), interface.correlation_id());
                    self.reply(&envelope, &context, message).await;
                }
            }
        }
    }

    async fn reply(
        &self,
        envelope: &InteractionEnvelope,
        context: &EventContext,
        message: MessageTemplate,
    ) {
        let Some(interaction) = envelope.event.interaction_ref() else {
            return;
        };
        let target = RenderTarget { interaction: &interaction, acknowledged: false, surface: None };
        if let Err(error) = self.surface.render(target, SurfaceSpec::Message(message)).await {
            warn!(
                event_name = "egress.gateway.reply_failed",
                correlation_id = %context.correlation_id,
                error = %error,
                "failed to send handler reply"
            );
        }
    }
}

/// Maps a handler failure to what the user is told; engine detail stays in
/// the logs.
fn interface_error(error: DispatchError, correlation_id: &str) -> InterfaceError {
    let application = match error {
        DispatchError::Handler(EventHandlerError::Engine(error)) => ApplicationError::Engine(error),
        DispatchError::Handler(error) => ApplicationError::Integration(error.to_string()),
        DispatchError::DuplicateRoute(route) => {
            ApplicationError::Configuration(format!("{route} already has a handler"))
        }
    };
    application.into_interface(correlation_id)
}

fn correlation_fields(envelope: &InteractionEnvelope) -> (Option<&str>, Option<String>) {
    let user_id = envelope.event.meta().map(|meta| meta.user_id.as_str());
    let namespace = envelope
        .event
        .custom_id()
        .and_then(|custom_id| TokenCodec.decode(custom_id).ok())
        .map(|(namespace, _)| namespace.as_str().to_owned());
    (user_id, namespace)
}
