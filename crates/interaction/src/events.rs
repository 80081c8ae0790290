use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parley_core::{is_scoped_variant, EngineError, Namespace, RawResponse, TokenCodec};
use thiserror::Error;
use tracing::debug;

use crate::{
    blocks::{error_message, notice_message, MessageTemplate},
    registry::{InboundResponse, PendingWaitRegistry, ResolveOutcome},
    session::SessionContext,
    surface::{InteractionKind, InteractionRef, LiveSurface},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionEnvelope {
    pub envelope_id: String,
    pub event: InteractionEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionEvent {
    Command(CommandInvocation),
    ButtonPressed(ButtonPressEvent),
    FormSubmitted(FormSubmittedEvent),
    SelectionMade(SelectionEvent),
    Unsupported { event_type: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InteractionEventType {
    Command,
    ButtonPressed,
    FormSubmitted,
    SelectionMade,
    Unsupported,
}

/// Fields every interaction carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionMeta {
    pub interaction_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub user_id: String,
    pub user_display_name: Option<String>,
    /// Message the component lives on, absent for commands.
    pub message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub meta: InteractionMeta,
    pub name: String,
    pub options: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPressEvent {
    pub meta: InteractionMeta,
    pub custom_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormSubmittedEvent {
    pub meta: InteractionMeta,
    pub custom_id: String,
    pub values: Vec<(String, String)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionEvent {
    pub meta: InteractionMeta,
    pub custom_id: String,
    pub values: Vec<String>,
}

impl InteractionEvent {
    pub fn event_type(&self) -> InteractionEventType {
        match self {
            Self::Command(_) => InteractionEventType::Command,
            Self::ButtonPressed(_) => InteractionEventType::ButtonPressed,
            Self::FormSubmitted(_) => InteractionEventType::FormSubmitted,
            Self::SelectionMade(_) => InteractionEventType::SelectionMade,
            Self::Unsupported { .. } => InteractionEventType::Unsupported,
        }
    }

    pub fn meta(&self) -> Option<&InteractionMeta> {
        match self {
            Self::Command(event) => Some(&event.meta),
            Self::ButtonPressed(event) => Some(&event.meta),
            Self::FormSubmitted(event) => Some(&event.meta),
            Self::SelectionMade(event) => Some(&event.meta),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn custom_id(&self) -> Option<&str> {
        match self {
            Self::ButtonPressed(event) => Some(&event.custom_id),
            Self::FormSubmitted(event) => Some(&event.custom_id),
            Self::SelectionMade(event) => Some(&event.custom_id),
            Self::Command(_) | Self::Unsupported { .. } => None,
        }
    }

    /// The component payload in the shape the registry decodes.
    pub fn raw_response(&self) -> Option<RawResponse> {
        match self {
            Self::ButtonPressed(_) => Some(RawResponse::ButtonPress),
            Self::FormSubmitted(event) => {
                Some(RawResponse::FormSubmission { values: event.values.clone() })
            }
            Self::SelectionMade(event) => {
                Some(RawResponse::Selection { values: event.values.clone() })
            }
            Self::Command(_) | Self::Unsupported { .. } => None,
        }
    }

    pub fn interaction_ref(&self) -> Option<InteractionRef> {
        let kind = match self {
            Self::Command(_) => InteractionKind::Command,
            Self::ButtonPressed(_) => InteractionKind::ButtonPress,
            Self::FormSubmitted(_) => InteractionKind::FormSubmission,
            Self::SelectionMade(_) => InteractionKind::Selection,
            Self::Unsupported { .. } => return None,
        };
        self.meta().map(|meta| InteractionRef {
            interaction_id: meta.interaction_id.clone(),
            kind,
            channel_id: meta.channel_id.clone(),
            user_id: meta.user_id.clone(),
        })
    }

    pub fn session_context(&self, correlation_id: &str) -> Option<SessionContext> {
        self.meta().map(|meta| SessionContext {
            user_id: meta.user_id.clone(),
            channel_id: meta.channel_id.clone(),
            guild_id: meta.guild_id.clone(),
            author_display_name: meta.user_display_name.clone(),
            correlation_id: correlation_id.to_owned(),
        })
    }

    pub fn surface(&self) -> Option<LiveSurface> {
        let meta = self.meta()?;
        meta.message_id.as_ref().map(|message_id| LiveSurface {
            channel_id: meta.channel_id.clone(),
            message_id: message_id.clone(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HandlerRoute {
    /// A command by name.
    Command(String),
    /// Unmatched component events whose token carries this namespace.
    Namespace(Namespace),
    Event(InteractionEventType),
}

impl std::fmt::Display for HandlerRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(name) => write!(f, "command `{name}`"),
            Self::Namespace(namespace) => write!(f, "namespace `{namespace}`"),
            Self::Event(event_type) => write!(f, "event {event_type:?}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("event payload is missing {0}")]
    MissingField(&'static str),
    #[error("workflow failure: {0}")]
    Workflow(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
    #[error("{0} already has a handler")]
    DuplicateRoute(HandlerRoute),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn route(&self) -> HandlerRoute;
    async fn handle(
        &self,
        envelope: &InteractionEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Offers component events to the pending wait registry first; whatever no
/// prompt is waiting for is routed to handlers.
#[derive(Default)]
pub struct EventDispatcher {
    codec: TokenCodec,
    registry: Option<PendingWaitRegistry>,
    handlers: HashMap<HandlerRoute, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: PendingWaitRegistry) -> Self {
        Self { registry: Some(registry), ..Self::default() }
    }

    pub fn register<H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        H: EventHandler + 'static,
    {
        let route = handler.route();
        if self.handlers.contains_key(&route) {
            return Err(DispatchError::DuplicateRoute(route));
        }
        self.handlers.insert(route, Arc::new(handler));
        Ok(())
    }

    pub async fn dispatch(
        &self,
        envelope: &InteractionEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let event = &envelope.event;
        let route = match event {
            InteractionEvent::Command(command) => {
                let by_name = HandlerRoute::Command(command.name.clone());
                if self.handlers.contains_key(&by_name) {
                    by_name
                } else {
                    HandlerRoute::Event(InteractionEventType::Command)
                }
            }
            InteractionEvent::ButtonPressed(_)
            | InteractionEvent::FormSubmitted(_)
            | InteractionEvent::SelectionMade(_) => match self.offer_to_registry(event, ctx) {
                ComponentRoute::Handled(result) => return Ok(result),
                ComponentRoute::Route(route) => route,
            },
            InteractionEvent::Unsupported { .. } => HandlerRoute::Event(event.event_type()),
        };

        let Some(handler) = self.handlers.get(&route) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    fn offer_to_registry(&self, event: &InteractionEvent, ctx: &EventContext) -> ComponentRoute {
        let (Some(custom_id), Some(raw), Some(responder)) =
            (event.custom_id(), event.raw_response(), event.interaction_ref())
        else {
            return ComponentRoute::Handled(HandlerResult::Ignored);
        };

        let decoded = self.codec.decode(custom_id).and_then(|(namespace, variant)| {
            Ok((self.codec.parse(custom_id)?, namespace, variant))
        });
        let (token, namespace, variant) = match decoded {
            Ok(decoded) => decoded,
            Err(error) => {
                debug!(
                    event_name = "dialogue.token.malformed",
                    correlation_id = %ctx.correlation_id,
                    custom_id,
                    error = %error,
                    "dropping component event with malformed token"
                );
                return ComponentRoute::Handled(HandlerResult::Ignored);
            }
        };

        if let Some(registry) = &self.registry {
            match registry.try_resolve(InboundResponse { token, raw, responder }) {
                ResolveOutcome::Resolved { .. } | ResolveOutcome::Rejected { .. } => {
                    return ComponentRoute::Handled(HandlerResult::Processed);
                }
                ResolveOutcome::Retry { error, attempts_left, .. } => {
                    let summary = format!(
                        "{error}. Please correct the form and submit again \
                         ({attempts_left} attempt(s) left)."
                    );
                    return ComponentRoute::Handled(HandlerResult::Responded(error_message(
                        &summary,
                        &ctx.correlation_id,
                    )));
                }
                ResolveOutcome::ForeignActor { waiter } => {
                    debug!(
                        event_name = "dialogue.prompt.foreign_actor",
                        correlation_id = %ctx.correlation_id,
                        waiter_id = waiter,
                        "ignoring response from a user who does not own the prompt"
                    );
                    return ComponentRoute::Handled(HandlerResult::Ignored);
                }
                ResolveOutcome::NoMatch => {}
            }
        }

        // Scoped variants belong to prompts; an unmatched one is late or a
        // duplicate delivery.
        if is_scoped_variant(&variant) {
            debug!(
                event_name = "dialogue.prompt.no_match",
                correlation_id = %ctx.correlation_id,
                custom_id,
                "dropping late or duplicate component event"
            );
            return ComponentRoute::Handled(HandlerResult::Ignored);
        }

        ComponentRoute::Route(HandlerRoute::Namespace(namespace))
    }
}

enum ComponentRoute {
    Handled(HandlerResult),
    Route(HandlerRoute),
}

/// Aborts every pending prompt of the invoking user.
pub struct CancelCommandHandler {
    name: String,
    registry: PendingWaitRegistry,
}

impl CancelCommandHandler {
    pub fn new(name: impl Into<String>, registry: PendingWaitRegistry) -> Self {
        Self { name: name.into(), registry }
    }
}

#[async_trait]
impl EventHandler for CancelCommandHandler {
    fn route(&self) -> HandlerRoute {
        HandlerRoute::Command(self.name.clone())
    }

    async fn handle(
        &self,
        envelope: &InteractionEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let InteractionEvent::Command(command) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let cancelled = self.registry.cancel_session(&command.meta.user_id);
        let summary = match cancelled {
            0 => "You have no pending prompts.".to_owned(),
            1 => "Cancelled 1 pending prompt.".to_owned(),
            n => format!("Cancelled {n} pending prompts."),
        };
        Ok(HandlerResult::Responded(notice_message(&summary)))
    }
}
