//! Prompt issuers.
//!
//! Each issuer consumes a [`SessionChainHandle`], renders its prompt through
//! the [`Surface`], registers a waiter and suspends until the waiter is woken
//! by an answer, its deadline or a cancellation. Interactions are answered
//! lazily: the next render on a responder's handle is its initial response,
//! which is what allows a button press to open a form directly.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parley_core::config::DialogueConfig;
use parley_core::{
    Choice, CorrelationToken, DecodeError, EngineError, FormField, FormValues, Namespace,
    PromptKind, PromptNonce, PromptSchema, PromptValue, TokenCodec,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blocks::{
    continue_message, notice_message, ButtonElement, ButtonStyle, FormTemplate, MessageBuilder,
    MessageTemplate, SelectMenuElement, SelectOption, TextObject,
};
use crate::outcome::{DialogueOutcome, Interrupted, Step};
use crate::registry::{PendingWaitRegistry, Registration, Resolution};
use crate::session::{HandleLedger, SessionChainHandle};
use crate::surface::{InteractionKind, Surface, SurfaceSpec, TransportError};
use crate::sweeper::DeadlineSweeper;

const BUTTONS_PER_ROW: usize = 5;
const CONTINUE_VARIANT: &str = "Continue";
const FORM_VARIANT: &str = "Form";
const SELECT_VARIANT: &str = "Select";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_timeout: Duration,
    pub form_timeout: Duration,
    pub max_form_attempts: u32,
    pub handle_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            form_timeout: Duration::from_secs(300),
            max_form_attempts: 3,
            handle_ttl: Duration::from_secs(900),
        }
    }
}

impl From<&DialogueConfig> for EngineConfig {
    fn from(config: &DialogueConfig) -> Self {
        Self {
            default_timeout: config.default_timeout(),
            form_timeout: config.form_timeout(),
            max_form_attempts: config.max_form_attempts,
            handle_ttl: config.handle_ttl(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormPrompt {
    pub namespace: Namespace,
    pub title: String,
    pub fields: Vec<FormField>,
    pub timeout: Option<Duration>,
}

impl FormPrompt {
    pub fn new(namespace: Namespace, title: impl Into<String>) -> Self {
        Self { namespace, title: title.into(), fields: Vec::new(), timeout: None }
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct ButtonChoice {
    pub id: String,
    pub label: String,
    pub style: Option<ButtonStyle>,
}

#[derive(Clone, Debug)]
pub struct ButtonPrompt {
    pub namespace: Namespace,
    pub question: String,
    pub choices: Vec<ButtonChoice>,
    pub timeout: Option<Duration>,
}

impl ButtonPrompt {
    pub fn new(namespace: Namespace, question: impl Into<String>) -> Self {
        Self { namespace, question: question.into(), choices: Vec::new(), timeout: None }
    }

    /// Yes/No prompt answering `True` or `False`.
    pub fn confirm(namespace: Namespace, question: impl Into<String>) -> Self {
        Self::new(namespace, question)
            .styled_choice("True", "Yes", ButtonStyle::Success)
            .styled_choice("False", "No", ButtonStyle::Danger)
    }

    pub fn choice(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.choices.push(ButtonChoice { id: id.into(), label: label.into(), style: None });
        self
    }

    pub fn styled_choice(
        mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        style: ButtonStyle,
    ) -> Self {
        self.choices.push(ButtonChoice { id: id.into(), label: label.into(), style: Some(style) });
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct SelectionPrompt {
    pub namespace: Namespace,
    pub question: String,
    pub placeholder: String,
    pub choices: Vec<Choice>,
    pub min_values: usize,
    pub max_values: usize,
    pub timeout: Option<Duration>,
}

impl SelectionPrompt {
    pub fn new(namespace: Namespace, question: impl Into<String>) -> Self {
        Self {
            namespace,
            question: question.into(),
            placeholder: "Choose an option".to_owned(),
            choices: Vec::new(),
            min_values: 1,
            max_values: 1,
            timeout: None,
        }
    }

    pub fn choice(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.choices.push(Choice::new(id, label));
        self
    }

    pub fn choices(mut self, choices: impl IntoIterator<Item = Choice>) -> Self {
        self.choices.extend(choices);
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn range(mut self, min_values: usize, max_values: usize) -> Self {
        self.min_values = min_values;
        self.max_values = max_values.max(min_values);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone)]
pub struct DialogueEngine {
    config: EngineConfig,
    codec: TokenCodec,
    registry: PendingWaitRegistry,
    sweeper: DeadlineSweeper,
    ledger: HandleLedger,
    surface: Arc<dyn Surface>,
}

impl DialogueEngine {
    pub fn new(config: EngineConfig, surface: Arc<dyn Surface>) -> Self {
        let registry = PendingWaitRegistry::new(config.max_form_attempts);
        Self {
            codec: TokenCodec,
            sweeper: DeadlineSweeper::new(registry.clone()),
            ledger: HandleLedger::new(config.handle_ttl),
            registry,
            surface,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &PendingWaitRegistry {
        &self.registry
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    /// Opens a form and waits for a valid submission. A form can only be the
    /// first response to an interaction, so from a form submission or an
    /// already answered interaction a Continue button is shown first.
    pub async fn await_form(
        &self,
        handle: SessionChainHandle,
        prompt: FormPrompt,
    ) -> Result<Step<FormValues>, EngineError> {
        handle.ensure_open()?;
        let mut handle = handle;

        if handle.is_acknowledged() || handle.interaction().kind == InteractionKind::FormSubmission
        {
            let nonce = PromptNonce::generate();
            let token = self.codec.encode(&prompt.namespace, &nonce.scope(CONTINUE_VARIANT))?;
            debug!(
                event_name = "dialogue.form.bridged",
                correlation_id = %handle.context().correlation_id,
                namespace = %prompt.namespace,
                "form requested from an answered interaction; showing continue button"
            );
            let spec = SurfaceSpec::Message(continue_message(token.as_str(), &prompt.title));
            let schema = PromptSchema::Buttons {
                choices: BTreeMap::from([(token.clone(), CONTINUE_VARIANT.to_owned())]),
            };
            let bridge = self
                .issue(handle, vec![token], schema, spec, self.config.default_timeout)
                .await?;
            match bridge.outcome {
                DialogueOutcome::Completed(_) => handle = bridge.handle,
                _ => return Ok(narrow(bridge, form_values)),
            }
        }

        let nonce = PromptNonce::generate();
        let token = self.codec.encode(&prompt.namespace, &nonce.scope(FORM_VARIANT))?;
        let spec =
            SurfaceSpec::Form(FormTemplate::new(token.as_str(), &prompt.title, &prompt.fields));
        let schema = PromptSchema::Form { fields: prompt.fields };
        let timeout = prompt.timeout.unwrap_or(self.config.form_timeout);

        let step = self.issue(handle, vec![token], schema, spec, timeout).await?;
        Ok(narrow(step, form_values))
    }

    pub async fn await_buttons(
        &self,
        handle: SessionChainHandle,
        prompt: ButtonPrompt,
    ) -> Result<Step<String>, EngineError> {
        handle.ensure_open()?;
        if prompt.choices.is_empty() {
            return Err(EngineError::NoChoices { namespace: prompt.namespace.to_string() });
        }
        let nonce = PromptNonce::generate();

        let mut seen = BTreeSet::new();
        let mut choices = BTreeMap::new();
        let mut elements = Vec::with_capacity(prompt.choices.len());
        for choice in &prompt.choices {
            let token = self.codec.encode(&prompt.namespace, &nonce.scope(&choice.id))?;
            if !seen.insert(choice.id.as_str()) {
                return Err(EngineError::DuplicateToken { token: token.into_inner() });
            }
            let mut element = ButtonElement::new(token.as_str(), choice.label.clone());
            if let Some(style) = choice.style {
                element = element.style(style);
            }
            elements.push(element);
            choices.insert(token, choice.id.clone());
        }

        let mut builder = MessageBuilder::new(prompt.question.clone())
            .section("dialogue.buttons.question.v1", |section| {
                section.markdown(prompt.question.clone());
            });
        for (row, chunk) in elements.chunks(BUTTONS_PER_ROW).enumerate() {
            builder = builder.actions(format!("dialogue.buttons.actions.v1.{row}"), |actions| {
                for element in chunk {
                    actions.button(element.clone());
                }
            });
        }

        let tokens: Vec<CorrelationToken> = choices.keys().cloned().collect();
        let spec = SurfaceSpec::Message(builder.build());
        let timeout = prompt.timeout.unwrap_or(self.config.default_timeout);
        let step = self
            .issue(handle, tokens, PromptSchema::Buttons { choices }, spec, timeout)
            .await?;
        Ok(narrow(step, chosen))
    }

    pub async fn await_selection(
        &self,
        handle: SessionChainHandle,
        prompt: SelectionPrompt,
    ) -> Result<Step<Vec<String>>, EngineError> {
        handle.ensure_open()?;
        if prompt.choices.is_empty() {
            return Err(EngineError::NoChoices { namespace: prompt.namespace.to_string() });
        }
        let nonce = PromptNonce::generate();
        let token = self.codec.encode(&prompt.namespace, &nonce.scope(SELECT_VARIANT))?;

        let max_values = prompt.max_values.min(prompt.choices.len()).max(1);
        let min_values = prompt.min_values.min(max_values);
        let menu = SelectMenuElement {
            custom_id: token.as_str().to_owned(),
            placeholder: TextObject::plain(prompt.placeholder.clone()),
            options: prompt
                .choices
                .iter()
                .map(|choice| SelectOption {
                    value: choice.id.clone(),
                    label: TextObject::plain(choice.label.clone()),
                })
                .collect(),
            min_values,
            max_values,
        };
        let message = MessageBuilder::new(prompt.question.clone())
            .section("dialogue.selection.question.v1", |section| {
                section.markdown(prompt.question.clone());
            })
            .select("dialogue.selection.menu.v1", menu)
            .build();

        let schema = PromptSchema::Selection { choices: prompt.choices, min_values, max_values };
        let timeout = prompt.timeout.unwrap_or(self.config.default_timeout);
        let step = self
            .issue(handle, vec![token], schema, SurfaceSpec::Message(message), timeout)
            .await?;
        Ok(narrow(step, selected))
    }

    /// Sends the initial response for a handle before slow work, keeping the
    /// interaction editable.
    pub async fn acknowledge(&self, handle: &mut SessionChainHandle) -> Result<(), TransportError> {
        if handle.is_acknowledged() {
            return Ok(());
        }
        self.surface.acknowledge(handle.interaction()).await?;
        handle.mark_acknowledged();
        Ok(())
    }

    /// Replaces the dialogue surface with a final message and removes its
    /// components.
    pub async fn finish(
        &self,
        handle: SessionChainHandle,
        message: MessageTemplate,
    ) -> Result<(), TransportError> {
        let correlation_id = handle.context().correlation_id.clone();
        let result = self.surface.edit(handle.target(), message.without_components()).await;
        match &result {
            Ok(()) => info!(
                event_name = "dialogue.session.finished",
                correlation_id = %correlation_id,
                "dialogue finished"
            ),
            Err(error) => warn!(
                event_name = "dialogue.session.finished",
                correlation_id = %correlation_id,
                error = %error,
                "failed to render final dialogue message"
            ),
        }
        result
    }

    pub async fn dismiss(&self, handle: SessionChainHandle) -> Result<(), TransportError> {
        self.surface.delete(handle.target()).await
    }

    /// Closes the surface of an interrupted dialogue with an explanation.
    pub async fn abandon(&self, interrupted: Interrupted) -> Result<(), TransportError> {
        let Interrupted { outcome, handle } = interrupted;
        let Some(text) = outcome.user_message() else {
            return Ok(());
        };
        info!(
            event_name = "dialogue.session.abandoned",
            correlation_id = %handle.context().correlation_id,
            outcome = ?outcome,
            "dialogue ended without completing"
        );
        self.finish(handle, notice_message(&text)).await
    }

    pub fn cancel_session(&self, user_id: &str) -> usize {
        let cancelled = self.registry.cancel_session(user_id);
        if cancelled > 0 {
            info!(
                event_name = "dialogue.session.cancelled",
                user_id = %user_id,
                cancelled,
                "cancelled pending prompts"
            );
        }
        cancelled
    }

    async fn issue(
        &self,
        mut handle: SessionChainHandle,
        tokens: Vec<CorrelationToken>,
        schema: PromptSchema,
        spec: SurfaceSpec,
        timeout: Duration,
    ) -> Result<Step<PromptValue>, EngineError> {
        handle.ensure_open()?;
        self.ledger.consume(&handle.interaction().interaction_id)?;

        let kind = schema.kind();
        let deadline = Instant::now() + timeout;
        let waiter = self.registry.register(Registration {
            tokens,
            schema,
            deadline,
            context: handle.context().clone(),
        })?;
        let waiter_id = waiter.id();
        self.sweeper.arm(waiter_id, deadline);

        info!(
            event_name = "dialogue.prompt.issued",
            correlation_id = %handle.context().correlation_id,
            prompt_kind = %kind,
            waiter_id,
            timeout_secs = timeout.as_secs(),
            "prompt issued"
        );

        match self.surface.render(handle.target(), spec).await {
            Ok(surface) => handle.rendered(surface),
            Err(error) => {
                self.registry.cancel(waiter_id);
                warn!(
                    event_name = "dialogue.prompt.render_failed",
                    correlation_id = %handle.context().correlation_id,
                    prompt_kind = %kind,
                    waiter_id,
                    error = %error,
                    "prompt could not be rendered"
                );
                return Ok(Step {
                    outcome: DialogueOutcome::Transport(error),
                    handle: handle.closing(),
                });
            }
        }

        let resolution = waiter.wait().await;
        let step = match resolution {
            Resolution::Answered { value, responder } => Step {
                outcome: DialogueOutcome::Completed(value),
                handle: handle.advance(responder),
            },
            Resolution::Rejected { error, responder } => Step {
                outcome: DialogueOutcome::Rejected(error),
                handle: handle.advance(responder),
            },
            Resolution::TimedOut => {
                Step { outcome: DialogueOutcome::TimedOut, handle: handle.closing() }
            }
            Resolution::Cancelled => {
                Step { outcome: DialogueOutcome::Cancelled, handle: handle.closing() }
            }
        };

        info!(
            event_name = "dialogue.prompt.resolved",
            correlation_id = %step.handle.context().correlation_id,
            prompt_kind = %kind,
            waiter_id,
            outcome = outcome_label(&step.outcome),
            "prompt resolved"
        );
        Ok(step)
    }
}

fn outcome_label<T>(outcome: &DialogueOutcome<T>) -> &'static str {
    match outcome {
        DialogueOutcome::Completed(_) => "completed",
        DialogueOutcome::TimedOut => "timed_out",
        DialogueOutcome::Cancelled => "cancelled",
        DialogueOutcome::Rejected(_) => "rejected",
        DialogueOutcome::Transport(_) => "transport",
    }
}

fn narrow<T>(
    step: Step<PromptValue>,
    extract: fn(PromptValue) -> Result<T, DecodeError>,
) -> Step<T> {
    let outcome = match step.outcome {
        DialogueOutcome::Completed(value) => match extract(value) {
            Ok(value) => DialogueOutcome::Completed(value),
            Err(error) => DialogueOutcome::Rejected(error),
        },
        DialogueOutcome::TimedOut => DialogueOutcome::TimedOut,
        DialogueOutcome::Cancelled => DialogueOutcome::Cancelled,
        DialogueOutcome::Rejected(error) => DialogueOutcome::Rejected(error),
        DialogueOutcome::Transport(error) => DialogueOutcome::Transport(error),
    };
    Step { outcome, handle: step.handle }
}

fn form_values(value: PromptValue) -> Result<FormValues, DecodeError> {
    match value {
        PromptValue::Form(values) => Ok(values),
        other => {
            Err(DecodeError::ShapeMismatch { expected: PromptKind::Form, received: other.kind() })
        }
    }
}

fn chosen(value: PromptValue) -> Result<String, DecodeError> {
    match value {
        PromptValue::Choice(choice) => Ok(choice),
        other => {
            Err(DecodeError::ShapeMismatch {
                expected: PromptKind::Buttons,
                received: other.kind(),
            })
        }
    }
}

fn selected(value: PromptValue) -> Result<Vec<String>, DecodeError> {
    match value {
        PromptValue::Selection(values) => Ok(values),
        other => Err(DecodeError::ShapeMismatch {
            expected: PromptKind::Selection,
            received: other.kind(),
        }),
    }
}
