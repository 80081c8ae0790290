//! Group balance adjustment, the reference chained dialogue.
//!
//! A persistent `{namespace}/Add` or `{namespace}/Del` button starts it:
//! form (targets, amount, reason) → role selection → Yes/No confirmation →
//! ledger write → summary on the same message. A blank amount falls back to
//! the selected role's configured payment.

use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::{Choice, EngineError, FormField, Namespace, TokenCodec};
use parley_interaction::blocks::{error_message, MessageBuilder};
use parley_interaction::events::{
    EventContext, EventHandler, EventHandlerError, HandlerResult, HandlerRoute,
    InteractionEnvelope, InteractionEvent,
};
use parley_interaction::surface::TransportError;
use parley_interaction::{
    ButtonPrompt, DialogueEngine, DialogueOutcome, FormPrompt, SelectionPrompt,
    SessionChainHandle,
};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};

pub const GROUP_ADJUSTMENT_NAMESPACE: &str = "econ::group";
pub const NOT_PROVIDED: &str = "N/D";

const TARGETS_FIELD: &str = "targets";
const AMOUNT_FIELD: &str = "amount";
const REASON_FIELD: &str = "reason";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Add,
    Remove,
}

impl Direction {
    pub fn from_variant(variant: &str) -> Option<Self> {
        match variant {
            "Add" => Some(Self::Add),
            "Del" => Some(Self::Remove),
            _ => None,
        }
    }

    fn signed(self, amount: Decimal) -> Decimal {
        match self {
            Self::Add => amount,
            Self::Remove => -amount,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Remove => "Remove",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjustment {
    pub guild_id: Option<String>,
    pub author_id: String,
    pub targets: Vec<String>,
    pub role_id: String,
    pub delta: Decimal,
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdjustmentReceipt {
    pub adjustment_id: String,
    pub applied_at: DateTime<Utc>,
    pub affected: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupAdjustmentResult {
    Applied(AdjustmentReceipt),
    Declined,
    InvalidInput(String),
    /// The dialogue stopped at a prompt; carries the outcome label.
    Interrupted(&'static str),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("role directory failure: {0}")]
    Directory(String),
    #[error("balance ledger failure: {0}")]
    Ledger(String),
}

/// A role offered by the dialogue and the amount it pays when the form
/// leaves the amount blank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleOption {
    pub choice: Choice,
    pub default_amount: Decimal,
}

impl RoleOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>, default_amount: Decimal) -> Self {
        Self { choice: Choice::new(id, label), default_amount }
    }
}

#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles(&self, guild_id: Option<&str>) -> Result<Vec<RoleOption>, WorkflowError>;
}

#[async_trait]
pub trait BalanceLedger: Send + Sync {
    async fn apply(&self, adjustment: &Adjustment) -> Result<AdjustmentReceipt, WorkflowError>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticRoleDirectory {
    roles: Vec<RoleOption>,
}

impl StaticRoleDirectory {
    pub fn new(roles: Vec<RoleOption>) -> Self {
        Self { roles }
    }
}

#[async_trait]
impl RoleDirectory for StaticRoleDirectory {
    async fn roles(&self, _guild_id: Option<&str>) -> Result<Vec<RoleOption>, WorkflowError> {
        Ok(self.roles.clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    applied: Mutex<Vec<Adjustment>>,
}

impl InMemoryLedger {
    pub fn applied(&self) -> Vec<Adjustment> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl BalanceLedger for InMemoryLedger {
    async fn apply(&self, adjustment: &Adjustment) -> Result<AdjustmentReceipt, WorkflowError> {
        self.applied.lock().unwrap_or_else(PoisonError::into_inner).push(adjustment.clone());
        Ok(AdjustmentReceipt {
            adjustment_id: uuid::Uuid::new_v4().to_string(),
            applied_at: Utc::now(),
            affected: adjustment.targets.len(),
        })
    }
}

#[derive(Clone)]
pub struct GroupAdjustment {
    pub engine: DialogueEngine,
    pub namespace: Namespace,
    pub roles: Arc<dyn RoleDirectory>,
    pub ledger: Arc<dyn BalanceLedger>,
}

impl GroupAdjustment {
    pub async fn run(
        &self,
        direction: Direction,
        handle: SessionChainHandle,
    ) -> Result<GroupAdjustmentResult, WorkflowError> {
        let correlation_id = handle.context().correlation_id.clone();
        let form = FormPrompt::new(self.namespace.clone(), format!("{} balance", direction.verb()))
            .field(
                FormField::short(TARGETS_FIELD, "Users")
                    .placeholder("@user or nickname, comma separated"),
            )
            .field(
                FormField::short(AMOUNT_FIELD, "Amount")
                    .placeholder("Role default")
                    .max_length(16)
                    .optional(),
            )
            .field(FormField::paragraph(REASON_FIELD, "Reason").max_length(300).optional());

        let (values, handle) = match self.engine.await_form(handle, form).await?.completed() {
            Ok(answered) => answered,
            Err(interrupted) => return self.stop(interrupted).await,
        };

        let targets = parse_targets(values.provided(TARGETS_FIELD).unwrap_or_default());
        let requested = match values.provided(AMOUNT_FIELD).map(Decimal::from_str) {
            None => None,
            Some(Ok(amount)) if amount > Decimal::ZERO => Some(amount),
            Some(_) => {
                let reason = "Amount must be a positive number.".to_owned();
                self.engine.finish(handle, error_message(&reason, &correlation_id)).await?;
                return Ok(GroupAdjustmentResult::InvalidInput(reason));
            }
        };
        if targets.is_empty() {
            let reason = "At least one user is required.".to_owned();
            self.engine.finish(handle, error_message(&reason, &correlation_id)).await?;
            return Ok(GroupAdjustmentResult::InvalidInput(reason));
        }
        let reason = values.provided(REASON_FIELD).map(str::to_owned);

        let roles = self.roles.roles(handle.context().guild_id.as_deref()).await?;
        if roles.is_empty() {
            let reason = "No roles are available in this server.".to_owned();
            self.engine.finish(handle, error_message(&reason, &correlation_id)).await?;
            return Ok(GroupAdjustmentResult::InvalidInput(reason));
        }
        let selection =
            SelectionPrompt::new(self.namespace.clone(), "Which role applies to this adjustment?")
                .placeholder("Role")
                .choices(roles.iter().map(|role| role.choice.clone()));
        let (selected, handle) =
            match self.engine.await_selection(handle, selection).await?.completed() {
                Ok(answered) => answered,
                Err(interrupted) => return self.stop(interrupted).await,
            };
        let Some(role) = selected
            .first()
            .and_then(|role_id| roles.iter().find(|role| &role.choice.id == role_id))
        else {
            let reason = "No role selected.".to_owned();
            self.engine.finish(handle, error_message(&reason, &correlation_id)).await?;
            return Ok(GroupAdjustmentResult::InvalidInput(reason));
        };
        let role_id = role.choice.id.clone();
        let role_label = role.choice.label.clone();

        let amount = requested.unwrap_or(role.default_amount);
        if amount <= Decimal::ZERO {
            let reason = format!("The configured amount for {role_label} ({amount}) is invalid.");
            self.engine.finish(handle, error_message(&reason, &correlation_id)).await?;
            return Ok(GroupAdjustmentResult::InvalidInput(reason));
        }

        let delta = direction.signed(amount);
        let question = format!(
            "*{} {amount}* for {} ({role_label})?\nReason: {}",
            direction.verb(),
            targets.join(", "),
            reason.as_deref().unwrap_or(NOT_PROVIDED),
        );
        let (confirmed, handle) = match self
            .engine
            .await_buttons(handle, ButtonPrompt::confirm(self.namespace.clone(), question))
            .await?
            .completed()
        {
            Ok(answered) => answered,
            Err(interrupted) => return self.stop(interrupted).await,
        };

        if confirmed != "True" {
            self.engine
                .finish(
                    handle,
                    MessageBuilder::new("Adjustment discarded")
                        .section("econ.group.discarded.v1", |section| {
                            section.plain("Adjustment discarded.");
                        })
                        .build(),
                )
                .await?;
            return Ok(GroupAdjustmentResult::Declined);
        }

        let adjustment = Adjustment {
            guild_id: handle.context().guild_id.clone(),
            author_id: handle.context().user_id.clone(),
            targets,
            role_id,
            delta,
            reason,
        };
        let receipt = match self.ledger.apply(&adjustment).await {
            Ok(receipt) => receipt,
            Err(error) => {
                warn!(
                    event_name = "econ.group.apply_failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "balance ledger rejected adjustment"
                );
                let message = error_message("The balance could not be updated.", &correlation_id);
                self.engine.finish(handle, message).await?;
                return Err(error);
            }
        };

        info!(
            event_name = "econ.group.applied",
            correlation_id = %correlation_id,
            adjustment_id = %receipt.adjustment_id,
            affected = receipt.affected,
            "group adjustment applied"
        );
        let author = handle
            .context()
            .author_display_name
            .clone()
            .unwrap_or_else(|| handle.context().user_id.clone());
        let title = format!("Balance adjusted for {} user(s)", receipt.affected);
        let summary = MessageBuilder::new(title)
            .section("econ.group.summary.v1", |section| {
                section.markdown(format!(
                    "*Balance adjusted*\n{} for {} ({role_label})\nReason: {}",
                    with_sign(delta),
                    adjustment.targets.join(", "),
                    adjustment.reason.as_deref().unwrap_or(NOT_PROVIDED),
                ));
            })
            .context("econ.group.context.v1", |context| {
                context.plain(format!(
                    "By {author} at {} · ref {}",
                    receipt.applied_at.format("%Y-%m-%d %H:%M UTC"),
                    receipt.adjustment_id
                ));
            })
            .build();
        self.engine.finish(handle, summary).await?;

        Ok(GroupAdjustmentResult::Applied(receipt))
    }

    async fn stop(
        &self,
        interrupted: parley_interaction::Interrupted,
    ) -> Result<GroupAdjustmentResult, WorkflowError> {
        let label = match &interrupted.outcome {
            DialogueOutcome::Completed(()) => "completed",
            DialogueOutcome::TimedOut => "timed_out",
            DialogueOutcome::Cancelled => "cancelled",
            DialogueOutcome::Rejected(_) => "rejected",
            DialogueOutcome::Transport(_) => "transport",
        };
        if let Err(error) = self.engine.abandon(interrupted).await {
            warn!(
                event_name = "econ.group.abandon_failed",
                error = %error,
                "could not close interrupted dialogue"
            );
        }
        Ok(GroupAdjustmentResult::Interrupted(label))
    }
}

fn with_sign(delta: Decimal) -> String {
    if delta.is_sign_negative() {
        delta.to_string()
    } else {
        format!("+{delta}")
    }
}

fn parse_targets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Starts a [`GroupAdjustment`] dialogue from its persistent entry buttons.
pub struct GroupAdjustmentEntry {
    workflow: GroupAdjustment,
}

impl GroupAdjustmentEntry {
    pub fn new(workflow: GroupAdjustment) -> Self {
        Self { workflow }
    }
}

#[async_trait]
impl EventHandler for GroupAdjustmentEntry {
    fn route(&self) -> HandlerRoute {
        HandlerRoute::Namespace(self.workflow.namespace.clone())
    }

    async fn handle(
        &self,
        envelope: &InteractionEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let InteractionEvent::ButtonPressed(press) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let (_, variant) = TokenCodec
            .decode(&press.custom_id)
            .map_err(|error| EventHandlerError::Engine(error.into()))?;
        let Some(direction) = Direction::from_variant(&variant) else {
            return Ok(HandlerResult::Ignored);
        };
        let interaction =
            envelope.event.interaction_ref().ok_or(EventHandlerError::MissingField("interaction"))?;
        let context = envelope
            .event
            .session_context(&ctx.correlation_id)
            .ok_or(EventHandlerError::MissingField("session context"))?;

        let workflow = self.workflow.clone();
        let correlation_id = ctx.correlation_id.clone();
        tokio::spawn(async move {
            let handle = SessionChainHandle::open(interaction, context);
            match workflow.run(direction, handle).await {
                Ok(result) => info!(
                    event_name = "econ.group.finished",
                    correlation_id = %correlation_id,
                    result = ?result,
                    "group adjustment dialogue finished"
                ),
                Err(error) => warn!(
                    event_name = "econ.group.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "group adjustment dialogue failed"
                ),
            }
        });

        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parley_core::Namespace;
    use parley_interaction::blocks::Block;
    use parley_interaction::events::{
        ButtonPressEvent, EventContext, EventDispatcher, FormSubmittedEvent, HandlerResult,
        InteractionEnvelope, InteractionEvent, InteractionMeta, SelectionEvent,
    };
    use parley_interaction::surface::{RecordingSurface, SurfaceCall, SurfaceSpec};
    use parley_interaction::{DialogueEngine, EngineConfig};
    use rust_decimal::Decimal;

    use super::{
        parse_targets, GroupAdjustment, GroupAdjustmentEntry, InMemoryLedger, RoleOption,
        StaticRoleDirectory, GROUP_ADJUSTMENT_NAMESPACE,
    };

    struct Harness {
        engine: DialogueEngine,
        dispatcher: EventDispatcher,
        surface: Arc<RecordingSurface>,
        ledger: Arc<InMemoryLedger>,
        sequence: usize,
    }

    impl Harness {
        fn new() -> Self {
            let surface = Arc::new(RecordingSurface::new());
            let engine = DialogueEngine::new(
                EngineConfig { default_timeout: Duration::from_secs(5), ..EngineConfig::default() },
                surface.clone(),
            );
            let ledger = Arc::new(InMemoryLedger::default());
            let workflow = GroupAdjustment {
                engine: engine.clone(),
                namespace: Namespace::new(GROUP_ADJUSTMENT_NAMESPACE).expect("namespace"),
                roles: Arc::new(StaticRoleDirectory::new(vec![
                    RoleOption::new("r-member", "Member", Decimal::new(150, 0)),
                    RoleOption::new("r-veteran", "Veteran", Decimal::new(300, 0)),
                ])),
                ledger: ledger.clone(),
            };
            let mut dispatcher = EventDispatcher::with_registry(engine.registry().clone());
            dispatcher.register(GroupAdjustmentEntry::new(workflow)).expect("register");
            Self { engine, dispatcher, surface, ledger, sequence: 0 }
        }

        fn meta(&mut self, user_id: &str) -> InteractionMeta {
            self.sequence += 1;
            InteractionMeta {
                interaction_id: format!("i-{}", self.sequence),
                channel_id: "C1".to_owned(),
                guild_id: Some("G1".to_owned()),
                user_id: user_id.to_owned(),
                user_display_name: Some("moderator".to_owned()),
                message_id: None,
            }
        }

        async fn send(&mut self, event: InteractionEvent) -> HandlerResult {
            self.sequence += 1;
            let envelope =
                InteractionEnvelope { envelope_id: format!("env-{}", self.sequence), event };
            self.dispatcher
                .dispatch(&envelope, &EventContext { correlation_id: envelope.envelope_id.clone() })
                .await
                .expect("dispatch")
        }

        async fn settle(&self, waiters: usize) {
            for _ in 0..200 {
                if self.engine.registry().len() == waiters {
                    break;
                }
                tokio::task::yield_now().await;
            }
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
        }

        fn last_custom_ids(&self) -> Vec<String> {
            self.surface
                .calls()
                .iter()
                .rev()
                .find_map(|call| match call {
                    SurfaceCall::Render { spec: SurfaceSpec::Message(message), .. } => {
                        Some(message.custom_ids().into_iter().map(str::to_owned).collect())
                    }
                    SurfaceCall::Render { spec: SurfaceSpec::Form(form), .. } => {
                        Some(vec![form.custom_id.clone()])
                    }
                    _ => None,
                })
                .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn confirmed_adjustment_is_applied_and_summarised() {
        let mut harness = Harness::new();

        let meta = harness.meta("U1");
        let started = harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Add"),
            }))
            .await;
        assert_eq!(started, HandlerResult::Processed);
        harness.settle(1).await;

        let form_id = harness.last_custom_ids().remove(0);
        assert!(form_id.starts_with("econ::group/Form@"));
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::FormSubmitted(FormSubmittedEvent {
                meta,
                custom_id: form_id,
                values: vec![
                    ("targets".to_owned(), "alice, bob".to_owned()),
                    ("amount".to_owned(), "2.5".to_owned()),
                    ("reason".to_owned(), String::new()),
                ],
            }))
            .await;
        harness.settle(1).await;

        let select_id = harness.last_custom_ids().remove(0);
        assert!(select_id.contains("/Select@"));
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::SelectionMade(SelectionEvent {
                meta,
                custom_id: select_id,
                values: vec!["r-veteran".to_owned()],
            }))
            .await;
        harness.settle(1).await;

        let yes = harness
            .last_custom_ids()
            .into_iter()
            .find(|id| id.contains("/True@"))
            .expect("yes button");
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent { meta, custom_id: yes }))
            .await;
        harness.settle(0).await;

        let applied = harness.ledger.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].targets, vec!["alice".to_owned(), "bob".to_owned()]);
        assert_eq!(applied[0].role_id, "r-veteran");
        assert_eq!(applied[0].delta, Decimal::new(25, 1));
        assert_eq!(applied[0].reason, None);

        let Some(SurfaceCall::Edit { message, .. }) = harness.surface.calls().last().cloned() else {
            panic!("expected final edit");
        };
        assert!(message.blocks.iter().all(|block| !block.is_interactive()));
        assert!(matches!(
            &message.blocks[0],
            Block::Section { text, .. }
                if text.text().contains("+2.5") && text.text().contains("N/D")
        ));
    }

    #[tokio::test]
    async fn declined_confirmation_leaves_ledger_untouched() {
        let mut harness = Harness::new();

        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Del"),
            }))
            .await;
        harness.settle(1).await;
        let form_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::FormSubmitted(FormSubmittedEvent {
                meta,
                custom_id: form_id,
                values: vec![("targets".to_owned(), "carol".to_owned())],
            }))
            .await;
        harness.settle(1).await;
        let select_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::SelectionMade(SelectionEvent {
                meta,
                custom_id: select_id,
                values: vec!["r-member".to_owned()],
            }))
            .await;
        harness.settle(1).await;

        let no = harness
            .last_custom_ids()
            .into_iter()
            .find(|id| id.contains("/False@"))
            .expect("no button");
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent { meta, custom_id: no }))
            .await;
        harness.settle(0).await;

        assert!(harness.ledger.applied().is_empty());
        assert!(matches!(
            harness.surface.calls().last(),
            Some(SurfaceCall::Edit { message, .. })
                if message.fallback_text == "Adjustment discarded"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_selection_times_out_and_explains_on_surface() {
        let mut harness = Harness::new();

        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Add"),
            }))
            .await;
        harness.settle(1).await;
        let form_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::FormSubmitted(FormSubmittedEvent {
                meta,
                custom_id: form_id,
                values: vec![("targets".to_owned(), "dave".to_owned())],
            }))
            .await;
        harness.settle(1).await;

        tokio::time::advance(Duration::from_secs(6)).await;
        harness.settle(0).await;

        assert!(harness.engine.registry().is_empty());
        assert!(harness.ledger.applied().is_empty());
        assert!(matches!(
            harness.surface.calls().last(),
            Some(SurfaceCall::Edit { message, .. }) if message.fallback_text.contains("expired")
        ));
    }

    #[tokio::test]
    async fn invalid_amount_ends_dialogue_with_error() {
        let mut harness = Harness::new();

        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Add"),
            }))
            .await;
        harness.settle(1).await;
        let form_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::FormSubmitted(FormSubmittedEvent {
                meta,
                custom_id: form_id,
                values: vec![
                    ("targets".to_owned(), "erin".to_owned()),
                    ("amount".to_owned(), "-3".to_owned()),
                ],
            }))
            .await;
        harness.settle(0).await;

        assert!(harness.ledger.applied().is_empty());
        assert!(matches!(
            harness.surface.calls().last(),
            Some(SurfaceCall::Edit { message, .. })
                if message.fallback_text.contains("positive number")
        ));
    }

    #[tokio::test]
    async fn unknown_entry_variant_is_ignored() {
        let mut harness = Harness::new();
        let meta = harness.meta("U1");
        let result = harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Reset"),
            }))
            .await;
        assert_eq!(result, HandlerResult::Ignored);
        assert!(harness.surface.calls().is_empty());
    }

    #[tokio::test]
    async fn blank_amount_uses_the_selected_roles_payment() {
        let mut harness = Harness::new();

        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent {
                meta,
                custom_id: format!("{GROUP_ADJUSTMENT_NAMESPACE}/Del"),
            }))
            .await;
        harness.settle(1).await;
        let form_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::FormSubmitted(FormSubmittedEvent {
                meta,
                custom_id: form_id,
                values: vec![
                    ("targets".to_owned(), "frank".to_owned()),
                    ("amount".to_owned(), "  ".to_owned()),
                ],
            }))
            .await;
        harness.settle(1).await;
        let select_id = harness.last_custom_ids().remove(0);
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::SelectionMade(SelectionEvent {
                meta,
                custom_id: select_id,
                values: vec!["r-veteran".to_owned()],
            }))
            .await;
        harness.settle(1).await;

        let yes = harness
            .last_custom_ids()
            .into_iter()
            .find(|id| id.contains("/True@"))
            .expect("yes button");
        let meta = harness.meta("U1");
        harness
            .send(InteractionEvent::ButtonPressed(ButtonPressEvent { meta, custom_id: yes }))
            .await;
        harness.settle(0).await;

        let applied = harness.ledger.applied();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].role_id, "r-veteran");
        assert_eq!(applied[0].delta, Decimal::new(-300, 0));
    }

    #[test]
    fn targets_split_on_commas_only() {
        assert_eq!(
            parse_targets(" alice,bob smith\n, ,carol "),
            vec!["alice", "bob smith", "carol"]
        );
        assert!(parse_targets("  ").is_empty());
    }
}
