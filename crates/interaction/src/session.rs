use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use parley_core::EngineError;
use tokio::time::Instant;

use crate::surface::{InteractionRef, LiveSurface, RenderTarget};

/// Who a dialogue belongs to and where it is shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub author_display_name: Option<String>,
    pub correlation_id: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandleState {
    Open,
    /// Returned after a prompt ended without an answer. It may still close
    /// the visible surface but cannot issue another prompt.
    Closing,
}

/// Capability to issue the next prompt of a dialogue, bound to the most
/// recent interaction. Issuing a prompt consumes it; the answer yields the
/// next one.
#[derive(Debug)]
pub struct SessionChainHandle {
    interaction: InteractionRef,
    surface: Option<LiveSurface>,
    context: SessionContext,
    acknowledged: bool,
    state: HandleState,
}

impl SessionChainHandle {
    pub fn open(interaction: InteractionRef, context: SessionContext) -> Self {
        Self { interaction, surface: None, context, acknowledged: false, state: HandleState::Open }
    }

    /// Entry handle for an interaction on an already visible message, such as
    /// a button press that starts a workflow.
    pub fn on_surface(
        interaction: InteractionRef,
        surface: LiveSurface,
        context: SessionContext,
    ) -> Self {
        Self { surface: Some(surface), ..Self::open(interaction, context) }
    }

    pub fn interaction(&self) -> &InteractionRef {
        &self.interaction
    }

    pub fn surface(&self) -> Option<&LiveSurface> {
        self.surface.as_ref()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged
    }

    pub fn is_open(&self) -> bool {
        self.state == HandleState::Open
    }

    pub(crate) fn target(&self) -> RenderTarget<'_> {
        RenderTarget {
            interaction: &self.interaction,
            acknowledged: self.acknowledged,
            surface: self.surface.as_ref(),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<(), EngineError> {
        match self.state {
            HandleState::Open => Ok(()),
            HandleState::Closing => Err(EngineError::HandleAlreadyConsumed {
                interaction_id: self.interaction.interaction_id.clone(),
            }),
        }
    }

    pub(crate) fn mark_acknowledged(&mut self) {
        self.acknowledged = true;
    }

    pub(crate) fn rendered(&mut self, surface: Option<LiveSurface>) {
        if surface.is_some() {
            self.surface = surface;
        }
        self.acknowledged = true;
    }

    /// Hands the chain over to the interaction that answered the prompt.
    pub(crate) fn advance(self, responder: InteractionRef) -> Self {
        Self {
            interaction: responder,
            surface: self.surface,
            context: self.context,
            acknowledged: false,
            state: HandleState::Open,
        }
    }

    pub(crate) fn closing(mut self) -> Self {
        self.state = HandleState::Closing;
        self
    }
}

/// Interaction ids that already issued a prompt, remembered for as long as the
/// platform keeps an interaction addressable.
#[derive(Clone, Debug)]
pub struct HandleLedger {
    ttl: Duration,
    consumed: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HandleLedger {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, consumed: Arc::default() }
    }

    pub fn consume(&self, interaction_id: &str) -> Result<(), EngineError> {
        let now = Instant::now();
        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        consumed.retain(|_, at| now.duration_since(*at) < self.ttl);
        if consumed.contains_key(interaction_id) {
            return Err(EngineError::HandleAlreadyConsumed {
                interaction_id: interaction_id.to_owned(),
            });
        }
        consumed.insert(interaction_id.to_owned(), now);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.consumed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_core::EngineError;

    use super::{HandleLedger, SessionChainHandle, SessionContext};
    use crate::surface::{InteractionKind, InteractionRef, LiveSurface};

    fn interaction(id: &str, kind: InteractionKind) -> InteractionRef {
        InteractionRef {
            interaction_id: id.to_owned(),
            kind,
            channel_id: "C1".to_owned(),
            user_id: "U1".to_owned(),
        }
    }

    fn context() -> SessionContext {
        SessionContext {
            user_id: "U1".to_owned(),
            channel_id: "C1".to_owned(),
            guild_id: Some("G1".to_owned()),
            author_display_name: Some("mod".to_owned()),
            correlation_id: "req-1".to_owned(),
        }
    }

    #[test]
    fn advancing_keeps_surface_and_resets_acknowledgement() {
        let mut handle =
            SessionChainHandle::open(interaction("i-1", InteractionKind::Command), context());
        handle.rendered(Some(LiveSurface {
            channel_id: "C1".to_owned(),
            message_id: "m-1".to_owned(),
        }));
        assert!(handle.is_acknowledged());

        let next = handle.advance(interaction("i-2", InteractionKind::ButtonPress));
        assert_eq!(next.interaction().interaction_id, "i-2");
        assert_eq!(next.surface().map(|s| s.message_id.as_str()), Some("m-1"));
        assert!(!next.is_acknowledged());
        assert!(next.is_open());
    }

    #[test]
    fn closing_handle_refuses_to_issue() {
        let handle =
            SessionChainHandle::open(interaction("i-1", InteractionKind::Command), context());
        let handle = handle.closing();
        assert_eq!(
            handle.ensure_open(),
            Err(EngineError::HandleAlreadyConsumed { interaction_id: "i-1".to_owned() })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ledger_rejects_reuse_until_ttl_elapses() {
        let ledger = HandleLedger::new(Duration::from_secs(900));
        ledger.consume("i-1").expect("first use");
        assert!(matches!(
            ledger.consume("i-1"),
            Err(EngineError::HandleAlreadyConsumed { .. })
        ));

        tokio::time::advance(Duration::from_secs(901)).await;
        ledger.consume("i-2").expect("unrelated id");
        assert_eq!(ledger.len(), 1, "expired entry should be pruned");
    }
}
