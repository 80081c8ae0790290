//! Pending wait registry.
//!
//! Maps every outstanding correlation token to the one waiter it belongs to.
//! A waiter may own several tokens (one per button); resolving or expiring the
//! waiter removes all of them at once, so a late press on a sibling button
//! finds nothing. The lock is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use parley_core::{
    decode_response, CorrelationToken, DecodeError, EngineError, PromptKind, PromptSchema,
    PromptValue, RawResponse,
};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::session::SessionContext;
use crate::surface::InteractionRef;

pub type WaiterId = u64;

pub const DEFAULT_MAX_FORM_ATTEMPTS: u32 = 3;

/// What a suspended prompt issuer is woken with.
#[derive(Debug)]
pub enum Resolution {
    Answered { value: PromptValue, responder: InteractionRef },
    Rejected { error: DecodeError, responder: InteractionRef },
    TimedOut,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolveOutcome {
    Resolved { waiter: WaiterId },
    /// The submission failed to decode but the form stays open for another try.
    Retry { waiter: WaiterId, error: DecodeError, attempts_left: u32 },
    Rejected { waiter: WaiterId, error: DecodeError },
    /// Another user acted on a prompt they do not own; the waiter is untouched.
    ForeignActor { waiter: WaiterId },
    NoMatch,
}

/// An inbound component event addressed to a correlation token.
#[derive(Clone, Debug)]
pub struct InboundResponse {
    pub token: CorrelationToken,
    pub raw: RawResponse,
    pub responder: InteractionRef,
}

pub struct Registration {
    pub tokens: Vec<CorrelationToken>,
    pub schema: PromptSchema,
    pub deadline: Instant,
    pub context: SessionContext,
}

#[derive(Debug)]
pub struct WaiterHandle {
    id: WaiterId,
    kind: PromptKind,
    deadline: Instant,
    receiver: oneshot::Receiver<Resolution>,
}

impl WaiterHandle {
    pub fn id(&self) -> WaiterId {
        self.id
    }

    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspends until the waiter is resolved, expired or cancelled. A dropped
    /// registry reads as cancellation.
    pub async fn wait(self) -> Resolution {
        self.receiver.await.unwrap_or(Resolution::Cancelled)
    }
}

struct PendingWait {
    tokens: Vec<CorrelationToken>,
    schema: PromptSchema,
    deadline: Instant,
    context: SessionContext,
    resolver: oneshot::Sender<Resolution>,
    attempts: u32,
    timer: Option<AbortHandle>,
}

#[derive(Default)]
struct RegistryState {
    by_token: HashMap<CorrelationToken, WaiterId>,
    waiters: HashMap<WaiterId, PendingWait>,
    next_id: WaiterId,
}

impl RegistryState {
    fn remove(&mut self, id: WaiterId) -> Option<PendingWait> {
        let wait = self.waiters.remove(&id)?;
        for token in &wait.tokens {
            self.by_token.remove(token);
        }
        if let Some(timer) = &wait.timer {
            timer.abort();
        }
        Some(wait)
    }
}

#[derive(Clone)]
pub struct PendingWaitRegistry {
    state: Arc<Mutex<RegistryState>>,
    max_form_attempts: u32,
}

impl Default for PendingWaitRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FORM_ATTEMPTS)
    }
}

impl PendingWaitRegistry {
    pub fn new(max_form_attempts: u32) -> Self {
        Self { state: Arc::default(), max_form_attempts: max_form_attempts.max(1) }
    }

    pub fn register(&self, registration: Registration) -> Result<WaiterHandle, EngineError> {
        let Registration { tokens, schema, deadline, context } = registration;
        let mut state = self.lock();
        if let Some(taken) = tokens.iter().find(|token| state.by_token.contains_key(*token)) {
            return Err(EngineError::DuplicateToken { token: taken.to_string() });
        }

        state.next_id += 1;
        let id = state.next_id;
        let (resolver, receiver) = oneshot::channel();
        let kind = schema.kind();
        for token in &tokens {
            state.by_token.insert(token.clone(), id);
        }
        state.waiters.insert(
            id,
            PendingWait { tokens, schema, deadline, context, resolver, attempts: 0, timer: None },
        );

        Ok(WaiterHandle { id, kind, deadline, receiver })
    }

    /// Stores the deadline timer so resolution can abort it. Returns `false`
    /// when the waiter is already gone and the caller should abort the timer.
    pub fn attach_timer(&self, id: WaiterId, timer: AbortHandle) -> bool {
        match self.lock().waiters.get_mut(&id) {
            Some(wait) => {
                wait.timer = Some(timer);
                true
            }
            None => false,
        }
    }

    pub fn try_resolve(&self, response: InboundResponse) -> ResolveOutcome {
        let InboundResponse { token, raw, responder } = response;
        let mut state = self.lock();
        let Some(&id) = state.by_token.get(&token) else {
            return ResolveOutcome::NoMatch;
        };
        let Some(wait) = state.waiters.get_mut(&id) else {
            return ResolveOutcome::NoMatch;
        };

        if wait.context.user_id != responder.user_id {
            return ResolveOutcome::ForeignActor { waiter: id };
        }

        // The deadline timer may not have run yet; an answer at or past the
        // deadline still counts as a timeout.
        if Instant::now() >= wait.deadline {
            if let Some(wait) = state.remove(id) {
                send(id, wait.resolver, Resolution::TimedOut);
            }
            return ResolveOutcome::NoMatch;
        }

        match decode_response(&wait.schema, &token, &raw) {
            Ok(value) => {
                if let Some(wait) = state.remove(id) {
                    send(id, wait.resolver, Resolution::Answered { value, responder });
                }
                ResolveOutcome::Resolved { waiter: id }
            }
            Err(error) if wait.schema.kind().is_retryable() => {
                wait.attempts += 1;
                if wait.attempts < self.max_form_attempts {
                    return ResolveOutcome::Retry {
                        waiter: id,
                        error,
                        attempts_left: self.max_form_attempts - wait.attempts,
                    };
                }
                if let Some(wait) = state.remove(id) {
                    let rejected = Resolution::Rejected { error: error.clone(), responder };
                    send(id, wait.resolver, rejected);
                }
                ResolveOutcome::Rejected { waiter: id, error }
            }
            Err(error) => {
                if let Some(wait) = state.remove(id) {
                    let rejected = Resolution::Rejected { error: error.clone(), responder };
                    send(id, wait.resolver, rejected);
                }
                ResolveOutcome::Rejected { waiter: id, error }
            }
        }
    }

    /// Called by the deadline timer. Returns whether the waiter was still live.
    pub fn expire(&self, id: WaiterId) -> bool {
        self.finish(id, Resolution::TimedOut)
    }

    pub fn cancel(&self, id: WaiterId) -> bool {
        self.finish(id, Resolution::Cancelled)
    }

    /// Cancels every waiter owned by `user_id`.
    pub fn cancel_session(&self, user_id: &str) -> usize {
        let mut state = self.lock();
        let owned: Vec<WaiterId> = state
            .waiters
            .iter()
            .filter(|(_, wait)| wait.context.user_id == user_id)
            .map(|(id, _)| *id)
            .collect();
        for id in &owned {
            if let Some(wait) = state.remove(*id) {
                send(*id, wait.resolver, Resolution::Cancelled);
            }
        }
        owned.len()
    }

    pub fn contains(&self, token: &CorrelationToken) -> bool {
        self.lock().by_token.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finish(&self, id: WaiterId, resolution: Resolution) -> bool {
        match self.lock().remove(id) {
            Some(wait) => {
                send(id, wait.resolver, resolution);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn send(id: WaiterId, resolver: oneshot::Sender<Resolution>, resolution: Resolution) {
    if resolver.send(resolution).is_err() {
        debug!(
            event_name = "dialogue.waiter.orphaned",
            waiter_id = id,
            "waiter resolved after its issuer went away"
        );
    }
}
