use parley_core::DecodeError;

use crate::session::SessionChainHandle;
use crate::surface::TransportError;

/// How a single prompt ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogueOutcome<T> {
    Completed(T),
    TimedOut,
    Cancelled,
    Rejected(DecodeError),
    Transport(TransportError),
}

impl<T> DialogueOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DialogueOutcome<U> {
        match self {
            Self::Completed(value) => DialogueOutcome::Completed(f(value)),
            Self::TimedOut => DialogueOutcome::TimedOut,
            Self::Cancelled => DialogueOutcome::Cancelled,
            Self::Rejected(error) => DialogueOutcome::Rejected(error),
            Self::Transport(error) => DialogueOutcome::Transport(error),
        }
    }

    /// Text shown on the surface when a dialogue stops here. `None` for
    /// completed prompts, which the workflow answers itself.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::TimedOut => {
                Some("This prompt expired before a response was received.".to_owned())
            }
            Self::Cancelled => Some("This dialogue was cancelled.".to_owned()),
            Self::Rejected(error) => Some(format!("The response could not be accepted: {error}.")),
            Self::Transport(_) => Some(
                "The chat platform is temporarily unavailable. Please retry shortly.".to_owned(),
            ),
        }
    }
}

/// A prompt's outcome together with the handle the workflow continues with.
/// On completion (and on a rejected answer) the handle is bound to the
/// responding interaction; otherwise it is the issuing handle, which can only
/// close the surface.
#[derive(Debug)]
#[must_use]
pub struct Step<T> {
    pub outcome: DialogueOutcome<T>,
    pub handle: SessionChainHandle,
}

#[derive(Debug)]
pub struct Interrupted {
    pub outcome: DialogueOutcome<()>,
    pub handle: SessionChainHandle,
}

impl<T> Step<T> {
    pub fn completed(self) -> Result<(T, SessionChainHandle), Interrupted> {
        match self.outcome {
            DialogueOutcome::Completed(value) => Ok((value, self.handle)),
            outcome => Err(Interrupted { outcome: outcome.map(|_| ()), handle: self.handle }),
        }
    }
}
