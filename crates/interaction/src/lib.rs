//! Interaction dialogue engine
//!
//! Lets a workflow written as straight-line async code ask a chat user for
//! structured input and suspend until the answer arrives:
//! - **Prompts** (`prompts`) - `await_form`, `await_buttons`, `await_selection`
//! - **Registry** (`registry`) - correlation token to suspended waiter
//! - **Sweeper** (`sweeper`) - per-waiter deadline timers
//! - **Session** (`session`) - chain handle threading one dialogue through its steps
//! - **Events** (`events`) - inbound interaction model and dispatcher
//! - **Gateway** (`socket`) - event source loop with reconnection
//! - **Surface** (`surface`, `blocks`) - outbound rendering contract and message builders
//!
//! # Architecture
//!
//! ```text
//! Gateway → EventDispatcher → PendingWaitRegistry → suspended workflow
//!                 ↓                                        ↓
//!          entry handlers (spawn workflows)        Surface ← next prompt
//! ```

pub mod blocks;
pub mod events;
pub mod outcome;
pub mod prompts;
pub mod registry;
pub mod session;
pub mod socket;
pub mod surface;
pub mod sweeper;

pub use outcome::{DialogueOutcome, Interrupted, Step};
pub use prompts::{
    ButtonChoice, ButtonPrompt, DialogueEngine, EngineConfig, FormPrompt, SelectionPrompt,
};
pub use session::{SessionChainHandle, SessionContext};
