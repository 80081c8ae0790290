//! Outbound half of the platform contract: rendering prompts and mutating the
//! visible message a dialogue lives on.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

use crate::blocks::{FormTemplate, MessageTemplate};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
    #[error("rendering prompt failed: {0}")]
    Render(String),
    #[error("editing surface failed: {0}")]
    Edit(String),
    #[error("deleting surface failed: {0}")]
    Delete(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    Command,
    ButtonPress,
    FormSubmission,
    Selection,
}

/// The platform event a reply is addressed to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionRef {
    pub interaction_id: String,
    pub kind: InteractionKind,
    pub channel_id: String,
    pub user_id: String,
}

/// A persistent message rendered by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveSurface {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderTarget<'a> {
    pub interaction: &'a InteractionRef,
    /// Whether the interaction already received its initial response. A form
    /// can only be opened as the initial response.
    pub acknowledged: bool,
    pub surface: Option<&'a LiveSurface>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceSpec {
    Message(MessageTemplate),
    Form(FormTemplate),
}

#[async_trait]
pub trait Surface: Send + Sync {
    /// Shows a prompt. Messages edit `target.surface` when present and yield
    /// the live message; forms yield `None`.
    async fn render(
        &self,
        target: RenderTarget<'_>,
        spec: SurfaceSpec,
    ) -> Result<Option<LiveSurface>, TransportError>;

    /// Sends the deferred initial response so the interaction stays editable.
    async fn acknowledge(&self, interaction: &InteractionRef) -> Result<(), TransportError>;

    async fn edit(
        &self,
        target: RenderTarget<'_>,
        message: MessageTemplate,
    ) -> Result<(), TransportError>;

    async fn delete(&self, target: RenderTarget<'_>) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopSurface;

#[async_trait]
impl Surface for NoopSurface {
    async fn render(
        &self,
        target: RenderTarget<'_>,
        spec: SurfaceSpec,
    ) -> Result<Option<LiveSurface>, TransportError> {
        Ok(match spec {
            SurfaceSpec::Form(_) => None,
            SurfaceSpec::Message(_) => Some(target.surface.cloned().unwrap_or_else(|| {
                LiveSurface {
                    channel_id: target.interaction.channel_id.clone(),
                    message_id: format!("noop-{}", target.interaction.interaction_id),
                }
            })),
        })
    }

    async fn acknowledge(&self, _interaction: &InteractionRef) -> Result<(), TransportError> {
        Ok(())
    }

    async fn edit(
        &self,
        _target: RenderTarget<'_>,
        _message: MessageTemplate,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn delete(&self, _target: RenderTarget<'_>) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceCall {
    Render { interaction_id: String, acknowledged: bool, spec: SurfaceSpec },
    Acknowledge { interaction_id: String },
    Edit { interaction_id: String, message_id: Option<String>, message: MessageTemplate },
    Delete { interaction_id: String, message_id: Option<String> },
}

/// In-memory surface that records every call; scripted failures are returned
/// for the next matching call.
#[derive(Default)]
pub struct RecordingSurface {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<SurfaceCall>,
    fail_next_render: Option<TransportError>,
    rendered_messages: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_render(&self, error: TransportError) {
        self.lock().fail_next_render = Some(error);
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.lock().calls.clone()
    }

    /// Custom ids of every rendered prompt, forms and messages alike.
    pub fn rendered_custom_ids(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SurfaceCall::Render { spec: SurfaceSpec::Message(message), .. } => Some(
                    message.custom_ids().into_iter().map(str::to_owned).collect::<Vec<_>>(),
                ),
                SurfaceCall::Render { spec: SurfaceSpec::Form(form), .. } => {
                    Some(vec![form.custom_id.clone()])
                }
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Surface for RecordingSurface {
    async fn render(
        &self,
        target: RenderTarget<'_>,
        spec: SurfaceSpec,
    ) -> Result<Option<LiveSurface>, TransportError> {
        let mut state = self.lock();
        if let Some(error) = state.fail_next_render.take() {
            return Err(error);
        }
        let is_form = matches!(spec, SurfaceSpec::Form(_));
        state.calls.push(SurfaceCall::Render {
            interaction_id: target.interaction.interaction_id.clone(),
            acknowledged: target.acknowledged,
            spec,
        });
        if is_form {
            return Ok(None);
        }
        if let Some(surface) = target.surface {
            return Ok(Some(surface.clone()));
        }
        state.rendered_messages += 1;
        Ok(Some(LiveSurface {
            channel_id: target.interaction.channel_id.clone(),
            message_id: format!("msg-{}", state.rendered_messages),
        }))
    }

    async fn acknowledge(&self, interaction: &InteractionRef) -> Result<(), TransportError> {
        self.lock()
            .calls
            .push(SurfaceCall::Acknowledge { interaction_id: interaction.interaction_id.clone() });
        Ok(())
    }

    async fn edit(
        &self,
        target: RenderTarget<'_>,
        message: MessageTemplate,
    ) -> Result<(), TransportError> {
        self.lock().calls.push(SurfaceCall::Edit {
            interaction_id: target.interaction.interaction_id.clone(),
            message_id: target.surface.map(|surface| surface.message_id.clone()),
            message,
        });
        Ok(())
    }

    async fn delete(&self, target: RenderTarget<'_>) -> Result<(), TransportError> {
        self.lock().calls.push(SurfaceCall::Delete {
            interaction_id: target.interaction.interaction_id.clone(),
            message_id: target.surface.map(|surface| surface.message_id.clone()),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InteractionKind, InteractionRef, LiveSurface, NoopSurface, RecordingSurface,
        RenderTarget, Surface, SurfaceCall, SurfaceSpec, TransportError,
    };
    use crate::blocks::notice_message;

    fn interaction() -> InteractionRef {
        InteractionRef {
            interaction_id: "i-1".to_owned(),
            kind: InteractionKind::Command,
            channel_id: "C1".to_owned(),
            user_id: "U1".to_owned(),
        }
    }

    #[tokio::test]
    async fn noop_surface_reuses_existing_message() {
        let interaction = interaction();
        let existing = LiveSurface { channel_id: "C1".to_owned(), message_id: "m-9".to_owned() };
        let rendered = NoopSurface
            .render(
                RenderTarget {
                    interaction: &interaction,
                    acknowledged: true,
                    surface: Some(&existing),
                },
                SurfaceSpec::Message(notice_message("hi")),
            )
            .await
            .expect("render");
        assert_eq!(rendered, Some(existing));
    }

    #[tokio::test]
    async fn recording_surface_returns_scripted_render_failure_once() {
        let surface = RecordingSurface::new();
        let interaction = interaction();
        surface.fail_next_render(TransportError::Render("rate limited".to_owned()));

        let target = RenderTarget { interaction: &interaction, acknowledged: false, surface: None };
        let first = surface.render(target, SurfaceSpec::Message(notice_message("a"))).await;
        assert_eq!(first, Err(TransportError::Render("rate limited".to_owned())));

        let second = surface
            .render(target, SurfaceSpec::Message(notice_message("b")))
            .await
            .expect("second render");
        assert_eq!(second.map(|s| s.message_id), Some("msg-1".to_owned()));
        assert_eq!(surface.calls().len(), 1);
        assert!(matches!(&surface.calls()[0], SurfaceCall::Render { acknowledged: false, .. }));
    }
}
