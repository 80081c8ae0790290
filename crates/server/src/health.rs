use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use parley_interaction::registry::PendingWaitRegistry;
use serde::Serialize;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    registry: PendingWaitRegistry,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub dialogues: HealthCheck,
    pub pending_prompts: usize,
    pub checked_at: String,
}

pub fn router(registry: PendingWaitRegistry) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { registry })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    registry: PendingWaitRegistry,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(registry)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let pending_prompts = state.registry.len();

    let payload = HealthResponse {
        status: "ready",
        service: HealthCheck {
            status: "ready",
            detail: "parley-server runtime initialized".to_string(),
        },
        dialogues: HealthCheck {
            status: "ready",
            detail: format!("{pending_prompts} prompt(s) awaiting a response"),
        },
        pending_prompts,
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, extract::State, http::Request, http::StatusCode, Json};
    use parley_core::{CorrelationToken, Namespace, PromptSchema, TokenCodec};
    use parley_interaction::registry::{PendingWaitRegistry, Registration};
    use parley_interaction::SessionContext;
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    fn form_token() -> CorrelationToken {
        let namespace = Namespace::new("health::check").expect("namespace");
        TokenCodec.encode(&namespace, "Form@status").expect("token")
    }

    #[tokio::test]
    async fn health_reports_pending_prompt_count() {
        let registry = PendingWaitRegistry::default();
        let _waiter = registry
            .register(Registration {
                tokens: vec![form_token()],
                schema: PromptSchema::Form { fields: Vec::new() },
                deadline: tokio::time::Instant::now() + Duration::from_secs(60),
                context: SessionContext {
                    user_id: "U1".to_owned(),
                    channel_id: "C1".to_owned(),
                    guild_id: None,
                    author_display_name: None,
                    correlation_id: "req-1".to_owned(),
                },
            })
            .expect("register");

        let (status, Json(payload)) = health(State(HealthState { registry })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.pending_prompts, 1);
        assert_eq!(payload.dialogues.detail, "1 prompt(s) awaiting a response");

        let json = serde_json::to_value(&payload).expect("payload serializes");
        assert_eq!(json["pending_prompts"], 1);
        assert_eq!(json["service"]["status"], "ready");
    }

    #[tokio::test]
    async fn health_route_is_served() {
        let response = router(PendingWaitRegistry::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }
}
