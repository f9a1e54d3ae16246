//! Serve mode request handlers.
//!
//! `POST /v1/evaluate` takes the same body as hook mode and always answers
//! with a `HookOutput` object; decode failures are 400s.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;

use hookguard_core::error::{ErrorCode, HookGuardError};
use hookguard_core::protocol::{HookInput, HookOutput};

use crate::app_state::AppState;

fn error_response(e: &HookGuardError) -> Response {
    let status = match e.code() {
        ErrorCode::Decode => StatusCode::BAD_REQUEST,
        ErrorCode::Config | ErrorCode::RuleLoad | ErrorCode::UnsupportedVersion => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = Json(json!({
        "error": e.code().as_str(),
        "message": e.to_string(),
    }));
    (status, body).into_response()
}

pub async fn evaluate(State(state): State<AppState>, body: Bytes) -> Response {
    let input = match HookInput::decode(&body) {
        Ok(i) => i,
        Err(e) => {
            state.engine().metrics().decode_errors.inc(&[]);
            tracing::warn!(error = %e, "rejecting undecodable request");
            return error_response(&e);
        }
    };

    // The file counter store and audit sink do blocking I/O.
    let worker = state.clone();
    let res = tokio::task::spawn_blocking(move || worker.engine().handle(&input, Utc::now())).await;

    match res {
        Ok(Ok(decision)) => (StatusCode::OK, Json(HookOutput::from_decision(&decision))).into_response(),
        Ok(Err(e)) => {
            if matches!(e, HookGuardError::Decode(_)) {
                state.engine().metrics().decode_errors.inc(&[]);
            }
            tracing::error!(error = %e, "evaluation failed");
            error_response(&e)
        }
        Err(join) => {
            tracing::error!(error = %join, "evaluation task failed");
            error_response(&HookGuardError::Internal("evaluation task failed".into()))
        }
    }
}

pub async fn reload(State(state): State<AppState>) -> Response {
    match state.reload() {
        Ok(()) => (StatusCode::OK, Json(json!({ "reloaded": state.source().to_string() }))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, source = %state.source(), "policy reload failed; keeping previous policy");
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::{self, PolicySource};
    use crate::policy::PolicySnapshot;
    use crate::ratelimit::InMemoryCounterStore;
    use std::sync::Arc;

    fn state(source: PolicySource) -> AppState {
        let cfg = config::load_default().unwrap();
        AppState::with_parts(
            PolicySnapshot::compile(&cfg).unwrap(),
            source,
            std::env::temp_dir(),
            Arc::new(InMemoryCounterStore::default()),
            Arc::new(MemoryAuditSink::new()),
        )
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn evaluate_blocks_deleting_tools() {
        let body = Bytes::from_static(br#"{"tool_name":"mcp__github__delete_repo","tool_input":"{}"}"#);
        let resp = evaluate(State(state(PolicySource::Builtin)), body).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let v = body_json(resp).await;
        assert_eq!(v["decision"], "block");
        assert!(v["reason"].as_str().unwrap().contains("mcp__github__delete_repo"));
    }

    #[tokio::test]
    async fn evaluate_rejects_garbage() {
        let resp = evaluate(State(state(PolicySource::Builtin)), Bytes::from_static(b"nope")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "DECODE");
    }

    #[tokio::test]
    async fn reload_swaps_policy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(&path, "version: 1\n").unwrap();
        let s = state(PolicySource::File(path.clone()));
        assert_eq!(s.engine().snapshot().unwrap().rules.len(), 7);

        let resp = reload(State(s.clone())).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(s.engine().snapshot().unwrap().rules.len(), 0);

        std::fs::write(&path, "version: 1\nrules:\n  - kind: command\n    pattern: '('\n    verdict: block\n    message: x\n").unwrap();
        let resp = reload(State(s.clone())).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(s.engine().snapshot().unwrap().rules.len(), 0);
    }
}
