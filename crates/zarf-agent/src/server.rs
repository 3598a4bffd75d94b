//! Admission webhook server
//!
//! One `/mutate` route handling every registered kind. State loads once per
//! request from the state secret, so credential rotations apply without a
//! restart. Mutation failures answer 500; kinds without a hook are allowed
//! through with an empty patch.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use zarf_kube::PackageStore;

use crate::admission::{self, AdmissionReview};

/// Shared server dependencies
#[derive(Clone)]
pub struct AgentState {
    pub store: Arc<dyn PackageStore>,
}

/// Build the webhook router
pub fn router(state: AgentState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/mutate", post(mutate))
        .with_state(state)
}

/// Serve the webhook until the process is stopped
pub async fn serve(state: AgentState, bind: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "admission agent listening");
    axum::serve(listener, router(state)).await
}

async fn healthz() -> &'static str {
    "ok"
}

async fn mutate(
    State(state): State<AgentState>,
    Json(review): Json<AdmissionReview>,
) -> Result<Json<AdmissionReview>, (StatusCode, String)> {
    let package_state = state.store.load_state().await.map_err(|e| {
        tracing::error!(error = %e, "unable to load state for admission request");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    match admission::review(&package_state, review) {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            // Unknown operations, malformed objects and unparseable URLs all
            // fail the request rather than letting an unmutated resource in.
            tracing::error!(error = %e, "admission mutation failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use tower::util::ServiceExt;
    use zarf_core::state::{GitServerInfo, PackageState};
    use zarf_kube::MemoryStore;

    use crate::operations::PatchOperation;

    fn test_state() -> AgentState {
        let state = PackageState {
            git_server: GitServerInfo {
                address: "https://git-server.com".to_string(),
                push_username: "a-push-user".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        AgentState {
            store: Arc::new(MemoryStore::with_state(state)),
        }
    }

    fn git_repo_review(url: &str) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "test-uid",
                "operation": "CREATE",
                "kind": {
                    "group": "source.toolkit.fluxcd.io",
                    "version": "v1",
                    "kind": "GitRepository"
                },
                "object": {
                    "metadata": { "name": "mutate-this" },
                    "spec": {
                        "url": url,
                        "ref": { "tag": "6.4.0" }
                    }
                }
            }
        })
    }

    async fn post_review(review: serde_json::Value) -> (StatusCode, Option<AdmissionReview>) {
        let app = router(test_state());
        let response = app
            .oneshot(
                Request::post("/mutate")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&review).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).ok())
    }

    #[tokio::test]
    async fn mutates_flux_git_repository_over_http() {
        let (status, review) =
            post_review(git_repo_review("https://github.com/stefanprodan/podinfo.git")).await;
        assert_eq!(status, StatusCode::OK);

        let response = review.unwrap().response.unwrap();
        assert!(response.allowed);
        assert_eq!(response.uid, "test-uid");
        assert_eq!(response.patch_type.as_deref(), Some("JSONPatch"));

        let patch_bytes = base64::engine::general_purpose::STANDARD
            .decode(response.patch.unwrap())
            .unwrap();
        let ops: Vec<PatchOperation> = serde_json::from_slice(&patch_bytes).unwrap();

        assert_eq!(ops[0].path, "/spec/url");
        assert_eq!(
            ops[0].value,
            serde_json::json!("https://git-server.com/a-push-user/podinfo-1646971829.git")
        );
        assert_eq!(ops[1].path, "/spec/secretRef");
        assert_eq!(ops[1].value, serde_json::json!({ "name": "private-git-server" }));
    }

    #[tokio::test]
    async fn invalid_git_url_answers_500() {
        let (status, _) = post_review(git_repo_review("not-a-git-url")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn healthz_answers() {
        let app = router(test_state());
        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
