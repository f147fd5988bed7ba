// DANS : src/webserver.rs
//
// L'adaptateur HTTP : une façade mince sur le screener, le keep-alive et le
// store. Toute la logique vit ailleurs, ici on ne fait que router et
// valider les entrées au bord.

use crate::keepalive::KeepAlive;
use crate::persist::{PoolUpdateStore, UpdateFilter};
use crate::screener::{Screener, StartOutcome, StopOutcome};
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub screener: Arc<Screener>,
    pub store: Arc<PoolUpdateStore>,
    pub keepalive: Arc<KeepAlive>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_pool_updates))
        .route("/screener/enable", post(enable_screener))
        .route("/screener/disable", post(disable_screener))
        .route("/keepalive/enable", post(enable_keepalive))
        .route("/keepalive/disable", post(disable_keepalive))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Impossible d'écouter sur {addr}"))?;
    info!(addr = %addr, "⚡ serveur HTTP démarré");
    axum::serve(listener, router(state))
        .await
        .context("Le serveur HTTP s'est arrêté")
}

#[derive(Deserialize)]
struct ListQuery {
    min: Option<String>,
    max: Option<String>,
}

/// Une requête mal formée est rejetée au bord, elle n'atteint jamais le store.
fn parse_query_number(raw: &Option<String>, name: &str) -> Result<Option<f64>, Response> {
    match raw {
        None => Ok(None),
        Some(value) => value.parse::<f64>().map(Some).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                format!("Query parameter {name} must be a valid number."),
            )
                .into_response()
        }),
    }
}

async fn list_pool_updates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let min_percentage = match parse_query_number(&query.min, "min") {
        Ok(value) => value,
        Err(response) => return response,
    };
    let max_percentage = match parse_query_number(&query.max, "max") {
        Ok(value) => value,
        Err(response) => return response,
    };

    match state
        .store
        .list_updates(UpdateFilter {
            min_percentage,
            max_percentage,
        })
        .await
    {
        Ok(pools) => Json(pools).into_response(),
        Err(read_error) => {
            error!(error = ?read_error, "échec de lecture des mises à jour");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read pool updates.",
            )
                .into_response()
        }
    }
}

async fn enable_screener(State(state): State<AppState>) -> Response {
    match state.screener.start().await {
        Ok(StartOutcome::Started) => "Screener enabled.".into_response(),
        Ok(StartOutcome::AlreadyRunning) => "Screener is already enabled.".into_response(),
        Err(start_error) => {
            error!(error = ?start_error, "échec du démarrage du screener");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to enable screener.",
            )
                .into_response()
        }
    }
}

async fn disable_screener(State(state): State<AppState>) -> Response {
    match state.screener.stop().await {
        StopOutcome::Stopped => "Screener disabled.".into_response(),
        StopOutcome::AlreadyStopped => "Screener is already disabled.".into_response(),
    }
}

async fn enable_keepalive(State(state): State<AppState>) -> Response {
    match state.keepalive.enable() {
        Ok(true) => "Keep-alive enabled.".into_response(),
        Ok(false) => "Keep-alive is already enabled.".into_response(),
        Err(enable_error) => {
            error!(error = ?enable_error, "échec du démarrage du keep-alive");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to enable keep-alive.",
            )
                .into_response()
        }
    }
}

async fn disable_keepalive(State(state): State<AppState>) -> Response {
    if state.keepalive.disable() {
        "Keep-alive disabled.".into_response()
    } else {
        "Keep-alive is already disabled.".into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejette_un_parametre_non_numerique() {
        match parse_query_number(&Some("abc".to_string()), "min") {
            Err(response) => assert_eq!(response.status(), StatusCode::BAD_REQUEST),
            Ok(_) => panic!("un paramètre non numérique doit être rejeté"),
        }
    }

    #[test]
    fn accepte_un_parametre_absent_ou_valide() {
        assert!(matches!(parse_query_number(&None, "min"), Ok(None)));
        assert!(matches!(
            parse_query_number(&Some("0.25".to_string()), "max"),
            Ok(Some(value)) if value == 0.25
        ));
    }
}
