use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "request");
    let resp = route(state, &req);
    if let Some(e) = resp.get("error") {
        tracing::info!(
            id = %req.id,
            method = %req.method,
            code = e.get("code").and_then(|v| v.as_str()).unwrap_or(""),
            "request failed"
        );
    }
    resp
}

fn route(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::analytics::try_handle(state, req) {
        return resp;
    }
    if let Some(resp) = handlers::export::try_handle(state, req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
