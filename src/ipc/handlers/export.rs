use crate::export;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;

fn write_out(req: &Request, out_path: &str, contents: &str) -> Result<(), serde_json::Value> {
    let out = Path::new(out_path);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return Err(err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            ));
        }
    }
    std::fs::write(out, contents).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        )
    })
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rows = match state.store.export_all() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let csv = export::to_csv(&rows);

    match optional_str(req, "outPath") {
        Some(out_path) => match write_out(req, out_path, &csv) {
            Ok(()) => ok(
                &req.id,
                json!({ "path": out_path, "rowsExported": rows.len() }),
            ),
            Err(resp) => resp,
        },
        None => ok(&req.id, json!({ "csv": csv })),
    }
}

fn handle_export_json(state: &mut AppState, req: &Request) -> serde_json::Value {
    let rows = match state.store.export_all() {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let records = export::group_rows(&rows);
    let text = match export::to_json(&records) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "serialize_failed", e.to_string(), None),
    };

    match optional_str(req, "outPath") {
        Some(out_path) => match write_out(req, out_path, &text) {
            Ok(()) => ok(
                &req.id,
                json!({ "path": out_path, "studentsExported": records.len() }),
            ),
            Err(resp) => resp,
        },
        None => ok(&req.id, json!({ "json": text })),
    }
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match required_str(req, "outPath") {
        Ok(v) if !v.trim().is_empty() => v.trim(),
        Ok(_) => return err(&req.id, "bad_params", "missing outPath", None),
        Err(resp) => return resp,
    };

    match export::write_bundle(&state.store, Path::new(out_path)) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "path": out_path,
                "format": summary.bundle_format,
                "entryCount": summary.entry_count,
                "students": summary.students,
                "rows": summary.rows
            }),
        ),
        Err(e) => err(
            &req.id,
            "io_failed",
            format!("{e:#}"),
            Some(json!({ "path": out_path })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.csv" => Some(handle_export_csv(state, req)),
        "export.json" => Some(handle_export_json(state, req)),
        "export.bundle" => Some(handle_export_bundle(state, req)),
        _ => None,
    }
}
