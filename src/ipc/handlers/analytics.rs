use crate::ipc::error::{ok, store_err};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::validate::normalize_subject;
use serde_json::json;

fn handle_student_average(state: &mut AppState, req: &Request) -> serde_json::Value {
    let roll = match required_str(req, "rollNumber") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match state.store.student_average(roll) {
        Ok(average) => ok(&req.id, json!({ "average": average })),
        Err(e) => store_err(&req.id, &e),
    }
}

/// Class average and topper for one subject, in one round trip.
fn handle_subject(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match required_str(req, "subject") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject = match normalize_subject(raw) {
        Ok(s) => s,
        Err(e) => return store_err(&req.id, &e),
    };

    let average = match state.store.subject_average(&subject) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };
    let topper = match state.store.topper_of(&subject) {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };

    ok(
        &req.id,
        json!({
            "subject": subject.as_str(),
            "average": average,
            "topper": topper.map(|t| json!({
                "rollNumber": t.roll_number,
                "name": t.name,
                "grade": t.grade
            }))
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.studentAverage" => Some(handle_student_average(state, req)),
        "analytics.subject" => Some(handle_subject(state, req)),
        _ => None,
    }
}
