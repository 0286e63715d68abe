use crate::error::StoreError;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::required_str;
use crate::ipc::types::{AppState, Request};
use crate::validate::{normalize_roll, normalize_subject, parse_grade, Score};
use serde_json::json;

fn handle_grades_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let roll = match required_str(req, "rollNumber").map(normalize_roll) {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return store_err(&req.id, &e),
        Err(resp) => return resp,
    };
    let subject = match required_str(req, "subject").map(normalize_subject) {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => return store_err(&req.id, &e),
        Err(resp) => return resp,
    };
    // Forms send text, scripts send numbers.
    let score = match req.params.get("grade") {
        Some(serde_json::Value::String(s)) => parse_grade(s),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| StoreError::invalid("grade must be an integer"))
            .and_then(Score::new),
        Some(_) => {
            return err(
                &req.id,
                "bad_params",
                "grade must be a string or integer",
                None,
            )
        }
        None => return err(&req.id, "bad_params", "missing grade", None),
    };
    let score = match score {
        Ok(v) => v,
        Err(e) => return store_err(&req.id, &e),
    };

    match state.store.record_grade(&roll, &subject, score) {
        Ok(()) => ok(
            &req.id,
            json!({
                "rollNumber": roll.as_str(),
                "subject": subject.as_str(),
                "grade": score.value()
            }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.upsert" => Some(handle_grades_upsert(state, req)),
        _ => None,
    }
}
