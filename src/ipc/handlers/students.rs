use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let query = optional_str(req, "q").unwrap_or("");
    match state.store.search_students(query) {
        Ok(students) => {
            let students: Vec<serde_json::Value> = students
                .into_iter()
                .map(|s| json!({ "rollNumber": s.roll_number, "name": s.name }))
                .collect();
            ok(&req.id, json!({ "students": students }))
        }
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_students_count(state: &mut AppState, req: &Request) -> serde_json::Value {
    match state.store.student_count() {
        Ok(count) => ok(&req.id, json!({ "count": count })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let roll = match required_str(req, "rollNumber") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.store.add_student(name, roll) {
        Ok(s) => ok(
            &req.id,
            json!({ "rollNumber": s.roll_number, "name": s.name }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let roll = match required_str(req, "rollNumber") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.store.student_report(roll) {
        Ok(Some((student, average))) => ok(
            &req.id,
            json!({
                "student": {
                    "rollNumber": student.roll_number,
                    "name": student.name,
                    "grades": student.grades,
                },
                "average": average
            }),
        ),
        Ok(None) => err(&req.id, "not_found", "student not found", None),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let roll = match required_str(req, "rollNumber") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match state.store.delete_student(roll) {
        Ok(()) => ok(&req.id, json!({ "ok": true })),
        Err(e) => store_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.count" => Some(handle_students_count(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
