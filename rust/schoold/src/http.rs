use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put, MethodRouter};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::ipc::{self, AppState};

pub type SharedState = Arc<Mutex<AppState>>;

/// Raw `Authorization` header value; the router decides whether it is valid.
pub struct BearerToken(pub Option<String>);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(BearerToken(token))
    }
}

pub fn status_for(code: &str) -> StatusCode {
    match code {
        "bad_params" | "bad_json" => StatusCode::BAD_REQUEST,
        "validation_failed" => StatusCode::UNPROCESSABLE_ENTITY,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "forbidden" => StatusCode::FORBIDDEN,
        "not_found" | "not_implemented" => StatusCode::NOT_FOUND,
        "conflict" | "attendance_limit_reached" => StatusCode::CONFLICT,
        "delete_disabled" => StatusCode::METHOD_NOT_ALLOWED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "message": message, "code": code }))).into_response()
}

/// Turns an `{ok, result | error}` envelope into a status code and body.
fn envelope_response(mut envelope: serde_json::Value) -> Response {
    if envelope.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        return (StatusCode::OK, Json(envelope["result"].take())).into_response();
    }
    let error = envelope["error"].take();
    let code = error.get("code").and_then(|v| v.as_str()).unwrap_or("internal");
    let mut body = json!({
        "message": error.get("message").cloned().unwrap_or(serde_json::Value::Null),
        "code": code,
    });
    if let Some(details) = error.get("details") {
        body["details"] = details.clone();
    }
    (status_for(code), Json(body)).into_response()
}

async fn dispatch(
    state: SharedState,
    token: Option<String>,
    method: &'static str,
    params: serde_json::Value,
) -> Response {
    let req = ipc::Request {
        id: Uuid::new_v4().simple().to_string(),
        method: method.to_string(),
        params,
        token,
    };
    let joined = tokio::task::spawn_blocking(move || {
        let mut guard = match state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        ipc::handle_request(&mut guard, req)
    })
    .await;

    match joined {
        Ok(envelope) => envelope_response(envelope),
        Err(e) => {
            tracing::error!(method, error = %e, "request task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal", "request failed")
        }
    }
}

/// An empty body counts as `{}`; anything else must be a JSON object.
fn parse_body(body: &Bytes) -> Result<serde_json::Map<String, serde_json::Value>, Response> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(error_response(
            StatusCode::BAD_REQUEST,
            "bad_json",
            "request body must be a JSON object",
        )),
        Err(e) => Err(error_response(StatusCode::BAD_REQUEST, "bad_json", &e.to_string())),
    }
}

fn get_plain(method: &'static str) -> MethodRouter<SharedState> {
    get(move |State(s): State<SharedState>, BearerToken(token): BearerToken| async move {
        dispatch(s, token, method, json!({})).await
    })
}

fn get_by_id(method: &'static str) -> MethodRouter<SharedState> {
    get(
        move |State(s): State<SharedState>,
              BearerToken(token): BearerToken,
              Path(id): Path<String>| async move {
            dispatch(s, token, method, json!({ "id": id })).await
        },
    )
}

fn post_body(method: &'static str) -> MethodRouter<SharedState> {
    post(
        move |State(s): State<SharedState>, BearerToken(token): BearerToken, body: Bytes| async move {
            match parse_body(&body) {
                Ok(map) => dispatch(s, token, method, serde_json::Value::Object(map)).await,
                Err(resp) => resp,
            }
        },
    )
}

fn put_body(method: &'static str) -> MethodRouter<SharedState> {
    put(
        move |State(s): State<SharedState>, BearerToken(token): BearerToken, body: Bytes| async move {
            match parse_body(&body) {
                Ok(map) => dispatch(s, token, method, serde_json::Value::Object(map)).await,
                Err(resp) => resp,
            }
        },
    )
}

/// The path id overrides any `id` in the body.
fn put_by_id(method: &'static str) -> MethodRouter<SharedState> {
    put(
        move |State(s): State<SharedState>,
              BearerToken(token): BearerToken,
              Path(id): Path<String>,
              body: Bytes| async move {
            match parse_body(&body) {
                Ok(mut map) => {
                    map.insert("id".to_string(), json!(id));
                    dispatch(s, token, method, serde_json::Value::Object(map)).await
                }
                Err(resp) => resp,
            }
        },
    )
}

fn delete_by_id(method: &'static str) -> MethodRouter<SharedState> {
    delete(
        move |State(s): State<SharedState>,
              BearerToken(token): BearerToken,
              Path(id): Path<String>| async move {
            dispatch(s, token, method, json!({ "id": id })).await
        },
    )
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get_plain("health"))
        .route("/AdminReg", post_body("admin.register"))
        .route("/AdminLogin", post_body("admin.login"))
        .route("/TeacherLogin", post_body("teacher.login"))
        .route("/StudentLogin", post_body("student.login"))
        .route("/Logout", post_body("session.logout"))
        .route(
            "/Admin/{id}",
            get_by_id("admin.get")
                .merge(put_by_id("admin.update"))
                .merge(delete_by_id("admin.delete")),
        )
        .route("/AdminDashboard/{id}", get_by_id("admin.dashboard"))
        .route("/SclassCreate", post_body("sclass.create"))
        .route("/SclassList/{id}", get_by_id("sclass.list"))
        .route(
            "/Sclass/{id}",
            get_by_id("sclass.get").merge(delete_by_id("sclass.delete")),
        )
        .route("/Sclass/Students/{id}", get_by_id("sclass.students"))
        .route("/Sclasses/{id}", delete_by_id("sclasses.delete"))
        .route("/SubjectCreate", post_body("subject.create"))
        .route("/AllSubjects/{id}", get_by_id("subject.listBySchool"))
        .route("/ClassSubjects/{id}", get_by_id("subject.listByClass"))
        .route("/FreeSubjectList/{id}", get_by_id("subject.listFree"))
        .route(
            "/Subject/{id}",
            get_by_id("subject.get")
                .merge(put_by_id("subject.update"))
                .merge(delete_by_id("subject.delete")),
        )
        .route("/Subject/{id}/Students", get_by_id("subject.roster"))
        .route("/Subjects/{id}", delete_by_id("subjects.delete"))
        .route("/TeacherReg", post_body("teacher.register"))
        .route(
            "/Teachers/{id}",
            get_by_id("teacher.list").merge(delete_by_id("teachers.delete")),
        )
        .route(
            "/Teacher/{id}",
            get_by_id("teacher.get").merge(delete_by_id("teacher.delete")),
        )
        .route("/TeacherSubject", put_body("teacher.setSubject"))
        .route("/Teacher/add-class", post_body("teacher.addClass"))
        .route("/Teacher/remove-class", post_body("teacher.removeClass"))
        .route("/StudentReg", post_body("student.register"))
        .route(
            "/Students/{id}",
            get_by_id("student.list").merge(delete_by_id("students.delete")),
        )
        .route(
            "/Student/{id}",
            get_by_id("student.get")
                .merge(put_by_id("student.update"))
                .merge(delete_by_id("student.delete")),
        )
        .route("/StudentAttendance", post_body("attendance.record"))
        .route(
            "/RemoveStudentSubAtten/{id}",
            put_by_id("attendance.clearSubject"),
        )
        .route("/Student/{id}/Attendance", get_by_id("attendance.report"))
        .route("/StudentExamResult", post_body("exam.record"))
        .route("/Student/{id}/ExamResults", get_by_id("exam.summary"))
        .route("/NoticeCreate", post_body("notice.create"))
        .route(
            "/NoticeList/{id}",
            get_by_id("notice.list").merge(delete_by_id("notices.delete")),
        )
        .route(
            "/Notice/{id}",
            put_by_id("notice.update").merge(delete_by_id("notice.delete")),
        )
        .route("/ComplainCreate", post_body("complain.create"))
        .route("/ComplainList/{id}", get_by_id("complain.list"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
