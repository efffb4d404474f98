//! Workflow definition CRUD and execution routes, backed by the store and
//! the engine.

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use asms_core::ErrorInfo;
use asms_workflow::{validate, WorkflowDefinition};

use crate::responses::error_response;
use crate::state::AppState;

/// `POST /api/v2/workflows` — accepts a definition as JSON or YAML,
/// validates it, and saves it.
pub async fn create_workflow(
    http_request: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let content_type = http_request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");

    let source = match std::str::from_utf8(&body) {
        Ok(source) => source,
        Err(_) => return error_response(ErrorInfo::invalid_request("body must be valid UTF-8")),
    };

    let parsed = if content_type.contains("yaml") {
        WorkflowDefinition::from_yaml(source)
    } else {
        WorkflowDefinition::from_json(source)
    };
    let def = match parsed {
        Ok(def) => def,
        Err(e) => return error_response(ErrorInfo::invalid_request(e.to_string())),
    };

    let validation = validate(&def);
    if !validation.valid {
        return error_response(
            ErrorInfo::validation_failed(validation.summary())
                .with_details(json!({ "errors": validation.errors })),
        );
    }

    if let Err(e) = state.store.save_definition(&def).await {
        return error_response(e.into());
    }
    info!(workflow = %def.name, "workflow definition saved");
    HttpResponse::Created().json(def)
}

/// `GET /api/v2/workflows`
pub async fn list_workflows(state: web::Data<AppState>) -> HttpResponse {
    match state.store.list_definitions().await {
        Ok(definitions) => HttpResponse::Ok().json(json!({ "workflows": definitions })),
        Err(e) => error_response(e.into()),
    }
}

/// `GET /api/v2/workflows/{name}`
pub async fn get_workflow(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    match state.store.get_definition(&path).await {
        Ok(def) => HttpResponse::Ok().json(def),
        Err(e) => error_response(e.into()),
    }
}

/// `DELETE /api/v2/workflows/{name}`
pub async fn delete_workflow(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    match state.store.delete_definition(&path).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    #[serde(default, rename = "async")]
    run_async: bool,
}

/// `POST /api/v2/workflows/{name}/execute` — body is the workflow input
/// map; `?async=true` submits and returns the running record immediately.
pub async fn execute_workflow(
    path: web::Path<String>,
    query: web::Query<ExecuteQuery>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let input: Map<String, Value> = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return error_response(ErrorInfo::invalid_request(
                    "workflow input must be a JSON object",
                ))
            }
            Err(e) => {
                return error_response(ErrorInfo::invalid_request(format!(
                    "malformed workflow input: {}",
                    e
                )))
            }
        }
    };

    let def = match state.store.get_definition(&path).await {
        Ok(def) => def,
        Err(e) => return error_response(e.into()),
    };

    if query.run_async {
        match state.engine.execute_async(def, input).await {
            Ok(result) => HttpResponse::Accepted().json(result),
            Err(e) => error_response(e),
        }
    } else {
        match state.engine.execute(&def, input).await {
            Ok(result) => HttpResponse::Ok().json(result),
            Err(e) => error_response(e),
        }
    }
}

/// `POST /api/v2/executions/{run_id}/cancel`
pub async fn cancel_execution(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    let cancelled = state.engine.cancel(&path);
    HttpResponse::Ok().json(json!({ "run_id": path.as_str(), "cancelled": cancelled }))
}

/// `GET /api/v2/executions/{run_id}`
pub async fn get_execution(path: web::Path<String>, state: web::Data<AppState>) -> HttpResponse {
    match state.store.get_execution(&path).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => error_response(e.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListExecutionsQuery {
    workflow: Option<String>,
}

/// `GET /api/v2/executions?workflow=<name>`
pub async fn list_executions(
    query: web::Query<ListExecutionsQuery>,
    state: web::Data<AppState>,
) -> HttpResponse {
    match state.store.list_executions(query.workflow.as_deref()).await {
        Ok(executions) => HttpResponse::Ok().json(json!({ "executions": executions })),
        Err(e) => error_response(e.into()),
    }
}
