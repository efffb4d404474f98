//! Catch-all dispatcher for the REST facade under `/api/v2`.

use std::collections::HashMap;

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;
use tracing::debug;

use asms_core::{ErrorInfo, Request, RequestOptions};

use crate::responses::{error_response, json_response};
use crate::router::RouteMatch;
use crate::state::AppState;

/// Resolves the route table, builds the unit input through the route's
/// mapper, and dispatches through the gateway. No match → 404; path match
/// with the wrong method → 405 with an `Allow` header.
pub async fn dispatch(
    http_request: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let method = http_request.method().as_str();
    let path = http_request.path();

    match state.rest.resolve(method, path) {
        RouteMatch::Matched {
            route,
            params,
            mapper,
        } => {
            debug!(method, path, unit = %route.unit, "rest route matched");

            let parsed_body: Option<Value> = if body.is_empty() {
                None
            } else {
                match serde_json::from_slice(&body) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        return error_response(ErrorInfo::invalid_request(format!(
                            "malformed request body: {}",
                            e
                        )))
                    }
                }
            };
            let query = parse_query(http_request.query_string());

            let input = mapper.map(&params, &query, parsed_body.as_ref());
            let request = Request {
                request_type: route.request_type,
                unit: route.unit.clone(),
                input,
                options: RequestOptions {
                    trace_id: http_request
                        .headers()
                        .get("X-Trace-ID")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string),
                    ..RequestOptions::default()
                },
            };

            let response = state.gateway.handle(request).await;
            json_response(&response)
        }
        RouteMatch::MethodNotAllowed { allowed } => HttpResponse::MethodNotAllowed()
            .insert_header((header::ALLOW, allowed.join(", ")))
            .json(asms_core::Response::failure(ErrorInfo::invalid_request(
                format!("method {} not allowed for {}", method, path),
            ))),
        RouteMatch::NotFound => error_response(ErrorInfo::not_found(format!(
            "no route for {} {}",
            method, path
        ))),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}
