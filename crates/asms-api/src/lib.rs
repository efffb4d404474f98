//! # ASMS HTTP Adapter
//!
//! Maps HTTP/JSON onto gateway requests: the unified `POST /execute`
//! endpoint (with SSE streaming), a REST facade driven by a path-template
//! route table, workflow definition management, the MCP SSE session
//! transport, and health. Built on actix-web with CORS and panic-recovery
//! middleware.

pub mod config;
pub mod execute;
pub mod health;
pub mod mcp_routes;
pub mod middleware;
pub mod responses;
pub mod rest;
pub mod router;
pub mod state;
pub mod workflows;

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Condition;
use actix_web::{web, App, HttpServer};
use tracing::info;

pub use config::ApiConfig;
pub use router::{InputMapper, MergeMapper, RestRouter};
pub use state::AppState;

/// Mounts every route onto an actix service config. The caller provides
/// [`AppState`] via `app_data`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/execute", web::post().to(execute::execute))
        .route("/health", web::get().to(health::health))
        .route("/sse", web::get().to(mcp_routes::open_sse))
        .route("/message", web::post().to(mcp_routes::post_message))
        .service(
            web::scope("/api/v2")
                .route("/workflows", web::post().to(workflows::create_workflow))
                .route("/workflows", web::get().to(workflows::list_workflows))
                .route("/workflows/{name}", web::get().to(workflows::get_workflow))
                .route(
                    "/workflows/{name}",
                    web::delete().to(workflows::delete_workflow),
                )
                .route(
                    "/workflows/{name}/execute",
                    web::post().to(workflows::execute_workflow),
                )
                .route("/executions", web::get().to(workflows::list_executions))
                .route(
                    "/executions/{run_id}",
                    web::get().to(workflows::get_execution),
                )
                .route(
                    "/executions/{run_id}/cancel",
                    web::post().to(workflows::cancel_execution),
                )
                .default_service(web::route().to(rest::dispatch)),
        );
}

/// Runs the HTTP server until shutdown.
pub async fn run(state: Arc<AppState>, config: ApiConfig) -> io::Result<()> {
    health::init_startup_time();
    let bind_addr = config.bind_addr();
    info!(addr = %bind_addr, cors = config.cors_enabled, "http adapter listening");

    let cors_enabled = config.cors_enabled;
    let sessions = state.sessions.clone();
    let state = web::Data::from(state);

    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::PanicRecovery)
            .wrap(Condition::new(cors_enabled, cors))
            .configure(init_routes)
    })
    .bind(bind_addr)?
    .run()
    .await;

    // Server is down: end every MCP session stream.
    sessions.shutdown();
    result
}
