//! HTTP server setup

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, dev::Server, middleware::Logger, web};

use crate::api;
use crate::middleware::{IdentityAuth, Telemetry};
use crate::model::AppState;

/// Liveness probe, mounted outside the authenticated scope.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Creates and binds the dispatch API server.
pub fn http_server(
    app_state: Arc<AppState>,
    context_path: String,
    address: String,
    port: u16,
    shutdown_timeout_secs: u64,
) -> Result<Server, std::io::Error> {
    let psks = app_state.configuration.service_psks();
    Ok(HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(Telemetry)
            .app_data(web::Data::from(app_state.clone()))
            .route("/health", web::get().to(health))
            .service(
                web::scope(&context_path)
                    .wrap(IdentityAuth::new(psks.clone()))
                    .service(api::v1::routes())
                    .service(api::v2::routes()),
            )
    })
    .shutdown_timeout(shutdown_timeout_secs)
    .bind((address, port))?
    .run())
}
