//! V2 connection API handlers (org-scoped)
//!
//! Routes:
//! - POST   /v2/connections/{id}/message - Send a directive to an agent
//! - GET    /v2/connections/{id}/status - Agent status and facts
//! - GET    /v2/connections - Paginated tenant listing
//! - GET    /v2/connections/all - Cross-tenant listing (administrative)
//! - POST   /v2/connections/{id}/reconnect - Tell the agent to reconnect
//! - POST   /v2/connections/{id}/disconnect - Tell the agent to drop its session
//! - POST   /v2/connections/{id}/ping - Liveness probe
//! - DELETE /v2/connections/{id} - Remove the connection record

use actix_web::{HttpRequest, HttpResponse, Responder, Scope, delete, get, post, web};

use tether_api::message::CommandContent;
use tether_api::model::{MessageRequest, PaginatedResponse, ReconnectRequest};

use crate::api::{PageQuery, admin, principal};
use crate::model::AppState;
use crate::model::response;
use crate::service::{ConnectionService, TenantScope};

/// Create the V2 connection routes
pub fn routes() -> Scope {
    web::scope("/v2/connections")
        .service(list_connections)
        .service(list_all_connections)
        .service(send_message)
        .service(connection_status)
        .service(reconnect)
        .service(disconnect)
        .service(ping)
        .service(unregister)
}

fn service(state: &AppState) -> ConnectionService {
    ConnectionService::new(state.store.clone(), state.broker.clone())
}

fn org_scope(req: &HttpRequest) -> Result<TenantScope, HttpResponse> {
    let principal = principal(req)?;
    let org_id = principal
        .org_id()
        .ok_or_else(|| response::bad_request("principal carries no org_id"))?;
    Ok(TenantScope::Org(org_id.to_string()))
}

#[post("/{id}/message")]
pub async fn send_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MessageRequest>,
) -> impl Responder {
    let scope = match org_scope(&req) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };
    let client_id = path.into_inner();
    let body = body.into_inner();

    match service(&state)
        .send_message(&scope, &client_id, &body.directive, body.payload, body.metadata)
        .await
    {
        Ok(result) => HttpResponse::Created().json(result),
        Err(e) => response::error_response(&e),
    }
}

#[get("/{id}/status")]
pub async fn connection_status(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let scope = match org_scope(&req) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    match service(&state).status(&scope, &path.into_inner()).await {
        Ok(status) => HttpResponse::Ok().json(status),
        Err(e) => response::error_response(&e),
    }
}

#[get("")]
pub async fn list_connections(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    let scope = match org_scope(&req) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };
    let (offset, limit) = (query.offset(), query.limit());

    match service(&state).list(&scope, offset, limit).await {
        Ok(page) => HttpResponse::Ok().json(PaginatedResponse::new(
            req.path(),
            offset,
            limit,
            page.total,
            page.items,
        )),
        Err(e) => response::error_response(&e),
    }
}

#[get("/all")]
pub async fn list_all_connections(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> impl Responder {
    if let Err(resp) = admin(&req) {
        return resp;
    }
    let (offset, limit) = (query.offset(), query.limit());

    match service(&state).list_all(offset, limit).await {
        Ok(page) => HttpResponse::Ok().json(PaginatedResponse::new(
            req.path(),
            offset,
            limit,
            page.total,
            page.items,
        )),
        Err(e) => response::error_response(&e),
    }
}

#[post("/{id}/reconnect")]
pub async fn reconnect(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ReconnectRequest>,
) -> impl Responder {
    let scope = match admin(&req).and_then(|_| org_scope(&req)) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };
    if body.delay < 0 {
        return response::bad_request("delay must not be negative");
    }

    match service(&state)
        .send_command(&scope, &path.into_inner(), CommandContent::reconnect(body.delay))
        .await
    {
        Ok(result) => HttpResponse::Created().json(result),
        Err(e) => response::error_response(&e),
    }
}

#[post("/{id}/disconnect")]
pub async fn disconnect(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let scope = match admin(&req).and_then(|_| org_scope(&req)) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    match service(&state)
        .send_command(&scope, &path.into_inner(), CommandContent::disconnect())
        .await
    {
        Ok(result) => HttpResponse::Created().json(result),
        Err(e) => response::error_response(&e),
    }
}

#[post("/{id}/ping")]
pub async fn ping(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let scope = match org_scope(&req) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    match service(&state)
        .send_command(&scope, &path.into_inner(), CommandContent::ping())
        .await
    {
        Ok(result) => HttpResponse::Created().json(result),
        Err(e) => response::error_response(&e),
    }
}

#[delete("/{id}")]
pub async fn unregister(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> impl Responder {
    let scope = match admin(&req).and_then(|_| org_scope(&req)) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    match service(&state).unregister(&scope, &path.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => response::error_response(&e),
    }
}
