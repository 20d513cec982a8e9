//! V1 connection API handlers (legacy, account-scoped)
//!
//! Same surface as v2, keyed on the caller's account number instead
//! of the org id.

use actix_web::{HttpRequest, HttpResponse, Responder, Scope, delete, get, post, web};

use tether_api::message::CommandContent;
use tether_api::model::{MessageRequest, PaginatedResponse, ReconnectRequest};

use crate::api::{PageQuery, admin, principal};
use crate::model::AppState;
use crate::model::response;
use crate::service::{ConnectionService, TenantScope};

/// Create the V1 connection routes
pub fn routes() -> Scope {
    web::scope("/v1/connections")
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

fn account_scope(req: &HttpRequest) -> Result<TenantScope, HttpResponse> {
    let principal = principal(req)?;
    let account = principal
        .account()
        .ok_or_else(|| response::bad_request("principal carries no account"))?;
    Ok(TenantScope::Account(account.to_string()))
}

#[post("/{id}/message")]
pub async fn send_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<MessageRequest>,
) -> impl Responder {
    let scope = match account_scope(&req) {
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
    let scope = match account_scope(&req) {
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
    let scope = match account_scope(&req) {
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
    let scope = match admin(&req).and_then(|_| account_scope(&req)) {
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
    let scope = match admin(&req).and_then(|_| account_scope(&req)) {
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
    let scope = match account_scope(&req) {
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
    let scope = match admin(&req).and_then(|_| account_scope(&req)) {
        Ok(scope) => scope,
        Err(resp) => return resp,
    };

    match service(&state).unregister(&scope, &path.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => response::error_response(&e),
    }
}
