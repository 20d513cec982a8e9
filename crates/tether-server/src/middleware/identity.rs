// Authentication middleware for Actix-web
// Resolves the request principal from the identity header or the PSK
// triple and rejects everything else with a generic 401

use std::collections::HashMap;
use std::rc::Rc;

use actix_service::forward_ready;
use actix_utils::future::{Ready, ok};
use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
};

use futures::future::LocalBoxFuture;

use crate::auth;
use crate::model::response;

/// Authentication middleware transformer
pub struct IdentityAuth {
    psks: Rc<HashMap<String, String>>,
}

impl IdentityAuth {
    pub fn new(psks: HashMap<String, String>) -> Self {
        Self {
            psks: Rc::new(psks),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(IdentityAuthMiddleware {
            service,
            psks: self.psks.clone(),
        })
    }
}

pub struct IdentityAuthMiddleware<S> {
    service: S,
    psks: Rc<HashMap<String, String>>,
}

impl<S, B> Service<ServiceRequest> for IdentityAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match auth::authenticate(&req, &self.psks) {
            Some(principal) => {
                req.extensions_mut().insert(principal);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
            }
            None => {
                let response = response::unauthorized().map_into_right_body();
                Box::pin(async move { Ok(req.into_response(response)) })
            }
        }
    }
}
