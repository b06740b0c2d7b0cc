//! Authorization gate middleware and the [`Caller`] extractor.
//!
//! The middleware runs [`AuthorizationGate::resolve`] before routing. A
//! resolved identity is stored in request extensions; failures short-circuit
//! with the domain error response so handlers never run.

use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{AUTHORIZATION, HeaderMap};
use actix_web::{FromRequest, HttpMessage, HttpRequest, ResponseError};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::domain::{AuthorizationGate, CallerIdentity, Error, GateDecision};

/// Header carrying the operator override key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Middleware factory wrapping an [`AuthorizationGate`].
#[derive(Clone)]
pub struct AuthGate {
    gate: Rc<AuthorizationGate>,
}

impl AuthGate {
    pub fn new(gate: AuthorizationGate) -> Self {
        Self { gate: Rc::new(gate) }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = AuthGateMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthGateMiddleware {
            service: Rc::new(service),
            gate: Rc::clone(&self.gate),
        }))
    }
}

pub struct AuthGateMiddleware<S> {
    service: Rc<S>,
    gate: Rc<AuthorizationGate>,
}

/// Header text; a value that is not visible ASCII reads as empty so it
/// fails shape checks rather than looking absent.
fn header_text(headers: &HeaderMap, name: impl actix_web::http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|value| value.to_str().unwrap_or_default().to_owned())
}

impl<S, B> Service<ServiceRequest> for AuthGateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let gate = Rc::clone(&self.gate);
        Box::pin(async move {
            let admin_key = header_text(req.headers(), ADMIN_KEY_HEADER);
            let authorization = header_text(req.headers(), AUTHORIZATION);
            let decision = gate
                .resolve(req.path(), admin_key.as_deref(), authorization.as_deref())
                .await;
            match decision {
                Ok(GateDecision::Public) => {}
                Ok(GateDecision::Authenticated(caller)) => {
                    req.extensions_mut().insert(caller);
                }
                Err(error) => {
                    let response = error.error_response();
                    return Ok(req.into_response(response).map_into_right_body());
                }
            }
            service
                .call(req)
                .await
                .map(ServiceResponse::map_into_left_body)
        })
    }
}

/// Authenticated caller attached by [`AuthGate`].
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

impl FromRequest for Caller {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<CallerIdentity>()
                .cloned()
                .map(Caller)
                .ok_or_else(|| Error::unauthorized("Unauthorized: no token provided")),
        )
    }
}
