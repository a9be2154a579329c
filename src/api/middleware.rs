//! # Middleware de sesión
//!
//! [`attach_session`] resuelve la cookie `session_id` (o abre una sesión
//! nueva) y deja el id en las extensiones de la petición para el extractor
//! [`Session`](crate::session::Session). [`require_login`] protege `/admin`.

use actix_web::body::{EitherBody, MessageBody};
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, ResponseError};

use super::errors::AppError;
use crate::context::AppContext;
use crate::session::{RenewedSession, SessionId, SESSION_COOKIE};

pub async fn attach_session<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<B>, Error> {
    let Some(ctx) = req.app_data::<web::Data<AppContext>>().cloned() else {
        return next.call(req).await;
    };

    let existing = req
        .cookie(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|id| ctx.sessions.is_live(id));

    let (id, is_new) = match existing {
        Some(id) => (id, false),
        None => (ctx.sessions.create(), true),
    };
    req.extensions_mut().insert(SessionId(id.clone()));

    let mut res = next.call(req).await?;
    let renewed = res
        .response()
        .extensions()
        .get::<RenewedSession>()
        .map(|RenewedSession(id)| id.clone());
    let cookie_id = match renewed {
        Some(renewed) => Some(renewed),
        None if is_new => Some(id),
        None => None,
    };

    if let Some(id) = cookie_id {
        let cookie = Cookie::build(SESSION_COOKIE, id)
            .path("/")
            .http_only(true)
            .secure(ctx.config.in_production)
            .same_site(SameSite::Lax)
            .finish();
        res.response_mut().add_cookie(&cookie)?;
    }
    Ok(res)
}

pub async fn require_login<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let session_id = req.extensions().get::<SessionId>().cloned();
    let authenticated = match (session_id, req.app_data::<web::Data<AppContext>>()) {
        (Some(SessionId(id)), Some(ctx)) => ctx.sessions.handle(&id).contains("user_id"),
        _ => false,
    };

    if !authenticated {
        tracing::debug!(path = %req.path(), "Admin route requested without login");
        let response = AppError::LoginRequired.error_response();
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}
