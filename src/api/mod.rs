//! # Módulo API
//!
//! Rutas y controladores HTTP. Las páginas se sirven como JSON con los
//! datos que pintaría la plantilla más los mensajes flash pendientes.
//!
//! ## Módulos principales
//!
//! - [`availability`] - Búsqueda de disponibilidad y elección de habitación
//! - [`reservation`] - Formulario de reserva y resumen
//! - [`auth`] - Login y logout del personal
//! - [`admin`] - Consola de reservas y calendario de bloqueos
//! - [`errors`] - Manejo de errores de la aplicación

pub mod admin;
pub mod auth;
pub mod availability;
pub mod errors;
pub mod middleware;
pub mod reservation;

pub use errors::{AppError, AppResult, ErrorResponse};

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

use crate::session::{RenewedSession, Session};

/// Redirección 303 tras un POST o un error de flujo
pub fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, location))
        .finish()
}

/// Mensaje flash de error seguido de redirección
pub fn fail_to(session: &Session, location: &str, message: &str) -> HttpResponse {
    session.flash("error", message);
    see_other(location)
}

/// Pide al middleware la cookie de la sesión renovada
pub fn renewed(mut response: HttpResponse, session: &Session) -> HttpResponse {
    response
        .extensions_mut()
        .insert(RenewedSession(session.id().to_string()));
    response
}

/// Datos de página: plantilla, flashes pendientes, estado de login y `data`
pub fn page(session: &Session, template: &str, data: Value) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "template": template,
        "flash": session.pop_string("flash"),
        "success": session.pop_string("success"),
        "warning": session.pop_string("warning"),
        "error": session.pop_string("error"),
        "is_authenticated": session.contains("user_id"),
        "data": data,
    }))
}

/// Configura todas las rutas de la aplicación
///
/// ## Rutas configuradas
///
/// - `/search-availability*`, `/choose-room/*`, `/book-room` - Ver [`availability::routes`]
/// - `/make-reservation`, `/reservation-summary` - Ver [`reservation::routes`]
/// - `/user/*` - Ver [`auth::routes`]
/// - `/admin/*` - Ver [`admin::routes`]
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    availability::routes(cfg);
    reservation::routes(cfg);
    auth::routes(cfg);
    admin::routes(cfg);
}
