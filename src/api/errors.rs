//! # Errores HTTP
//!
//! [`AppError`] envuelve los errores del motor ([`BookingError`]) y añade los
//! propios de la capa web. Cada variante decide su código y su log.

use actix_web::http::header;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::booking::BookingError;
use crate::telemetry::error_chain;

#[derive(Error, Debug)]
pub enum AppError {
    /// Error del motor de reservas, con su cadena de causas
    #[error(transparent)]
    Booking(#[from] BookingError),

    /// Ruta de administración sin sesión iniciada
    #[error("Se requiere iniciar sesión")]
    LoginRequired,
}

impl AppError {
    fn booking_response(error: &BookingError) -> HttpResponse {
        match error {
            BookingError::InvalidRange(message) => {
                tracing::warn!(message = %message, "Invalid date range");
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Rango inválido".to_string(),
                    message: error.to_string(),
                })
            }
            BookingError::RoomNotFound(_) | BookingError::ReservationNotFound(_) => {
                tracing::info!(error = %error, "Resource not found");
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "No encontrado".to_string(),
                    message: error.to_string(),
                })
            }
            BookingError::InvalidCredentials => {
                tracing::warn!("Invalid login credentials");
                HttpResponse::Unauthorized().json(ErrorResponse {
                    error: "No autorizado".to_string(),
                    message: error.to_string(),
                })
            }
            BookingError::MissingCacheState(room_id) => {
                tracing::warn!(room_id, "Calendar posted without cached state");
                HttpResponse::Conflict().json(ErrorResponse {
                    error: "Conflicto".to_string(),
                    message: error.to_string(),
                })
            }
            BookingError::StorageTimeout { operation } => {
                tracing::error!(operation = %operation, "Storage timeout");
                HttpResponse::ServiceUnavailable().json(ErrorResponse {
                    error: "Error de base de datos".to_string(),
                    message: "El almacenamiento no respondió a tiempo".to_string(),
                })
            }
            BookingError::StorageUnavailable { operation, .. } => {
                tracing::error!(
                    operation = %operation,
                    error_chain = ?error_chain(error),
                    "Database error occurred"
                );
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Error de base de datos".to_string(),
                    message: "Error interno del servidor".to_string(),
                })
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::Booking(error) => Self::booking_response(error),
            Self::LoginRequired => {
                tracing::debug!("Redirecting anonymous user to login");
                HttpResponse::SeeOther()
                    .append_header((header::LOCATION, "/user/login"))
                    .finish()
            }
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn booking_errors_map_to_status_codes() {
        let cases = [
            (AppError::from(BookingError::invalid_range("x")), StatusCode::BAD_REQUEST),
            (AppError::from(BookingError::RoomNotFound(9)), StatusCode::NOT_FOUND),
            (AppError::from(BookingError::InvalidCredentials), StatusCode::UNAUTHORIZED),
            (
                AppError::from(BookingError::StorageTimeout { operation: "find".into() }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::from(BookingError::storage("find", "caído")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.error_response().status(), status, "{}", error);
        }
    }

    #[test]
    fn login_required_redirects() {
        let response = AppError::LoginRequired.error_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/user/login"
        );
    }
}
