//! # Errores del motor de reservas
//!
//! Errores que produce el núcleo de disponibilidad, calendario y
//! conciliación. La capa HTTP los convierte en [`crate::api::AppError`].

use thiserror::Error;

use super::model::{ReservationId, RoomId};

/// Fuente genérica de un error de almacenamiento (MongoDB o memoria).
pub type StorageSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum BookingError {
    /// Rango de fechas vacío, invertido o imposible de parsear
    #[error("Rango de fechas inválido: {0}")]
    InvalidRange(String),

    #[error("Habitación {0} no encontrada")]
    RoomNotFound(RoomId),

    #[error("Reserva {0} no encontrada")]
    ReservationNotFound(ReservationId),

    /// El almacenamiento respondió con error. No se reintenta aquí.
    #[error("Almacenamiento no disponible en operación '{operation}': {source}")]
    StorageUnavailable {
        operation: String,
        #[source]
        source: StorageSource,
    },

    #[error("Tiempo de espera agotado en operación '{operation}'")]
    StorageTimeout { operation: String },

    /// El POST del calendario llegó sin el GET previo en la misma sesión
    #[error("No hay mapa de bloqueos en sesión para la habitación {0}")]
    MissingCacheState(RoomId),

    #[error("Credenciales incorrectas")]
    InvalidCredentials,
}

impl BookingError {
    /// Crea un error de almacenamiento con contexto de operación
    pub fn storage<E>(operation: &str, source: E) -> Self
    where
        E: Into<StorageSource>,
    {
        Self::StorageUnavailable {
            operation: operation.to_string(),
            source: source.into(),
        }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange(message.into())
    }

    /// `true` para los errores que vienen del backend de almacenamiento
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::StorageTimeout { .. }
        )
    }
}

impl From<mongodb::error::Error> for BookingError {
    fn from(error: mongodb::error::Error) -> Self {
        Self::storage("database_operation", error)
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
