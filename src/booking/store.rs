//! # Puertos de almacenamiento
//!
//! El núcleo solo conoce estos traits. [`crate::db::MongoRepo`] los implementa
//! contra MongoDB y [`super::memory::MemoryStore`] en memoria.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::error::{BookingError, BookingResult};
use super::model::*;

/// Almacén de intervalos de restricción (reservas y bloqueos)
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Cuenta las restricciones de la habitación que solapan `[start, end)`
    async fn find_overlapping(&self, room_id: RoomId, range: &StayRange) -> BookingResult<u64>;

    /// Habitaciones sin ninguna restricción que solape el rango
    async fn rooms_available(&self, range: &StayRange) -> BookingResult<BTreeSet<RoomId>>;

    /// Restricciones que tocan la ventana `[first, last]` del calendario:
    /// `end > first AND start <= last`
    async fn restrictions_in_range(
        &self,
        room_id: RoomId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BookingResult<Vec<RoomRestriction>>;

    async fn insert(&self, restriction: NewRestriction) -> BookingResult<RestrictionId>;

    /// `Ok(false)` si ya no existía
    async fn delete_by_id(&self, id: RestrictionId) -> BookingResult<bool>;

    /// Todas las habitaciones ordenadas por nombre
    async fn all_rooms(&self) -> BookingResult<Vec<Room>>;

    async fn room_by_id(&self, id: RoomId) -> BookingResult<Room>;
}

/// Operaciones sobre reservas de la consola de administración
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_reservation(&self, reservation: NewReservation) -> BookingResult<ReservationId>;

    /// Incluye la habitación asociada
    async fn reservation_by_id(&self, id: ReservationId) -> BookingResult<Reservation>;

    /// Ordenadas por fecha de entrada
    async fn all_reservations(&self) -> BookingResult<Vec<Reservation>>;

    /// Solo las no procesadas
    async fn new_reservations(&self) -> BookingResult<Vec<Reservation>>;

    async fn update_guest(&self, id: ReservationId, guest: &GuestDetails) -> BookingResult<()>;

    async fn set_processed(&self, id: ReservationId, processed: bool) -> BookingResult<()>;

    /// Borra la reserva y su restricción `ReservationHeld`
    async fn delete_reservation(&self, id: ReservationId) -> BookingResult<()>;
}

/// Verificador opaco de credenciales del personal
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn authenticate(&self, email: &str, password: &str) -> BookingResult<UserId>;
}

/// Acota una operación de almacenamiento con un timeout fijo
pub async fn with_timeout<T, F>(timeout: Duration, operation: &str, fut: F) -> BookingResult<T>
where
    F: Future<Output = BookingResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = %operation, timeout_ms = timeout.as_millis() as u64, "Storage operation timed out");
            Err(BookingError::StorageTimeout {
                operation: operation.to_string(),
            })
        }
    }
}
