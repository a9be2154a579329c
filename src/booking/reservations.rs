//! # Flujo de reserva
//!
//! Validación de los datos del huésped y alta de la reserva junto con su
//! restricción `ReservationHeld`.
//!
//! La disponibilidad se comprueba al buscar y la restricción se inserta más
//! tarde, sin bloqueo entre ambos pasos. Dos huéspedes pueden reservar la
//! misma habitación si envían el formulario a la vez. Cerrar esa carrera
//! exige un índice de exclusión o una transacción serializable en el
//! almacenamiento, y no se hace aquí.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::BookingResult;
use super::model::{
    current_timestamp, GuestDetails, NewReservation, NewRestriction, Reservation, RoomId, StayRange,
};
use super::store::{IntervalStore, ReservationStore};
use crate::notify::Mailer;
use crate::telemetry::ErrorLogExt;

/// Reserva en curso guardada en sesión entre búsqueda y formulario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub range: StayRange,
    pub room_id: Option<RoomId>,
    pub room_name: Option<String>,
}

impl ReservationDraft {
    pub fn new(range: StayRange) -> Self {
        Self {
            range,
            room_id: None,
            room_name: None,
        }
    }
}

/// Errores de formulario por campo
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(|v| v.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validación básica de email: algo antes de '@' y un '.' en el dominio
pub fn validate_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    }
}

impl GuestDetails {
    pub fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();

        for (field, value) in [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
        ] {
            if value.trim().is_empty() {
                errors.add(field, "Este campo es obligatorio");
            }
        }

        if !self.first_name.trim().is_empty() && self.first_name.trim().chars().count() < 3 {
            errors.add("first_name", "Debe tener al menos 3 caracteres");
        }

        if !self.email.trim().is_empty() && !validate_email(self.email.trim()) {
            errors.add("email", "Email inválido");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Inserta la reserva, después su restricción, y encola los correos.
///
/// Si la restricción falla se borra la reserva recién creada para no dejar
/// una reserva sin intervalo. Una vez guardadas ambas la reserva devuelta se
/// construye con los datos enviados, sin volver a leerla.
pub async fn book(
    intervals: &dyn IntervalStore,
    reservations: &dyn ReservationStore,
    mailer: &Mailer,
    request: NewReservation,
    room_name: &str,
) -> BookingResult<Reservation> {
    let room_id = request.room_id;
    let range = request.range;

    let reservation_id = reservations
        .insert_reservation(request.clone())
        .await
        .log_error_context("inserting reservation")?;

    let held = NewRestriction::for_reservation(room_id, range, reservation_id);
    if let Err(e) = intervals
        .insert(held)
        .await
        .log_error_context("inserting reservation restriction")
    {
        if let Err(cleanup) = reservations.delete_reservation(reservation_id).await {
            tracing::error!(
                reservation_id,
                error = %cleanup,
                "Could not remove reservation without restriction"
            );
        }
        return Err(e);
    }

    let reservation = request.into_reservation(reservation_id, current_timestamp());
    tracing::info!(
        reservation_id,
        room_id,
        start = %range.start(),
        end = %range.end(),
        "Reservation created"
    );

    mailer.reservation_confirmed(&reservation, room_name);
    Ok(reservation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::availability::AvailabilityEngine;
    use crate::booking::memory::{FailureScript, MemoryStore};
    use crate::booking::model::{ReservationId, RestrictionKind};
    use crate::booking::BookingError;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn guest() -> GuestDetails {
        GuestDetails {
            first_name: "John".into(),
            last_name: "Smith".into(),
            email: "john@smith.com".into(),
            phone: "123456789".into(),
        }
    }

    #[test]
    fn guest_validation_reports_each_field() {
        assert!(guest().validate().is_ok());

        let errors = GuestDetails {
            first_name: "J".into(),
            last_name: String::new(),
            email: "john.smith.com".into(),
            phone: String::new(),
        }
        .validate()
        .unwrap_err();

        assert_eq!(errors.get("first_name").map(|e| e.len()), Some(1));
        assert!(errors.get("last_name").is_some());
        assert!(errors.get("email").is_some());
        assert!(errors.get("phone").is_none());
    }

    #[test]
    fn email_check_is_basic_but_not_naive() {
        assert!(validate_email("a@b.co"));
        assert!(!validate_email("@b.co"));
        assert!(!validate_email("a@bco"));
        assert!(!validate_email("a@b.co."));
    }

    #[tokio::test]
    async fn booking_holds_the_room_and_notifies() {
        let store = Arc::new(MemoryStore::demo(TIMEOUT));
        let (mailer, mut rx) = Mailer::channel("me@here.com", "me@there.com");
        let range = StayRange::parse("2050-01-01", "2050-01-02").unwrap();

        let reservation = book(
            store.as_ref(),
            store.as_ref(),
            &mailer,
            NewReservation { guest: guest(), room_id: 1, range },
            "General's Quarters",
        )
        .await
        .unwrap();

        let held = store.restrictions().await;
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].reservation_id, reservation.id);
        assert_eq!(held[0].kind, RestrictionKind::ReservationHeld);

        let engine = AvailabilityEngine::new(store.clone());
        assert!(!engine.is_room_available(1, &range).await.unwrap());
        let next = StayRange::parse("2050-01-02", "2050-01-03").unwrap();
        assert!(engine.is_room_available(1, &next).await.unwrap());

        assert_eq!(rx.recv().await.unwrap().to, "john@smith.com");
        assert_eq!(rx.recv().await.unwrap().to, "me@there.com");
    }

    /// Guarda y lista con normalidad pero no puede leer una reserva suelta
    struct UnreadableReservations(Arc<MemoryStore>);

    #[async_trait]
    impl ReservationStore for UnreadableReservations {
        async fn insert_reservation(&self, reservation: NewReservation) -> BookingResult<ReservationId> {
            self.0.insert_reservation(reservation).await
        }

        async fn reservation_by_id(&self, _id: ReservationId) -> BookingResult<Reservation> {
            Err(BookingError::StorageTimeout {
                operation: "reservation_by_id".into(),
            })
        }

        async fn all_reservations(&self) -> BookingResult<Vec<Reservation>> {
            self.0.all_reservations().await
        }

        async fn new_reservations(&self) -> BookingResult<Vec<Reservation>> {
            self.0.new_reservations().await
        }

        async fn update_guest(&self, id: ReservationId, guest: &GuestDetails) -> BookingResult<()> {
            self.0.update_guest(id, guest).await
        }

        async fn set_processed(&self, id: ReservationId, processed: bool) -> BookingResult<()> {
            self.0.set_processed(id, processed).await
        }

        async fn delete_reservation(&self, id: ReservationId) -> BookingResult<()> {
            self.0.delete_reservation(id).await
        }
    }

    #[tokio::test]
    async fn stored_booking_succeeds_even_if_it_cannot_be_read_back() {
        let store = Arc::new(MemoryStore::demo(TIMEOUT));
        let unreadable = UnreadableReservations(store.clone());
        let (mailer, mut rx) = Mailer::channel("me@here.com", "me@there.com");
        let range = StayRange::parse("2050-02-01", "2050-02-03").unwrap();

        let reservation = book(
            store.as_ref(),
            &unreadable,
            &mailer,
            NewReservation { guest: guest(), room_id: 2, range },
            "Major's Suite",
        )
        .await
        .unwrap();

        assert_eq!(reservation.room_id, 2);
        assert_eq!(reservation.email, "john@smith.com");
        assert_eq!(reservation.start_date, range.start());
        assert_eq!(reservation.end_date, range.end());
        assert!(!reservation.processed);

        assert_eq!(store.all_reservations().await.unwrap().len(), 1);
        assert_eq!(store.restrictions().await.len(), 1);
        assert_eq!(rx.recv().await.unwrap().to, "john@smith.com");
        assert_eq!(rx.recv().await.unwrap().to, "me@there.com");
    }

    #[tokio::test]
    async fn failed_restriction_removes_the_reservation() {
        let store = Arc::new(MemoryStore::demo(TIMEOUT).with_script(FailureScript::sentinels()));
        let (mailer, mut rx) = Mailer::channel("me@here.com", "me@there.com");
        let range = StayRange::parse("2050-01-01", "2050-01-02").unwrap();

        let err = book(
            store.as_ref(),
            store.as_ref(),
            &mailer,
            NewReservation { guest: guest(), room_id: 1000, range },
            "Fantasma",
        )
        .await
        .unwrap_err();

        assert!(err.is_storage());
        assert!(store.all_reservations().await.unwrap().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_reservation_insert_writes_nothing() {
        let store = Arc::new(MemoryStore::demo(TIMEOUT).with_script(FailureScript {
            failing_reservation_room: Some(2),
            ..FailureScript::default()
        }));
        let (mailer, _rx) = Mailer::channel("me@here.com", "me@there.com");
        let range = StayRange::parse("2050-01-01", "2050-01-02").unwrap();

        let result = book(
            store.as_ref(),
            store.as_ref(),
            &mailer,
            NewReservation { guest: guest(), room_id: 2, range },
            "Major's Suite",
        )
        .await;

        assert!(result.is_err());
        assert!(store.restrictions().await.is_empty());
    }
}
