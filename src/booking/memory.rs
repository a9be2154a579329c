//! # Almacén en memoria
//!
//! Implementación de los puertos de almacenamiento sin base de datos. Sirve
//! para desarrollo (`STORAGE_BACKEND=memory`) y para los tests, donde un
//! [`FailureScript`] permite simular fallos del backend con valores centinela.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use tokio::sync::RwLock;

use super::credentials::{password_digest, password_matches};
use super::error::{BookingError, BookingResult};
use super::model::*;
use super::store::{with_timeout, CredentialVerifier, IntervalStore, ReservationStore};

/// Habitaciones de demostración
pub const DEMO_ROOMS: [&str; 2] = ["General's Quarters", "Major's Suite"];

/// Fallos guionizados del almacén en memoria
#[derive(Debug, Clone, Default)]
pub struct FailureScript {
    /// Insertar una restricción para esta habitación falla
    pub failing_restriction_room: Option<RoomId>,
    /// Insertar una reserva para esta habitación falla
    pub failing_reservation_room: Option<RoomId>,
    /// Consultas cuyo rango empieza en este año o después fallan
    pub failing_from_year: Option<i32>,
    /// Retraso antes de cada operación
    pub stall: Option<Duration>,
}

impl FailureScript {
    /// Centinelas habituales: habitación 1000 y año 2060
    pub fn sentinels() -> Self {
        Self {
            failing_restriction_room: Some(1000),
            failing_reservation_room: None,
            failing_from_year: Some(2060),
            stall: None,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    rooms: BTreeMap<RoomId, Room>,
    restrictions: BTreeMap<RestrictionId, RoomRestriction>,
    reservations: BTreeMap<ReservationId, Reservation>,
    users: Vec<User>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn with_room(&self, mut reservation: Reservation) -> Reservation {
        reservation.room = self.rooms.get(&reservation.room_id).cloned();
        reservation
    }
}

pub struct MemoryStore {
    state: RwLock<MemoryState>,
    script: FailureScript,
    timeout: Duration,
}

impl MemoryStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            script: FailureScript::default(),
            timeout,
        }
    }

    /// Almacén con habitaciones creadas en el orden dado (ids 1, 2, ...)
    pub fn with_rooms(timeout: Duration, names: &[&str]) -> Self {
        let mut state = MemoryState::default();
        let now = current_timestamp();
        for name in names {
            let id = state.next_id();
            state.rooms.insert(
                id,
                Room {
                    id,
                    room_name: name.to_string(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        Self {
            state: RwLock::new(state),
            script: FailureScript::default(),
            timeout,
        }
    }

    pub fn demo(timeout: Duration) -> Self {
        Self::with_rooms(timeout, &DEMO_ROOMS)
    }

    pub fn with_script(mut self, script: FailureScript) -> Self {
        self.script = script;
        self
    }

    pub async fn add_user(&self, email: &str, password: &str) -> UserId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.users.push(User {
            id,
            first_name: "Admin".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            password_hash: password_digest(password),
            access_level: 3,
        });
        id
    }

    /// Todas las restricciones guardadas, para inspección
    pub async fn restrictions(&self) -> Vec<RoomRestriction> {
        self.state.read().await.restrictions.values().cloned().collect()
    }

    async fn stall(&self) {
        if let Some(delay) = self.script.stall {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_year(&self, operation: &str, start: NaiveDate) -> BookingResult<()> {
        match self.script.failing_from_year {
            Some(year) if start.year() >= year => Err(BookingError::storage(
                operation,
                format!("fallo simulado para fechas desde {}", year),
            )),
            _ => Ok(()),
        }
    }

    fn check_room(&self, operation: &str, failing: Option<RoomId>, room_id: RoomId) -> BookingResult<()> {
        match failing {
            Some(id) if id == room_id => Err(BookingError::storage(
                operation,
                format!("fallo simulado para la habitación {}", room_id),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl IntervalStore for MemoryStore {
    async fn find_overlapping(&self, room_id: RoomId, range: &StayRange) -> BookingResult<u64> {
        with_timeout(self.timeout, "find_overlapping", async {
            self.stall().await;
            self.check_year("find_overlapping", range.start())?;
            let state = self.state.read().await;
            Ok(state
                .restrictions
                .values()
                .filter(|r| r.room_id == room_id && range.overlaps(r.start_date, r.end_date))
                .count() as u64)
        })
        .await
    }

    async fn rooms_available(&self, range: &StayRange) -> BookingResult<BTreeSet<RoomId>> {
        with_timeout(self.timeout, "rooms_available", async {
            self.stall().await;
            self.check_year("rooms_available", range.start())?;
            let state = self.state.read().await;
            let busy: BTreeSet<RoomId> = state
                .restrictions
                .values()
                .filter(|r| range.overlaps(r.start_date, r.end_date))
                .map(|r| r.room_id)
                .collect();
            Ok(state.rooms.keys().filter(|id| !busy.contains(id)).copied().collect())
        })
        .await
    }

    async fn restrictions_in_range(
        &self,
        room_id: RoomId,
        first: NaiveDate,
        last: NaiveDate,
    ) -> BookingResult<Vec<RoomRestriction>> {
        with_timeout(self.timeout, "restrictions_in_range", async {
            self.stall().await;
            self.check_year("restrictions_in_range", first)?;
            let state = self.state.read().await;
            Ok(state
                .restrictions
                .values()
                .filter(|r| r.room_id == room_id && r.end_date > first && r.start_date <= last)
                .cloned()
                .collect())
        })
        .await
    }

    async fn insert(&self, restriction: NewRestriction) -> BookingResult<RestrictionId> {
        with_timeout(self.timeout, "insert_restriction", async {
            self.stall().await;
            self.check_room(
                "insert_restriction",
                self.script.failing_restriction_room,
                restriction.room_id,
            )?;
            let mut state = self.state.write().await;
            let id = state.next_id();
            state
                .restrictions
                .insert(id, restriction.into_restriction(id, current_timestamp()));
            Ok(id)
        })
        .await
    }

    async fn delete_by_id(&self, id: RestrictionId) -> BookingResult<bool> {
        with_timeout(self.timeout, "delete_restriction", async {
            self.stall().await;
            Ok(self.state.write().await.restrictions.remove(&id).is_some())
        })
        .await
    }

    async fn all_rooms(&self) -> BookingResult<Vec<Room>> {
        with_timeout(self.timeout, "all_rooms", async {
            self.stall().await;
            let mut rooms: Vec<Room> = self.state.read().await.rooms.values().cloned().collect();
            rooms.sort_by(|a, b| a.room_name.cmp(&b.room_name));
            Ok(rooms)
        })
        .await
    }

    async fn room_by_id(&self, id: RoomId) -> BookingResult<Room> {
        with_timeout(self.timeout, "room_by_id", async {
            self.stall().await;
            self.state
                .read()
                .await
                .rooms
                .get(&id)
                .cloned()
                .ok_or(BookingError::RoomNotFound(id))
        })
        .await
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert_reservation(&self, reservation: NewReservation) -> BookingResult<ReservationId> {
        with_timeout(self.timeout, "insert_reservation", async {
            self.stall().await;
            self.check_room(
                "insert_reservation",
                self.script.failing_reservation_room,
                reservation.room_id,
            )?;
            let mut state = self.state.write().await;
            let id = state.next_id();
            state
                .reservations
                .insert(id, reservation.into_reservation(id, current_timestamp()));
            Ok(id)
        })
        .await
    }

    async fn reservation_by_id(&self, id: ReservationId) -> BookingResult<Reservation> {
        with_timeout(self.timeout, "reservation_by_id", async {
            self.stall().await;
            let state = self.state.read().await;
            state
                .reservations
                .get(&id)
                .cloned()
                .map(|r| state.with_room(r))
                .ok_or(BookingError::ReservationNotFound(id))
        })
        .await
    }

    async fn all_reservations(&self) -> BookingResult<Vec<Reservation>> {
        with_timeout(self.timeout, "all_reservations", async {
            self.stall().await;
            let state = self.state.read().await;
            let mut all: Vec<Reservation> = state
                .reservations
                .values()
                .cloned()
                .map(|r| state.with_room(r))
                .collect();
            all.sort_by_key(|r| r.start_date);
            Ok(all)
        })
        .await
    }

    async fn new_reservations(&self) -> BookingResult<Vec<Reservation>> {
        let mut all = self.all_reservations().await?;
        all.retain(|r| !r.processed);
        Ok(all)
    }

    async fn update_guest(&self, id: ReservationId, guest: &GuestDetails) -> BookingResult<()> {
        with_timeout(self.timeout, "update_guest", async {
            self.stall().await;
            let mut state = self.state.write().await;
            let reservation = state
                .reservations
                .get_mut(&id)
                .ok_or(BookingError::ReservationNotFound(id))?;
            reservation.first_name = guest.first_name.clone();
            reservation.last_name = guest.last_name.clone();
            reservation.email = guest.email.clone();
            reservation.phone = guest.phone.clone();
            reservation.updated_at = current_timestamp();
            Ok(())
        })
        .await
    }

    async fn set_processed(&self, id: ReservationId, processed: bool) -> BookingResult<()> {
        with_timeout(self.timeout, "set_processed", async {
            self.stall().await;
            let mut state = self.state.write().await;
            let reservation = state
                .reservations
                .get_mut(&id)
                .ok_or(BookingError::ReservationNotFound(id))?;
            reservation.processed = processed;
            reservation.updated_at = current_timestamp();
            Ok(())
        })
        .await
    }

    async fn delete_reservation(&self, id: ReservationId) -> BookingResult<()> {
        with_timeout(self.timeout, "delete_reservation", async {
            self.stall().await;
            let mut state = self.state.write().await;
            state
                .reservations
                .remove(&id)
                .ok_or(BookingError::ReservationNotFound(id))?;
            state.restrictions.retain(|_, r| r.reservation_id != id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CredentialVerifier for MemoryStore {
    async fn authenticate(&self, email: &str, password: &str) -> BookingResult<UserId> {
        let state = self.state.read().await;
        state
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email) && password_matches(u, password))
            .map(|u| u.id)
            .ok_or(BookingError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_LAYOUT).unwrap()
    }

    fn stay(start: &str, end: &str) -> StayRange {
        StayRange::parse(start, end).unwrap()
    }

    #[tokio::test]
    async fn overlap_count_follows_half_open_rule() {
        let store = MemoryStore::demo(TIMEOUT);
        assert_ok!(
            store
                .insert(NewRestriction::for_reservation(1, stay("2025-01-01", "2025-01-05"), 9))
                .await
        );

        assert_eq!(store.find_overlapping(1, &stay("2025-01-05", "2025-01-07")).await.unwrap(), 0);
        assert_eq!(store.find_overlapping(1, &stay("2024-12-28", "2025-01-01")).await.unwrap(), 0);
        assert_eq!(store.find_overlapping(1, &stay("2025-01-04", "2025-01-06")).await.unwrap(), 1);
        assert_eq!(store.find_overlapping(2, &stay("2025-01-04", "2025-01-06")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn calendar_window_includes_restrictions_starting_on_last_day() {
        let store = MemoryStore::demo(TIMEOUT);
        let block = NewRestriction::owner_block(1, date("2025-06-30")).unwrap();
        store.insert(block).await.unwrap();
        let before = NewRestriction::owner_block(1, date("2025-05-31")).unwrap();
        store.insert(before).await.unwrap();

        let found = store
            .restrictions_in_range(1, date("2025-06-01"), date("2025-06-30"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].start_date, date("2025-06-30"));
    }

    #[tokio::test]
    async fn delete_reports_missing_rows() {
        let store = MemoryStore::demo(TIMEOUT);
        let id = store
            .insert(NewRestriction::owner_block(2, date("2025-06-10")).unwrap())
            .await
            .unwrap();
        assert!(store.delete_by_id(id).await.unwrap());
        assert!(!store.delete_by_id(id).await.unwrap());
    }

    #[tokio::test]
    async fn sentinels_simulate_storage_failures() {
        let store = MemoryStore::demo(TIMEOUT).with_script(FailureScript::sentinels());

        let err = store.find_overlapping(1, &stay("2060-01-01", "2060-01-02")).await.unwrap_err();
        assert!(err.is_storage());

        let err = store
            .insert(NewRestriction::owner_block(1000, date("2050-01-01")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let store = MemoryStore::demo(Duration::from_millis(20)).with_script(FailureScript {
            stall: Some(Duration::from_millis(300)),
            ..FailureScript::default()
        });
        let err = store.all_rooms().await.unwrap_err();
        assert!(matches!(err, BookingError::StorageTimeout { .. }));
    }

    #[tokio::test]
    async fn deleting_a_reservation_releases_its_restriction() {
        let store = MemoryStore::demo(TIMEOUT);
        let range = stay("2050-01-01", "2050-01-02");
        let id = store
            .insert_reservation(NewReservation {
                guest: GuestDetails {
                    first_name: "John".into(),
                    last_name: "Smith".into(),
                    email: "john@smith.com".into(),
                    phone: "123456789".into(),
                },
                room_id: 1,
                range,
            })
            .await
            .unwrap();
        store
            .insert(NewRestriction::for_reservation(1, range, id))
            .await
            .unwrap();

        let found = store.reservation_by_id(id).await.unwrap();
        assert_eq!(found.room.map(|r| r.room_name).as_deref(), Some("General's Quarters"));

        store.delete_reservation(id).await.unwrap();
        assert!(store.restrictions().await.is_empty());
        assert!(matches!(
            store.reservation_by_id(id).await,
            Err(BookingError::ReservationNotFound(_))
        ));
    }

    #[tokio::test]
    async fn credentials_are_checked_by_digest() {
        let store = MemoryStore::demo(TIMEOUT);
        let id = store.add_user("admin@here.com", "password").await;
        assert_eq!(store.authenticate("admin@here.com", "password").await.unwrap(), id);
        assert!(matches!(
            store.authenticate("admin@here.com", "nope").await,
            Err(BookingError::InvalidCredentials)
        ));
    }
}
