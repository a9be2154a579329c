use std::sync::Arc;

use super::error::BookingResult;
use super::model::{Room, RoomId, StayRange};
use super::store::IntervalStore;

/// Responde si una habitación, o alguna, está libre para `[start, end)`.
///
/// Los rangos ya llegan validados como [`StayRange`], así que `start < end`
/// está garantizado antes de tocar el almacenamiento.
#[derive(Clone)]
pub struct AvailabilityEngine {
    store: Arc<dyn IntervalStore>,
}

impl AvailabilityEngine {
    pub fn new(store: Arc<dyn IntervalStore>) -> Self {
        Self { store }
    }

    pub async fn is_room_available(&self, room_id: RoomId, range: &StayRange) -> BookingResult<bool> {
        let overlapping = self.store.find_overlapping(room_id, range).await?;
        tracing::debug!(
            room_id,
            start = %range.start(),
            end = %range.end(),
            overlapping,
            "Room availability checked"
        );
        Ok(overlapping == 0)
    }

    /// Habitaciones libres en orden de nombre. Vacío significa "sin
    /// disponibilidad", no es un error.
    pub async fn available_rooms(&self, range: &StayRange) -> BookingResult<Vec<Room>> {
        let free = self.store.rooms_available(range).await?;
        let mut rooms = self.store.all_rooms().await?;
        rooms.retain(|room| free.contains(&room.id));
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::memory::{FailureScript, MemoryStore};
    use crate::booking::model::{NewRestriction, NewReservation, GuestDetails};
    use crate::booking::store::ReservationStore;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn stay(start: &str, end: &str) -> StayRange {
        StayRange::parse(start, end).unwrap()
    }

    async fn engine_with_stay(room_id: RoomId, start: &str, end: &str) -> AvailabilityEngine {
        let store = MemoryStore::demo(TIMEOUT);
        store
            .insert(NewRestriction::for_reservation(room_id, stay(start, end), 1))
            .await
            .unwrap();
        AvailabilityEngine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn back_to_back_stay_is_available() {
        let engine = engine_with_stay(1, "2025-01-01", "2025-01-05").await;
        assert!(engine
            .is_room_available(1, &stay("2025-01-05", "2025-01-07"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn overlapping_stay_is_not_available() {
        let engine = engine_with_stay(1, "2025-01-01", "2025-01-05").await;
        assert!(!engine
            .is_room_available(1, &stay("2025-01-04", "2025-01-06"))
            .await
            .unwrap());
        // Un rango que contiene por completo la estancia también choca
        assert!(!engine
            .is_room_available(1, &stay("2024-12-30", "2025-01-10"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stay_ending_on_existing_checkin_is_available() {
        let engine = engine_with_stay(1, "2025-01-05", "2025-01-07").await;
        assert!(engine
            .is_room_available(1, &stay("2025-01-01", "2025-01-05"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn available_rooms_skips_busy_room_in_name_order() {
        let store = MemoryStore::with_rooms(TIMEOUT, &["Suite Cedro", "Suite Abeto", "Suite Boj"]);
        // Habitación 2 = "Suite Abeto"
        store
            .insert(NewRestriction::owner_block(2, chrono::NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()).unwrap())
            .await
            .unwrap();
        let engine = AvailabilityEngine::new(Arc::new(store));

        let rooms = engine.available_rooms(&stay("2025-03-01", "2025-03-05")).await.unwrap();
        let names: Vec<&str> = rooms.iter().map(|r| r.room_name.as_str()).collect();
        assert_eq!(names, vec!["Suite Boj", "Suite Cedro"]);
        let ids: Vec<RoomId> = rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn no_free_rooms_is_an_empty_result() {
        let store = MemoryStore::with_rooms(TIMEOUT, &["Única"]);
        store
            .insert(NewRestriction::for_reservation(1, stay("2025-03-01", "2025-03-10"), 4))
            .await
            .unwrap();
        let engine = AvailabilityEngine::new(Arc::new(store));
        assert!(engine
            .available_rooms(&stay("2025-03-02", "2025-03-03"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn availability_matches_overlap_predicate_exhaustively() {
        // Estancia fija [día 10, día 14) y todas las consultas dentro de [día 5, día 20)
        let base = chrono::NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let day = |n: i64| base + chrono::Duration::days(n);
        let store = MemoryStore::demo(TIMEOUT);
        store
            .insert(NewRestriction::for_reservation(1, StayRange::new(day(10), day(14)).unwrap(), 1))
            .await
            .unwrap();
        let engine = AvailabilityEngine::new(Arc::new(store));

        for s in 5..20 {
            for e in (s + 1)..=20 {
                let range = StayRange::new(day(s), day(e)).unwrap();
                let expected = !(day(14) > day(s) && day(10) < day(e));
                assert_eq!(
                    engine.is_room_available(1, &range).await.unwrap(),
                    expected,
                    "rango [{}, {})",
                    s,
                    e
                );
            }
        }
    }

    #[tokio::test]
    async fn reservation_blocks_its_own_nights_only() {
        let store = Arc::new(MemoryStore::demo(TIMEOUT));
        let range = stay("2050-01-01", "2050-01-02");
        let id = store
            .insert_reservation(NewReservation {
                guest: GuestDetails::default(),
                room_id: 1,
                range,
            })
            .await
            .unwrap();
        store
            .insert(NewRestriction::for_reservation(1, range, id))
            .await
            .unwrap();

        let engine = AvailabilityEngine::new(store);
        assert!(!engine.is_room_available(1, &range).await.unwrap());
        assert!(engine
            .is_room_available(1, &stay("2050-01-02", "2050-01-03"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn storage_failures_propagate() {
        let store = MemoryStore::demo(TIMEOUT).with_script(FailureScript::sentinels());
        let engine = AvailabilityEngine::new(Arc::new(store));
        let err = engine
            .available_rooms(&stay("2060-01-01", "2060-01-02"))
            .await
            .unwrap_err();
        assert!(err.is_storage());
    }
}
