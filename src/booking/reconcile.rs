//! # Conciliación del calendario
//!
//! El formulario del calendario solo envía cambios. Cada bloqueo existente se
//! muestra como casilla marcada `remove_block_{room}_{day}`; si la casilla no
//! vuelve en el POST, el bloqueo se borra. Las casillas nuevas llegan como
//! `add_block_{room}_{day}` y se insertan como bloqueos de un día.
//!
//! Solo se trabaja sobre el `block_map`. Las restricciones de reservas nunca
//! se tocan.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::calendar::{BlockMapCache, DayMap};
use super::error::BookingError;
use super::model::{format_date, parse_date, NewRestriction, RestrictionId, Room, RoomId};
use super::store::IntervalStore;
use crate::telemetry::log_error_chain;

pub const KEEP_PREFIX: &str = "remove_block_";
pub const ADD_PREFIX: &str = "add_block_";

/// Nombre del campo que conserva un bloqueo existente
pub fn keep_field(room_id: RoomId, day: NaiveDate) -> String {
    format!("{}{}_{}", KEEP_PREFIX, room_id, format_date(day))
}

/// Nombre del campo que pide un bloqueo nuevo
pub fn add_field(room_id: RoomId, day: NaiveDate) -> String {
    format!("{}{}_{}", ADD_PREFIX, room_id, format_date(day))
}

fn parse_room_day(rest: &str) -> Option<(RoomId, NaiveDate)> {
    let (room, day) = rest.split_once('_')?;
    let room_id: RoomId = room.parse().ok()?;
    let day = parse_date("day", day).ok()?;
    Some((room_id, day))
}

/// Campos de bloqueo del formulario ya interpretados
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockEditForm {
    keep: BTreeSet<(RoomId, NaiveDate)>,
    add: BTreeSet<(RoomId, NaiveDate)>,
}

impl BlockEditForm {
    pub fn from_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut form = Self::default();
        for (name, _) in fields {
            if let Some(rest) = name.strip_prefix(KEEP_PREFIX) {
                match parse_room_day(rest) {
                    Some(key) => {
                        form.keep.insert(key);
                    }
                    None => tracing::warn!(field = %name, "Ignoring malformed keep-block field"),
                }
            } else if let Some(rest) = name.strip_prefix(ADD_PREFIX) {
                match parse_room_day(rest) {
                    Some(key) => {
                        form.add.insert(key);
                    }
                    None => tracing::warn!(field = %name, "Ignoring malformed add-block field"),
                }
            }
        }
        form
    }

    pub fn keeps(&self, room_id: RoomId, day: NaiveDate) -> bool {
        self.keep.contains(&(room_id, day))
    }

    pub fn additions(&self) -> impl Iterator<Item = (RoomId, NaiveDate)> + '_ {
        self.add.iter().copied()
    }
}

/// Operaciones que resultan del diff
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcilePlan {
    pub deletes: Vec<RestrictionId>,
    pub inserts: Vec<(RoomId, NaiveDate)>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

/// Calcula borrados e inserciones.
///
/// Todo bloqueo en caché se considera borrado salvo que el formulario lo
/// reconfirme. Las altas de un día cuyo bloqueo se conserva se omiten.
pub fn plan(previous: &BTreeMap<RoomId, DayMap>, form: &BlockEditForm) -> ReconcilePlan {
    let mut result = ReconcilePlan::default();
    let mut kept = BTreeSet::new();

    for (room_id, map) in previous {
        for (day, restriction_id) in map.occupied() {
            if form.keeps(*room_id, day) {
                kept.insert((*room_id, day));
            } else {
                result.deletes.push(restriction_id);
            }
        }
    }

    result.inserts = form
        .additions()
        .filter(|key| !kept.contains(key))
        .collect();
    result
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ItemFailure {
    Delete { restriction_id: RestrictionId, error: String },
    Insert { room_id: RoomId, day: NaiveDate, error: String },
}

/// Resultado de aplicar el plan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub deleted: Vec<RestrictionId>,
    /// Ids que ya no existían, tratados como borrados
    pub already_gone: Vec<RestrictionId>,
    pub inserted: Vec<RestrictionId>,
    pub failures: Vec<ItemFailure>,
    /// Habitaciones sin mapa en sesión
    pub missing_cache: Vec<RoomId>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aplica el plan elemento a elemento. Un fallo se registra y no detiene el
/// resto.
pub async fn apply(store: &dyn IntervalStore, plan: &ReconcilePlan) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for &restriction_id in &plan.deletes {
        match store.delete_by_id(restriction_id).await {
            Ok(true) => report.deleted.push(restriction_id),
            Ok(false) => {
                tracing::debug!(restriction_id, "Block already deleted");
                report.already_gone.push(restriction_id);
            }
            Err(e) => {
                log_error_chain(&e, Some("deleting owner block"));
                report.failures.push(ItemFailure::Delete {
                    restriction_id,
                    error: e.to_string(),
                });
            }
        }
    }

    for &(room_id, day) in &plan.inserts {
        let result = match NewRestriction::owner_block(room_id, day) {
            Ok(block) => store.insert(block).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => report.inserted.push(id),
            Err(e) => {
                log_error_chain(&e, Some("inserting owner block"));
                report.failures.push(ItemFailure::Insert {
                    room_id,
                    day,
                    error: e.to_string(),
                });
            }
        }
    }

    report
}

/// Lee de la caché el mapa de cada habitación, calcula el plan y lo aplica
pub async fn reconcile(
    store: &dyn IntervalStore,
    cache: &dyn BlockMapCache,
    rooms: &[Room],
    form: &BlockEditForm,
) -> ReconcileReport {
    let mut previous = BTreeMap::new();
    let mut missing = Vec::new();

    for room in rooms {
        match cache.take_block_map(room.id) {
            Ok(map) => {
                previous.insert(room.id, map);
            }
            Err(BookingError::MissingCacheState(room_id)) => {
                tracing::warn!(room_id, "No cached block map; only additions will be applied");
                missing.push(room_id);
            }
            Err(e) => {
                log_error_chain(&e, Some("reading cached block map"));
                missing.push(room.id);
            }
        }
    }

    let known: BTreeSet<RoomId> = rooms.iter().map(|room| room.id).collect();
    let mut plan = plan(&previous, form);
    plan.inserts.retain(|(room_id, day)| {
        let is_known = known.contains(room_id);
        if !is_known {
            tracing::warn!(room_id, day = %day, "Ignoring block for unknown room");
        }
        is_known
    });

    let mut report = apply(store, &plan).await;
    report.missing_cache = missing;

    tracing::info!(
        deleted = report.deleted.len(),
        inserted = report.inserted.len(),
        failures = report.failures.len(),
        "Calendar blocks reconciled"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::calendar::tests::TestCache;
    use crate::booking::calendar::{project_month, MonthWindow};
    use crate::booking::memory::{FailureScript, MemoryStore};
    use crate::booking::model::{RestrictionKind, StayRange, DATE_LAYOUT};
    use crate::booking::store::IntervalStore;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(3);

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_LAYOUT).unwrap()
    }

    fn june_map(entries: &[(&str, i64)]) -> DayMap {
        let mut map = DayMap::empty_month(&MonthWindow::new(2025, 6).unwrap());
        for (day, id) in entries {
            map.stamp(date(day), *id);
        }
        map
    }

    #[test]
    fn parses_keep_and_add_fields() {
        let form = BlockEditForm::from_fields(vec![
            ("remove_block_1_2025-06-10", "42"),
            ("add_block_2_2025-06-2", "1"),
            ("add_block_x_2025-06-03", "1"),
            ("add_block_3", "1"),
            ("csrf_token", "abc"),
            ("y", "2025"),
        ]);
        assert!(form.keeps(1, date("2025-06-10")));
        assert!(!form.keeps(2, date("2025-06-10")));
        let adds: Vec<_> = form.additions().collect();
        assert_eq!(adds, vec![(2, date("2025-06-02"))]);
    }

    #[test]
    fn field_names_round_trip_through_the_parser() {
        let keep = keep_field(7, date("2025-06-01"));
        let add = add_field(7, date("2025-06-09"));
        assert_eq!(keep, "remove_block_7_2025-06-01");
        let form = BlockEditForm::from_fields(vec![(keep.as_str(), "1"), (add.as_str(), "1")]);
        assert!(form.keeps(7, date("2025-06-01")));
        assert_eq!(form.additions().collect::<Vec<_>>(), vec![(7, date("2025-06-09"))]);
    }

    #[test]
    fn unconfirmed_block_is_deleted_and_new_block_inserted() {
        let mut previous = BTreeMap::new();
        previous.insert(1, june_map(&[("2025-06-10", 42)]));
        let add = add_field(1, date("2025-06-12"));
        let form = BlockEditForm::from_fields(vec![(add.as_str(), "1")]);

        let plan = plan(&previous, &form);
        assert_eq!(plan.deletes, vec![42]);
        assert_eq!(plan.inserts, vec![(1, date("2025-06-12"))]);
    }

    #[test]
    fn confirmed_blocks_survive() {
        let mut previous = BTreeMap::new();
        previous.insert(1, june_map(&[("2025-06-10", 42), ("2025-06-11", 43)]));
        previous.insert(2, june_map(&[("2025-06-10", 44)]));
        let keep = keep_field(1, date("2025-06-11"));
        // Reconfirmar el día 11 de la habitación 1 no salva el día 10 de la 2
        let form = BlockEditForm::from_fields(vec![(keep.as_str(), "43")]);

        let plan = plan(&previous, &form);
        assert_eq!(plan.deletes, vec![42, 44]);
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn adding_over_a_kept_block_is_skipped() {
        let mut previous = BTreeMap::new();
        previous.insert(1, june_map(&[("2025-06-10", 42)]));
        let keep = keep_field(1, date("2025-06-10"));
        let add = add_field(1, date("2025-06-10"));
        let form = BlockEditForm::from_fields(vec![(keep.as_str(), "42"), (add.as_str(), "1")]);
        assert!(plan(&previous, &form).is_empty());
    }

    #[tokio::test]
    async fn missing_cache_only_applies_additions() {
        let store = MemoryStore::demo(TIMEOUT);
        let existing = store
            .insert(NewRestriction::owner_block(1, date("2025-06-10")).unwrap())
            .await
            .unwrap();
        let rooms = store.all_rooms().await.unwrap();
        let cache = TestCache::default();
        let add = add_field(1, date("2025-06-12"));
        let form = BlockEditForm::from_fields(vec![(add.as_str(), "1")]);

        let report = reconcile(&store, &cache, &rooms, &form).await;

        assert!(report.deleted.is_empty());
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.missing_cache, vec![1, 2]);
        let ids: Vec<i64> = store.restrictions().await.iter().map(|r| r.id).collect();
        assert!(ids.contains(&existing));
    }

    #[tokio::test]
    async fn blocks_for_unknown_rooms_are_dropped() {
        let store = MemoryStore::demo(TIMEOUT);
        let rooms = store.all_rooms().await.unwrap();
        let cache = TestCache::default();
        let ghost = add_field(77, date("2025-06-12"));
        let real = add_field(2, date("2025-06-12"));
        let form = BlockEditForm::from_fields(vec![(ghost.as_str(), "1"), (real.as_str(), "1")]);

        let report = reconcile(&store, &cache, &rooms, &form).await;

        assert_eq!(report.inserted.len(), 1);
        assert!(report.is_clean());
        let blocks = store.restrictions().await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].room_id, 2);
    }

    #[tokio::test]
    async fn reservations_are_never_touched() {
        let store = MemoryStore::demo(TIMEOUT);
        let stay = StayRange::parse("2025-06-05", "2025-06-08").unwrap();
        store.insert(NewRestriction::for_reservation(1, stay, 31)).await.unwrap();
        store
            .insert(NewRestriction::owner_block(1, date("2025-06-20")).unwrap())
            .await
            .unwrap();

        let window = MonthWindow::new(2025, 6).unwrap();
        let cache = TestCache::default();
        let calendars = project_month(&store, &cache, &window).await.unwrap();
        let rooms: Vec<_> = calendars.into_iter().map(|c| c.room).collect();

        // Formulario vacío: se borran todos los bloqueos, ninguna reserva
        let report = reconcile(&store, &cache, &rooms, &BlockEditForm::default()).await;
        assert_eq!(report.deleted.len(), 1);

        let remaining = store.restrictions().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].kind, RestrictionKind::ReservationHeld);
        assert_eq!(remaining[0].reservation_id, 31);
    }

    #[tokio::test]
    async fn one_failing_item_does_not_abort_the_batch() {
        let store = MemoryStore::with_rooms(TIMEOUT, &["A", "B"]).with_script(FailureScript::sentinels());
        let stale = 999;
        let plan = ReconcilePlan {
            deletes: vec![stale],
            inserts: vec![(1000, date("2025-06-12")), (1, date("2025-06-13"))],
        };

        let report = apply(&store, &plan).await;

        assert_eq!(report.already_gone, vec![stale]);
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            ItemFailure::Insert { room_id: 1000, .. }
        ));
        assert!(!report.is_clean());

        let stored = store.restrictions().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].start_date, date("2025-06-13"));
        assert_eq!(stored[0].end_date, date("2025-06-14"));
    }
}
