//! # Proyección del calendario mensual
//!
//! Para cada habitación se construyen dos mapas día -> id que cubren del día
//! 1 al último día del mes:
//!
//! - `reservation_map`: id de la reserva que ocupa el día
//! - `block_map`: id de la restricción de bloqueo del propietario
//!
//! El `block_map` se guarda en la sesión para que el POST del formulario de
//! calendario pueda calcular qué bloqueos desaparecieron.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::{BookingError, BookingResult};
use super::model::{Room, RoomId, RoomRestriction};
use super::store::IntervalStore;

/// Mes visible del calendario, con primer y último día inclusivos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    year: i32,
    month: u32,
    first: NaiveDate,
    last: NaiveDate,
}

impl MonthWindow {
    pub fn new(year: i32, month: u32) -> BookingResult<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| BookingError::invalid_range(format!("mes inválido: {}-{}", year, month)))?;
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| BookingError::invalid_range(format!("mes fuera de rango: {}-{}", year, month)))?;
        Ok(Self { year, month, first, last })
    }

    /// Mes que contiene `day`
    pub fn containing(day: NaiveDate) -> Self {
        let first = day.with_day(1).unwrap_or(day);
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(first);
        Self {
            year: day.year(),
            month: day.month(),
            first,
            last,
        }
    }

    /// Acepta los parámetros `y=YYYY` y `m=MM` de la consulta
    pub fn parse(year: &str, month: &str) -> BookingResult<Self> {
        let year: i32 = year
            .trim()
            .parse()
            .map_err(|_| BookingError::invalid_range(format!("año inválido: '{}'", year)))?;
        let month: u32 = month
            .trim()
            .parse()
            .map_err(|_| BookingError::invalid_range(format!("mes inválido: '{}'", month)))?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first(&self) -> NaiveDate {
        self.first
    }

    pub fn last(&self) -> NaiveDate {
        self.last
    }

    pub fn days_in_month(&self) -> u32 {
        self.last.day()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.first && day <= self.last
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last;
        self.first.iter_days().take_while(move |d| *d <= last)
    }

    pub fn next(&self) -> Self {
        let next = self.first.checked_add_months(Months::new(1)).unwrap_or(self.first);
        Self::containing(next)
    }

    pub fn previous(&self) -> Self {
        let previous = self.first.checked_sub_months(Months::new(1)).unwrap_or(self.first);
        Self::containing(previous)
    }
}

/// Mapa día -> id (0 = libre) de un mes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMap(BTreeMap<NaiveDate, i64>);

impl DayMap {
    /// Todos los días del mes a 0
    pub fn empty_month(window: &MonthWindow) -> Self {
        Self(window.days().map(|d| (d, 0)).collect())
    }

    pub fn get(&self, day: NaiveDate) -> i64 {
        self.0.get(&day).copied().unwrap_or(0)
    }

    /// Solo escribe días que ya pertenecen al mapa
    pub fn stamp(&mut self, day: NaiveDate, id: i64) -> bool {
        match self.0.get_mut(&day) {
            Some(slot) => {
                *slot = id;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.0.iter().map(|(d, id)| (*d, *id))
    }

    /// Días con id distinto de 0
    pub fn occupied(&self) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.iter().filter(|(_, id)| *id > 0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomCalendar {
    pub room: Room,
    pub reservation_map: DayMap,
    pub block_map: DayMap,
}

/// Caché de sesión del `block_map` entre el GET y el POST del calendario
pub trait BlockMapCache {
    fn store_block_map(&self, room_id: RoomId, map: &DayMap);

    /// Lee e invalida. `MissingCacheState` si no hubo GET previo.
    fn take_block_map(&self, room_id: RoomId) -> BookingResult<DayMap>;
}

/// Clave de sesión del mapa de bloqueos de una habitación
pub fn block_map_key(room_id: RoomId) -> String {
    format!("block_map_{}", room_id)
}

/// Pinta las restricciones sobre mapas vacíos del mes.
///
/// Las reservas ocupan de `start_date` a `end_date` ambos inclusive (el día
/// de salida se muestra ocupado), recortadas a la ventana. Los bloqueos son
/// granos de un día y solo marcan su `start_date`.
pub fn stamp_restrictions(
    window: &MonthWindow,
    restrictions: &[RoomRestriction],
) -> (DayMap, DayMap) {
    let mut reservation_map = DayMap::empty_month(window);
    let mut block_map = DayMap::empty_month(window);

    for restriction in restrictions {
        if restriction.is_reservation() {
            let from = restriction.start_date.max(window.first());
            let to = restriction.end_date.min(window.last());
            let mut day = from;
            while day <= to {
                reservation_map.stamp(day, restriction.reservation_id);
                match day.succ_opt() {
                    Some(next) => day = next,
                    None => break,
                }
            }
        } else if window.contains(restriction.start_date) {
            block_map.stamp(restriction.start_date, restriction.id);
        }
    }

    (reservation_map, block_map)
}

pub async fn project_room(
    store: &dyn IntervalStore,
    room: Room,
    window: &MonthWindow,
) -> BookingResult<RoomCalendar> {
    let restrictions = store
        .restrictions_in_range(room.id, window.first(), window.last())
        .await?;
    let (reservation_map, block_map) = stamp_restrictions(window, &restrictions);
    Ok(RoomCalendar {
        room,
        reservation_map,
        block_map,
    })
}

/// Proyecta todas las habitaciones y deja cada `block_map` en la caché
pub async fn project_month(
    store: &dyn IntervalStore,
    cache: &dyn BlockMapCache,
    window: &MonthWindow,
) -> BookingResult<Vec<RoomCalendar>> {
    let rooms = store.all_rooms().await?;
    let mut calendars = Vec::with_capacity(rooms.len());

    for room in rooms {
        let calendar = project_room(store, room, window).await?;
        cache.store_block_map(calendar.room.id, &calendar.block_map);
        calendars.push(calendar);
    }

    tracing::debug!(
        year = window.year(),
        month = window.month(),
        rooms = calendars.len(),
        "Month calendar projected"
    );
    Ok(calendars)
}
