use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::error::{BookingError, BookingResult};

pub type RoomId = i64;
pub type ReservationId = i64;
pub type RestrictionId = i64;
pub type UserId = i64;

/// Formato de fecha de todos los parámetros externos
pub const DATE_LAYOUT: &str = "%Y-%m-%d";

/// Parsea una fecha externa `YYYY-MM-DD` (acepta día sin cero a la izquierda)
pub fn parse_date(field: &str, value: &str) -> BookingResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_LAYOUT).map_err(|_| {
        BookingError::invalid_range(format!("'{}' no es una fecha válida: '{}'", field, value))
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_LAYOUT).to_string()
}

/// Rango de estancia semiabierto `[start, end)`.
///
/// El día de salida no cuenta como ocupado, de modo que una salida y una
/// entrada el mismo día no se solapan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    #[serde(rename = "start_date")]
    start: NaiveDate,
    #[serde(rename = "end_date")]
    end: NaiveDate,
}

impl StayRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> BookingResult<Self> {
        if start >= end {
            return Err(BookingError::invalid_range(format!(
                "la fecha de inicio {} debe ser anterior a la de fin {}",
                format_date(start),
                format_date(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> BookingResult<Self> {
        Self::new(parse_date("start", start)?, parse_date("end", end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// Test de solapamiento semiabierto: `other.end > start AND other.start < end`
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        end > self.start && start < self.end
    }
}

/// Origen de una restricción
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum RestrictionKind {
    ReservationHeld = 1,
    OwnerBlock = 2,
}

impl From<RestrictionKind> for i32 {
    fn from(kind: RestrictionKind) -> Self {
        kind as i32
    }
}

impl TryFrom<i32> for RestrictionKind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::ReservationHeld),
            2 => Ok(Self::OwnerBlock),
            other => Err(format!("tipo de restricción desconocido: {}", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: RoomId,
    pub room_name: String,
    pub created_at: i64, // timestamp unix
    pub updated_at: i64, // timestamp unix
}

/// Intervalo de indisponibilidad de una habitación
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoomRestriction {
    #[serde(rename = "_id")]
    pub id: RestrictionId,
    pub room_id: RoomId,
    pub start_date: NaiveDate,
    /// Exclusiva
    pub end_date: NaiveDate,
    /// 0 cuando no pertenece a una reserva
    #[serde(default)]
    pub reservation_id: ReservationId,
    #[serde(rename = "restriction_id")]
    pub kind: RestrictionKind,
    pub created_at: i64,
    pub updated_at: i64,
}

impl RoomRestriction {
    pub fn is_reservation(&self) -> bool {
        self.reservation_id > 0
    }
}

/// Restricción pendiente de insertar
#[derive(Debug, Clone, PartialEq)]
pub struct NewRestriction {
    pub room_id: RoomId,
    pub range: StayRange,
    pub reservation_id: ReservationId,
    pub kind: RestrictionKind,
}

impl NewRestriction {
    pub fn for_reservation(room_id: RoomId, range: StayRange, reservation_id: ReservationId) -> Self {
        Self {
            room_id,
            range,
            reservation_id,
            kind: RestrictionKind::ReservationHeld,
        }
    }

    /// Bloqueo del propietario de un único día: `[day, day + 1)`
    pub fn owner_block(room_id: RoomId, day: NaiveDate) -> BookingResult<Self> {
        let next = day
            .succ_opt()
            .ok_or_else(|| BookingError::invalid_range(format!("{} no tiene día siguiente", day)))?;
        Ok(Self {
            room_id,
            range: StayRange::new(day, next)?,
            reservation_id: 0,
            kind: RestrictionKind::OwnerBlock,
        })
    }

    pub fn into_restriction(self, id: RestrictionId, now: i64) -> RoomRestriction {
        RoomRestriction {
            id,
            room_id: self.room_id,
            start_date: self.range.start(),
            end_date: self.range.end(),
            reservation_id: self.reservation_id,
            kind: self.kind,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Datos del huésped que se editan en formularios
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GuestDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: ReservationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub room_id: RoomId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub processed: bool,
    pub created_at: i64,
    pub updated_at: i64,
    /// Solo se rellena al leer para mostrar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
}

impl Reservation {
    pub fn range(&self) -> BookingResult<StayRange> {
        StayRange::new(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub guest: GuestDetails,
    pub room_id: RoomId,
    pub range: StayRange,
}

impl NewReservation {
    pub fn into_reservation(self, id: ReservationId, now: i64) -> Reservation {
        Reservation {
            id,
            first_name: self.guest.first_name,
            last_name: self.guest.last_name,
            email: self.guest.email,
            phone: self.guest.phone,
            room_id: self.room_id,
            start_date: self.range.start(),
            end_date: self.range.end(),
            processed: false,
            created_at: now,
            updated_at: now,
            room: None,
        }
    }
}

/// Personal del hotel con acceso a la consola de administración
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub access_level: i32,
}

/// Timestamp unix actual
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_LAYOUT).unwrap()
    }

    #[test]
    fn stay_range_rejects_empty_and_inverted() {
        assert!(matches!(
            StayRange::new(date("2025-01-05"), date("2025-01-05")),
            Err(BookingError::InvalidRange(_))
        ));
        assert!(matches!(
            StayRange::new(date("2025-01-06"), date("2025-01-05")),
            Err(BookingError::InvalidRange(_))
        ));
        assert_eq!(StayRange::parse("2025-01-01", "2025-01-05").unwrap().nights(), 4);
    }

    #[test]
    fn stay_range_rejects_garbage_dates() {
        assert!(matches!(
            StayRange::parse("mañana", "2025-01-05"),
            Err(BookingError::InvalidRange(_))
        ));
        assert!(matches!(
            StayRange::parse("2025-02-30", "2025-03-01"),
            Err(BookingError::InvalidRange(_))
        ));
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        let stay = StayRange::parse("2025-01-05", "2025-01-07").unwrap();
        assert!(!stay.overlaps(date("2025-01-01"), date("2025-01-05")));
        assert!(!stay.overlaps(date("2025-01-07"), date("2025-01-09")));
        assert!(stay.overlaps(date("2025-01-04"), date("2025-01-06")));
        assert!(stay.overlaps(date("2025-01-06"), date("2025-01-08")));
    }

    #[test]
    fn unpadded_days_are_accepted() {
        assert_eq!(parse_date("day", "2025-06-2").unwrap(), date("2025-06-02"));
    }

    #[test]
    fn owner_block_spans_one_day() {
        let block = NewRestriction::owner_block(3, date("2025-06-30")).unwrap();
        assert_eq!(block.range.start(), date("2025-06-30"));
        assert_eq!(block.range.end(), date("2025-07-01"));
        assert_eq!(block.reservation_id, 0);
        assert_eq!(block.kind, RestrictionKind::OwnerBlock);
    }

    #[test]
    fn restriction_kind_serializes_as_integer() {
        assert_eq!(serde_json::to_value(RestrictionKind::OwnerBlock).unwrap(), 2);
        let kind: RestrictionKind = serde_json::from_value(serde_json::json!(1)).unwrap();
        assert_eq!(kind, RestrictionKind::ReservationHeld);
        assert!(serde_json::from_value::<RestrictionKind>(serde_json::json!(7)).is_err());
    }
}
