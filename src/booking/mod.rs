//! # Motor de disponibilidad y restricciones
//!
//! Núcleo del sistema de reservas:
//!
//! - [`store`] - Puertos de almacenamiento ([`IntervalStore`], [`ReservationStore`])
//! - [`memory`] - Implementación en memoria con fallos guionizados
//! - [`availability`] - ¿Está libre la habitación para `[start, end)`?
//! - [`calendar`] - Proyección mensual día a día por habitación
//! - [`reconcile`] - Diff del calendario editado contra el mapa en sesión
//! - [`reservations`] - Alta de reservas y validación del huésped

pub mod availability;
pub mod calendar;
pub mod credentials;
pub mod error;
pub mod memory;
pub mod model;
pub mod reconcile;
pub mod reservations;
pub mod store;

pub use availability::AvailabilityEngine;
pub use calendar::{BlockMapCache, DayMap, MonthWindow, RoomCalendar};
pub use error::{BookingError, BookingResult};
pub use model::*;
pub use reconcile::{BlockEditForm, ReconcileReport};
pub use reservations::{FormErrors, ReservationDraft};
pub use store::{CredentialVerifier, IntervalStore, ReservationStore};
