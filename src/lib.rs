//! # Hotel Bookings
//!
//! Reservas de habitaciones con búsqueda de disponibilidad, formulario de
//! reserva y consola de administración con calendario mensual de bloqueos.
//!
//! - [`booking`] - Motor de disponibilidad, calendario y conciliación
//! - [`db`] - Backend MongoDB de los puertos de almacenamiento
//! - [`api`] - Rutas HTTP (Actix Web)
//! - [`session`] - Sesiones en memoria con cookie
//! - [`notify`] - Cola de correos
//! - [`config`] - Configuración desde entorno

pub mod api;
pub mod booking;
pub mod config;
pub mod context;
pub mod db;
pub mod notify;
pub mod session;
pub mod telemetry;
