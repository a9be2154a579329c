//! # Sesiones
//!
//! Almacén de sesiones en memoria indexado por un id aleatorio que viaja en
//! la cookie `session_id`. Cada sesión guarda valores JSON por clave y
//! caduca tras `SESSION_TTL_SECS` sin actividad.

use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::booking::calendar::block_map_key;
use crate::booking::{BlockMapCache, BookingError, BookingResult, DayMap, RoomId};
use crate::context::AppContext;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug)]
struct SessionEntry {
    values: HashMap<String, Value>,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    entries: Arc<DashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Abre una sesión vacía y devuelve su id
    pub fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.entries.insert(
            id.clone(),
            SessionEntry {
                values: HashMap::new(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        id
    }

    /// Pasa los valores de `old` a un id nuevo y descarta el anterior.
    /// Si `old` ya no existe o caducó, la sesión nueva empieza vacía.
    pub fn renew(&self, old: &str) -> String {
        let now = Instant::now();
        let values = self
            .entries
            .remove(old)
            .filter(|(_, entry)| entry.expires_at > now)
            .map(|(_, entry)| entry.values)
            .unwrap_or_default();

        let id = uuid::Uuid::new_v4().to_string();
        self.entries.insert(
            id.clone(),
            SessionEntry {
                values,
                expires_at: now + self.ttl,
            },
        );
        id
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.entries
            .get(id)
            .map(|entry| entry.expires_at > Instant::now())
            .unwrap_or(false)
    }

    pub fn handle(&self, id: &str) -> Session {
        Session {
            id: id.to_string(),
            store: self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Elimina las sesiones caducadas y devuelve cuántas se borraron
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn with_entry<R>(&self, id: &str, f: impl FnOnce(&mut SessionEntry) -> R) -> Option<R> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(id)?;
        if entry.expires_at <= now {
            return None;
        }
        entry.expires_at = now + self.ttl;
        Some(f(entry.value_mut()))
    }
}

/// Tarea de fondo que purga sesiones caducadas cada `every`
pub async fn run_purge(sessions: SessionStore, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let purged = sessions.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, remaining = sessions.len(), "Expired sessions purged");
        }
    }
}

/// Acceso a los valores de una sesión concreta
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    store: SessionStore,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.store.with_entry(&self.id, |entry| {
                    entry.values.insert(key.to_string(), value);
                });
            }
            Err(e) => tracing::error!(key = %key, error = %e, "Could not serialize session value"),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self
            .store
            .with_entry(&self.id, |entry| entry.values.get(key).cloned())??;
        Self::decode(key, value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store
            .with_entry(&self.id, |entry| entry.values.contains_key(key))
            .unwrap_or(false)
    }

    pub fn remove(&self, key: &str) {
        self.store.with_entry(&self.id, |entry| {
            entry.values.remove(key);
        });
    }

    /// Lee y borra en un paso
    pub fn take<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self
            .store
            .with_entry(&self.id, |entry| entry.values.remove(key))??;
        Self::decode(key, value)
    }

    /// Vacía la sesión
    pub fn clear(&self) {
        self.store.with_entry(&self.id, |entry| entry.values.clear());
    }

    /// Cambia el id de la sesión conservando sus valores. El id antiguo deja
    /// de ser válido; la cookie nueva la pone [`crate::api::renewed`].
    pub fn renew(&self) -> Session {
        self.store.handle(&self.store.renew(&self.id))
    }

    /// Mensaje de un solo uso: `flash`, `error`, `warning` o `success`
    pub fn flash(&self, kind: &str, message: &str) {
        self.put(kind, &message);
    }

    pub fn pop_string(&self, key: &str) -> Option<String> {
        self.take(key)
    }

    fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Session value has unexpected shape");
                None
            }
        }
    }
}

impl BlockMapCache for Session {
    fn store_block_map(&self, room_id: RoomId, map: &DayMap) {
        self.put(&block_map_key(room_id), map);
    }

    fn take_block_map(&self, room_id: RoomId) -> BookingResult<DayMap> {
        self.take(&block_map_key(room_id))
            .ok_or(BookingError::MissingCacheState(room_id))
    }
}

/// Id de la sesión de la petición, que deja el middleware en las extensiones
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Marca en la respuesta el id que debe viajar en la cookie tras renovar
#[derive(Debug, Clone)]
pub struct RenewedSession(pub String);

impl FromRequest for Session {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let ctx = req.app_data::<web::Data<AppContext>>();
        let id = req.extensions().get::<SessionId>().cloned();

        let result = match (ctx, id) {
            (Some(ctx), Some(SessionId(id))) => Ok(ctx.sessions.handle(&id)),
            _ => {
                tracing::error!("Session middleware not installed");
                Err(actix_web::error::ErrorInternalServerError("Sesión no disponible"))
            }
        };
        ready(result)
    }
}
