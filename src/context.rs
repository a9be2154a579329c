//! Estado compartido de la aplicación, construido una vez en `main` y
//! repartido a los handlers como `web::Data<AppContext>`.

use std::sync::Arc;

use chrono::NaiveDate;

use crate::booking::{AvailabilityEngine, CredentialVerifier, IntervalStore, ReservationStore};
use crate::config::AppConfig;
use crate::notify::Mailer;
use crate::session::SessionStore;

/// Fuente del día actual (mes por defecto del calendario)
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// Reloj detenido en un día concreto
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub intervals: Arc<dyn IntervalStore>,
    pub reservations: Arc<dyn ReservationStore>,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub sessions: SessionStore,
    pub mailer: Mailer,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    /// Un único backend sirve los tres puertos de almacenamiento
    pub fn new<S>(config: AppConfig, store: Arc<S>, mailer: Mailer) -> Self
    where
        S: IntervalStore + ReservationStore + CredentialVerifier + 'static,
    {
        let sessions = SessionStore::new(config.session_ttl);
        Self {
            config,
            intervals: store.clone(),
            reservations: store.clone(),
            credentials: store,
            sessions,
            mailer,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn availability(&self) -> AvailabilityEngine {
        AvailabilityEngine::new(self.intervals.clone())
    }
}
