//! # Logging
//!
//! Inicialización de `tracing` y utilidades para registrar la cadena completa
//! de un error.

use std::error::Error as StdError;

/// Instala el subscriber `fmt` con filtro desde `RUST_LOG`
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "hotel_bookings=debug".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    let filter = match "mongodb=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Recorre `source()` y devuelve cada mensaje de la cadena
pub fn error_chain<E>(error: &E) -> Vec<String>
where
    E: StdError + 'static,
{
    let mut chain = Vec::new();
    let mut current: Option<&dyn StdError> = Some(error);

    while let Some(err) = current {
        chain.push(err.to_string());
        current = err.source();
    }
    chain
}

/// Registra la cadena completa de errores
///
/// # Ejemplo
/// ```rust
/// use hotel_bookings::telemetry::log_error_chain;
///
/// let err = std::io::Error::new(std::io::ErrorKind::Other, "disco lleno");
/// log_error_chain(&err, Some("guardando reserva"));
/// ```
pub fn log_error_chain<E>(error: &E, context: Option<&str>)
where
    E: StdError + 'static,
{
    let error_chain = error_chain(error);

    if let Some(ctx) = context {
        tracing::error!(
            context = %ctx,
            error_chain = ?error_chain,
            "Error with full chain (with context)"
        );
    } else {
        tracing::error!(error_chain = ?error_chain, "Error with full chain");
    }
}

/// Extension trait para Results que registra la cadena de error sin
/// consumirla
pub trait ErrorLogExt<T, E> {
    fn log_error_context(self, context: &str) -> Result<T, E>;
}

impl<T, E> ErrorLogExt<T, E> for Result<T, E>
where
    E: StdError + 'static,
{
    fn log_error_context(self, context: &str) -> Result<T, E> {
        if let Err(ref error) = self {
            log_error_chain(error, Some(context));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::BookingError;

    #[test]
    fn chain_includes_sources() {
        let err = BookingError::storage(
            "insert_restriction",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "socket cerrado"),
        );
        let chain = error_chain(&err);
        assert_eq!(chain.len(), 2);
        assert!(chain[0].contains("insert_restriction"));
        assert_eq!(chain[1], "socket cerrado");
    }

    #[test]
    fn log_ext_passes_results_through() {
        let ok: Result<i32, BookingError> = Ok(3);
        assert_eq!(ok.log_error_context("nada").unwrap(), 3);
        let err: Result<i32, BookingError> = Err(BookingError::InvalidCredentials);
        assert!(err.log_error_context("login").is_err());
    }
}
