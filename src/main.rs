//! # Hotel Bookings Server
//!
//! Servidor web de reservas de habitaciones construido con Rust, Actix Web y
//! MongoDB.
//!
//! ## Configuración
//!
//! El servidor se configura mediante variables de entorno (archivo `.env`):
//!
//! ```env
//! MONGODB_URI=mongodb://localhost:27017
//! MONGODB_DATABASE=hotel_bookings
//! BIND_ADDRESS=0.0.0.0:8080
//! STORAGE_BACKEND=mongodb        # o memory
//! STORAGE_TIMEOUT_SECS=3
//! SESSION_TTL_SECS=86400
//! ADMIN_EMAIL=admin@admin.com
//! ADMIN_PASSWORD=password
//! RUST_LOG=debug,mongodb=info
//! ```
//!
//! ## Arquitectura
//!
//! ```text
//! Cliente (HTML/JS)
//!     ↓ HTTP (formularios / JSON)
//! Actix Web (api) + sesiones
//!     ↓ IntervalStore / ReservationStore
//! MongoDB | memoria
//! ```

use std::sync::Arc;
use std::time::Duration;

use actix_files::Files;
use actix_web::middleware::{from_fn, Logger};
use actix_web::{web, App, HttpServer};

use hotel_bookings::booking::memory::{MemoryStore, DEMO_ROOMS};
use hotel_bookings::config::{AppConfig, StorageBackend};
use hotel_bookings::context::AppContext;
use hotel_bookings::db::MongoRepo;
use hotel_bookings::notify::{listen_for_mail, Mailer};
use hotel_bookings::session::run_purge;
use hotel_bookings::{api, telemetry};

const SESSION_PURGE_EVERY: Duration = Duration::from_secs(60);

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Conecta el backend elegido, lo prepara y construye el contexto
async fn build_context(config: AppConfig, mailer: Mailer) -> std::io::Result<AppContext> {
    match config.storage_backend {
        StorageBackend::MongoDb => {
            let repo = MongoRepo::init(&config).await.map_err(|e| {
                tracing::error!("Error conectando a MongoDB: {}", e);
                io_error(format!("Error de MongoDB: {}", e))
            })?;

            // No es un error fatal, continuamos sin índices
            if let Err(e) = repo.create_indexes().await {
                tracing::warn!("Advertencia creando índices: {}", e);
            }
            if let Err(e) = repo.seed_rooms(&DEMO_ROOMS).await {
                tracing::warn!("Advertencia creando habitaciones: {}", e);
            }
            if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
                if let Err(e) = repo.ensure_admin(email, password).await {
                    tracing::warn!("Advertencia creando administrador: {}", e);
                }
            }

            Ok(AppContext::new(config, Arc::new(repo), mailer))
        }
        StorageBackend::Memory => {
            tracing::warn!("Usando almacenamiento en memoria; los datos no sobreviven al reinicio");
            let store = MemoryStore::demo(config.storage_timeout);
            if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
                store.add_user(email, password).await;
            }
            Ok(AppContext::new(config, Arc::new(store), mailer))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    tracing::info!("Iniciando Hotel Bookings Server...");

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Configuración inválida: {}", e);
        io_error(e.to_string())
    })?;

    let (mailer, mail_rx) = Mailer::channel(&config.mail_from, &config.owner_email);
    tokio::spawn(listen_for_mail(mail_rx));

    let ctx = build_context(config, mailer).await?;
    tokio::spawn(run_purge(ctx.sessions.clone(), SESSION_PURGE_EVERY));

    let bind_address = ctx.config.bind_address.clone();
    let static_dir = ctx.config.static_dir.clone();
    let data = web::Data::new(ctx);

    tracing::info!("Servidor iniciando en {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(from_fn(api::middleware::attach_session))
            .wrap(Logger::default())
            .configure(api::init_routes)
            .service(Files::new("/static", &static_dir))
            .route(
                "/",
                web::get().to(|| async {
                    actix_web::HttpResponse::SeeOther()
                        .append_header(("Location", "/static/index.html"))
                        .finish()
                }),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
