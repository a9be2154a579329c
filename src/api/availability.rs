//! # API de Disponibilidad
//!
//! Búsqueda de habitaciones libres para un rango de fechas y selección de la
//! habitación que pasará al formulario de reserva.
//!
//! El borrador de reserva ([`ReservationDraft`]) vive en la sesión bajo la
//! clave `reservation` entre estos pasos.

use actix_web::{get, post, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{fail_to, page, see_other};
use crate::booking::{ReservationDraft, RoomId, StayRange};
use crate::context::AppContext;
use crate::session::Session;
use crate::telemetry::{log_error_chain, ErrorLogExt};

pub const DRAFT_KEY: &str = "reservation";

/// Formulario de búsqueda (`YYYY-MM-DD`)
#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

/// Formulario de la consulta puntual por habitación
#[derive(Debug, Deserialize)]
pub struct RoomSearchForm {
    start: Option<String>,
    end: Option<String>,
    room_id: Option<String>,
}

/// Respuesta de `/search-availability-json`. Los nombres de campo son fijos.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityJson {
    pub ok: bool,
    pub message: String,
    pub room_id: String,
    pub start_date: String,
    pub end_date: String,
}

impl AvailabilityJson {
    fn failure(message: &str) -> Self {
        Self {
            ok: false,
            message: message.to_string(),
            room_id: String::new(),
            start_date: String::new(),
            end_date: String::new(),
        }
    }
}

/// Parámetros de `/book-room?id=&s=&e=`
#[derive(Debug, Deserialize)]
pub struct BookRoomQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    s: String,
    #[serde(default)]
    e: String,
}

#[get("/search-availability")]
async fn search_page(session: Session) -> impl Responder {
    page(&session, "search-availability.page.tmpl", json!({}))
}

/// Busca todas las habitaciones libres y guarda el borrador en sesión
#[post("/search-availability")]
async fn search_availability(
    ctx: web::Data<AppContext>,
    session: Session,
    form: web::Form<SearchForm>,
) -> HttpResponse {
    let range = match StayRange::parse(&form.start, &form.end) {
        Ok(range) => range,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected availability search");
            return fail_to(&session, "/", "Fechas de búsqueda inválidas");
        }
    };

    let rooms = match ctx
        .availability()
        .available_rooms(&range)
        .await
        .log_error_context("searching availability")
    {
        Ok(rooms) => rooms,
        Err(_) => return fail_to(&session, "/", "No se pudo consultar la disponibilidad"),
    };

    if rooms.is_empty() {
        tracing::info!(start = %range.start(), end = %range.end(), "No availability");
        return fail_to(&session, "/search-availability", "No hay disponibilidad");
    }

    session.put(DRAFT_KEY, &ReservationDraft::new(range));
    page(&session, "choose-room.page.tmpl", json!({ "rooms": rooms }))
}

/// Consulta de una habitación concreta desde la ficha de la habitación
#[post("/search-availability-json")]
async fn search_availability_json(
    ctx: web::Data<AppContext>,
    form: web::Form<RoomSearchForm>,
) -> HttpResponse {
    let form = form.into_inner();
    let (Some(start), Some(end), Some(room_id)) = (form.start, form.end, form.room_id) else {
        return HttpResponse::Ok().json(AvailabilityJson::failure("Internal server error"));
    };

    let Ok(room) = room_id.trim().parse::<RoomId>() else {
        return HttpResponse::Ok().json(AvailabilityJson::failure("Internal server error"));
    };

    let range = match StayRange::parse(&start, &end) {
        Ok(range) => range,
        Err(e) => return HttpResponse::Ok().json(AvailabilityJson::failure(&e.to_string())),
    };

    match ctx.availability().is_room_available(room, &range).await {
        Ok(available) => HttpResponse::Ok().json(AvailabilityJson {
            ok: available,
            message: String::new(),
            room_id: room.to_string(),
            start_date: start,
            end_date: end,
        }),
        Err(e) if e.is_storage() => {
            log_error_chain(&e, Some("json availability"));
            HttpResponse::Ok().json(AvailabilityJson::failure("Error connecting to database"))
        }
        Err(e) => HttpResponse::Ok().json(AvailabilityJson::failure(&e.to_string())),
    }
}

/// Fija la habitación elegida en el borrador
#[get("/choose-room/{id}")]
async fn choose_room(session: Session, path: web::Path<String>) -> HttpResponse {
    let Ok(room_id) = path.trim().parse::<RoomId>() else {
        return fail_to(&session, "/", "Falta el parámetro de habitación");
    };

    let Some(mut draft) = session.get::<ReservationDraft>(DRAFT_KEY) else {
        return fail_to(&session, "/", "No se encontró la reserva en la sesión");
    };

    draft.room_id = Some(room_id);
    draft.room_name = None;
    session.put(DRAFT_KEY, &draft);
    see_other("/make-reservation")
}

/// Reserva directa desde la ficha de una habitación
#[get("/book-room")]
async fn book_room(
    ctx: web::Data<AppContext>,
    session: Session,
    query: web::Query<BookRoomQuery>,
) -> HttpResponse {
    let Ok(room_id) = query.id.trim().parse::<RoomId>() else {
        return fail_to(&session, "/", "Falta el parámetro de habitación");
    };

    let range = match StayRange::parse(&query.s, &query.e) {
        Ok(range) => range,
        Err(_) => return fail_to(&session, "/", "Fechas inválidas"),
    };

    let room = match ctx
        .intervals
        .room_by_id(room_id)
        .await
        .log_error_context("loading room for booking")
    {
        Ok(room) => room,
        Err(_) => return fail_to(&session, "/", "No se encontró la habitación"),
    };

    let draft = ReservationDraft {
        range,
        room_id: Some(room.id),
        room_name: Some(room.room_name),
    };
    session.put(DRAFT_KEY, &draft);
    see_other("/make-reservation")
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(search_page);
    cfg.service(search_availability);
    cfg.service(search_availability_json);
    cfg.service(choose_room);
    cfg.service(book_room);
}
