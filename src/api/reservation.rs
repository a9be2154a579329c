//! # API de Reservas
//!
//! Formulario de datos del huésped sobre el borrador en sesión, alta de la
//! reserva y página de resumen.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::availability::DRAFT_KEY;
use super::{fail_to, page, see_other};
use crate::booking::reservations::book;
use crate::booking::{
    format_date, FormErrors, GuestDetails, NewReservation, Reservation, ReservationDraft,
};
use crate::context::AppContext;
use crate::session::Session;
use crate::telemetry::ErrorLogExt;

/// Clave de sesión de la reserva recién creada, hasta que se ve el resumen
pub const SUMMARY_KEY: &str = "reservation_summary";

/// Datos del huésped enviados por el formulario
#[derive(Debug, Deserialize)]
pub struct GuestForm {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
}

impl From<GuestForm> for GuestDetails {
    fn from(form: GuestForm) -> Self {
        GuestDetails {
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            email: form.email.trim().to_string(),
            phone: form.phone.trim().to_string(),
        }
    }
}

fn form_page(session: &Session, draft: &ReservationDraft, guest: &GuestDetails, errors: &FormErrors) -> HttpResponse {
    page(
        session,
        "make-reservation.page.tmpl",
        json!({
            "reservation": draft,
            "guest": guest,
            "start_date": format_date(draft.range.start()),
            "end_date": format_date(draft.range.end()),
            "form_errors": errors,
        }),
    )
}

/// Muestra el formulario; completa el nombre de la habitación si falta
#[get("/make-reservation")]
async fn show_form(ctx: web::Data<AppContext>, session: Session) -> HttpResponse {
    let Some(mut draft) = session.get::<ReservationDraft>(DRAFT_KEY) else {
        return fail_to(&session, "/", "No se encontró la reserva en la sesión");
    };
    let Some(room_id) = draft.room_id else {
        return fail_to(&session, "/", "No se ha elegido habitación");
    };

    if draft.room_name.is_none() {
        match ctx
            .intervals
            .room_by_id(room_id)
            .await
            .log_error_context("loading room for reservation form")
        {
            Ok(room) => draft.room_name = Some(room.room_name),
            Err(_) => return fail_to(&session, "/", "No se encontró la habitación"),
        }
        session.put(DRAFT_KEY, &draft);
    }

    form_page(&session, &draft, &GuestDetails::default(), &FormErrors::default())
}

/// Valida, reserva y redirige al resumen
#[post("/make-reservation")]
async fn submit_form(
    ctx: web::Data<AppContext>,
    session: Session,
    form: web::Form<GuestForm>,
) -> HttpResponse {
    let Some(draft) = session.get::<ReservationDraft>(DRAFT_KEY) else {
        return fail_to(&session, "/", "No se encontró la reserva en la sesión");
    };
    let Some(room_id) = draft.room_id else {
        return fail_to(&session, "/", "No se ha elegido habitación");
    };

    let guest = GuestDetails::from(form.into_inner());
    if let Err(errors) = guest.validate() {
        tracing::debug!(errors = ?errors, "Reservation form rejected");
        return form_page(&session, &draft, &guest, &errors);
    }

    let room_name = draft.room_name.clone().unwrap_or_default();
    let request = NewReservation {
        guest,
        room_id,
        range: draft.range,
    };

    match book(
        ctx.intervals.as_ref(),
        ctx.reservations.as_ref(),
        &ctx.mailer,
        request,
        &room_name,
    )
    .await
    {
        Ok(reservation) => {
            session.remove(DRAFT_KEY);
            session.put(SUMMARY_KEY, &reservation);
            session.flash("success", "Reserva enviada");
            see_other("/reservation-summary")
        }
        Err(_) => fail_to(&session, "/", "No se pudo guardar la reserva"),
    }
}

/// Muestra la reserva creada una sola vez
#[get("/reservation-summary")]
async fn summary(session: Session) -> HttpResponse {
    let Some(reservation) = session.take::<Reservation>(SUMMARY_KEY) else {
        tracing::warn!("Reservation summary requested without reservation in session");
        return fail_to(&session, "/", "No se encontró la reserva en la sesión");
    };

    page(
        &session,
        "reservation-summary.page.tmpl",
        json!({
            "reservation": reservation,
            "start_date": format_date(reservation.start_date),
            "end_date": format_date(reservation.end_date),
        }),
    )
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(show_form);
    cfg.service(submit_form);
    cfg.service(summary);
}
