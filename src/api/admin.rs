//! # Consola de administración
//!
//! Listados de reservas, ficha editable, marcado como procesada, borrado y
//! calendario mensual de bloqueos. Todo bajo `/admin` y con sesión iniciada.
//!
//! El calendario es un intercambio en dos pasos: el GET proyecta el mes y
//! deja el `block_map` de cada habitación en la sesión; el POST lo recoge y
//! concilia contra las casillas enviadas.

use actix_web::middleware::from_fn;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::middleware::require_login;
use super::{fail_to, page, see_other, AppResult};
use crate::booking::calendar::project_month;
use crate::booking::reconcile::reconcile;
use crate::booking::{BlockEditForm, GuestDetails, MonthWindow, ReservationId};
use crate::context::AppContext;
use crate::session::Session;
use crate::telemetry::ErrorLogExt;

/// Mes y año opcionales (`?y=YYYY&m=MM`) para volver al calendario
#[derive(Debug, Default, Deserialize)]
pub struct MonthQuery {
    y: Option<String>,
    m: Option<String>,
}

impl MonthQuery {
    fn window(&self) -> Option<(String, String)> {
        match (&self.y, &self.m) {
            (Some(y), Some(m)) if !y.trim().is_empty() => Some((y.trim().to_string(), m.trim().to_string())),
            _ => None,
        }
    }
}

/// Edición de la ficha de reserva
#[derive(Debug, Deserialize)]
pub struct ReservationEditForm {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    year: Option<String>,
    month: Option<String>,
}

/// Solo se aceptan los listados conocidos como origen
fn list_source(src: &str) -> &str {
    match src {
        "new" => "new",
        "cal" => "cal",
        _ => "all",
    }
}

/// Id de reserva de la ruta; si no es numérico se vuelve al listado
fn parse_id(session: &Session, src: &str, raw: &str) -> Result<ReservationId, HttpResponse> {
    raw.trim().parse().map_err(|_| {
        tracing::debug!(id = %raw, "Rejected reservation id");
        fail_to(
            session,
            &format!("/admin/reservations-{}", list_source(src)),
            "Reserva no válida",
        )
    })
}

/// Vuelve al calendario si la acción vino de él, o al listado de origen
fn back_to(src: &str, month: &MonthQuery) -> HttpResponse {
    match month.window() {
        Some((y, m)) => see_other(&format!("/admin/reservations-calendar?y={}&m={}", y, m)),
        None => see_other(&format!("/admin/reservations-{}", list_source(src))),
    }
}

#[get("/dashboard")]
async fn dashboard(session: Session) -> HttpResponse {
    page(&session, "admin-dashboard.page.tmpl", json!({}))
}

#[get("/reservations-new")]
async fn new_reservations(ctx: web::Data<AppContext>, session: Session) -> AppResult<HttpResponse> {
    let reservations = ctx
        .reservations
        .new_reservations()
        .await
        .log_error_context("listing new reservations")?;
    Ok(page(
        &session,
        "admin-new-reservations.page.tmpl",
        json!({ "reservations": reservations }),
    ))
}

#[get("/reservations-all")]
async fn all_reservations(ctx: web::Data<AppContext>, session: Session) -> AppResult<HttpResponse> {
    let reservations = ctx
        .reservations
        .all_reservations()
        .await
        .log_error_context("listing reservations")?;
    Ok(page(
        &session,
        "admin-all-reservations.page.tmpl",
        json!({ "reservations": reservations }),
    ))
}

#[get("/reservations/{src}/{id}")]
async fn show_reservation(
    ctx: web::Data<AppContext>,
    session: Session,
    path: web::Path<(String, String)>,
    query: web::Query<MonthQuery>,
) -> AppResult<HttpResponse> {
    let (src, raw_id) = path.into_inner();
    let id = match parse_id(&session, &src, &raw_id) {
        Ok(id) => id,
        Err(redirect) => return Ok(redirect),
    };
    let reservation = ctx.reservations.reservation_by_id(id).await?;

    Ok(page(
        &session,
        "admin-reservations-show.page.tmpl",
        json!({
            "reservation": reservation,
            "src": list_source(&src),
            "year": query.y,
            "month": query.m,
        }),
    ))
}

#[post("/reservations/{src}/{id}")]
async fn update_reservation(
    ctx: web::Data<AppContext>,
    session: Session,
    path: web::Path<(String, String)>,
    form: web::Form<ReservationEditForm>,
) -> AppResult<HttpResponse> {
    let (src, raw_id) = path.into_inner();
    let id = match parse_id(&session, &src, &raw_id) {
        Ok(id) => id,
        Err(redirect) => return Ok(redirect),
    };
    let form = form.into_inner();

    let guest = GuestDetails {
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
    };
    if let Err(errors) = guest.validate() {
        tracing::debug!(reservation_id = id, ?errors, "Rejected guest edit");
        return Ok(fail_to(
            &session,
            &format!("/admin/reservations/{}/{}", list_source(&src), id),
            "Revisa los datos del huésped",
        ));
    }
    ctx.reservations
        .update_guest(id, &guest)
        .await
        .log_error_context("updating reservation")?;

    tracing::info!(reservation_id = id, "Reservation updated");
    session.flash("success", "Cambios guardados");
    Ok(back_to(
        &src,
        &MonthQuery {
            y: form.year,
            m: form.month,
        },
    ))
}

#[get("/process-reservation/{src}/{id}/do")]
async fn process_reservation(
    ctx: web::Data<AppContext>,
    session: Session,
    path: web::Path<(String, String)>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    let (src, raw_id) = path.into_inner();
    let id = match parse_id(&session, &src, &raw_id) {
        Ok(id) => id,
        Err(redirect) => return redirect,
    };
    match ctx
        .reservations
        .set_processed(id, true)
        .await
        .log_error_context("marking reservation processed")
    {
        Ok(()) => session.flash("success", "Reserva marcada como procesada"),
        Err(_) => session.flash("error", "No se pudo marcar la reserva"),
    }
    back_to(&src, &query)
}

#[get("/delete-reservation/{src}/{id}/do")]
async fn delete_reservation(
    ctx: web::Data<AppContext>,
    session: Session,
    path: web::Path<(String, String)>,
    query: web::Query<MonthQuery>,
) -> HttpResponse {
    let (src, raw_id) = path.into_inner();
    let id = match parse_id(&session, &src, &raw_id) {
        Ok(id) => id,
        Err(redirect) => return redirect,
    };
    match ctx
        .reservations
        .delete_reservation(id)
        .await
        .log_error_context("deleting reservation")
    {
        Ok(()) => {
            tracing::info!(reservation_id = id, "Reservation deleted");
            session.flash("success", "Reserva eliminada");
        }
        Err(_) => session.flash("error", "No se pudo eliminar la reserva"),
    }
    back_to(&src, &query)
}

/// Proyecta el mes pedido (o el actual) y cachea los mapas de bloqueos
#[get("/reservations-calendar")]
async fn show_calendar(
    ctx: web::Data<AppContext>,
    session: Session,
    query: web::Query<MonthQuery>,
) -> AppResult<HttpResponse> {
    let window = match query.window() {
        Some((y, m)) => MonthWindow::parse(&y, &m)?,
        None => MonthWindow::containing(ctx.clock.today()),
    };

    let calendars = match project_month(ctx.intervals.as_ref(), &session, &window)
        .await
        .log_error_context("projecting calendar")
    {
        Ok(calendars) => calendars,
        Err(e) if e.is_storage() => {
            return Ok(fail_to(&session, "/admin/dashboard", "No se pudo cargar el calendario"))
        }
        Err(e) => return Err(e.into()),
    };

    let next = window.next();
    let last = window.previous();
    Ok(page(
        &session,
        "admin-reservations-calendar.page.tmpl",
        json!({
            "this_month": format!("{:02}", window.month()),
            "this_month_year": window.year().to_string(),
            "next_month": format!("{:02}", next.month()),
            "next_month_year": next.year().to_string(),
            "last_month": format!("{:02}", last.month()),
            "last_month_year": last.year().to_string(),
            "days_in_month": window.days_in_month(),
            "rooms": calendars,
        }),
    ))
}

/// Concilia las casillas del calendario con los bloqueos en sesión
#[post("/reservations-calendar")]
async fn save_calendar(
    ctx: web::Data<AppContext>,
    session: Session,
    form: web::Form<Vec<(String, String)>>,
) -> AppResult<HttpResponse> {
    let fields = form.into_inner();
    let field = |name: &str| {
        fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    let month = MonthQuery {
        y: field("y"),
        m: field("m"),
    };
    let window = month
        .window()
        .and_then(|(y, m)| MonthWindow::parse(&y, &m).ok())
        .unwrap_or_else(|| MonthWindow::containing(ctx.clock.today()));

    let edit = BlockEditForm::from_fields(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let rooms = ctx
        .intervals
        .all_rooms()
        .await
        .log_error_context("loading rooms for calendar")?;
    let report = reconcile(ctx.intervals.as_ref(), &session, &rooms, &edit).await;

    if !report.is_clean() {
        session.flash("error", "Algunos cambios no se pudieron guardar");
    } else if !report.missing_cache.is_empty() {
        session.flash("warning", "El calendario había caducado; solo se añadieron bloqueos nuevos");
    } else {
        session.flash("success", "Cambios guardados");
    }

    Ok(see_other(&format!(
        "/admin/reservations-calendar?y={}&m={:02}",
        window.year(),
        window.month()
    )))
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(from_fn(require_login))
            .service(dashboard)
            .service(new_reservations)
            .service(all_reservations)
            .service(show_reservation)
            .service(update_reservation)
            .service(process_reservation)
            .service(delete_reservation)
            .service(show_calendar)
            .service(save_calendar),
    );
}
