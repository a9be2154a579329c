//! # Login del personal
//!
//! El id del usuario autenticado se guarda en la sesión bajo `user_id`;
//! [`require_login`](super::middleware::require_login) lo exige en `/admin`.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::{fail_to, page, renewed, see_other};
use crate::booking::reservations::validate_email;
use crate::booking::{BookingError, FormErrors};
use crate::context::AppContext;
use crate::session::Session;
use crate::telemetry::log_error_chain;

pub const USER_KEY: &str = "user_id";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl LoginForm {
    fn validate(&self) -> Result<(), FormErrors> {
        let mut errors = FormErrors::default();
        if self.email.trim().is_empty() {
            errors.add("email", "Este campo es obligatorio");
        } else if !validate_email(self.email.trim()) {
            errors.add("email", "Email inválido");
        }
        if self.password.is_empty() {
            errors.add("password", "Este campo es obligatorio");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[get("/user/login")]
async fn show_login(session: Session) -> HttpResponse {
    page(&session, "login.page.tmpl", json!({ "form_errors": FormErrors::default() }))
}

#[post("/user/login")]
async fn login(
    ctx: web::Data<AppContext>,
    session: Session,
    form: web::Form<LoginForm>,
) -> HttpResponse {
    if let Err(errors) = form.validate() {
        return page(&session, "login.page.tmpl", json!({ "form_errors": errors }));
    }

    match ctx.credentials.authenticate(form.email.trim(), &form.password).await {
        Ok(user_id) => {
            tracing::info!(user_id, "User logged in");
            let session = session.renew();
            session.put(USER_KEY, &user_id);
            session.flash("success", "Sesión iniciada correctamente");
            renewed(see_other("/"), &session)
        }
        Err(BookingError::InvalidCredentials) => {
            tracing::info!(email = %form.email.trim(), "Login rejected");
            fail_to(&session, "/user/login", "Credenciales incorrectas")
        }
        Err(e) => {
            log_error_chain(&e, Some("authenticating user"));
            fail_to(&session, "/user/login", "No se pudo iniciar sesión")
        }
    }
}

#[get("/user/logout")]
async fn logout(session: Session) -> HttpResponse {
    session.clear();
    let session = session.renew();
    renewed(see_other("/user/login"), &session)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(show_login);
    cfg.service(login);
    cfg.service(logout);
}
