//! # Notificaciones por correo
//!
//! Los mensajes se encolan en un canal y un listener en segundo plano los
//! despacha. El envío SMTP queda fuera; el listener solo deja constancia en
//! el log. Quien encola nunca espera ni conoce el resultado.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::booking::model::{format_date, Reservation};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailData {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub content: String,
    pub template: String,
}

#[derive(Debug, Clone)]
pub struct Mailer {
    tx: mpsc::Sender<MailData>,
    from: String,
    owner: String,
}

impl Mailer {
    pub fn channel(from: &str, owner: &str) -> (Self, mpsc::Receiver<MailData>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                tx,
                from: from.to_string(),
                owner: owner.to_string(),
            },
            rx,
        )
    }

    /// Fire-and-forget. Un canal lleno o cerrado solo se registra.
    pub fn send(&self, msg: MailData) {
        if let Err(e) = self.tx.try_send(msg) {
            tracing::warn!(error = %e, "Mail message dropped");
        }
    }

    /// Confirmación al huésped y aviso al propietario
    pub fn reservation_confirmed(&self, reservation: &Reservation, room_name: &str) {
        let start = format_date(reservation.start_date);
        let end = format_date(reservation.end_date);

        self.send(MailData {
            to: reservation.email.clone(),
            from: self.from.clone(),
            subject: "Confirmación de reserva".to_string(),
            content: format!(
                "<strong>Confirmación de reserva</strong><br>\
                 Estimado/a {}:<br>\
                 Confirmamos su reserva del {} al {}.",
                reservation.first_name, start, end
            ),
            template: "basic.html".to_string(),
        });

        self.send(MailData {
            to: self.owner.clone(),
            from: self.from.clone(),
            subject: "Aviso de reserva".to_string(),
            content: format!(
                "<strong>Aviso de reserva</strong><br>\
                 Se ha reservado {} del {} al {}.",
                room_name, start, end
            ),
            template: "basic.html".to_string(),
        });
    }
}

/// Listener que consume la cola hasta que se cierran todos los emisores
pub async fn listen_for_mail(mut rx: mpsc::Receiver<MailData>) {
    while let Some(msg) = rx.recv().await {
        tracing::info!(
            to = %msg.to,
            from = %msg.from,
            subject = %msg.subject,
            template = %msg.template,
            "Mail dispatched"
        );
    }
    tracing::info!("Mail listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn confirmation_sends_guest_and_owner_mail() {
        let (mailer, mut rx) = Mailer::channel("me@here.com", "me@there.com");
        let reservation = Reservation {
            id: 1,
            first_name: "John".into(),
            last_name: "Smith".into(),
            email: "john@smith.com".into(),
            phone: String::new(),
            room_id: 1,
            start_date: NaiveDate::from_ymd_opt(2050, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2050, 1, 2).unwrap(),
            processed: false,
            created_at: 0,
            updated_at: 0,
            room: None,
        };

        mailer.reservation_confirmed(&reservation, "General's Quarters");

        let guest = rx.recv().await.unwrap();
        assert_eq!(guest.to, "john@smith.com");
        assert!(guest.content.contains("2050-01-01"));
        let owner = rx.recv().await.unwrap();
        assert_eq!(owner.to, "me@there.com");
        assert!(owner.content.contains("General's Quarters"));
    }

    #[tokio::test]
    async fn send_without_listener_is_noop() {
        let (mailer, rx) = Mailer::channel("a@b.c", "d@e.f");
        drop(rx);
        // No debe entrar en pánico
        mailer.send(MailData {
            to: "x@y.z".into(),
            from: "a@b.c".into(),
            subject: "s".into(),
            content: "c".into(),
            template: "basic.html".into(),
        });
    }
}
