//! Owner notifications.
//!
//! Delivery is best-effort: the worker logs a [`NotifyError`] and moves on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::info;
use trackeame_types::{Carrier, Shipment, Status, User};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const SENDER_NAME: &str = "Ticiano de Trackeame";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("email transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("email provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Everything a message about one shipment needs.
#[derive(Debug, Clone)]
pub struct Notification {
    pub user: User,
    pub shipment: Shipment,
    pub carrier: Carrier,
}

#[async_trait]
pub trait Notifier: Send + Sync + fmt::Debug {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(
            user_id = %n.user.id,
            shipment_id = %n.shipment.id,
            carrier = %n.carrier.slug,
            status = ?n.shipment.last_status,
            "shipment update (email delivery disabled)"
        );
        Ok(())
    }
}

pub fn status_label(status: Option<Status>) -> &'static str {
    match status {
        Some(Status::Delivered) => "Entregado",
        Some(Status::InTransit) => "En tránsito",
        Some(Status::Pending) => "Pendiente",
        Some(Status::Failed) => "Fallido",
        Some(Status::Cancelled) => "Cancelado",
        None => "Desconocido",
    }
}

/// Rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Compose the "news about your parcel" email.
pub fn compose(n: &Notification, frontend_url: &str) -> Email {
    let carrier = &n.carrier.name;
    let code = &n.shipment.tracking_code;
    let status = status_label(n.shipment.last_status);
    let link = format!("{}/packages/{}", frontend_url.trim_end_matches('/'), n.shipment.id);

    Email {
        subject: format!("¡Tenés novedades en tu paquete! [{carrier} {code}]"),
        html: format!(
            "<html><body style=\"font-family:Arial,sans-serif;\">\
             <h1>¡Tenés novedades en tu paquete!</h1>\
             <p>Hola, tenés novedades en tu paquete de <strong>{carrier}</strong> con el código de seguimiento <strong>{code}</strong>.</p>\
             <p>El estado actual de tu paquete es: <strong>{status}</strong>.</p>\
             <p>Podés ver los detalles de tu paquete en el siguiente enlace:</p>\
             <p><a href=\"{link}\">Ver paquete</a></p>\
             <p>¡Saludos!<br>El equipo de Trackeame</p>\
             </body></html>"
        ),
        text: format!(
            "¡Hola! Tenés novedades en tu paquete de {carrier} con el código de seguimiento {code}.\n\n\
             El estado actual de tu paquete es: {status}.\n\n\
             Podés ver los detalles de tu paquete en el siguiente enlace:\n\
             {link}\n\n\
             ¡Saludos!\n\
             El equipo de Trackeame"
        ),
    }
}

/// Sends email through the Resend HTTP API.
#[derive(Clone)]
pub struct ResendNotifier {
    client: Client,
    endpoint: String,
    api_key: String,
    from: String,
    frontend_url: String,
}

impl fmt::Debug for ResendNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendNotifier")
            .field("endpoint", &self.endpoint)
            .field("from", &self.from)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}

impl ResendNotifier {
    /// Fails only when the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        from: impl Into<String>,
        frontend_url: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            endpoint: RESEND_ENDPOINT.to_owned(),
            api_key: api_key.into(),
            from: from.into(),
            frontend_url: frontend_url.into(),
        })
    }

    /// Point at a different API base, e.g. a local mock.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn message(&self, n: &Notification) -> serde_json::Value {
        let email = compose(n, &self.frontend_url);
        json!({
            "from": format!("{SENDER_NAME} <{}>", self.from),
            "to": [n.user.email],
            "subject": email.subject,
            "html": email.html,
            "text": email.text,
        })
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.message(n))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!(shipment_id = %n.shipment.id, to = %n.user.email, "notification email sent");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn notification() -> Notification {
        let now = Utc::now();
        Notification {
            user: User {
                id: "u1".into(),
                email: "ana@example.com".into(),
            },
            shipment: Shipment {
                id: "shp-1".into(),
                user_id: "u1".into(),
                carrier_id: "c1".into(),
                tracking_code: "360002423941550".into(),
                last_status: Some(Status::InTransit),
                last_event_at: Some(now),
                last_checked_at: now,
                created_at: now,
                updated_at: now,
            },
            carrier: Carrier {
                id: "c1".into(),
                name: "Andreani".into(),
                slug: "andreani".into(),
                website: None,
            },
        }
    }

    #[test]
    fn email_names_carrier_code_status_and_link() {
        let email = compose(&notification(), "https://trackeame.app/");
        assert_eq!(
            email.subject,
            "¡Tenés novedades en tu paquete! [Andreani 360002423941550]"
        );
        assert!(email.text.contains("En tránsito"));
        assert!(email.text.contains("https://trackeame.app/packages/shp-1"));
        assert!(email.html.contains("href=\"https://trackeame.app/packages/shp-1\""));
    }

    #[test]
    fn resend_message_uses_named_sender() {
        let notifier =
            ResendNotifier::new("re_test_secret", "no-reply@trackeame.app", "http://localhost:5173").unwrap();
        let body = notifier.message(&notification());
        assert_eq!(body["from"], "Ticiano de Trackeame <no-reply@trackeame.app>");
        assert_eq!(body["to"][0], "ana@example.com");
        assert!(!format!("{notifier:?}").contains("re_test_secret"));
    }

    #[test]
    fn missing_status_reads_unknown() {
        assert_eq!(status_label(None), "Desconocido");
    }
}
