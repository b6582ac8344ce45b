//! Delivery through an SMTP relay.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, instrument};

use super::{MailMessage, MailSender};

/// Relay connection settings.
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Plain SMTP without TLS, for local relays only.
    pub insecure: bool,
}

pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for SmtpMailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailSender").finish_non_exhaustive()
    }
}

impl SmtpMailSender {
    /// Build a pooled transport. No connection is made until the first send.
    ///
    /// # Errors
    /// Fails when the TLS parameters or relay for `host` cannot be built.
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        let SmtpSettings {
            host,
            port,
            username,
            password,
            insecure,
        } = settings;

        let mut builder = if insecure {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host).port(port)
        } else {
            let tls = TlsParameters::new(host.clone()).context("Invalid SMTP TLS parameters")?;

            // 465 is implicit TLS, every other port upgrades with STARTTLS
            if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .context("Invalid SMTP relay")?
                    .port(port)
                    .tls(Tls::Wrapper(tls))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                    .context("Invalid SMTP relay")?
                    .port(port)
                    .tls(Tls::Required(tls))
            }
        };

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user, pass.expose_secret().to_string()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

fn build_message(message: &MailMessage) -> Result<Message> {
    Message::builder()
        .from(message.from.parse().context("Invalid from address")?)
        .to(message.to.parse().context("Invalid to address")?)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .context("Failed to build mail")
}

#[async_trait]
impl MailSender for SmtpMailSender {
    #[instrument(skip(self, message), fields(to = %message.to))]
    async fn send(&self, message: &MailMessage) -> Result<()> {
        let response = self
            .transport
            .send(build_message(message)?)
            .await
            .context("SMTP delivery failed")?;
        debug!(code = %response.code(), "mail accepted by relay");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings(port: u16, insecure: bool) -> SmtpSettings {
        SmtpSettings {
            host: "localhost".to_string(),
            port,
            username: Some("idp".to_string()),
            password: Some(SecretString::from("secret")),
            insecure,
        }
    }

    fn message() -> MailMessage {
        MailMessage {
            from: "Example ID <no-reply@example.com>".to_string(),
            to: "ada@example.com".to_string(),
            subject: "Delete your account".to_string(),
            body: "Your code is 424242".to_string(),
        }
    }

    #[tokio::test]
    async fn transports_build_for_every_tls_mode() {
        assert!(SmtpMailSender::new(settings(25, true)).is_ok());
        assert!(SmtpMailSender::new(settings(587, false)).is_ok());
        assert!(SmtpMailSender::new(settings(465, false)).is_ok());
    }

    #[test]
    fn message_carries_headers_and_body() {
        let formatted = String::from_utf8(build_message(&message()).unwrap().formatted()).unwrap();
        assert!(formatted.contains("To: ada@example.com"));
        assert!(formatted.contains("Subject: Delete your account"));
        assert!(formatted.contains("Content-Type: text/plain"));
        assert!(formatted.contains("Your code is 424242"));
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        let mut message = message();
        message.to = "not an address".to_string();
        let err = build_message(&message).unwrap_err();
        assert!(err.to_string().contains("Invalid to address"));
    }
}
