//! Out-of-band delivery of one-time codes.
//!
//! Mail is sent after the issuing store write has committed. A delivery
//! failure never rolls the challenge back; the user can ask for a new one.

mod smtp;
mod templates;

pub use smtp::{SmtpMailSender, SmtpSettings};
pub use templates::{EmailTemplate, TemplateData, TemplateMap};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, info};

use crate::challenge::IssuedChallenge;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery abstraction. Implementations decide the transport.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Logs messages instead of delivering them, for local runs without a relay.
#[derive(Clone, Debug)]
pub struct LogMailSender;

#[async_trait]
impl MailSender for LogMailSender {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        info!(
            from = %message.from,
            to = %message.to,
            subject = %message.subject,
            "mail not delivered, no SMTP relay configured"
        );
        Ok(())
    }
}

/// Sender identity shown in mails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Provider {
    pub name: String,
    pub email: String,
}

impl Provider {
    fn mailbox(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

#[derive(Clone)]
pub struct Mailer {
    templates: Arc<TemplateMap>,
    sender: Arc<dyn MailSender>,
    provider: Provider,
}

impl std::fmt::Debug for Mailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailer")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Mailer {
    #[must_use]
    pub fn new(templates: Arc<TemplateMap>, sender: Arc<dyn MailSender>, provider: Provider) -> Self {
        Self {
            templates,
            sender,
            provider,
        }
    }

    /// Render and send the code of `issued`. Returns `false` when the
    /// challenge carries nothing to mail.
    ///
    /// # Errors
    /// Fails when the kind has no template or the sender fails.
    pub async fn dispatch(&self, issued: &IssuedChallenge) -> Result<bool> {
        let (Some(to), Some(code)) = (&issued.deliver_to, &issued.code) else {
            debug!(kind = %issued.kind, "nothing to mail");
            return Ok(false);
        };

        let data = TemplateData {
            name: issued.recipient_name.as_deref().unwrap_or_default(),
            email: to,
            code: code.expose_secret(),
            link: issued.link().unwrap_or_default(),
            provider: &self.provider.name,
        };
        let (subject, body) = self
            .templates
            .render(issued.kind, &data)
            .ok_or_else(|| anyhow!("no mail template for {}", issued.kind))?;

        self.sender.send(&MailMessage {
            from: self.provider.mailbox(),
            to: to.clone(),
            subject,
            body,
        })
        .await?;
        Ok(true)
    }
}
