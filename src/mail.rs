use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let from: Mailbox = cfg.from.parse().context("parse MAIL_FROM")?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .with_context(|| format!("smtp relay {}", cfg.host))?;
        if !cfg.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                cfg.username.clone(),
                cfg.password.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, text: &str, html: &str) -> anyhow::Result<()> {
        let recipient: Mailbox = to.parse().with_context(|| format!("parse recipient {to}"))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))
            .context("build email")?;
        self.transport.send(message).await.context("smtp send")?;
        info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }
}

/// Used when no SMTP host is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _text: &str, _html: &str) -> anyhow::Result<()> {
        info!(to = %to, subject = %subject, "smtp not configured; email dropped");
        Ok(())
    }
}

/// Sends on a detached task. Failures are logged and otherwise ignored.
pub fn send_detached(
    mailer: std::sync::Arc<dyn Mailer>,
    to: String,
    subject: String,
    text: String,
    html: String,
) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, &subject, &text, &html).await {
            warn!(error = %e, to = %to, "email delivery failed");
        }
    });
}

pub fn welcome_email(name: &str) -> (String, String, String) {
    let subject = "Welcome to PharmaTrack".to_string();
    let text = format!("Hi {name},\n\nYour PharmaTrack account is ready.\n");
    let html = format!(
        "<p>Hi {},</p><p>Your PharmaTrack account is ready.</p>",
        html_escape::encode_safe(name)
    );
    (subject, text, html)
}
