use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::email::OutgoingEmail;

pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";

/// Abstraction over email delivery for testability.
/// Real implementation: `HttpMailer`. Without an API key: `LogMailer`.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;

    /// Short name used in startup logs.
    fn name(&self) -> &'static str;
}

/// Body accepted by the transactional email API.
#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    reply_to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

/// Sends email through a transactional email HTTP API.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("permanence/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for email delivery")?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let body = SendEmailRequest {
            from: &email.from,
            to: [&email.to],
            reply_to: &email.reply_to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        };
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to email API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            anyhow::bail!("Email API returned {}: {}", status, detail.trim());
        }
        tracing::debug!(to = %email.to, subject = %email.subject, "email accepted by provider");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Logs emails instead of sending them. Used when no API key is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            reply_to = %email.reply_to,
            subject = %email.subject,
            "email delivery disabled, logging instead:\n{}",
            email.text
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every email it is asked to send; optionally fails every send.
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<OutgoingEmail>>,
        pub fail_with: Option<String>,
    }

    impl RecordingMailer {
        pub fn failing(message: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }

        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            match &self.fail_with {
                Some(msg) => anyhow::bail!("{}", msg),
                None => Ok(()),
            }
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}
