//! Outbound email notifications.
//!
//! Uses `lettre` for SMTP transport. When no SMTP relay is configured the
//! service falls back to [`LogNotifier`], which only records the email.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::{fmt, str::FromStr};
use thiserror::Error;
use tracing::info;

/// Notification transport errors.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Sender or recipient could not be parsed.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
    /// The message has nobody to go to.
    #[error("Email has no recipients")]
    NoRecipients,
    /// Failed to build the email message.
    #[error("Failed to build email: {0}")]
    Build(String),
    /// The transport refused or failed to deliver.
    #[error("Failed to send email: {0}")]
    Send(String),
}

pub type NotificationResult<T> = Result<T, NotificationError>;

/// One plain-text email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub source: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    /// Build a `lettre` message, validating every address.
    pub fn to_message(&self) -> NotificationResult<Message> {
        if self.recipients.is_empty() {
            return Err(NotificationError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(&self.source)?)
            .subject(self.subject.clone())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .body(self.body.clone())
            .map_err(|e| NotificationError::Build(e.to_string()))
    }
}

/// Parse one address as a `lettre` mailbox.
pub fn parse_mailbox(address: &str) -> NotificationResult<Mailbox> {
    address
        .parse()
        .map_err(|e| NotificationError::InvalidAddress(format!("{address}: {e}")))
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> NotificationResult<()>;
}

/// How the SMTP connection is secured.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SmtpTls {
    /// Plaintext greeting, then upgrade with STARTTLS (submission, port 587).
    StartTls,
    /// TLS from the first byte (SMTPS, port 465).
    Implicit,
    /// No encryption. Local relays and test servers only.
    Plaintext,
}

impl SmtpTls {
    /// Mode implied by a port when none is configured.
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            SmtpTls::Implicit
        } else {
            SmtpTls::StartTls
        }
    }
}

impl FromStr for SmtpTls {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" | "implicit" | "smtps" => Ok(SmtpTls::Implicit),
            "none" | "plain" => Ok(SmtpTls::Plaintext),
            other => Err(format!(
                "unknown SMTP TLS mode `{other}` (expected starttls, tls or none)"
            )),
        }
    }
}

impl fmt::Display for SmtpTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SmtpTls::StartTls => "starttls",
            SmtpTls::Implicit => "tls",
            SmtpTls::Plaintext => "none",
        };
        write!(f, "{}", name)
    }
}

/// SMTP relay settings.
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Sends mail through an SMTP relay. The transport is built once and reused.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(settings: &SmtpSettings) -> NotificationResult<Self> {
        let builder = match settings.tls {
            SmtpTls::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
                    .map_err(|e| NotificationError::Send(e.to_string()))?
            }
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)
                .map_err(|e| NotificationError::Send(e.to_string()))?,
            SmtpTls::Plaintext => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.host)
            }
        };
        let mut builder = builder.port(settings.port);

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_email(&self, email: &EmailMessage) -> NotificationResult<()> {
        let message = email.to_message()?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Send(e.to_string()))?;
        Ok(())
    }
}

/// Records emails in the log instead of delivering them.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, email: &EmailMessage) -> NotificationResult<()> {
        // still validate, so a bad sender shows up before SMTP is wired in
        email.to_message()?;
        info!(
            from = %email.source,
            to = %email.recipients.join(","),
            subject = %email.subject,
            "email notification (no SMTP relay configured): {}",
            email.body.replace('\n', " | ")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(source: &str, recipients: &[&str]) -> EmailMessage {
        EmailMessage {
            source: source.into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            subject: "File Upload Notification".into(),
            body: "File: f\nSize: 1 bytes".into(),
        }
    }

    #[test]
    fn builds_message_for_every_recipient() {
        let message = email("uploads@example.com", &["a@example.com", "b@example.com"])
            .to_message()
            .unwrap();
        let to: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|addr| addr.to_string())
            .collect();
        assert_eq!(to, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn rejects_bad_addresses_and_empty_recipients() {
        assert!(matches!(
            email("not an address", &["a@example.com"]).to_message(),
            Err(NotificationError::InvalidAddress(_))
        ));
        assert!(matches!(
            email("uploads@example.com", &["nope"]).to_message(),
            Err(NotificationError::InvalidAddress(_))
        ));
        assert!(matches!(
            email("uploads@example.com", &[]).to_message(),
            Err(NotificationError::NoRecipients)
        ));
    }

    #[tokio::test]
    async fn log_notifier_accepts_valid_email() {
        LogNotifier
            .send_email(&email("uploads@example.com", &["ops@example.com"]))
            .await
            .unwrap();
    }

    #[test]
    fn smtp_transport_builds_in_every_mode() {
        for tls in [SmtpTls::StartTls, SmtpTls::Implicit, SmtpTls::Plaintext] {
            let settings = SmtpSettings {
                host: "localhost".into(),
                port: 1025,
                tls,
                username: Some("user".into()),
                password: Some("password".into()),
            };
            assert!(SmtpNotifier::new(&settings).is_ok(), "{tls}");
        }
    }

    #[test]
    fn tls_mode_parsing_and_port_defaults() {
        assert_eq!("STARTTLS".parse::<SmtpTls>(), Ok(SmtpTls::StartTls));
        assert_eq!("tls".parse::<SmtpTls>(), Ok(SmtpTls::Implicit));
        assert_eq!("none".parse::<SmtpTls>(), Ok(SmtpTls::Plaintext));
        assert!("ssl3".parse::<SmtpTls>().is_err());

        assert_eq!(SmtpTls::for_port(587), SmtpTls::StartTls);
        assert_eq!(SmtpTls::for_port(25), SmtpTls::StartTls);
        assert_eq!(SmtpTls::for_port(465), SmtpTls::Implicit);
    }

    /// Accept one connection on a local port and return the client's first bytes.
    ///
    /// With `greet` the server speaks first, as a plaintext SMTP server does.
    async fn first_client_bytes(tls: SmtpTls, greet: bool) -> Vec<u8> {
        use tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::TcpListener,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            if greet {
                socket
                    .write_all(b"220 localhost ESMTP test\r\n")
                    .await
                    .unwrap();
            }
            let mut buf = vec![0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            buf.truncate(n);
            buf
        };

        let notifier = SmtpNotifier::new(&SmtpSettings {
            host: "127.0.0.1".into(),
            port,
            tls,
            username: None,
            password: None,
        })
        .unwrap();
        let mail = email("uploads@example.com", &["ops@example.com"]);

        // the send fails once the server hangs up; only the opening bytes matter
        let (bytes, _) = tokio::join!(server, notifier.send_email(&mail));
        bytes
    }

    #[tokio::test]
    async fn starttls_mode_waits_for_greeting_then_says_ehlo() {
        let bytes = first_client_bytes(SmtpTls::StartTls, true).await;
        assert!(bytes.starts_with(b"EHLO"), "{:?}", String::from_utf8_lossy(&bytes));
    }

    #[tokio::test]
    async fn implicit_tls_mode_opens_with_a_handshake() {
        let bytes = first_client_bytes(SmtpTls::Implicit, false).await;
        assert_eq!(bytes.first(), Some(&0x16));
    }

    #[test]
    fn error_display() {
        assert_eq!(
            NotificationError::Send("timeout".into()).to_string(),
            "Failed to send email: timeout"
        );
        assert_eq!(
            NotificationError::NoRecipients.to_string(),
            "Email has no recipients"
        );
    }
}
