use crate::error::DispatchError;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use log::info;
use serde::{Deserialize, Serialize};

/// How the SMTP session is secured
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportSecurity {
    /// TLS from the first byte, usually port 465
    #[default]
    ImplicitTls,

    /// Plain connection upgraded with STARTTLS, usually port 587
    Starttls,
}

/// SMTP relay and sender settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MailSettings {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub security: TransportSecurity,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender mailbox, e.g. `Reports <reports@example.com>`
    pub from: String,
}

fn default_port() -> u16 {
    465
}

/// Email-dispatch collaborator used by the report workflow
///
/// One call is one submission attempt. Implementations do not retry.
pub trait ReportDispatcher: Send + Sync {
    fn dispatch(&self, recipient: &str, file_name: &str, document: &[u8])
    -> Result<(), DispatchError>;
}

/// Sends reports through an authenticated SMTP relay
pub struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    /// Build a mailer from settings
    ///
    /// # Errors
    /// * `DispatchError::Address` if the sender address does not parse
    /// * `DispatchError::Transport` if the TLS parameters or relay are invalid
    pub fn new(settings: &MailSettings) -> Result<Self, DispatchError> {
        let creds = Credentials::new(settings.username.clone(), settings.password.clone());

        let tls_parameters = TlsParameters::new(settings.host.clone())
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let tls = match settings.security {
            TransportSecurity::ImplicitTls => Tls::Wrapper(tls_parameters),
            TransportSecurity::Starttls => Tls::Required(tls_parameters),
        };

        let smtp = SmtpTransport::relay(&settings.host)
            .map_err(|e| DispatchError::Transport(e.to_string()))?
            .credentials(creds)
            .port(settings.port)
            .tls(tls)
            .build();

        let from = settings
            .from
            .parse()
            .map_err(|_| DispatchError::Address(settings.from.clone()))?;

        Ok(Mailer { smtp, from })
    }

    /// Build the message carrying the PDF attachment
    pub fn build_message(
        &self,
        recipient: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<Message, DispatchError> {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| DispatchError::Address(recipient.to_string()))?;
        let pdf = ContentType::parse("application/pdf")
            .map_err(|e| DispatchError::Message(e.to_string()))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Automated Report")
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(
                        "Please find the attached report.".to_string(),
                    ))
                    .singlepart(Attachment::new(file_name.to_string()).body(document.to_vec(), pdf)),
            )
            .map_err(|e| DispatchError::Message(e.to_string()))
    }
}

impl ReportDispatcher for Mailer {
    fn dispatch(
        &self,
        recipient: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<(), DispatchError> {
        let email = self.build_message(recipient, file_name, document)?;
        self.smtp
            .send(&email)
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        info!("Sent {} to {}", file_name, recipient);
        Ok(())
    }
}
