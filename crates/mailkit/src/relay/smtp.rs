//! SMTP relay backed by `lettre`.
//!
//! Every submission opens its own connection and closes it before
//! returning, whether the relay accepted the message or not.

use super::Relay;
use crate::error::{Error, Result};
use crate::types::{DispatchOptions, TlsMode, TransportConfig};
use lettre::address::Envelope as SmtpEnvelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Address, SmtpTransport, Transport};
use secrecy::ExposeSecret;

/// Relay speaking SMTP to the host named in each [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct SmtpRelay {
    options: DispatchOptions,
}

impl SmtpRelay {
    pub fn new(options: DispatchOptions) -> Self {
        Self { options }
    }

    fn transport(&self, transport: &TransportConfig) -> Result<SmtpTransport> {
        let tls = tls_for(self.options.tls, &transport.host)?;

        let mut builder = SmtpTransport::builder_dangerous(transport.host.as_str())
            .port(transport.port)
            .timeout(Some(self.options.timeout))
            .tls(tls);

        if let Some(username) = transport.auth_user() {
            let password = transport
                .password
                .as_ref()
                .map(|p| p.expose_secret().clone())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username.to_string(), password));
        }

        Ok(builder.build())
    }
}

fn tls_for(mode: TlsMode, host: &str) -> Result<Tls> {
    let parameters = || {
        TlsParameters::new(host.to_string()).map_err(|e| Error::Tls {
            message: e.to_string(),
        })
    };

    Ok(match mode {
        TlsMode::None => Tls::None,
        TlsMode::Opportunistic => Tls::Opportunistic(parameters()?),
        TlsMode::Required => Tls::Required(parameters()?),
        TlsMode::Wrapper => Tls::Wrapper(parameters()?),
    })
}

impl Relay for SmtpRelay {
    fn submit(
        &self,
        transport: &TransportConfig,
        from: &Address,
        to: &Address,
        wire: &[u8],
    ) -> Result<()> {
        let envelope = SmtpEnvelope::new(Some(from.clone()), vec![to.clone()]).map_err(|e| {
            Error::Protocol {
                message: e.to_string(),
            }
        })?;

        log::debug!(
            "Connecting to {} (tls: {}, timeout: {:?})",
            transport.route(),
            self.options.tls,
            self.options.timeout
        );

        let mailer = self.transport(transport)?;
        mailer
            .send_raw(&envelope, wire)
            .map(|_| ())
            .map_err(|e| Error::from_smtp(&e))
    }
}
