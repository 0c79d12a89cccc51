//! Status page fetcher.
//!
//! Opens a fresh connection per fetch, sends one `GET`, and returns the
//! body of a `200 OK` response. Port 443 switches to HTTPS with
//! certificate verification turned off: the poller is meant to watch a
//! local nginx whose certificate rarely matches `localhost`.
//!
//! ```text
//! fetch()
//!   → TCP connect host:port
//!     → [TLS handshake, any certificate accepted (port 443 only)]
//!       → HTTP/1.1 GET path
//!         → 200 → body | other → NonOkStatus(code)
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::{Scheme, StatusConfig};
use crate::error::{ConfigError, ConfigResult, FetchError};

/// Upper bound on a whole fetch: connect, handshake, request, and body.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const AGENT: &str = concat!("nginx-status/", env!("CARGO_PKG_VERSION"));

/// Fetches the stub_status page for one configured endpoint.
pub struct StatusFetcher {
    url: String,
    host: String,
    authority: String,
    path: String,
    tls: Option<TlsConnector>,
    timeout: Duration,
}

impl std::fmt::Debug for StatusFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusFetcher")
            .field("url", &self.url)
            .field("tls", &self.tls.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StatusFetcher {
    /// Build a fetcher for `config`, choosing the scheme from its port.
    pub fn new(config: &StatusConfig) -> ConfigResult<Self> {
        Self::with_scheme(config, config.scheme())
    }

    pub(crate) fn with_scheme(config: &StatusConfig, scheme: Scheme) -> ConfigResult<Self> {
        let tls = match scheme {
            Scheme::Https => Some(insecure_tls_connector()?),
            Scheme::Http => None,
        };
        let authority = config.authority();
        Ok(Self {
            url: format!("{scheme}://{authority}{}", config.path),
            host: config.host.clone(),
            authority,
            path: config.path.clone(),
            tls,
            timeout: REQUEST_TIMEOUT,
        })
    }

    /// Override the request timeout.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the status page body.
    pub async fn fetch(&self) -> Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.request()).await {
            Ok(result) => result,
            Err(_) => Err(self.transport(format!("timed out after {:?}", self.timeout))),
        }
    }

    async fn request(&self) -> Result<String, FetchError> {
        let stream = TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|e| self.transport(format!("connect: {e}")))?;

        match &self.tls {
            None => self.exchange(stream).await,
            Some(connector) => {
                let server_name = rustls::pki_types::ServerName::try_from(self.host.clone())
                    .map_err(|e| self.transport(format!("invalid tls server name: {e}")))?;
                let stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|e| self.transport(format!("tls handshake: {e}")))?;
                self.exchange(stream).await
            }
        }
    }

    async fn exchange<S>(&self, stream: S) -> Result<String, FetchError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| self.transport(format!("http handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "status connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| self.transport(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| self.transport(format!("send request: {e}")))?;

        let status = resp.status();
        if status != StatusCode::OK {
            debug!(status = %status, url = %self.url, "status page non-200");
            return Err(FetchError::NonOkStatus(status.as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| self.transport(format!("read body: {e}")))?
            .to_bytes();

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    fn transport(&self, cause: String) -> FetchError {
        FetchError::Transport {
            url: self.url.clone(),
            cause,
        }
    }
}

/// TLS client that accepts any server certificate.
fn insecure_tls_connector() -> ConfigResult<TlsConnector> {
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| ConfigError::Tls(e.to_string()))?
    .dangerous()
    .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
