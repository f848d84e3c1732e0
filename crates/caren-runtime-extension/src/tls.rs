//! This module contains structs and functions to create a TLS termination
//! server using mounted PEM files, which can be used in combination with an
//! Axum [`Router`].
use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{Router, extract::Request};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::rt::{TokioExecutor, TokioIo};
use snafu::{ResultExt, Snafu};
use tokio::net::TcpListener;
use tokio_rustls::{
    TlsAcceptor,
    rustls::{
        ServerConfig,
        crypto::ring::default_provider,
        pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject},
        version::{TLS12, TLS13},
    },
};
use tower::ServiceExt;
use tracing::{Instrument, instrument};

pub type Result<T, E = TlsServerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum TlsServerError {
    #[snafu(display("failed to read PEM file {path:?}"))]
    ReadPemFile {
        source: std::io::Error,
        path: String,
    },

    #[snafu(display("failed to parse certificate chain from {path:?}"))]
    ParseCertificateChain {
        source: tokio_rustls::rustls::pki_types::pem::Error,
        path: String,
    },

    #[snafu(display("failed to parse private key from {path:?}"))]
    ParsePrivateKey {
        source: tokio_rustls::rustls::pki_types::pem::Error,
        path: String,
    },

    #[snafu(display("failed to set safe TLS protocol versions"))]
    SetSafeTlsProtocolVersions { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to configure server certificate"))]
    ConfigureCertificate { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to create TCP listener by binding to socket address {socket_addr:?}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },
}

/// A server which terminates TLS connections and allows clients to communicate
/// via HTTPS with the underlying HTTP router.
pub struct TlsServer {
    config: ServerConfig,
    socket_addr: SocketAddr,
    router: Router,
}

impl TlsServer {
    #[instrument(name = "create_tls_server", skip(router))]
    pub async fn new(
        socket_addr: SocketAddr,
        router: Router,
        certificate_path: &Path,
        private_key_path: &Path,
    ) -> Result<Self> {
        let certificate_chain = read_certificate_chain(certificate_path).await?;
        let private_key = read_private_key(private_key_path).await?;

        let tls_provider = default_provider();
        let mut config = ServerConfig::builder_with_provider(tls_provider.into())
            .with_protocol_versions(&[&TLS12, &TLS13])
            .context(SetSafeTlsProtocolVersionsSnafu)?
            .with_no_client_auth()
            .with_single_cert(certificate_chain, private_key)
            .context(ConfigureCertificateSnafu)?;
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            config,
            socket_addr,
            router,
        })
    }

    /// Runs the TLS server by listening for incoming TCP connections on the
    /// bound socket address. It only accepts TLS connections. Internally each
    /// TLS stream gets handled by a Hyper service, which in turn is an Axum
    /// router.
    pub async fn run(self) -> Result<()> {
        let tls_acceptor = TlsAcceptor::from(Arc::new(self.config));
        let tcp_listener =
            TcpListener::bind(self.socket_addr)
                .await
                .context(BindTcpListenerSnafu {
                    socket_addr: self.socket_addr,
                })?;

        tracing::info!(socket_addr = %self.socket_addr, "serving HTTPS");

        loop {
            let tls_acceptor = tls_acceptor.clone();
            let router = self.router.clone();

            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok((stream, addr)) => (stream, addr),
                Err(err) => {
                    tracing::trace!(%err, "failed to accept incoming TCP connection");
                    continue;
                }
            };

            let span = tracing::debug_span!("accept tcp connection", %remote_addr);
            tokio::spawn(
                async move {
                    let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(err) => {
                            tracing::trace!(%err, "error during tls handshake connection");
                            return;
                        }
                    };

                    // Hyper has its own `AsyncRead` and `AsyncWrite` traits and doesn't use tokio.
                    // `TokioIo` converts between them.
                    let tls_stream = TokioIo::new(tls_stream);

                    // Hyper also has its own `Service` trait and doesn't use tower. We can use
                    // `hyper::service::service_fn` to create a hyper `Service` that calls our app through
                    // `tower::Service::call`.
                    let hyper_service = service_fn(move |request: Request<Incoming>| {
                        // We need to clone here, because oneshot consumes self
                        router.clone().oneshot(request)
                    });

                    if let Err(err) =
                        hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                            .serve_connection_with_upgrades(tls_stream, hyper_service)
                            .await
                    {
                        tracing::warn!(%err, "failed to serve connection");
                    }
                }
                .instrument(span),
            );
        }
    }
}

async fn read_pem_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.with_context(|_| ReadPemFileSnafu {
        path: path.display().to_string(),
    })
}

async fn read_certificate_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = read_pem_file(path).await?;

    CertificateDer::pem_slice_iter(&pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|_| ParseCertificateChainSnafu {
            path: path.display().to_string(),
        })
}

async fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = read_pem_file(path).await?;

    PrivateKeyDer::from_pem_slice(&pem).with_context(|_| ParsePrivateKeySnafu {
        path: path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[tokio::test]
    async fn missing_certificate_file() {
        let err = read_certificate_chain(Path::new("/does/not/exist/tls.crt"))
            .await
            .expect_err("file does not exist");

        assert!(matches!(err, TlsServerError::ReadPemFile { .. }));
    }

    #[tokio::test]
    async fn certificate_is_no_private_key() {
        let path = std::env::temp_dir().join("caren-runtime-extension-tls-test.pem");
        let pem = indoc! {"
            -----BEGIN CERTIFICATE-----
            MAA=
            -----END CERTIFICATE-----
        "};
        tokio::fs::write(&path, pem)
            .await
            .expect("temporary file must be writable");

        let err = read_private_key(&path)
            .await
            .expect_err("file contains no private key");

        assert!(matches!(err, TlsServerError::ParsePrivateKey { .. }));
    }
}
