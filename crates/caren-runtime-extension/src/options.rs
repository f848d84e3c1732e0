//! Contains available options to configure the [`RuntimeExtensionServer`][crate::RuntimeExtensionServer].
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use crate::constants::DEFAULT_SOCKET_ADDRESS;

/// Specifies available runtime extension server options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The socket binds to 0.0.0.0 on port 8443
/// - TLS is disabled and plain HTTP is served.
///
/// ### Example with Custom IP Address, Port and TLS
///
/// ```
/// use caren_runtime_extension::options::ServerOptions;
///
/// // Set IP address and port at the same time
/// let options = ServerOptions::builder()
///     .bind_address([127, 0, 0, 1], 12345)
///     .build();
///
/// // Set port only and serve HTTPS using mounted PEM files
/// let options = ServerOptions::builder()
///     .bind_port(9443)
///     .tls("/certs/tls.crt", "/certs/tls.key")
///     .build();
/// ```
#[derive(Debug)]
pub struct ServerOptions {
    /// The socket address the [`TcpListener`][tokio::net::TcpListener] binds to.
    pub socket_addr: SocketAddr,

    /// Whether to terminate TLS and where to read the certificate from.
    pub tls: TlsOption,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ServerOptions {
    /// Returns the default [`ServerOptionsBuilder`] which allows to selectively
    /// customize the options.
    pub fn builder() -> ServerOptionsBuilder {
        ServerOptionsBuilder::default()
    }
}

/// The [`ServerOptionsBuilder`] which allows to selectively customize the
/// server [`ServerOptions`].
#[derive(Debug, Default)]
pub struct ServerOptionsBuilder {
    socket_addr: Option<SocketAddr>,
    tls: TlsOption,
}

impl ServerOptionsBuilder {
    /// Sets the socket address the server binds to.
    pub fn bind_address(mut self, bind_ip: impl Into<IpAddr>, bind_port: u16) -> Self {
        self.socket_addr = Some(SocketAddr::new(bind_ip.into(), bind_port));
        self
    }

    /// Sets the IP address of the socket address the server binds to.
    pub fn bind_ip(mut self, bind_ip: impl Into<IpAddr>) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_ip(bind_ip.into());
        self
    }

    /// Sets the port of the socket address the server binds to.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_port(bind_port);
        self
    }

    /// Enables TLS using the PEM encoded certificate chain and private key at
    /// the given paths.
    pub fn tls(
        mut self,
        certificate_path: impl Into<PathBuf>,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        self.tls = TlsOption::Mount {
            certificate_path: certificate_path.into(),
            private_key_path: private_key_path.into(),
        };
        self
    }

    /// Builds the final [`ServerOptions`] by using default values for any not
    /// explicitly set option.
    pub fn build(self) -> ServerOptions {
        ServerOptions {
            socket_addr: self.socket_addr.unwrap_or(DEFAULT_SOCKET_ADDRESS),
            tls: self.tls,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TlsOption {
    /// Serve plain HTTP, e.g. behind a TLS terminating proxy.
    #[default]
    Disabled,

    /// Terminate TLS using mounted PEM files, usually provided by cert-manager.
    Mount {
        certificate_path: PathBuf,
        private_key_path: PathBuf,
    },
}
