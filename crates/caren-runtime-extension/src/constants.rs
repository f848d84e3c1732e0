//! Default ports, addresses and paths of the runtime extension server.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// The default port `8443`, used for both HTTP and HTTPS.
pub const DEFAULT_PORT: u16 = 8443;

/// The default IP address [`Ipv4Addr::UNSPECIFIED`] (`0.0.0.0`) the server binds to,
/// which represents binding on all network addresses.
pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// The default socket address `0.0.0.0:8443` the server binds to.
pub const DEFAULT_SOCKET_ADDRESS: SocketAddr = SocketAddr::new(DEFAULT_LISTEN_ADDRESS, DEFAULT_PORT);

/// The path prefix of all runtime hook routes.
pub const HOOKS_PATH_PREFIX: &str = "/hooks.runtime.cluster.x-k8s.io/v1alpha1";

/// The environment variable used to configure the log level filter. Setting
/// `CAREN_LOG_DIRECTORY` additionally writes logs into rolling files.
pub const LOG_ENV_VAR: &str = "CAREN_LOG";

/// The name of the application, used as the prefix of log files.
pub const APP_NAME: &str = "caren-runtime-extension";

/// The handler timeout advertised to Cluster API during discovery.
pub const DEFAULT_HANDLER_TIMEOUT_SECONDS: i32 = 10;
