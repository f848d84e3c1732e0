//! Command line interface of the runtime extension binary.
//!
//! Every option can also be set using a `CAREN_*` environment variable.
use std::{net::IpAddr, path::PathBuf};

use clap::{Args, Parser};

use crate::{
    constants::{APP_NAME, DEFAULT_LISTEN_ADDRESS, DEFAULT_PORT},
    logging::LogFormat,
    options::ServerOptions,
};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(name = APP_NAME, author, version, about = "Cluster API runtime extension serving topology mutation hooks")]
pub enum Command {
    /// Print the declared cluster class variables as JSON.
    Variables,

    /// Run the runtime extension server.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct RunArguments {
    /// The IP address the server binds to.
    #[arg(long, env = "CAREN_LISTEN_ADDRESS", default_value_t = DEFAULT_LISTEN_ADDRESS)]
    pub listen_address: IpAddr,

    /// The port the server binds to.
    #[arg(long, env = "CAREN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Serve HTTPS using the PEM encoded certificate chain in FILE.
    #[arg(
        long,
        env = "CAREN_TLS_CERTIFICATE_FILE",
        value_name = "FILE",
        requires = "tls_private_key_file"
    )]
    pub tls_certificate_file: Option<PathBuf>,

    /// The PEM encoded private key of the TLS certificate.
    #[arg(
        long,
        env = "CAREN_TLS_PRIVATE_KEY_FILE",
        value_name = "FILE",
        requires = "tls_certificate_file"
    )]
    pub tls_private_key_file: Option<PathBuf>,

    /// The output format of console logs.
    #[arg(long, env = "CAREN_LOG_FORMAT", value_enum, default_value_t)]
    pub log_format: LogFormat,
}

impl RunArguments {
    pub fn server_options(&self) -> ServerOptions {
        let builder = ServerOptions::builder().bind_address(self.listen_address, self.port);

        match (&self.tls_certificate_file, &self.tls_private_key_file) {
            (Some(certificate_path), Some(private_key_path)) => builder
                .tls(certificate_path, private_key_path)
                .build(),
            _ => builder.build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use clap::CommandFactory;

    use super::*;
    use crate::options::TlsOption;

    fn run_arguments(args: &[&str]) -> RunArguments {
        match Command::try_parse_from(args.iter().copied()).expect("arguments must parse") {
            Command::Run(arguments) => arguments,
            command => unreachable!("expected run command, got {command:?}"),
        }
    }

    #[test]
    fn verify_cli() {
        Command::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let arguments = run_arguments(&[APP_NAME, "run"]);

        assert_eq!(arguments.log_format, LogFormat::Plain);

        let options = arguments.server_options();
        assert_eq!(
            options.socket_addr,
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_PORT)
        );
        assert_eq!(options.tls, TlsOption::Disabled);
    }

    #[test]
    fn tls() {
        let arguments = run_arguments(&[
            APP_NAME,
            "run",
            "--port",
            "9443",
            "--tls-certificate-file",
            "/certs/tls.crt",
            "--tls-private-key-file",
            "/certs/tls.key",
            "--log-format",
            "json",
        ]);

        assert_eq!(arguments.log_format, LogFormat::Json);

        let options = arguments.server_options();
        assert_eq!(options.socket_addr.port(), 9443);
        assert_eq!(
            options.tls,
            TlsOption::Mount {
                certificate_path: "/certs/tls.crt".into(),
                private_key_path: "/certs/tls.key".into(),
            }
        );
    }

    #[test]
    fn certificate_requires_private_key() {
        let result =
            Command::try_parse_from([APP_NAME, "run", "--tls-certificate-file", "/certs/tls.crt"]);

        assert!(result.is_err());
    }
}
