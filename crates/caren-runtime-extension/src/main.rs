use std::io::stdout;

use caren_patches::{
    handlers::MetaDiscoverVariables,
    hooks::{self, DiscoverVariablesRequest},
};
use caren_runtime_extension::{
    RuntimeExtensionServer,
    cli::Command,
    constants::{APP_NAME, LOG_ENV_VAR},
    handlers, logging,
};
use clap::Parser;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to create runtime extension"))]
    CreateRuntimeExtension { source: handlers::Error },

    #[snafu(display("failed to compose variable declarations"))]
    ComposeDeclarations {
        source: caren_patches::handlers::Error,
    },

    #[snafu(display("failed to print variables"))]
    PrintVariables { source: serde_json::Error },

    #[snafu(display("failed to run runtime extension server"))]
    RunServer {
        source: caren_runtime_extension::Error,
    },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    match Command::parse() {
        Command::Variables => {
            let handler = MetaDiscoverVariables::new(handlers::declarations())
                .context(ComposeDeclarationsSnafu)?;
            let response =
                hooks::discover_variables(&handler, &DiscoverVariablesRequest::default());

            serde_json::to_writer_pretty(stdout(), &response.variables)
                .context(PrintVariablesSnafu)
        }
        Command::Run(arguments) => {
            logging::initialize_logging(LOG_ENV_VAR, APP_NAME, arguments.log_format)
                .context(InitializeLoggingSnafu)?;

            let extension = handlers::runtime_extension().context(CreateRuntimeExtensionSnafu)?;
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                handlers = extension.handlers().len(),
                "starting runtime extension"
            );

            RuntimeExtensionServer::new(extension.into_router(), arguments.server_options())
                .run()
                .await
                .context(RunServerSnafu)
        }
    }
}
