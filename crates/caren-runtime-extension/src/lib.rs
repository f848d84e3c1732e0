//! A Cluster API runtime extension serving topology mutation hooks.
//!
//! The extension answers `DiscoverVariables` and `GeneratePatches` requests of
//! the Cluster API topology controller using the meta handlers of
//! [`caren_patches`]. The server is fully compatible with the [`tracing`] crate
//! and emits debug level tracing data.
//!
//! ```no_run
//! use caren_runtime_extension::{RuntimeExtensionServer, handlers, options::ServerOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let router = handlers::runtime_extension()?.into_router();
//! let options = ServerOptions::builder().bind_port(9443).build();
//!
//! RuntimeExtensionServer::new(router, options).run().await?;
//! # Ok(())
//! # }
//! ```
use std::net::SocketAddr;

use axum::{Router, routing::get};
use futures_util::{FutureExt as _, future::Either, pin_mut, select};
use snafu::{ResultExt, Snafu};
use tokio::{
    net::TcpListener,
    signal::unix::{SignalKind, signal},
};
use tower_http::trace::TraceLayer;

use crate::{
    options::{ServerOptions, TlsOption},
    tls::TlsServer,
};

pub mod cli;
pub mod constants;
pub mod extension;
pub mod handlers;
pub mod logging;
pub mod options;
pub mod tls;

pub use crate::extension::RuntimeExtension;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create {signal} listener"))]
    CreateSignalListener {
        source: std::io::Error,
        signal: String,
    },

    #[snafu(display("failed to create TCP listener by binding to socket address {socket_addr:?}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to serve HTTP"))]
    ServeHttp { source: std::io::Error },

    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::TlsServerError },
}

/// A ready-to-use runtime extension server.
///
/// The server serves the provided [`Router`], usually created by
/// [`RuntimeExtension::into_router`], either via plain HTTP or via HTTPS,
/// depending on the [`ServerOptions`]. All routes are traced, except for the
/// `/health` route.
pub struct RuntimeExtensionServer {
    router: Router,
    options: ServerOptions,
}

impl RuntimeExtensionServer {
    pub fn new(router: Router, options: ServerOptions) -> Self {
        tracing::trace!("create new runtime extension server");

        // The health route is below the TraceLayer so as not to be instrumented
        let router = router
            .layer(TraceLayer::new_for_http())
            .route("/health", get(|| async { "ok" }));

        Self { router, options }
    }

    /// Runs the server until it fails or a SIGINT or SIGTERM is received.
    ///
    /// This does not implement graceful shutdown of in-flight requests.
    pub async fn run(self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt())
            .context(CreateSignalListenerSnafu { signal: "SIGINT" })?;
        let mut sigterm = signal(SignalKind::terminate())
            .context(CreateSignalListenerSnafu { signal: "SIGTERM" })?;

        tracing::debug!("created unix signal handlers");

        let future_server = self.run_server();
        let future_signal = async {
            select! {
                signal = sigint.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGINT");
                    }
                },
                signal = sigterm.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGTERM");
                    }
                },
            };
        };

        // select requires Future + Unpin
        pin_mut!(future_server);
        pin_mut!(future_signal);

        match futures_util::future::select(future_server, future_signal).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                tracing::info!("stopping runtime extension server");
                Ok(())
            }
        }
    }

    async fn run_server(self) -> Result<()> {
        let socket_addr = self.options.socket_addr;

        match &self.options.tls {
            TlsOption::Disabled => {
                let tcp_listener = TcpListener::bind(socket_addr)
                    .await
                    .context(BindTcpListenerSnafu { socket_addr })?;

                tracing::info!(%socket_addr, "serving HTTP");
                axum::serve(tcp_listener, self.router)
                    .await
                    .context(ServeHttpSnafu)
            }
            TlsOption::Mount {
                certificate_path,
                private_key_path,
            } => {
                let tls_server =
                    TlsServer::new(socket_addr, self.router, certificate_path, private_key_path)
                        .await
                        .context(CreateTlsServerSnafu)?;

                tls_server.run().await.context(RunTlsServerSnafu)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use caren_patches::hooks::{GeneratePatchesResponse, ResponseStatus};
    use indoc::indoc;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn router() -> Router {
        let extension = handlers::runtime_extension().expect("extension must be created");
        RuntimeExtensionServer::new(extension.into_router(), ServerOptions::default()).router
    }

    async fn call(method: Method, uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .expect("request must be valid");

        let response = router()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");

        (status, body.to_vec())
    }

    const GENERATE_PATCHES_REQUEST: &str = indoc! {r#"
        {
          "apiVersion": "hooks.runtime.cluster.x-k8s.io/v1alpha1",
          "kind": "GeneratePatchesRequest",
          "variables": [
            {
              "name": "clusterConfig",
              "value": { "controlPlane": { "aws": { "ami": { "id": "ami-123" } } } }
            },
            {
              "name": "builtin",
              "value": { "cluster": { "name": "my-cluster", "namespace": "default" } }
            }
          ],
          "items": [
            {
              "uid": "cp-uid",
              "holderReference": {
                "apiVersion": "controlplane.cluster.x-k8s.io/v1beta2",
                "kind": "KubeadmControlPlane",
                "namespace": "default",
                "name": "my-cluster",
                "fieldPath": "spec.machineTemplate.spec.infrastructureRef"
              },
              "object": {
                "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta2",
                "kind": "AWSMachineTemplate",
                "spec": { "template": { "spec": { "instanceType": "m5.xlarge" } } }
              }
            },
            {
              "uid": "md-uid",
              "holderReference": {
                "apiVersion": "cluster.x-k8s.io/v1beta2",
                "kind": "MachineDeployment",
                "namespace": "default",
                "name": "my-cluster-md-0",
                "fieldPath": "spec.template.spec.infrastructureRef"
              },
              "object": {
                "apiVersion": "infrastructure.cluster.x-k8s.io/v1beta2",
                "kind": "AWSMachineTemplate",
                "spec": { "template": { "spec": { "instanceType": "m5.xlarge" } } }
              },
              "variables": [
                {
                  "name": "builtin",
                  "value": { "machineDeployment": { "class": "default-worker" } }
                }
              ]
            }
          ]
        }
    "#};

    #[tokio::test]
    async fn health() {
        let (status, body) = call(Method::GET, "/health", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn discovery() {
        let (status, body) = call(
            Method::POST,
            "/hooks.runtime.cluster.x-k8s.io/v1alpha1/discovery",
            "{}",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&body).expect("response must be JSON");
        assert_eq!(response["status"], "Success");
        assert_eq!(
            response["handlers"],
            json!([
                {
                    "name": "discover-variables",
                    "requestHook": {
                        "apiVersion": "hooks.runtime.cluster.x-k8s.io/v1alpha1",
                        "hook": "DiscoverVariables"
                    },
                    "timeoutSeconds": 10
                },
                {
                    "name": "generate-patches",
                    "requestHook": {
                        "apiVersion": "hooks.runtime.cluster.x-k8s.io/v1alpha1",
                        "hook": "GeneratePatches"
                    },
                    "timeoutSeconds": 10
                }
            ])
        );
    }

    #[tokio::test]
    async fn generate_patches() {
        let (status, body) = call(
            Method::POST,
            "/hooks.runtime.cluster.x-k8s.io/v1alpha1/generatepatches/generate-patches",
            GENERATE_PATCHES_REQUEST,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response: GeneratePatchesResponse =
            serde_json::from_slice(&body).expect("response must deserialize");
        assert_eq!(response.status, ResponseStatus::Success);
        assert_eq!(response.items.len(), 1);

        let patch = response
            .patch_for("cp-uid")
            .expect("control plane must be patched")
            .expect("patch must decode");
        assert_eq!(
            serde_json::to_value(patch).expect("patch must serialize"),
            json!([{ "op": "add", "path": "/spec/template/spec/ami/id", "value": "ami-123" }])
        );
    }

    #[tokio::test]
    async fn generate_patches_failure() {
        let request = GENERATE_PATCHES_REQUEST.replace(r#"{ "id": "ami-123" }"#, "42");
        let (status, body) = call(
            Method::POST,
            "/hooks.runtime.cluster.x-k8s.io/v1alpha1/generatepatches/generate-patches",
            &request,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response: GeneratePatchesResponse =
            serde_json::from_slice(&body).expect("response must deserialize");
        assert_eq!(response.status, ResponseStatus::Failure);
        assert!(!response.message.is_empty());
        assert!(response.items.is_empty());
    }

    #[tokio::test]
    async fn discover_variables() {
        let (status, body) = call(
            Method::POST,
            "/hooks.runtime.cluster.x-k8s.io/v1alpha1/discovervariables/discover-variables",
            "{}",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response: Value = serde_json::from_slice(&body).expect("response must be JSON");
        assert_eq!(response["kind"], "DiscoverVariablesResponse");
        assert_eq!(response["variables"][0]["name"], "clusterConfig");
        assert_eq!(response["variables"][1]["name"], "workerConfig");
        assert_eq!(
            response["variables"][0]["schema"]["openAPIV3Schema"]["type"],
            "object"
        );
    }

    #[tokio::test]
    async fn unknown_handler() {
        let (status, _) = call(
            Method::POST,
            "/hooks.runtime.cluster.x-k8s.io/v1alpha1/generatepatches/does-not-exist",
            "{}",
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
