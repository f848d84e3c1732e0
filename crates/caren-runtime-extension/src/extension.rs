//! The HTTP routes of a Cluster API runtime extension.
//!
//! Cluster API first calls the discovery route to learn about the registered
//! handlers and then calls each handler by name:
//!
//! - `/hooks.runtime.cluster.x-k8s.io/v1alpha1/discovery`
//! - `/hooks.runtime.cluster.x-k8s.io/v1alpha1/generatepatches/{name}`
//! - `/hooks.runtime.cluster.x-k8s.io/v1alpha1/discovervariables/{name}`
use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use caren_patches::{
    handlers::{MetaDiscoverVariables, MetaGeneratePatches},
    hooks::{
        self, DiscoverVariablesRequest, DiscoveryResponse, ExtensionHandler,
        GeneratePatchesRequest, Hook,
    },
};
use tracing::instrument;

use crate::constants::{DEFAULT_HANDLER_TIMEOUT_SECONDS, HOOKS_PATH_PREFIX};

/// The registered `GeneratePatches` and `DiscoverVariables` handlers, keyed by
/// their name.
#[derive(Default)]
pub struct RuntimeExtension {
    generate_patches: BTreeMap<String, MetaGeneratePatches>,
    discover_variables: BTreeMap<String, MetaDiscoverVariables>,
}

impl RuntimeExtension {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generate_patches(
        mut self,
        name: impl Into<String>,
        handler: MetaGeneratePatches,
    ) -> Self {
        self.generate_patches.insert(name.into(), handler);
        self
    }

    pub fn with_discover_variables(
        mut self,
        name: impl Into<String>,
        handler: MetaDiscoverVariables,
    ) -> Self {
        self.discover_variables.insert(name.into(), handler);
        self
    }

    /// Returns all registered handlers as advertised during discovery.
    pub fn handlers(&self) -> Vec<ExtensionHandler> {
        let discover_variables = self
            .discover_variables
            .keys()
            .map(|name| ExtensionHandler::new(name, Hook::DiscoverVariables));
        let generate_patches = self
            .generate_patches
            .keys()
            .map(|name| ExtensionHandler::new(name, Hook::GeneratePatches));

        discover_variables
            .chain(generate_patches)
            .map(|handler| handler.with_timeout_seconds(DEFAULT_HANDLER_TIMEOUT_SECONDS))
            .collect()
    }

    /// Turns the extension into a [`Router`] serving the discovery and hook
    /// routes.
    pub fn into_router(self) -> Router {
        let discovery_route = format!("{HOOKS_PATH_PREFIX}/discovery");
        let generate_patches_route = format!(
            "{HOOKS_PATH_PREFIX}/{hook}/{{name}}",
            hook = Hook::GeneratePatches.path_segment()
        );
        let discover_variables_route = format!(
            "{HOOKS_PATH_PREFIX}/{hook}/{{name}}",
            hook = Hook::DiscoverVariables.path_segment()
        );

        tracing::debug!(
            route = discovery_route,
            handlers = self.generate_patches.len() + self.discover_variables.len(),
            "registering runtime extension routes"
        );

        Router::new()
            .route(&discovery_route, get(discovery).post(discovery))
            .route(&generate_patches_route, post(generate_patches))
            .route(&discover_variables_route, post(discover_variables))
            .with_state(Arc::new(self))
    }
}

async fn discovery(State(extension): State<Arc<RuntimeExtension>>) -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse::success(extension.handlers()))
}

#[instrument(name = "generate_patches_route", skip(extension, request))]
async fn generate_patches(
    State(extension): State<Arc<RuntimeExtension>>,
    Path(name): Path<String>,
    Json(request): Json<GeneratePatchesRequest>,
) -> Response {
    let Some(handler) = extension.generate_patches.get(&name) else {
        return unknown_handler(&name);
    };

    Json(hooks::generate_patches(handler, &request)).into_response()
}

#[instrument(name = "discover_variables_route", skip(extension, request))]
async fn discover_variables(
    State(extension): State<Arc<RuntimeExtension>>,
    Path(name): Path<String>,
    Json(request): Json<DiscoverVariablesRequest>,
) -> Response {
    let Some(handler) = extension.discover_variables.get(&name) else {
        return unknown_handler(&name);
    };

    Json(hooks::discover_variables(handler, &request)).into_response()
}

fn unknown_handler(name: &str) -> Response {
    tracing::debug!(name, "received request for unknown handler");
    (StatusCode::NOT_FOUND, format!("unknown handler {name:?}")).into_response()
}
