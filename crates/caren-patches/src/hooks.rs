//! Wire types of the Cluster API runtime hooks API (`hooks.runtime.cluster.x-k8s.io/v1alpha1`)
//! and the adapters between them and the meta handlers in [`crate::handlers`].
//!
//! Only the hooks needed for topology mutation are modelled: discovery of the
//! extension handlers, `DiscoverVariables` and `GeneratePatches`.
use std::{collections::BTreeMap, error::Error as StdError};

use k8s_openapi::{
    ByteString, apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps,
};
use kube::core::TypeMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    constants::RUNTIME_HOOKS_API_VERSION,
    handlers::{MetaDiscoverVariables, MetaGeneratePatches, PatchedItem},
    selectors::HolderReference,
    variables::Variables,
};

/// The status of a hook response.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// A variable as sent by Cluster API. The value is an opaque JSON document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_from: Option<String>,
}

fn to_variables(variables: &[Variable]) -> impl Iterator<Item = (String, Value)> + '_ {
    variables
        .iter()
        .map(|variable| (variable.name.clone(), variable.value.clone()))
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePatchesRequest {
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    #[serde(default)]
    pub variables: Vec<Variable>,

    #[serde(default)]
    pub items: Vec<GeneratePatchesRequestItem>,
}

impl GeneratePatchesRequest {
    /// Builds the request scoped variable store.
    pub fn variables(&self) -> Variables {
        Variables::new(to_variables(&self.variables))
    }
}

/// A single generated template.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePatchesRequestItem {
    pub uid: String,
    pub holder_reference: HolderReference,
    pub object: Value,

    /// Item scoped variables, which override the request scoped ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

impl GeneratePatchesRequestItem {
    /// Builds the variable store of this item from the request scoped store.
    pub fn variables(&self, request_variables: &Variables) -> Variables {
        request_variables.with_overrides(to_variables(&self.variables))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, strum::Display)]
pub enum PatchType {
    #[serde(rename = "JSONPatch")]
    #[strum(serialize = "JSONPatch")]
    JsonPatch,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePatchesResponseItem {
    pub uid: String,
    pub patch_type: PatchType,

    /// The serialized patch, base64 encoded on the wire.
    pub patch: ByteString,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePatchesResponse {
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    pub status: ResponseStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub items: Vec<GeneratePatchesResponseItem>,
}

impl GeneratePatchesResponse {
    pub fn success(items: Vec<GeneratePatchesResponseItem>) -> Self {
        Self {
            type_meta: type_meta("GeneratePatchesResponse"),
            status: ResponseStatus::Success,
            message: String::new(),
            items,
        }
    }

    /// A failure response never carries any items.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            type_meta: type_meta("GeneratePatchesResponse"),
            status: ResponseStatus::Failure,
            message: message.into(),
            items: Vec::new(),
        }
    }

    /// Turns the outcome of a meta handler into a response. Any error results in
    /// a failure response without items.
    pub fn from_result<E>(result: Result<Vec<PatchedItem>, E>) -> Self
    where
        E: StdError + 'static,
    {
        let items = match result {
            Ok(items) => items,
            Err(err) => return Self::failure(snafu::Report::from_error(err).to_string()),
        };

        let encoded: Result<Vec<_>, _> = items
            .into_iter()
            .map(|item| {
                serde_json::to_vec(&item.patch).map(|patch| GeneratePatchesResponseItem {
                    uid: item.uid,
                    patch_type: PatchType::JsonPatch,
                    patch: ByteString(patch),
                })
            })
            .collect();

        match encoded {
            Ok(items) => Self::success(items),
            Err(err) => Self::failure(format!("failed to serialize patch: {err}")),
        }
    }

    /// Decodes the JSON patch of the item with the given `uid`, mostly useful in
    /// tests.
    pub fn patch_for(&self, uid: &str) -> Option<serde_json::Result<json_patch::Patch>> {
        self.items
            .iter()
            .find(|item| item.uid == uid)
            .map(|item| serde_json::from_slice(&item.patch.0))
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverVariablesRequest {
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

/// The schema of a cluster class variable.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct VariableSchema {
    #[serde(rename = "openAPIV3Schema")]
    pub open_api_v3_schema: JSONSchemaProps,
}

/// A variable declared by a runtime extension.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterClassVariable {
    pub name: String,
    pub required: bool,
    pub schema: VariableSchema,
}

impl ClusterClassVariable {
    pub fn new(name: impl Into<String>, required: bool, schema: JSONSchemaProps) -> Self {
        Self {
            name: name.into(),
            required,
            schema: VariableSchema {
                open_api_v3_schema: schema,
            },
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverVariablesResponse {
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    pub status: ResponseStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub variables: Vec<ClusterClassVariable>,
}

impl DiscoverVariablesResponse {
    pub fn success(variables: Vec<ClusterClassVariable>) -> Self {
        Self {
            type_meta: type_meta("DiscoverVariablesResponse"),
            status: ResponseStatus::Success,
            message: String::new(),
            variables,
        }
    }
}

/// How Cluster API reacts when a handler call fails.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum FailurePolicy {
    Ignore,

    #[default]
    Fail,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionHook {
    pub api_version: String,
    pub hook: String,
}

/// A handler registered by the runtime extension, returned by the discovery
/// endpoint.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionHandler {
    pub name: String,
    pub request_hook: GroupVersionHook,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

impl ExtensionHandler {
    pub fn new(name: impl Into<String>, hook: Hook) -> Self {
        Self {
            name: name.into(),
            request_hook: GroupVersionHook {
                api_version: RUNTIME_HOOKS_API_VERSION.to_owned(),
                hook: hook.to_string(),
            },
            timeout_seconds: None,
            failure_policy: None,
        }
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: i32) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = Some(failure_policy);
        self
    }
}

/// The hooks a topology mutation extension can serve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum Hook {
    DiscoverVariables,
    GeneratePatches,
}

impl Hook {
    /// The lower case path segment of the hook, e.g. `generatepatches`.
    pub fn path_segment(&self) -> String {
        self.to_string().to_lowercase()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    #[serde(flatten)]
    pub type_meta: TypeMeta,

    pub status: ResponseStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub handlers: Vec<ExtensionHandler>,
}

impl DiscoveryResponse {
    pub fn success(handlers: Vec<ExtensionHandler>) -> Self {
        Self {
            type_meta: type_meta("DiscoveryResponse"),
            status: ResponseStatus::Success,
            message: String::new(),
            handlers,
        }
    }
}

fn type_meta(kind: &str) -> TypeMeta {
    TypeMeta {
        api_version: RUNTIME_HOOKS_API_VERSION.to_owned(),
        kind: kind.to_owned(),
    }
}

/// Runs the `GeneratePatches` hook against `handler`.
pub fn generate_patches(
    handler: &MetaGeneratePatches,
    request: &GeneratePatchesRequest,
) -> GeneratePatchesResponse {
    let response = GeneratePatchesResponse::from_result(handler.generate_patches(request));
    if response.status == ResponseStatus::Failure {
        tracing::warn!(reason = response.message, "failed to generate patches");
    }
    response
}

/// Runs the `DiscoverVariables` hook against `handler`.
pub fn discover_variables(
    handler: &MetaDiscoverVariables,
    _request: &DiscoverVariablesRequest,
) -> DiscoverVariablesResponse {
    DiscoverVariablesResponse::success(handler.variables().to_vec())
}
