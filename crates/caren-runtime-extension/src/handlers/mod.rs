//! The mutators and variable declarations served by this runtime extension.
//!
//! All mutators read their configuration from the `clusterConfig` and
//! `workerConfig` variables, which are declared by [`declarations`].
use caren_patches::{
    handlers::{self, MetaDiscoverVariables, MetaGeneratePatches, Mutator, VariableDeclaration},
    hooks::ClusterClassVariable,
    schema,
    selectors::{self, ClassGlob},
};
use snafu::{ResultExt, Snafu};

use crate::RuntimeExtension;

pub mod aws;
pub mod config;
pub mod ntp;
pub mod template;

pub use config::{ClusterConfig, WorkerConfig};

/// The name of the variable configuring the whole cluster.
pub const CLUSTER_CONFIG_VARIABLE_NAME: &str = "clusterConfig";

/// The name of the variable configuring workers, usually overridden per
/// machine deployment.
pub const WORKER_CONFIG_VARIABLE_NAME: &str = "workerConfig";

/// The name of the `GeneratePatches` handler.
pub const GENERATE_PATCHES_HANDLER_NAME: &str = "generate-patches";

/// The name of the `DiscoverVariables` handler.
pub const DISCOVER_VARIABLES_HANDLER_NAME: &str = "discover-variables";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create mutators"))]
    CreateMutators { source: selectors::Error },

    #[snafu(display("failed to compose variable declarations"))]
    ComposeDeclarations { source: handlers::Error },
}

/// Creates the runtime extension with all mutators and declarations registered.
pub fn runtime_extension() -> Result<RuntimeExtension, Error> {
    let generate_patches = MetaGeneratePatches::new(mutators().context(CreateMutatorsSnafu)?);
    let discover_variables =
        MetaDiscoverVariables::new(declarations()).context(ComposeDeclarationsSnafu)?;

    Ok(RuntimeExtension::new()
        .with_generate_patches(GENERATE_PATCHES_HANDLER_NAME, generate_patches)
        .with_discover_variables(DISCOVER_VARIABLES_HANDLER_NAME, discover_variables))
}

/// Returns all mutators in the order their operations are applied.
pub fn mutators() -> Result<Vec<Box<dyn Mutator>>, selectors::Error> {
    let any_class = ClassGlob::any()?;

    Ok(vec![
        Box::new(aws::tags::AdditionalTags::new()),
        Box::new(aws::ami::Ami::control_plane()),
        Box::new(aws::ami::Ami::workers(any_class.clone())),
        Box::new(ntp::ControlPlaneNtp::new()),
        Box::new(ntp::WorkerNtp::new(any_class)),
    ])
}

/// Returns all variable declarations.
pub fn declarations() -> Vec<Box<dyn VariableDeclaration>> {
    vec![
        Box::new(ClusterConfigDeclaration),
        Box::new(WorkerConfigDeclaration),
    ]
}

pub struct ClusterConfigDeclaration;

impl VariableDeclaration for ClusterConfigDeclaration {
    fn name(&self) -> &str {
        "cluster-config"
    }

    fn variables(&self) -> Result<Vec<ClusterClassVariable>, schema::Error> {
        Ok(vec![ClusterClassVariable::new(
            CLUSTER_CONFIG_VARIABLE_NAME,
            false,
            schema::openapi_schema::<ClusterConfig>()?,
        )])
    }
}

pub struct WorkerConfigDeclaration;

impl VariableDeclaration for WorkerConfigDeclaration {
    fn name(&self) -> &str {
        "worker-config"
    }

    fn variables(&self) -> Result<Vec<ClusterClassVariable>, schema::Error> {
        Ok(vec![ClusterClassVariable::new(
            WORKER_CONFIG_VARIABLE_NAME,
            false,
            schema::openapi_schema::<WorkerConfig>()?,
        )])
    }
}

#[cfg(test)]
mod tests {
    use caren_patches::{
        hooks::{GeneratePatchesRequest, GeneratePatchesRequestItem, Variable},
        selectors::HolderReference,
    };
    use serde_json::{Value, json};

    use super::*;

    fn variable(name: &str, value: Value) -> Variable {
        Variable {
            name: name.to_owned(),
            value,
            definition_from: None,
        }
    }

    #[test]
    fn mutator_order() {
        let handler = MetaGeneratePatches::new(mutators().expect("globs must compile"));

        assert_eq!(
            handler.mutator_names().collect::<Vec<_>>(),
            [
                "aws-additional-tags",
                "aws-control-plane-ami",
                "aws-worker-ami",
                "control-plane-ntp",
                "worker-ntp"
            ]
        );
    }

    #[test]
    fn declared_variables() {
        let handler =
            MetaDiscoverVariables::new(declarations()).expect("declarations must not conflict");

        let variables = handler.variables();
        assert_eq!(variables.len(), 2);
        assert_eq!(variables[0].name, CLUSTER_CONFIG_VARIABLE_NAME);
        assert_eq!(variables[1].name, WORKER_CONFIG_VARIABLE_NAME);

        let cluster_config = &variables[0].schema.open_api_v3_schema;
        assert_eq!(cluster_config.type_.as_deref(), Some("object"));

        let properties = cluster_config
            .properties
            .as_ref()
            .expect("clusterConfig must have properties");
        for property in ["aws", "controlPlane", "ntp"] {
            assert!(properties.contains_key(property), "missing {property}");
        }
    }

    #[test]
    fn worker_config_is_taken_from_item_variables() {
        let handler = MetaGeneratePatches::new(mutators().expect("globs must compile"));
        let worker = |uid: &str, ami: &str| GeneratePatchesRequestItem {
            uid: uid.to_owned(),
            holder_reference: HolderReference {
                api_version: "cluster.x-k8s.io/v1beta2".to_owned(),
                kind: "MachineDeployment".to_owned(),
                field_path: "spec.template.spec.infrastructureRef".to_owned(),
                ..Default::default()
            },
            object: json!({
                "apiVersion": aws::AWS_INFRASTRUCTURE_API_VERSION,
                "kind": aws::AWS_MACHINE_TEMPLATE_KIND,
                "spec": { "template": { "spec": { "ami": { "id": "ami-default" } } } }
            }),
            variables: vec![
                variable(
                    "builtin",
                    json!({ "machineDeployment": { "class": "default-worker" } }),
                ),
                variable(
                    WORKER_CONFIG_VARIABLE_NAME,
                    json!({ "aws": { "ami": { "id": ami } } }),
                ),
            ],
        };
        let request = GeneratePatchesRequest {
            variables: vec![variable(
                "builtin",
                json!({ "cluster": { "name": "my-cluster" } }),
            )],
            items: vec![worker("md-0", "ami-gpu"), worker("md-1", "ami-default")],
            ..Default::default()
        };

        let items = handler
            .generate_patches(&request)
            .expect("patches must be generated");

        // md-1 already uses the requested AMI
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uid, "md-0");
        assert_eq!(
            serde_json::to_value(&items[0].patch).expect("patch must serialize"),
            json!([{ "op": "replace", "path": "/spec/template/spec/ami/id", "value": "ami-gpu" }])
        );
    }
}
