//! Well-known names of the Cluster API runtime hooks API and topology field paths.

/// The API version of all runtime hook request and response types.
pub const RUNTIME_HOOKS_API_VERSION: &str = "hooks.runtime.cluster.x-k8s.io/v1alpha1";

/// The name of the variable Cluster API injects with topology information, like
/// the class names of machine deployments and machine pools.
pub const BUILTIN_VARIABLE_NAME: &str = "builtin";

/// The kind of the Cluster API `Cluster` object.
pub const CLUSTER_KIND: &str = "Cluster";

/// The kind of the Cluster API `MachineDeployment` object.
pub const MACHINE_DEPLOYMENT_KIND: &str = "MachineDeployment";

/// The kind of the Cluster API `MachinePool` object.
pub const MACHINE_POOL_KIND: &str = "MachinePool";

/// The field of a `Cluster` referencing the infrastructure cluster.
pub const CLUSTER_INFRASTRUCTURE_REF_FIELD_PATH: &str = "spec.infrastructureRef";

/// The field of a `Cluster` referencing the control plane.
pub const CLUSTER_CONTROL_PLANE_REF_FIELD_PATH: &str = "spec.controlPlaneRef";

/// The field of a v1beta1 control plane referencing its infrastructure machine template.
pub const CONTROL_PLANE_MACHINE_TEMPLATE_FIELD_PATH: &str = "spec.machineTemplate.infrastructureRef";

/// The field of a v1beta2 control plane referencing its infrastructure machine template.
pub const CONTROL_PLANE_MACHINE_TEMPLATE_V1BETA2_FIELD_PATH: &str =
    "spec.machineTemplate.spec.infrastructureRef";

/// The field of a machine deployment or pool referencing its infrastructure machine template.
pub const WORKER_INFRASTRUCTURE_REF_FIELD_PATH: &str = "spec.template.spec.infrastructureRef";

/// The field of a machine deployment or pool referencing its bootstrap config template.
pub const WORKER_BOOTSTRAP_CONFIG_REF_FIELD_PATH: &str = "spec.template.spec.bootstrap.configRef";
