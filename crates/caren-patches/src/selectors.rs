//! Selectors decide whether a generated template is a valid target for a mutator.
//!
//! Every template in a request is referenced from a holder object, e.g. the
//! infrastructure machine template of the control plane is referenced by the
//! control plane object at `spec.machineTemplate.spec.infrastructureRef`
//! (`spec.machineTemplate.infrastructureRef` before v1beta2). The holder
//! reference is classified into exactly one [`HolderRole`], which is then matched
//! against the role flags of a [`Selector`].
//!
//! A selector without any role flag matches nothing.
use std::fmt::Display;

use kube::core::TypeMeta;
use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::{
    constants::{
        CLUSTER_CONTROL_PLANE_REF_FIELD_PATH, CLUSTER_INFRASTRUCTURE_REF_FIELD_PATH, CLUSTER_KIND,
        CONTROL_PLANE_MACHINE_TEMPLATE_FIELD_PATH, CONTROL_PLANE_MACHINE_TEMPLATE_V1BETA2_FIELD_PATH,
        MACHINE_DEPLOYMENT_KIND, MACHINE_POOL_KIND, WORKER_BOOTSTRAP_CONFIG_REF_FIELD_PATH,
        WORKER_INFRASTRUCTURE_REF_FIELD_PATH,
    },
    variables::Builtin,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to compile class glob {glob:?}"))]
    CompileClassGlob { source: regex::Error, glob: String },
}

/// Identifies the object holding the reference to a generated template and the
/// field the reference is stored in.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HolderReference {
    pub api_version: String,
    pub kind: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub name: String,

    pub field_path: String,
}

/// The role a template plays in the cluster topology.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HolderRole {
    /// The control plane template itself or the infrastructure machine template
    /// of the control plane.
    ControlPlane,

    /// The infrastructure cluster template.
    InfrastructureCluster,

    /// A template of a machine deployment, the class is taken from the `builtin`
    /// variable.
    MachineDeployment { class: Option<String> },

    /// A template of a machine pool, the class is taken from the `builtin`
    /// variable.
    MachinePool { class: Option<String> },

    /// The holder reference doesn't point at a known topology field.
    Unknown,
}

impl HolderRole {
    pub fn classify(holder: &HolderReference, builtin: &Builtin) -> Self {
        let field_path = holder.field_path.as_str();

        match holder.kind.as_str() {
            CLUSTER_KIND if field_path == CLUSTER_INFRASTRUCTURE_REF_FIELD_PATH => {
                Self::InfrastructureCluster
            }
            CLUSTER_KIND if field_path == CLUSTER_CONTROL_PLANE_REF_FIELD_PATH => Self::ControlPlane,
            MACHINE_DEPLOYMENT_KIND if is_worker_field_path(field_path) => {
                Self::MachineDeployment {
                    class: builtin
                        .machine_deployment
                        .as_ref()
                        .and_then(|md| md.class.clone()),
                }
            }
            MACHINE_POOL_KIND if is_worker_field_path(field_path) => Self::MachinePool {
                class: builtin.machine_pool.as_ref().and_then(|mp| mp.class.clone()),
            },
            // The control plane kind depends on the provider, the field path does not.
            _ if is_control_plane_machine_template_field_path(field_path) => Self::ControlPlane,
            _ => Self::Unknown,
        }
    }
}

fn is_control_plane_machine_template_field_path(field_path: &str) -> bool {
    field_path == CONTROL_PLANE_MACHINE_TEMPLATE_V1BETA2_FIELD_PATH
        || field_path == CONTROL_PLANE_MACHINE_TEMPLATE_FIELD_PATH
}

fn is_worker_field_path(field_path: &str) -> bool {
    field_path == WORKER_INFRASTRUCTURE_REF_FIELD_PATH
        || field_path == WORKER_BOOTSTRAP_CONFIG_REF_FIELD_PATH
}

/// A shell style glob (`*` and `?`) matching machine deployment or pool class
/// names.
#[derive(Clone, Debug)]
pub struct ClassGlob {
    glob: String,
    regex: Regex,
}

impl ClassGlob {
    pub fn new(glob: impl Into<String>) -> Result<Self> {
        let glob = glob.into();

        let mut pattern = String::from("^");
        let mut literal = String::new();
        for c in glob.chars() {
            match c {
                '*' | '?' => {
                    pattern.push_str(&regex::escape(&literal));
                    literal.clear();
                    pattern.push_str(if c == '*' { ".*" } else { "." });
                }
                c => literal.push(c),
            }
        }
        pattern.push_str(&regex::escape(&literal));
        pattern.push('$');

        let regex = Regex::new(&pattern).context(CompileClassGlobSnafu { glob: &glob })?;
        Ok(Self { glob, regex })
    }

    /// A glob matching every class.
    pub fn any() -> Result<Self> {
        Self::new("*")
    }

    pub fn matches(&self, class: &str) -> bool {
        self.regex.is_match(class)
    }
}

impl PartialEq for ClassGlob {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl Eq for ClassGlob {}

impl Display for ClassGlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.glob)
    }
}

/// The role flags of a [`Selector`]. They are OR'd against the classified
/// [`HolderRole`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchResources {
    pub control_plane: bool,
    pub infrastructure_cluster: bool,
    pub machine_deployment_class: Option<ClassGlob>,
    pub machine_pool_class: Option<ClassGlob>,
}

/// A declarative rule describing which templates a mutator may edit.
///
/// `api_version` and `kind` are compared with the type of the template (not the
/// holder). An empty value matches any type.
///
/// ```
/// use caren_patches::selectors::{ClassGlob, Selector};
///
/// let control_plane = Selector::control_plane(
///     "infrastructure.cluster.x-k8s.io/v1beta2",
///     "AWSMachineTemplate",
/// );
/// let workers = Selector::machine_deployments(
///     "infrastructure.cluster.x-k8s.io/v1beta2",
///     "AWSMachineTemplate",
///     ClassGlob::new("gpu-*").expect("glob must compile"),
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector {
    pub api_version: String,
    pub kind: String,
    pub match_resources: MatchResources,
}

impl Selector {
    /// Selects templates of the given type which belong to the control plane.
    pub fn control_plane(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            match_resources: MatchResources {
                control_plane: true,
                ..Default::default()
            },
        }
    }

    /// Selects the infrastructure cluster template of the given type.
    pub fn infrastructure_cluster(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            match_resources: MatchResources {
                infrastructure_cluster: true,
                ..Default::default()
            },
        }
    }

    /// Selects templates of the given type which belong to machine deployments
    /// with a class matching `class`.
    pub fn machine_deployments(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        class: ClassGlob,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            match_resources: MatchResources {
                machine_deployment_class: Some(class),
                ..Default::default()
            },
        }
    }

    /// Selects templates of the given type which belong to machine pools with a
    /// class matching `class`.
    pub fn machine_pools(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        class: ClassGlob,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            match_resources: MatchResources {
                machine_pool_class: Some(class),
                ..Default::default()
            },
        }
    }

    pub fn with_machine_deployment_class(mut self, class: ClassGlob) -> Self {
        self.match_resources.machine_deployment_class = Some(class);
        self
    }

    pub fn with_machine_pool_class(mut self, class: ClassGlob) -> Self {
        self.match_resources.machine_pool_class = Some(class);
        self
    }

    /// Returns whether a template of type `type_meta` with the holder role
    /// `role` is selected.
    pub fn matches(&self, type_meta: &TypeMeta, role: &HolderRole) -> bool {
        if !self.api_version.is_empty() && self.api_version != type_meta.api_version {
            return false;
        }

        if !self.kind.is_empty() && self.kind != type_meta.kind {
            return false;
        }

        let MatchResources {
            control_plane,
            infrastructure_cluster,
            machine_deployment_class,
            machine_pool_class,
        } = &self.match_resources;

        match role {
            HolderRole::ControlPlane => *control_plane,
            HolderRole::InfrastructureCluster => *infrastructure_cluster,
            HolderRole::MachineDeployment { class } => {
                matches_class(machine_deployment_class.as_ref(), class.as_deref())
            }
            HolderRole::MachinePool { class } => {
                matches_class(machine_pool_class.as_ref(), class.as_deref())
            }
            HolderRole::Unknown => false,
        }
    }
}

fn matches_class(glob: Option<&ClassGlob>, class: Option<&str>) -> bool {
    match (glob, class) {
        (Some(glob), Some(class)) => glob.matches(class),
        _ => false,
    }
}
