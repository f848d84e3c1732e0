//! Mutators configuring the NTP servers of kubeadm bootstrapped nodes from
//! `clusterConfig.ntp`.
use caren_patches::{
    handlers::{Mutator, MutatorError},
    patches::{self, BoxedError, Patch, PatchTarget},
    selectors::{ClassGlob, Selector},
    variables::Variables,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handlers::{CLUSTER_CONFIG_VARIABLE_NAME, config::NtpConfig, template::Template};

pub const KUBEADM_CONTROL_PLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta2";
pub const KUBEADM_CONTROL_PLANE_TEMPLATE_KIND: &str = "KubeadmControlPlaneTemplate";
pub const KUBEADM_BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1beta2";
pub const KUBEADM_CONFIG_TEMPLATE_KIND: &str = "KubeadmConfigTemplate";

const NTP_PATH: &[&str] = &["ntp"];

pub type KubeadmControlPlaneTemplate = Template<KubeadmControlPlaneSpec>;
pub type KubeadmConfigTemplate = Template<KubeadmConfigSpec>;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeadmControlPlaneSpec {
    #[serde(default)]
    pub kubeadm_config_spec: KubeadmConfigSpec,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct KubeadmConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<Ntp>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Ntp {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl KubeadmConfigSpec {
    fn set_ntp_servers(&mut self, servers: Vec<String>) {
        let ntp = self.ntp.get_or_insert_with(Ntp::default);
        ntp.servers = servers;
        ntp.enabled = Some(true);
    }
}

fn resolve_ntp(variables: &Variables) -> Result<Option<NtpConfig>, MutatorError> {
    Ok(variables.get::<NtpConfig, _>(CLUSTER_CONFIG_VARIABLE_NAME, NTP_PATH)?)
}

/// Sets the NTP servers of the control plane nodes in the
/// `KubeadmControlPlaneTemplate`.
pub struct ControlPlaneNtp {
    selector: Selector,
}

impl ControlPlaneNtp {
    pub fn new() -> Self {
        Self {
            selector: Selector::control_plane(
                KUBEADM_CONTROL_PLANE_API_VERSION,
                KUBEADM_CONTROL_PLANE_TEMPLATE_KIND,
            ),
        }
    }
}

impl Default for ControlPlaneNtp {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator for ControlPlaneNtp {
    fn name(&self) -> &str {
        "control-plane-ntp"
    }

    fn generate_patch(
        &self,
        target: &PatchTarget<'_>,
        variables: &Variables,
    ) -> Result<Patch, MutatorError> {
        let Some(ntp) = resolve_ntp(variables)? else {
            return Ok(Patch(Vec::new()));
        };

        Ok(patches::mutate_if_applicable(
            target,
            &self.selector,
            |template: &mut KubeadmControlPlaneTemplate| {
                template
                    .spec
                    .template
                    .spec
                    .kubeadm_config_spec
                    .set_ntp_servers(ntp.servers);
                Ok::<_, BoxedError>(())
            },
        )?)
    }
}

/// Sets the NTP servers of worker nodes in `KubeadmConfigTemplate`s of machine
/// deployments and machine pools matching the class glob.
pub struct WorkerNtp {
    selector: Selector,
}

impl WorkerNtp {
    pub fn new(class: ClassGlob) -> Self {
        Self {
            selector: Selector::machine_deployments(
                KUBEADM_BOOTSTRAP_API_VERSION,
                KUBEADM_CONFIG_TEMPLATE_KIND,
                class.clone(),
            )
            .with_machine_pool_class(class),
        }
    }
}

impl Mutator for WorkerNtp {
    fn name(&self) -> &str {
        "worker-ntp"
    }

    fn generate_patch(
        &self,
        target: &PatchTarget<'_>,
        variables: &Variables,
    ) -> Result<Patch, MutatorError> {
        let Some(ntp) = resolve_ntp(variables)? else {
            return Ok(Patch(Vec::new()));
        };

        Ok(patches::mutate_if_applicable(
            target,
            &self.selector,
            |template: &mut KubeadmConfigTemplate| {
                template.spec.template.spec.set_ntp_servers(ntp.servers);
                Ok::<_, BoxedError>(())
            },
        )?)
    }
}
