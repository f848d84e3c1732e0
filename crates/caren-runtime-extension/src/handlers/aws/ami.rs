use caren_patches::{
    handlers::{Mutator, MutatorError},
    patches::{self, BoxedError, Patch, PatchTarget},
    selectors::{ClassGlob, Selector},
    variables::Variables,
};

use crate::handlers::{
    CLUSTER_CONFIG_VARIABLE_NAME, WORKER_CONFIG_VARIABLE_NAME,
    aws::{AWS_INFRASTRUCTURE_API_VERSION, AWS_MACHINE_TEMPLATE_KIND, AwsMachineTemplate},
    config::AmiSpec,
};

/// Sets `spec.template.spec.ami.id` of `AWSMachineTemplate`s.
///
/// The control plane reads `clusterConfig.controlPlane.aws.ami`, workers read
/// `workerConfig.aws.ami`.
pub struct Ami {
    name: &'static str,
    selector: Selector,
    variable: &'static str,
    path: &'static [&'static str],
}

impl Ami {
    pub fn control_plane() -> Self {
        Self {
            name: "aws-control-plane-ami",
            selector: Selector::control_plane(
                AWS_INFRASTRUCTURE_API_VERSION,
                AWS_MACHINE_TEMPLATE_KIND,
            ),
            variable: CLUSTER_CONFIG_VARIABLE_NAME,
            path: &["controlPlane", "aws", "ami"],
        }
    }

    pub fn workers(class: ClassGlob) -> Self {
        Self {
            name: "aws-worker-ami",
            selector: Selector::machine_deployments(
                AWS_INFRASTRUCTURE_API_VERSION,
                AWS_MACHINE_TEMPLATE_KIND,
                class,
            ),
            variable: WORKER_CONFIG_VARIABLE_NAME,
            path: &["aws", "ami"],
        }
    }
}

impl Mutator for Ami {
    fn name(&self) -> &str {
        self.name
    }

    fn generate_patch(
        &self,
        target: &PatchTarget<'_>,
        variables: &Variables,
    ) -> Result<Patch, MutatorError> {
        let Some(ami) = variables.get::<AmiSpec, _>(self.variable, self.path)? else {
            tracing::trace!(variable = self.variable, "AMI not set, skipping");
            return Ok(Patch(Vec::new()));
        };

        Ok(patches::mutate_if_applicable(
            target,
            &self.selector,
            |template: &mut AwsMachineTemplate| {
                template.spec.template.spec.ami.id = Some(ami.id);
                Ok::<_, BoxedError>(())
            },
        )?)
    }
}
