use std::collections::BTreeMap;

use caren_patches::{
    handlers::{Mutator, MutatorError},
    patches::{self, BoxedError, Patch, PatchTarget},
    selectors::Selector,
    variables::Variables,
};
use serde_json::Value;

use crate::handlers::{
    CLUSTER_CONFIG_VARIABLE_NAME,
    aws::{AWS_CLUSTER_TEMPLATE_KIND, AWS_INFRASTRUCTURE_API_VERSION, AwsClusterTemplate},
};

/// Merges `clusterConfig.aws.additionalTags` into `spec.template.spec.additionalTags`
/// of the `AWSClusterTemplate`. Tags already present in the template are
/// overridden.
pub struct AdditionalTags {
    selector: Selector,
}

impl AdditionalTags {
    pub fn new() -> Self {
        Self {
            selector: Selector::infrastructure_cluster(
                AWS_INFRASTRUCTURE_API_VERSION,
                AWS_CLUSTER_TEMPLATE_KIND,
            ),
        }
    }
}

impl Default for AdditionalTags {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutator for AdditionalTags {
    fn name(&self) -> &str {
        "aws-additional-tags"
    }

    fn generate_patch(
        &self,
        target: &PatchTarget<'_>,
        variables: &Variables,
    ) -> Result<Patch, MutatorError> {
        let Some(tags) = variables.get::<BTreeMap<String, String>, _>(
            CLUSTER_CONFIG_VARIABLE_NAME,
            &["aws", "additionalTags"],
        )?
        else {
            return Ok(Patch(Vec::new()));
        };

        Ok(patches::mutate_if_applicable(
            target,
            &self.selector,
            |template: &mut AwsClusterTemplate| {
                let additional_tags = &mut template.spec.template.spec.additional_tags;
                for (key, value) in tags {
                    additional_tags.insert(key, Value::String(value));
                }
                Ok::<_, BoxedError>(())
            },
        )?)
    }
}

#[cfg(test)]
mod tests {
    use caren_patches::{selectors::HolderReference, variables::Builtin};
    use serde_json::json;

    use super::*;

    fn infrastructure_cluster_holder() -> HolderReference {
        HolderReference {
            api_version: "cluster.x-k8s.io/v1beta2".to_owned(),
            kind: "Cluster".to_owned(),
            namespace: "default".to_owned(),
            name: "my-cluster".to_owned(),
            field_path: "spec.infrastructureRef".to_owned(),
        }
    }

    #[test]
    fn merges_tags() {
        let holder = infrastructure_cluster_holder();
        let object = json!({
            "apiVersion": AWS_INFRASTRUCTURE_API_VERSION,
            "kind": AWS_CLUSTER_TEMPLATE_KIND,
            "spec": {
                "template": {
                    "spec": {
                        "region": "eu-central-1",
                        "additionalTags": { "team": "platform", "env": "dev" }
                    }
                }
            }
        });
        let target = PatchTarget::new("uid", &holder, &object, &Builtin::default());
        let variables = Variables::new([(
            CLUSTER_CONFIG_VARIABLE_NAME,
            json!({ "aws": { "additionalTags": { "env": "prod", "owner": "alice" } } }),
        )]);

        let patch = AdditionalTags::new()
            .generate_patch(&target, &variables)
            .expect("patch must be generated");

        let mut patched = object.clone();
        caren_patches::json_patch::patch(&mut patched, &patch.0).expect("patch must apply");
        assert_eq!(
            patched["spec"]["template"]["spec"]["additionalTags"],
            json!({ "team": "platform", "env": "prod", "owner": "alice" })
        );
        assert_eq!(
            patched["spec"]["template"]["spec"]["region"],
            json!("eu-central-1")
        );
    }

    #[test]
    fn existing_tags_yield_no_patch() {
        let holder = infrastructure_cluster_holder();
        let object = json!({
            "apiVersion": AWS_INFRASTRUCTURE_API_VERSION,
            "kind": AWS_CLUSTER_TEMPLATE_KIND,
            "spec": { "template": { "spec": { "additionalTags": { "env": "prod" } } } }
        });
        let target = PatchTarget::new("uid", &holder, &object, &Builtin::default());
        let variables = Variables::new([(
            CLUSTER_CONFIG_VARIABLE_NAME,
            json!({ "aws": { "additionalTags": { "env": "prod" } } }),
        )]);

        let patch = AdditionalTags::new()
            .generate_patch(&target, &variables)
            .expect("patch must be generated");

        assert!(patch.0.is_empty());
    }
}
