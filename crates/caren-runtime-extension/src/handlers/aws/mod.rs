//! Mutators of the Cluster API AWS provider templates.
//!
//! Only the fields the mutators edit are modelled, everything else is captured
//! by the flattened `other` maps and written back unchanged.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::handlers::template::Template;

pub mod ami;
pub mod tags;

pub const AWS_INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta2";
pub const AWS_MACHINE_TEMPLATE_KIND: &str = "AWSMachineTemplate";
pub const AWS_CLUSTER_TEMPLATE_KIND: &str = "AWSClusterTemplate";

pub type AwsMachineTemplate = Template<AwsMachineSpec>;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AwsMachineSpec {
    #[serde(default)]
    pub ami: AmiReference,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AmiReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

pub type AwsClusterTemplate = Template<AwsClusterSpec>;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsClusterSpec {
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_tags: Map<String, Value>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}
