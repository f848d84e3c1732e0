//! The shapes of the `clusterConfig` and `workerConfig` variables.
//!
//! Mutators don't decode the whole variable, but only the part they need using
//! a path, e.g. `["controlPlane", "aws", "ami"]`. The types here are used to
//! declare the variable schemas and to decode those parts.
use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Configuration of the whole cluster.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// AWS specific cluster configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsClusterConfig>,

    /// Configuration of the control plane nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<NodeConfig>,

    /// Time synchronization of all nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntp: Option<NtpConfig>,
}

/// Configuration of the worker nodes of a machine deployment.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerConfig {
    /// AWS specific node configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsNodeConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// AWS specific node configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsNodeConfig>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsClusterConfig {
    /// Tags added to all AWS resources created for the cluster.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_tags: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsNodeConfig {
    /// The AMI the nodes are booted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ami: Option<AmiSpec>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AmiSpec {
    /// The ID of the AMI, e.g. `ami-0123456789abcdef0`.
    pub id: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NtpConfig {
    /// The NTP servers, either host names or IP addresses.
    pub servers: Vec<String>,
}
