//! The common shape of all Cluster API `*Template` kinds.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A template of the shape `spec.template.spec`, shared by all Cluster API
/// `*Template` kinds.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(bound(deserialize = "S: Deserialize<'de> + Default"))]
pub struct Template<S> {
    #[serde(default)]
    pub spec: TemplateSpec<S>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(bound(deserialize = "S: Deserialize<'de> + Default"))]
pub struct TemplateSpec<S> {
    #[serde(default)]
    pub template: TemplateResource<S>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(bound(deserialize = "S: Deserialize<'de> + Default"))]
pub struct TemplateResource<S> {
    #[serde(default)]
    pub spec: S,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}
