//! The request-scoped variable store and the typed path resolver on top of it.
//!
//! Variables are opaque JSON documents keyed by name. A value is addressed by the
//! name of the variable and an optional list of nested field names, e.g. the
//! variable `clusterConfig` with the path `["controlPlane", "aws", "ami"]`.
//!
//! Resolution distinguishes between three outcomes:
//!
//! - `Ok(Some(value))`: the value exists and could be deserialized,
//! - `Ok(None)`: the variable or one of the path segments is absent. This is the
//!   normal state for optional configuration and callers should skip silently,
//! - `Err(_)`: the value exists but can't be deserialized into the requested
//!   type. This must fail the whole request.
use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use snafu::{ResultExt, Snafu};

use crate::constants::BUILTIN_VARIABLE_NAME;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to deserialize variable {name:?} at path {path:?}"))]
    DeserializeVariable {
        source: serde_json::Error,
        name: String,
        path: String,
    },
}

/// An immutable set of variables, built once per request.
///
/// Resolving values never mutates the store, so a single store can be shared by
/// any number of mutators, also across threads.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Variables {
    values: BTreeMap<String, Value>,
}

impl Variables {
    /// Creates a new store. Names are expected to be unique, for duplicates the
    /// last value wins.
    pub fn new<N>(variables: impl IntoIterator<Item = (N, Value)>) -> Self
    where
        N: Into<String>,
    {
        Self {
            values: variables
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    /// Returns a new store, which contains all variables of `self` overridden by
    /// `overrides`.
    ///
    /// The `builtin` variable is merged (RFC 7386) instead of replaced, because
    /// item scoped builtins (like the machine deployment class) only complement
    /// the request scoped ones (like the cluster name). A `null` field removes
    /// the request scoped value.
    pub fn with_overrides<N>(&self, overrides: impl IntoIterator<Item = (N, Value)>) -> Self
    where
        N: Into<String>,
    {
        let mut values = self.values.clone();

        for (name, value) in overrides {
            let name = name.into();
            match values.get_mut(&name) {
                Some(existing) if name == BUILTIN_VARIABLE_NAME => {
                    json_patch::merge(existing, &value);
                }
                _ => {
                    values.insert(name, value);
                }
            }
        }

        Self { values }
    }

    /// Returns the raw value of the variable `name` at `path` without
    /// deserializing it.
    pub fn get_raw<S>(&self, name: &str, path: &[S]) -> Option<&Value>
    where
        S: AsRef<str>,
    {
        path.iter()
            .try_fold(self.values.get(name)?, |value, segment| {
                lookup(value, segment.as_ref())
            })
    }

    /// Resolves the variable `name` at `path` and deserializes it into `T`.
    ///
    /// See the [module documentation](self) for the meaning of the different
    /// return values.
    pub fn get<T, S>(&self, name: &str, path: &[S]) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        S: AsRef<str>,
    {
        let Some(value) = self.get_raw(name, path) else {
            return Ok(None);
        };

        T::deserialize(value)
            .map(Some)
            .with_context(|_| DeserializeVariableSnafu {
                name,
                path: VariablePath(path).to_string(),
            })
    }
}

impl<N> FromIterator<(N, Value)> for Variables
where
    N: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, Value)>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Topology information Cluster API injects into every request as the `builtin`
/// variable.
///
/// Only the fields needed to select templates are modelled.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Builtin {
    #[serde(default)]
    pub cluster: Option<BuiltinCluster>,

    #[serde(default)]
    pub machine_deployment: Option<BuiltinWorker>,

    #[serde(default)]
    pub machine_pool: Option<BuiltinWorker>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinCluster {
    pub name: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinWorker {
    pub class: Option<String>,
    pub name: Option<String>,
    pub topology_name: Option<String>,
}

impl Variables {
    /// Resolves the `builtin` variable.
    pub fn builtin(&self) -> Result<Builtin> {
        self.get::<Builtin, &str>(BUILTIN_VARIABLE_NAME, &[])
            .map(Option::unwrap_or_default)
    }
}

struct VariablePath<'a, S>(&'a [S]);

impl<S: AsRef<str>> Display for VariablePath<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, segment) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment.as_ref())?;
        }
        Ok(())
    }
}

fn lookup<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(list) => list.get(segment.parse::<usize>().ok()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct AmiSpec {
        id: String,
    }

    fn variables() -> Variables {
        Variables::new([
            (
                "clusterConfig",
                json!({
                    "controlPlane": {
                        "aws": {
                            "ami": { "id": "ami-123" }
                        }
                    },
                    "ntp": { "servers": ["time.aws.com", "pool.ntp.org"] },
                    "broken": { "id": 42 }
                }),
            ),
            ("enabled", json!(true)),
        ])
    }

    #[test]
    fn resolves_nested_value() {
        let ami: Option<AmiSpec> = variables()
            .get("clusterConfig", &["controlPlane", "aws", "ami"])
            .expect("value must deserialize");

        assert_eq!(
            ami,
            Some(AmiSpec {
                id: "ami-123".to_owned()
            })
        );
    }

    #[test]
    fn resolves_root_value() {
        let enabled: Option<bool> = variables()
            .get::<_, &str>("enabled", &[])
            .expect("value must deserialize");

        assert_eq!(enabled, Some(true));
    }

    #[test]
    fn resolves_list_index() {
        let server: Option<String> = variables()
            .get("clusterConfig", &["ntp", "servers", "1"])
            .expect("value must deserialize");

        assert_eq!(server.as_deref(), Some("pool.ntp.org"));
    }

    #[rstest]
    #[case("missing", &["controlPlane"])]
    #[case("clusterConfig", &["workers"])]
    #[case("clusterConfig", &["controlPlane", "aws", "ami", "lookup"])]
    #[case("clusterConfig", &["ntp", "servers", "7"])]
    #[case("enabled", &["nested"])]
    fn absent_value_is_not_an_error(#[case] name: &str, #[case] path: &[&str]) {
        let value: Option<Value> = variables()
            .get(name, path)
            .expect("absent values must not fail");

        assert_eq!(value, None);
    }

    #[test]
    fn malformed_value_is_an_error() {
        let err = variables()
            .get::<AmiSpec, _>("clusterConfig", &["broken"])
            .expect_err("a number is not a string");

        assert_eq!(
            err.to_string(),
            r#"failed to deserialize variable "clusterConfig" at path "broken""#
        );
    }

    #[test]
    fn overrides_replace_variables() {
        let variables = variables().with_overrides([("enabled", json!(false))]);

        assert_eq!(
            variables
                .get::<bool, &str>("enabled", &[])
                .expect("value must deserialize"),
            Some(false)
        );
        assert!(variables.get_raw::<&str>("clusterConfig", &[]).is_some());
    }

    #[test]
    fn overrides_merge_builtin() {
        let variables = Variables::new([(
            "builtin",
            json!({ "cluster": { "name": "my-cluster", "namespace": "default" } }),
        )])
        .with_overrides([(
            "builtin",
            json!({ "machineDeployment": { "class": "default-worker", "name": "md-0" } }),
        )]);

        let builtin = variables.builtin().expect("builtin must deserialize");
        assert_eq!(
            builtin.cluster.and_then(|cluster| cluster.name).as_deref(),
            Some("my-cluster")
        );
        assert_eq!(
            builtin
                .machine_deployment
                .and_then(|md| md.class)
                .as_deref(),
            Some("default-worker")
        );
    }

    #[test]
    fn overrides_merge_nested_builtin_fields() {
        let variables = Variables::new([(
            "builtin",
            json!({
                "cluster": { "name": "my-cluster", "namespace": "default" },
                "machineDeployment": { "class": "default-worker", "name": "md-0" }
            }),
        )])
        .with_overrides([(
            "builtin",
            json!({ "cluster": { "namespace": "prod" }, "machineDeployment": { "name": null } }),
        )]);

        assert_eq!(
            variables.get_raw::<&str>("builtin", &[]),
            Some(&json!({
                "cluster": { "name": "my-cluster", "namespace": "prod" },
                "machineDeployment": { "class": "default-worker" }
            }))
        );
    }

    #[test]
    fn missing_builtin_defaults() {
        assert_eq!(
            variables().builtin().expect("builtin must deserialize"),
            Builtin::default()
        );
    }
}
