//! Helpers to declare the OpenAPI v3 schema of cluster class variables from Rust types.
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps;
use schemars::{JsonSchema, generate::SchemaSettings};
use serde_json::Value;
use snafu::{ResultExt, Snafu};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to convert schema of {type_name:?} into an OpenAPI v3 schema"))]
    ConvertSchema {
        source: serde_json::Error,
        type_name: String,
    },
}

/// Generates the OpenAPI v3 schema of `T`.
///
/// Subschemas are inlined, as variable schemas can't contain references, and the
/// meta data keywords (`$schema`, `title`) are removed.
pub fn openapi_schema<T>() -> Result<JSONSchemaProps>
where
    T: JsonSchema,
{
    let mut settings = SchemaSettings::openapi3();
    settings.inline_subschemas = true;

    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = schema.to_value();
    if let Value::Object(object) = &mut value {
        object.remove("$schema");
        object.remove("title");
    }

    serde_json::from_value(value).with_context(|_| ConvertSchemaSnafu {
        type_name: T::schema_name(),
    })
}
