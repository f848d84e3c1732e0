//! The decode, mutate, encode and diff pipeline.
//!
//! Mutators never build JSON patches by hand. Instead they describe the target
//! template with a typed shape and a [`Selector`], and edit a decoded copy of
//! the template in [`mutate_if_applicable`]. The patch is the diff between the
//! encoded original and the encoded copy, so a mutator setting a field to the
//! value it already holds produces no operations at all.
//!
//! Typed shapes should capture unknown fields with `#[serde(flatten)]` so that
//! decoding and encoding round-trips the template.
use json_patch::PatchOperation;
pub use json_patch::Patch;
use kube::core::TypeMeta;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    selectors::{HolderReference, HolderRole, Selector},
    variables::Builtin,
};

/// The error type returned by mutation callbacks.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to decode {kind:?} ({api_version}) with uid {uid:?}"))]
    DecodeObject {
        source: serde_json::Error,
        api_version: String,
        kind: String,
        uid: String,
    },

    #[snafu(display("failed to mutate {kind:?} ({api_version}) with uid {uid:?}"))]
    MutateObject {
        source: BoxedError,
        api_version: String,
        kind: String,
        uid: String,
    },

    #[snafu(display("failed to encode {kind:?} ({api_version}) with uid {uid:?}"))]
    EncodeObject {
        source: serde_json::Error,
        api_version: String,
        kind: String,
        uid: String,
    },
}

/// A generated template of a request, together with everything needed to
/// decide whether a mutator applies to it.
#[derive(Clone, Debug)]
pub struct PatchTarget<'a> {
    pub uid: &'a str,
    pub holder: &'a HolderReference,
    pub role: HolderRole,
    pub type_meta: TypeMeta,
    pub object: &'a Value,
}

impl<'a> PatchTarget<'a> {
    /// Creates a new target. The type of the template is read from the
    /// `apiVersion` and `kind` fields of `object`, the holder role is classified
    /// using `builtin`.
    pub fn new(
        uid: &'a str,
        holder: &'a HolderReference,
        object: &'a Value,
        builtin: &Builtin,
    ) -> Self {
        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };

        Self {
            uid,
            holder,
            role: HolderRole::classify(holder, builtin),
            type_meta: TypeMeta {
                api_version: field("apiVersion"),
                kind: field("kind"),
            },
            object,
        }
    }
}

/// Runs `mutate` against a decoded copy of the target template if `selector`
/// matches and returns the resulting patch.
///
/// - A selector mismatch returns an empty patch.
/// - The template is decoded into `T`, a decode failure indicates a shape
///   mismatch and is returned as an error.
/// - Errors returned by `mutate` are passed through.
/// - The original and the mutated copy are both encoded and diffed, the order of
///   the operations is deterministic for identical inputs.
#[instrument(
    level = "trace",
    skip(target, selector, mutate),
    fields(uid = target.uid, kind = %target.type_meta.kind)
)]
pub fn mutate_if_applicable<T, F, E>(
    target: &PatchTarget<'_>,
    selector: &Selector,
    mutate: F,
) -> Result<Patch>
where
    T: Clone + DeserializeOwned + Serialize,
    F: FnOnce(&mut T) -> Result<(), E>,
    E: Into<BoxedError>,
{
    if !selector.matches(&target.type_meta, &target.role) {
        tracing::trace!(role = ?target.role, "selector does not match, skipping");
        return Ok(Patch(Vec::new()));
    }

    let TypeMeta { api_version, kind } = &target.type_meta;

    let original = T::deserialize(target.object).with_context(|_| DecodeObjectSnafu {
        api_version,
        kind,
        uid: target.uid,
    })?;

    let mut modified = original.clone();
    let mutated: Result<(), BoxedError> = mutate(&mut modified).map_err(Into::into);
    mutated.with_context(|_| MutateObjectSnafu {
        api_version,
        kind,
        uid: target.uid,
    })?;

    let encode = |object: &T| {
        serde_json::to_value(object).with_context(|_| EncodeObjectSnafu {
            api_version,
            kind,
            uid: target.uid,
        })
    };

    let patch = json_patch::diff(&encode(&original)?, &encode(&modified)?);
    tracing::trace!(operations = patch.0.len(), "computed patch");

    Ok(patch)
}

/// Returns the JSON pointer the operation writes to.
pub fn operation_path(operation: &PatchOperation) -> String {
    match operation {
        PatchOperation::Add(op) => op.path.to_string(),
        PatchOperation::Remove(op) => op.path.to_string(),
        PatchOperation::Replace(op) => op.path.to_string(),
        PatchOperation::Move(op) => op.path.to_string(),
        PatchOperation::Copy(op) => op.path.to_string(),
        PatchOperation::Test(op) => op.path.to_string(),
    }
}
