//! Building blocks for Cluster API topology mutation hooks.
//!
//! A topology mutation hook receives every template generated for a cluster
//! topology together with the variables declared on the cluster and answers with
//! JSON patches for those templates. This crate contains everything needed to
//! serve such a hook without the individual mutators knowing about each other:
//!
//! - [`variables`] resolves typed values out of the request-scoped variable set,
//! - [`selectors`] decide whether a template is a valid target for a mutator,
//! - [`patches`] decode a template, run a typed mutation and diff the result,
//! - [`handlers`] compose many mutators and variable declarations into single
//!   meta handlers,
//! - [`hooks`] contains the wire types of the runtime hooks API and adapts them
//!   to the primitives above.
//!
//! ```
//! use caren_patches::{
//!     handlers::{MetaGeneratePatches, Mutator, MutatorError},
//!     patches::{self, Patch, PatchTarget},
//!     selectors::Selector,
//!     variables::Variables,
//! };
//!
//! struct Noop;
//!
//! impl Mutator for Noop {
//!     fn name(&self) -> &str {
//!         "noop"
//!     }
//!
//!     fn generate_patch(
//!         &self,
//!         target: &PatchTarget<'_>,
//!         _variables: &Variables,
//!     ) -> Result<Patch, MutatorError> {
//!         let selector = Selector::control_plane("controlplane.cluster.x-k8s.io/v1beta2", "KubeadmControlPlaneTemplate");
//!         Ok(patches::mutate_if_applicable(target, &selector, |_: &mut serde_json::Value| {
//!             Ok::<_, std::convert::Infallible>(())
//!         })?)
//!     }
//! }
//!
//! let handler = MetaGeneratePatches::new(vec![Box::new(Noop)]);
//! ```

pub mod constants;
pub mod handlers;
pub mod hooks;
pub mod patches;
pub mod schema;
pub mod selectors;
pub mod variables;

// External re-exports
pub use json_patch;
pub use k8s_openapi;
pub use schemars;
