//! Composition of many independent mutators and variable declarations into
//! single meta handlers.
//!
//! Mutators and declarations are passed explicitly when constructing the meta
//! handlers. The order of the mutators is the order their operations appear in
//! the patch of each item.
use std::{borrow::Cow, collections::BTreeMap};

use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    hooks::{ClusterClassVariable, GeneratePatchesRequest},
    patches::{self, Patch, PatchTarget, operation_path},
    schema,
    variables::{self, Variables},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve builtin variable for item {uid:?}"))]
    ResolveBuiltin {
        source: variables::Error,
        uid: String,
    },

    #[snafu(display("mutator {mutator:?} failed for item {uid:?}"))]
    RunMutator {
        source: MutatorError,
        mutator: String,
        uid: String,
    },

    #[snafu(display(
        "mutators {first:?} and {second:?} both patch {path:?} of item {uid:?}"
    ))]
    ConflictingPatchPath {
        path: String,
        uid: String,
        first: String,
        second: String,
    },

    #[snafu(display("failed to declare variables of {declaration:?}"))]
    DeclareVariables {
        source: schema::Error,
        declaration: String,
    },

    #[snafu(display(
        "variable {variable:?} is declared by both {first:?} and {second:?}"
    ))]
    DuplicateVariable {
        variable: String,
        first: String,
        second: String,
    },
}

/// Errors returned by a single [`Mutator`].
#[derive(Debug, Snafu)]
pub enum MutatorError {
    #[snafu(display("failed to resolve variable"), context(false))]
    ResolveVariable { source: variables::Error },

    #[snafu(display("failed to patch object"), context(false))]
    PatchObject { source: patches::Error },
}

/// A named, single purpose mutator.
///
/// Implementations are pure: they read the variables and the target template
/// and return the patch for it. Most implementations resolve their variable and
/// call [`patches::mutate_if_applicable`], returning an empty patch when the
/// variable is absent.
pub trait Mutator: Send + Sync {
    fn name(&self) -> &str;

    fn generate_patch(
        &self,
        target: &PatchTarget<'_>,
        variables: &Variables,
    ) -> Result<Patch, MutatorError>;
}

/// A named set of variables a runtime extension declares.
pub trait VariableDeclaration: Send + Sync {
    fn name(&self) -> &str;

    fn variables(&self) -> Result<Vec<ClusterClassVariable>, schema::Error>;
}

/// The patch generated for a single item of a request.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchedItem {
    pub uid: String,
    pub patch: Patch,
}

/// Runs a fixed, ordered list of mutators against every item of a request.
pub struct MetaGeneratePatches {
    mutators: Vec<Box<dyn Mutator>>,
}

impl MetaGeneratePatches {
    pub fn new(mutators: Vec<Box<dyn Mutator>>) -> Self {
        Self { mutators }
    }

    pub fn mutator_names(&self) -> impl Iterator<Item = &str> {
        self.mutators.iter().map(|mutator| mutator.name())
    }

    /// Generates the patches of all items in `request`.
    ///
    /// Every mutator sees the original template of an item, not one already
    /// patched by a previous mutator. Items without any operation are left out.
    /// The first error aborts the whole request, including patches already
    /// generated for other items. Two mutators writing the same path of an item
    /// is an error as well.
    #[instrument(
        name = "generate_patches",
        skip_all,
        fields(items = request.items.len(), mutators = self.mutators.len())
    )]
    pub fn generate_patches(&self, request: &GeneratePatchesRequest) -> Result<Vec<PatchedItem>> {
        let request_variables = request.variables();
        let mut patched_items = Vec::new();

        for item in &request.items {
            let uid = item.uid.as_str();
            let variables = if item.variables.is_empty() {
                Cow::Borrowed(&request_variables)
            } else {
                Cow::Owned(item.variables(&request_variables))
            };

            let builtin = variables
                .builtin()
                .context(ResolveBuiltinSnafu { uid })?;
            let target = PatchTarget::new(uid, &item.holder_reference, &item.object, &builtin);

            let mut operations = Vec::new();
            let mut written_paths = BTreeMap::<String, &str>::new();

            for mutator in &self.mutators {
                let mutator_name = mutator.name();
                let patch = mutator
                    .generate_patch(&target, &variables)
                    .with_context(|_| RunMutatorSnafu {
                        mutator: mutator_name,
                        uid,
                    })?;

                for operation in &patch.0 {
                    let path = operation_path(operation);
                    if let Some(first) = written_paths.insert(path.clone(), mutator_name) {
                        return ConflictingPatchPathSnafu {
                            path,
                            uid,
                            first,
                            second: mutator_name,
                        }
                        .fail();
                    }
                }

                if !patch.0.is_empty() {
                    tracing::debug!(
                        uid,
                        mutator = mutator_name,
                        operations = patch.0.len(),
                        "mutator generated patch"
                    );
                }
                operations.extend(patch.0);
            }

            if !operations.is_empty() {
                patched_items.push(PatchedItem {
                    uid: uid.to_owned(),
                    patch: Patch(operations),
                });
            }
        }

        tracing::debug!(patched_items = patched_items.len(), "generated patches");
        Ok(patched_items)
    }
}

/// The concatenated variables of a fixed, ordered list of declarations.
///
/// The variables are computed once on construction, a variable name declared
/// more than once is rejected.
#[derive(Clone, Debug, Default)]
pub struct MetaDiscoverVariables {
    variables: Vec<ClusterClassVariable>,
}

impl MetaDiscoverVariables {
    pub fn new(declarations: Vec<Box<dyn VariableDeclaration>>) -> Result<Self> {
        let mut variables = Vec::new();
        let mut declared_by = BTreeMap::<String, String>::new();

        for declaration in &declarations {
            let declaration_name = declaration.name();
            let declared = declaration.variables().with_context(|_| DeclareVariablesSnafu {
                declaration: declaration_name,
            })?;

            for variable in declared {
                if let Some(first) = declared_by.get(&variable.name) {
                    return DuplicateVariableSnafu {
                        variable: &variable.name,
                        first,
                        second: declaration_name,
                    }
                    .fail();
                }
                declared_by.insert(variable.name.clone(), declaration_name.to_owned());

                tracing::debug!(
                    variable = variable.name,
                    declaration = declaration_name,
                    "declared variable"
                );
                variables.push(variable);
            }
        }

        Ok(Self { variables })
    }

    pub fn variables(&self) -> &[ClusterClassVariable] {
        &self.variables
    }
}
