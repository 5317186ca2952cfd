// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, Field, OperationDefinition, Type,
};
use async_graphql_value::Name;
use thiserror::Error;

use crate::{
    Schema,
    selection_tree::{FragmentDefinitions, flatten_selection_set},
    underlying_type,
};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No operation found")]
    NoOperationFound,

    #[error("Must provide operation name if query contains multiple operations")]
    MultipleOperationsNoOperationName,

    #[error("No such operation '{0}'")]
    OperationNotFound(String),

    #[error("Root type '{0}' is not defined in the schema")]
    RootTypeNotFound(String),

    #[error("Field '{0}' is not selected in the operation")]
    FieldNotSelected(String),

    #[error("Field '{0}' is not valid for type '{1}'")]
    FieldNotFound(String, String),
}

/// Everything a resolver knows about the field invocation it is resolving.
///
/// The schema and the query document are borrowed, never copied or cached, so resolving against
/// several schemas at once is safe.
#[derive(Debug, Clone, Copy)]
pub struct ResolveInfo<'a> {
    pub schema: &'a Schema,
    /// The field node being resolved.
    pub field: &'a Field,
    /// The field's declared return type, possibly wrapped in lists and non-null markers.
    pub return_type: &'a Type,
    /// Fragment definitions of the query document the field belongs to.
    pub fragments: &'a FragmentDefinitions,
}

impl<'a> ResolveInfo<'a> {
    pub fn new(
        schema: &'a Schema,
        field: &'a Field,
        return_type: &'a Type,
        fragments: &'a FragmentDefinitions,
    ) -> Self {
        Self {
            schema,
            field,
            return_type,
            fragments,
        }
    }

    /// Build the context for a root field of an operation in `document`.
    ///
    /// The operation is picked the same way a server would: the only operation in the document, or
    /// the one named `operation_name`. The field is found by its response key (its alias, if any,
    /// otherwise its name), looking through fragments on the root selection too.
    pub fn for_root_field(
        schema: &'a Schema,
        document: &'a ExecutableDocument,
        operation_name: Option<&str>,
        response_key: &str,
    ) -> Result<Self, ResolveError> {
        let operation = select_operation(&document.operations, operation_name)?;
        let root_type_name = schema.root_type_name(operation.ty);

        if schema.selectable_fields(root_type_name).is_none() {
            return Err(ResolveError::RootTypeNotFound(root_type_name.to_string()));
        }

        let field = flatten_selection_set(&operation.selection_set.node, &document.fragments)
            .into_iter()
            .find(|field| response_key_of(field) == response_key)
            .ok_or_else(|| ResolveError::FieldNotSelected(response_key.to_string()))?;

        let definition = schema
            .field_definition(root_type_name, field.name.node.as_str())
            .ok_or_else(|| {
                ResolveError::FieldNotFound(
                    field.name.node.to_string(),
                    root_type_name.to_string(),
                )
            })?;

        Ok(Self::new(
            schema,
            field,
            &definition.ty.node,
            &document.fragments,
        ))
    }

    /// Name of the type this field returns, with list and non-null wrappers removed.
    pub fn type_name(&self) -> &'a str {
        underlying_type(self.return_type).as_str()
    }

    /// The context for a field selected under this one, as its resolver would see it.
    ///
    /// Returns `None` if no field with that response key is selected, or if the field is not
    /// declared on this field's type.
    pub fn child(&self, response_key: &str) -> Option<ResolveInfo<'a>> {
        let field = flatten_selection_set(&self.field.selection_set.node, self.fragments)
            .into_iter()
            .find(|field| response_key_of(field) == response_key)?;

        let definition = self
            .schema
            .field_definition(self.type_name(), field.name.node.as_str())?;

        Some(Self {
            field,
            return_type: &definition.ty.node,
            ..*self
        })
    }
}

fn response_key_of(field: &Field) -> &str {
    field.alias.as_ref().unwrap_or(&field.name).node.as_str()
}

fn select_operation<'d>(
    operations: &'d DocumentOperations,
    operation_name: Option<&str>,
) -> Result<&'d OperationDefinition, ResolveError> {
    match operations {
        DocumentOperations::Single(operation) => Ok(&operation.node),
        DocumentOperations::Multiple(operations) => match operation_name {
            Some(operation_name) => operations
                .get(&Name::new(operation_name))
                .map(|operation| &operation.node)
                .ok_or_else(|| ResolveError::OperationNotFound(operation_name.to_string())),
            None => {
                // async-graphql parses a single named operation (`query Foo { ... }`) into
                // `DocumentOperations::Multiple`, so only insist on a name if there really are
                // several operations.
                let mut operations = operations.values();
                match (operations.next(), operations.next()) {
                    (Some(operation), None) => Ok(&operation.node),
                    (None, _) => Err(ResolveError::NoOperationFound),
                    (Some(_), Some(_)) => Err(ResolveError::MultipleOperationsNoOperationName),
                }
            }
        },
    }
}
