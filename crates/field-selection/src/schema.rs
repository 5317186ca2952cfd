// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{HashMap, hash_map::Entry};

use async_graphql_parser::{
    Positioned, parse_schema,
    types::{
        FieldDefinition, OperationType, ServiceDocument, TypeDefinition, TypeKind,
        TypeSystemDefinition,
    },
};
use thiserror::Error;

pub const QUERY_ROOT_TYPENAME: &str = "Query";
pub const MUTATION_ROOT_TYPENAME: &str = "Mutation";
pub const SUBSCRIPTION_ROOT_TYPENAME: &str = "Subscription";

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse schema: {0}")]
    Parsing(String),
}

/// Type definitions of a GraphQL schema, indexed by type name.
///
/// The schema is read-only once built and is passed by reference to every resolution call.
#[derive(Debug, Default)]
pub struct Schema {
    type_definitions: HashMap<String, TypeDefinition>,
    query_type_name: Option<String>,
    mutation_type_name: Option<String>,
    subscription_type_name: Option<String>,
}

impl Schema {
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        parse_schema(sdl)
            .map(Schema::from)
            .map_err(|e| SchemaError::Parsing(e.to_string()))
    }

    pub fn get_type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.type_definitions.get(name)
    }

    /// Name of the type that holds the root fields for the given operation type.
    pub fn root_type_name(&self, operation_type: OperationType) -> &str {
        match operation_type {
            OperationType::Query => self.query_type_name.as_deref().unwrap_or(QUERY_ROOT_TYPENAME),
            OperationType::Mutation => self
                .mutation_type_name
                .as_deref()
                .unwrap_or(MUTATION_ROOT_TYPENAME),
            OperationType::Subscription => self
                .subscription_type_name
                .as_deref()
                .unwrap_or(SUBSCRIPTION_ROOT_TYPENAME),
        }
    }

    /// Fields of the named type, if it is a type that supports selecting fields (an object or an
    /// interface). Scalars, enums, unions, input types and unknown types return `None`.
    pub fn selectable_fields(&self, type_name: &str) -> Option<&[Positioned<FieldDefinition>]> {
        self.get_type_definition(type_name)
            .and_then(|type_definition| match &type_definition.kind {
                TypeKind::Object(object) => Some(object.fields.as_slice()),
                TypeKind::Interface(interface) => Some(interface.fields.as_slice()),
                _ => None,
            })
    }

    pub fn field_definition(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.selectable_fields(type_name)?
            .iter()
            .map(|field| &field.node)
            .find(|field| field.name.node.as_str() == field_name)
    }

    fn add_type_definition(&mut self, type_definition: TypeDefinition) {
        match self
            .type_definitions
            .entry(type_definition.name.node.to_string())
        {
            Entry::Occupied(mut existing) => merge_type_definition(existing.get_mut(), type_definition),
            Entry::Vacant(entry) => {
                entry.insert(type_definition);
            }
        }
    }
}

impl From<ServiceDocument> for Schema {
    fn from(document: ServiceDocument) -> Self {
        let mut schema = Schema::default();

        for definition in document.definitions {
            match definition {
                TypeSystemDefinition::Schema(schema_definition) => {
                    let schema_definition = schema_definition.node;
                    let name_of = |name: Option<Positioned<async_graphql_value::Name>>| {
                        name.map(|name| name.node.to_string())
                    };
                    schema.query_type_name =
                        name_of(schema_definition.query).or(schema.query_type_name);
                    schema.mutation_type_name =
                        name_of(schema_definition.mutation).or(schema.mutation_type_name);
                    schema.subscription_type_name =
                        name_of(schema_definition.subscription).or(schema.subscription_type_name);
                }
                TypeSystemDefinition::Type(type_definition) => {
                    schema.add_type_definition(type_definition.node)
                }
                TypeSystemDefinition::Directive(_) => {}
            }
        }

        schema
    }
}

/// Fold `other` (typically an `extend type ...`) into `base`.
fn merge_type_definition(base: &mut TypeDefinition, other: TypeDefinition) {
    // An extension may be declared before the type it extends
    if base.extend && !other.extend {
        let extension = std::mem::replace(base, other);
        merge_type_definition(base, extension);
        return;
    }

    base.directives.extend(other.directives);

    match (&mut base.kind, other.kind) {
        (TypeKind::Object(base), TypeKind::Object(other)) => {
            base.implements.extend(other.implements);
            base.fields.extend(other.fields);
        }
        (TypeKind::Interface(base), TypeKind::Interface(other)) => {
            base.implements.extend(other.implements);
            base.fields.extend(other.fields);
        }
        _ => {}
    }
}
