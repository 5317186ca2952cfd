// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::types::{ConstDirective, FieldDefinition};
use async_graphql_value::ConstValue;

pub const REQUIRES_DIRECTIVE: &str = "requires";
pub const REQUIRES_FIELDS_ARGUMENT: &str = "fields";

/// A schema field along with the extra fields it needs to be resolved.
///
/// Dependencies are declared on the field definition as `@requires(fields: "birthdate timezone")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDependency<'a> {
    pub field: &'a str,
    pub requires: Vec<&'a str>,
}

impl<'a> FieldDependency<'a> {
    /// Read the dependencies declared on a field definition.
    ///
    /// Only a `@requires` directive with a string literal `fields` argument declares dependencies.
    /// Any other shape (no directive, a missing argument or a non-string value) means the field
    /// depends on nothing but itself.
    pub fn of(definition: &'a FieldDefinition) -> Self {
        let requires = definition
            .directives
            .iter()
            .find(|directive| directive.node.name.node.as_str() == REQUIRES_DIRECTIVE)
            .and_then(|directive| fields_argument(&directive.node))
            .map(|fields| fields.split_whitespace().collect())
            .unwrap_or_default();

        Self {
            field: definition.name.node.as_str(),
            requires,
        }
    }

    /// The declaring field followed by the fields it requires.
    pub fn into_field_names(self) -> impl Iterator<Item = &'a str> {
        std::iter::once(self.field).chain(self.requires)
    }
}

fn fields_argument(directive: &ConstDirective) -> Option<&str> {
    directive
        .arguments
        .iter()
        .find(|(name, _)| name.node.as_str() == REQUIRES_FIELDS_ARGUMENT)
        .and_then(|(_, value)| match &value.node {
            ConstValue::String(fields) => Some(fields.as_str()),
            _ => None,
        })
}

/// Expand each requested field into itself plus the fields it declares through `@requires`.
///
/// Names without a definition (per `lookup`) are dropped, which is how meta-fields such as
/// `__typename` fall out. Expansion goes one level deep: fields pulled in as dependencies are not
/// expanded again. The result may contain duplicates.
pub fn expand_dependencies<'a, I, S, L>(field_names: I, lookup: L) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    L: Fn(&str) -> Option<&'a FieldDefinition>,
{
    field_names
        .into_iter()
        .filter_map(|name| lookup(name.as_ref()))
        .flat_map(|definition| FieldDependency::of(definition).into_field_names())
        .map(str::to_string)
        .collect()
}
