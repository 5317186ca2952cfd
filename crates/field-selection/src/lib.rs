// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Work out which fields a resolver has to fetch.
//!
//! Given the field being resolved and its query document, [`resolve_fields`] returns the names of
//! the fields selected under it: fragments are inlined, fields that are not part of the schema are
//! dropped, and fields declared with `@requires(fields: "...")` bring their dependencies along.

use async_graphql_parser::types::{BaseType, Type};
use async_graphql_value::Name;

mod dependency;
mod resolve_info;
mod resolver;
mod schema;
mod selection_tree;

pub use dependency::{
    FieldDependency, REQUIRES_DIRECTIVE, REQUIRES_FIELDS_ARGUMENT, expand_dependencies,
};
pub use resolve_info::{ResolveError, ResolveInfo};
pub use resolver::{resolve_fields, resolve_tree};
pub use schema::{Schema, SchemaError};
pub use selection_tree::{FragmentDefinitions, SelectionTree, flatten_selection_set};

pub fn underlying_type(typ: &Type) -> &Name {
    match &typ.base {
        BaseType::Named(name) => name,
        BaseType::List(typ) => underlying_type(typ),
    }
}
