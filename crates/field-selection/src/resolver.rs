// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use async_graphql_parser::{Positioned, types::FieldDefinition};
use tracing::{instrument, trace};

use crate::{ResolveInfo, SelectionTree, expand_dependencies};

/// The part of a selection that applies to one type.
struct ScopedSelection<'a> {
    type_name: &'a str,
    fields: &'a [Positioned<FieldDefinition>],
    selection: SelectionTree,
}

/// Names of the fields to fetch for a field invocation.
///
/// The fields come from the invocation's selection (fragments inlined), expanded with the fields
/// they declare through `@requires`. Fields not declared on the type, such as `__typename`, are
/// left out.
///
/// The type is the invocation's return type (the element type for lists) unless `type_name` is
/// given. With a `path` such as `edges.node`, the fields are taken from that part of the selection
/// instead of its top level, which is how a paginated connection's nodes are resolved:
/// `resolve_fields(info, Some("User"), Some("edges.node"))`.
///
/// A leaf return type (scalar, enum) or a type missing from the schema yields no fields, as does a
/// path that isn't selected.
#[instrument(
    name = "resolve_fields",
    skip(info),
    fields(field = %info.field.name.node)
)]
pub fn resolve_fields(
    info: &ResolveInfo<'_>,
    type_name: Option<&str>,
    path: Option<&str>,
) -> Vec<String> {
    let Some(scoped) = scoped_selection(info, type_name, path) else {
        return vec![];
    };

    let field_names = expand_dependencies(scoped.selection.field_names(), |name: &str| {
        field_definition(scoped.fields, name)
    });
    trace!(type_name = scoped.type_name, ?field_names, "Resolved field names");

    field_names
}

/// Like [`resolve_fields`], but keeps the shape of the selection.
///
/// The returned tree holds the selected fields declared on the type (each with its own, unfiltered
/// sub-selection). Fields they require through `@requires` are added as leaves unless already
/// selected.
#[instrument(
    name = "resolve_tree",
    skip(info),
    fields(field = %info.field.name.node)
)]
pub fn resolve_tree(
    info: &ResolveInfo<'_>,
    type_name: Option<&str>,
    path: Option<&str>,
) -> SelectionTree {
    let Some(ScopedSelection {
        fields,
        mut selection,
        ..
    }) = scoped_selection(info, type_name, path)
    else {
        return SelectionTree::default();
    };

    selection.retain(|name| field_definition(fields, name).is_some());

    let required = expand_dependencies(selection.field_names(), |name: &str| {
        field_definition(fields, name)
    });
    for field_name in required {
        selection.insert_leaf_if_absent(field_name);
    }

    selection
}

fn scoped_selection<'a>(
    info: &ResolveInfo<'a>,
    type_name: Option<&'a str>,
    path: Option<&str>,
) -> Option<ScopedSelection<'a>> {
    let type_name = type_name.unwrap_or_else(|| info.type_name());
    let fields = info.schema.selectable_fields(type_name)?;

    let tree = SelectionTree::build(info.field, info.fragments);
    let selection = match path {
        Some(path) => tree.descend(path).cloned().unwrap_or_default(),
        None => tree,
    };

    Some(ScopedSelection {
        type_name,
        fields,
        selection,
    })
}

fn field_definition<'a>(
    fields: &'a [Positioned<FieldDefinition>],
    name: &str,
) -> Option<&'a FieldDefinition> {
    fields
        .iter()
        .map(|field| &field.node)
        .find(|field| field.name.node.as_str() == name)
}
