// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;

use async_graphql_parser::{
    Positioned,
    types::{Field, FragmentDefinition, Selection, SelectionSet},
};
use async_graphql_value::Name;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

/// Fragment definitions of a query document, keyed by fragment name (as in
/// `ExecutableDocument::fragments`).
pub type FragmentDefinitions = HashMap<Name, Positioned<FragmentDefinition>>;

/// The fields selected under one field invocation, with all fragments inlined.
///
/// Each key is a field name (aliases are ignored) mapped to the tree of that field's own
/// sub-selection. A scalar field maps to an empty tree, so "selected as a scalar" and "not
/// selected" are told apart by key presence.
///
/// Keys are unique per level. When the same field name is selected more than once at a level (for
/// example directly and again through a fragment), the sub-tree of the last occurrence wins while
/// the key keeps the position of the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SelectionTree(IndexMap<String, SelectionTree>);

impl SelectionTree {
    pub fn build(field: &Field, fragments: &FragmentDefinitions) -> Self {
        Self::from_selection_set(&field.selection_set.node, fragments)
    }

    pub fn from_selection_set(selection_set: &SelectionSet, fragments: &FragmentDefinitions) -> Self {
        Self(
            flatten_selection_set(selection_set, fragments)
                .into_iter()
                .map(|field| {
                    (
                        field.name.node.to_string(),
                        Self::build(field, fragments),
                    )
                })
                .collect(),
        )
    }

    pub fn is_leaf(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.0.contains_key(field_name)
    }

    pub fn get(&self, field_name: &str) -> Option<&SelectionTree> {
        self.0.get(field_name)
    }

    /// Top-level field names, in selection order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectionTree)> {
        self.0.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    /// Follow a dotted path such as `edges.node` down the tree.
    ///
    /// Returns `None` if any segment of the path is not selected.
    pub fn descend(&self, path: &str) -> Option<&SelectionTree> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |tree, segment| tree.get(segment))
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.0.retain(|name, _| keep(name));
    }

    pub(crate) fn insert_leaf_if_absent(&mut self, field_name: String) {
        self.0.entry(field_name).or_default();
    }
}

/// Flatten a selection set into the fields it selects.
///
/// Fragment spreads are replaced by the fields of the fragment they name and inline fragments by
/// their own fields, at any depth. Field order follows the query text. Spreads of unknown
/// fragments, and spreads that would re-enter a fragment currently being expanded, contribute
/// nothing.
pub fn flatten_selection_set<'a>(
    selection_set: &'a SelectionSet,
    fragments: &'a FragmentDefinitions,
) -> Vec<&'a Field> {
    let mut fields = vec![];
    collect_fields(selection_set, fragments, &mut vec![], &mut fields);
    fields
}

fn collect_fields<'a>(
    selection_set: &'a SelectionSet,
    fragments: &'a FragmentDefinitions,
    expanding: &mut Vec<&'a Name>,
    fields: &mut Vec<&'a Field>,
) {
    for selection in &selection_set.items {
        match &selection.node {
            Selection::Field(field) => fields.push(&field.node),
            Selection::InlineFragment(inline_fragment) => collect_fields(
                &inline_fragment.node.selection_set.node,
                fragments,
                expanding,
                fields,
            ),
            Selection::FragmentSpread(fragment_spread) => {
                let fragment_name = &fragment_spread.node.fragment_name.node;

                if expanding.contains(&fragment_name) {
                    warn!(fragment = %fragment_name, "Skipping recursive fragment spread");
                    continue;
                }

                match fragments.get(fragment_name) {
                    Some(fragment) => {
                        expanding.push(fragment_name);
                        collect_fields(
                            &fragment.node.selection_set.node,
                            fragments,
                            expanding,
                            fields,
                        );
                        expanding.pop();
                    }
                    None => warn!(fragment = %fragment_name, "Fragment definition not found"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_graphql_parser::{
        parse_query,
        types::{DocumentOperations, ExecutableDocument},
    };
    use test_log::test;

    fn root_field(document: &ExecutableDocument) -> &Field {
        let operation = match &document.operations {
            DocumentOperations::Single(operation) => operation,
            DocumentOperations::Multiple(operations) => operations.values().next().unwrap(),
        };

        match &operation.node.selection_set.node.items[0].node {
            Selection::Field(field) => &field.node,
            _ => panic!("Expected the first root selection to be a field"),
        }
    }

    fn build_tree(query: &str) -> SelectionTree {
        let document = parse_query(query).unwrap();
        SelectionTree::build(root_field(&document), &document.fragments)
    }

    fn names(tree: &SelectionTree) -> Vec<&str> {
        tree.field_names().collect()
    }

    #[test]
    fn scalar_invocation_is_a_leaf() {
        let tree = build_tree("{ version }");

        assert!(tree.is_leaf());
        assert!(tree.descend("anything").is_none());
    }

    #[test]
    fn plain_fields() {
        let tree = build_tree("{ testQuery { firstName lastName } }");

        assert_eq!(names(&tree), vec!["firstName", "lastName"]);
        assert!(tree.get("firstName").unwrap().is_leaf());
        assert!(!tree.contains("email"));
    }

    #[test]
    fn aliases_use_the_field_name() {
        let tree = build_tree("{ testQuery { given: firstName family: lastName } }");

        assert_eq!(names(&tree), vec!["firstName", "lastName"]);
    }

    #[test]
    fn named_and_inline_fragments_are_inlined() {
        let tree = build_tree(
            r#"
                query {
                    testQuery {
                        firstName
                        ...Contact
                        ... on User {
                            mobile
                        }
                        lastName
                    }
                }

                fragment Contact on User {
                    email
                }
            "#,
        );

        assert_eq!(names(&tree), vec!["firstName", "email", "mobile", "lastName"]);
    }

    #[test]
    fn nested_fragments_at_every_depth() {
        let tree = build_tree(
            r#"
                query {
                    testQuery {
                        ...UserWithFriends
                    }
                }

                fragment UserWithFriends on User {
                    firstName
                    friends {
                        ...Names
                        ... on User {
                            address { ...Place }
                        }
                    }
                }

                fragment Names on User {
                    ... on User { firstName }
                    lastName
                }

                fragment Place on Address {
                    city
                }
            "#,
        );

        insta::assert_json_snapshot!(tree, @r#"
        {
          "firstName": {},
          "friends": {
            "firstName": {},
            "lastName": {},
            "address": {
              "city": {}
            }
          }
        }
        "#);
    }

    #[test]
    fn duplicate_field_names_last_write_wins() {
        let tree = build_tree(
            r#"
                query {
                    testQuery {
                        friends { firstName }
                        email
                        ...Friends
                    }
                }

                fragment Friends on User {
                    friends { lastName }
                }
            "#,
        );

        assert_eq!(names(&tree), vec!["friends", "email"]);
        assert_eq!(names(tree.get("friends").unwrap()), vec!["lastName"]);
    }

    #[test]
    fn unknown_and_recursive_fragments_contribute_nothing() {
        let tree = build_tree(
            r#"
                query {
                    testQuery {
                        firstName
                        ...Missing
                        ...Loop
                    }
                }

                fragment Loop on User {
                    email
                    ...Loop
                }
            "#,
        );

        assert_eq!(names(&tree), vec!["firstName", "email"]);
    }

    #[test]
    fn descend_along_a_path() {
        let tree = build_tree(
            r#"
                {
                    userConnection {
                        totalCount
                        edges { cursor node { firstName lastName } }
                    }
                }
            "#,
        );

        assert_eq!(
            names(tree.descend("edges.node").unwrap()),
            vec!["firstName", "lastName"]
        );
        assert_eq!(tree.descend("edges").unwrap().len(), 2);
        assert!(tree.descend("edges.missing").is_none());
        assert!(tree.descend("totalCount").unwrap().is_leaf());
    }
}
