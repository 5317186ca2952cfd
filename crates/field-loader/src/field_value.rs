// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde_json::Value;

/// A cached field of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The entity itself was not found.
    Missing,
    /// The entity exists. A field it doesn't have is `Present(Value::Null)`.
    Present(Value),
}

impl FieldValue {
    /// Read `field` (possibly a path, see [`value_at_path`]) from a fetched record.
    pub fn from_record(record: &Value, field: &str) -> Self {
        FieldValue::Present(value_at_path(record, field).cloned().unwrap_or(Value::Null))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    pub fn into_value(self) -> Value {
        match self {
            FieldValue::Missing => Value::Null,
            FieldValue::Present(value) => value,
        }
    }
}

/// Look up `path` in a JSON value.
///
/// A key equal to the whole path wins; otherwise the path is split on `.` (and `[`/`]`, so
/// `tags[0]` and `tags.0` are the same) and each segment selects an object member or an array
/// index.
pub fn value_at_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(member) = value.as_object().and_then(|object| object.get(path)) {
        return Some(member);
    }

    path.split(['.', '[', ']'])
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |value, segment| match value {
            Value::Object(object) => object.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        })
}
