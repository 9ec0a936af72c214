//! Local `$ref` resolver with per-branch cycle detection

use std::collections::HashSet;

use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::error::{ResolveError, ResolveResult};

/// Resolves `#/...` references against the root of a document
pub struct SchemaResolver<'a> {
    /// The whole document; references are JSON pointers into it
    document: &'a Value,
}

impl<'a> SchemaResolver<'a> {
    /// Create a resolver over a parsed document
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    /// Resolve a schema, inlining every reference it contains
    pub fn resolve(&self, node: &Value) -> ResolveResult<Value> {
        self.resolve_on_branch(node, HashSet::new())
    }

    /// Resolve `node` given the references already followed on this branch.
    ///
    /// Every nested member and array element receives its own copy of
    /// `visited`, so two siblings pointing at the same target are fine while a
    /// reference that reappears further down its own chain is a cycle.
    pub fn resolve_on_branch(
        &self,
        node: &Value,
        mut visited: HashSet<String>,
    ) -> ResolveResult<Value> {
        match node {
            Value::Object(obj) => {
                if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
                    if !reference.starts_with("#/") {
                        return Err(ResolveError::Unsupported(reference.to_string()));
                    }
                    if !visited.insert(reference.to_string()) {
                        return Err(ResolveError::Circular(reference.to_string()));
                    }

                    let target = self.lookup(reference)?;
                    return self.resolve_on_branch(target, visited);
                }

                let mut result = Map::with_capacity(obj.len());
                for (key, value) in obj {
                    let resolved = match value {
                        Value::Object(_) | Value::Array(_) => {
                            self.resolve_on_branch(value, visited.clone())?
                        }
                        _ => value.clone(),
                    };
                    result.insert(key.clone(), resolved);
                }
                Ok(Value::Object(result))
            }
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Object(_) | Value::Array(_) => {
                        self.resolve_on_branch(item, visited.clone())
                    }
                    _ => Ok(item.clone()),
                })
                .collect::<ResolveResult<Vec<_>>>()
                .map(Value::Array),
            _ => Ok(node.clone()),
        }
    }

    /// Follow a `#/a/b/c` pointer from the document root
    fn lookup(&self, reference: &str) -> ResolveResult<&'a Value> {
        let pointer = &reference[2..];
        let mut current = self.document;

        for raw_segment in pointer.split('/') {
            let segment = percent_decode_str(raw_segment)
                .decode_utf8_lossy()
                .replace("~1", "/")
                .replace("~0", "~");

            current = match current {
                Value::Object(obj) => obj.get(&segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            }
            .ok_or_else(|| ResolveError::InvalidPath(reference.to_string()))?;
        }

        Ok(current)
    }
}
