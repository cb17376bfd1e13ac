//! Reference-path resolution and placeholder-template evaluation.
//!
//! A *reference path* is the engine's restricted JSONPath dialect: the
//! literal `$` (whole document) or `$` followed by `.field` / `[index]`
//! segments. A *placeholder field* is a template key ending in `.$`,
//! whose value is either a reference path or a quoted intrinsic
//! expression; [`crate::intrinsics`] evaluates the latter.
//!
//! Grounded on `utils/json_ext.rs`'s recursive `Value` traversal and its
//! `thiserror`+`miette` error-enum style, and on an ASL-emulator
//! reference's `json_path_get` for the concrete `$.a.b[0]` dialect shape.

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("reference path '{0}' must start with '$'")]
    #[diagnostic(code(asl::path::missing_root))]
    MissingRoot(String),

    #[error("malformed reference path '{0}' at offset {offset}")]
    #[diagnostic(code(asl::path::malformed))]
    Malformed { path: String, offset: usize },

    #[error("reference path '{path}' does not resolve against the current document")]
    #[diagnostic(code(asl::path::unresolved))]
    Unresolved { path: String },

    #[error("cannot insert result at '{path}': traversal reached a non-object/array value")]
    #[diagnostic(code(asl::path::unplaceable))]
    Unplaceable { path: String },
}

/// One segment of a parsed reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// A parsed reference path: `$` plus zero or more segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefPath {
    pub segments: Vec<Segment>,
}

impl RefPath {
    pub fn root() -> Self {
        Self { segments: vec![] }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parse a reference path such as `$`, `$.a.b`, `$.a[0].b`.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let mut chars = path.char_indices().peekable();
        match chars.next() {
            Some((_, '$')) => {}
            _ => return Err(PathError::MissingRoot(path.to_string())),
        }

        let mut segments = Vec::new();
        while let Some(&(offset, ch)) = chars.peek() {
            match ch {
                '.' => {
                    chars.next();
                    let start = match chars.peek() {
                        Some(&(o, _)) => o,
                        None => return Err(PathError::Malformed { path: path.to_string(), offset }),
                    };
                    let mut end = start;
                    while let Some(&(o, c)) = chars.peek() {
                        if c == '.' || c == '[' {
                            break;
                        }
                        end = o + c.len_utf8();
                        chars.next();
                    }
                    let field = &path[start..end];
                    if field.is_empty() {
                        return Err(PathError::Malformed { path: path.to_string(), offset });
                    }
                    segments.push(Segment::Field(field.to_string()));
                }
                '[' => {
                    chars.next();
                    let start = match chars.peek() {
                        Some(&(o, _)) => o,
                        None => return Err(PathError::Malformed { path: path.to_string(), offset }),
                    };
                    let mut end = start;
                    while let Some(&(o, c)) = chars.peek() {
                        if c == ']' {
                            end = o;
                            break;
                        }
                        chars.next();
                    }
                    match chars.next() {
                        Some((_, ']')) => {}
                        _ => return Err(PathError::Malformed { path: path.to_string(), offset }),
                    }
                    let digits = &path[start..end];
                    let index: usize = digits
                        .parse()
                        .map_err(|_| PathError::Malformed { path: path.to_string(), offset })?;
                    segments.push(Segment::Index(index));
                }
                _ => return Err(PathError::Malformed { path: path.to_string(), offset }),
            }
        }

        Ok(Self { segments })
    }

    /// Resolve this path against `document`, returning `None` on any
    /// missing field or out-of-range index (a "lookup failure").
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        let mut current = document;
        for segment in &self.segments {
            current = match (segment, current) {
                (Segment::Field(name), Value::Object(map)) => map.get(name)?,
                (Segment::Index(idx), Value::Array(items)) => items.get(*idx)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Insert `value` into `document` at this path, creating intermediate
    /// objects for missing fields along the way. Fails if the traversal
    /// would need to descend into/replace a non-object value for a field
    /// segment, or index into a non-array / out-of-range array for an
    /// index segment.
    pub fn insert(&self, document: &Value, value: Value) -> Result<Value, PathError> {
        if self.is_root() {
            return Ok(value);
        }
        insert_rec(document, &self.segments, value)
    }
}

fn insert_rec(document: &Value, segments: &[Segment], value: Value) -> Result<Value, PathError> {
    let (head, rest) = segments
        .split_first()
        .expect("insert_rec called with empty segments");

    match head {
        Segment::Field(name) => {
            let mut map = match document {
                Value::Object(map) => map.clone(),
                Value::Null => serde_json::Map::new(),
                _ => {
                    return Err(PathError::Unplaceable {
                        path: format!(".{name}"),
                    })
                }
            };
            let existing = map.get(name).cloned().unwrap_or(Value::Null);
            let updated = if rest.is_empty() {
                value
            } else {
                insert_rec(&existing, rest, value)?
            };
            map.insert(name.clone(), updated);
            Ok(Value::Object(map))
        }
        Segment::Index(idx) => {
            let mut items = match document {
                Value::Array(items) => items.clone(),
                _ => {
                    return Err(PathError::Unplaceable {
                        path: format!("[{idx}]"),
                    })
                }
            };
            if *idx > items.len() {
                return Err(PathError::Unplaceable {
                    path: format!("[{idx}]"),
                });
            }
            let existing = items.get(*idx).cloned().unwrap_or(Value::Null);
            let updated = if rest.is_empty() {
                value
            } else {
                insert_rec(&existing, rest, value)?
            };
            if *idx == items.len() {
                items.push(updated);
            } else {
                items[*idx] = updated;
            }
            Ok(Value::Array(items))
        }
    }
}
