/// Typed document paths over JSON values
///
/// A `DocPath` is a dot-separated path such as `order.items.0.sku`. Numeric
/// segments index arrays (and fall back to object keys). Lookups that miss
/// return `PathError` instead of a silent null.

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(k) => f.write_str(k),
            Segment::Index(i) => write!(f, "{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty document path")]
    Empty,
    #[error("path '{0}' not found")]
    NotFound(String),
    #[error("cannot descend into scalar at '{0}'")]
    NotContainer(String),
    #[error("index out of range at '{0}'")]
    IndexOutOfRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocPath {
    segments: Vec<Segment>,
}

impl FromStr for DocPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let segments = trimmed
            .split('.')
            .map(|part| match part.parse::<usize>() {
                Ok(i) => Segment::Index(i),
                Err(_) => Segment::Key(part.to_string()),
            })
            .collect();
        Ok(Self { segments })
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

impl DocPath {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Path prefix up to and including segment `i`, for error messages
    fn prefix(&self, i: usize) -> String {
        let parts: Vec<String> = self.segments[..=i].iter().map(|s| s.to_string()).collect();
        parts.join(".")
    }

    pub fn get<'a>(&self, doc: &'a Value) -> Result<&'a Value, PathError> {
        let mut current = doc;
        for (i, segment) in self.segments.iter().enumerate() {
            current = match (current, segment) {
                (Value::Object(map), Segment::Key(k)) => map.get(k),
                (Value::Object(map), Segment::Index(idx)) => map.get(&idx.to_string()),
                (Value::Array(items), Segment::Index(idx)) => items.get(*idx),
                (Value::Array(_), Segment::Key(_)) => None,
                _ => return Err(PathError::NotContainer(self.prefix(i))),
            }
            .ok_or_else(|| PathError::NotFound(self.prefix(i)))?;
        }
        Ok(current)
    }

    /// Write `value` at this path, creating intermediate objects as needed.
    /// A null document or null intermediate is replaced by an object.
    pub fn set(&self, doc: &mut Value, value: Value) -> Result<(), PathError> {
        let (last, parents) = self.segments.split_last().ok_or(PathError::Empty)?;
        let mut current = doc;
        for (i, segment) in parents.iter().enumerate() {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match (current, segment) {
                (Value::Object(map), seg) => map
                    .entry(seg.to_string())
                    .or_insert_with(|| Value::Object(Map::new())),
                (Value::Array(items), Segment::Index(idx)) => items
                    .get_mut(*idx)
                    .ok_or_else(|| PathError::IndexOutOfRange(self.prefix(i)))?,
                _ => return Err(PathError::NotContainer(self.prefix(i))),
            };
        }

        let at = self.segments.len() - 1;
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        match (current, last) {
            (Value::Object(map), seg) => {
                map.insert(seg.to_string(), value);
                Ok(())
            }
            (Value::Array(items), Segment::Index(idx)) => {
                if *idx < items.len() {
                    items[*idx] = value;
                    Ok(())
                } else if *idx == items.len() {
                    items.push(value);
                    Ok(())
                } else {
                    Err(PathError::IndexOutOfRange(self.prefix(at)))
                }
            }
            _ => Err(PathError::NotContainer(self.prefix(at))),
        }
    }

    /// Remove the value at this path and return it
    pub fn delete(&self, doc: &mut Value) -> Result<Value, PathError> {
        let (last, parents) = self.segments.split_last().ok_or(PathError::Empty)?;
        let mut current = doc;
        for (i, segment) in parents.iter().enumerate() {
            current = match (current, segment) {
                (Value::Object(map), seg) => map.get_mut(&seg.to_string()),
                (Value::Array(items), Segment::Index(idx)) => items.get_mut(*idx),
                (Value::Array(_), Segment::Key(_)) => None,
                _ => return Err(PathError::NotContainer(self.prefix(i))),
            }
            .ok_or_else(|| PathError::NotFound(self.prefix(i)))?;
        }

        let at = self.segments.len() - 1;
        match (current, last) {
            (Value::Object(map), seg) => map
                .remove(&seg.to_string())
                .ok_or_else(|| PathError::NotFound(self.prefix(at))),
            (Value::Array(items), Segment::Index(idx)) if *idx < items.len() => Ok(items.remove(*idx)),
            (Value::Array(_), _) => Err(PathError::NotFound(self.prefix(at))),
            _ => Err(PathError::NotContainer(self.prefix(at))),
        }
    }
}

/// Loose truthiness used by edge conditions
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
