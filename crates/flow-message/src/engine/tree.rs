//! Tree-path addressing over nested maps and lists.
//!
//! A path is a sequence of segments, each a map key optionally followed by
//! one or more list indices: `name`, `name[2]`, `name[0][1]`, or `[3]` for a
//! list held under the empty key. Walks start from a map, so callers holding
//! a bare root value wrap it under the empty key first.

use crate::error::{MessageError, Result};
use crate::value::{Map, Value};
use once_cell::sync::Lazy;
use regex::Regex;

static SEGMENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[]*?)(?:\[(.+)\])?$").expect("valid regex"));

/// One path element: a map key plus any list indices applied after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub indices: Vec<usize>,
}

impl Segment {
    fn parse(codec: &'static str, field: &str, element: &str) -> Result<Self> {
        let caps = SEGMENT_PATTERN.captures(element).ok_or_else(|| {
            MessageError::invalid_field(codec, field, format!("'{element}' is not a path element"))
        })?;
        let indices = match caps.get(2) {
            Some(group) => group
                .as_str()
                .split("][")
                .map(|s| {
                    s.parse::<usize>().map_err(|_| {
                        MessageError::invalid_field(
                            codec,
                            field,
                            format!("path element '{element}' has a malformed index '{s}'"),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            name: caps[1].to_owned(),
            indices,
        })
    }
}

/// A parsed, non-empty tree path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn parse<'e>(
        codec: &'static str,
        field: &str,
        elements: impl IntoIterator<Item = &'e str>,
    ) -> Result<Self> {
        let segments = elements
            .into_iter()
            .map(|e| Segment::parse(codec, field, e))
            .collect::<Result<Vec<_>>>()?;
        if segments.is_empty() {
            return Err(MessageError::invalid_field(codec, field, "empty path"));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// How a walk treats missing or mismatched nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Walk {
    /// Create missing containers and pad lists with nulls.
    pub vivify: bool,
    /// Treat a lone map as a one-element list when an index addresses it.
    pub promote: bool,
}

impl Walk {
    pub const READ: Walk = Walk {
        vivify: false,
        promote: false,
    };
    pub const WRITE: Walk = Walk {
        vivify: true,
        promote: false,
    };

    pub fn promoting(self) -> Self {
        Self {
            promote: true,
            ..self
        }
    }
}

/// A vivifying walk met a non-null value of the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub segment: String,
    pub found: &'static str,
}

impl Conflict {
    pub fn into_error(self, field: &str) -> MessageError {
        MessageError::PathConflict {
            field: field.to_owned(),
            segment: self.segment,
            found: self.found,
        }
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Map,
    List,
}

impl Kind {
    fn empty(self) -> Value {
        match self {
            Kind::Map => Value::Map(Map::new()),
            Kind::List => Value::List(Vec::new()),
        }
    }
}

/// Walks `path` from `root` and hands the final container to `on_map` (with
/// the key) or `on_list` (with the index). Returns `Ok(None)` if the walk was
/// abandoned because a node was missing and `walk.vivify` is false.
pub fn traverse<T, M, L>(
    root: &mut Map,
    path: &Path,
    walk: Walk,
    on_map: M,
    on_list: L,
) -> std::result::Result<Option<T>, Conflict>
where
    M: FnOnce(&mut Map, &str) -> T,
    L: FnOnce(&mut Vec<Value>, usize) -> T,
{
    descend(root, &path.segments, walk, on_map, on_list)
}

fn descend<T, M, L>(
    map: &mut Map,
    segments: &[Segment],
    walk: Walk,
    on_map: M,
    on_list: L,
) -> std::result::Result<Option<T>, Conflict>
where
    M: FnOnce(&mut Map, &str) -> T,
    L: FnOnce(&mut Vec<Value>, usize) -> T,
{
    let Some((segment, rest)) = segments.split_first() else {
        return Ok(None);
    };

    if rest.is_empty() {
        return Ok(match segment.indices.split_last() {
            None => Some(on_map(map, &segment.name)),
            Some((&last, leading)) => match list_at(map, segment, leading, walk)? {
                Some(list) => {
                    if walk.vivify {
                        pad(list, last);
                    }
                    (last < list.len()).then(|| on_list(list, last))
                }
                None => None,
            },
        });
    }

    let next = match segment.indices.split_last() {
        None => match entry(map, &segment.name, Kind::Map, walk) {
            Some(value) => as_map(value, &segment.name, walk)?,
            None => None,
        },
        Some((&last, leading)) => match list_at(map, segment, leading, walk)? {
            Some(list) => match element(list, last, Kind::Map, walk) {
                Some(value) => as_map(value, &segment.name, walk)?,
                None => None,
            },
            None => None,
        },
    };
    match next {
        Some(child) => descend(child, rest, walk, on_map, on_list),
        None => Ok(None),
    }
}

/// The list at `map[segment.name]`, then through each of the leading indices.
fn list_at<'m>(
    map: &'m mut Map,
    segment: &Segment,
    leading: &[usize],
    walk: Walk,
) -> std::result::Result<Option<&'m mut Vec<Value>>, Conflict> {
    let Some(value) = entry(map, &segment.name, Kind::List, walk) else {
        return Ok(None);
    };
    let Some(mut list) = as_list(value, &segment.name, walk)? else {
        return Ok(None);
    };
    for &index in leading {
        let Some(value) = element(list, index, Kind::List, walk) else {
            return Ok(None);
        };
        match as_list(value, &segment.name, walk)? {
            Some(inner) => list = inner,
            None => return Ok(None),
        }
    }
    Ok(Some(list))
}

fn entry<'m>(map: &'m mut Map, key: &str, kind: Kind, walk: Walk) -> Option<&'m mut Value> {
    let vacant = map.get(key).map_or(true, Value::is_null);
    if vacant {
        if !walk.vivify {
            return None;
        }
        map.insert(key.to_owned(), kind.empty());
    }
    map.get_mut(key)
}

fn element(list: &mut Vec<Value>, index: usize, kind: Kind, walk: Walk) -> Option<&mut Value> {
    if walk.vivify {
        pad(list, index);
    }
    let slot = list.get_mut(index)?;
    if slot.is_null() {
        if !walk.vivify {
            return None;
        }
        *slot = kind.empty();
    }
    Some(slot)
}

fn pad(list: &mut Vec<Value>, index: usize) {
    if list.len() <= index {
        list.resize(index + 1, Value::Null);
    }
}

fn as_map<'v>(
    value: &'v mut Value,
    segment: &str,
    walk: Walk,
) -> std::result::Result<Option<&'v mut Map>, Conflict> {
    match value {
        Value::Map(map) => Ok(Some(map)),
        other if walk.vivify => Err(Conflict {
            segment: segment.to_owned(),
            found: other.kind(),
        }),
        _ => Ok(None),
    }
}

fn as_list<'v>(
    value: &'v mut Value,
    segment: &str,
    walk: Walk,
) -> std::result::Result<Option<&'v mut Vec<Value>>, Conflict> {
    if walk.promote && matches!(value, Value::Map(_)) {
        let single = std::mem::take(value);
        *value = Value::List(vec![single]);
    }
    match value {
        Value::List(list) => Ok(Some(list)),
        other if walk.vivify => Err(Conflict {
            segment: segment.to_owned(),
            found: other.kind(),
        }),
        _ => Ok(None),
    }
}

/// Paths of every leaf under `value`, in traversal order. Map keys are joined
/// with `separator`, list elements are suffixed `[i]`. Null list elements and
/// empty containers contribute nothing.
pub fn leaves<'v>(value: &'v Value, separator: &str) -> Vec<(String, &'v Value)> {
    let mut found = Vec::new();
    collect(String::new(), separator, value, &mut found);
    found
}

fn collect<'v>(path: String, separator: &str, value: &'v Value, found: &mut Vec<(String, &'v Value)>) {
    match value {
        Value::Map(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}{separator}{key}")
                };
                collect(child_path, separator, child, found);
            }
        }
        Value::List(list) => {
            for (index, child) in list.iter().enumerate() {
                if !child.is_null() {
                    collect(format!("{path}[{index}]"), separator, child, found);
                }
            }
        }
        leaf => found.push((path, leaf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(dotted: &str) -> Path {
        Path::parse("test", dotted, dotted.split('.')).unwrap()
    }

    fn root(json: serde_json::Value) -> Map {
        match Value::from(json) {
            Value::Map(m) => m,
            _ => panic!("not a map"),
        }
    }

    fn set(map: &mut Map, p: &str, value: Value) -> std::result::Result<Option<()>, Conflict> {
        let list_value = value.clone();
        traverse(
            map,
            &path(p),
            Walk::WRITE,
            |m, k| {
                m.insert(k.to_owned(), value);
            },
            |l, i| l[i] = list_value,
        )
    }

    fn get(map: &mut Map, p: &str) -> Option<Value> {
        traverse(map, &path(p), Walk::READ, |m, k| m.get(k).cloned(), |l, i| {
            l.get(i).cloned()
        })
        .unwrap()
        .flatten()
    }

    #[test]
    fn test_segment_parsing() {
        let p = Path::parse("test", "a[1][2]", ["a[1][2]"]).unwrap();
        assert_eq!(
            p.segments(),
            &[Segment {
                name: "a".into(),
                indices: vec![1, 2]
            }]
        );
        let p = Path::parse("test", "[0]", ["[0]"]).unwrap();
        assert_eq!(p.segments()[0].name, "");

        assert!(Path::parse("test", "a[x]", ["a[x]"]).is_err());
        assert!(Path::parse("test", "a[-1]", ["a[-1]"]).is_err());
        assert!(Path::parse("test", "", std::iter::empty()).is_err());
    }

    #[test]
    fn test_empty_index_rejected() {
        for field in ["a[1][][2]", "a[][0]", "a[0][]"] {
            match Path::parse("test", field, [field]).unwrap_err() {
                MessageError::InvalidField { reason, .. } => {
                    assert!(reason.contains("malformed index ''"), "{reason}")
                }
                other => panic!("unexpected {other}"),
            }
        }
    }

    #[test]
    fn test_vivify_pads_lists() {
        let mut map = Map::new();
        set(&mut map, "a.b[2]", Value::from("x")).unwrap();
        assert_eq!(
            Value::Map(map.clone()).to_json(),
            Some(json!({"a": {"b": [null, null, "x"]}}))
        );
        assert_eq!(get(&mut map, "a.b[2]"), Some(Value::from("x")));
        assert_eq!(get(&mut map, "a.b[5]"), None);
        assert_eq!(get(&mut map, "a.c.d"), None);
    }

    #[test]
    fn test_nested_indices() {
        let mut map = Map::new();
        set(&mut map, "m[1][0].k", Value::from(1)).unwrap();
        assert_eq!(
            Value::Map(map).to_json(),
            Some(json!({"m": [null, [{"k": 1}]]}))
        );
    }

    #[test]
    fn test_write_through_scalar_conflicts() {
        let mut map = root(json!({"a": 1, "l": [1]}));
        let conflict = set(&mut map, "a.b", Value::from(2)).unwrap_err();
        assert_eq!(
            conflict,
            Conflict {
                segment: "a".into(),
                found: "number"
            }
        );
        assert!(set(&mut map, "a[0]", Value::from(2)).is_err());
        assert!(set(&mut map, "l.x", Value::from(2)).is_err());
        assert!(set(&mut map, "l[0].x", Value::from(2)).is_err());
        // reads through the same shapes are simply absent
        assert_eq!(get(&mut map, "a.b"), None);
    }

    #[test]
    fn test_null_is_replaced_by_container() {
        let mut map = root(json!({"a": null}));
        set(&mut map, "a.b", Value::from(2)).unwrap();
        assert_eq!(get(&mut map, "a.b"), Some(Value::from(2)));
    }

    #[test]
    fn test_promotion_views_single_map_as_list() {
        let mut map = root(json!({"a": {"b": 1}}));
        let p = path("a[0].b");
        let found = traverse(
            &mut map,
            &p,
            Walk::READ.promoting(),
            |m, k| m.get(k).cloned(),
            |l, i| l.get(i).cloned(),
        )
        .unwrap()
        .flatten();
        assert_eq!(found, Some(Value::from(1)));
    }

    #[test]
    fn test_leaves() {
        let value = Value::from(json!({
            "a": {"b": [1, null, {"c": true}]},
            "d": null,
            "e": {},
            "f": []
        }));
        let paths: Vec<String> = leaves(&value, ".").into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["a.b[0]", "a.b[2].c", "d"]);

        let list = Value::from(json!([1, 2]));
        let paths: Vec<String> = leaves(&list, ".").into_iter().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["[0]", "[1]"]);
    }
}
