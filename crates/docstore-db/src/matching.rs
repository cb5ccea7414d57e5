//! Filter evaluation and `$set` application for stores that keep
//! documents in process.
//!
//! Filters follow the MongoDB query language subset used by the client:
//! equality on (dotted) field paths, `$eq $ne $gt $gte $lt $lte $in $nin
//! $exists`, and the top-level `$and`, `$or` and `$nor`. Comparisons only
//! hold between values of the same kind; integers compare exactly and
//! against doubles as numbers.

use std::cmp::Ordering;

use anyhow::Result;
use bson::{Bson, Document};

use docstore_data::{StoreError, ID_FIELD};

fn invalid(message: String) -> anyhow::Error {
    StoreError::Operation(message).into()
}

/// Check a filter for unknown operators and malformed operands.
pub fn validate(filter: &Document) -> Result<()> {
    matches(&Document::new(), filter).map(|_| ())
}

/// Does `doc` satisfy every clause of `filter`?
pub fn matches(doc: &Document, filter: &Document) -> Result<bool> {
    let mut matched = true;
    for (key, condition) in filter {
        let clause = match key.as_str() {
            "$and" => clauses(key, condition)?
                .into_iter()
                .map(|c| matches(doc, c))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .all(|m| m),
            "$or" => clauses(key, condition)?
                .into_iter()
                .map(|c| matches(doc, c))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .any(|m| m),
            "$nor" => !clauses(key, condition)?
                .into_iter()
                .map(|c| matches(doc, c))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .any(|m| m),
            op if op.starts_with('$') => {
                return Err(invalid(format!("unknown top level operator: {op}")))
            }
            path => field_matches(doc, path, condition)?,
        };
        matched &= clause;
    }
    Ok(matched)
}

fn clauses<'a>(op: &str, value: &'a Bson) -> Result<Vec<&'a Document>> {
    let Bson::Array(items) = value else {
        return Err(invalid(format!("{op} must be an array")));
    };
    if items.is_empty() {
        return Err(invalid(format!("{op} must be a nonempty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(clause) => Ok(clause),
            _ => Err(invalid(format!("{op} entries must be documents"))),
        })
        .collect()
}

fn field_matches(doc: &Document, path: &str, condition: &Bson) -> Result<bool> {
    let values = candidates(doc, path);
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => {
            let mut matched = true;
            for (op, operand) in ops {
                matched &= apply_operator(&values, op, operand)?;
            }
            Ok(matched)
        }
        _ => Ok(equals(&values, condition)),
    }
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn apply_operator(values: &[&Bson], op: &str, operand: &Bson) -> Result<bool> {
    let matched = match op {
        "$eq" => equals(values, operand),
        "$ne" => !equals(values, operand),
        "$gt" => compares(values, operand, |o| o == Ordering::Greater),
        "$gte" => compares(values, operand, |o| o != Ordering::Less),
        "$lt" => compares(values, operand, |o| o == Ordering::Less),
        "$lte" => compares(values, operand, |o| o != Ordering::Greater),
        "$in" => in_list(op, values, operand)?,
        "$nin" => !in_list(op, values, operand)?,
        "$exists" => !values.is_empty() == truthy(operand),
        _ => return Err(invalid(format!("unknown operator: {op}"))),
    };
    Ok(matched)
}

/// Resolve a dotted path to the single value it names.
/// Numeric segments index into arrays.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Every value a query path reaches. A field name applied to an array
/// continues into each embedded document of it.
pub fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut found = Vec::new();
    if let Some((head, rest)) = path.split_once('.') {
        if let Some(value) = doc.get(head) {
            descend(value, rest, &mut found);
        }
    } else if let Some(value) = doc.get(path) {
        found.push(value);
    }
    found
}

fn descend<'a>(value: &'a Bson, path: &str, found: &mut Vec<&'a Bson>) {
    match value {
        Bson::Document(inner) => found.extend(candidates(inner, path)),
        Bson::Array(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (path, None),
            };
            if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get(i)) {
                match rest {
                    Some(rest) => descend(item, rest, found),
                    None => found.push(item),
                }
            }
            for item in items {
                if let Bson::Document(inner) = item {
                    found.extend(candidates(inner, path));
                }
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(n) => n,
        }
    }
}

fn number(value: &Bson) -> Option<Number> {
    match value {
        Bson::Int32(n) => Some(Number::Int(i64::from(*n))),
        Bson::Int64(n) => Some(Number::Int(*n)),
        Bson::Double(n) => Some(Number::Float(*n)),
        _ => None,
    }
}

/// Numeric value of an int or double
pub fn as_f64(value: &Bson) -> Option<f64> {
    number(value).map(Number::as_f64)
}

/// Integers compare exactly; a double on either side compares as `f64`
fn compare_numbers(a: Number, b: Number) -> Option<Ordering> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Some(x.cmp(&y)),
        (x, y) => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

/// Value equality as the server applies it. Numbers compare by value,
/// embedded documents field by field in order.
pub fn same(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((kx, vx), (ky, vy))| kx == ky && same(vx, vy))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| same(p, q))
        }
        _ => match (number(a), number(b)) {
            (Some(x), Some(y)) => compare_numbers(x, y) == Some(Ordering::Equal),
            _ => a == b,
        },
    }
}

/// Byte level sameness: like [`same`] but types must match too.
fn identical(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|((kx, vx), (ky, vy))| kx == ky && identical(vx, vy))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| identical(p, q))
        }
        _ => a == b,
    }
}

/// Equality as queries see it: a missing field equals null,
/// and an array field matches if any element does.
fn equals(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }
    values.iter().any(|value| match value {
        Bson::Array(items) => same(value, target) || items.iter().any(|i| same(i, target)),
        _ => same(value, target),
    })
}

fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (number(a), number(b)) {
        return compare_numbers(x, y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compares<F>(values: &[&Bson], operand: &Bson, accept: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    values.iter().any(|value| match value {
        Bson::Array(items) => items
            .iter()
            .any(|item| compare(item, operand).is_some_and(&accept)),
        _ => compare(value, operand).is_some_and(&accept),
    })
}

fn in_list(op: &str, values: &[&Bson], operand: &Bson) -> Result<bool> {
    let Bson::Array(choices) = operand else {
        return Err(invalid(format!("{op} needs an array")));
    };
    Ok(choices.iter().any(|c| equals(values, c)))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => as_f64(other).map_or(true, |n| n != 0.0),
    }
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 0,
        Some(Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)) => 1,
        Some(Bson::String(_) | Bson::Symbol(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::Binary(_)) => 5,
        Some(Bson::ObjectId(_)) => 6,
        Some(Bson::Boolean(_)) => 7,
        Some(Bson::DateTime(_)) => 8,
        Some(_) => 9,
    }
}

/// Total order used for sorting: values of different kinds order by
/// kind, a missing field sorts with null.
pub fn sort_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}

/// Merge `fields` into `doc` the way `$set` does.
///
/// Either every field is applied or none is. Returns whether the
/// document's contents changed.
pub fn apply_set(doc: &mut Document, fields: &Document) -> Result<bool> {
    if fields.is_empty() {
        return Err(invalid("'$set' is empty".to_string()));
    }
    let mut updated = doc.clone();
    let mut changed = false;
    for (path, value) in fields {
        if path.starts_with('$') {
            return Err(invalid(format!("invalid field name: {path}")));
        }
        if path == ID_FIELD {
            if doc.get(ID_FIELD) != Some(value) {
                return Err(invalid(
                    "Performing an update on the path '_id' would modify the immutable field '_id'"
                        .to_string(),
                ));
            }
            continue;
        }
        changed |= set_path(&mut updated, path, value.clone())?;
    }
    *doc = updated;
    Ok(changed)
}

fn cannot_create(field: &str, parent: &str) -> anyhow::Error {
    invalid(format!(
        "Cannot create field '{field}' in element {{{parent}: ...}}"
    ))
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<bool> {
    let Some((head, rest)) = path.split_once('.') else {
        let changed = !doc
            .get(path)
            .is_some_and(|current| identical(current, &value));
        doc.insert(path, value);
        return Ok(changed);
    };
    if !doc.contains_key(head) {
        doc.insert(head, Document::new());
    }
    match doc.get_mut(head) {
        Some(child) => set_within(child, head, rest, value),
        None => Err(cannot_create(rest, head)),
    }
}

/// Set `path` below `target`, the value found at field `parent`.
/// Numeric segments address array elements; arrays grow with nulls.
fn set_within(target: &mut Bson, parent: &str, path: &str, value: Bson) -> Result<bool> {
    let items = match target {
        Bson::Document(inner) => return set_path(inner, path, value),
        Bson::Array(items) => items,
        _ => return Err(cannot_create(path, parent)),
    };
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Ok(index) = head.parse::<usize>() else {
        return Err(cannot_create(head, parent));
    };

    let grown = index >= items.len();
    if grown {
        items.resize(index, Bson::Null);
        items.push(match rest {
            Some(_) => Bson::Document(Document::new()),
            None => Bson::Null,
        });
    }
    match rest {
        Some(rest) => Ok(set_within(&mut items[index], head, rest, value)? || grown),
        None => {
            let changed = grown || !identical(&items[index], &value);
            items[index] = value;
            Ok(changed)
        }
    }
}
