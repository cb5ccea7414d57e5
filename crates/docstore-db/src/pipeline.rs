//! Aggregation pipelines for stores that keep documents in process.
//!
//! Supported stages are `$match`, `$group`, `$sort`, `$skip`, `$limit`
//! and `$count`. Group accumulators are `$sum`, `$avg`, `$min`, `$max`,
//! `$first`, `$last` and `$push`. Expressions are field paths (`"$price"`),
//! literals, and documents or arrays of those.

use std::cmp::Ordering;

use anyhow::Result;
use bson::{Bson, Document};

use docstore_data::{StoreError, ID_FIELD};

use crate::matching;

fn invalid(message: String) -> anyhow::Error {
    StoreError::Operation(message).into()
}

/// Run `pipeline` over `documents`, stage by stage
pub fn run(documents: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    let mut current = documents;
    for stage in pipeline {
        let mut fields = stage.iter();
        let (Some((name, spec)), None) = (fields.next(), fields.next()) else {
            return Err(invalid(
                "A pipeline stage specification object must contain exactly one field."
                    .to_string(),
            ));
        };
        current = match name.as_str() {
            "$match" => {
                let filter = stage_document(name, spec)?;
                matching::validate(filter)?;
                let mut kept = Vec::with_capacity(current.len());
                for doc in current {
                    if matching::matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$group" => group(current, stage_document(name, spec)?)?,
            "$sort" => sort(current, stage_document(name, spec)?)?,
            "$skip" => {
                let skip = count(name, spec)?;
                current.into_iter().skip(skip).collect()
            }
            "$limit" => match count(name, spec)? {
                0 => return Err(invalid("the limit must be positive".to_string())),
                limit => current.into_iter().take(limit).collect(),
            },
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(invalid("the count field must be a string".to_string()));
                };
                if current.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field.as_str(), integer(current.len() as i64));
                    vec![counted]
                }
            }
            other => {
                return Err(invalid(format!(
                    "Unrecognized pipeline stage name: '{other}'"
                )))
            }
        };
    }
    Ok(current)
}

fn stage_document<'a>(name: &str, spec: &'a Bson) -> Result<&'a Document> {
    match spec {
        Bson::Document(doc) => Ok(doc),
        _ => Err(invalid(format!(
            "the {name} stage specification must be an object"
        ))),
    }
}

fn count(name: &str, spec: &Bson) -> Result<usize> {
    match matching::as_f64(spec) {
        Some(n) if n >= 0.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(invalid(format!(
            "the {name} stage needs a non-negative whole number"
        ))),
    }
}

/// Smallest integer type that holds `n`, as the server reports counts
fn integer(n: i64) -> Bson {
    match i32::try_from(n) {
        Ok(small) => Bson::Int32(small),
        Err(_) => Bson::Int64(n),
    }
}

/// Value of an expression against one document; `None` for a missing field
fn evaluate(doc: &Document, expression: &Bson) -> Option<Bson> {
    match expression {
        Bson::String(path) if path.starts_with('$') => {
            matching::lookup(doc, &path[1..]).cloned()
        }
        Bson::Document(fields) => {
            let mut value = Document::new();
            for (key, inner) in fields {
                if let Some(resolved) = evaluate(doc, inner) {
                    value.insert(key.as_str(), resolved);
                }
            }
            Some(Bson::Document(value))
        }
        Bson::Array(items) => Some(Bson::Array(
            items
                .iter()
                .map(|item| evaluate(doc, item).unwrap_or(Bson::Null))
                .collect(),
        )),
        literal => Some(literal.clone()),
    }
}

#[derive(Debug, Clone, Copy)]
enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
}

impl Accumulator {
    fn parse(field: &str, spec: &Bson) -> Result<(Accumulator, Bson)> {
        let Bson::Document(spec) = spec else {
            return Err(invalid(format!(
                "The field '{field}' must be an accumulator object"
            )));
        };
        let mut entries = spec.iter();
        let (Some((op, operand)), None) = (entries.next(), entries.next()) else {
            return Err(invalid(format!(
                "The field '{field}' must specify one accumulator"
            )));
        };
        let accumulator = match op.as_str() {
            "$sum" => Accumulator::Sum,
            "$avg" => Accumulator::Avg,
            "$min" => Accumulator::Min,
            "$max" => Accumulator::Max,
            "$first" => Accumulator::First,
            "$last" => Accumulator::Last,
            "$push" => Accumulator::Push,
            other => return Err(invalid(format!("unknown group operator '{other}'"))),
        };
        Ok((accumulator, operand.clone()))
    }

    fn apply(self, members: &[Document], operand: &Bson) -> Bson {
        let values: Vec<Option<Bson>> = members.iter().map(|d| evaluate(d, operand)).collect();
        match self {
            Accumulator::Sum => sum(values.iter().flatten()),
            Accumulator::Avg => {
                let numbers: Vec<f64> = values.iter().flatten().filter_map(matching::as_f64).collect();
                if numbers.is_empty() {
                    Bson::Null
                } else {
                    Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            Accumulator::Min => present(values)
                .min_by(|a, b| matching::sort_order(Some(a), Some(b)))
                .unwrap_or(Bson::Null),
            Accumulator::Max => present(values)
                .max_by(|a, b| matching::sort_order(Some(a), Some(b)))
                .unwrap_or(Bson::Null),
            Accumulator::First => values.into_iter().next().flatten().unwrap_or(Bson::Null),
            Accumulator::Last => values.into_iter().last().flatten().unwrap_or(Bson::Null),
            Accumulator::Push => Bson::Array(values.into_iter().flatten().collect()),
        }
    }
}

/// Values that are neither missing nor null
fn present(values: Vec<Option<Bson>>) -> impl Iterator<Item = Bson> {
    values
        .into_iter()
        .flatten()
        .filter(|value| !matches!(value, Bson::Null))
}

/// Integers add exactly until they overflow; any double makes a double
fn sum<'a>(values: impl Iterator<Item = &'a Bson>) -> Bson {
    let mut exact: Option<i64> = Some(0);
    let mut total = 0.0;
    for value in values {
        match value {
            Bson::Int32(n) => exact = exact.and_then(|e| e.checked_add(i64::from(*n))),
            Bson::Int64(n) => exact = exact.and_then(|e| e.checked_add(*n)),
            Bson::Double(_) => exact = None,
            _ => continue,
        }
        total += matching::as_f64(value).unwrap_or_default();
    }
    match exact {
        Some(n) => integer(n),
        None => Bson::Double(total),
    }
}

/// Groups in order of first appearance
fn group(documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    let Some(key) = spec.get(ID_FIELD) else {
        return Err(invalid(
            "a group specification must include an _id".to_string(),
        ));
    };
    let accumulators = spec
        .iter()
        .filter(|(field, _)| field.as_str() != ID_FIELD)
        .map(|(field, acc)| Accumulator::parse(field, acc).map(|parsed| (field, parsed)))
        .collect::<Result<Vec<_>>>()?;

    let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();
    for doc in documents {
        let value = evaluate(&doc, key).unwrap_or(Bson::Null);
        match groups.iter_mut().find(|(k, _)| matching::same(k, &value)) {
            Some((_, members)) => members.push(doc),
            None => groups.push((value, vec![doc])),
        }
    }

    Ok(groups
        .into_iter()
        .map(|(value, members)| {
            let mut out = Document::new();
            out.insert(ID_FIELD, value);
            for (field, (accumulator, operand)) in &accumulators {
                out.insert(field.as_str(), accumulator.apply(&members, operand));
            }
            out
        })
        .collect())
}

fn sort(mut documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    if spec.is_empty() {
        return Err(invalid(
            "$sort stage must have at least one sort key".to_string(),
        ));
    }
    let keys = spec
        .iter()
        .map(|(path, direction)| match matching::as_f64(direction) {
            Some(d) if d == 1.0 => Ok((path.as_str(), true)),
            Some(d) if d == -1.0 => Ok((path.as_str(), false)),
            _ => Err(invalid(format!("$sort key ordering must be 1 or -1: {path}"))),
        })
        .collect::<Result<Vec<_>>>()?;

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(path, ascending)| {
                let order =
                    matching::sort_order(matching::lookup(a, path), matching::lookup(b, path));
                if *ascending {
                    order
                } else {
                    order.reverse()
                }
            })
            .find(|order| order.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    fn products() -> Vec<Document> {
        vec![
            doc! { "name": "Laptop", "price": 1299.99, "category": "electronics", "stock": 4 },
            doc! { "name": "Headphones", "price": 79.99, "category": "electronics", "stock": 30 },
            doc! { "name": "Notebook", "price": 4.99, "category": "office", "stock": 200 },
        ]
    }

    #[test]
    fn test_average_price_by_category() {
        let pipeline = vec![doc! {
            "$group": { "_id": "$category", "avgPrice": { "$avg": "$price" } }
        }];
        let groups = run(products(), &pipeline).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].get_str("_id").unwrap(), "electronics");
        let avg = groups[0].get_f64("avgPrice").unwrap();
        assert!((avg - 689.99).abs() < 1e-9);
        assert_eq!(groups[1].get_str("_id").unwrap(), "office");
        assert_eq!(groups[1].get_f64("avgPrice").unwrap(), 4.99);
    }

    #[test]
    fn test_match_group_sort() {
        let pipeline = vec![
            doc! { "$match": { "stock": { "$gte": 10 } } },
            doc! { "$group": {
                "_id": "$category",
                "stock": { "$sum": "$stock" },
                "items": { "$sum": 1 },
                "names": { "$push": "$name" },
            } },
            doc! { "$sort": { "stock": -1 } },
        ];
        let groups = run(products(), &pipeline).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].get_str("_id").unwrap(), "office");
        assert_eq!(groups[0].get_i32("stock").unwrap(), 200);
        assert_eq!(groups[1].get_i32("stock").unwrap(), 30);
        assert_eq!(groups[1].get_i32("items").unwrap(), 1);
        assert_eq!(
            groups[1].get_array("names").unwrap(),
            &vec![Bson::from("Headphones")]
        );
    }

    #[test]
    fn test_min_max_first_last() {
        let pipeline = vec![
            doc! { "$sort": { "price": 1 } },
            doc! { "$group": {
                "_id": Bson::Null,
                "cheapest": { "$min": "$price" },
                "dearest": { "$max": "$price" },
                "first": { "$first": "$name" },
                "last": { "$last": "$name" },
                "missing": { "$avg": "$weight" },
            } },
        ];
        let groups = run(products(), &pipeline).unwrap();
        assert_eq!(groups.len(), 1);
        let all = &groups[0];
        assert_eq!(all.get("_id"), Some(&Bson::Null));
        assert_eq!(all.get_f64("cheapest").unwrap(), 4.99);
        assert_eq!(all.get_f64("dearest").unwrap(), 1299.99);
        assert_eq!(all.get_str("first").unwrap(), "Notebook");
        assert_eq!(all.get_str("last").unwrap(), "Laptop");
        assert_eq!(all.get("missing"), Some(&Bson::Null));
    }

    #[test]
    fn test_skip_limit_count() {
        let sorted = vec![
            doc! { "$sort": { "name": 1 } },
            doc! { "$skip": 1 },
            doc! { "$limit": 1 },
        ];
        let page = run(products(), &sorted).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].get_str("name").unwrap(), "Laptop");

        let counted = run(products(), &[doc! { "$count": "total" }]).unwrap();
        assert_eq!(counted, vec![doc! { "total": 3 }]);
        assert!(run(Vec::new(), &[doc! { "$count": "total" }]).unwrap().is_empty());
    }

    #[test]
    fn test_sum_overflows_to_double() {
        let docs = vec![doc! { "n": i64::MAX }, doc! { "n": 1_i64 }];
        let groups = run(docs, &[doc! { "$group": { "_id": 0, "n": { "$sum": "$n" } } }]).unwrap();
        assert!(matches!(groups[0].get("n"), Some(Bson::Double(_))));
    }

    #[test]
    fn test_rejects_bad_stages() {
        assert!(run(products(), &[doc! { "$search": { "cosmosSearch": {} } }]).is_err());
        assert!(run(products(), &[doc! { "$match": {}, "$limit": 1 }]).is_err());
        assert!(run(products(), &[doc! { "$limit": 0 }]).is_err());
        assert!(run(products(), &[doc! { "$sort": { "price": 2 } }]).is_err());
        assert!(run(products(), &[doc! { "$group": { "total": { "$sum": 1 } } }]).is_err());
        assert!(run(products(), &[doc! { "$group": { "_id": 1, "x": { "$median": 1 } } }]).is_err());
        assert!(run(products(), &[doc! { "$match": { "price": { "$near": 1 } } }]).is_err());
        assert_eq!(run(products(), &[]).unwrap().len(), 3);
    }
}
