//! Filter and query options
//!
//! A filter maps field names to tests: a string test is a regular expression
//! searched in a string field, a numeric test requires an equal number, and
//! any other test never matches. Options order the matching records by one or
//! more fields and cut a `from`/`count` window out of the result.

use crate::error::StorageError;
use crate::types::{Record, RecordId, Value, ID_FIELD};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field → test mapping; an empty filter matches every record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    tests: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test for `name`
    pub fn field(mut self, name: &str, test: impl Into<Value>) -> Self {
        self.tests.insert(name.to_string(), test.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Build from a JSON object; anything else yields `None`.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        let serde_json::Value::Object(object) = json else {
            return None;
        };
        Some(Self {
            tests: object
                .into_iter()
                .map(|(name, test)| (name, Value::from(test)))
                .collect(),
        })
    }

    fn compile(&self) -> Result<Vec<(&str, FieldTest)>, StorageError> {
        self.tests
            .iter()
            .map(|(name, test)| {
                let compiled = match test {
                    Value::String(pattern) => {
                        FieldTest::Pattern(Regex::new(pattern).map_err(|source| {
                            StorageError::InvalidFilter {
                                field: name.clone(),
                                source,
                            }
                        })?)
                    }
                    Value::Number(n) => FieldTest::Equals(*n),
                    _ => FieldTest::Never,
                };
                Ok((name.as_str(), compiled))
            })
            .collect()
    }
}

enum FieldTest {
    Pattern(Regex),
    Equals(f64),
    Never,
}

impl FieldTest {
    fn matches(&self, field: Option<&Value>) -> bool {
        match (self, field) {
            (FieldTest::Pattern(pattern), Some(Value::String(s))) => pattern.is_match(s),
            (FieldTest::Equals(expected), Some(Value::Number(n))) => n == expected,
            _ => false,
        }
    }
}

/// Sort direction for one ordering field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Positive means ascending, anything else descending
    pub fn from_sign(direction: i64) -> Self {
        if direction > 0 {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

/// Ordering and pagination applied after filtering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Ordering fields, applied in sequence
    pub order: Vec<(String, SortDirection)>,
    /// Number of matching records to skip
    pub from: Option<usize>,
    /// Maximum number of ids to return; zero means no limit
    pub count: Option<usize>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by(mut self, field: &str, direction: SortDirection) -> Self {
        self.order.push((field.to_string(), direction));
        self
    }

    pub fn from(mut self, from: usize) -> Self {
        self.from = Some(from);
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Build from `{ "order": { field: direction }, "from": n, "count": n }`.
    ///
    /// Ordering fields keep the order they appear in the object.
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        let serde_json::Value::Object(object) = json else {
            return None;
        };
        let mut options = Self::new();
        if let Some(serde_json::Value::Object(order)) = object.get("order") {
            for (field, direction) in order {
                let ascending = direction.as_f64().is_some_and(|d| d > 0.0);
                options.order.push((
                    field.clone(),
                    if ascending {
                        SortDirection::Ascending
                    } else {
                        SortDirection::Descending
                    },
                ));
            }
        }
        let window = |key: &str| {
            object
                .get(key)
                .and_then(serde_json::Value::as_u64)
                .map(|n| n as usize)
        };
        options.from = window("from");
        options.count = window("count");
        Some(options)
    }
}

fn field_of<'a>(record: &'a Record, name: &str) -> Option<Cow<'a, Value>> {
    if name == ID_FIELD {
        return Some(Cow::Owned(Value::String(record.id.clone())));
    }
    record.get(name).map(Cow::Borrowed)
}

fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.sort_cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Apply `filter` and `options` to `records`, returning the selected ids.
///
/// Records keep their incoming order unless `options` specifies an ordering;
/// the sort is stable.
pub fn select_ids<'a, I>(
    records: I,
    filter: Option<&Filter>,
    options: Option<&QueryOptions>,
) -> Result<Vec<RecordId>, StorageError>
where
    I: IntoIterator<Item = &'a Record>,
{
    let tests = match filter {
        Some(filter) => filter.compile()?,
        None => Vec::new(),
    };

    let mut matched: Vec<&Record> = records
        .into_iter()
        .filter(|record| {
            tests
                .iter()
                .all(|(name, test)| test.matches(field_of(record, name).as_deref()))
        })
        .collect();

    let Some(options) = options else {
        return Ok(matched.into_iter().map(|r| r.id.clone()).collect());
    };

    if !options.order.is_empty() {
        matched.sort_by(|a, b| {
            for (field, direction) in &options.order {
                let ordering =
                    compare_fields(field_of(a, field).as_deref(), field_of(b, field).as_deref());
                let ordering = match direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let from = options.from.unwrap_or(0);
    let count = match options.count {
        Some(0) | None => usize::MAX,
        Some(count) => count,
    };

    Ok(matched
        .into_iter()
        .skip(from)
        .take(count)
        .map(|r| r.id.clone())
        .collect())
}
