//! Merge a list of records into one summary record.

use std::collections::{BTreeMap, BTreeSet};

use super::{Entity, EntityList, GroupKey};
use crate::exception::{SchedulerException, SchedulerResult};
use crate::model::vo::{FieldValue, Fields};

/// How the values of one field are merged, chosen by the value's variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Merge {
    /// Common prefix and suffix around a `*`.
    Pattern,
    /// Count of each categorical value.
    Histogram,
    Sum,
    Mean,
    Duration,
    Memory,
    /// Key-wise sum.
    Union,
    Concat,
    Reasons,
    Any,
    Earliest,
}

impl Merge {
    fn of(value: &FieldValue) -> Option<Self> {
        Some(match value {
            FieldValue::Null => return None,
            FieldValue::Text(_) => Merge::Pattern,
            FieldValue::Tag(_) | FieldValue::Histogram(_) => Merge::Histogram,
            FieldValue::Int(_) | FieldValue::Float(_) => Merge::Sum,
            FieldValue::Ratio(_) => Merge::Mean,
            FieldValue::Duration(_) => Merge::Duration,
            FieldValue::Memory(_) => Merge::Memory,
            FieldValue::Map(_) => Merge::Union,
            FieldValue::List(_) => Merge::Concat,
            FieldValue::Reasons(_) => Merge::Reasons,
            FieldValue::Bool(_) => Merge::Any,
            FieldValue::Time(_) => Merge::Earliest,
        })
    }

    fn apply(self, values: &[&FieldValue]) -> FieldValue {
        match self {
            Merge::Pattern => FieldValue::Text(common_pattern(values.iter().filter_map(|v| v.as_str()))),
            Merge::Histogram => {
                let mut counts = BTreeMap::new();
                for value in values {
                    match value {
                        FieldValue::Tag(tag) => *counts.entry(tag.clone()).or_insert(0) += 1,
                        FieldValue::Histogram(h) => {
                            for (tag, n) in h {
                                *counts.entry(tag.clone()).or_insert(0) += n;
                            }
                        }
                        _ => {}
                    }
                }
                FieldValue::Histogram(counts)
            }
            Merge::Sum => {
                if values.iter().all(|v| matches!(v, FieldValue::Int(_))) {
                    FieldValue::Int(values.iter().filter_map(|v| v.as_i64()).sum())
                } else {
                    FieldValue::Float(values.iter().filter_map(|v| v.as_f64()).sum())
                }
            }
            Merge::Mean => {
                let ratios: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                if ratios.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::Ratio(ratios.iter().sum::<f64>() / ratios.len() as f64)
                }
            }
            Merge::Duration => FieldValue::Duration(values.iter().filter_map(|v| v.as_duration()).sum()),
            Merge::Memory => FieldValue::Memory(
                values
                    .iter()
                    .filter_map(|v| match v {
                        FieldValue::Memory(m) => Some(*m),
                        _ => None,
                    })
                    .sum(),
            ),
            Merge::Union => {
                let mut union = BTreeMap::new();
                for map in values.iter().filter_map(|v| v.as_map()) {
                    for (key, n) in map {
                        *union.entry(key.clone()).or_insert(0) += n;
                    }
                }
                FieldValue::Map(union)
            }
            Merge::Concat => FieldValue::List(
                values
                    .iter()
                    .flat_map(|v| match v {
                        FieldValue::List(items) => items.clone(),
                        _ => vec![],
                    })
                    .collect(),
            ),
            Merge::Reasons => FieldValue::Reasons(
                values
                    .iter()
                    .flat_map(|v| match v {
                        FieldValue::Reasons(reasons) => reasons.clone(),
                        _ => vec![],
                    })
                    .collect(),
            ),
            Merge::Any => FieldValue::Bool(values.iter().any(|v| v.as_bool() == Some(true))),
            Merge::Earliest => values
                .iter()
                .filter_map(|v| v.as_time())
                .min()
                .map_or(FieldValue::Null, FieldValue::Time),
        }
    }
}

/// `job_0.out`, `job_1.out` and `job_22.out` become `job_*.out`. Identical
/// values are kept as they are and empty strings are ignored.
pub fn common_pattern<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let values: Vec<Vec<char>> = values
        .into_iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().collect())
        .collect();
    let Some(first) = values.first() else {
        return String::new();
    };
    if values.iter().all(|v| v == first) {
        return first.iter().collect();
    }

    let shortest = values.iter().map(Vec::len).min().unwrap_or(0);
    let prefix = (0..shortest)
        .take_while(|&i| values.iter().all(|v| v[i] == first[i]))
        .count();
    let suffix = (1..=shortest - prefix)
        .take_while(|&i| values.iter().all(|v| v[v.len() - i] == first[first.len() - i]))
        .count();

    let mut pattern: String = first[..prefix].iter().collect();
    pattern.push('*');
    pattern.extend(&first[first.len() - suffix..]);
    pattern
}

/// Merge the values one field takes across records. Values of another
/// variant family than the first present one are left out.
fn merge_field(field: &str, values: &[&FieldValue]) -> Option<FieldValue> {
    let present: Vec<&FieldValue> = values.iter().copied().filter(|v| !v.is_null()).collect();
    let strategy = Merge::of(present.first()?)?;
    let (same, other): (Vec<&FieldValue>, Vec<&FieldValue>) =
        present.into_iter().partition(|v| Merge::of(v) == Some(strategy));
    if !other.is_empty() {
        tracing::debug!("Field `{field}`: {} values of another type left out of the summary.", other.len());
    }
    Some(strategy.apply(&same))
}

impl EntityList {
    /// Merge every record into one summary record. Records are fetched first,
    /// a record whose fetch failed, even with an error, contributes the fields
    /// it has.
    pub async fn summarize(&self) -> SchedulerResult<Entity> {
        if self.is_empty() {
            return Err(SchedulerException::EmptyAggregate { kind: self.kind() });
        }
        let key_field = self.kind().key_field();
        let mut snapshots = Vec::with_capacity(self.len());
        for record in self {
            if let Err(e) = record.ensure_fetched().await {
                tracing::warn!("Summarizing {} <{}> without its detail: {e}", record.kind(), record.key());
            }
            snapshots.push(record.snapshot());
        }

        let names: BTreeSet<&String> = snapshots.iter().flat_map(Fields::keys).collect();
        let mut fields = Fields::new();
        for name in names.into_iter().filter(|name| name.as_str() != key_field) {
            let values: Vec<&FieldValue> = snapshots.iter().filter_map(|s| s.get(name)).collect();
            if let Some(value) = merge_field(name, &values) {
                fields.insert(name.clone(), value);
            }
        }

        let keys = self.keys();
        fields.insert(
            "members".to_owned(),
            FieldValue::List(keys.iter().copied().map(FieldValue::text).collect()),
        );
        Ok(Entity::synthetic(self.kind(), common_pattern(keys), fields))
    }

    /// One summary per bucket of [`EntityList::group_by`], each with a `title`.
    pub async fn summarize_groups(&self, field: &str) -> SchedulerResult<BTreeMap<GroupKey, Entity>> {
        let mut summaries = BTreeMap::new();
        for (key, group) in self.group_by(field).await? {
            let summary = group.summarize().await?;
            summary.set("title", FieldValue::text(key.to_string()));
            summaries.insert(key, summary);
        }
        Ok(summaries)
    }
}
