// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups numeric sample fields into series keyed by metric name and tag set.
//!
//! Every numeric field of a sample becomes a gauge named
//! `<measurement>_<field>`. Repeated observations of the same gauge and tag
//! set overwrite each other, so a flushed [`WriteRequest`] never holds two
//! series with equal labels.

use hashbrown::HashMap;
use serde::Deserialize;
use tracing::{debug, warn};
use ustr::Ustr;

use crate::constants::{METRIC_NAME_LABEL, METRIC_NAME_SEPARATOR};
use crate::errors::AggregationError;
use crate::sample::{Sample, SortedTags};

/// How tag key sets are checked across samples of one metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSchema {
    /// Any tag key set is accepted; each one is its own series.
    #[default]
    Heterogeneous,
    /// The first tag key set seen for a metric is the only one accepted.
    Homogeneous,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub name: Ustr,
    pub tags: SortedTags,
    pub value: f64,
    /// Timestamp of the observation that produced `value`, as parsed.
    pub timestamp: i64,
}

impl Series {
    /// Label pairs including the metric name label, sorted by label name.
    /// Sorting puts `__name__` among the tags, the canonical remote-write order.
    #[must_use]
    pub fn labels(&self) -> Vec<(&str, &str)> {
        let mut labels: Vec<(&str, &str)> = self
            .tags
            .as_slice()
            .iter()
            .filter(|(k, _)| k.as_str() != METRIC_NAME_LABEL)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        labels.push((METRIC_NAME_LABEL, self.name.as_str()));
        labels.sort_unstable_by(|a, b| a.0.cmp(b.0));
        labels
    }
}

/// Ordered batch of series handed to the wire encoder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteRequest {
    pub series: Vec<Series>,
}

impl WriteRequest {
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

struct MetricFamily {
    label_keys: Vec<Ustr>,
    series: Vec<Series>,
    index: HashMap<SortedTags, usize>,
}

impl MetricFamily {
    fn new(tags: &SortedTags) -> Self {
        Self {
            label_keys: tags.keys().collect(),
            series: Vec::new(),
            index: HashMap::new(),
        }
    }
}

pub struct Aggregator {
    label_schema: LabelSchema,
    families: Vec<MetricFamily>,
    by_name: HashMap<Ustr, usize>,
}

impl Aggregator {
    #[must_use]
    pub fn new(label_schema: LabelSchema) -> Self {
        Self {
            label_schema,
            families: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Records one observation of `name` with `tags`, replacing any previous
    /// value for the same pair.
    ///
    /// A `__name__` tag is dropped; the metric name label always comes from
    /// `name`.
    pub fn insert_metric(
        &mut self,
        name: Ustr,
        tags: &SortedTags,
        value: f64,
        timestamp: i64,
    ) -> Result<(), AggregationError> {
        let stripped;
        let tags = if tags.get(METRIC_NAME_LABEL).is_some() {
            let mut owned = tags.clone();
            owned.remove(METRIC_NAME_LABEL);
            stripped = owned;
            &stripped
        } else {
            tags
        };

        let family_idx = match self.by_name.get(&name) {
            Some(idx) => *idx,
            None => {
                self.families.push(MetricFamily::new(tags));
                let idx = self.families.len() - 1;
                self.by_name.insert(name, idx);
                idx
            }
        };
        let family = &mut self.families[family_idx];

        if self.label_schema == LabelSchema::Homogeneous
            && !family.label_keys.iter().copied().eq(tags.keys())
        {
            return Err(AggregationError::InconsistentLabels {
                metric: name.to_string(),
                expected: family.label_keys.iter().map(ToString::to_string).collect(),
                found: tags.keys().map(|k| k.to_string()).collect(),
            });
        }

        match family.index.get(tags) {
            Some(&series_idx) => {
                let series = &mut family.series[series_idx];
                series.value = value;
                series.timestamp = timestamp;
            }
            None => {
                family.index.insert(tags.clone(), family.series.len());
                family.series.push(Series {
                    name,
                    tags: tags.clone(),
                    value,
                    timestamp,
                });
            }
        }
        Ok(())
    }

    /// Inserts every numeric field of `sample`. String fields are skipped.
    ///
    /// Returns the number of fields rejected by the label schema check.
    pub fn insert(&mut self, sample: &Sample) -> usize {
        let mut rejected = 0;
        for (field, value) in &sample.fields {
            let Some(value) = value.as_f64() else {
                debug!(
                    "Skipping string field {} of {}",
                    field, sample.measurement
                );
                continue;
            };
            let name = metric_name(sample.measurement, *field);
            if let Err(e) = self.insert_metric(name, &sample.tags, value, sample.timestamp) {
                warn!("Rejected sample for {}: {}", name, e);
                rejected += 1;
            }
        }
        rejected
    }

    /// Number of distinct series currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.iter().map(|f| f.series.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the aggregator. Metrics come out in first-seen order, and
    /// series of a metric in the order their tag sets were first seen.
    #[must_use]
    pub fn into_write_request(self) -> WriteRequest {
        WriteRequest {
            series: self
                .families
                .into_iter()
                .flat_map(|family| family.series)
                .collect(),
        }
    }
}

/// Aggregates `samples` in order, returning the request and the number of
/// rejected fields.
#[must_use]
pub fn aggregate(samples: &[Sample], label_schema: LabelSchema) -> (WriteRequest, usize) {
    let mut aggregator = Aggregator::new(label_schema);
    let rejected: usize = samples.iter().map(|s| aggregator.insert(s)).sum();
    if rejected > 0 {
        warn!("Total of {} fields failed to aggregate", rejected);
    }
    (aggregator.into_write_request(), rejected)
}

#[must_use]
pub fn metric_name(measurement: Ustr, field: Ustr) -> Ustr {
    let mut name = String::with_capacity(measurement.len() + field.len() + 1);
    name.push_str(measurement.as_str());
    name.push(METRIC_NAME_SEPARATOR);
    name.push_str(field.as_str());
    Ustr::from(name.as_str())
}
