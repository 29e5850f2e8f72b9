//! Cascading filter pipeline.
//!
//! Every predicate is a pure stage `(Dataset, Predicate) -> Dataset`; the
//! pipeline threads the dataset through the stages in order. Options offered
//! for stage *k* come from the dataset already narrowed by stages *1..k-1*,
//! while the final row set is the plain conjunction of all predicates.

use crate::dataset::{date_to_days, Dataset};
use crate::error::{DashboardError, Result};
use crate::schema::Field;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub const DATE_ORDER_WARNING: &str = "From Date must be earlier than To Date.";

/// Sidebar order of the categorical pickers.
pub const SIDEBAR_DIMENSIONS: [Field; 7] = [
    Field::Region,
    Field::State,
    Field::Category,
    Field::SubCategory,
    Field::PaymentMethod,
    Field::Segment,
    Field::ShipMode,
];

/// Accepted values of one categorical dimension.
///
/// `Unrestricted` is the "All" entry of a picker; it is a separate variant so a
/// real value spelled "All" is still an ordinary restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    #[default]
    Unrestricted,
    RestrictedTo(BTreeSet<String>),
}

impl Selection {
    pub fn only(value: impl Into<String>) -> Self {
        Selection::RestrictedTo(BTreeSet::from([value.into()]))
    }

    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selection::RestrictedTo(values.into_iter().map(Into::into).collect())
    }

    /// Empty value lists from a picker mean "no restriction".
    pub fn from_picker(values: Vec<String>) -> Self {
        if values.is_empty() {
            Selection::Unrestricted
        } else {
            Selection::any_of(values)
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self, Selection::Unrestricted)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Set membership on a categorical column.
    Categorical { column: String, selection: Selection },
    /// `low <= value <= high` on a numeric column.
    NumericRange { column: String, low: f64, high: f64 },
    /// `from <= order date <= to`.
    DateRange { from: NaiveDate, to: NaiveDate },
}

impl Predicate {
    pub fn categorical(field: Field, selection: Selection) -> Self {
        Predicate::Categorical {
            column: field.name().to_string(),
            selection,
        }
    }

    pub fn numeric_range(field: Field, low: f64, high: f64) -> Self {
        Predicate::NumericRange {
            column: field.name().to_string(),
            low,
            high,
        }
    }

    pub fn date_range(from: NaiveDate, to: NaiveDate) -> Self {
        Predicate::DateRange { from, to }
    }

    pub fn column(&self) -> &str {
        match self {
            Predicate::Categorical { column, .. } | Predicate::NumericRange { column, .. } => column,
            Predicate::DateRange { .. } => Field::OrderDate.name(),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Predicate::Categorical { .. })
    }

    fn is_optional_column(&self) -> bool {
        Field::from_header(self.column())
            .map(|f| f.is_optional())
            .unwrap_or(false)
    }
}

/// What a stage saw and did, for rendering its control.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub column: String,
    /// Values offered by a categorical picker; empty for range stages.
    pub options: Vec<String>,
    /// False when the stage ended up not restricting anything.
    pub applied: bool,
    pub rows_before: usize,
    pub rows_after: usize,
}

#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub dataset: Dataset,
    pub warnings: Vec<String>,
    pub stages: Vec<StageReport>,
}

/// One stage: narrows `dataset` by `predicate`.
///
/// Range predicates with inverted bounds push a warning and still filter with
/// the bounds as given.
pub fn apply_predicate(
    dataset: &Dataset,
    predicate: &Predicate,
    warnings: &mut Vec<String>,
) -> Result<Dataset> {
    match predicate {
        Predicate::Categorical { column, selection } => {
            let values = match selection {
                Selection::Unrestricted => return Ok(dataset.clone()),
                Selection::RestrictedTo(values) => values,
            };
            let column = dataset.resolve(column)?;
            if values.is_empty() || dataset.is_empty() {
                debug!("Stage on '{}' has nothing to choose from, skipping", column);
                return Ok(dataset.clone());
            }
            let expr = values
                .iter()
                .map(|v| col(&column).cast(DataType::String).eq(lit(v.as_str())))
                .reduce(|a, b| a.or(b));
            match expr {
                Some(expr) => narrow(dataset, expr),
                None => Ok(dataset.clone()),
            }
        }
        Predicate::NumericRange { column, low, high } => {
            let column = dataset.resolve(column)?;
            if low > high {
                warn!("Inverted range on '{}': {} > {}", column, low, high);
                warnings.push(format!(
                    "Minimum {} must not exceed maximum {}.",
                    column, column
                ));
            }
            if dataset.is_empty() {
                return Ok(dataset.clone());
            }
            let value = col(&column).cast(DataType::Float64);
            let expr = value
                .clone()
                .gt_eq(lit(*low))
                .and(value.lt_eq(lit(*high)));
            narrow(dataset, expr)
        }
        Predicate::DateRange { from, to } => {
            let column = dataset.resolve(Field::OrderDate.name())?;
            if from > to {
                warn!("Inverted date range: {} > {}", from, to);
                warnings.push(DATE_ORDER_WARNING.to_string());
            }
            if dataset.is_empty() {
                return Ok(dataset.clone());
            }
            let days = col(&column).cast(DataType::Int32);
            let expr = days
                .clone()
                .gt_eq(lit(date_to_days(*from)))
                .and(days.lt_eq(lit(date_to_days(*to))));
            narrow(dataset, expr)
        }
    }
}

fn narrow(dataset: &Dataset, expr: Expr) -> Result<Dataset> {
    let frame = dataset.frame().clone().lazy().filter(expr).collect()?;
    Ok(Dataset::new(frame))
}

/// Ordered conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterPipeline {
    predicates: Vec<Predicate>,
}

impl FilterPipeline {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Runs every stage in order; the first failing stage aborts the run.
    pub fn apply(&self, dataset: &Dataset) -> Result<FilterOutcome> {
        self.run(dataset, false).map(|(outcome, _)| outcome)
    }

    /// Runs every stage in order, skipping stages that fail.
    ///
    /// The failures come back next to the outcome so the caller can show them
    /// while still rendering everything else.
    pub fn apply_lenient(&self, dataset: &Dataset) -> (FilterOutcome, Vec<DashboardError>) {
        match self.run(dataset, true) {
            Ok(result) => result,
            Err(e) => (
                FilterOutcome {
                    dataset: dataset.clone(),
                    warnings: Vec::new(),
                    stages: Vec::new(),
                },
                vec![e],
            ),
        }
    }

    fn run(&self, dataset: &Dataset, lenient: bool) -> Result<(FilterOutcome, Vec<DashboardError>)> {
        let mut current = dataset.clone();
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        let mut stages = Vec::with_capacity(self.predicates.len());

        for predicate in &self.predicates {
            let rows_before = current.height();
            if skippable(&current, predicate) {
                debug!("Optional column '{}' absent, stage skipped", predicate.column());
                stages.push(StageReport {
                    column: predicate.column().to_string(),
                    options: Vec::new(),
                    applied: false,
                    rows_before,
                    rows_after: rows_before,
                });
                continue;
            }

            let narrowed = stage(&current, predicate, &mut warnings);
            match narrowed {
                Ok((options, next)) => {
                    current = next;
                    stages.push(StageReport {
                        column: predicate.column().to_string(),
                        options,
                        applied: current.height() != rows_before || restricts(predicate),
                        rows_before,
                        rows_after: current.height(),
                    });
                }
                Err(e) if lenient => {
                    warn!("Filter on '{}' skipped: {}", predicate.column(), e);
                    stages.push(StageReport {
                        column: predicate.column().to_string(),
                        options: Vec::new(),
                        applied: false,
                        rows_before,
                        rows_after: rows_before,
                    });
                    errors.push(e);
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            "Filter pipeline: {} -> {} rows over {} stages",
            dataset.height(),
            current.height(),
            self.predicates.len()
        );

        Ok((
            FilterOutcome {
                dataset: current,
                warnings,
                stages,
            },
            errors,
        ))
    }

    /// Options for stage `index`, computed from the dataset narrowed by the
    /// stages before it.
    pub fn options_at(&self, dataset: &Dataset, index: usize) -> Result<Vec<String>> {
        let predicate = self.predicates.get(index).ok_or_else(|| {
            DashboardError::Config(format!(
                "filter stage {} out of range ({} stages)",
                index,
                self.predicates.len()
            ))
        })?;
        let upstream = FilterPipeline::new(self.predicates[..index].to_vec());
        let narrowed = upstream.apply(dataset)?.dataset;
        if skippable(&narrowed, predicate) {
            return Ok(Vec::new());
        }
        narrowed.distinct_values(predicate.column())
    }

    /// Default bounds for the date pickers: the order-date span of the dataset
    /// narrowed by the categorical stages, or of the full dataset when that
    /// narrowing leaves nothing. Categorical stages that fail are ignored here.
    pub fn default_date_bounds(&self, dataset: &Dataset) -> Result<Option<(NaiveDate, NaiveDate)>> {
        if !dataset.has_column(Field::OrderDate.name()) {
            return Ok(None);
        }
        let categorical = FilterPipeline::new(
            self.predicates
                .iter()
                .filter(|p| p.is_categorical())
                .cloned()
                .collect(),
        );
        let (narrowed, _) = categorical.apply_lenient(dataset);
        let narrowed = narrowed.dataset;
        if narrowed.is_empty() {
            dataset.date_bounds()
        } else {
            narrowed.date_bounds()
        }
    }
}

/// Options offered to a categorical stage, and the dataset it leaves behind.
fn stage(
    current: &Dataset,
    predicate: &Predicate,
    warnings: &mut Vec<String>,
) -> Result<(Vec<String>, Dataset)> {
    let options = if predicate.is_categorical() {
        current.distinct_values(predicate.column())?
    } else {
        Vec::new()
    };
    let next = apply_predicate(current, predicate, warnings)?;
    Ok((options, next))
}

fn restricts(predicate: &Predicate) -> bool {
    match predicate {
        Predicate::Categorical { selection, .. } => !selection.is_unrestricted(),
        _ => true,
    }
}

/// Unrestricted stages on optional columns the source does not have.
fn skippable(dataset: &Dataset, predicate: &Predicate) -> bool {
    !restricts(predicate)
        && predicate.is_optional_column()
        && !dataset.has_column(predicate.column())
}
