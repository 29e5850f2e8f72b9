use crate::error::Result;
use crate::schema::{self, Field};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use std::collections::BTreeSet;

/// Immutable, cheaply cloneable view over the loaded sales table.
///
/// Filtering never touches the frame in place; every stage produces a new
/// `Dataset` sharing column buffers with its parent.
#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
}

impl Dataset {
    pub fn new(frame: DataFrame) -> Self {
        Self { frame }
    }

    /// Zero rows, canonical schema.
    pub fn empty() -> Self {
        Self::new(schema::empty_frame())
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        schema::has_column(&self.frame, name)
    }

    /// Resolves `name` (any casing/spacing) to the column name in this dataset.
    pub fn resolve(&self, name: &str) -> Result<String> {
        schema::resolve_column(&self.frame, name)
    }

    /// Sorted distinct non-null values of a column, rendered as strings.
    pub fn distinct_values(&self, name: &str) -> Result<Vec<String>> {
        let column = self.resolve(name)?;
        let as_text = self.frame.column(&column)?.cast(&DataType::String)?;
        let values: BTreeSet<String> = as_text
            .str()?
            .into_iter()
            .flatten()
            .map(|v| v.to_string())
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Column values as `f64`, nulls (and unparseable cells) as `None`.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.resolve(name)?;
        let as_float = self.frame.column(&column)?.cast(&DataType::Float64)?;
        let values = as_float.f64()?.into_iter().collect();
        Ok(values)
    }

    /// Order dates, `None` where the source value could not be parsed.
    pub fn order_dates(&self) -> Result<Vec<Option<NaiveDate>>> {
        let column = self.resolve(Field::OrderDate.name())?;
        let days = self.frame.column(&column)?.cast(&DataType::Int32)?;
        let dates = days
            .i32()?
            .into_iter()
            .map(|d| d.and_then(days_to_date))
            .collect();
        Ok(dates)
    }

    /// Earliest and latest order date, ignoring nulls.
    pub fn date_bounds(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let dates = self.order_dates()?;
        let mut known = dates.into_iter().flatten();
        let first = match known.next() {
            Some(d) => d,
            None => return Ok(None),
        };
        let (min, max) = known.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));
        Ok(Some((min, max)))
    }
}

impl From<DataFrame> for Dataset {
    fn from(frame: DataFrame) -> Self {
        Self::new(frame)
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Physical representation of a polars `Date`: days since 1970-01-01.
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.signed_duration_since(epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(Duration::days(days as i64))
}

/// Builds a `Date` series from optional dates.
pub fn date_series(name: &str, dates: &[Option<NaiveDate>]) -> Result<Series> {
    let days: Vec<Option<i32>> = dates.iter().map(|d| d.map(date_to_days)).collect();
    Ok(Series::new(name, days).cast(&DataType::Date)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let dates = [
            NaiveDate::from_ymd_opt(2023, 3, 1),
            None,
            NaiveDate::from_ymd_opt(2023, 1, 15),
        ];
        let mut df = df![
            "Region" => ["West", "East", "West"],
            "Sales" => [10.0, 20.0, 30.0],
        ]
        .unwrap();
        df.with_column(date_series("Order Date", &dates).unwrap()).unwrap();
        Dataset::new(df)
    }

    #[test]
    fn test_day_conversion() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(days_to_date(date_to_days(date)), Some(date));
        assert_eq!(date_to_days(epoch()), 0);
    }

    #[test]
    fn test_distinct_values_sorted() {
        let ds = sample();
        assert_eq!(ds.distinct_values("region").unwrap(), vec!["East", "West"]);
    }

    #[test]
    fn test_date_bounds_skip_nulls() {
        let ds = sample();
        let (lo, hi) = ds.date_bounds().unwrap().unwrap();
        assert_eq!(lo, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(hi, NaiveDate::from_ymd_opt(2023, 3, 1).unwrap());
    }

    #[test]
    fn test_empty_dataset_is_well_defined() {
        let ds = Dataset::empty();
        assert!(ds.is_empty());
        assert!(ds.distinct_values("Region").unwrap().is_empty());
        assert_eq!(ds.date_bounds().unwrap(), None);
    }
}
