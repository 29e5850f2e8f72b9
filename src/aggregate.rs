//! Group-by aggregation over a filtered dataset.
//!
//! Measures are summed per group; the margin rate is derived afterwards from the
//! group sums (never averaged across rows) and is 0 whenever the sales sum is 0.

use crate::dataset::{days_to_date, Dataset};
use crate::error::Result;
use crate::schema::Field;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const SALES: &str = "__sales";
const QUANTITY: &str = "__quantity";
const PROFIT: &str = "__profit";
const ROWS: &str = "__rows";

/// Measure that drives charts and top-N rankings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    #[default]
    Sales,
    Quantity,
    Profit,
    MarginRate,
}

impl Measure {
    pub fn label(&self) -> &'static str {
        match self {
            Measure::Sales => "Sales",
            Measure::Quantity => "Quantity",
            Measure::Profit => "Profit",
            Measure::MarginRate => "Margin Rate",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Measure {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match crate::schema::normalize_key(s).as_str() {
            "sales" => Ok(Measure::Sales),
            "quantity" | "qty" => Ok(Measure::Quantity),
            "profit" => Ok(Measure::Profit),
            "marginrate" | "margin" => Ok(Measure::MarginRate),
            other => Err(format!(
                "unknown measure '{}', expected one of: sales, quantity, profit, margin_rate",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeGrain {
    Day,
    #[default]
    Month,
}

impl FromStr for TimeGrain {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(TimeGrain::Day),
            "month" | "monthly" => Ok(TimeGrain::Month),
            other => Err(format!("unknown time grain '{}', expected day or month", other)),
        }
    }
}

/// How rows are partitioned before reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// The whole dataset as a single group labelled "Total".
    Whole,
    /// One or more categorical columns; groups keep first-seen order.
    Columns(Vec<String>),
    /// Order date bucketed by day or month; groups are chronological.
    Time(TimeGrain),
}

impl Grouping {
    pub fn by(field: Field) -> Self {
        Grouping::Columns(vec![field.name().to_string()])
    }

    pub fn by_fields(fields: &[Field]) -> Self {
        Grouping::Columns(fields.iter().map(|f| f.name().to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<String>,
    pub sales: f64,
    pub quantity: f64,
    pub profit: f64,
    pub rows: usize,
    pub margin_rate: f64,
}

impl AggregateRow {
    pub fn new(key: Vec<String>, sales: f64, quantity: f64, profit: f64, rows: usize) -> Self {
        Self {
            key,
            sales,
            quantity,
            profit,
            rows,
            margin_rate: margin_rate(profit, sales),
        }
    }

    pub fn label(&self) -> String {
        self.key.join(" / ")
    }

    pub fn value(&self, measure: Measure) -> f64 {
        match measure {
            Measure::Sales => self.sales,
            Measure::Quantity => self.quantity,
            Measure::Profit => self.profit,
            Measure::MarginRate => self.margin_rate,
        }
    }
}

/// `profit / sales`, defined as 0 when `sales` is 0.
pub fn margin_rate(profit: f64, sales: f64) -> f64 {
    if sales == 0.0 {
        0.0
    } else {
        profit / sales
    }
}

/// Totals over the whole (filtered) dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiSnapshot {
    pub total_sales: f64,
    pub total_quantity: f64,
    pub total_profit: f64,
    pub margin_rate: f64,
    pub rows: usize,
    /// Mean of per-row `sales / quantity` over rows with a non-zero quantity.
    pub avg_order_value: f64,
}

pub fn kpi_snapshot(dataset: &Dataset) -> Result<KpiSnapshot> {
    if dataset.is_empty() {
        return Ok(KpiSnapshot::default());
    }

    let sales = dataset.numeric_values(Field::Sales.name())?;
    let quantity = dataset.numeric_values(Field::Quantity.name())?;
    let profit = dataset.numeric_values(Field::Profit.name())?;

    let total_sales = sum_present(&sales);
    let total_profit = sum_present(&profit);

    let per_row: Vec<f64> = sales
        .iter()
        .zip(quantity.iter())
        .filter_map(|(s, q)| match (s, q) {
            (Some(s), Some(q)) if *q != 0.0 => Some(s / q),
            _ => None,
        })
        .collect();
    let avg_order_value = if per_row.is_empty() {
        0.0
    } else {
        per_row.iter().sum::<f64>() / per_row.len() as f64
    };

    Ok(KpiSnapshot {
        total_sales,
        total_quantity: sum_present(&quantity),
        total_profit,
        margin_rate: margin_rate(total_profit, total_sales),
        rows: dataset.height(),
        avg_order_value,
    })
}

fn sum_present(values: &[Option<f64>]) -> f64 {
    values.iter().flatten().sum()
}

/// Partitions `dataset` by `grouping` and sums sales, quantity and profit.
///
/// Rows whose group key is null are left out of the output.
pub fn aggregate(dataset: &Dataset, grouping: &Grouping) -> Result<Vec<AggregateRow>> {
    let sales = dataset.resolve(Field::Sales.name())?;
    let quantity = dataset.resolve(Field::Quantity.name())?;
    let profit = dataset.resolve(Field::Profit.name())?;

    let key_exprs: Vec<Expr> = match grouping {
        Grouping::Whole => return Ok(vec![whole_group(dataset)?]),
        Grouping::Columns(columns) if columns.is_empty() => {
            return Ok(vec![whole_group(dataset)?])
        }
        Grouping::Columns(columns) => columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let resolved = dataset.resolve(c)?;
                Ok(col(&resolved).cast(DataType::String).alias(&key_name(i)))
            })
            .collect::<Result<Vec<_>>>()?,
        Grouping::Time(grain) => {
            let date = dataset.resolve(Field::OrderDate.name())?;
            let key = match grain {
                TimeGrain::Day => col(&date).cast(DataType::Int32),
                TimeGrain::Month => {
                    col(&date).dt().year().cast(DataType::Int32) * lit(100)
                        + col(&date).dt().month().cast(DataType::Int32)
                }
            };
            vec![key.alias(&key_name(0))]
        }
    };
    let key_names: Vec<String> = (0..key_exprs.len()).map(key_name).collect();

    let not_null = key_names
        .iter()
        .map(|k| col(k).is_not_null())
        .reduce(|a, b| a.and(b))
        .unwrap_or_else(|| lit(true));

    let grouped = dataset
        .frame()
        .clone()
        .lazy()
        .with_columns(key_exprs)
        .filter(not_null)
        .group_by_stable(key_names.iter().map(|k| col(k)).collect::<Vec<_>>())
        .agg([
            col(&sales).cast(DataType::Float64).sum().alias(SALES),
            col(&quantity).cast(DataType::Float64).sum().alias(QUANTITY),
            col(&profit).cast(DataType::Float64).sum().alias(PROFIT),
            len().alias(ROWS),
        ])
        .collect()?;

    let sales_col = grouped.column(SALES)?.f64()?;
    let quantity_col = grouped.column(QUANTITY)?.f64()?;
    let profit_col = grouped.column(PROFIT)?.f64()?;
    let rows_series = grouped.column(ROWS)?.cast(&DataType::UInt64)?;
    let rows_col = rows_series.u64()?;

    let mut result = match grouping {
        Grouping::Whole | Grouping::Columns(_) => {
            let keys = key_names
                .iter()
                .map(|k| {
                    let values = grouped.column(k)?.str()?;
                    Ok(values
                        .into_iter()
                        .map(|v| v.unwrap_or_default().to_string())
                        .collect::<Vec<String>>())
                })
                .collect::<Result<Vec<_>>>()?;
            (0..grouped.height())
                .map(|i| (0, keys.iter().map(|k| k[i].clone()).collect::<Vec<_>>()))
                .collect::<Vec<_>>()
        }
        Grouping::Time(grain) => grouped
            .column(&key_names[0])?
            .i32()?
            .into_iter()
            .map(|k| {
                let k = k.unwrap_or_default();
                (k, vec![time_label(*grain, k)])
            })
            .collect::<Vec<_>>(),
    }
    .into_iter()
    .enumerate()
    .map(|(i, (order, key))| {
        let row = AggregateRow::new(
            key,
            sales_col.get(i).unwrap_or(0.0),
            quantity_col.get(i).unwrap_or(0.0),
            profit_col.get(i).unwrap_or(0.0),
            rows_col.get(i).unwrap_or(0) as usize,
        );
        (order, row)
    })
    .collect::<Vec<_>>();

    if matches!(grouping, Grouping::Time(_)) {
        result.sort_by_key(|(order, _)| *order);
    }

    debug!("Aggregated {} rows into {} groups", dataset.height(), result.len());
    Ok(result.into_iter().map(|(_, row)| row).collect())
}

fn whole_group(dataset: &Dataset) -> Result<AggregateRow> {
    Ok(AggregateRow::new(
        vec!["Total".to_string()],
        sum_present(&dataset.numeric_values(Field::Sales.name())?),
        sum_present(&dataset.numeric_values(Field::Quantity.name())?),
        sum_present(&dataset.numeric_values(Field::Profit.name())?),
        dataset.height(),
    ))
}

fn key_name(i: usize) -> String {
    format!("__key{}", i)
}

fn time_label(grain: TimeGrain, key: i32) -> String {
    match grain {
        TimeGrain::Day => days_to_date(key)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        TimeGrain::Month => format!("{:04}-{:02}", key / 100, key % 100),
    }
}

/// Rows sorted by `measure`, largest first. Ties keep their group order.
pub fn sort_descending(rows: &[AggregateRow], measure: Measure) -> Vec<AggregateRow> {
    let mut sorted = rows.to_vec();
    sorted.sort_by(|a, b| {
        b.value(measure)
            .partial_cmp(&a.value(measure))
            .unwrap_or(Ordering::Equal)
    });
    sorted
}

/// The `n` largest groups by `measure`.
pub fn top_n(rows: &[AggregateRow], measure: Measure, n: usize) -> Vec<AggregateRow> {
    let mut sorted = sort_descending(rows, measure);
    sorted.truncate(n);
    sorted
}

/// Each group's fraction of the measure total; 0 everywhere when the total is 0.
pub fn shares(rows: &[AggregateRow], measure: Measure) -> Vec<f64> {
    let total: f64 = rows.iter().map(|r| r.value(measure)).sum();
    rows.iter()
        .map(|r| if total == 0.0 { 0.0 } else { r.value(measure) / total })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_dataset;

    #[test]
    fn test_partition_sums_match_total() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::by(Field::Category)).unwrap();
        let per_group: f64 = rows.iter().map(|r| r.sales).sum();
        let kpis = kpi_snapshot(&ds).unwrap();
        assert!((per_group - kpis.total_sales).abs() < 1e-9);
        assert_eq!(rows.iter().map(|r| r.rows).sum::<usize>(), ds.height());
    }

    #[test]
    fn test_whole_group() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::Whole).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label(), "Total");
        assert_eq!(rows[0].sales, 980.0);
        assert_eq!(rows[0].rows, 7);
    }

    #[test]
    fn test_groups_keep_first_seen_order() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::by(Field::Category)).unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["Furniture", "Technology", "Office Supplies"]);
        assert_eq!(rows[1].sales, 750.0);
        assert_eq!(rows[1].margin_rate, 100.0 / 750.0);
    }

    #[test]
    fn test_zero_sales_group_has_zero_margin() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::by(Field::SubCategory)).unwrap();
        let tables = rows.iter().find(|r| r.label() == "Tables").unwrap();
        assert_eq!(tables.sales, 0.0);
        assert_eq!(tables.profit, -20.0);
        assert_eq!(tables.margin_rate, 0.0);
        assert!(rows.iter().all(|r| r.margin_rate.is_finite()));
    }

    #[test]
    fn test_monthly_groups_are_chronological() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::Time(TimeGrain::Month)).unwrap();
        let labels: Vec<String> = rows.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["2023-01", "2023-02", "2023-03"]);
        assert_eq!(rows[0].sales, 350.0);
        // the undated row is not in any month
        assert_eq!(rows.iter().map(|r| r.rows).sum::<usize>(), ds.height() - 1);
    }

    #[test]
    fn test_daily_groups() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::Time(TimeGrain::Day)).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].label(), "2023-01-03");
        assert_eq!(rows[5].label(), "2023-03-12");
    }

    #[test]
    fn test_two_level_grouping() {
        let ds = sample_dataset();
        let rows = aggregate(
            &ds,
            &Grouping::by_fields(&[Field::Region, Field::State]),
        )
        .unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].key, vec!["West", "California"]);
        assert_eq!(rows[0].label(), "West / California");
        assert_eq!(rows[0].sales, 350.0);
    }

    #[test]
    fn test_top_n_sorted_and_bounded() {
        let ds = sample_dataset();
        let rows = aggregate(&ds, &Grouping::by(Field::SubCategory)).unwrap();
        let top = top_n(&rows, Measure::Sales, 10);
        assert_eq!(top.len(), rows.len().min(10));
        assert!(top.windows(2).all(|w| w[0].sales >= w[1].sales));

        let top2 = top_n(&rows, Measure::Sales, 2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].label(), "Phones");
    }

    #[test]
    fn test_top_n_ties_keep_group_order() {
        let rows = vec![
            AggregateRow::new(vec!["a".into()], 5.0, 1.0, 0.0, 1),
            AggregateRow::new(vec!["b".into()], 9.0, 1.0, 0.0, 1),
            AggregateRow::new(vec!["c".into()], 5.0, 1.0, 0.0, 1),
        ];
        let top = top_n(&rows, Measure::Sales, 3);
        let labels: Vec<String> = top.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_empty_dataset_kpis_are_zero() {
        let kpis = kpi_snapshot(&Dataset::empty()).unwrap();
        assert_eq!(kpis, KpiSnapshot::default());
        assert!(aggregate(&Dataset::empty(), &Grouping::by(Field::Region))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_kpi_snapshot_totals() {
        let kpis = kpi_snapshot(&sample_dataset()).unwrap();
        assert_eq!(kpis.total_sales, 980.0);
        assert_eq!(kpis.total_quantity, 24.0);
        assert_eq!(kpis.total_profit, 115.0);
        assert!((kpis.margin_rate - 115.0 / 980.0).abs() < 1e-12);
        assert_eq!(kpis.rows, 7);
        assert!(kpis.avg_order_value > 0.0);
    }

    #[test]
    fn test_shares_handle_zero_total() {
        let rows = vec![AggregateRow::new(vec!["x".into()], 0.0, 0.0, 0.0, 1)];
        assert_eq!(shares(&rows, Measure::Sales), vec![0.0]);
    }

    #[test]
    fn test_missing_measure_column_is_reported() {
        let ds = Dataset::new(df!["Region" => ["West"]].unwrap());
        let err = aggregate(&ds, &Grouping::by(Field::Region)).unwrap_err();
        assert!(err.to_string().contains("'Sales'"));
    }

    #[test]
    fn test_measure_parsing() {
        assert_eq!("margin_rate".parse::<Measure>().unwrap(), Measure::MarginRate);
        assert_eq!("Profit".parse::<Measure>().unwrap(), Measure::Profit);
        assert!("volume".parse::<Measure>().is_err());
    }
}
