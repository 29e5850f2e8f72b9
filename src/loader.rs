//! Dataset loader.
//!
//! Reads CSV, Parquet or spreadsheet sources into a [`Dataset`] with canonical
//! headers, `Float64` measures and a `Date` order-date column. A source that
//! cannot be read degrades to an empty dataset plus a warning instead of an
//! error, so callers always get something they can filter and aggregate.

use crate::dataset::{date_series, Dataset};
use crate::error::{DashboardError, Result};
use crate::schema::{self, Field};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Parquet,
    Spreadsheet,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "txt" => Ok(SourceFormat::Csv),
            "parquet" => Ok(SourceFormat::Parquet),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
            _ => Err(DashboardError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Result of a load: always a usable dataset, plus anything the user should see.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub dataset: Dataset,
    pub warnings: Vec<String>,
    /// False when the source could not be read and `dataset` is the empty fallback.
    pub available: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    sheet: Option<String>,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the named worksheet instead of the first one.
    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Loads `path`, falling back to an empty dataset when it cannot be read.
    pub fn load(&self, path: &Path) -> LoadOutcome {
        match self.try_load(path) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Data unavailable for {}: {}", path.display(), e);
                let warning = match e {
                    DashboardError::DataUnavailable(_) => e.to_string(),
                    other => {
                        DashboardError::DataUnavailable(format!("{}: {}", path.display(), other))
                            .to_string()
                    }
                };
                LoadOutcome {
                    dataset: Dataset::empty(),
                    warnings: vec![warning],
                    available: false,
                }
            }
        }
    }

    pub fn try_load(&self, path: &Path) -> Result<LoadOutcome> {
        if !path.exists() {
            return Err(DashboardError::DataUnavailable(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let format = SourceFormat::from_path(path)?;
        info!("Loading {:?} source {}", format, path.display());

        let raw = match format {
            SourceFormat::Csv => LazyCsvReader::new(path)
                .with_has_header(true)
                .with_try_parse_dates(true)
                .with_infer_schema_length(Some(1000))
                .finish()?
                .collect()?,
            SourceFormat::Parquet => {
                LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?
            }
            SourceFormat::Spreadsheet => self.read_spreadsheet(path)?,
        };

        let mut warnings = Vec::new();
        let frame = normalize_frame(raw, &mut warnings)?;
        info!(
            "Loaded {} rows x {} columns from {}",
            frame.height(),
            frame.width(),
            path.display()
        );

        Ok(LoadOutcome {
            dataset: Dataset::new(frame),
            warnings,
            available: true,
        })
    }

    fn read_spreadsheet(&self, path: &Path) -> Result<DataFrame> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| DashboardError::Spreadsheet(e.to_string()))?;

        let sheet = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| DashboardError::Spreadsheet("workbook has no sheets".into()))?,
        };
        debug!("Reading worksheet '{}'", sheet);

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| DashboardError::Spreadsheet(format!("sheet '{}': {}", sheet, e)))?;

        let mut rows = range.rows();
        let headers: Vec<String> = match rows.next() {
            Some(header_row) => header_row
                .iter()
                .map(|cell| cell_to_string(cell).unwrap_or_default())
                .collect(),
            None => return Ok(DataFrame::empty()),
        };
        let body: Vec<&[Data]> = rows.collect();

        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let cells: Vec<Data> = body
                    .iter()
                    .map(|row| row.get(idx).cloned().unwrap_or(Data::Empty))
                    .collect();
                spreadsheet_column(header, &cells)
            })
            .collect::<Result<Vec<Series>>>()?;

        Ok(DataFrame::new(columns)?)
    }
}

/// Builds one typed column from spreadsheet cells.
fn spreadsheet_column(header: &str, cells: &[Data]) -> Result<Series> {
    let name = header.trim();
    let field = Field::from_header(name);

    if field == Some(Field::OrderDate) {
        let dates: Vec<Option<NaiveDate>> = cells.iter().map(|c| cell_to_date(c)).collect();
        return date_series(name, &dates);
    }

    let all_numeric = cells
        .iter()
        .all(|c| matches!(c, Data::Empty | Data::Int(_) | Data::Float(_)));
    if field.map(|f| f.is_measure()).unwrap_or(all_numeric) {
        let values: Vec<Option<f64>> = cells.iter().map(|c| cell_to_f64(c)).collect();
        return Ok(Series::new(name, values));
    }

    let values: Vec<Option<String>> = cells.iter().map(|c| cell_to_string(c)).collect();
    Ok(Series::new(name, values))
}

fn cell_to_string(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(v) => Some(v.to_string()),
        Data::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
        Data::Float(v) => Some(v.to_string()),
        Data::Bool(v) => Some(v.to_string()),
        Data::DateTime(v) => serial_to_date(v.as_f64()).map(|d| d.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
        _ => None,
    }
}

fn cell_to_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(v) => Some(*v as f64),
        Data::Float(v) => Some(*v),
        Data::String(s) => parse_number(s),
        Data::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn cell_to_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(v) => serial_to_date(v.as_f64()),
        Data::Float(v) => serial_to_date(*v),
        Data::Int(v) => serial_to_date(*v as f64),
        Data::String(s) | Data::DateTimeIso(s) => parse_date(s),
        _ => None,
    }
}

/// Numeric text as written in exports: surrounding blanks and thousands
/// separators are ignored, `"1,234.50"` -> `1234.5`.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Spreadsheet serial day number (1900 date system) to a calendar date.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..=2_958_465.0).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parses a textual date, `None` when no known format matches.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Canonical headers, `Float64` measures, `Date` order date.
pub fn normalize_frame(mut df: DataFrame, warnings: &mut Vec<String>) -> Result<DataFrame> {
    rename_columns(&mut df, warnings)?;

    for field in Field::MEASURES {
        if let Ok(series) = df.column(field.name()) {
            if series.dtype() != &DataType::Float64 {
                let nulls_before = series.null_count();
                let cast = match series.dtype() {
                    DataType::String => {
                        let values: Vec<Option<f64>> = series
                            .str()?
                            .into_iter()
                            .map(|v| v.and_then(parse_number))
                            .collect();
                        Series::new(field.name(), values)
                    }
                    _ => series.cast(&DataType::Float64)?,
                };
                let coerced = cast.null_count().saturating_sub(nulls_before);
                if coerced > 0 {
                    warn!("{} non-numeric values in '{}' set to null", coerced, field.name());
                    warnings.push(format!(
                        "{} non-numeric value(s) in '{}' were ignored",
                        coerced,
                        field.name()
                    ));
                }
                df.with_column(cast)?;
            }
        }
    }

    match df.column(Field::OrderDate.name()) {
        Ok(series) => {
            let nulls_before = series.null_count();
            let dates = normalize_dates(series)?;
            let coerced = dates.null_count().saturating_sub(nulls_before);
            if coerced > 0 {
                warn!("{} unparseable order dates set to null", coerced);
                warnings.push(format!(
                    "{} order date(s) could not be parsed and are excluded from date filtering",
                    coerced
                ));
            }
            df.with_column(dates)?;
        }
        Err(_) => {
            warnings.push(format!(
                "Column '{}' not found; date filtering and trends are unavailable",
                Field::OrderDate.name()
            ));
        }
    }

    Ok(df)
}

fn rename_columns(df: &mut DataFrame, warnings: &mut Vec<String>) -> Result<()> {
    let mut seen = HashSet::new();
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|raw| {
            let canonical = schema::canonical_header(raw);
            if seen.insert(canonical.clone()) {
                canonical
            } else {
                let kept = raw.trim().to_string();
                warnings.push(format!(
                    "Column '{}' duplicates '{}' and keeps its original name",
                    raw, canonical
                ));
                seen.insert(kept.clone());
                kept
            }
        })
        .collect();
    df.set_column_names(names.as_slice())?;
    Ok(())
}

/// Converts whatever the source produced for the order date into `Date`.
fn normalize_dates(series: &Series) -> Result<Series> {
    let name = series.name().to_string();
    match series.dtype() {
        DataType::Date => Ok(series.clone()),
        DataType::Datetime(_, _) => Ok(series.cast(&DataType::Date)?),
        dtype if dtype.is_numeric() => {
            let serials = series.cast(&DataType::Float64)?;
            let dates: Vec<Option<NaiveDate>> = serials
                .f64()?
                .into_iter()
                .map(|v| v.and_then(serial_to_date))
                .collect();
            date_series(&name, &dates)
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            let dates: Vec<Option<NaiveDate>> =
                text.str()?.into_iter().map(|v| v.and_then(parse_date)).collect();
            date_series(&name, &dates)
        }
    }
}
