//! Canonical column set of the sales dataset.
//!
//! Source files spell their headers in many ways ("Order Date", "order_date",
//! "ORDER DATE"). Every header is reduced to a normalization key (trimmed,
//! case-folded, separators dropped) and mapped onto a canonical [`Field`].

use crate::error::{DashboardError, Result};
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

/// Columns the dashboard knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    OrderId,
    CustomerName,
    ProductName,
    Region,
    State,
    City,
    Category,
    SubCategory,
    Segment,
    ShipMode,
    PaymentMethod,
    OrderDate,
    Sales,
    Quantity,
    Profit,
    Discount,
    ShippingCost,
}

impl Field {
    pub const ALL: [Field; 17] = [
        Field::OrderId,
        Field::CustomerName,
        Field::ProductName,
        Field::Region,
        Field::State,
        Field::City,
        Field::Category,
        Field::SubCategory,
        Field::Segment,
        Field::ShipMode,
        Field::PaymentMethod,
        Field::OrderDate,
        Field::Sales,
        Field::Quantity,
        Field::Profit,
        Field::Discount,
        Field::ShippingCost,
    ];

    pub const MEASURES: [Field; 5] = [
        Field::Sales,
        Field::Quantity,
        Field::Profit,
        Field::Discount,
        Field::ShippingCost,
    ];

    /// Header used inside a loaded dataset.
    pub fn name(&self) -> &'static str {
        match self {
            Field::OrderId => "Order ID",
            Field::CustomerName => "Customer Name",
            Field::ProductName => "Product Name",
            Field::Region => "Region",
            Field::State => "State",
            Field::City => "City",
            Field::Category => "Category",
            Field::SubCategory => "Sub-Category",
            Field::Segment => "Segment",
            Field::ShipMode => "Ship Mode",
            Field::PaymentMethod => "Payment Method",
            Field::OrderDate => "Order Date",
            Field::Sales => "Sales",
            Field::Quantity => "Quantity",
            Field::Profit => "Profit",
            Field::Discount => "Discount",
            Field::ShippingCost => "Shipping Cost",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::OrderId => &["orderid", "transactionid", "orderno", "ordernumber"],
            Field::CustomerName => &["customername", "customer"],
            Field::ProductName => &["productname", "product"],
            Field::Region => &["region"],
            Field::State => &["state", "province", "stateprovince"],
            Field::City => &["city"],
            Field::Category => &["category"],
            Field::SubCategory => &["subcategory"],
            Field::Segment => &["segment", "customersegment"],
            Field::ShipMode => &["shipmode", "shippingmode"],
            Field::PaymentMethod => &["paymentmethod", "paymentmode", "payment"],
            Field::OrderDate => &["orderdate", "date", "transactiondate"],
            Field::Sales => &["sales", "salesamount", "amount", "revenue"],
            Field::Quantity => &["quantity", "qty", "units"],
            Field::Profit => &["profit"],
            Field::Discount => &["discount"],
            Field::ShippingCost => &["shippingcost", "shipcost", "shipping"],
        }
    }

    /// Columns a variant of the source file may leave out entirely.
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            Field::City
                | Field::PaymentMethod
                | Field::ShipMode
                | Field::Discount
                | Field::ShippingCost
        )
    }

    pub fn is_measure(&self) -> bool {
        Field::MEASURES.contains(self)
    }

    /// Maps a raw header onto a canonical field.
    pub fn from_header(header: &str) -> Option<Field> {
        let key = normalize_key(header);
        Field::ALL
            .iter()
            .copied()
            .find(|field| field.aliases().contains(&key.as_str()))
    }

    /// Empty column with the dtype this field has after loading.
    pub fn empty_series(&self) -> Series {
        let dtype = match self {
            Field::OrderDate => DataType::Date,
            f if f.is_measure() => DataType::Float64,
            _ => DataType::String,
        };
        Series::new_empty(self.name(), &dtype)
    }
}

lazy_static::lazy_static! {
    static ref SEPARATORS: Regex = Regex::new(r"[\s_\-./]+").expect("separator pattern is valid");
}

/// Trim + case-fold + drop separators: `" Sub-Category "` -> `"subcategory"`.
pub fn normalize_key(header: &str) -> String {
    SEPARATORS
        .replace_all(header.trim(), "")
        .to_lowercase()
}

/// Header as it should appear in a loaded dataset.
pub fn canonical_header(header: &str) -> String {
    match Field::from_header(header) {
        Some(field) => field.name().to_string(),
        None => header.trim().to_string(),
    }
}

/// Resolves a user-supplied column name against the columns of `df`.
///
/// Exact names win, then normalized names. A miss produces
/// [`DashboardError::MissingColumn`] listing what is available.
pub fn resolve_column(df: &DataFrame, requested: &str) -> Result<String> {
    let available: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    if available.iter().any(|c| c == requested) {
        return Ok(requested.to_string());
    }

    let wanted = normalize_key(&canonical_header(requested));
    if let Some(found) = available.iter().find(|c| normalize_key(c) == wanted) {
        return Ok(found.clone());
    }

    Err(missing_column(requested, available))
}

pub fn has_column(df: &DataFrame, requested: &str) -> bool {
    resolve_column(df, requested).is_ok()
}

pub(crate) fn missing_column(requested: &str, available: Vec<String>) -> DashboardError {
    let wanted = normalize_key(requested);
    let suggestion = available
        .iter()
        .map(|c| (c, jaro_winkler(&wanted, &normalize_key(c))))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c.clone());

    DashboardError::MissingColumn {
        column: requested.to_string(),
        available,
        suggestion,
    }
}

/// Zero-row frame carrying every canonical column.
pub fn empty_frame() -> DataFrame {
    let columns: Vec<Series> = Field::ALL.iter().map(|f| f.empty_series()).collect();
    DataFrame::new(columns).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" Sub-Category "), "subcategory");
        assert_eq!(normalize_key("order_date"), "orderdate");
        assert_eq!(normalize_key("ORDER   DATE"), "orderdate");
    }

    #[test]
    fn test_canonical_header() {
        assert_eq!(canonical_header("order date"), "Order Date");
        assert_eq!(canonical_header("SubCategory"), "Sub-Category");
        assert_eq!(canonical_header("Qty"), "Quantity");
        assert_eq!(canonical_header("  Postal Code "), "Postal Code");
    }

    #[test]
    fn test_resolve_column_normalizes() {
        let df = df![
            "Region" => ["East"],
            "Sales" => [1.0],
        ]
        .unwrap();
        assert_eq!(resolve_column(&df, "region").unwrap(), "Region");
        assert_eq!(resolve_column(&df, " SALES ").unwrap(), "Sales");
    }

    #[test]
    fn test_resolve_column_reports_available() {
        let df = df![
            "Region" => ["East"],
            "Sales" => [1.0],
        ]
        .unwrap();
        match resolve_column(&df, "Regoin") {
            Err(DashboardError::MissingColumn {
                column,
                available,
                suggestion,
            }) => {
                assert_eq!(column, "Regoin");
                assert_eq!(available, vec!["Region".to_string(), "Sales".to_string()]);
                assert_eq!(suggestion.as_deref(), Some("Region"));
            }
            other => panic!("expected missing column, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_frame_has_schema() {
        let df = empty_frame();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), Field::ALL.len());
        assert_eq!(df.column("Order Date").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("Sales").unwrap().dtype(), &DataType::Float64);
    }
}
