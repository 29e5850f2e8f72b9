//! Small in-memory sales table shared by the unit tests.

use crate::dataset::{date_series, Dataset};
use chrono::NaiveDate;
use polars::prelude::*;

pub(crate) fn sample_dataset() -> Dataset {
    let dates = [
        NaiveDate::from_ymd_opt(2023, 1, 3),
        NaiveDate::from_ymd_opt(2023, 1, 10),
        NaiveDate::from_ymd_opt(2023, 3, 1),
        NaiveDate::from_ymd_opt(2023, 2, 5),
        NaiveDate::from_ymd_opt(2023, 3, 12),
        NaiveDate::from_ymd_opt(2023, 2, 20),
        None,
    ];
    let mut df = df![
        "Order ID" => ["CA-1", "CA-2", "CA-3", "CA-4", "CA-5", "CA-6", "CA-7"],
        "Customer Name" => ["Ann", "Bo", "Ann", "Cy", "Dee", "Bo", "Eve"],
        "Product Name" => ["Chair A", "Phone X", "Paper Pack", "Phone Y", "Table T", "Binder B", "Paper Pack"],
        "Region" => ["West", "West", "West", "East", "East", "Central", "Central"],
        "State" => ["California", "California", "Washington", "New York", "New York", "Texas", "Texas"],
        "Category" => ["Furniture", "Technology", "Office Supplies", "Technology", "Furniture", "Office Supplies", "Office Supplies"],
        "Sub-Category" => ["Chairs", "Phones", "Paper", "Phones", "Tables", "Binders", "Paper"],
        "Segment" => ["Consumer", "Corporate", "Consumer", "Home Office", "Consumer", "Corporate", "Consumer"],
        "Sales" => [100.0, 250.0, 40.0, 500.0, 0.0, 60.0, 30.0],
        "Quantity" => [2.0, 5.0, 4.0, 1.0, 3.0, 6.0, 3.0],
        "Profit" => [20.0, -50.0, 10.0, 150.0, -20.0, 0.0, 5.0],
        "Discount" => [0.0, 0.2, 0.0, 0.1, 0.5, 0.3, 0.0],
    ]
    .unwrap();
    df.with_column(date_series("Order Date", &dates).unwrap())
        .unwrap();
    Dataset::new(df)
}
