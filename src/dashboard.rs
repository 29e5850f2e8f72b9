//! Dashboard assembly: request in, view model out.
//!
//! This is the boundary where operation errors stop. A failing filter stage or
//! chart turns into an inline [`Notice`] and the rest of the view is still built.

use crate::aggregate::{
    aggregate, kpi_snapshot, shares, sort_descending, top_n, AggregateRow, Grouping,
    KpiSnapshot, Measure, TimeGrain,
};
use crate::dataset::Dataset;
use crate::error::Result;
use crate::filter::{FilterPipeline, Predicate, Selection, StageReport, SIDEBAR_DIMENSIONS};
use crate::format::{format_currency, format_currency_grouped, format_percent, format_quantity};
use crate::loader::LoadOutcome;
use crate::schema::Field;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_TOP_N: usize = 10;
pub const NO_DATA_MESSAGE: &str = "No data available for the selected filters.";
pub const SUCCESS_MESSAGE: &str = "Dashboard loaded successfully!";

/// Inclusive numeric bounds; a missing end is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn predicate(&self, field: Field) -> Option<Predicate> {
        if self.is_open() {
            return None;
        }
        Some(Predicate::numeric_range(
            field,
            self.min.unwrap_or(f64::NEG_INFINITY),
            self.max.unwrap_or(f64::INFINITY),
        ))
    }
}

/// Current state of every sidebar control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardRequest {
    pub region: Selection,
    pub state: Selection,
    pub category: Selection,
    pub sub_category: Selection,
    pub payment_method: Selection,
    pub segment: Selection,
    pub ship_mode: Selection,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub discount: Bounds,
    pub shipping_cost: Bounds,
    pub measure: Measure,
    pub top_n: usize,
    pub grain: TimeGrain,
}

impl Default for DashboardRequest {
    fn default() -> Self {
        Self {
            region: Selection::Unrestricted,
            state: Selection::Unrestricted,
            category: Selection::Unrestricted,
            sub_category: Selection::Unrestricted,
            payment_method: Selection::Unrestricted,
            segment: Selection::Unrestricted,
            ship_mode: Selection::Unrestricted,
            from: None,
            to: None,
            discount: Bounds::default(),
            shipping_cost: Bounds::default(),
            measure: Measure::Sales,
            top_n: DEFAULT_TOP_N,
            grain: TimeGrain::Month,
        }
    }
}

impl DashboardRequest {
    pub fn selection(&self, field: Field) -> Selection {
        match field {
            Field::Region => self.region.clone(),
            Field::State => self.state.clone(),
            Field::Category => self.category.clone(),
            Field::SubCategory => self.sub_category.clone(),
            Field::PaymentMethod => self.payment_method.clone(),
            Field::Segment => self.segment.clone(),
            Field::ShipMode => self.ship_mode.clone(),
            _ => Selection::Unrestricted,
        }
    }

    pub fn set_selection(&mut self, field: Field, selection: Selection) {
        match field {
            Field::Region => self.region = selection,
            Field::State => self.state = selection,
            Field::Category => self.category = selection,
            Field::SubCategory => self.sub_category = selection,
            Field::PaymentMethod => self.payment_method = selection,
            Field::Segment => self.segment = selection,
            Field::ShipMode => self.ship_mode = selection,
            _ => {}
        }
    }

    /// Categorical stages in sidebar order.
    pub fn categorical_pipeline(&self) -> FilterPipeline {
        FilterPipeline::new(
            SIDEBAR_DIMENSIONS
                .iter()
                .map(|field| Predicate::categorical(*field, self.selection(*field)))
                .collect(),
        )
    }

    /// Full pipeline. A date range is only added when at least one end was
    /// chosen; the other end defaults to the span left by the categorical stages.
    pub fn pipeline(&self, dataset: &Dataset) -> Result<FilterPipeline> {
        let mut pipeline = self.categorical_pipeline();

        if self.from.is_some() || self.to.is_some() {
            let defaults = pipeline.default_date_bounds(dataset)?;
            let from = self.from.or(defaults.map(|(lo, _)| lo));
            let to = self.to.or(defaults.map(|(_, hi)| hi));
            if let (Some(from), Some(to)) = (from, to) {
                pipeline.push(Predicate::date_range(from, to));
            }
        }
        if let Some(p) = self.discount.predicate(Field::Discount) {
            pipeline.push(p);
        }
        if let Some(p) = self.shipping_cost.predicate(Field::ShippingCost) {
            pipeline.push(p);
        }
        Ok(pipeline)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "snake_case")]
pub enum Notice {
    Success(String),
    Warning(String),
    Error(String),
    NoData,
}

impl Notice {
    pub fn text(&self) -> &str {
        match self {
            Notice::Success(m) | Notice::Warning(m) | Notice::Error(m) => m,
            Notice::NoData => NO_DATA_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiTile {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreemapNode {
    pub path: Vec<String>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub label: String,
    pub sales: f64,
    pub profit: f64,
    pub quantity: f64,
}

/// Chart inputs; drawing them is up to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chart {
    Bar { title: String, measure: Measure, points: Vec<ChartPoint> },
    Line { title: String, measure: Measure, points: Vec<ChartPoint> },
    Pie { title: String, measure: Measure, slices: Vec<PieSlice> },
    Treemap { title: String, measure: Measure, nodes: Vec<TreemapNode> },
    Scatter { title: String, points: Vec<ScatterPoint> },
}

impl Chart {
    pub fn title(&self) -> &str {
        match self {
            Chart::Bar { title, .. }
            | Chart::Line { title, .. }
            | Chart::Pie { title, .. }
            | Chart::Treemap { title, .. }
            | Chart::Scatter { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub rows_total: usize,
    pub rows_filtered: usize,
    pub filters: Vec<StageReport>,
    pub date_bounds: Option<(NaiveDate, NaiveDate)>,
    pub kpis: KpiSnapshot,
    pub kpi_tiles: Vec<KpiTile>,
    pub charts: Vec<Chart>,
    pub notices: Vec<Notice>,
    #[serde(skip)]
    pub filtered: Dataset,
}

impl DashboardView {
    pub fn has_no_data(&self) -> bool {
        self.notices.contains(&Notice::NoData)
    }

    pub fn chart(&self, title: &str) -> Option<&Chart> {
        self.charts.iter().find(|c| c.title() == title)
    }
}

/// Builds the whole view. Never fails: problems end up in `notices`.
pub fn build_dashboard(source: &LoadOutcome, request: &DashboardRequest) -> DashboardView {
    let dataset = &source.dataset;
    let mut notices: Vec<Notice> = source
        .warnings
        .iter()
        .map(|w| Notice::Warning(w.clone()))
        .collect();

    let pipeline = match request.pipeline(dataset) {
        Ok(p) => p,
        Err(e) => {
            notices.push(Notice::Error(e.to_string()));
            request.categorical_pipeline()
        }
    };
    let (outcome, errors) = pipeline.apply_lenient(dataset);
    notices.extend(outcome.warnings.iter().map(|w| Notice::Warning(w.clone())));
    notices.extend(errors.iter().map(|e| Notice::Error(e.to_string())));

    let date_bounds = match request.categorical_pipeline().default_date_bounds(dataset) {
        Ok(bounds) => bounds,
        Err(e) => {
            warn!("Default date bounds unavailable: {}", e);
            None
        }
    };

    let filtered = outcome.dataset;
    let kpis = match kpi_snapshot(&filtered) {
        Ok(kpis) => kpis,
        Err(e) => {
            notices.push(Notice::Error(e.to_string()));
            KpiSnapshot::default()
        }
    };

    let mut charts = Vec::new();
    if filtered.is_empty() {
        notices.push(Notice::NoData);
    } else {
        for build in chart_builders() {
            match build(&filtered, request) {
                Ok(Some(chart)) => charts.push(chart),
                Ok(None) => {}
                Err(e) => {
                    warn!("Chart skipped: {}", e);
                    notices.push(Notice::Error(e.to_string()));
                }
            }
        }
        if !notices.iter().any(|n| matches!(n, Notice::Error(_))) {
            notices.push(Notice::Success(SUCCESS_MESSAGE.to_string()));
        }
    }

    info!(
        "Dashboard built: {} of {} rows, {} charts, {} notices",
        filtered.height(),
        dataset.height(),
        charts.len(),
        notices.len()
    );

    DashboardView {
        rows_total: dataset.height(),
        rows_filtered: filtered.height(),
        filters: outcome.stages,
        date_bounds,
        kpis,
        kpi_tiles: kpi_tiles(&kpis),
        charts,
        notices,
        filtered,
    }
}

pub fn kpi_tiles(kpis: &KpiSnapshot) -> Vec<KpiTile> {
    let tile = |label: &str, value: String| KpiTile {
        label: label.to_string(),
        value,
    };
    vec![
        tile("Total Sales", format_currency(kpis.total_sales)),
        tile("Total Quantity", format_quantity(kpis.total_quantity)),
        tile("Total Profit", format_currency(kpis.total_profit)),
        tile("Margin Rate", format_percent(kpis.margin_rate)),
        tile("Average Order Value", format_currency_grouped(kpis.avg_order_value)),
    ]
}

type ChartBuilder = fn(&Dataset, &DashboardRequest) -> Result<Option<Chart>>;

fn chart_builders() -> [ChartBuilder; 8] {
    [
        category_bar,
        trend_line,
        segment_pie,
        top_sub_categories,
        top_products,
        region_treemap,
        profit_scatter,
        payment_method_bar,
    ]
}

fn points(rows: &[AggregateRow], measure: Measure) -> Vec<ChartPoint> {
    rows.iter()
        .map(|r| ChartPoint {
            label: r.label(),
            value: r.value(measure),
        })
        .collect()
}

fn category_bar(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::by(Field::Category))?;
    Ok(Some(Chart::Bar {
        title: format!("{} by Category", req.measure),
        measure: req.measure,
        points: points(&sort_descending(&rows, req.measure), req.measure),
    }))
}

fn trend_line(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::Time(req.grain))?;
    Ok(Some(Chart::Line {
        title: format!("{} over Time", req.measure),
        measure: req.measure,
        points: points(&rows, req.measure),
    }))
}

fn segment_pie(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::by(Field::Segment))?;
    let slices = rows
        .iter()
        .zip(shares(&rows, req.measure))
        .map(|(r, share)| PieSlice {
            label: r.label(),
            value: r.value(req.measure),
            share,
        })
        .collect();
    Ok(Some(Chart::Pie {
        title: format!("{} Distribution by Customer Segment", req.measure),
        measure: req.measure,
        slices,
    }))
}

fn top_sub_categories(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::by(Field::SubCategory))?;
    Ok(Some(Chart::Bar {
        title: format!("Top {} Sub-Categories by {}", req.top_n, req.measure),
        measure: req.measure,
        points: points(&top_n(&rows, req.measure, req.top_n), req.measure),
    }))
}

fn top_products(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    if !ds.has_column(Field::ProductName.name()) {
        return Ok(None);
    }
    let rows = aggregate(ds, &Grouping::by(Field::ProductName))?;
    Ok(Some(Chart::Bar {
        title: format!("Top {} Products by {}", req.top_n, req.measure),
        measure: req.measure,
        points: points(&top_n(&rows, req.measure, req.top_n), req.measure),
    }))
}

fn region_treemap(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::by_fields(&[Field::Region, Field::State]))?;
    let nodes = rows
        .iter()
        .map(|r| TreemapNode {
            path: r.key.clone(),
            value: r.value(req.measure),
        })
        .collect();
    Ok(Some(Chart::Treemap {
        title: format!("{} by Region and State", req.measure),
        measure: req.measure,
        nodes,
    }))
}

fn profit_scatter(ds: &Dataset, _req: &DashboardRequest) -> Result<Option<Chart>> {
    let rows = aggregate(ds, &Grouping::by(Field::SubCategory))?;
    let points = rows
        .iter()
        .map(|r| ScatterPoint {
            label: r.label(),
            sales: r.sales,
            profit: r.profit,
            quantity: r.quantity,
        })
        .collect();
    Ok(Some(Chart::Scatter {
        title: "Sales vs Profit by Sub-Category".to_string(),
        points,
    }))
}

fn payment_method_bar(ds: &Dataset, req: &DashboardRequest) -> Result<Option<Chart>> {
    if !ds.has_column(Field::PaymentMethod.name()) {
        return Ok(None);
    }
    let rows = aggregate(ds, &Grouping::by(Field::PaymentMethod))?;
    Ok(Some(Chart::Bar {
        title: format!("{} by Payment Method", req.measure),
        measure: req.measure,
        points: points(&sort_descending(&rows, req.measure), req.measure),
    }))
}
