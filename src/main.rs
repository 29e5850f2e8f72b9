use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sales_dashboard::aggregate::{Measure, TimeGrain};
use sales_dashboard::config::{load_preset, Settings};
use sales_dashboard::dashboard::{build_dashboard, DashboardRequest};
use sales_dashboard::export::write_csv;
use sales_dashboard::filter::{Selection, SIDEBAR_DIMENSIONS};
use sales_dashboard::loader::DatasetLoader;
use sales_dashboard::report::render_text;
use sales_dashboard::schema::Field;
use sales_dashboard::SessionCache;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sales-dashboard")]
#[command(about = "Filter, aggregate and summarize a retail sales dataset")]
struct Cli {
    /// Source file (.xlsx, .xls, .ods, .csv or .parquet); defaults to DASHBOARD_DATA_PATH
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Worksheet to read from a spreadsheet source; defaults to the first one
    #[arg(long, global = true)]
    sheet: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// KPIs, chart inputs and notices for the current filters
    Report {
        #[command(flatten)]
        filters: FilterArgs,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Values each sidebar picker offers, given the filters above it
    Options {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Write the filtered rows to filtered_data.csv
    Export {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct FilterArgs {
    /// JSON filter preset; flags below override it
    #[arg(long)]
    preset: Option<PathBuf>,

    #[arg(long)]
    region: Vec<String>,
    #[arg(long)]
    state: Vec<String>,
    #[arg(long)]
    category: Vec<String>,
    #[arg(long)]
    sub_category: Vec<String>,
    #[arg(long)]
    payment_method: Vec<String>,
    #[arg(long)]
    segment: Vec<String>,
    #[arg(long)]
    ship_mode: Vec<String>,

    /// First order date (YYYY-MM-DD), inclusive
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last order date (YYYY-MM-DD), inclusive
    #[arg(long)]
    to: Option<NaiveDate>,

    #[arg(long)]
    discount_min: Option<f64>,
    #[arg(long)]
    discount_max: Option<f64>,
    #[arg(long)]
    shipping_cost_min: Option<f64>,
    #[arg(long)]
    shipping_cost_max: Option<f64>,

    /// Measure driving charts and rankings: sales, quantity, profit, margin_rate
    #[arg(long)]
    measure: Option<Measure>,
    /// Number of entries in the top-N charts
    #[arg(long)]
    top_n: Option<usize>,
    /// Trend bucket: day or month
    #[arg(long)]
    grain: Option<TimeGrain>,
}

impl FilterArgs {
    fn into_request(self, settings: &Settings) -> Result<DashboardRequest> {
        let mut request = match &self.preset {
            Some(path) => load_preset(path)?,
            None => DashboardRequest {
                top_n: settings.top_n,
                ..DashboardRequest::default()
            },
        };

        let pickers = [
            (Field::Region, self.region),
            (Field::State, self.state),
            (Field::Category, self.category),
            (Field::SubCategory, self.sub_category),
            (Field::PaymentMethod, self.payment_method),
            (Field::Segment, self.segment),
            (Field::ShipMode, self.ship_mode),
        ];
        for (field, values) in pickers {
            if !values.is_empty() {
                request.set_selection(field, Selection::from_picker(values));
            }
        }

        request.from = self.from.or(request.from);
        request.to = self.to.or(request.to);
        request.discount.min = self.discount_min.or(request.discount.min);
        request.discount.max = self.discount_max.or(request.discount.max);
        request.shipping_cost.min = self.shipping_cost_min.or(request.shipping_cost.min);
        request.shipping_cost.max = self.shipping_cost_max.or(request.shipping_cost.max);
        if let Some(measure) = self.measure {
            request.measure = measure;
        }
        if let Some(top_n) = self.top_n {
            request.top_n = top_n;
        }
        if let Some(grain) = self.grain {
            request.grain = grain;
        }
        Ok(request)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid environment configuration")?;
    let data_path = cli.data.unwrap_or_else(|| settings.data_path.clone());
    let sheet = cli.sheet.or_else(|| settings.sheet.clone());

    info!("Sales dashboard starting, source: {}", data_path.display());
    let mut cache = SessionCache::new(DatasetLoader::new().with_sheet(sheet));
    let source = cache.get_or_load(&data_path);

    match cli.command {
        Command::Report { filters, format } => {
            let request = filters.into_request(&settings)?;
            let view = build_dashboard(&source, &request);
            match format {
                OutputFormat::Text => print!("{}", render_text(&view)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
            }
        }
        Command::Options { filters } => {
            let request = filters.into_request(&settings)?;
            let pipeline = request.categorical_pipeline();
            for (index, field) in SIDEBAR_DIMENSIONS.iter().enumerate() {
                let options = pipeline
                    .options_at(&source.dataset, index)
                    .with_context(|| format!("cannot list options for {}", field.name()))?;
                if options.is_empty() && field.is_optional() {
                    continue;
                }
                let mut entries = vec!["All".to_string()];
                entries.extend(options);
                println!("{}: {}", field.name(), entries.join(", "));
            }
            if let Some((from, to)) = pipeline.default_date_bounds(&source.dataset)? {
                println!("{}: {} .. {}", Field::OrderDate.name(), from, to);
            }
        }
        Command::Export { filters, out_dir } => {
            let request = filters.into_request(&settings)?;
            let view = build_dashboard(&source, &request);
            for notice in &view.notices {
                info!("{}", notice.text());
            }
            let path = write_csv(&view.filtered, &out_dir)?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
