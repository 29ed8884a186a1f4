//! StayHub CLI - run offloaded computations over JSON documents.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stayhub_core::compute::parse_instant;
use stayhub_core::{BookingFilters, FilterOptions, HotelFilters, SortOrder, TaskRequest};
use stayhub_worker::metrics::collect_metrics;
use stayhub_worker::{Binding, OffloadConfig, Offloader, PoolRegistry};

/// StayHub CLI - offloaded filtering, search and analytics
#[derive(Parser)]
#[command(name = "stayhub")]
#[command(about = "Run StayHub computations over JSON documents", long_about = None)]
struct Cli {
    /// JSON configuration file (capacities and thresholds)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Units per pool, overriding the configuration
    #[arg(long, global = true)]
    capacity: Option<usize>,

    /// Input document, `-` for stdin
    #[arg(short, long, global = true, default_value = "-")]
    input: String,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search, filter and sort a record array
    Filter {
        /// Case-insensitive term matched against every string field
        #[arg(long)]
        search_term: Option<String>,

        /// Field predicate as FIELD=JSON, e.g. `status="DONE"` or `price={"min":50}`
        #[arg(long = "where", value_parser = parse_predicate)]
        predicates: Vec<(String, Value)>,

        /// Field to sort by
        #[arg(long)]
        sort_by: Option<String>,

        #[arg(long, value_enum, default_value = "asc")]
        order: Order,
    },

    /// Sort a record array
    Sort {
        /// Field to sort by (dotted paths allowed; empty sorts scalars)
        #[arg(long, default_value = "")]
        by: String,

        #[arg(long, value_enum, default_value = "asc")]
        order: Order,
    },

    /// Search selected fields of a record array
    Search {
        /// Search term
        term: String,

        /// Field to search (repeatable)
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
    },

    /// Search a hotel listing
    Hotels {
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        min_price: Option<f64>,

        #[arg(long)]
        max_price: Option<f64>,

        /// Accepted star rating (repeatable)
        #[arg(long = "stars")]
        stars: Vec<u8>,

        /// Required amenity id (repeatable)
        #[arg(long = "amenity")]
        amenities: Vec<i64>,

        #[arg(long)]
        check_in: Option<String>,

        #[arg(long)]
        check_out: Option<String>,

        #[arg(long)]
        guests: Option<u32>,
    },

    /// Revenue, volume and status mix of a booking array
    Analytics {
        #[command(flatten)]
        filters: BookingArgs,
    },

    /// Host earnings of a booking array
    Earnings {
        #[command(flatten)]
        filters: BookingArgs,
    },

    /// Completed revenue of a booking array
    Revenue {
        #[command(flatten)]
        filters: BookingArgs,
    },

    /// Dashboard statistics over `{"hotels": [...], "bookings": [...]}`
    Stats {
        /// Reference time instead of now
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Run a raw `{"type": ..., "payload": ...}` request on its pool
    Run,
}

#[derive(clap::Args)]
struct BookingArgs {
    /// Inclusive lower date bound
    #[arg(long)]
    start_date: Option<String>,

    /// Inclusive upper date bound
    #[arg(long)]
    end_date: Option<String>,

    /// Only bookings of this hotel (JSON value, e.g. 7 or "h-7")
    #[arg(long, value_parser = parse_json)]
    hotel_id: Option<Value>,
}

impl From<BookingArgs> for BookingFilters {
    fn from(args: BookingArgs) -> Self {
        BookingFilters {
            start_date: args.start_date,
            end_date: args.end_date,
            hotel_id: args.hotel_id,
        }
    }
}

#[derive(Deserialize)]
struct StatsInput {
    #[serde(default)]
    hotels: Vec<Value>,
    #[serde(default)]
    bookings: Vec<Value>,
}

/// Parse a JSON argument, treating anything unparsable as a bare string.
fn parse_json(raw: &str) -> Result<Value, String> {
    Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

fn parse_predicate(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FIELD=JSON, got `{raw}`"))?;
    Ok((field.to_string(), parse_json(value)?))
}

fn read_input(path: &str) -> Result<String, Box<dyn std::error::Error>> {
    if path == "-" {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        Ok(raw)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (stderr, so stdout stays pure JSON)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stayhub=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => OffloadConfig::load(path)?,
        None => OffloadConfig::default(),
    };
    if let Some(capacity) = cli.capacity {
        config = config.with_capacity(capacity);
    }

    let registry = Arc::new(PoolRegistry::new(config));
    let offloader = Offloader::new(registry.clone());
    let raw = read_input(&cli.input)?;

    match cli.command {
        Commands::Filter {
            search_term,
            predicates,
            sort_by,
            order,
        } => {
            let mut options = FilterOptions::default();
            if let Some(term) = search_term {
                options = options.with_search_term(term);
            }
            for (field, value) in predicates {
                options = options.with_filter(field, value);
            }
            if let Some(sort_by) = sort_by {
                options = options.with_sort(sort_by, order.into());
            }
            let data: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .filter_and_sort(&Binding::new(), data, options)
                .await;
            print_json(&result)?;
        }
        Commands::Sort { by, order } => {
            let data: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .sort(&Binding::new(), data, by, order.into())
                .await;
            print_json(&result)?;
        }
        Commands::Search { term, fields } => {
            let items: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .search(&Binding::new(), items, term, fields)
                .await;
            print_json(&result)?;
        }
        Commands::Hotels {
            query,
            min_price,
            max_price,
            stars,
            amenities,
            check_in,
            check_out,
            guests,
        } => {
            let filters = HotelFilters {
                query,
                min_price,
                max_price,
                stars: (!stars.is_empty()).then(|| stars.into_iter().map(Value::from).collect()),
                amenities: (!amenities.is_empty())
                    .then(|| amenities.into_iter().map(Value::from).collect()),
                check_in,
                check_out,
                guests,
            };
            let hotels: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .filter_hotels(&Binding::new(), hotels, filters)
                .await;
            print_json(&result)?;
        }
        Commands::Analytics { filters } => {
            let bookings: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .analytics(&Binding::new(), bookings, filters.into())
                .await;
            print_json(&result)?;
        }
        Commands::Earnings { filters } => {
            let bookings: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .earnings(&Binding::new(), bookings, filters.into())
                .await;
            print_json(&result)?;
        }
        Commands::Revenue { filters } => {
            let bookings: Vec<Value> = serde_json::from_str(&raw)?;
            let result = offloader
                .revenue(&Binding::new(), bookings, filters.into())
                .await;
            print_json(&result)?;
        }
        Commands::Stats { as_of } => {
            let input: StatsInput = serde_json::from_str(&raw)?;
            let binding = Binding::new();
            let result = match as_of {
                Some(raw_as_of) => {
                    let as_of = parse_instant(&raw_as_of)
                        .ok_or_else(|| format!("--as-of is not a date: {raw_as_of}"))?;
                    offloader
                        .dashboard_stats_at(&binding, input.hotels, input.bookings, as_of)
                        .await
                }
                None => {
                    offloader
                        .dashboard_stats(&binding, input.hotels, input.bookings)
                        .await
                }
            };
            print_json(&result)?;
        }
        Commands::Run => {
            let request: TaskRequest = serde_json::from_str(&raw)?;
            info!(kind = request.kind(), family = %request.family(), "Running raw request");
            let output = registry.execute(request).wait().await?;
            print_json(&output)?;
        }
    }

    if cli.metrics {
        eprint!("{}", collect_metrics(&offloader));
    }
    offloader.cleanup();

    Ok(())
}
