use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde_json::Value;
use strata_config::{DataLayer, DataLayerConfig, DataLayerConfigSource};
use strata_core::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "strata-inspect",
    about = "Load a strata data layer and print the records of a store or view"
)]
struct Cli {
    /// Data layer config (TOML or JSON). Falls back to STRATA_CONFIG_PATH,
    /// STRATA_CONFIG_JSON, then ./strata.toml
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Store or view to print; defaults to the first id
    #[arg(long, short)]
    store: Option<String>,

    /// Extra filter, `prop<op>value` with op one of = != >= <= > < ^=.
    /// `=` is a case-insensitive exact match; `^=` matches a prefix
    #[arg(long = "filter", value_name = "FILTER")]
    filters: Vec<String>,

    /// Extra sort, `prop` or `prop:asc|desc`
    #[arg(long = "sort", value_name = "SORT")]
    sorters: Vec<String>,

    /// Print a table of counts for every store and view instead of records
    #[arg(long)]
    summary: bool,

    /// Skip autoloading stores
    #[arg(long)]
    no_load: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let (config, origin) = match &cli.config {
        Some(path) => (
            DataLayerConfig::load_from_file(path)?,
            DataLayerConfigSource::File(path.clone()),
        ),
        None => DataLayerConfig::load_from_env()?,
    };
    tracing::info!(?origin, "configuration loaded");

    let layer = DataLayer::build(config).context("invalid data layer configuration")?;
    if !cli.no_load {
        for (id, count) in layer.autoload().await? {
            tracing::info!(store_id = %id, count, "autoloaded");
        }
    }

    if cli.summary {
        print!("{}", summary_table(&layer.summary()));
        return Ok(());
    }

    let id = match cli.store {
        Some(id) => id,
        None => layer
            .registry()
            .ids()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("configuration declares no stores"))?,
    };
    let source = layer
        .get(&id)
        .ok_or_else(|| anyhow!("no store or view named `{id}`"))?;

    let target = if cli.filters.is_empty() && cli.sorters.is_empty() {
        source
    } else {
        let view = DerivedView::new(source)?;
        for raw in &cli.filters {
            view.filter(parse_filter(raw)?)?;
        }
        let sorters = cli
            .sorters
            .iter()
            .map(|raw| parse_sorter(raw))
            .collect::<Result<Vec<_>>>()?;
        if !sorters.is_empty() {
            view.sort_by(sorters)?;
        }
        Source::from(view)
    };

    target.each(|record| {
        println!("{}", record.get_data());
        true
    });
    Ok(())
}

fn parse_value(raw: &str) -> FieldValue {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| FieldValue::from_json(&value))
        .unwrap_or_else(|| FieldValue::from(raw))
}

fn parse_filter(raw: &str) -> Result<Filter> {
    const OPERATORS: &[&str] = &["!=", ">=", "<=", "^=", ">", "<", "="];

    let (at, op) = OPERATORS
        .iter()
        .filter_map(|op| raw.find(op).map(|at| (at, *op)))
        .min_by_key(|(at, op)| (*at, std::cmp::Reverse(op.len())))
        .ok_or_else(|| anyhow!("filter `{raw}` needs an operator, e.g. group=code"))?;

    let property = raw[..at].trim();
    let value = parse_value(raw[at + op.len()..].trim());
    if property.is_empty() {
        bail!("filter `{raw}` has no property");
    }

    let operator = match op {
        "^=" => FilterOperator::StartsWith,
        other => other.parse::<FilterOperator>()?,
    };
    Ok(Filter::with_operator(property, operator, value))
}

fn parse_sorter(raw: &str) -> Result<Sorter> {
    let (property, direction) = match raw.split_once(':') {
        Some((property, direction)) => (property, direction.parse::<SortDirection>()?),
        None => (raw, SortDirection::Asc),
    };
    if property.trim().is_empty() {
        bail!("sort `{raw}` has no property");
    }
    Ok(Sorter::new(property.trim(), direction))
}

fn summary_table(rows: &[(String, usize)]) -> String {
    let width = rows
        .iter()
        .map(|(id, _)| id.len())
        .chain(std::iter::once("ID".len()))
        .max()
        .unwrap_or_default();

    let mut table = format!("{:<width$}  COUNT\n", "ID");
    for (id, count) in rows {
        table.push_str(&format!("{id:<width$}  {count}\n"));
    }
    table
}
