mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use filters::schema::property_schema;
use runtime::coordinator::{Coordinator, CoordinatorConfig, CoordinatorView};
use runtime::scheduler::SchedulerState;
use runtime::viewport::StaticMap;
use search::client::{HttpSearchClient, SearchClientConfig};
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{ExplorerConfig, parse_bbox, parse_filter, parse_toggle};

#[derive(Parser, Debug)]
#[command(author, version, about = "Filtered property search over a map viewport")]
struct Args {
    /// API base URL (env: EXPLORER_API_BASE)
    #[arg(long)]
    api_base: Option<String>,

    /// Quiet period before a query is sent (env: EXPLORER_DEBOUNCE_MS)
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Per-request timeout (env: EXPLORER_REQUEST_TIMEOUT_MS)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Viewport: west,south,east,north
    #[arg(long, allow_hyphen_values = true)]
    bbox: Option<String>,

    /// Set a filter field, e.g. `salePrice=250000..` (repeatable)
    #[arg(long = "filter")]
    filters: Vec<String>,

    /// Toggle an id in a multi-select field, e.g. `assetClass=retail` (repeatable)
    #[arg(long = "toggle")]
    toggles: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the filter schema as JSON
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let schema = Arc::new(property_schema());

    if let Some(Command::Schema) = args.command {
        println!("{}", serde_json::to_string_pretty(schema.as_ref())?);
        return Ok(());
    }

    let config = ExplorerConfig::from_env().with_overrides(
        args.api_base,
        args.debounce_ms,
        args.timeout_ms,
    );
    let bbox = parse_bbox(args.bbox.as_deref().unwrap_or_default())?;
    let edits = args
        .filters
        .iter()
        .map(|raw| parse_filter(&schema, raw))
        .collect::<Result<Vec<_>, _>>()?;
    let toggles = args
        .toggles
        .iter()
        .map(|raw| parse_toggle(&schema, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let client_config =
        SearchClientConfig::new(config.api_base.clone()).with_timeout(config.request_timeout);
    let client = HttpSearchClient::new(&client_config)?;
    info!("searching {} within {bbox:?}", client.endpoint());

    let handle = Coordinator::spawn(
        Arc::clone(&schema),
        Arc::new(client),
        CoordinatorConfig {
            debounce: config.debounce,
        },
    );
    handle.attach_map(Arc::new(StaticMap::with_bounds(bbox))).await?;

    for (name, value) in edits {
        handle.set_filter(name, value).await?;
    }
    for (name, id) in toggles {
        handle.toggle_array_filter(name, id).await?;
    }

    if !handle.snapshot().has_active_filters {
        warn!("no active filters; nothing to search");
        handle.shutdown().await?;
        return Ok(());
    }

    let budget = config.debounce + config.request_timeout + Duration::from_secs(1);
    let view = tokio::time::timeout(budget, handle.wait_for(settled)).await;
    let metrics = handle.metrics().await?;
    debug!("coordinator metrics: {:?}", metrics.counters);
    handle.shutdown().await?;

    let view = match view {
        Ok(view) => view?,
        Err(_) => return Err(format!("no result within {budget:?}").into()),
    };
    if let Some(err) = view.error() {
        return Err(err.to_string().into());
    }

    let out = json!({
        "count": view.count(),
        "filters": view.active_filter_count,
        "properties": view.property_ids(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// First terminal outcome for the current filters.
fn settled(view: &CoordinatorView) -> bool {
    view.state == SchedulerState::Idle && (view.count().is_some() || view.error().is_some())
}
