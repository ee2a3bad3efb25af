// src/bin/rundag-demo.rs

//! Demo connector: `ingest.run` stores indicator observations as a raw
//! asset, `tables.run` reads them back and writes a per-country summary.
//!
//! Run it directly, isolated, or under the supervisor:
//!
//! ```text
//! rundag-demo --isolate
//! rundag -- rundag-demo --target tables
//! ```

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{ensure, Context};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use rundag::assets::RawStore;
use rundag::cli::PipelineArgs;
use rundag::config::EnvConfig;
use rundag::dag::AggregateStatus;
use rundag::exec::serve_isolated_request;
use rundag::pipeline::Pipeline;
use rundag::{logging, run_pipeline};

const OBSERVATIONS: &str = "wdi_observations";
const SUMMARY: &str = "wdi_country_summary";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Observation {
    country: String,
    indicator: String,
    year: i32,
    value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CountrySummary {
    country: String,
    indicators: usize,
    observations: usize,
    latest_year: i32,
}

fn sample_observations() -> Vec<Observation> {
    let rows = [
        ("NO", "SP.POP.TOTL", 2022, 5_457_127.0),
        ("NO", "SP.POP.TOTL", 2023, 5_519_594.0),
        ("NO", "NY.GDP.PCAP.CD", 2023, 87_961.8),
        ("SE", "SP.POP.TOTL", 2023, 10_536_632.0),
        ("SE", "NY.GDP.PCAP.CD", 2023, 55_516.8),
        ("DK", "SP.POP.TOTL", 2023, 5_946_952.0),
    ];
    rows.into_iter()
        .map(|(country, indicator, year, value)| Observation {
            country: country.to_string(),
            indicator: indicator.to_string(),
            year,
            value,
        })
        .collect()
}

fn ingest(store: &RawStore) -> anyhow::Result<()> {
    let observations = sample_observations();
    store.save_raw_json(OBSERVATIONS, &observations)?;
    info!(rows = observations.len(), "ingested observations");
    Ok(())
}

fn build_tables(store: &RawStore) -> anyhow::Result<()> {
    let observations: Vec<Observation> = store
        .load_raw_json(OBSERVATIONS)
        .context("ingest output missing; run the ingest group first")?;
    ensure!(!observations.is_empty(), "no observations to summarise");

    let mut by_country: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for obs in &observations {
        by_country.entry(obs.country.as_str()).or_default().push(obs);
    }

    let summaries: Vec<CountrySummary> = by_country
        .into_iter()
        .map(|(country, rows)| {
            let mut indicators: Vec<&str> = rows.iter().map(|o| o.indicator.as_str()).collect();
            indicators.sort_unstable();
            indicators.dedup();
            CountrySummary {
                country: country.to_string(),
                indicators: indicators.len(),
                observations: rows.len(),
                latest_year: rows.iter().map(|o| o.year).max().unwrap_or_default(),
            }
        })
        .collect();

    store.save_raw_json(SUMMARY, &summaries)?;
    info!(countries = summaries.len(), "wrote country summary");
    Ok(())
}

fn build_pipeline(store: RawStore) -> rundag::errors::Result<Pipeline> {
    let ingest_store = store.clone();
    Pipeline::builder()
        .node("ingest.run", &[], move || ingest(&ingest_store))
        .node("tables.run", &["ingest.run"], move || build_tables(&store))
        .build()
}

fn main() -> ExitCode {
    let args = PipelineArgs::parse();
    if let Err(e) = logging::init_logging(args.logging.log_level) {
        eprintln!("rundag-demo error: {e:?}");
        return ExitCode::FAILURE;
    }

    let env = EnvConfig::from_env();
    let pipeline = match build_pipeline(RawStore::from_env(&env)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "invalid pipeline");
            return ExitCode::FAILURE;
        }
    };

    if let Some(code) = serve_isolated_request(&pipeline) {
        return code;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_pipeline(&pipeline, &args)) {
        Ok(snapshot) if snapshot.status == AggregateStatus::Failed => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "pipeline run failed");
            ExitCode::FAILURE
        }
    }
}
