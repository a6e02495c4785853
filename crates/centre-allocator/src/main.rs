//! Test Centre Allocation CLI
//!
//! Loads the centre table and pincode coordinates once, then allocates an
//! examination city for each pincode given.
//!
//! Usage:
//!   allocate-centre --centres data/test_centres.csv \
//!                   --coordinates data/pincode_coordinates.json \
//!                   --pincode 110001
//!
//! Without `--pincode`, one pincode is read per line from stdin.

use anyhow::Result;
use centre_allocator::ranker::rank_all;
use centre_allocator::{
    allocate_with, AllocationResult, AllocatorConfig, Dataset, RandomSource, RngSource,
    SelectionStrategy, MAX_REJECTION_DRAWS,
};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// Ranked centres shown by `--explain`
const EXPLAIN_TOP: usize = 5;

const DATA_UNAVAILABLE: &str = "Could not load test centre data. Please try again later.";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strategy {
    /// Draw once from centres outside the nearest city
    Exclusion,
    /// Redraw from the full list until the city differs
    Rejection,
}

#[derive(Parser, Debug)]
#[command(
    name = "allocate-centre",
    about = "Allocate an examination city that is not the nearest one"
)]
struct Args {
    /// Path to the test centre CSV (state, city, pincode)
    #[arg(short = 'c', long, default_value = "data/test_centres.csv")]
    centres: PathBuf,

    /// Path to the pincode coordinates JSON
    #[arg(short = 'k', long, default_value = "data/pincode_coordinates.json")]
    coordinates: PathBuf,

    /// Pincode to allocate for; reads stdin line by line when omitted
    #[arg(short, long)]
    pincode: Option<String>,

    /// Seed for reproducible allocations
    #[arg(short, long)]
    seed: Option<u64>,

    /// Selection strategy for the alternative centre
    #[arg(long, value_enum, default_value_t = Strategy::Exclusion)]
    strategy: Strategy,

    /// Draw cap for the rejection strategy (at least 1)
    #[arg(
        long,
        default_value_t = MAX_REJECTION_DRAWS,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..)
    )]
    max_draws: usize,

    /// List the available centres and exit
    #[arg(long)]
    list: bool,

    /// Also print the nearest ranked centres
    #[arg(long)]
    explain: bool,

    /// Emit one JSON object per allocation instead of messages
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> AllocatorConfig {
        let strategy = match self.strategy {
            Strategy::Exclusion => SelectionStrategy::ExclusionSet,
            Strategy::Rejection => SelectionStrategy::BoundedRejection {
                max_draws: self.max_draws,
            },
        };
        AllocatorConfig { strategy }
    }
}

/// Machine-readable allocation line for `--json`
#[derive(Serialize)]
struct JsonOutcome<'a> {
    pincode: &'a str,
    #[serde(flatten)]
    result: &'a AllocationResult,
}

/// User-facing lines for an allocation outcome
fn render(result: &AllocationResult) -> Vec<String> {
    match result {
        AllocationResult::InvalidPincode => {
            vec!["Please enter a valid 6-digit pincode.".to_string()]
        }
        AllocationResult::PincodeNotFound => {
            vec!["Pincode not found. Please try another one.".to_string()]
        }
        AllocationResult::NoNearestFound => {
            vec!["Could not determine the nearest city.".to_string()]
        }
        AllocationResult::NoAlternativeAvailable { nearest } => vec![
            format!("Your nearest city is {}.", nearest.city),
            "No other city is available for allocation.".to_string(),
        ],
        AllocationResult::Allocated { nearest, allocated } => vec![
            format!("Your nearest city is {}.", nearest.city),
            "NO. This city will not be allotted to you.".to_string(),
            "-".repeat(40),
            "Your allocated examination city is:".to_string(),
            allocated.city.clone(),
        ],
    }
}

fn explain(dataset: &Dataset, pincode: &str, out: &mut impl Write) -> io::Result<()> {
    let Some(origin) = dataset.index.get(pincode) else {
        return Ok(());
    };

    writeln!(out, "Nearest centres to {}:", pincode)?;
    for ranked in rank_all(origin, &dataset.centres, &dataset.index)
        .iter()
        .take(EXPLAIN_TOP)
    {
        writeln!(
            out,
            "  {:>8.1} km | {:30} | {}",
            ranked.distance_km, ranked.centre.city, ranked.centre.state
        )?;
    }
    Ok(())
}

fn handle<R: RandomSource + ?Sized>(
    args: &Args,
    config: &AllocatorConfig,
    dataset: &Dataset,
    pincode: &str,
    rng: &mut R,
    out: &mut impl Write,
) -> io::Result<()> {
    let result = allocate_with(config, pincode, &dataset.centres, &dataset.index, rng);
    debug!(
        "Pincode {}: nearest {:?}, allocated {:?}",
        pincode,
        result.nearest().map(|c| c.city.as_str()),
        result.allocated().map(|c| c.city.as_str())
    );

    if args.json {
        serde_json::to_writer(&mut *out, &JsonOutcome { pincode, result: &result })?;
        writeln!(out)?;
        return Ok(());
    }

    if args.explain {
        explain(dataset, pincode, out)?;
    }
    for line in render(&result) {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

fn run(
    args: &Args,
    dataset: &Dataset,
    rng: &mut dyn RandomSource,
    input: impl BufRead,
    out: &mut impl Write,
) -> io::Result<()> {
    let config = args.config();

    if args.list {
        for centre in &dataset.centres {
            writeln!(out, "{:30} {}", centre.city, centre.state)?;
        }
        return Ok(());
    }

    if let Some(pincode) = &args.pincode {
        return handle(args, &config, dataset, pincode, &mut *rng, out);
    }

    info!("Reading pincodes from stdin, one per line");
    for line in input.lines() {
        let line = line?;
        let pincode = line.trim();
        if pincode.is_empty() {
            continue;
        }
        handle(args, &config, dataset, pincode, &mut *rng, out)?;
        if !args.json {
            writeln!(out)?;
        }
        out.flush()?;
    }

    Ok(())
}

/// Load the data and serve requests; returns the process exit status
fn execute(args: &Args, input: impl BufRead, out: &mut impl Write) -> io::Result<u8> {
    let dataset = match Dataset::load(&args.centres, &args.coordinates) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("Data unavailable: {}", e);
            writeln!(out, "{}", DATA_UNAVAILABLE)?;
            return Ok(1);
        }
    };

    info!(
        "Ready: {} centres, {} pincodes",
        dataset.centres.len(),
        dataset.index.len()
    );

    match args.seed {
        Some(seed) => run(args, &dataset, &mut RngSource::seeded(seed), input, out)?,
        None => run(args, &dataset, &mut RngSource::thread(), input, out)?,
    }
    Ok(0)
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for results
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let status = execute(&args, stdin.lock(), &mut stdout.lock())?;

    Ok(ExitCode::from(status))
}
