//! pmfetch - inspect a PCP-style archive by fetching metrics at a requested
//! time and printing the interpolated result.
//!
//! Demonstration/inspection harness only, not a daemon: opens an archive,
//! does one fetch, prints the result, exits.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use pcp_interp::interp::ArchiveContext;
use pcp_interp::reader::memory::MemoryArchive;
use pcp_interp::reader::file::FileArchive;
use pcp_interp::record::{
    IndomSnapshot, InstanceValue, MetricDesc, MetricType, Pmid, Record, Semantics, Units, Value,
    ValueFmt, ValueSet,
};
use pcp_interp::reader::Direction;
use pcp_interp::timestamp::Timestamp;
use pcp_interp::util::parse_time;

/// Inspect a PCP-style archive: fetch metrics at a requested time.
#[derive(Parser)]
#[command(name = "pmfetch", about = "Fetch interpolated metric values from an archive", version)]
struct Args {
    /// Archive directory written by this crate's `write_archive`. If
    /// omitted, a small built-in demo archive is used instead.
    #[arg(long)]
    archive: Option<PathBuf>,

    /// Requested time, e.g. "123456789.5", "10min", "@120" (see `util::parse_time`).
    #[arg(long, default_value = "0")]
    at: String,

    /// Search direction when the requested time has no exact sample.
    #[arg(long, default_value = "forward")]
    direction: String,

    /// Metric names to fetch, resolved against the built-in registry.
    /// Defaults to every known metric if empty.
    metrics: Vec<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("pmfetch={level}").parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// Small built-in metric registry standing in for a real PMNS lookup.
fn registry() -> HashMap<&'static str, MetricDesc> {
    let mut m = HashMap::new();
    m.insert(
        "demo.counter",
        MetricDesc { pmid: 1, mtype: MetricType::U32, indom: 1, sem: Semantics::Counter, units: Units::default() },
    );
    m.insert(
        "demo.gauge",
        MetricDesc { pmid: 2, mtype: MetricType::F64, indom: 2, sem: Semantics::Instant, units: Units::default() },
    );
    m.insert(
        "demo.discrete",
        MetricDesc { pmid: 3, mtype: MetricType::I32, indom: 3, sem: Semantics::Discrete, units: Units::default() },
    );
    m
}

/// A small in-memory archive used when no `--archive` directory is given.
fn demo_archive() -> MemoryArchive {
    let mut descriptors = HashMap::new();
    for desc in registry().into_values() {
        descriptors.insert(desc.pmid, desc);
    }

    let records = vec![
        Record::Sample {
            t: Timestamp::new(0, 0),
            sets: vec![
                ValueSet { pmid: 1, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: 0, value: Value::U32(100) }] },
                ValueSet { pmid: 2, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: -1, value: Value::F64(1.0) }] },
                ValueSet { pmid: 3, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: -1, value: Value::I32(0) }] },
            ],
        },
        Record::Sample {
            t: Timestamp::new(10, 0),
            sets: vec![
                ValueSet { pmid: 1, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: 0, value: Value::U32(200) }] },
                ValueSet { pmid: 2, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: -1, value: Value::F64(2.0) }] },
                ValueSet { pmid: 3, valfmt: ValueFmt::Insitu, values: vec![InstanceValue { inst: -1, value: Value::I32(1) }] },
            ],
        },
    ];
    let indoms = HashMap::from([
        (1u32, vec![IndomSnapshot { t: Timestamp::new(0, 0), instances: vec![0] }]),
        (2u32, vec![IndomSnapshot { t: Timestamp::new(0, 0), instances: vec![-1] }]),
        (3u32, vec![IndomSnapshot { t: Timestamp::new(0, 0), instances: vec![-1] }]),
    ]);

    MemoryArchive::new(records, descriptors, indoms)
}

fn parse_direction(s: &str) -> Direction {
    match s {
        "backward" | "back" => Direction::Backward,
        _ => Direction::Forward,
    }
}

fn print_result(result: &pcp_interp::FetchResult, names: &HashMap<Pmid, &str>) {
    println!("t = {}", result.timestamp.since(Timestamp::ZERO));
    for metric in &result.metrics {
        let name = names.get(&metric.pmid).copied().unwrap_or("?");
        if metric.numval < 0 {
            println!("  {name}: numval={}", metric.numval);
            continue;
        }
        for iv in &metric.values {
            println!("  {name}[{}] = {:?}", iv.inst, iv.value);
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let reg = registry();
    let pmid_by_name: HashMap<&str, Pmid> = reg.iter().map(|(n, d)| (*n, d.pmid)).collect();
    let name_by_pmid: HashMap<Pmid, &str> = reg.iter().map(|(n, d)| (d.pmid, *n)).collect();

    let wanted: Vec<Pmid> = if args.metrics.is_empty() {
        reg.values().map(|d| d.pmid).collect()
    } else {
        args.metrics
            .iter()
            .filter_map(|name| {
                let pmid = pmid_by_name.get(name.as_str()).copied();
                if pmid.is_none() {
                    eprintln!("unknown metric: {name}");
                }
                pmid
            })
            .collect()
    };

    let t_req_secs = match parse_time(&args.at) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("invalid --at value: {e}");
            std::process::exit(1);
        }
    };
    let origin = Timestamp::new(t_req_secs, 0);
    let direction = parse_direction(&args.direction);

    info!("opening archive, direction={:?}, t_req={}", direction, t_req_secs);

    let result = if let Some(dir) = &args.archive {
        let path = dir.join("archive.pcpi");
        match FileArchive::open(&path, reg.values().map(|d| (d.pmid, *d)).collect(), HashMap::new()) {
            Ok(reader) => {
                let mut ctx = ArchiveContext::open(reader, direction, origin);
                ctx.fetch(&wanted)
            }
            Err(e) => {
                eprintln!("failed to open archive at {}: {e}", path.display());
                std::process::exit(1);
            }
        }
    } else {
        let mut ctx = ArchiveContext::open(demo_archive(), direction, origin);
        ctx.fetch(&wanted)
    };

    match result {
        Ok(fr) => print_result(&fr, &name_by_pmid),
        Err(e) => {
            eprintln!("fetch failed: {e}");
            std::process::exit(1);
        }
    }
}
