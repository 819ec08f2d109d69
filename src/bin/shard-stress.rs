use clap::{Arg, ArgMatches, Command};
use shard_stress::store::{Endpoint, PartitionGroup, StepDownBehavior};
use shard_stress::{
    ChaosConfig, ChaosDriver, ChaosWeights, MemoryStore, OpWeights, WorkloadConfig, WorkloadDriver,
};
use std::time::Duration;

/// Soak runner: drives the workload (and optionally the chaos) driver against
/// the in-memory cluster for a bounded number of ticks and prints a JSON
/// summary. Useful for exercising the harness end to end without a real
/// cluster behind it.

fn main() {
    let matches = create_cli().get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(&matches) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("shard-stress")
        .about("Workload and chaos soak runner against an in-memory cluster")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("ticks")
                .help("Workload scheduler ticks to run")
                .long("ticks")
                .default_value("1000"),
        )
        .arg(
            Arg::new("seed")
                .help("Random seed; omit for an OS-seeded run")
                .long("seed"),
        )
        .arg(
            Arg::new("shard-key-mix")
                .help("Mix field index used as the shard key (0-31)")
                .long("shard-key-mix")
                .default_value("5"),
        )
        .arg(
            Arg::new("index-mix")
                .help("Mix field index used as the secondary index (0-31)")
                .long("index-mix")
                .default_value("4"),
        )
        .arg(
            Arg::new("weights")
                .help("Operation weights as query,insert,update,delete")
                .long("weights")
                .default_value("40,30,5,5"),
        )
        .arg(
            Arg::new("pace-ms")
                .help("Sleep between workload ticks, in milliseconds")
                .long("pace-ms")
                .default_value("0"),
        )
        .arg(
            Arg::new("chaos-ticks")
                .help("Chaos scheduler ticks to run after the workload")
                .long("chaos-ticks")
                .default_value("0"),
        )
        .arg(
            Arg::new("leader-change-weight")
                .help("Chaos weight for forced leader changes (flush stays at 100)")
                .long("leader-change-weight")
                .default_value("0"),
        )
}

fn run(matches: &ArgMatches) -> shard_stress::Result<()> {
    let ticks: u64 = parse(matches, "ticks")?;
    let seed: Option<u64> = match matches.get_one::<String>("seed") {
        Some(raw) => Some(parse_raw("seed", raw)?),
        None => None,
    };
    let weights = parse_weights(matches.get_one::<String>("weights").map(String::as_str))?;

    let store = MemoryStore::with_cluster(
        (0..3)
            .map(|i| Endpoint(format!("router-{i}:27017")))
            .collect(),
        (0..4)
            .map(|i| PartitionGroup {
                id: format!("group-{i}"),
                primary: Endpoint(format!("group-{i}/node-a:27018")),
            })
            .collect(),
    )
    .with_step_down_behavior(StepDownBehavior::SeverConnection);

    let config = WorkloadConfig {
        shard_key_mix: parse(matches, "shard-key-mix")?,
        index_mix: parse(matches, "index-mix")?,
        weights,
        seed,
        pace: Duration::from_millis(parse(matches, "pace-ms")?),
        ..Default::default()
    };

    let mut workload = WorkloadDriver::new(store.clone(), config)?;
    workload.run_ticks(ticks)?;

    let chaos_ticks: u64 = parse(matches, "chaos-ticks")?;
    let mut chaos_counts = Vec::new();
    if chaos_ticks > 0 {
        let config = ChaosConfig {
            weights: ChaosWeights {
                flush_routing_cache: 100,
                force_leader_change: parse(matches, "leader-change-weight")?,
            },
            quiesce: Duration::from_millis(50),
            pace: Duration::ZERO,
            seed,
            ..Default::default()
        };
        let mut chaos = ChaosDriver::new(store.clone(), config)?;
        chaos.run_ticks(chaos_ticks)?;
        chaos_counts = chaos.op_counts();
    }

    let cursors = workload.cursors();
    let summary = serde_json::json!({
        "client_id": workload.client_id().0,
        "ticks": workload.ticks(),
        "op_counts": counts_object(&workload.op_counts()),
        "chaos_counts": counts_object(&chaos_counts),
        "cursors": {
            "inserted": cursors.inserted,
            "updated": cursors.updated,
            "deleted": cursors.deleted,
        },
        "documents": store.document_count(),
        "admin_commands": store.admin_journal().len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());

    Ok(())
}

fn counts_object(counts: &[(&'static str, u64)]) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = counts
        .iter()
        .map(|(name, count)| ((*name).to_string(), serde_json::json!(count)))
        .collect();
    serde_json::Value::Object(map)
}

fn parse<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> shard_stress::Result<T> {
    let raw = matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default();
    parse_raw(name, raw)
}

fn parse_raw<T: std::str::FromStr>(name: &str, raw: &str) -> shard_stress::Result<T> {
    raw.parse()
        .map_err(|_| shard_stress::Error::Config(format!("invalid value for --{name}: {raw}")))
}

fn parse_weights(raw: Option<&str>) -> shard_stress::Result<OpWeights> {
    let raw = raw.unwrap_or("40,30,5,5");
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return Err(shard_stress::Error::Config(format!(
            "expected four comma-separated weights, got {raw}"
        )));
    }
    Ok(OpWeights {
        query: parse_raw("weights", parts[0])?,
        insert: parse_raw("weights", parts[1])?,
        update: parse_raw("weights", parts[2])?,
        delete: parse_raw("weights", parts[3])?,
    })
}
