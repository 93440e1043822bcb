use clap::{Arg, ArgMatches, Command};
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use wayback_spam_scanner::{
    BatchObserver, BatchResult, BatchScheduler, Config, ConsoleObserver, NullObserver,
    SnapshotSource, StaticSnapshotSource, StopWordSet, WaybackClient,
};

#[tokio::main]
async fn main() {
    let matches = Command::new("wayback-spam-scanner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classify domains by scanning their archived snapshots for spam stop words")
        .arg(
            Arg::new("domains")
                .value_name("DOMAIN")
                .help("Domains to scan")
                .num_args(0..)
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("domains-file")
                .short('f')
                .long("domains-file")
                .value_name("FILE")
                .help("Read domains from a file, one per line")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("stop-words")
                .short('w')
                .long("stop-words")
                .value_name("LIST")
                .help("Additional stop words, comma separated")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("stop-words-file")
                .long("stop-words-file")
                .value_name("FILE")
                .help("Additional stop words from a file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("no-default-stop-words")
                .long("no-default-stop-words")
                .help("Do not include the built-in stop words")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("snapshots")
                .short('n')
                .long("snapshots")
                .value_name("N")
                .help("Maximum snapshots to analyze per domain")
                .value_parser(clap::value_parser!(usize))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("concurrency")
                .short('j')
                .long("concurrency")
                .value_name("N")
                .help("Domains to scan at the same time")
                .value_parser(clap::value_parser!(usize))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("spam-threshold")
                .long("spam-threshold")
                .value_name("SCORE")
                .help("Aggregate score at which a domain counts as spam")
                .value_parser(clap::value_parser!(u32))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("deadline")
                .long("deadline")
                .value_name("SECONDS")
                .help("Give up on unfinished domains after this many seconds")
                .value_parser(clap::value_parser!(u64))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the full result as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .help("Scan canned snapshots instead of the live archive")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging and per-status output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        match Config::default().to_file(Path::new(path)) {
            Ok(()) => println!("✅ Default configuration written to {path}"),
            Err(e) => {
                eprintln!("❌ {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    let stop_words = match build_stop_words(&config, &matches) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("Error loading stop words: {e:#}");
            process::exit(1);
        }
    };

    let demo = matches.get_flag("demo");
    let domains = match collect_domains(&matches, demo) {
        Ok(domains) => domains,
        Err(e) => {
            eprintln!("Error reading domains: {e:#}");
            process::exit(1);
        }
    };

    let source: Arc<dyn SnapshotSource> = if demo {
        Arc::new(StaticSnapshotSource::demo())
    } else {
        match WaybackClient::new(&config.archive) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("Error creating archive client: {e}");
                process::exit(1);
            }
        }
    };

    let scheduler = match BatchScheduler::new(source, config.batch_options()) {
        Ok(scheduler) => scheduler,
        Err(e) => {
            eprintln!("Invalid scan settings: {e}");
            process::exit(1);
        }
    };

    let json = matches.get_flag("json");
    let observer: Arc<dyn BatchObserver> = if json {
        Arc::new(NullObserver)
    } else {
        Arc::new(ConsoleObserver {
            show_status: matches.get_flag("verbose"),
        })
    };

    let result = match scheduler.run(&domains, Arc::new(stop_words), observer).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    if json {
        match serde_json::to_string_pretty(&result) {
            Ok(output) => println!("{output}"),
            Err(e) => {
                eprintln!("Error serializing results: {e}");
                process::exit(1);
            }
        }
    } else {
        print_report(&result);
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(Path::new(path))?,
        None => Config::default(),
    };

    if let Some(&n) = matches.get_one::<usize>("snapshots") {
        config.scan.snapshot_limit = n;
    }
    if let Some(&n) = matches.get_one::<usize>("concurrency") {
        config.scan.max_concurrent = n;
    }
    if let Some(&threshold) = matches.get_one::<u32>("spam-threshold") {
        config.thresholds.spam_threshold = threshold;
    }
    if let Some(&seconds) = matches.get_one::<u64>("deadline") {
        config.scan.deadline_seconds = Some(seconds);
    }
    if matches.get_flag("no-default-stop-words") {
        config.stop_words.use_defaults = false;
    }
    Ok(config)
}

fn build_stop_words(config: &Config, matches: &ArgMatches) -> anyhow::Result<StopWordSet> {
    let mut words = config.stop_words()?;
    if let Some(path) = matches.get_one::<String>("stop-words-file") {
        words = words.merged(&StopWordSet::from_file(Path::new(path))?);
    }
    if let Some(list) = matches.get_one::<String>("stop-words") {
        words = words.merged(&StopWordSet::parse_delimited(list));
    }
    Ok(words)
}

fn collect_domains(matches: &ArgMatches, demo: bool) -> anyhow::Result<Vec<String>> {
    let mut domains: Vec<String> = matches
        .get_many::<String>("domains")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if let Some(path) = matches.get_one::<String>("domains-file") {
        domains.extend(read_domains_file(&PathBuf::from(path))?);
    }

    if domains.is_empty() && demo {
        domains = StaticSnapshotSource::demo()
            .domains()
            .map(str::to_string)
            .collect();
        domains.sort();
    }
    Ok(domains)
}

fn read_domains_file(path: &Path) -> anyhow::Result<Vec<String>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read domains file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_report(result: &BatchResult) {
    println!();
    println!("📊 Scan Results");
    println!("═══════════════════════════════════════");
    println!(
        "┌──────────────────────────────────┬──────────────┬───────────┬───────┐"
    );
    println!(
        "│ Domain                           │ Status       │ Snapshots │ Score │"
    );
    println!(
        "├──────────────────────────────────┼──────────────┼───────────┼───────┤"
    );
    for status in &result.results {
        println!(
            "│ {:<32} │ {:<12} │ {:>9} │ {:>5} │",
            truncate_string(&status.domain, 32),
            status.status.to_string(),
            status.snapshot_count,
            status.total_score
        );
    }
    println!(
        "└──────────────────────────────────┴──────────────┴───────────┴───────┘"
    );

    let summary = &result.summary;
    println!();
    println!("  Total: {}", summary.total);
    println!("  ├─ Clean: {}", summary.clean);
    println!("  ├─ Suspicious: {}", summary.suspicious);
    println!("  ├─ Spam: {}", summary.spam);
    println!("  ├─ Unavailable: {}", summary.unavailable);
    println!("  └─ No Snapshots: {}", summary.no_snapshots);
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
