use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use mail_sentinel::config::Config;
use mail_sentinel::ml::{LexicalBackend, MlAdapter};
use mail_sentinel::persistence::{load_history, HistoryFilter, ScanSink, SqliteScanSink};
use mail_sentinel::scanner::EmailScanner;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("mail-sentinel")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Phishing triage for inbound email: rules plus ML, one verdict per message")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/mail-sentinel.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .value_name("FILE")
                .help("Scan an RFC-822 email file and print the result as JSON (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("history")
                .long("history")
                .value_name("N")
                .help("Show the N most recent stored scans")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("domain")
                .long("domain")
                .value_name("DOMAIN")
                .help("Filter --history by sender domain")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verdict")
                .long("verdict")
                .value_name("VERDICT")
                .help("Filter --history by verdict (PHISHING or BENIGN)")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
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

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        println!("🔍 Testing configuration: {config_path}");
        match config.validate() {
            Ok(()) => {
                println!("  Suspicious TLDs: {}", config.rules.suspicious_tlds.len());
                println!("  Urgency keywords: {}", config.rules.urgency_keywords.len());
                println!(
                    "  Suspicious phrases: {}",
                    config.rules.suspicious_phrases.len()
                );
                println!(
                    "  Fusion weights: rules {} / ml {} (threshold {})",
                    config.fusion.rules_weight,
                    config.fusion.ml_weight,
                    config.fusion.verdict_threshold
                );
                println!("✅ Configuration is valid");
            }
            Err(e) => {
                println!("❌ Configuration validation failed: {e}");
                process::exit(1);
            }
        }
        return;
    }

    if let Some(count) = matches.get_one::<String>("history") {
        show_history(&config, count, &matches);
        return;
    }

    let email_files: Vec<&String> = matches
        .get_many::<String>("scan")
        .map(|files| files.collect())
        .unwrap_or_default();
    if email_files.is_empty() {
        eprintln!("Nothing to do; use --scan, --history, --test-config, or --generate-config");
        process::exit(2);
    }

    let sink = build_sink(&config);
    let adapter = Arc::new(MlAdapter::new(
        config.ml.clone(),
        Box::new(LexicalBackend::new()),
    ));
    let scanner = EmailScanner::new(
        &config,
        adapter,
        sink.clone().map(|s| s as Arc<dyn ScanSink>),
    );

    let mut failures = 0;
    for file in email_files {
        match std::fs::read(file) {
            Ok(bytes) => {
                let raw_email = String::from_utf8_lossy(&bytes);
                let result = scanner.scan(&raw_email);
                match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("Error serializing result for {file}: {e}");
                        failures += 1;
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading {file}: {e}");
                failures += 1;
            }
        }
    }

    drop(scanner);
    if let Some(sink) = sink {
        match Arc::try_unwrap(sink) {
            Ok(sink) => sink.shutdown().await,
            Err(_) => log::warn!("Scan history sink still in use at shutdown"),
        }
    }

    if failures > 0 {
        process::exit(1);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Config file {path} not found, using built-in defaults");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Generated default configuration: {path}");
            println!("Edit the rule lists, fusion weights, and persistence settings as needed.");
        }
        Err(e) => {
            eprintln!("Error generating configuration: {e}");
            process::exit(1);
        }
    }
}

fn build_sink(config: &Config) -> Option<Arc<SqliteScanSink>> {
    if !config.persistence.enabled {
        return None;
    }
    match SqliteScanSink::new(&config.persistence.database_path) {
        Ok(sink) => Some(Arc::new(sink)),
        Err(e) => {
            // History is best-effort; scanning proceeds without it.
            log::warn!("Scan history unavailable: {e}");
            None
        }
    }
}

fn show_history(config: &Config, count: &str, matches: &clap::ArgMatches) {
    let limit: usize = match count.parse() {
        Ok(limit) => limit,
        Err(_) => {
            eprintln!("--history expects a number, got '{count}'");
            process::exit(1);
        }
    };
    let filter = HistoryFilter {
        sender_domain: matches.get_one::<String>("domain").cloned(),
        verdict: matches.get_one::<String>("verdict").cloned(),
        limit,
        offset: 0,
    };

    match load_history(&config.persistence.database_path, &filter) {
        Ok(scans) => {
            if scans.is_empty() {
                println!("📭 No stored scans match");
                return;
            }
            println!("📊 Last {} scans", scans.len());
            for scan in scans {
                println!(
                    "  {}  {:<8}  {:.3}  {}  {}",
                    scan.created_at, scan.verdict, scan.confidence, scan.sender_domain,
                    scan.scan_id
                );
            }
        }
        Err(e) => {
            eprintln!("Error reading scan history: {e}");
            process::exit(1);
        }
    }
}
