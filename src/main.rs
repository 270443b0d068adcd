use anyhow::{Context, Result};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use modbus_logger::cli::{apply_overrides, build_cli};
use modbus_logger::config::{Config, CsvMetadata, MetadataSource};
use modbus_logger::formula::FormulaEvaluator;
use modbus_logger::modbus::{
    list_ports, resolve_port, scan_ports, ModbusClient, ModbusClientTrait, RegisterClient, RetryPolicy,
};
use modbus_logger::output::OutputPipeline;
use modbus_logger::services::{MeasurementCollector, Scheduler};
use modbus_logger::storage::{DryRunStore, MeasurementStore};

/// No serial port with a responding device.
const EXIT_NO_TRANSPORT: u8 = 2;
const EXIT_CONFIG: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = build_cli().get_matches();

    let filter = if matches.get_flag("verbose") {
        "info,modbus_logger=debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    info!("🏭 Modbus Logger v{}", modbus_logger::VERSION);

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Some(path) = matches.get_one::<String>("write-config") {
        return match config.save_to_file(path) {
            Ok(()) => {
                info!("💾 Configuration written to {}", path);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("❌ {}", e);
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }

    if matches.subcommand_matches("scan").is_some() {
        return scan(&config).await;
    }

    match run(&matches, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn load_config(matches: &clap::ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            info!("📁 Loading configuration from {}", path);
            Config::from_file(path).with_context(|| format!("loading {}", path))?
        }
        None => Config::default(),
    };
    config.apply_env();
    apply_overrides(matches, &mut config);
    config.validate()?;
    Ok(config)
}

async fn scan(config: &Config) -> ExitCode {
    let ports = list_ports();
    let found = scan_ports(&ports, &config.discovery, config.serial.function_code, |name| {
        let client: Arc<dyn ModbusClientTrait> = Arc::new(ModbusClient::new(&config.serial, name)?);
        Ok(client)
    })
    .await;

    match found {
        Some(port) => {
            println!("{}", port);
            ExitCode::SUCCESS
        }
        None => ExitCode::from(EXIT_NO_TRANSPORT),
    }
}

fn build_store(config: &Config) -> Result<Arc<dyn MeasurementStore>> {
    if !config.database.enabled {
        info!("📝 Database storage: DISABLED (dry run)");
        return Ok(Arc::new(DryRunStore::new(&config.database.table)));
    }

    database_store(config)
}

#[cfg(feature = "sqlite")]
fn database_store(config: &Config) -> Result<Arc<dyn MeasurementStore>> {
    let store = modbus_logger::storage::SqliteStore::new(config.database.clone())
        .context("configuring the SQLite store")?;
    info!("💾 Database storage: ENABLED ({})", store.destination());
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
fn database_store(config: &Config) -> Result<Arc<dyn MeasurementStore>> {
    warn!("⚠️  Built without SQLite support; falling back to dry run");
    Ok(Arc::new(DryRunStore::new(&config.database.table)))
}

async fn run(matches: &clap::ArgMatches, config: Config) -> Result<ExitCode> {
    let definitions = CsvMetadata::new(&config.metadata.csv_path)
        .load_definitions()
        .context("loading sensor metadata")?;
    if definitions.is_empty() {
        warn!("⚠️  No sensors defined in {}", config.metadata.csv_path);
    }

    let port = match resolve_port(&config.serial, &config.discovery).await {
        Some(port) => port,
        None => {
            error!("❌ No Modbus port found. Exiting.");
            return Ok(ExitCode::from(EXIT_NO_TRANSPORT));
        }
    };

    let client: Arc<dyn ModbusClientTrait> = match ModbusClient::new(&config.serial, &port) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("❌ Failed to open {}: {}", port, e);
            return Ok(ExitCode::from(EXIT_NO_TRANSPORT));
        }
    };

    let registers = Arc::new(RegisterClient::new(
        client,
        RetryPolicy {
            max_attempts: config.polling.max_attempts,
            delay: Duration::from_millis(config.polling.retry_delay_ms),
        },
    ));
    let evaluator = FormulaEvaluator::new(registers, config.serial.function_code);
    let store = build_store(&config)?;

    let scheduler = Scheduler::new(
        Duration::from_secs(config.polling.interval_seconds),
        definitions,
        MeasurementCollector::new(evaluator),
        store,
    )
    .with_output(OutputPipeline::from_config(&config.output));

    if matches.get_flag("once") || matches.subcommand_matches("check").is_some() {
        let report = scheduler.run_cycle().await;
        info!(
            "✅ Single cycle done: {}/{} sensor(s) read",
            report.measurements, report.sensors
        );
        return Ok(ExitCode::SUCCESS);
    }

    let handle = scheduler.handle();
    let task = tokio::spawn(scheduler.run());

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    info!("🛑 Shutdown requested, finishing the current cycle...");
    handle.stop();
    task.await.context("scheduler task")?;

    info!("✅ Stopped cleanly");
    Ok(ExitCode::SUCCESS)
}
