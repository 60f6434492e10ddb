use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use rust_sa::commands::{deadlocks, jstack, open_snapshot, write_demo_snapshot};
use rust_sa::config::{default_config_path, load_config_or_default, load_or_create_config, SaConfig};

#[derive(Parser)]
#[clap(name = "sa", about = "stack walking and deadlock detection over a JVM memory snapshot")]
pub struct OptsOuter {
    #[clap(long, global = true, help = "config file, sa.config in the working directory by default")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: OptsInner,
}

#[derive(Parser)]
pub enum OptsInner {
    #[clap(about = "print the java stack of every thread")]
    Jstack {
        snapshot: PathBuf,
        #[clap(long, short, help = "print held and awaited locks")]
        locks: bool,
    },
    #[clap(about = "find java-level deadlocks")]
    Deadlocks {
        snapshot: PathBuf,
        #[clap(long, help = "ignore threads parked on ownable synchronizers")]
        no_concurrent_locks: bool,
    },
    #[clap(about = "write a synthetic snapshot with a deadlock")]
    DemoSnapshot {
        output: PathBuf,
    },
    #[clap(about = "configuration file")]
    Config {
        #[clap(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Parser)]
pub enum ConfigCommand {
    #[clap(about = "create the config file with defaults if missing")]
    Init {},
}

fn init_logging(config: &SaConfig) -> anyhow::Result<()> {
    let level = LevelFilter::from_str(config.log_level.as_str())?;
    SimpleLogger::new().with_level(level).env().init()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let opts: OptsOuter = OptsOuter::parse();
    let config_path = match opts.config {
        None => default_config_path(std::env::current_dir()?.as_path()),
        Some(config_path) => config_path,
    };
    if let OptsInner::Config { command: ConfigCommand::Init {} } = opts.command {
        load_or_create_config(config_path.as_path())?;
        println!("{}", config_path.display());
        return Ok(());
    }
    let config = load_config_or_default(config_path.as_path())?;
    init_logging(&config)?;
    let mut out = String::new();
    match opts.command {
        OptsInner::Jstack { snapshot, locks } => {
            let vm = open_snapshot(snapshot.as_path(), &config)?;
            jstack(&mut out, &vm, locks, &config)?;
        }
        OptsInner::Deadlocks { snapshot, no_concurrent_locks } => {
            let vm = open_snapshot(snapshot.as_path(), &config)?;
            deadlocks(&mut out, &vm, config.concurrent_locks && !no_concurrent_locks, &config)?;
        }
        OptsInner::DemoSnapshot { output } => {
            write_demo_snapshot(output.as_path())?;
        }
        OptsInner::Config { .. } => {}
    }
    print!("{}", out);
    Ok(())
}
