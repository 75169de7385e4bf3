use std::io;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use launcher::{run_menu, Launcher, LauncherConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Menu for starting the DAQ HAT tools", long_about = None)]
struct Args {
    /// Menu definition (TOML); the built-in menu is used when it does not exist
    #[arg(short, long, default_value = "daq_launcher.toml")]
    config: PathBuf,

    /// Print the menu entries and exit
    #[arg(long)]
    list: bool,

    /// Run one entry by label or number and exit with its status
    #[arg(long, value_name = "ENTRY")]
    run: Option<String>,

    /// Print the built-in menu as TOML, a starting point for --config
    #[arg(long)]
    dump_config: bool,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if args.dump_config {
        print!("{}", LauncherConfig::default().to_toml_string()?);
        return Ok(());
    }

    let config = LauncherConfig::load(&args.config)
        .with_context(|| format!("Could not load launcher config {}", args.config.display()))?;
    let launcher = Launcher::new(config);

    if args.list {
        for (i, entry) in launcher.entries().iter().enumerate() {
            println!("{:>2}) {:<24} {}", i + 1, entry.label, entry.command_line());
        }
        return Ok(());
    }

    if let Some(selector) = args.run {
        let report = launcher.launch_selected(&selector)?;
        println!("{}", report);
        if !report.success() {
            std::process::exit(report.status.code().unwrap_or(1));
        }
        return Ok(());
    }

    let stdin = io::stdin();
    run_menu(&launcher, &mut stdin.lock(), &mut io::stdout())?;
    Ok(())
}
