use std::error::Error;
use std::io::{self, Write};
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use hats::interrupt::{self, run_interruptible, WorkerExit};
use hats::mock_hat::{MockHat, MockHatConfig, MockLister};
use hats::scan::{self, ReadLoop, ScanDisplay, TriggerOutcome, TriggerWait};
use hats::{
    select_hat_device, AnalogInputHat, ChannelMask, HatError, HatId, ScanConfig, ScanOptions,
    TriggerMode, READ_TIMEOUT,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "MCC 118 analog input scans", long_about = None)]
struct Args {
    /// Use a simulated MCC 118 instead of real hardware
    #[arg(long, global = true)]
    mock: bool,

    /// HAT address to use; asks when several boards are attached
    #[arg(long, global = true)]
    address: Option<u8>,

    /// Channels to read (comma-separated)
    #[arg(long, global = true, value_delimiter = ',', default_values_t = vec![0, 1, 2, 3])]
    channels: Vec<u8>,

    /// Sample rate per channel in Hz
    #[arg(long, global = true, default_value_t = 1000.0)]
    rate: f64,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Finite scan started by an external trigger
    Triggered {
        /// Samples to acquire per channel
        #[arg(long, default_value_t = 10_000)]
        samples: u32,

        #[arg(long, value_enum, default_value_t = TriggerArg::RisingEdge)]
        trigger_mode: TriggerArg,

        /// Give up waiting for the trigger after this many seconds
        #[arg(long)]
        trigger_timeout: Option<f64>,

        /// Sleep between trigger status polls
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Finite scan that starts immediately
    Finite {
        /// Samples to acquire per channel
        #[arg(long, default_value_t = 10_000)]
        samples: u32,
    },
    /// Continuous scan until Ctrl-C or an overrun
    Continuous {
        /// Scan buffer size in samples per channel
        #[arg(long, default_value_t = 1000)]
        buffer: u32,
    },
    /// One software-timed reading per channel
    Single,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TriggerArg {
    RisingEdge,
    FallingEdge,
    ActiveHigh,
    ActiveLow,
}

impl From<TriggerArg> for TriggerMode {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::RisingEdge => TriggerMode::RisingEdge,
            TriggerArg::FallingEdge => TriggerMode::FallingEdge,
            TriggerArg::ActiveHigh => TriggerMode::ActiveHigh,
            TriggerArg::ActiveLow => TriggerMode::ActiveLow,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn open_hat(args: &Args) -> Result<Box<dyn AnalogInputHat>, HatError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    if args.mock {
        let lister = MockLister::single_mcc118(args.address.unwrap_or(0));
        let address = select_hat_device(&lister, HatId::Mcc118, args.address, &mut input, &mut output)?;
        info!("Using simulated MCC 118");
        let hat = MockHat::new(MockHatConfig {
            address,
            trigger_after_polls: Some(200_000),
            realtime: true,
            ..MockHatConfig::default()
        })?;
        return Ok(Box::new(hat));
    }

    #[cfg(feature = "daqhats")]
    {
        use hats::mcc118::{DaqhatsLister, Mcc118};
        let address =
            select_hat_device(&DaqhatsLister, HatId::Mcc118, args.address, &mut input, &mut output)?;
        Ok(Box::new(Mcc118::open(address)?))
    }

    #[cfg(not(feature = "daqhats"))]
    {
        Err(HatError::Unsupported(
            "built without the `daqhats` feature; use --mock".to_string(),
        ))
    }
}

fn run(args: Args, stop_flag: &AtomicBool) -> Result<(), HatError> {
    let mut hat = open_hat(&args)?;
    let hat = hat.as_mut();

    match args.mode {
        Mode::Triggered {
            samples,
            trigger_mode,
            trigger_timeout,
            poll_interval_ms,
        } => {
            let config = ScanConfig {
                channels: args.channels,
                samples_per_channel: samples,
                sample_rate: args.rate,
                options: ScanOptions::EXTTRIGGER,
                trigger_mode: trigger_mode.into(),
            };
            let policy = TriggerWait {
                poll_interval: poll_interval_ms.map(Duration::from_millis),
                timeout: trigger_timeout.map(Duration::from_secs_f64),
            };
            run_scan(hat, &config, Some(policy), "MCC 118 finite scan with trigger", stop_flag)
        }
        Mode::Finite { samples } => {
            let config = ScanConfig {
                channels: args.channels,
                samples_per_channel: samples,
                sample_rate: args.rate,
                options: ScanOptions::default(),
                trigger_mode: TriggerMode::default(),
            };
            run_scan(hat, &config, None, "MCC 118 finite scan", stop_flag)
        }
        Mode::Continuous { buffer } => {
            let config = ScanConfig {
                channels: args.channels,
                samples_per_channel: buffer,
                sample_rate: args.rate,
                options: ScanOptions::CONTINUOUS,
                trigger_mode: TriggerMode::default(),
            };
            run_scan(hat, &config, None, "MCC 118 continuous scan", stop_flag)
        }
        Mode::Single => {
            let mut out = io::stdout();
            writeln!(out, "\nMCC 118 single value read on address {}\n", hat.address())?;
            let mask = ChannelMask::from_channels(&args.channels)?;
            for (channel, value) in scan::read_single_values(hat, &mask.channels(), ScanOptions::default())? {
                writeln!(out, "Ch {}: {:10.5} V", channel, value)?;
            }
            Ok(())
        }
    }
}

fn run_scan(
    hat: &mut dyn AnalogInputHat,
    config: &ScanConfig,
    trigger: Option<TriggerWait>,
    title: &str,
    stop_flag: &AtomicBool,
) -> Result<(), HatError> {
    let mut display = ScanDisplay::new(io::stdout());
    let channel_mask = config.channel_mask()?;
    let actual_rate = hat.a_in_scan_actual_rate(channel_mask.count() as u8, config.sample_rate)?;
    display.banner(title, hat.address(), config, actual_rate)?;

    scan::start_scan(hat, config)?;
    let result = acquire(hat, config, trigger, &mut display, stop_flag);
    let finished = scan::finish_scan(hat);
    result?;
    finished
}

fn acquire(
    hat: &mut dyn AnalogInputHat,
    config: &ScanConfig,
    trigger: Option<TriggerWait>,
    display: &mut ScanDisplay<io::Stdout>,
    stop_flag: &AtomicBool,
) -> Result<(), HatError> {
    if let Some(policy) = trigger {
        display.message("\nWaiting for trigger ... hit Ctrl-C to cancel the trigger")?;
        match scan::wait_for_trigger(hat, &policy, stop_flag)? {
            TriggerOutcome::Triggered => {}
            TriggerOutcome::ScanStopped => {
                display.message("\nThe scan stopped before the trigger occurred")?;
                return Ok(());
            }
            TriggerOutcome::TimedOut => {
                display.message("\nTimed out waiting for the trigger")?;
                return Ok(());
            }
            TriggerOutcome::Interrupted => {
                display.clear_interrupt()?;
                return Ok(());
            }
        }
    }

    display.message("\nStarting scan ... Press Ctrl-C to stop\n")?;
    display.header(&config.channel_mask()?.channels())?;

    let (read_loop, target) = if config.is_continuous() {
        (ReadLoop::continuous(), None)
    } else {
        (ReadLoop::default(), Some(config.samples_per_channel))
    };
    read_loop.run(hat, target, config.num_channels(), display, stop_flag)?;
    Ok(())
}

fn report(result: Result<(), HatError>) {
    if let Err(err) = result {
        println!("\n {}", err);
        std::process::exit(1);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);

    // a scan read returns within its timeout once the stop flag is up
    let grace = READ_TIMEOUT + Duration::from_secs(1);
    match run_interruptible(move |stop_flag| run(args, &stop_flag), interrupt::ctrl_c, grace)? {
        WorkerExit::Finished(result) => report(result),
        WorkerExit::Abandoned => {
            println!("\n Scan did not stop, exiting");
            std::process::exit(130);
        }
    }

    Ok(())
}
