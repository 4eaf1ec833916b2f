#![cfg_attr(not(windows), allow(dead_code))]

use clap::{Parser, Subcommand, ValueEnum};
use devgate_core::drives::MediaFilter;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "devgate")]
#[command(about = "Raw device and volume access for Windows", long_about = None)]
struct Cli {
    /// Print machine readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    Any,
    AnyReadOnly,
    AnyWriteOnly,
    Floppy,
    FloppyReadOnly,
}

impl From<FilterArg> for MediaFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::Any => MediaFilter::AnyDisk,
            FilterArg::AnyReadOnly => MediaFilter::AnyDiskReadOnly,
            FilterArg::AnyWriteOnly => MediaFilter::AnyDiskWriteOnly,
            FilterArg::Floppy => MediaFilter::Floppy,
            FilterArg::FloppyReadOnly => MediaFilter::FloppyReadOnly,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List media that can be imaged
    Drives {
        #[arg(short, long, value_enum, default_value_t = FilterArg::Any)]
        filter: FilterArg,
    },
    /// List drive roots with their type and label
    Roots,
    /// Query geometry, layout and model of a device
    Info {
        /// Device path, e.g. \\.\E: or \\.\PhysicalDrive1
        device: String,
    },
    /// Copy a device into an image file
    Read {
        device: String,
        file: PathBuf,
        /// Byte offset to start at
        #[arg(long)]
        offset: Option<u64>,
        /// Number of bytes to copy
        #[arg(long)]
        length: Option<u64>,
    },
    /// Write an image file onto a device
    Write {
        file: PathBuf,
        device: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the system text for an error code
    Error { code: u32 },
    /// List network drives and their shares
    Net,
    /// Show bounds and position of a joystick
    Joystick { index: u32 },
    /// Show the native interface version
    Version,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env = env_logger::Env::new().filter_or(devgate_core::LOG_ENV, level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(windows)]
fn main() -> anyhow::Result<()> {
    use devgate_core::drives::TcpReachability;
    use devgate_core::Gateway;
    use devgate_platform::PlatformBackend;
    use std::io::{self, BufRead};

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let backend = PlatformBackend::new();
    let elevated = backend.is_elevated();
    let gateway = Gateway::new(backend);
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Drives { filter } => {
            if !elevated {
                log::warn!("not elevated: physical drives are listed but cannot be opened");
            }
            commands::list_drives(&gateway, filter.into(), cli.json, &mut out)?;
        }
        Commands::Roots => commands::list_roots(&gateway, cli.json, &mut out)?,
        Commands::Info { device } => commands::show_info(&gateway, &device, cli.json, &mut out)?,
        Commands::Read { device, file, offset, length } => {
            let copied = commands::dump(&gateway, &device, &file, offset, length)?;
            println!("{} bytes copied from {} to {}", copied, device, file.display());
        }
        Commands::Write { file, device, yes } => {
            if !yes {
                println!("WARNING: This will OVERWRITE ALL DATA on {}!", device);
                println!("Type 'yes' to continue: ");
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                if line.trim() != "yes" {
                    println!("Write cancelled.");
                    return Ok(());
                }
            }
            let copied = commands::restore(&gateway, &file, &device)?;
            println!("{} bytes written to {}", copied, device);
        }
        Commands::Error { code } => commands::show_error(&gateway, code, &mut out)?,
        Commands::Net => {
            commands::list_net(&gateway, &TcpReachability::default(), cli.json, &mut out)?;
        }
        Commands::Joystick { index } => commands::show_joystick(&gateway, index, cli.json, &mut out)?,
        Commands::Version => {
            println!(
                "devgate {} (native interface {})",
                env!("CARGO_PKG_VERSION"),
                gateway.lib_version()
            );
        }
    }

    Ok(())
}

#[cfg(not(windows))]
fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    anyhow::bail!("devgate only runs on Windows")
}
