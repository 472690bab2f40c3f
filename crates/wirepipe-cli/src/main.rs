use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "wirepipe",
    about = "Stream files through bounded pipes, channels and zero-copy transfers",
    version,
    propagate_version = true,
)]
struct Cli {
    /// TOML file with [io] and [pool] tables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy a file, using a zero-copy transfer unless --buffered is given
    Copy {
        src: PathBuf,
        dst: PathBuf,
        /// Use a buffered read/write loop instead of a kernel transfer
        #[arg(long)]
        buffered: bool,
    },
    /// Read a file to its end and report how many bytes were discarded.
    ///
    /// A missing file is reported as absent rather than as an error.
    Drain { path: PathBuf },
    /// Stream a file to stdout through a push-to-pull bridge
    Cat {
        path: PathBuf,
        /// Bridge flavour: bytes, chars or channel
        #[arg(long, default_value = "bytes")]
        via: String,
        /// Character set for the chars bridge (overrides [io].charset)
        #[arg(long)]
        charset: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wirepipe=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = commands::config::CliConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Copy { src, dst, buffered } => {
            commands::copy::copy(&src, &dst, buffered).map(drop)
        }
        Commands::Drain { path } => commands::drain::drain(&path).map(drop),
        Commands::Cat { path, via, charset } => {
            let mut stdout = std::io::stdout().lock();
            commands::cat::cat(&config, &path, &via, charset.as_deref(), &mut stdout).map(drop)
        }
    }
}
