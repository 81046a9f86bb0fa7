use clap::{Parser, Subcommand, ValueEnum};

mod commands;

use commands::sweep::SweepArgs;

#[derive(Parser)]
#[command(
    name = "reclaim",
    about = "Reclaim — terminate idle stopped instances and their volumes",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format (logs go to stderr).
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sweep and print the result envelope as JSON.
    ///
    /// Settings come from reclaim.toml (--config, or ./reclaim.toml when
    /// present); flags override the file.
    Sweep(SweepArgs),
    /// Write a reclaim.toml with every setting at its default.
    Init {
        /// Directory to write reclaim.toml into
        #[arg(short, long, default_value = ".")]
        path: String,
        /// Overwrite an existing reclaim.toml
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Sweep(args) => commands::sweep::sweep(args).await,
        Commands::Init { path, force } => commands::init::init(&path, force),
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,reclaim=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sweep_overrides() {
        let cli = Cli::try_parse_from([
            "reclaim",
            "sweep",
            "--lookback",
            "15m",
            "--page-size",
            "50",
            "--region",
            "us-west-2",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Sweep(args) => {
                assert_eq!(args.lookback.as_deref(), Some("15m"));
                assert_eq!(args.page_size, Some(50));
                assert_eq!(args.region.as_deref(), Some("us-west-2"));
                assert!(args.config.is_none());
            }
            Commands::Init { .. } => panic!("expected sweep"),
        }
    }

    #[test]
    fn parses_init_defaults() {
        let cli = Cli::try_parse_from(["reclaim", "init"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
        assert!(matches!(
            cli.command,
            Commands::Init { ref path, force: false } if path == "."
        ));
    }

    #[test]
    fn rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["reclaim", "--log-format", "xml", "init"]).is_err());
    }
}
