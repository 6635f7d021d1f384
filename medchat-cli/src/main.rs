use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "medchat", version, about = "Chat with patient files through the AI gateway")]
struct Cli {
    /// Base URL of the gateway
    #[arg(long, env = "MEDCHAT_GATEWAY_URL", default_value = "http://localhost:3001")]
    gateway_url: String,

    /// Seconds to wait for a discharge report. Defaults to the gateway's own
    /// report budget plus 10 s and may not be shorter than that budget.
    #[arg(long)]
    report_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List patients with indexed documents
    Patients,
    /// Interactive question/answer session about one patient
    Chat {
        #[arg(long)]
        patient: String,
    },
    /// Generate a discharge report and save it as JSON
    Report {
        #[arg(long)]
        patient: String,
        /// Target file, defaults to bericht_<patient>_<date>.json
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Upload JSON, PDF or text documents for a patient
    Upload {
        #[arg(long)]
        patient: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check whether the gateway and the AI service are up
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Warnings only, the terminal belongs to the conversation
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client = commands::connect(&cli.gateway_url, cli.report_timeout).await?;

    match cli.command {
        Command::Patients => commands::list_patients(&client).await,
        Command::Chat { patient } => commands::chat(&client, &patient).await,
        Command::Report { patient, out } => commands::report(&client, &patient, out).await,
        Command::Upload { patient, files } => commands::upload(&client, &patient, files).await,
        Command::Health => commands::health(&client).await,
    }
}
