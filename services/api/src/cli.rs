use crate::commands::{run_batch, run_candidates, BatchArgs, CandidatesArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use donor_match::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Donor Match",
    about = "Serve the donor matching API or run matching maintenance commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run batch allocation over roster files and print the JSON summary
    Batch(BatchArgs),
    /// Print the ranked donor preview for one recipient
    Candidates(CandidatesArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Batch(args) => run_batch(args),
        Command::Candidates(args) => run_candidates(args),
    }
}
