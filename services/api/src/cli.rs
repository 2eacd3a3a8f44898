use crate::demo::{run_demo, run_pass_command, DemoArgs, RunArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use counsel_flow::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Counsel Flow",
    about = "Run the Counsel Flow lead and reminder automation from the command line",
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
    /// Run a single automation pass against the seeded demo caseload
    Run(RunArgs),
    /// Run every pass over the seeded demo caseload and print the summaries
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Start with the demo caseload instead of an empty store
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Run(args) => run_pass_command(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
