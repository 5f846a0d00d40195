use crate::demo::{print_transitions, run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use partner_onboarding::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Partner Onboarding",
    about = "Run the partner onboarding service or walk through the verification pipeline",
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
    /// Run one application through every verification stage against in-memory adapters
    Demo(DemoArgs),
    /// Print the role-gated status transition table
    Transitions,
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
        Command::Demo(args) => run_demo(args),
        Command::Transitions => {
            print_transitions();
            Ok(())
        }
    }
}
