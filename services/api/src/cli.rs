use crate::demo::{run_demo, run_revenue_report, DemoArgs, RevenueReportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use domus_billing::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Domus Billing Engine",
    about = "Run and demonstrate the property billing and reconciliation engine",
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
    /// Revenue reporting over the seeded demo portfolio
    Revenue {
        #[command(subcommand)]
        command: RevenueCommand,
    },
    /// Run an end-to-end CLI demo covering sweeps, payments, and refunds
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RevenueCommand {
    /// Print the month-by-month sales and rental revenue summary
    Report(RevenueReportArgs),
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
        Command::Revenue {
            command: RevenueCommand::Report(args),
        } => run_revenue_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
