//! vm-e2e - runs the container CLI end-to-end suite inside an ephemeral VM
//!
//! The VM is created once, every case is routed into it through the
//! lifecycle tool's remote shell, and the VM is removed again at the end.

use clap::Parser;
use vm_e2e::commands::Commands;
use vm_e2e::{cli, common::logging};

#[derive(Parser)]
#[command(name = "vm-e2e", about = "Container CLI end-to-end suite in a throwaway VM")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let verbose = matches!(&cli.command, Commands::Run(args) if args.verbose);
    logging::init_cli(verbose);

    match cli::dispatch(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(cli::EXIT_LIFECYCLE);
        }
    }
}
