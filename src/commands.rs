//! CLI command definitions

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the VM, run the case catalog against it, tear it down
    Run(RunArgs),

    /// Print the registered cases without starting anything
    List {
        /// Only list cases whose name contains this text (repeatable)
        #[arg(long)]
        focus: Vec<String>,
    },

    /// Stop and remove a VM left behind by an interrupted run
    Teardown {
        /// Config file (default: ./vm-e2e.toml, then the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Instance name to remove
        #[arg(long)]
        vm_name: Option<String>,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Config file (default: ./vm-e2e.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only run cases whose name contains this text (repeatable)
    #[arg(long)]
    pub focus: Vec<String>,

    /// Number of suite workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// VM backend: vz, qemu, krunkit or wsl2
    #[arg(long)]
    pub backend: Option<String>,

    /// Write a JSON report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Instance name
    #[arg(long)]
    pub vm_name: Option<String>,

    /// VM template path
    #[arg(long)]
    pub template: Option<PathBuf>,

    /// Skip the local registry bootstrap
    #[arg(long)]
    pub no_registry: bool,

    /// Debug-level harness logs
    #[arg(long, short)]
    pub verbose: bool,
}
