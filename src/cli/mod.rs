//! CLI command handling
//!
//! Turns parsed commands into a configured suite run and maps the outcome to
//! a process exit code.

use std::sync::Arc;

use colored::Colorize;

use crate::cases;
use crate::commands::{Commands, RunArgs};
use crate::common::{env, Error, HarnessConfig, Result};
use crate::exec::{EnvPolicy, ExecutionOption};
use crate::suite::{self, matches_focus, run_suite, RunOptions, Suite, VmEnvironment};

/// Description of the suite built from the catalog
pub const SUITE_DESCRIPTION: &str = "Container CLI E2E";

/// Exit code for lifecycle, setup and configuration failures
pub const EXIT_LIFECYCLE: i32 = 2;

/// Dispatch a CLI command, returning the process exit code
pub async fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run(args) => {
            let config = load_config(&args)?;
            run(config).await
        }

        Commands::List { focus } => {
            let config = HarnessConfig::default();
            let target = ExecutionOption::new([config.target.binary.as_str()], EnvPolicy::Inherit)?;
            let suite = build_suite(&target);
            for case in suite.cases() {
                if matches_focus(case.name(), &focus) {
                    println!("{}", case.name());
                }
            }
            Ok(0)
        }

        Commands::Teardown { config, vm_name } => {
            let mut config = HarnessConfig::load(config.as_deref())?;
            if let Some(name) = vm_name {
                config.vm.name = name;
            }
            env::prepend_search_path(&config.paths.bin_dir)?;

            let mut vm = suite::teardown_controller(&config)?;
            match vm.teardown().await {
                Ok(()) => {
                    println!("{} Removed VM '{}'", "✓".green(), config.vm.name);
                    Ok(0)
                }
                Err(e) => {
                    println!("{} Teardown of '{}' failed: {}", "✗".red(), config.vm.name, e);
                    Ok(EXIT_LIFECYCLE)
                }
            }
        }
    }
}

/// Load the config file and apply command-line overrides
pub fn load_config(args: &RunArgs) -> Result<HarnessConfig> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;
    apply_overrides(&mut config, args)?;
    Ok(config)
}

fn apply_overrides(config: &mut HarnessConfig, args: &RunArgs) -> Result<()> {
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(Error::Config("--workers must be at least 1".to_string()));
        }
        config.suite.workers = workers;
    }
    if !args.focus.is_empty() {
        config.suite.focus = args.focus.clone();
    }
    if let Some(backend) = &args.backend {
        config.vm.backend = Some(backend.clone());
    }
    if let Some(report) = &args.report {
        config.suite.report = Some(report.clone());
    }
    if let Some(name) = &args.vm_name {
        config.vm.name = name.clone();
    }
    if let Some(template) = &args.template {
        config.vm.template = template.clone();
    }
    if args.no_registry {
        config.registry.enabled = false;
    }
    Ok(())
}

/// Register the whole catalog against `target`
pub fn build_suite(target: &ExecutionOption) -> Suite {
    let mut suite = Suite::new(SUITE_DESCRIPTION);
    cases::register_all(&mut suite, target);
    suite
}

/// Run the suite described by `config`
///
/// Errors before the VM exists (bad template, unknown backend) are printed
/// and mapped to [`EXIT_LIFECYCLE`]; nothing is started in that case.
pub async fn run(config: HarnessConfig) -> Result<i32> {
    env::prepend_search_path(&config.paths.bin_dir)?;

    let environment = match VmEnvironment::from_config(&config) {
        Ok(environment) => Arc::new(environment),
        Err(e) => {
            println!("{} {}", "Cannot prepare the VM environment:".red().bold(), e);
            return Ok(EXIT_LIFECYCLE);
        }
    };

    let instance = environment.instance().await;
    println!(
        "\n{} {} ({} on {})",
        "Running:".bold(),
        SUITE_DESCRIPTION.cyan(),
        instance.name,
        instance.backend
    );

    let suite = build_suite(environment.target());
    let options = RunOptions {
        workers: config.suite.workers,
        focus: config.suite.focus.clone(),
    };
    let report = run_suite(suite, environment, &options).await;
    report.print_summary();

    if let Some(path) = &config.suite.report {
        report.write_json(path)?;
        tracing::info!(path = %path.display(), "Wrote JSON report");
    }

    Ok(report.exit_code())
}
