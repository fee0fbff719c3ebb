//! Built-in behavioural cases for the container CLI
//!
//! Each factory takes the shared remote-target option and registers its
//! assertions. Cases create uniquely named resources and remove them again,
//! but images pulled by one case stay visible to later ones.

mod compose;
mod container;
mod image;
mod network;
mod system;
mod volume;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{Error, Result};
use crate::exec::{CommandInvocation, CommandOutput, ExecutionOption};
use crate::suite::Suite;

/// Base image used by most cases
pub const ALPINE: &str = "public.ecr.aws/docker/library/alpine:latest";

const PULL_TIMEOUT: Duration = Duration::from_secs(300);

const BUILD_TIMEOUT: Duration = Duration::from_secs(600);

/// A case factory
pub type Factory = fn(&ExecutionOption, &mut Suite);

/// Factory with the name its cases are grouped under
#[derive(Debug, Clone, Copy)]
pub struct NamedCase {
    pub name: &'static str,
    pub factory: Factory,
}

static CATALOG: &[NamedCase] = &[
    NamedCase { name: "save", factory: image::save },
    NamedCase { name: "load", factory: image::load },
    NamedCase { name: "pull", factory: image::pull },
    NamedCase { name: "rm", factory: container::rm },
    NamedCase { name: "rmi", factory: image::rmi },
    NamedCase { name: "start", factory: container::start },
    NamedCase { name: "stop", factory: container::stop },
    NamedCase { name: "cp", factory: container::cp },
    NamedCase { name: "tag", factory: image::tag },
    NamedCase { name: "build", factory: image::build },
    NamedCase { name: "push", factory: image::push },
    NamedCase { name: "images", factory: image::images },
    NamedCase { name: "compose-build", factory: compose::build },
    NamedCase { name: "compose-down", factory: compose::down },
    NamedCase { name: "compose-kill", factory: compose::kill },
    NamedCase { name: "compose-ps", factory: compose::ps },
    NamedCase { name: "compose-pull", factory: compose::pull },
    NamedCase { name: "compose-logs", factory: compose::logs },
    NamedCase { name: "create", factory: container::create },
    NamedCase { name: "port", factory: container::port },
    NamedCase { name: "kill", factory: container::kill },
    NamedCase { name: "stats", factory: container::stats },
    NamedCase { name: "builder-prune", factory: image::builder_prune },
    NamedCase { name: "exec", factory: container::exec },
    NamedCase { name: "logs", factory: container::logs },
    NamedCase { name: "volume-create", factory: volume::create },
    NamedCase { name: "volume-inspect", factory: volume::inspect },
    NamedCase { name: "volume-ls", factory: volume::ls },
    NamedCase { name: "volume-rm", factory: volume::rm },
    NamedCase { name: "volume-prune", factory: volume::prune },
    NamedCase { name: "image-history", factory: image::history },
    NamedCase { name: "image-inspect", factory: image::inspect },
    NamedCase { name: "image-prune", factory: image::prune },
    NamedCase { name: "info", factory: system::info },
    NamedCase { name: "events", factory: system::events },
    NamedCase { name: "inspect", factory: container::inspect },
    NamedCase { name: "network-create", factory: network::create },
    NamedCase { name: "network-inspect", factory: network::inspect },
    NamedCase { name: "network-ls", factory: network::ls },
    NamedCase { name: "network-rm", factory: network::rm },
];

/// All built-in factories in declaration order
pub fn catalog() -> &'static [NamedCase] {
    CATALOG
}

/// Register every catalog entry against `option`, each under its own group
pub fn register_all(suite: &mut Suite, option: &ExecutionOption) {
    for entry in catalog() {
        suite.describe(entry.name, |s| s.register(&entry.factory, option));
    }
}

// === Helpers shared by the case modules ===

/// Run an engine command and require success
async fn engine<I, S>(opt: &ExecutionOption, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandInvocation::new(opt, args).run().await
}

/// Run an engine command and require failure
async fn engine_fails<I, S>(opt: &ExecutionOption, args: I) -> Result<CommandOutput>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandInvocation::new(opt, args).run_expect_failure().await
}

/// Best-effort cleanup; failures are only logged
async fn cleanup<I, S>(opt: &ExecutionOption, args: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let inv = CommandInvocation::new(opt, args);
    if let Err(e) = inv.output().await {
        tracing::debug!(command = %inv.display(), "Cleanup failed: {}", e);
    }
}

async fn pull(opt: &ExecutionOption, image: &str) -> Result<()> {
    CommandInvocation::new(opt, ["pull", image])
        .with_timeout(PULL_TIMEOUT)
        .run()
        .await?;
    Ok(())
}

/// Start a long-running container from [`ALPINE`]
async fn run_detached(opt: &ExecutionOption, name: &str, extra: &[&str]) -> Result<()> {
    let mut args = vec!["run", "-d", "--name", name];
    args.extend_from_slice(extra);
    args.extend_from_slice(&[ALPINE, "sleep", "infinity"]);
    CommandInvocation::new(opt, args)
        .with_timeout(PULL_TIMEOUT)
        .run()
        .await?;
    Ok(())
}

/// Write `content` to `dir/file` on the engine host
///
/// The engine may run inside a VM, so the file is written by a throwaway
/// container with the host's /tmp bind-mounted. `dir` must be under /tmp.
async fn write_host_file(opt: &ExecutionOption, dir: &str, file: &str, content: &str) -> Result<()> {
    if !dir.starts_with("/tmp/") {
        return Err(Error::Internal(format!("host file dir '{dir}' is not under /tmp")));
    }
    let script = format!("mkdir -p /host{dir} && printf '%s' \"$CONTENT\" > /host{dir}/{file}");
    let env = format!("CONTENT={content}");
    pull(opt, ALPINE).await?;
    engine(
        opt,
        [
            "run",
            "--rm",
            "-e",
            env.as_str(),
            "-v",
            "/tmp:/host/tmp",
            ALPINE,
            "sh",
            "-c",
            script.as_str(),
        ],
    )
    .await?;
    Ok(())
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::assertion(message()))
    }
}

fn ensure_eq(actual: &str, expected: &str, what: &str) -> Result<()> {
    ensure(actual == expected, || {
        format!("{what}: expected '{expected}', got '{actual}'")
    })
}

fn ensure_lists(output: &CommandOutput, item: &str, what: &str) -> Result<()> {
    ensure(output.stdout_lines().contains(&item), || {
        format!("{what}: '{item}' not listed in:\n{}", output.stdout.trim())
    })
}

fn ensure_not_lists(output: &CommandOutput, item: &str, what: &str) -> Result<()> {
    ensure(!output.stdout_lines().contains(&item), || {
        format!("{what}: '{item}' still listed")
    })
}

/// Parse `inspect` output, which is a JSON array of objects
fn first_inspect_object(output: &CommandOutput) -> Result<serde_json::Value> {
    let value: serde_json::Value = serde_json::from_str(output.stdout.trim())?;
    value
        .as_array()
        .and_then(|items| items.first())
        .cloned()
        .ok_or_else(|| Error::assertion(format!("inspect returned no objects: {}", value)))
}

/// Resource name unique within this process
fn unique(kind: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "e2e-{}-{}-{}",
        kind,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
