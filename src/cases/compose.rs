//! Compose cases: build, down, kill, ps, pull, logs
//!
//! Each case generates its own project under the engine host's /tmp and
//! runs `compose -f <file> -p <project>` against it.

use std::time::Duration;

use crate::common::Result;
use crate::exec::{CommandInvocation, CommandOutput, ExecutionOption};
use crate::suite::Suite;

use super::{
    cleanup, engine, ensure, ensure_lists, unique, write_host_file, ALPINE, BUILD_TIMEOUT,
    PULL_TIMEOUT,
};

const SERVICE: &str = "svc";
const LOG_MARKER: &str = "compose-logs-e2e";
const NAMES_FORMAT: &str = "{{.Names}}";

/// A generated compose project
struct Project {
    name: String,
    dir: String,
}

impl Project {
    /// Project whose single service runs [`ALPINE`] and logs [`LOG_MARKER`]
    async fn sleeper(opt: &ExecutionOption, kind: &str) -> Result<Self> {
        let compose = format!(
            "services:\n  {SERVICE}:\n    image: {ALPINE}\n    command: [\"sh\", \"-c\", \"echo {LOG_MARKER} && sleep infinity\"]\n"
        );
        Self::write(opt, kind, &compose).await
    }

    async fn write(opt: &ExecutionOption, kind: &str, compose: &str) -> Result<Self> {
        let name = unique(kind);
        let project = Self {
            dir: format!("/tmp/{}", name),
            name,
        };
        write_host_file(opt, &project.dir, "compose.yaml", compose).await?;
        Ok(project)
    }

    fn invocation(&self, opt: &ExecutionOption, extra: &[&str]) -> CommandInvocation {
        let file = format!("{}/compose.yaml", self.dir);
        let mut args = vec!["compose", "-f", file.as_str(), "-p", self.name.as_str()];
        args.extend_from_slice(extra);
        CommandInvocation::new(opt, args).with_timeout(PULL_TIMEOUT)
    }

    async fn run(&self, opt: &ExecutionOption, extra: &[&str]) -> Result<CommandOutput> {
        self.invocation(opt, extra).run().await
    }

    async fn down(&self, opt: &ExecutionOption) {
        let inv = self.invocation(opt, &["down"]);
        if let Err(e) = inv.output().await {
            tracing::debug!(command = %inv.display(), "Cleanup failed: {}", e);
        }
    }

    /// Containers of this project; running only unless `all`
    async fn containers(&self, opt: &ExecutionOption, all: bool) -> Result<CommandOutput> {
        let label = format!("label=com.docker.compose.project={}", self.name);
        let mut args = vec!["ps"];
        if all {
            args.push("--all");
        }
        args.extend_from_slice(&["--filter", label.as_str(), "--format", NAMES_FORMAT]);
        engine(opt, args).await
    }
}

fn ensure_none(output: &CommandOutput, what: &str) -> Result<()> {
    ensure(output.stdout_lines().is_empty(), || {
        format!("{what}: containers left:\n{}", output.stdout.trim())
    })
}

pub fn build(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("builds service images", opt, |opt| async move {
        let tag = format!("{}:latest", unique("compose-build"));
        let compose = format!("services:\n  {SERVICE}:\n    build: .\n    image: {tag}\n");
        let project = Project::write(&opt, "compose-build", &compose).await?;
        let dockerfile = format!("FROM {}\nCMD [\"echo\", \"compose-built\"]\n", ALPINE);
        write_host_file(&opt, &project.dir, "Dockerfile", &dockerfile).await?;

        let built = project
            .invocation(&opt, &["build"])
            .with_timeout(BUILD_TIMEOUT)
            .run()
            .await;
        let images = match built {
            Ok(_) => engine(&opt, ["images", "--format", "{{.Repository}}:{{.Tag}}"]).await,
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rmi", "-f", tag.as_str()]).await;
        ensure_lists(&images?, &tag, "images after compose build")
    });
}

pub fn down(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes service containers", opt, |opt| async move {
        let project = Project::sleeper(&opt, "compose-down").await?;
        project.run(&opt, &["up", "-d"]).await?;
        let before = project.containers(&opt, true).await;
        let downed = project.run(&opt, &["down"]).await;
        if downed.is_err() {
            project.down(&opt).await;
        }

        ensure(!before?.stdout_lines().is_empty(), || {
            "compose up started no containers".to_string()
        })?;
        downed?;
        ensure_none(&project.containers(&opt, true).await?, "ps -a after compose down")
    });
}

pub fn kill(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("kills running services", opt, |opt| async move {
        let project = Project::sleeper(&opt, "compose-kill").await?;
        let killed = match project.run(&opt, &["up", "-d"]).await {
            Ok(_) => project.run(&opt, &["kill"]).await,
            Err(e) => Err(e),
        };
        let running = match killed {
            Ok(_) => project.containers(&opt, false).await,
            Err(e) => Err(e),
        };
        project.down(&opt).await;
        ensure_none(&running?, "running containers after compose kill")
    });
}

pub fn ps(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("lists running services", opt, |opt| async move {
        let project = Project::sleeper(&opt, "compose-ps").await?;
        let listed = match project.run(&opt, &["up", "-d"]).await {
            Ok(_) => project.run(&opt, &["ps"]).await,
            Err(e) => Err(e),
        };
        project.down(&opt).await;
        let listed = listed?;
        ensure(
            listed
                .stdout_lines()
                .iter()
                .any(|line| line.contains(project.name.as_str()) && line.contains(SERVICE)),
            || format!("service missing from compose ps:\n{}", listed.stdout.trim()),
        )
    });
}

pub fn pull(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("pulls service images", opt, |opt| async move {
        let project = Project::sleeper(&opt, "compose-pull").await?;
        cleanup(&opt, ["rmi", "-f", ALPINE]).await;
        project.run(&opt, &["pull"]).await?;
        let images = engine(&opt, ["images", "--format", "{{.Repository}}:{{.Tag}}"]).await?;
        ensure_lists(&images, ALPINE, "images after compose pull")
    });
}

pub fn logs(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("shows service output", opt, |opt| async move {
        let project = Project::sleeper(&opt, "compose-logs").await?;
        let seen = match project.run(&opt, &["up", "-d"]).await {
            Ok(_) => wait_for_marker(&project, &opt).await,
            Err(e) => Err(e),
        };
        project.down(&opt).await;
        let out = seen?;
        ensure(out.combined().contains(LOG_MARKER), || {
            format!("compose logs missing marker: {}", out.combined().trim())
        })
    });
}

/// Poll `compose logs` until the service has printed its marker
async fn wait_for_marker(project: &Project, opt: &ExecutionOption) -> Result<CommandOutput> {
    let mut attempts = 0;
    loop {
        let out = project.run(opt, &["logs", "--no-color"]).await?;
        attempts += 1;
        if out.combined().contains(LOG_MARKER) || attempts >= 10 {
            return Ok(out);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
