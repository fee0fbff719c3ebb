//! Container cases: create/start/stop/kill/rm, exec, logs, cp, port, stats, inspect

use crate::exec::{CommandInvocation, ExecutionOption};
use crate::suite::Suite;

use super::{
    cleanup, engine, engine_fails, ensure, ensure_eq, ensure_lists, ensure_not_lists,
    first_inspect_object, pull, run_detached, unique, ALPINE,
};

const NAMES_FORMAT: &str = "{{.Names}}";
const RUNNING_FORMAT: &str = "{{.State.Running}}";

async fn running(opt: &ExecutionOption, name: &str) -> crate::Result<String> {
    let out = engine(opt, ["inspect", "--format", RUNNING_FORMAT, name]).await?;
    Ok(out.stdout.trim().to_string())
}

pub fn create(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("creates a container without starting it", opt, |opt| async move {
        let name = unique("create");
        pull(&opt, ALPINE).await?;
        engine(&opt, ["create", "--name", name.as_str(), ALPINE, "echo", "created"]).await?;
        let state = running(&opt, &name).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(&state?, "false", "running state after create")
    });
}

pub fn start(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("starts a created container", opt, |opt| async move {
        let name = unique("start");
        pull(&opt, ALPINE).await?;
        engine(&opt, ["create", "--name", name.as_str(), ALPINE, "sleep", "infinity"]).await?;
        let state = match engine(&opt, ["start", name.as_str()]).await {
            Ok(_) => running(&opt, &name).await,
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(&state?, "true", "running state after start")
    });

    suite.it("attaches to output with --attach", opt, |opt| async move {
        let name = unique("start-attach");
        pull(&opt, ALPINE).await?;
        engine(&opt, ["create", "--name", name.as_str(), ALPINE, "echo", "attached-e2e"]).await?;
        let out = engine(&opt, ["start", "--attach", name.as_str()]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(out?.stdout.trim(), "attached-e2e", "attached output")
    });
}

pub fn stop(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("stops a running container", opt, |opt| async move {
        let name = unique("stop");
        run_detached(&opt, &name, &[]).await?;
        let state = match engine(&opt, ["stop", "-t", "1", name.as_str()]).await {
            Ok(_) => running(&opt, &name).await,
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(&state?, "false", "running state after stop")
    });
}

pub fn kill(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("kills a running container", opt, |opt| async move {
        let name = unique("kill");
        run_detached(&opt, &name, &[]).await?;
        let state = match engine(&opt, ["kill", name.as_str()]).await {
            Ok(_) => running(&opt, &name).await,
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(&state?, "false", "running state after kill")
    });
}

pub fn rm(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes a stopped container", opt, |opt| async move {
        let name = unique("rm");
        pull(&opt, ALPINE).await?;
        engine(&opt, ["run", "--name", name.as_str(), ALPINE, "true"]).await?;
        engine(&opt, ["rm", name.as_str()]).await?;
        let listed = engine(&opt, ["ps", "-a", "--format", NAMES_FORMAT]).await?;
        ensure_not_lists(&listed, &name, "ps -a after rm")
    });

    suite.it("refuses a running container without --force", opt, |opt| async move {
        let name = unique("rm-running");
        run_detached(&opt, &name, &[]).await?;
        let refused = engine_fails(&opt, ["rm", name.as_str()]).await;
        let forced = engine(&opt, ["rm", "--force", name.as_str()]).await;
        refused?;
        forced?;
        Ok(())
    });
}

pub fn exec(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("runs a command in a running container", opt, |opt| async move {
        let name = unique("exec");
        run_detached(&opt, &name, &[]).await?;
        let out = engine(&opt, ["exec", name.as_str(), "echo", "exec-e2e"]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(out?.stdout.trim(), "exec-e2e", "exec output")
    });

    suite.it("passes environment with --env", opt, |opt| async move {
        let name = unique("exec-env");
        run_detached(&opt, &name, &[]).await?;
        let out = engine(
            &opt,
            ["exec", "--env", "E2E_VAR=from-exec", name.as_str(), "sh", "-c", "echo $E2E_VAR"],
        )
        .await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(out?.stdout.trim(), "from-exec", "exec env output")
    });

    suite.it("forwards stdin with --interactive", opt, |opt| async move {
        let name = unique("exec-stdin");
        run_detached(&opt, &name, &[]).await?;
        let out = CommandInvocation::new(&opt, ["exec", "--interactive", name.as_str(), "cat"])
            .with_stdin("piped-into-exec")
            .run()
            .await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(out?.stdout.trim(), "piped-into-exec", "exec stdin echo")
    });
}

pub fn logs(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("shows container output", opt, |opt| async move {
        let name = unique("logs");
        pull(&opt, ALPINE).await?;
        engine(&opt, ["run", "--name", name.as_str(), ALPINE, "echo", "logs-e2e"]).await?;
        let out = engine(&opt, ["logs", name.as_str()]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        let out = out?;
        ensure(out.combined().contains("logs-e2e"), || {
            format!("logs missing marker: {}", out.combined().trim())
        })
    });
}

async fn copy_round_trip(opt: &ExecutionOption, name: &str, vm_path: &str) -> crate::Result<String> {
    engine(opt, ["exec", name, "sh", "-c", "echo cp-e2e > /tmp/src.txt"]).await?;
    let from = format!("{}:/tmp/src.txt", name);
    engine(opt, ["cp", from.as_str(), vm_path]).await?;
    let to = format!("{}:/tmp/back.txt", name);
    engine(opt, ["cp", vm_path, to.as_str()]).await?;
    let out = engine(opt, ["exec", name, "cat", "/tmp/back.txt"]).await?;
    Ok(out.stdout.trim().to_string())
}

pub fn cp(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("copies files out of and into a container", opt, |opt| async move {
        let name = unique("cp");
        let vm_path = format!("/tmp/{}.txt", unique("cp"));
        run_detached(&opt, &name, &[]).await?;
        let copied = copy_round_trip(&opt, &name, &vm_path).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_eq(&copied?, "cp-e2e", "copied file content")
    });
}

pub fn port(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("reports published ports", opt, |opt| async move {
        let name = unique("port");
        run_detached(&opt, &name, &["-p", "18080:80"]).await?;
        let out = engine(&opt, ["port", name.as_str(), "80"]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        let out = out?;
        ensure(out.stdout.contains(":18080"), || {
            format!("port mapping missing: {}", out.stdout.trim())
        })
    });
}

pub fn stats(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("reports usage once with --no-stream", opt, |opt| async move {
        let name = unique("stats");
        run_detached(&opt, &name, &[]).await?;
        let out = engine(&opt, ["stats", "--no-stream", "--format", "{{.Name}}", name.as_str()]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        ensure_lists(&out?, &name, "stats")
    });

    suite.it("fails for an unknown container", opt, |opt| async move {
        engine_fails(&opt, ["stats", "--no-stream", "e2e-no-such-container"]).await?;
        Ok(())
    });
}

pub fn inspect(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("returns container metadata as JSON", opt, |opt| async move {
        let name = unique("inspect");
        run_detached(&opt, &name, &[]).await?;
        let out = engine(&opt, ["inspect", name.as_str()]).await;
        let listed = engine(&opt, ["ps", "--format", NAMES_FORMAT]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;

        ensure_lists(&listed?, &name, "ps")?;
        let container = first_inspect_object(&out?)?;
        let reported = container["Name"].as_str().unwrap_or_default();
        ensure_eq(reported.trim_start_matches('/'), &name, "inspect Name")
    });

    suite.it("fails for an unknown container", opt, |opt| async move {
        engine_fails(&opt, ["inspect", "e2e-no-such-container"]).await?;
        Ok(())
    });
}
