//! System cases

use std::time::Duration;

use crate::exec::{CommandInvocation, ExecutionOption};
use crate::suite::Suite;

use super::{engine, ensure, pull, unique, ALPINE};

/// How long `events` is watched; it never exits on its own
const EVENTS_WINDOW: Duration = Duration::from_secs(15);

pub fn info(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("reports engine information as JSON", opt, |opt| async move {
        let out = engine(&opt, ["info", "--format", "{{json .}}"]).await?;
        let info: serde_json::Value = serde_json::from_str(out.stdout.trim())?;
        ensure(info.is_object(), || format!("info is not an object: {}", info))?;
        ensure(info.get("ServerVersion").is_some(), || {
            "info JSON has no ServerVersion".to_string()
        })
    });
}

pub fn events(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("streams container lifecycle events", opt, |opt| async move {
        let name = unique("events");
        pull(&opt, ALPINE).await?;

        let watch = CommandInvocation::new(&opt, ["events", "--format", "{{json .}}"]);
        let (events, ran) = tokio::join!(watch.capture_for(EVENTS_WINDOW), async {
            // Give the subscription time to attach before generating events.
            tokio::time::sleep(Duration::from_secs(3)).await;
            engine(&opt, ["run", "--rm", "--name", name.as_str(), ALPINE, "true"]).await
        });
        ran?;
        let events = events?;

        let topics: Vec<String> = events
            .stdout_lines()
            .into_iter()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|event| event["Topic"].as_str().map(str::to_string))
            .collect();
        ensure(topics.iter().any(|t| t.starts_with("/containers/")), || {
            format!(
                "no container events seen; stdout:\n{}\nstderr:\n{}",
                events.stdout.trim(),
                events.stderr.trim()
            )
        })
    });
}
