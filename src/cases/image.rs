//! Image cases: pull, tag, save/load, build, push, history, inspect, prune

use crate::exec::{CommandInvocation, ExecutionOption};
use crate::registry;
use crate::suite::Suite;

use super::{
    cleanup, engine, engine_fails, ensure, ensure_eq, ensure_lists, ensure_not_lists,
    first_inspect_object, pull as pull_image, run_detached, unique, write_host_file, ALPINE,
    BUILD_TIMEOUT,
};

const REPO_TAG_FORMAT: &str = "{{.Repository}}:{{.Tag}}";

pub fn pull(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("pulls an image by reference", opt, |opt| async move {
        cleanup(&opt, ["rmi", "-f", ALPINE]).await;
        pull_image(&opt, ALPINE).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await?;
        ensure_lists(&images, ALPINE, "images after pull")
    });

    suite.it("fails for an unknown image", opt, |opt| async move {
        engine_fails(&opt, ["pull", "e2e.invalid/does-not/exist:never"]).await?;
        Ok(())
    });
}

pub fn rmi(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes a tagged image", opt, |opt| async move {
        let tag = format!("{}:latest", unique("rmi"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["tag", ALPINE, tag.as_str()]).await?;
        engine(&opt, ["rmi", tag.as_str()]).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await?;
        ensure_not_lists(&images, &tag, "images after rmi")
    });

    suite.it("fails for an unknown image", opt, |opt| async move {
        engine_fails(&opt, ["rmi", "e2e-never-pulled:latest"]).await?;
        Ok(())
    });
}

pub fn tag(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("adds a new reference to an image", opt, |opt| async move {
        let tag = format!("{}:v1", unique("tag"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["tag", ALPINE, tag.as_str()]).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await;
        cleanup(&opt, ["rmi", tag.as_str()]).await;
        ensure_lists(&images?, &tag, "images after tag")
    });
}

pub fn images(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("lists pulled images", opt, |opt| async move {
        pull_image(&opt, ALPINE).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await?;
        ensure_lists(&images, ALPINE, "images")
    });

    suite.it("prints ids with --quiet", opt, |opt| async move {
        pull_image(&opt, ALPINE).await?;
        let ids = engine(&opt, ["images", "--quiet"]).await?;
        ensure(!ids.stdout_lines().is_empty(), || "no image ids printed".to_string())
    });
}

pub fn save(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("writes an image archive", opt, |opt| async move {
        let archive = format!("/tmp/{}.tar", unique("save"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["save", "-o", archive.as_str(), ALPINE]).await?;

        // The archive lives in the VM; check it from a container with /tmp mounted.
        let mounted = format!("/host{}", archive);
        let check = engine(
            &opt,
            [
                "run",
                "--rm",
                "-v",
                "/tmp:/host/tmp",
                ALPINE,
                "test",
                "-s",
                mounted.as_str(),
            ],
        )
        .await;
        cleanup(&opt, ["run", "--rm", "-v", "/tmp:/host/tmp", ALPINE, "rm", "-f", mounted.as_str()]).await;
        check.map(|_| ())
    });
}

pub fn load(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("restores a saved image", opt, |opt| async move {
        let tag = format!("{}:latest", unique("load"));
        let archive = format!("/tmp/{}.tar", unique("load"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["tag", ALPINE, tag.as_str()]).await?;
        engine(&opt, ["save", "-o", archive.as_str(), tag.as_str()]).await?;
        engine(&opt, ["rmi", tag.as_str()]).await?;

        engine(&opt, ["load", "-i", archive.as_str()]).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await;
        cleanup(&opt, ["rmi", tag.as_str()]).await;
        ensure_lists(&images?, &tag, "images after load")
    });
}

pub fn build(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("builds an image from a Dockerfile", opt, |opt| async move {
        let context = format!("/tmp/{}", unique("build"));
        let tag = format!("{}:latest", unique("build"));
        let dockerfile = format!("FROM {}\nCMD [\"echo\", \"built-by-e2e\"]\n", ALPINE);
        write_host_file(&opt, &context, "Dockerfile", &dockerfile).await?;

        let built = CommandInvocation::new(&opt, ["build", "-t", tag.as_str(), context.as_str()])
            .with_timeout(BUILD_TIMEOUT)
            .run()
            .await;
        let ran = match built {
            Ok(_) => engine(&opt, ["run", "--rm", tag.as_str()]).await,
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rmi", "-f", tag.as_str()]).await;
        ensure_eq(ran?.stdout.trim(), "built-by-e2e", "built image output")
    });
}

pub fn push(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("pushes to the local registry", opt, |opt| async move {
        let reference = format!("{}/{}:latest", registry::address(), unique("push"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["tag", ALPINE, reference.as_str()]).await?;
        let pushed = engine(&opt, ["push", "--insecure-registry", reference.as_str()]).await;
        let pulled_back = match pushed {
            Ok(_) => {
                engine(&opt, ["rmi", reference.as_str()]).await?;
                engine(&opt, ["pull", "--insecure-registry", reference.as_str()]).await
            }
            Err(e) => Err(e),
        };
        cleanup(&opt, ["rmi", "-f", reference.as_str()]).await;
        pulled_back.map(|_| ())
    });
}

pub fn history(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("shows image layers", opt, |opt| async move {
        pull_image(&opt, ALPINE).await?;
        let layers = engine(&opt, ["history", "--quiet", ALPINE]).await?;
        ensure(!layers.stdout_lines().is_empty(), || {
            format!("no history for {}", ALPINE)
        })
    });
}

pub fn inspect(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("returns image metadata as JSON", opt, |opt| async move {
        pull_image(&opt, ALPINE).await?;
        let out = engine(&opt, ["image", "inspect", ALPINE]).await?;
        let image = first_inspect_object(&out)?;
        let tagged = image["RepoTags"]
            .as_array()
            .map(|tags| tags.iter().any(|t| t.as_str() == Some(ALPINE)))
            .unwrap_or(false);
        ensure(tagged, || format!("RepoTags missing {}: {}", ALPINE, image["RepoTags"]))
    });

    suite.it("fails for an unknown image", opt, |opt| async move {
        engine_fails(&opt, ["image", "inspect", "e2e-never-pulled:latest"]).await?;
        Ok(())
    });
}

pub fn prune(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes unused images with --all", opt, |opt| async move {
        let tag = format!("{}:latest", unique("image-prune"));
        pull_image(&opt, ALPINE).await?;
        engine(&opt, ["tag", ALPINE, tag.as_str()]).await?;
        engine(&opt, ["image", "prune", "--all", "--force"]).await?;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await?;
        ensure_not_lists(&images, &tag, "images after prune")
    });

    suite.it("keeps images used by a container", opt, |opt| async move {
        let name = unique("image-prune-keep");
        run_detached(&opt, &name, &[]).await?;
        let pruned = engine(&opt, ["image", "prune", "--all", "--force"]).await;
        let images = engine(&opt, ["images", "--format", REPO_TAG_FORMAT]).await;
        cleanup(&opt, ["rm", "-f", name.as_str()]).await;
        pruned?;
        ensure_lists(&images?, ALPINE, "images after prune")
    });
}

pub fn builder_prune(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("clears the build cache", opt, |opt| async move {
        let context = format!("/tmp/{}", unique("builder-prune"));
        let tag = format!("{}:latest", unique("builder-prune"));
        let dockerfile = format!("FROM {}\nRUN echo cached > /cached.txt\n", ALPINE);
        write_host_file(&opt, &context, "Dockerfile", &dockerfile).await?;

        let built = CommandInvocation::new(&opt, ["build", "-t", tag.as_str(), context.as_str()])
            .with_timeout(BUILD_TIMEOUT)
            .run()
            .await;
        cleanup(&opt, ["rmi", "-f", tag.as_str()]).await;
        built?;
        engine(&opt, ["builder", "prune", "--all", "--force"]).await?;
        Ok(())
    });
}
