//! Volume cases

use crate::exec::ExecutionOption;
use crate::suite::Suite;

use super::{
    cleanup, engine, engine_fails, ensure_eq, ensure_lists, ensure_not_lists,
    first_inspect_object, run_detached, unique,
};

const NAME_FORMAT: &str = "{{.Name}}";

pub fn create(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("creates a named volume", opt, |opt| async move {
        let name = unique("vol-create");
        engine(&opt, ["volume", "create", name.as_str()]).await?;
        let listed = engine(&opt, ["volume", "ls", "--format", NAME_FORMAT]).await;
        cleanup(&opt, ["volume", "rm", name.as_str()]).await;
        ensure_lists(&listed?, &name, "volume ls after create")
    });

    suite.it("rejects an existing name", opt, |opt| async move {
        let name = unique("vol-twice");
        engine(&opt, ["volume", "create", name.as_str()]).await?;
        let again = engine_fails(&opt, ["volume", "create", name.as_str()]).await;
        cleanup(&opt, ["volume", "rm", name.as_str()]).await;
        again.map(|_| ())
    });
}

pub fn inspect(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("returns volume metadata as JSON", opt, |opt| async move {
        let name = unique("vol-inspect");
        engine(&opt, ["volume", "create", name.as_str()]).await?;
        let out = engine(&opt, ["volume", "inspect", name.as_str()]).await;
        cleanup(&opt, ["volume", "rm", name.as_str()]).await;
        let volume = first_inspect_object(&out?)?;
        ensure_eq(volume["Name"].as_str().unwrap_or_default(), &name, "volume Name")
    });

    suite.it("fails for an unknown volume", opt, |opt| async move {
        engine_fails(&opt, ["volume", "inspect", "e2e-no-such-volume"]).await?;
        Ok(())
    });
}

pub fn ls(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("lists every created volume", opt, |opt| async move {
        let first = unique("vol-ls");
        let second = unique("vol-ls");
        engine(&opt, ["volume", "create", first.as_str()]).await?;
        engine(&opt, ["volume", "create", second.as_str()]).await?;
        let listed = engine(&opt, ["volume", "ls", "--quiet"]).await;
        cleanup(&opt, ["volume", "rm", first.as_str(), second.as_str()]).await;
        let listed = listed?;
        ensure_lists(&listed, &first, "volume ls -q")?;
        ensure_lists(&listed, &second, "volume ls -q")
    });

    suite.it("filters by name", opt, |opt| async move {
        let wanted = unique("vol-filter");
        let other = unique("vol-other");
        engine(&opt, ["volume", "create", wanted.as_str()]).await?;
        engine(&opt, ["volume", "create", other.as_str()]).await?;
        let filter = format!("name={}", wanted);
        let listed = engine(&opt, ["volume", "ls", "--quiet", "--filter", filter.as_str()]).await;
        cleanup(&opt, ["volume", "rm", wanted.as_str(), other.as_str()]).await;
        let listed = listed?;
        ensure_lists(&listed, &wanted, "filtered volume ls")?;
        ensure_not_lists(&listed, &other, "filtered volume ls")
    });
}

pub fn rm(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes an unused volume", opt, |opt| async move {
        let name = unique("vol-rm");
        engine(&opt, ["volume", "create", name.as_str()]).await?;
        engine(&opt, ["volume", "rm", name.as_str()]).await?;
        let listed = engine(&opt, ["volume", "ls", "--quiet"]).await?;
        ensure_not_lists(&listed, &name, "volume ls after rm")
    });

    suite.it("refuses a volume in use", opt, |opt| async move {
        let volume = unique("vol-busy");
        let container = unique("vol-busy-ctr");
        let mount = format!("{}:/data", volume);
        run_detached(&opt, &container, &["-v", mount.as_str()]).await?;
        let refused = engine_fails(&opt, ["volume", "rm", volume.as_str()]).await;
        cleanup(&opt, ["rm", "-f", container.as_str()]).await;
        cleanup(&opt, ["volume", "rm", volume.as_str()]).await;
        refused.map(|_| ())
    });
}

pub fn prune(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes unused volumes", opt, |opt| async move {
        let name = unique("vol-prune");
        engine(&opt, ["volume", "create", name.as_str()]).await?;
        engine(&opt, ["volume", "prune", "--all", "--force"]).await?;
        let listed = engine(&opt, ["volume", "ls", "--quiet"]).await?;
        ensure_not_lists(&listed, &name, "volume ls after prune")
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::exec::EnvPolicy;

    /// `sh` standing in for the engine, keeping volumes as files under `dir`
    fn fake_engine(dir: &std::path::Path, reject_duplicates: bool) -> ExecutionOption {
        let duplicate = if reject_duplicates {
            r#"[ -e "$dir/$3" ] && { echo "volume $3 already exists" >&2; exit 1; }"#
        } else {
            ":"
        };
        let script = format!(
            r#"dir='{}'
case "$1 $2" in
  "volume create") {duplicate}; touch "$dir/$3" ;;
  "volume rm") rm "$dir/$3" ;;
  "volume ls") ls "$dir" ;;
esac"#,
            dir.display()
        );
        let prefix = ["sh".to_string(), "-c".to_string(), script, "nerdctl".to_string()];
        ExecutionOption::new(prefix, EnvPolicy::Inherit).unwrap()
    }

    async fn run_named(opt: &ExecutionOption, name: &str) -> crate::Result<()> {
        let mut suite = Suite::new("volume");
        create(opt, &mut suite);
        let case = suite.cases().iter().find(|c| c.name() == name).unwrap();
        case.call().await
    }

    #[tokio::test]
    async fn test_duplicate_create_must_fail() {
        let dir = tempfile::tempdir().unwrap();
        let strict = fake_engine(dir.path(), true);
        run_named(&strict, "creates a named volume").await.unwrap();
        run_named(&strict, "rejects an existing name").await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let lenient = fake_engine(dir.path(), false);
        let err = run_named(&lenient, "rejects an existing name").await.unwrap_err();
        assert!(err.to_string().contains("to fail"), "{err}");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
