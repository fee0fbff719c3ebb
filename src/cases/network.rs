//! Network cases

use crate::exec::ExecutionOption;
use crate::suite::Suite;

use super::{
    cleanup, engine, engine_fails, ensure_eq, ensure_lists, ensure_not_lists,
    first_inspect_object, unique,
};

const NAME_FORMAT: &str = "{{.Name}}";

pub fn create(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("creates a network", opt, |opt| async move {
        let name = unique("net-create");
        engine(&opt, ["network", "create", name.as_str()]).await?;
        let listed = engine(&opt, ["network", "ls", "--format", NAME_FORMAT]).await;
        cleanup(&opt, ["network", "rm", name.as_str()]).await;
        ensure_lists(&listed?, &name, "network ls after create")
    });

    suite.it("rejects a duplicate name", opt, |opt| async move {
        let name = unique("net-dup");
        engine(&opt, ["network", "create", name.as_str()]).await?;
        let duplicate = engine_fails(&opt, ["network", "create", name.as_str()]).await;
        cleanup(&opt, ["network", "rm", name.as_str()]).await;
        duplicate.map(|_| ())
    });
}

pub fn inspect(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("returns network metadata as JSON", opt, |opt| async move {
        let name = unique("net-inspect");
        engine(&opt, ["network", "create", name.as_str()]).await?;
        let out = engine(&opt, ["network", "inspect", name.as_str()]).await;
        cleanup(&opt, ["network", "rm", name.as_str()]).await;
        let network = first_inspect_object(&out?)?;
        ensure_eq(network["Name"].as_str().unwrap_or_default(), &name, "network Name")
    });
}

pub fn ls(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("lists the default bridge network", opt, |opt| async move {
        let listed = engine(&opt, ["network", "ls", "--format", NAME_FORMAT]).await?;
        ensure_lists(&listed, "bridge", "network ls")
    });
}

pub fn rm(opt: &ExecutionOption, suite: &mut Suite) {
    suite.it("removes a network", opt, |opt| async move {
        let name = unique("net-rm");
        engine(&opt, ["network", "create", name.as_str()]).await?;
        engine(&opt, ["network", "rm", name.as_str()]).await?;
        let listed = engine(&opt, ["network", "ls", "--format", NAME_FORMAT]).await?;
        ensure_not_lists(&listed, &name, "network ls after rm")
    });

    suite.it("fails for an unknown network", opt, |opt| async move {
        engine_fails(&opt, ["network", "rm", "e2e-no-such-network"]).await?;
        Ok(())
    });
}
