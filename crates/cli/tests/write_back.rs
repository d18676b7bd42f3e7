use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

const SCRIPT: &str = "\
class TestClass:
    def setup(cls):
        gl.DUT1.send(f'''
          sysname lab
          ''')

    def test_step_1_vlan(self):
        gl.DUT1.send(f'''
          vlan 10
          quit
          ''')

    def teardown(cls):
        gl.DUT1.send(f'''
          save
          ''')
";

const OLD_COMMANDS: &str = "\
!!!func setup
!!device DUT1
sysname lab
!!!func test_step_1_vlan
!!device DUT1
vlan 10
quit
!!!func teardown
!!device DUT1
save
";

fn cmdsync() -> Command {
    Command::cargo_bin("cmdsync").expect("binary")
}

#[test]
fn rewrites_only_the_changed_function() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let old = temp.path().join("before.md");
    let new = temp.path().join("after.md");
    fs::write(&script, SCRIPT).unwrap();
    fs::write(&old, OLD_COMMANDS).unwrap();
    fs::write(&new, OLD_COMMANDS.replace("vlan 10", "vlan 20")).unwrap();

    cmdsync().arg(&script).arg(&old).arg(&new).assert().success();

    let result = fs::read_to_string(&script).unwrap();
    assert!(result.contains("vlan 20"));
    assert!(!result.contains("vlan 10"));
    // Unchanged neighbours keep their exact text.
    assert!(result.contains("    def setup(cls):\n        gl.DUT1.send(f'''\n          sysname lab\n          ''')"));
    assert!(result.contains("    def teardown(cls):\n        gl.DUT1.send(f'''\n          save\n          ''')"));
}

#[test]
fn identical_documents_leave_the_script_untouched() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let old = temp.path().join("before.md");
    let new = temp.path().join("after.md");
    fs::write(&script, SCRIPT).unwrap();
    fs::write(&old, OLD_COMMANDS).unwrap();
    fs::write(&new, OLD_COMMANDS).unwrap();

    cmdsync().arg(&script).arg(&old).arg(&new).assert().success();

    assert_eq!(fs::read_to_string(&script).unwrap(), SCRIPT);
}

#[test]
fn function_missing_from_script_is_skipped() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let old = temp.path().join("before.md");
    let new = temp.path().join("after.md");
    fs::write(&script, SCRIPT).unwrap();
    fs::write(&old, OLD_COMMANDS).unwrap();
    // The only difference concerns a function the script does not define.
    fs::write(
        &new,
        format!("{OLD_COMMANDS}!!!func test_step_9_absent\n!!device DUT1\nreboot\n"),
    )
    .unwrap();

    cmdsync().arg(&script).arg(&old).arg(&new).assert().success();

    assert_eq!(fs::read_to_string(&script).unwrap(), SCRIPT);
}

#[test]
fn missing_input_exits_nonzero_and_names_the_path() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let old = temp.path().join("before.md");
    fs::write(&script, SCRIPT).unwrap();
    fs::write(&old, OLD_COMMANDS).unwrap();
    let missing = temp.path().join("no_such_after.md");

    cmdsync()
        .arg(&script)
        .arg(&old)
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no_such_after.md"));
}

#[test]
fn revert_directory_keeps_artifacts_after_the_run() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let old = temp.path().join("before.md");
    let new = temp.path().join("after.md");
    let mapping = temp.path().join("topology.json");
    fs::write(&script, SCRIPT).unwrap();
    fs::write(&old, OLD_COMMANDS).unwrap();
    fs::write(&new, OLD_COMMANDS.replace("vlan 10", "vlan 20")).unwrap();
    fs::write(&mapping, r#"{"DUT1": "rack-7"}"#).unwrap();

    cmdsync()
        .arg(&script)
        .arg(&old)
        .arg(&new)
        .arg(&mapping)
        .assert()
        .success();

    let revert = temp.path().join("revert");
    assert_eq!(
        fs::read_to_string(revert.join("mapping.json")).unwrap(),
        r#"{"DUT1": "rack-7"}"#
    );
    let before =
        fs::read_to_string(revert.join("test_step_1_vlan_before_modification.md")).unwrap();
    assert!(before.contains("vlan 10"));
    let after =
        fs::read_to_string(revert.join("test_step_1_vlan_after_modification.md")).unwrap();
    assert!(after.contains("vlan 20"));
}

#[test]
fn generated_check_reuses_the_script_snippet() {
    let temp = tempdir().unwrap();
    let script = temp.path().join("test_vlan.py");
    let source = "\
class TestClass:
    def test_step_1_vlan(self):
        gl.DUT1.send(f'''
          vlan 10
          ''')
        gl.DUT1.CheckCommand('', cmd=f'display vlan', expect=['10'])
";
    fs::write(&script, source).unwrap();

    let old = temp.path().join("before.md");
    let new = temp.path().join("after.md");
    fs::write(&old, "!!!func test_step_1_vlan\n!!device DUT1\nvlan 10\ndisplay vlan\n").unwrap();
    fs::write(&new, "!!!func test_step_1_vlan\n!!device DUT1\nvlan 20\ndisplay vlan\n").unwrap();

    cmdsync().arg(&script).arg(&old).arg(&new).assert().success();

    let result = fs::read_to_string(&script).unwrap();
    assert!(result.contains("vlan 20"));
    assert!(result.contains("gl.DUT1.CheckCommand('', cmd=f'display vlan', expect=['10'])"));
}
