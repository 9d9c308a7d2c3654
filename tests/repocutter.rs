//! Integration tests for the repocutter binary: feed a dump through stdin,
//! check the filtered dump or report on stdout.

use assert_cmd::assert::OutputAssertExt as _;
use predicates::prelude::PredicateBooleanExt as _;
use reposurgeon::svn_dump::DumpNode;
use reposurgeon::svn_dump::DumpPreamble;
use reposurgeon::svn_dump::DumpRevision;
use reposurgeon::svn_dump::DumpWriter;
use reposurgeon::svn_dump::NodeAction;
use reposurgeon::svn_dump::NodeKind;
use reposurgeon::svn_dump::Properties;

fn repocutter() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("repocutter").unwrap()
}

fn small_dump() -> Vec<u8> {
    let mut writer = DumpWriter::new(Vec::new());
    writer
        .write_preamble(&DumpPreamble {
            format_version: 2,
            uuid: Some("cli-uuid".to_owned()),
        })
        .unwrap();
    for rev in 1..=3u64 {
        let mut props = Properties::default();
        props.set("svn:author", "fred");
        props.set("svn:date", format!("2020-01-0{rev}T10:00:00.000000Z"));
        props.set("svn:log", format!("change {rev}\n"));
        let mut node = DumpNode::new(
            format!("trunk/file{rev}.txt"),
            NodeKind::File,
            NodeAction::Add,
        );
        node.text = Some(format!("payload {rev}\n").into());
        writer
            .write_revision(&DumpRevision {
                line: 0,
                number: rev,
                props,
                nodes: vec![node],
            })
            .unwrap();
    }
    writer.into_inner()
}

#[test]
fn test_select_range() {
    repocutter()
        .args(["-r", "2", "select"])
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(
            predicates::str::contains("Revision-number: 2")
                .and(predicates::str::contains("Revision-number: 1").not())
                .and(predicates::str::contains("Revision-number: 3").not()),
        );
}

#[test]
fn test_log_report() {
    repocutter()
        .arg("log")
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(
            predicates::str::contains("r2 | fred | 2020-01-02T10:00:00.000000Z")
                .and(predicates::str::contains("change 2")),
        );
}

#[test]
fn test_strip_and_see() {
    repocutter()
        .arg("strip")
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(
            predicates::str::contains("Stripped blob at trunk/file1.txt in r1")
                .and(predicates::str::contains("payload 1").not()),
        );
    repocutter()
        .arg("see")
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(predicates::str::contains("r3  add     file trunk/file3.txt"));
}

#[test]
fn test_pathrename() {
    repocutter()
        .args(["pathrename", "^trunk/", "trunk/src/"])
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(predicates::str::contains("Node-path: trunk/src/file1.txt"));
}

#[test]
fn test_propset_requires_key_value() {
    repocutter()
        .args(["propset", "missing-equals"])
        .write_stdin(small_dump())
        .assert()
        .code(1)
        .stderr(predicates::str::contains("key=value"));
}

#[test]
fn test_malformed_dump_is_user_error() {
    repocutter()
        .arg("select")
        .write_stdin("this is not a dumpfile\n")
        .assert()
        .code(1);
}

#[test]
fn test_expunge_drops_empty_revisions() {
    repocutter()
        .args(["expunge", "file2"])
        .write_stdin(small_dump())
        .assert()
        .success()
        .stdout(predicates::str::contains("Revision-number: 2").not());
}

#[test]
fn test_version() {
    repocutter()
        .arg("version")
        .assert()
        .success()
        .stdout(predicates::str::contains("repocutter"));
}
