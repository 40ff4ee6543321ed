mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_rows_are_skipped() {
    let csv = common::script(&[
        "recharge, 1, , 10.00",
        // unknown command
        "transfer, 1, 2, 1.0",
        // amount required
        "recharge, 1",
        // not a number
        "recharge, 1, , ten",
        "recharge, 1, , 5.50",
    ]);

    let mut cmd = Command::new(cargo_bin!("petcare-settlement"));
    cmd.arg(csv.path()).env("RUST_LOG", "warn");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("unreadable command row"))
        .stderr(predicate::str::contains("command rejected"))
        .stdout(predicate::str::contains("1,0,0,0,15.5,15.5,0,0,active"));
}

#[test]
fn test_rejected_commands_leave_state_untouched() {
    let csv = common::script(&[
        "earn, 2, , , 100",
        // negative recharge
        "recharge, 2, , -5",
        // freezing a card that does not exist
        "freeze, 2",
        // cancelling an unknown charge handle
        "cancel, 2, 99",
        // related must be kind:id
        "charge, 2, 1, 10.00, 50, , boarding",
        // the same handle twice
        "charge, 2, 2, 1.00, 10, , order:1",
        "charge, 2, 2, 1.00, 10, , order:2",
    ]);

    let mut cmd = Command::new(cargo_bin!("petcare-settlement"));
    cmd.arg(csv.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("2,90,100,10,0,0,0,0,"));
}

#[test]
fn test_frozen_card_is_not_charged() {
    let csv = common::script(&[
        "recharge, 5, , 40.00",
        "freeze, 5",
        "charge, 5, 1, 15.00, , true, appointment:1",
        "recharge, 5, , 1.00",
    ]);

    let mut cmd = Command::new(cargo_bin!("petcare-settlement"));
    cmd.arg(csv.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("5,0,0,0,40,40,0,0,frozen"));
}

#[test]
fn test_missing_input_file_fails() {
    let mut cmd = Command::new(cargo_bin!("petcare-settlement"));
    cmd.arg("tests/fixtures/does_not_exist.csv");

    cmd.assert().failure();
}
