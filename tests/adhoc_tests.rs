// Ad-hoc command / configuration push tests

mod common;

use clap::Parser;
use common::*;
use std::sync::Arc;
use stockpiler::adhoc::{AdhocAction, run_adhoc};
use stockpiler::cli::Cli;
use stockpiler::transport::TransportKind;

#[test]
fn test_config_arg_splits_on_semicolons() {
    assert_eq!(
        AdhocAction::config_from_arg("ntp server 10.0.0.9; logging host 10.0.0.10 ;;"),
        AdhocAction::Config(vec![
            "ntp server 10.0.0.9".into(),
            "logging host 10.0.0.10".into()
        ])
    );
}

#[tokio::test]
async fn test_run_command_reports_each_device() {
    let transports = Arc::new(
        FakeTransports::new().script("r1", TransportKind::Ssh, Script::ok("Cisco IOS 15.2\n")),
    );
    let devices = vec![
        device("r2", "10.0.0.2", "cisco_ios"),
        device("r1", "10.0.0.1", "cisco_ios"),
    ];

    let results = run_adhoc(
        devices,
        transports.clone(),
        AdhocAction::Command("show version".into()),
        2,
    )
    .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].device, "r1");
    assert_eq!(results[0].result.as_deref().unwrap(), "Cisco IOS 15.2\n");
    assert!(results[1].result.is_err(), "r2 has no reachable session");
    assert_eq!(results[0].to_string(), "=== r1 (10.0.0.1) ===\nCisco IOS 15.2");
    assert!(results[1].to_string().starts_with("=== r2 (10.0.0.2) ===\nERROR:"));
    assert_eq!(transports.calls_for("r1")[0].command, "show version");
}

#[tokio::test]
async fn test_push_config_sends_every_line() {
    let transports = Arc::new(FakeTransports::new().script("r1", TransportKind::Ssh, Script::ok("")));

    run_adhoc(
        vec![device("r1", "10.0.0.1", "cisco_ios")],
        transports.clone(),
        AdhocAction::config_from_arg("ntp server 10.0.0.9;logging host 10.0.0.10"),
        1,
    )
    .await;

    let commands: Vec<String> = transports.calls_for("r1").into_iter().map(|c| c.command).collect();
    assert_eq!(commands, vec!["ntp server 10.0.0.9", "logging host 10.0.0.10"]);
}

#[test]
fn test_cli_command_and_config_conflict() {
    let err = Cli::try_parse_from(["stockpiler", "--command", "show clock", "--config", "x"]);
    assert!(err.is_err());
}

#[test]
fn test_cli_parses_flags() {
    let cli = Cli::try_parse_from([
        "stockpiler",
        "-i",
        "/srv/hosts.yaml",
        "-a",
        "10.0.0.1",
        "10.0.0.2",
        "--credential-file",
        "-p",
        "127.0.0.1:1080",
        "--config",
        "ntp server 10.0.0.9",
    ])
    .unwrap();

    assert_eq!(cli.addresses, vec!["10.0.0.1", "10.0.0.2"]);
    assert_eq!(
        cli.credential_file.as_deref(),
        Some(std::path::Path::new("/opt/stockpiler/credentials.b64"))
    );
    assert_eq!(cli.proxy.as_deref(), Some("127.0.0.1:1080"));
    assert_eq!(
        cli.adhoc_action(),
        Some(AdhocAction::Config(vec!["ntp server 10.0.0.9".into()]))
    );
    assert!(cli.credential_request().file.is_some());
}

#[test]
fn test_cli_defaults_to_stockpile_run() {
    let cli = Cli::try_parse_from(["stockpiler"]).unwrap();
    assert_eq!(cli.adhoc_action(), None);
    assert!(!cli.credential_request().from_inventory);
}
