use std::path::Path;
use std::time::Duration;

use super::*;

#[test]
fn archive_type_infers_from_url_suffix() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/App-2.0.zip"),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/App-2.0.tar.gz?token=abc#frag"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/App-2.0.TGZ"),
        Some(ArchiveType::TarGz)
    );
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/releases/latest"),
        None
    );
}

#[test]
fn archive_type_ignores_suffix_in_query_string() {
    assert_eq!(
        ArchiveType::infer_from_url("https://example.test/download?file=App.zip"),
        None
    );
}

#[test]
fn archive_type_sniffs_magic_bytes() {
    assert_eq!(
        ArchiveType::sniff(&[0x50, 0x4b, 0x03, 0x04, 0x14]),
        Some(ArchiveType::Zip)
    );
    assert_eq!(
        ArchiveType::sniff(&[0x50, 0x4b, 0x05, 0x06]),
        Some(ArchiveType::Zip)
    );
    assert_eq!(ArchiveType::sniff(&[0x1f, 0x8b, 0x08]), Some(ArchiveType::TarGz));
    assert_eq!(ArchiveType::sniff(b"<html>"), None);
    assert_eq!(ArchiveType::sniff(&[]), None);
}

#[test]
fn phase_scale_maps_into_phase_range() {
    assert_eq!(UpdatePhase::Downloading.scale(0.0), 10.0);
    assert_eq!(UpdatePhase::Downloading.scale(50.0), 40.0);
    assert_eq!(UpdatePhase::Downloading.scale(100.0), 70.0);
    assert_eq!(UpdatePhase::Downloading.scale(250.0), 70.0);
    assert_eq!(UpdatePhase::Extracting.scale(0.0), 70.0);
    assert_eq!(UpdatePhase::Launching.scale(100.0), 100.0);
}

#[test]
fn phase_ranges_are_contiguous_and_ordered() {
    let working = [
        UpdatePhase::WaitingForExit,
        UpdatePhase::Downloading,
        UpdatePhase::Extracting,
        UpdatePhase::Installing,
        UpdatePhase::Launching,
    ];
    let mut previous_end = 0.0;
    for phase in working {
        let (start, end) = phase.percent_range();
        assert_eq!(start, previous_end, "gap before {}", phase.as_str());
        assert!(end > start);
        assert!(!phase.is_terminal());
        previous_end = end;
    }
    assert_eq!(previous_end, 100.0);
    assert!(UpdatePhase::Complete.is_terminal());
    assert!(UpdatePhase::Failed.is_terminal());
}

#[test]
fn progress_percent_is_clamped() {
    let progress = UpdateProgress::new(UpdatePhase::Downloading, 140.0, "Downloading update...");
    assert_eq!(progress.percent, 100.0);
    let progress = UpdateProgress::new(UpdatePhase::Downloading, -3.0, "Downloading update...");
    assert_eq!(progress.percent, 0.0);

    let entering = UpdateProgress::entering(UpdatePhase::Installing);
    assert_eq!(entering.percent, 80.0);
    assert_eq!(entering.label, "Installing...");
}

#[test]
fn only_restore_failure_is_unrecoverable() {
    let restore = UpdateError::RestoreFailure {
        target: "/Applications/App.app".into(),
        backup: "/Applications/App.app.backup".into(),
        reason: "permission denied".to_string(),
    };
    assert!(restore.is_unrecoverable());

    let install = UpdateError::InstallFailure {
        target: "/Applications/App.app".into(),
        reason: "permission denied".to_string(),
    };
    assert!(!install.is_unrecoverable());
    assert!(!UpdateError::DownloadFailure("404".to_string()).is_unrecoverable());

    let result = UpdateResult::Failure {
        phase: UpdatePhase::Installing,
        error: restore,
    };
    assert!(result.is_unrecoverable());
    assert!(!result.is_success());
    assert_eq!(result.final_phase(), UpdatePhase::Failed);
}

#[test]
fn process_timeout_message_names_pid() {
    let err = UpdateError::ProcessTimeout {
        pid: 4242,
        timeout: Duration::from_millis(1500),
    };
    assert_eq!(err.to_string(), "process 4242 did not exit within 1.5s");
}

#[test]
fn update_target_accepts_http_urls() {
    let target = UpdateTarget::new(
        " https://example.test/App.zip ",
        "/Applications/App.app",
        Some(12),
    )
    .expect("target should be valid");
    assert_eq!(target.download_url(), "https://example.test/App.zip");
    assert_eq!(
        target.installed_bundle_path(),
        Path::new("/Applications/App.app")
    );
    assert_eq!(target.watched_process_id(), Some(12));
}

#[test]
fn update_target_rejects_bad_urls() {
    for url in ["", "example.test/App.zip", "ftp://example.test/App.zip", "https://"] {
        let err = UpdateTarget::new(url, "/Applications/App.app", None)
            .expect_err("url should be rejected");
        assert!(err.to_string().contains("download url"), "{url}: {err}");
    }
}

#[test]
fn update_target_rejects_path_without_bundle_name() {
    let err = UpdateTarget::new("https://example.test/App.zip", "/", None)
        .expect_err("root path should be rejected");
    assert!(err.to_string().contains("must name a bundle"));
}

#[test]
fn config_defaults_match_updater_behaviour() {
    let config = UpdaterConfig::default();
    assert_eq!(config.wait_timeout(), Duration::from_secs(30));
    assert_eq!(config.poll_interval(), Duration::from_millis(500));
    assert_eq!(config.bundle_suffix, "app");
    assert_eq!(config.backup_suffix, "backup");
    assert!(config.user_agent.starts_with("appswap/"));
    assert!(config.launch_command.is_none());
    assert!(config.scratch_dir.is_none());
}

#[test]
fn parse_config_overrides_and_normalizes_suffixes() {
    let content = r#"
wait_timeout_secs = 5
poll_interval_ms = 100
bundle_suffix = ".bundle"
launch_command = ["/usr/bin/env", "launcher"]
scratch_dir = "/var/tmp/appswap"
"#;

    let config = UpdaterConfig::from_toml_str(content).expect("config should parse");
    assert_eq!(config.wait_timeout_secs, 5);
    assert_eq!(config.poll_interval_ms, 100);
    assert_eq!(config.bundle_suffix, "bundle");
    assert_eq!(config.backup_suffix, "backup");
    assert_eq!(
        config.launch_command,
        Some(vec!["/usr/bin/env".to_string(), "launcher".to_string()])
    );
    assert_eq!(config.scratch_dir.as_deref(), Some(Path::new("/var/tmp/appswap")));
}

#[test]
fn parse_config_rejects_invalid_values() {
    let cases = [
        ("bundle_suffix = \"\"", "bundle_suffix must not be empty"),
        ("poll_interval_ms = 0", "poll_interval_ms must be greater than zero"),
        ("backup_suffix = \"APP\"", "backup_suffix must differ"),
        ("launch_command = []", "launch_command must name a program"),
    ];
    for (content, expected) in cases {
        let err = UpdaterConfig::from_toml_str(content).expect_err("config should be rejected");
        assert!(
            format!("{err:#}").contains(expected),
            "unexpected error for {content}: {err:#}"
        );
    }
}

#[test]
fn parse_config_rejects_unknown_keys() {
    let err = UpdaterConfig::from_toml_str("channel = \"beta\"")
        .expect_err("unknown key should be rejected");
    assert!(format!("{err:#}").contains("failed to parse appswap config"));
}

#[test]
fn with_bundle_suffix_revalidates() {
    let config = UpdaterConfig::default()
        .with_bundle_suffix(".bundle")
        .expect("suffix should be accepted");
    assert_eq!(config.bundle_suffix, "bundle");

    let err = UpdaterConfig::default()
        .with_bundle_suffix("backup")
        .expect_err("suffix colliding with backup suffix should be rejected");
    assert!(err.to_string().contains("backup_suffix must differ"));
}
