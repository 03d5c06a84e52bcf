mod render;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use appswap_core::{UpdateResult, UpdateTarget, UpdaterConfig};
use appswap_session::UpdateSession;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::render::{
    current_output_style, stdout_is_interactive, HeadlessRenderer, InteractiveRenderer,
};

const CONFIG_ENV: &str = "APPSWAP_CONFIG";

const EXIT_FAILURE: u8 = 1;
const EXIT_RESTORE_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "appswap", version)]
#[command(
    about = "Replace an installed application bundle with a downloaded release",
    long_about = None
)]
struct Cli {
    /// Release archive to download (zip or tar.gz).
    download_url: String,
    /// Installed bundle to replace, e.g. /Applications/App.app.
    app_path: PathBuf,
    /// Wait for this process to exit before touching the bundle.
    #[arg(long, value_name = "PID")]
    main_pid: Option<u32>,
    /// Print plain status lines instead of the progress display.
    #[arg(long)]
    cli: bool,
    /// TOML config file. Falls back to $APPSWAP_CONFIG.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Seconds to wait for --main-pid to exit.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
    /// Suffix identifying the bundle inside the archive.
    #[arg(long, value_name = "SUFFIX")]
    bundle_suffix: Option<String>,
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(result) => ExitCode::from(exit_code_for(&result)),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<UpdateResult> {
    let config = load_config(cli.config.as_deref(), std::env::var_os(CONFIG_ENV))?;
    let config = apply_overrides(config, cli.timeout, cli.bundle_suffix.as_deref())?;
    tracing::debug!(?config, "resolved configuration");

    let target = UpdateTarget::new(cli.download_url, cli.app_path, cli.main_pid)?;
    let session = UpdateSession::new(target, config);

    let handle = if cli.cli || !stdout_is_interactive() {
        session.spawn(HeadlessRenderer::new(io::stdout()))
    } else {
        session.spawn(InteractiveRenderer::new(current_output_style()))
    }
    .context("failed to start update thread")?;

    handle
        .join()
        .map_err(|_| anyhow!("update thread panicked"))
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Defaults, then the file named by `--config` or `$APPSWAP_CONFIG`.
fn load_config(explicit: Option<&Path>, from_env: Option<OsString>) -> Result<UpdaterConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => from_env
            .filter(|value| !value.is_empty())
            .map(PathBuf::from),
    };

    match path {
        Some(path) => UpdaterConfig::load(&path),
        None => Ok(UpdaterConfig::default()),
    }
}

fn apply_overrides(
    mut config: UpdaterConfig,
    timeout: Option<u64>,
    bundle_suffix: Option<&str>,
) -> Result<UpdaterConfig> {
    if let Some(secs) = timeout {
        config.wait_timeout_secs = secs;
    }
    if let Some(suffix) = bundle_suffix {
        config = config
            .with_bundle_suffix(suffix)
            .context("invalid --bundle-suffix")?;
    }
    Ok(config)
}

fn exit_code_for(result: &UpdateResult) -> u8 {
    if result.is_success() {
        0
    } else if result.is_unrecoverable() {
        EXIT_RESTORE_FAILURE
    } else {
        EXIT_FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appswap_core::{UpdateError, UpdatePhase};
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn write_temp_config(contents: &str) -> PathBuf {
        let sequence = TEST_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "appswap-cli-config-{}-{}.toml",
            std::process::id(),
            sequence
        ));
        fs::write(&path, contents).expect("must write config");
        path
    }

    #[test]
    fn parses_positional_arguments_and_flags() {
        let cli = Cli::try_parse_from([
            "appswap",
            "https://example.test/App.zip",
            "/Applications/App.app",
            "--main-pid",
            "4242",
            "--cli",
            "--timeout",
            "5",
        ])
        .expect("arguments must parse");

        assert_eq!(cli.download_url, "https://example.test/App.zip");
        assert_eq!(cli.app_path, PathBuf::from("/Applications/App.app"));
        assert_eq!(cli.main_pid, Some(4242));
        assert!(cli.cli);
        assert_eq!(cli.timeout, Some(5));
        assert!(!cli.verbose);
    }

    #[test]
    fn rejects_missing_app_path() {
        assert!(Cli::try_parse_from(["appswap", "https://example.test/App.zip"]).is_err());
    }

    #[test]
    fn rejects_non_numeric_pid() {
        assert!(Cli::try_parse_from([
            "appswap",
            "https://example.test/App.zip",
            "/Applications/App.app",
            "--main-pid",
            "abc",
        ])
        .is_err());
    }

    #[test]
    fn config_defaults_without_file() {
        let config = load_config(None, None).expect("defaults must load");
        assert_eq!(config, UpdaterConfig::default());
    }

    #[test]
    fn config_explicit_path_wins_over_environment() {
        let explicit = write_temp_config("wait_timeout_secs = 12\n");
        let from_env = write_temp_config("wait_timeout_secs = 99\n");

        let config = load_config(Some(explicit.as_path()), Some(from_env.clone().into_os_string()))
            .expect("config must load");
        assert_eq!(config.wait_timeout_secs, 12);

        let config =
            load_config(None, Some(from_env.clone().into_os_string())).expect("config must load");
        assert_eq!(config.wait_timeout_secs, 99);

        let _ = fs::remove_file(explicit);
        let _ = fs::remove_file(from_env);
    }

    #[test]
    fn config_ignores_empty_environment_value() {
        let config = load_config(None, Some(OsString::new())).expect("defaults must load");
        assert_eq!(config, UpdaterConfig::default());
    }

    #[test]
    fn config_missing_file_is_an_error() {
        let missing = std::env::temp_dir().join("appswap-cli-config-does-not-exist.toml");
        let err = load_config(Some(missing.as_path()), None).expect_err("missing file must fail");
        assert!(err.to_string().contains("failed to read config"), "{err}");
    }

    #[test]
    fn flags_override_file_values() {
        let path = write_temp_config("wait_timeout_secs = 12\nbundle_suffix = \"app\"\n");
        let config = load_config(Some(path.as_path()), None).expect("config must load");
        let config =
            apply_overrides(config, Some(3), Some(".bundle")).expect("overrides must apply");

        assert_eq!(config.wait_timeout_secs, 3);
        assert_eq!(config.bundle_suffix, "bundle");

        let _ = fs::remove_file(path);
    }

    #[test]
    fn bundle_suffix_override_is_validated() {
        let err = apply_overrides(UpdaterConfig::default(), None, Some("backup"))
            .expect_err("suffix equal to backup suffix must fail");
        assert!(err.to_string().contains("--bundle-suffix"), "{err}");
    }

    #[test]
    fn exit_codes_distinguish_restore_failure() {
        let success = UpdateResult::Success {
            launched: PathBuf::from("/Applications/App.app"),
        };
        let failure = UpdateResult::Failure {
            phase: UpdatePhase::Downloading,
            error: UpdateError::DownloadFailure("timed out".to_string()),
        };
        let restore = UpdateResult::Failure {
            phase: UpdatePhase::Installing,
            error: UpdateError::RestoreFailure {
                target: PathBuf::from("/Applications/App.app"),
                backup: PathBuf::from("/Applications/App.app.backup"),
                reason: "disk full".to_string(),
            },
        };

        assert_eq!(exit_code_for(&success), 0);
        assert_eq!(exit_code_for(&failure), 1);
        assert_eq!(exit_code_for(&restore), 2);
    }
}
