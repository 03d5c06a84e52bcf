use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Builds the command that opens `bundle_path`. `launcher` overrides the
/// platform opener; the bundle path is always the final argument.
pub fn build_launch_command(bundle_path: &Path, launcher: Option<&[String]>) -> Command {
    if let Some((program, args)) = launcher.and_then(|parts| parts.split_first()) {
        let mut command = Command::new(program);
        command.args(args).arg(bundle_path);
        return command;
    }

    if is_executable_file(bundle_path) {
        return Command::new(bundle_path);
    }

    platform_open_command(bundle_path)
}

#[cfg(target_os = "macos")]
fn platform_open_command(bundle_path: &Path) -> Command {
    let mut command = Command::new("open");
    command.arg(bundle_path);
    command
}

#[cfg(windows)]
fn platform_open_command(bundle_path: &Path) -> Command {
    let mut command = Command::new("cmd");
    command.args(["/C", "start", ""]).arg(bundle_path);
    command
}

#[cfg(not(any(target_os = "macos", windows)))]
fn platform_open_command(bundle_path: &Path) -> Command {
    let mut command = Command::new("xdg-open");
    command.arg(bundle_path);
    command
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
}

/// Starts the bundle as an independent process that outlives the updater.
/// The child is never waited on; only a failure to spawn is reported.
pub fn launch_bundle(bundle_path: &Path, launcher: Option<&[String]>) -> Result<()> {
    let mut command = build_launch_command(bundle_path, launcher);
    detach(&mut command);
    tracing::debug!(command = ?command, "launching bundle");
    let child = command
        .spawn()
        .with_context(|| format!("failed to launch {}", bundle_path.display()))?;
    tracing::info!(pid = child.id(), bundle = %bundle_path.display(), "launched bundle");
    Ok(())
}

fn detach(command: &mut Command) {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
    }
}
