use std::thread;
use std::time::{Duration, Instant};

/// Liveness probe that never delivers a signal to the target.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    // pid 0 and values past pid_t would address process groups, not one process.
    let pid: libc::pid_t = match pid.try_into() {
        Ok(0) | Err(_) => return false,
        Ok(pid) => pid,
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
pub fn is_process_running(pid: u32) -> bool {
    let output = std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/FO", "CSV", "/NH"])
        .output();
    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&format!("\"{pid}\"")),
        Err(err) => {
            tracing::warn!(pid, error = %err, "tasklist probe failed; treating process as exited");
            false
        }
    }
}

#[cfg(not(any(unix, windows)))]
pub fn is_process_running(_pid: u32) -> bool {
    false
}

/// Polls until `pid` is gone. Returns `false` once `timeout` elapses with the
/// process still present.
pub fn wait_for_exit(pid: u32, timeout: Duration, poll_interval: Duration) -> bool {
    wait_for_exit_with_probe(pid, timeout, poll_interval, is_process_running)
}

pub fn wait_for_exit_with_probe<Probe>(
    pid: u32,
    timeout: Duration,
    poll_interval: Duration,
    mut probe: Probe,
) -> bool
where
    Probe: FnMut(u32) -> bool,
{
    let started_at = Instant::now();
    let mut probes = 0_u32;
    loop {
        probes += 1;
        if !probe(pid) {
            tracing::debug!(pid, probes, "watched process has exited");
            return true;
        }

        let elapsed = started_at.elapsed();
        if elapsed >= timeout {
            tracing::warn!(pid, probes, ?timeout, "watched process is still running");
            return false;
        }
        thread::sleep(poll_interval.min(timeout - elapsed));
    }
}
