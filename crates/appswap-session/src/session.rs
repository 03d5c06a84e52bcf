use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use appswap_core::{
    ArchiveType, UpdateError, UpdatePhase, UpdateProgress, UpdateResult, UpdateTarget,
    UpdaterConfig,
};
use appswap_installer::{launch_bundle, locate_bundle, replace_bundle, wait_for_exit};

use crate::fetch::Fetcher;

/// Receives phase transitions and progress from a running session. Both the
/// interactive and headless front ends are sinks; neither can influence the
/// pipeline.
pub trait ProgressSink {
    fn report(&mut self, progress: &UpdateProgress);

    fn finish(&mut self, _result: &UpdateResult) {}
}

impl<F> ProgressSink for F
where
    F: FnMut(&UpdateProgress),
{
    fn report(&mut self, progress: &UpdateProgress) {
        self(progress)
    }
}

/// One update attempt: wait, download, extract, install, relaunch. Every
/// phase runs only after the previous one succeeded; the first failure ends
/// the session.
#[derive(Debug)]
pub struct UpdateSession {
    target: UpdateTarget,
    config: UpdaterConfig,
    phase: UpdatePhase,
}

impl UpdateSession {
    pub fn new(target: UpdateTarget, config: UpdaterConfig) -> Self {
        Self {
            target,
            config,
            phase: UpdatePhase::Idle,
        }
    }

    pub fn target(&self) -> &UpdateTarget {
        &self.target
    }

    pub fn run<S>(self, sink: &mut S) -> UpdateResult
    where
        S: ProgressSink + ?Sized,
    {
        let backup_suffix = self.config.backup_suffix.clone();
        let launcher = self.config.launch_command.clone();
        self.run_with_hooks(
            sink,
            |new_bundle, old_bundle| replace_bundle(new_bundle, old_bundle, &backup_suffix),
            |bundle| launch_bundle(bundle, launcher.as_deref()),
        )
    }

    /// Runs the pipeline on a dedicated thread so a presentation surface can
    /// keep redrawing while the pipeline blocks on I/O.
    pub fn spawn<S>(self, mut sink: S) -> std::io::Result<JoinHandle<UpdateResult>>
    where
        S: ProgressSink + Send + 'static,
    {
        thread::Builder::new()
            .name("appswap-session".to_string())
            .spawn(move || self.run(&mut sink))
    }

    /// Same pipeline as [`UpdateSession::run`] with the install swap and the
    /// launch step supplied by the caller.
    pub fn run_with_hooks<S, Swap, Launch>(
        mut self,
        sink: &mut S,
        mut swap: Swap,
        mut launch: Launch,
    ) -> UpdateResult
    where
        S: ProgressSink + ?Sized,
        Swap: FnMut(&Path, &Path) -> Result<(), UpdateError>,
        Launch: FnMut(&Path) -> anyhow::Result<()>,
    {
        let result = match self.execute(sink, &mut swap, &mut launch) {
            Ok(launched) => UpdateResult::Success { launched },
            Err(error) => {
                let phase = self.phase;
                if error.is_unrecoverable() {
                    tracing::error!(phase = phase.as_str(), error = %error, "update failed; install location is inconsistent");
                } else {
                    tracing::warn!(phase = phase.as_str(), error = %error, "update failed");
                }
                self.phase = UpdatePhase::Failed;
                sink.report(&UpdateProgress::new(
                    UpdatePhase::Failed,
                    0.0,
                    format!("Error: {error}"),
                ));
                UpdateResult::Failure { phase, error }
            }
        };
        tracing::debug!(phase = result.final_phase().as_str(), "session finished");
        sink.finish(&result);
        result
    }

    fn execute<S, Swap, Launch>(
        &mut self,
        sink: &mut S,
        swap: &mut Swap,
        launch: &mut Launch,
    ) -> Result<PathBuf, UpdateError>
    where
        S: ProgressSink + ?Sized,
        Swap: FnMut(&Path, &Path) -> Result<(), UpdateError>,
        Launch: FnMut(&Path) -> anyhow::Result<()>,
    {
        if let Some(pid) = self.target.watched_process_id() {
            self.enter(UpdatePhase::WaitingForExit, sink);
            sink.report(&UpdateProgress::new(
                UpdatePhase::WaitingForExit,
                UpdatePhase::WaitingForExit.scale(50.0),
                UpdatePhase::WaitingForExit.label(),
            ));
            let timeout = self.config.wait_timeout();
            if !wait_for_exit(pid, timeout, self.config.poll_interval()) {
                return Err(UpdateError::ProcessTimeout { pid, timeout });
            }
        }

        self.enter(UpdatePhase::Downloading, sink);
        let mut scratch_builder = tempfile::Builder::new();
        scratch_builder.prefix("appswap-");
        // Dropped on every exit path, which removes the download and the extracted tree.
        let scratch = match &self.config.scratch_dir {
            Some(parent) => scratch_builder.tempdir_in(parent),
            None => scratch_builder.tempdir(),
        }
        .map_err(|err| {
            UpdateError::DownloadFailure(format!("failed to create temporary directory: {err}"))
        })?;
        let url = self.target.download_url();
        let archive_type = ArchiveType::infer_from_url(url).unwrap_or(ArchiveType::Zip);
        let archive_path = scratch
            .path()
            .join(format!("update.{}", archive_type.download_extension()));

        let fetcher = Fetcher::new(&self.config)?;
        fetcher.download(url, &archive_path, |percent| {
            sink.report(&UpdateProgress::new(
                UpdatePhase::Downloading,
                UpdatePhase::Downloading.scale(percent),
                UpdatePhase::Downloading.label(),
            ));
        })?;

        self.enter(UpdatePhase::Extracting, sink);
        let extract_to = scratch.path().join("extracted");
        let new_bundle = locate_bundle(&archive_path, &extract_to, &self.config.bundle_suffix)?;
        tracing::debug!(bundle = %new_bundle.display(), "located bundle in archive");

        self.enter(UpdatePhase::Installing, sink);
        let installed = self.target.installed_bundle_path().to_path_buf();
        swap(&new_bundle, &installed)?;

        if let Err(err) = scratch.close() {
            tracing::warn!(error = %err, "failed to remove temporary directory");
        }

        self.enter(UpdatePhase::Launching, sink);
        if let Err(err) = launch(&installed) {
            // The new bundle is installed either way; a missing launch is not a rollback case.
            let reason = format!("{err:#}");
            tracing::warn!(bundle = %installed.display(), error = %reason, "relaunch failed");
        }

        self.phase = UpdatePhase::Complete;
        sink.report(&UpdateProgress::entering(UpdatePhase::Complete));
        tracing::info!(bundle = %installed.display(), "update complete");
        Ok(installed)
    }

    fn enter<S>(&mut self, phase: UpdatePhase, sink: &mut S)
    where
        S: ProgressSink + ?Sized,
    {
        tracing::info!(from = self.phase.as_str(), to = phase.as_str(), "update phase");
        self.phase = phase;
        sink.report(&UpdateProgress::entering(phase));
    }
}
