//! Process Controller
//!
//! Drives `save? -> close -> unlock -> patch -> reopen` for a file held by a
//! host application. The workflow stops at the first failing step and
//! reports exactly that step.

use super::{HostPlatform, PlatformError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStep {
    Save,
    Close,
    Unlock,
    Patch,
    Reopen,
}

/// Outcome of one workflow run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub success: bool,
    pub failed_step: Option<WorkflowStep>,
    pub message: String,
    pub completed_steps: Vec<WorkflowStep>,
    pub elapsed_ms: u64,
}

/// Timeouts and poll cadences
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub save_wait: Duration,
    pub close_timeout: Duration,
    pub close_poll: Duration,
    pub unlock_timeout: Duration,
    pub unlock_poll: Duration,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            save_wait: Duration::from_secs(3),
            close_timeout: Duration::from_secs(15),
            close_poll: Duration::from_millis(250),
            unlock_timeout: Duration::from_secs(30),
            unlock_poll: Duration::from_millis(500),
        }
    }
}

/// Per-run choices
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOptions {
    #[serde(default)]
    pub save_first: bool,
    #[serde(default)]
    pub skip_reopen: bool,
}

/// Running state of one workflow
struct Progress {
    started: Instant,
    completed: Vec<WorkflowStep>,
}

impl Progress {
    fn fail(self, step: WorkflowStep, message: String) -> WorkflowResult {
        warn!(step = ?step, "Process workflow failed: {}", message);
        WorkflowResult {
            success: false,
            failed_step: Some(step),
            message,
            completed_steps: self.completed,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

pub struct ProcessController {
    platform: Arc<dyn HostPlatform>,
    options: ProcessOptions,
}

impl ProcessController {
    pub fn new(platform: Arc<dyn HostPlatform>, options: ProcessOptions) -> Self {
        Self { platform, options }
    }

    async fn blocking<T, F>(&self, call: F) -> Result<T, PlatformError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HostPlatform) -> Result<T, PlatformError> + Send + 'static,
    {
        let platform = self.platform.clone();
        tokio::task::spawn_blocking(move || call(platform.as_ref()))
            .await
            .map_err(|e| PlatformError::Join(e.to_string()))?
    }

    async fn is_running(&self, pid: u32) -> bool {
        self.blocking(move |p| Ok(p.is_running(pid))).await.unwrap_or(false)
    }

    /// Close the host holding `path`, patch it, reopen it.
    ///
    /// `pid` is the host process; `None` when nothing holds the file open.
    pub async fn run_workflow<F>(
        &self,
        pid: Option<u32>,
        path: &Path,
        options: WorkflowOptions,
        patch: F,
    ) -> WorkflowResult
    where
        F: FnOnce(&Path) -> anyhow::Result<()> + Send + 'static,
    {
        let mut progress = Progress {
            started: Instant::now(),
            completed: Vec::new(),
        };
        info!(pid = ?pid, path = %path.display(), "Starting process workflow");

        let running_pid = match pid {
            Some(pid) if self.is_running(pid).await => Some(pid),
            Some(pid) => {
                debug!("Host process {} is not running", pid);
                None
            }
            None => None,
        };

        if let Some(pid) = running_pid {
            if options.save_first {
                if let Err(e) = self.save(pid).await {
                    return progress.fail(WorkflowStep::Save, e.to_string());
                }
                progress.completed.push(WorkflowStep::Save);
            }

            if let Err(message) = self.close(pid).await {
                return progress.fail(WorkflowStep::Close, message);
            }
            progress.completed.push(WorkflowStep::Close);
        }

        if let Err(message) = self.wait_for_unlock(path).await {
            return progress.fail(WorkflowStep::Unlock, message);
        }
        progress.completed.push(WorkflowStep::Unlock);

        let target = path.to_path_buf();
        match tokio::task::spawn_blocking(move || patch(&target)).await {
            Ok(Ok(())) => progress.completed.push(WorkflowStep::Patch),
            Ok(Err(e)) => return progress.fail(WorkflowStep::Patch, format!("{:#}", e)),
            Err(e) => return progress.fail(WorkflowStep::Patch, e.to_string()),
        }

        if !options.skip_reopen {
            let reopen: PathBuf = path.to_path_buf();
            if let Err(e) = self.blocking(move |p| p.open_with_default_app(&reopen)).await {
                return progress.fail(WorkflowStep::Reopen, e.to_string());
            }
            progress.completed.push(WorkflowStep::Reopen);
        }

        let elapsed_ms = progress.started.elapsed().as_millis() as u64;
        info!(elapsed_ms, "Process workflow complete");
        WorkflowResult {
            success: true,
            failed_step: None,
            message: format!("Patched {}", path.display()),
            completed_steps: progress.completed,
            elapsed_ms,
        }
    }

    async fn save(&self, pid: u32) -> Result<(), PlatformError> {
        self.blocking(move |p| {
            p.focus_main_window(pid)?;
            p.send_save(pid)
        })
        .await?;
        tokio::time::sleep(self.options.save_wait).await;
        Ok(())
    }

    async fn close(&self, pid: u32) -> Result<(), String> {
        self.blocking(move |p| p.request_close(pid))
            .await
            .map_err(|e| e.to_string())?;

        let deadline = Instant::now() + self.options.close_timeout;
        while Instant::now() < deadline {
            if !self.is_running(pid).await {
                debug!("Host process {} exited", pid);
                return Ok(());
            }
            tokio::time::sleep(self.options.close_poll).await;
        }
        Err(format!(
            "Process {} did not exit within {:?}; it may be waiting on an unsaved-changes prompt. \
             Force-terminate to close it and discard unsaved changes.",
            pid, self.options.close_timeout
        ))
    }

    async fn wait_for_unlock(&self, path: &Path) -> Result<(), String> {
        let deadline = Instant::now() + self.options.unlock_timeout;
        loop {
            let candidate = path.to_path_buf();
            match self.blocking(move |p| p.try_exclusive_open(&candidate)).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(e.to_string()),
            }
            if Instant::now() >= deadline {
                return Err(format!(
                    "{} is still locked after {:?}",
                    path.display(),
                    self.options.unlock_timeout
                ));
            }
            tokio::time::sleep(self.options.unlock_poll).await;
        }
    }

    /// Kill the host process outright. Unsaved work in the host is lost.
    pub async fn force_terminate(&self, pid: u32) -> Result<(), PlatformError> {
        warn!(pid, "Force-terminating host process; unsaved changes will be lost");
        self.blocking(move |p| p.kill(pid)).await?;

        let deadline = Instant::now() + self.options.close_timeout;
        while Instant::now() < deadline {
            if !self.is_running(pid).await {
                return Ok(());
            }
            tokio::time::sleep(self.options.close_poll).await;
        }
        Err(PlatformError::Command {
            program: "kill".to_string(),
            message: format!("process {} is still running", pid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scriptable host application
    #[derive(Default)]
    struct FakeHost {
        running: AtomicBool,
        ignores_close: bool,
        locked: AtomicBool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl HostPlatform for FakeHost {
        fn is_running(&self, _pid: u32) -> bool {
            self.running.load(Ordering::SeqCst)
        }
        fn focus_main_window(&self, _pid: u32) -> Result<(), PlatformError> {
            self.record("focus");
            Ok(())
        }
        fn send_save(&self, _pid: u32) -> Result<(), PlatformError> {
            self.record("save");
            Ok(())
        }
        fn request_close(&self, _pid: u32) -> Result<(), PlatformError> {
            self.record("close");
            if !self.ignores_close {
                self.running.store(false, Ordering::SeqCst);
                self.locked.store(false, Ordering::SeqCst);
            }
            Ok(())
        }
        fn kill(&self, _pid: u32) -> Result<(), PlatformError> {
            self.record("kill");
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
        fn open_with_default_app(&self, _path: &Path) -> Result<(), PlatformError> {
            self.record("open");
            Ok(())
        }
        fn try_exclusive_open(&self, _path: &Path) -> Result<bool, PlatformError> {
            Ok(!self.locked.load(Ordering::SeqCst))
        }
    }

    fn fast_options() -> ProcessOptions {
        ProcessOptions {
            save_wait: Duration::from_millis(1),
            close_timeout: Duration::from_millis(200),
            close_poll: Duration::from_millis(10),
            unlock_timeout: Duration::from_millis(200),
            unlock_poll: Duration::from_millis(10),
        }
    }

    fn host(running: bool, locked: bool, ignores_close: bool) -> Arc<FakeHost> {
        Arc::new(FakeHost {
            running: AtomicBool::new(running),
            locked: AtomicBool::new(locked),
            ignores_close,
            ..FakeHost::default()
        })
    }

    #[tokio::test]
    async fn test_full_workflow_patches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("definition.pbir");
        std::fs::write(&path, b"old").unwrap();

        let fake = host(true, true, false);
        let controller = ProcessController::new(fake.clone(), fast_options());
        let options = WorkflowOptions {
            save_first: true,
            skip_reopen: false,
        };
        let result = controller
            .run_workflow(Some(42), &path, options, |p| Ok(std::fs::write(p, b"new")?))
            .await;

        assert!(result.success, "{}", result.message);
        assert_eq!(
            result.completed_steps,
            vec![
                WorkflowStep::Save,
                WorkflowStep::Close,
                WorkflowStep::Unlock,
                WorkflowStep::Patch,
                WorkflowStep::Reopen
            ]
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert_eq!(fake.calls(), vec!["focus", "save", "close", "open"]);
    }

    #[tokio::test]
    async fn test_host_that_never_exits_fails_at_close() {
        let fake = host(true, true, true);
        let controller = ProcessController::new(fake.clone(), fast_options());
        let patched = Arc::new(AtomicBool::new(false));
        let flag = patched.clone();

        let result = controller
            .run_workflow(Some(42), Path::new("locked.pbir"), WorkflowOptions::default(), move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(!result.success);
        assert_eq!(result.failed_step, Some(WorkflowStep::Close));
        assert!(result.completed_steps.is_empty());
        assert!(!patched.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_lingering_lock_fails_at_unlock() {
        let fake = host(false, true, false);
        let controller = ProcessController::new(fake, fast_options());

        let result = controller
            .run_workflow(None, Path::new("held.pbir"), WorkflowOptions::default(), |_| Ok(()))
            .await;

        assert_eq!(result.failed_step, Some(WorkflowStep::Unlock));
    }

    #[tokio::test]
    async fn test_patch_error_aborts_with_its_message() {
        let fake = host(false, false, false);
        let controller = ProcessController::new(fake.clone(), fast_options());

        let result = controller
            .run_workflow(None, Path::new("free.pbir"), WorkflowOptions::default(), |_| {
                Err(anyhow::anyhow!("datasetReference is missing"))
            })
            .await;

        assert_eq!(result.failed_step, Some(WorkflowStep::Patch));
        assert!(result.message.contains("datasetReference is missing"));
        assert_eq!(result.completed_steps, vec![WorkflowStep::Unlock]);
        assert!(!fake.calls().contains(&"open".to_string()));
    }

    #[tokio::test]
    async fn test_force_terminate_kills() {
        let fake = host(true, true, true);
        let controller = ProcessController::new(fake.clone(), fast_options());

        controller.force_terminate(42).await.unwrap();
        assert_eq!(fake.calls(), vec!["kill"]);
        assert!(!fake.running.load(Ordering::SeqCst));
    }
}
