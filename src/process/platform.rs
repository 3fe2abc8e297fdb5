//! OS bindings for the host application.
//!
//! Every call is short and blocking; the controller runs them on the
//! blocking pool.

use super::PlatformError;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::{Command, Output};
use tracing::debug;

pub trait HostPlatform: Send + Sync {
    fn is_running(&self, pid: u32) -> bool;

    /// Bring the process' main window to the foreground
    fn focus_main_window(&self, pid: u32) -> Result<(), PlatformError>;

    /// Dispatch the save keystroke to the focused window
    fn send_save(&self, pid: u32) -> Result<(), PlatformError>;

    /// Ask the main window to close, as a user would
    fn request_close(&self, pid: u32) -> Result<(), PlatformError>;

    /// Terminate without giving the process a chance to save
    fn kill(&self, pid: u32) -> Result<(), PlatformError>;

    fn open_with_default_app(&self, path: &Path) -> Result<(), PlatformError>;

    /// `Ok(true)` when nothing else holds the file
    fn try_exclusive_open(&self, path: &Path) -> Result<bool, PlatformError>;
}

/// Input-injection mechanism tried in order for the save keystroke
struct Injector {
    program: &'static str,
    args: &'static [&'static str],
}

#[cfg(windows)]
const SAVE_INJECTORS: &[Injector] = &[
    Injector {
        program: "powershell",
        args: &["-NoProfile", "-Command", "(New-Object -ComObject WScript.Shell).SendKeys('^s')"],
    },
    Injector {
        program: "powershell",
        args: &[
            "-NoProfile",
            "-Command",
            "Add-Type -AssemblyName System.Windows.Forms; [System.Windows.Forms.SendKeys]::SendWait('^s')",
        ],
    },
];

#[cfg(target_os = "macos")]
const SAVE_INJECTORS: &[Injector] = &[Injector {
    program: "osascript",
    args: &["-e", "tell application \"System Events\" to keystroke \"s\" using command down"],
}];

#[cfg(all(unix, not(target_os = "macos")))]
const SAVE_INJECTORS: &[Injector] = &[
    Injector {
        program: "xdotool",
        args: &["key", "ctrl+s"],
    },
    Injector {
        program: "ydotool",
        args: &["key", "29:1", "31:1", "31:0", "29:0"],
    },
];

#[cfg(not(any(windows, unix)))]
const SAVE_INJECTORS: &[Injector] = &[];

fn run(program: &str, args: &[&str]) -> Result<Output, PlatformError> {
    debug!("Running {} {:?}", program, args);
    Command::new(program).args(args).output().map_err(|e| PlatformError::Command {
        program: program.to_string(),
        message: e.to_string(),
    })
}

fn run_ok(program: &str, args: &[&str]) -> Result<(), PlatformError> {
    let output = run(program, args)?;
    if output.status.success() {
        Ok(())
    } else {
        Err(PlatformError::Command {
            program: program.to_string(),
            message: format!(
                "exit {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        })
    }
}

/// The machine this server runs on
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl HostPlatform for SystemPlatform {
    fn is_running(&self, pid: u32) -> bool {
        let pid = pid.to_string();
        if cfg!(windows) {
            run("tasklist", &["/FI", &format!("PID eq {}", pid), "/NH"])
                .map(|o| String::from_utf8_lossy(&o.stdout).contains(&pid))
                .unwrap_or(false)
        } else {
            run("kill", &["-0", &pid]).map(|o| o.status.success()).unwrap_or(false)
        }
    }

    fn focus_main_window(&self, pid: u32) -> Result<(), PlatformError> {
        let pid = pid.to_string();
        if cfg!(windows) {
            let script = format!("(New-Object -ComObject WScript.Shell).AppActivate({})", pid);
            run_ok("powershell", &["-NoProfile", "-Command", &script])
        } else if cfg!(target_os = "macos") {
            let script = format!(
                "tell application \"System Events\" to set frontmost of (first process whose unix id is {}) to true",
                pid
            );
            run_ok("osascript", &["-e", &script])
        } else {
            run_ok("xdotool", &["search", "--pid", &pid, "windowactivate"])
        }
    }

    fn send_save(&self, pid: u32) -> Result<(), PlatformError> {
        let mut failures = Vec::new();
        for injector in SAVE_INJECTORS {
            match run_ok(injector.program, injector.args) {
                Ok(()) => {
                    debug!("Save keystroke sent to {} via {}", pid, injector.program);
                    return Ok(());
                }
                Err(e) => failures.push(e.to_string()),
            }
        }
        Err(PlatformError::NoInjector(failures.join("; ")))
    }

    fn request_close(&self, pid: u32) -> Result<(), PlatformError> {
        let pid = pid.to_string();
        if cfg!(windows) {
            run_ok("taskkill", &["/PID", &pid])
        } else {
            run_ok("kill", &["-TERM", &pid])
        }
    }

    fn kill(&self, pid: u32) -> Result<(), PlatformError> {
        let pid = pid.to_string();
        if cfg!(windows) {
            run_ok("taskkill", &["/F", "/PID", &pid])
        } else {
            run_ok("kill", &["-KILL", &pid])
        }
    }

    fn open_with_default_app(&self, path: &Path) -> Result<(), PlatformError> {
        let path = path.to_string_lossy();
        if cfg!(windows) {
            run_ok("cmd", &["/C", "start", "", &path])
        } else if cfg!(target_os = "macos") {
            run_ok("open", &[&path])
        } else {
            run_ok("xdg-open", &[&path])
        }
    }

    fn try_exclusive_open(&self, path: &Path) -> Result<bool, PlatformError> {
        let mut options = OpenOptions::new();
        options.read(true).write(true);
        #[cfg(windows)]
        {
            use std::os::windows::fs::OpenOptionsExt;
            options.share_mode(0);
        }
        match options.open(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PlatformError::Io(e)),
            Err(e) => {
                debug!("{} is still locked: {}", path.display(), e);
                Ok(false)
            }
        }
    }
}
