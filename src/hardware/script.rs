//! Out-of-process helpers (PowerShell, wmic) with a hard timeout
//!
//! Every call either returns trimmed stdout or a [`ScriptError`]; a child
//! that outlives its budget is killed.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;
#[cfg(target_os = "windows")]
use windows_sys::Win32::System::Threading::CREATE_NO_WINDOW;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// External process failures
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}")]
    Failed { program: String, status: String },

    #[error("{program} produced no output")]
    EmptyOutput { program: String },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs helper programs with a per-call time budget.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    timeout: Duration,
}

impl ScriptRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a PowerShell snippet non-interactively.
    pub fn powershell(&self, script: &str) -> Result<String, ScriptError> {
        self.run(
            "powershell",
            &["-NoProfile", "-NonInteractive", "-Command", script],
        )
    }

    /// Run `wmic` with the given arguments.
    pub fn wmic(&self, args: &[&str]) -> Result<String, ScriptError> {
        self.run("wmic", args)
    }

    /// Spawn `program`, wait at most the configured timeout and return stdout.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<String, ScriptError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd.spawn().map_err(|source| ScriptError::Spawn {
            program: program.to_string(),
            source,
        })?;

        // Drain stdout on the side so a chatty child can't block on a full pipe.
        let stdout = child.stdout.take();
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout {
                let _ = out.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    abandon(&mut child);
                    return Err(ScriptError::Timeout {
                        program: program.to_string(),
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => {
                    abandon(&mut child);
                    return Err(ScriptError::Wait {
                        program: program.to_string(),
                        source,
                    });
                }
            }
        };

        if !status.success() {
            return Err(ScriptError::Failed {
                program: program.to_string(),
                status: status.to_string(),
            });
        }

        let bytes = reader.join().unwrap_or_default();
        let text = String::from_utf8_lossy(&bytes).trim().to_string();
        if text.is_empty() {
            return Err(ScriptError::EmptyOutput {
                program: program.to_string(),
            });
        }

        Ok(text)
    }
}

/// Kill a child we gave up on and reap it.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
