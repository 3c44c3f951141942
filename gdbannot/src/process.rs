//! Process management for gdb
//!
//! Spawns gdb in annotation mode with piped stdio and delivers Ctrl-C to it
//! the way each platform expects.

use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to start GDB process: {0}")]
    StartError(#[from] std::io::Error),
    #[error("Process terminated unexpectedly")]
    Terminated,
    #[error("Signal error: {0}")]
    SignalError(String),
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// Command line gdb is started with, without the executable
pub fn gdb_arguments(program: Option<&str>, program_args: &[String]) -> Vec<String> {
    let mut args = vec!["--annotate=3".to_string(), "--quiet".to_string()];

    if let Some(program) = program {
        if !program_args.is_empty() {
            args.push("--args".to_string());
        }
        args.push(program.to_string());
        args.extend(program_args.iter().cloned());
    }

    args
}

pub struct GdbProcess {
    child: Child,
}

impl GdbProcess {
    /// Start gdb with level 3 annotations, optionally loading `program`
    pub async fn start(gdb_path: &str, program: Option<&str>, program_args: &[String]) -> Result<Self> {
        let args = gdb_arguments(program, program_args);
        log::debug!("Starting GDB process: {} {}", gdb_path, args.join(" "));

        let child = Command::new(gdb_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        log::debug!("GDB process started with PID: {:?}", child.id());

        Ok(GdbProcess { child })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Interrupt the debuggee by sending Ctrl-C to gdb
    pub fn interrupt(&mut self) -> Result<()> {
        if let Some(pid) = self.id() {
            log::debug!("Sending interrupt to GDB PID: {}", pid);
            self.send_interrupt_signal(pid)
        } else {
            Err(ProcessError::Terminated)
        }
    }

    /// Wait for gdb to exit
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        Ok(self.child.wait().await?)
    }

    pub async fn kill(&mut self) -> Result<()> {
        Ok(self.child.kill().await?)
    }

    #[cfg(windows)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        unsafe {
            use winapi::um::wincon::{GenerateConsoleCtrlEvent, CTRL_C_EVENT};

            let result = GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid);
            if result == 0 {
                log::error!("GenerateConsoleCtrlEvent failed for PID {}", pid);
                Err(ProcessError::SignalError("Failed to send Ctrl+C event".into()))
            } else {
                Ok(())
            }
        }
    }

    #[cfg(unix)]
    fn send_interrupt_signal(&self, pid: u32) -> Result<()> {
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
        if result != 0 {
            log::error!("Failed to send SIGINT to PID {}", pid);
            Err(ProcessError::SignalError(
                std::io::Error::last_os_error().to_string(),
            ))
        } else {
            Ok(())
        }
    }

    #[cfg(not(any(windows, unix)))]
    fn send_interrupt_signal(&self, _pid: u32) -> Result<()> {
        Err(ProcessError::SignalError("Interrupt not supported on this platform".into()))
    }
}

/// Keep our own console handler from killing us when Ctrl-C is forwarded to gdb
#[cfg(windows)]
pub fn install_signal_protection() {
    unsafe {
        use winapi::shared::minwindef::{BOOL, DWORD, TRUE};
        use winapi::um::consoleapi::SetConsoleCtrlHandler;

        unsafe extern "system" fn ctrl_handler(ctrl_type: DWORD) -> BOOL {
            use winapi::um::wincon::{CTRL_BREAK_EVENT, CTRL_C_EVENT};

            match ctrl_type {
                CTRL_C_EVENT | CTRL_BREAK_EVENT => TRUE,
                _ => 0,
            }
        }

        if SetConsoleCtrlHandler(Some(ctrl_handler), TRUE) == 0 {
            log::warn!("Failed to install custom Ctrl+C handler");
        }
    }
}

#[cfg(not(windows))]
pub fn install_signal_protection() {
    log::debug!("Signal protection not required on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_without_program() {
        assert_eq!(gdb_arguments(None, &[]), vec!["--annotate=3", "--quiet"]);
    }

    #[test]
    fn test_program_arguments_use_args_flag() {
        let args = gdb_arguments(Some("./a.out"), &["-v".to_string(), "input".to_string()]);
        assert_eq!(args, vec!["--annotate=3", "--quiet", "--args", "./a.out", "-v", "input"]);
    }

    #[test]
    fn test_program_alone() {
        let args = gdb_arguments(Some("./a.out"), &[]);
        assert_eq!(args, vec!["--annotate=3", "--quiet", "./a.out"]);
    }
}
