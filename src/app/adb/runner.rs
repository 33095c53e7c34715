use std::io::Read;
use std::process::{ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::app::error::AppError;

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub raw_stdout: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        Self {
            raw_stdout: stdout.as_bytes().to_vec(),
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Command channel to one connected device.
///
/// Implementations must honour `timeout` and report expiry as an
/// `ERR_TIMEOUT` error instead of blocking past it.
pub trait DeviceShell {
    fn trace_id(&self) -> &str;

    /// Runs `adb <args>` against the device.
    fn adb(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, AppError>;

    /// Runs `adb shell <command...>`.
    fn shell(&self, command: &[&str], timeout: Duration) -> Result<CommandOutput, AppError> {
        let mut args = Vec::with_capacity(command.len() + 1);
        args.push("shell".to_string());
        args.extend(command.iter().map(|part| part.to_string()));
        self.adb(&args, timeout)
    }
}

pub struct AdbShell {
    program: String,
    serial: Option<String>,
    trace_id: String,
}

impl AdbShell {
    pub fn new(program: impl Into<String>, serial: Option<String>, trace_id: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            serial: serial.filter(|value| !value.trim().is_empty()),
            trace_id: trace_id.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn device_args(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(serial) = &self.serial {
            full.push("-s".to_string());
            full.push(serial.clone());
        }
        full.extend(args.iter().cloned());
        full
    }
}

impl DeviceShell for AdbShell {
    fn trace_id(&self) -> &str {
        &self.trace_id
    }

    fn adb(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, AppError> {
        let full = self.device_args(args);
        debug!(trace_id = %self.trace_id, args = ?full, "adb");
        run_command_with_timeout(&self.program, &full, timeout, &self.trace_id)
    }
}

fn drain<R: Read + Send + 'static>(reader: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut reader = reader;
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

fn join_pipes(
    stdout: JoinHandle<Vec<u8>>,
    stderr: JoinHandle<Vec<u8>>,
) -> (Vec<u8>, Vec<u8>) {
    (
        stdout.join().unwrap_or_default(),
        stderr.join().unwrap_or_default(),
    )
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::dependency(format!("Failed to spawn {program}: {err}"), trace_id))?;

    // Pipes are drained on their own threads so a chatty child cannot fill the
    // buffer and stall until the timeout.
    let stdout: ChildStdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr: ChildStderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain(stdout);
    let stderr_handle = drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = join_pipes(stdout_handle, stderr_handle);
                    return Err(AppError::timeout(
                        format!("Command timed out after {}s", timeout.as_secs_f64()),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = join_pipes(stdout_handle, stderr_handle);
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let (stdout_bytes, stderr_bytes) = join_pipes(stdout_handle, stderr_handle);
    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
        raw_stdout: stdout_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (String, Vec<String>) {
        if cfg!(windows) {
            ("cmd.exe".to_string(), vec!["/C".to_string(), script.to_string()])
        } else {
            ("sh".to_string(), vec!["-c".to_string(), script.to_string()])
        }
    }

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        let (program, args) = if cfg!(windows) {
            sh("for /L %i in (1,1,100000) do @echo 1234567890")
        } else {
            sh("i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done")
        };

        let output = run_command_with_timeout(&program, &args, Duration::from_secs(10), "trace-large")
            .expect("expected large-output command to complete without timing out");

        assert!(output.success());
        assert!(output.stdout.len() >= 1_000_000);
        assert_eq!(output.raw_stdout.len(), output.stdout.len());
    }

    #[cfg(unix)]
    #[test]
    fn expiry_is_reported_as_timeout_error() {
        let (program, args) = sh("sleep 5");
        let err = run_command_with_timeout(&program, &args, Duration::from_millis(200), "trace-slow")
            .expect_err("expected timeout");
        assert!(err.is_timeout());
        assert_eq!(err.trace_id, "trace-slow");
    }

    #[test]
    fn missing_program_is_a_dependency_error() {
        let err = run_command_with_timeout(
            "/this/program/does/not/exist",
            &[],
            Duration::from_secs(1),
            "trace-missing",
        )
        .expect_err("expected spawn failure");
        assert_eq!(err.code, "ERR_DEPENDENCY");
    }

    #[test]
    fn adb_shell_prefixes_serial() {
        let shell = AdbShell::new("adb", Some("emulator-5554".to_string()), "t");
        let args = shell.device_args(&["shell".to_string(), "true".to_string()]);
        assert_eq!(args, vec!["-s", "emulator-5554", "shell", "true"]);

        let no_serial = AdbShell::new("adb", Some("  ".to_string()), "t");
        assert_eq!(no_serial.device_args(&["devices".to_string()]), vec!["devices"]);
    }
}
