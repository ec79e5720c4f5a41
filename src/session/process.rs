//! Handle to a running media process

use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::session::command::{version_command, LaunchCommand};

/// Bytes of stderr retained for classification
const STDERR_CAPACITY: usize = 8 * 1024;

/// How long to wait for stderr to close after the process exits
const DIAGNOSTIC_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A launched media process with its stderr being drained in the background
pub struct MediaProcess {
    child: Child,
    pid: Option<u32>,
    stderr_task: Option<JoinHandle<String>>,
}

impl MediaProcess {
    /// Launch `command`.
    ///
    /// A missing executable maps to [`SessionError::ExecutableNotFound`] and a file
    /// the OS cannot execute to [`SessionError::NotExecutable`]. The supervisor
    /// treats both as fatal.
    pub fn spawn(command: &LaunchCommand) -> Result<Self, SessionError> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| map_spawn_error(&command.program, source))?;

        let pid = child.id();
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(drain_tail(stderr)));

        tracing::debug!("Spawned {} (pid {:?})", command.program, pid);

        Ok(Self {
            child,
            pid,
            stderr_task,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the process to exit. Cancel-safe.
    pub async fn wait(&mut self) -> Result<ExitStatus, SessionError> {
        self.child.wait().await.map_err(SessionError::Wait)
    }

    /// Collected stderr tail. Only meaningful after the process exited.
    pub async fn diagnostics(&mut self) -> String {
        let Some(task) = self.stderr_task.take() else {
            return String::new();
        };

        // A grandchild can keep the pipe open after the process itself is gone
        match tokio::time::timeout(DIAGNOSTIC_DRAIN_TIMEOUT, task).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::debug!("stderr reader failed: {}", e);
                String::new()
            }
            Err(_) => String::new(),
        }
    }

    /// Ask the process to exit, then kill it if it is still alive after `grace`
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus, SessionError> {
        if let Some(status) = self.child.try_wait().map_err(SessionError::Wait)? {
            return Ok(status);
        }

        if self.request_exit() {
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => return status.map_err(SessionError::Wait),
                Err(_) => {
                    tracing::warn!(
                        "Media process {:?} ignored terminate for {:?}, killing",
                        self.pid,
                        grace
                    );
                }
            }
        }

        self.child.kill().await.map_err(SessionError::Wait)?;
        self.wait().await
    }

    #[cfg(unix)]
    fn request_exit(&self) -> bool {
        let Some(pid) = self.child.id() else {
            return false;
        };
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // SAFETY: plain syscall; pid belongs to our unreaped child
        unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
    }

    #[cfg(not(unix))]
    fn request_exit(&self) -> bool {
        false
    }
}

impl Drop for MediaProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

fn map_spawn_error(program: &str, source: std::io::Error) -> SessionError {
    if is_exec_format_error(&source) {
        return SessionError::NotExecutable(program.to_string());
    }
    match source.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
            SessionError::ExecutableNotFound(program.to_string())
        }
        _ => SessionError::SpawnFailed {
            program: program.to_string(),
            source,
        },
    }
}

#[cfg(unix)]
fn is_exec_format_error(source: &std::io::Error) -> bool {
    source.raw_os_error() == Some(libc::ENOEXEC)
}

#[cfg(windows)]
fn is_exec_format_error(source: &std::io::Error) -> bool {
    // ERROR_BAD_EXE_FORMAT
    source.raw_os_error() == Some(193)
}

#[cfg(not(any(unix, windows)))]
fn is_exec_format_error(_source: &std::io::Error) -> bool {
    false
}

async fn drain_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(STDERR_CAPACITY);
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tracing::trace!("media stderr: {}", String::from_utf8_lossy(&chunk[..n]));
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_CAPACITY {
                    let excess = tail.len() - STDERR_CAPACITY;
                    tail.drain(..excess);
                }
            }
            Err(_) => break,
        }
    }

    String::from_utf8_lossy(&tail).into_owned()
}

/// Check that `executable` can be launched by running `<executable> -version`
pub async fn probe_executable(executable: &str) -> Result<(), SessionError> {
    let output = run_to_completion(&version_command(executable)).await?;
    if !output.status.success() {
        tracing::warn!(
            "{} -version exited with {}, continuing anyway",
            executable,
            output.status
        );
    }
    Ok(())
}

/// Run a short-lived command and collect its output
pub async fn run_to_completion(command: &LaunchCommand) -> Result<Output, SessionError> {
    Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| map_spawn_error(&command.program, source))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> LaunchCommand {
        LaunchCommand::new("/bin/sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let result = MediaProcess::spawn(&LaunchCommand::new("/nonexistent/media-player"));
        assert!(matches!(result, Err(SessionError::ExecutableNotFound(_))));
    }

    #[test]
    fn test_launch_errors_that_cannot_recover() {
        let bad_format = std::io::Error::from_raw_os_error(libc::ENOEXEC);
        let err = map_spawn_error("./capture.bin", bad_format);
        assert!(matches!(err, SessionError::NotExecutable(ref p) if p == "./capture.bin"));
        assert!(err.is_fatal());

        let denied = std::io::Error::from_raw_os_error(libc::EACCES);
        assert!(map_spawn_error("ffplay", denied).is_fatal());

        let busy = std::io::Error::from_raw_os_error(libc::EAGAIN);
        let err = map_spawn_error("ffplay", busy);
        assert!(matches!(err, SessionError::SpawnFailed { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_exit_code_and_stderr() {
        let mut process =
            MediaProcess::spawn(&sh("echo 'Connection refused' >&2; exit 3")).unwrap();
        let status = process.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(process.diagnostics().await.contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_stderr_tail_is_bounded() {
        let mut process =
            MediaProcess::spawn(&sh("head -c 50000 /dev/zero | tr '\\0' 'x' >&2; echo END >&2"))
                .unwrap();
        process.wait().await.unwrap();
        let text = process.diagnostics().await;
        assert!(text.len() <= STDERR_CAPACITY);
        assert!(text.trim_end().ends_with("END"));
    }

    #[tokio::test]
    async fn test_terminate_graceful() {
        let mut process = MediaProcess::spawn(&sh("sleep 30")).unwrap();
        let started = Instant::now();
        let status = process.terminate(Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let mut process =
            MediaProcess::spawn(&sh("trap '' TERM; while true; do sleep 0.1; done")).unwrap();
        // Give the shell time to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        process.terminate(Duration::from_millis(300)).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_probe_executable() {
        assert!(probe_executable("/bin/sh").await.is_ok());
        assert!(matches!(
            probe_executable("/nonexistent/ffmpeg").await,
            Err(SessionError::ExecutableNotFound(_))
        ));
    }
}
