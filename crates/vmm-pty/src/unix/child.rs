//! Child process handle shared by the PTY and pipe transports.
//!
//! The tokio `Child` is the only thing that ever reaps the process. Signals
//! go to the whole process group when the child leads one, so programs that
//! fork helpers (a VMM monitor, a debugger) are cleaned up together.

use std::ffi::OsStr;
use std::io;
use std::os::unix::io::OwnedFd;
use std::process::Stdio;
use std::time::Duration;

use rustix::process::{Pid, Signal, kill_process, kill_process_group};
use tokio::process::{Child as TokioChild, Command};

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result};
use crate::status::ExitStatus;

/// Handle for a spawned Unix child process.
pub struct UnixChild {
    child: TokioChild,
    pid: u32,
    group: bool,
    status: Option<ExitStatus>,
}

impl std::fmt::Debug for UnixChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixChild")
            .field("pid", &self.pid)
            .field("group", &self.group)
            .field("status", &self.status)
            .finish()
    }
}

impl UnixChild {
    /// Wrap a freshly spawned tokio child.
    ///
    /// `group` states whether the child was started as the leader of its own
    /// process group (via `setsid` or `process_group(0)`).
    pub fn from_tokio(child: TokioChild, group: bool) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("child exited before its pid was read"))
        })?;
        Ok(Self {
            child,
            pid,
            group,
            status: None,
        })
    }

    /// Process ID of the child (and process group ID when it leads one).
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Whether the child has not been reaped yet.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.status.is_none()
    }

    /// The cached exit status, once the child has been reaped.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    fn record(&mut self, status: std::process::ExitStatus) -> ExitStatus {
        let status = ExitStatus::from(status);
        tracing::debug!(pid = self.pid, %status, "child reaped");
        self.status = Some(status);
        status
    }

    /// Wait for the child process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.child.wait().await.map_err(PtyError::Wait)?;
        Ok(self.record(status))
    }

    /// Reap the child if it already exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match self.child.try_wait().map_err(PtyError::Wait)? {
            Some(status) => Ok(Some(self.record(status))),
            None => Ok(None),
        }
    }

    /// Deliver a signal to the child, or to its group when it leads one.
    ///
    /// A process that vanished between the check and the signal is not an
    /// error.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if let Some(status) = self.status {
            return Err(PtyError::ProcessExited(status));
        }

        let pid = Pid::from_raw(self.pid as i32).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
        })?;
        let sig = Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
        })?;

        let result = if self.group {
            kill_process_group(pid, sig)
        } else {
            kill_process(pid, sig)
        };
        match result {
            Ok(()) | Err(rustix::io::Errno::SRCH) => Ok(()),
            Err(e) => Err(PtyError::Signal(io::Error::from_raw_os_error(
                e.raw_os_error(),
            ))),
        }
    }

    /// Kill the child process (SIGKILL).
    pub fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }

    /// SIGKILL whatever is left of the child's process group once the
    /// leader has been reaped. Background helpers would otherwise keep the
    /// output stream open.
    pub fn kill_stragglers(&self) {
        if !self.group || self.status.is_none() {
            return;
        }
        if let Some(pgid) = Pid::from_raw(self.pid as i32) {
            match kill_process_group(pgid, Signal::KILL) {
                Ok(()) => tracing::debug!(pgid = self.pid, "killed leftover group members"),
                Err(rustix::io::Errno::SRCH) => {}
                Err(e) => tracing::debug!(pgid = self.pid, error = %e, "group kill failed"),
            }
        }
    }

    /// SIGTERM, wait up to `grace`, then SIGKILL and reap.
    ///
    /// Leftover members of the child's process group are killed too.
    pub async fn terminate(&mut self, grace: Duration) -> Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            self.kill_stragglers();
            return Ok(status);
        }

        self.signal(PtySignal::Terminate)?;
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = self.record(status.map_err(PtyError::Wait)?);
                self.kill_stragglers();
                Ok(status)
            }
            Err(_) => {
                tracing::debug!(pid = self.pid, ?grace, "child ignored SIGTERM, killing");
                self.signal(PtySignal::Kill)?;
                self.wait().await
            }
        }
    }
}

impl Drop for UnixChild {
    fn drop(&mut self) {
        if self.status.is_none() && self.group {
            // tokio's kill_on_drop only reaches the leader.
            let _ = self.signal(PtySignal::Kill);
        } else {
            self.kill_stragglers();
        }
    }
}

/// Spawn a child process whose standard streams are the PTY slave.
pub fn spawn_child<S, I>(
    slave_fd: OwnedFd,
    program: S,
    args: I,
    config: &PtyConfig,
) -> Result<UnixChild>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let mut cmd = Command::new(program.as_ref());
    cmd.args(args);
    cmd.env_clear();
    cmd.envs(config.effective_env());
    cmd.kill_on_drop(true);

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    let stdin = slave_fd.try_clone().map_err(PtyError::Spawn)?;
    let stdout = slave_fd.try_clone().map_err(PtyError::Spawn)?;
    cmd.stdin(Stdio::from(stdin));
    cmd.stdout(Stdio::from(stdout));
    cmd.stderr(Stdio::from(slave_fd));

    let new_session = config.new_session;
    let controlling_terminal = config.new_session && config.controlling_terminal;
    if new_session {
        // SAFETY: setsid and ioctl are async-signal-safe.
        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(move || {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                if controlling_terminal && libc::ioctl(0, libc::TIOCSCTTY as _, 0) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    // `cmd` drops here and closes the parent's copies of the slave.
    UnixChild::from_tokio(child, new_session)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> UnixChild {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .process_group(0);
        UnixChild::from_tokio(cmd.spawn().expect("spawn sh"), true).expect("wrap child")
    }

    #[tokio::test]
    async fn wait_caches_status() {
        let mut child = sh("exit 83");
        assert_eq!(child.wait().await.expect("wait"), ExitStatus::Exited(83));
        assert_eq!(child.try_wait().expect("try_wait"), Some(ExitStatus::Exited(83)));
        assert!(!child.is_running());
    }

    #[tokio::test]
    async fn signal_after_exit_is_reported() {
        let mut child = sh("exit 0");
        child.wait().await.expect("wait");
        assert!(matches!(
            child.signal(PtySignal::Interrupt),
            Err(PtyError::ProcessExited(ExitStatus::Exited(0)))
        ));
    }

    #[tokio::test]
    async fn terminate_after_exit_kills_background_helpers() {
        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "sleep 30 & exit 3"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);
        let mut tokio_child = cmd.spawn().expect("spawn sh");
        let mut stdout = tokio_child.stdout.take().expect("stdout");
        let mut child = UnixChild::from_tokio(tokio_child, true).expect("wrap child");

        assert_eq!(child.wait().await.expect("wait"), ExitStatus::Exited(3));
        assert_eq!(
            child.terminate(Duration::from_secs(1)).await.expect("terminate"),
            ExitStatus::Exited(3)
        );

        // The pipe reaches EOF only once the background sleep is gone.
        let mut rest = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut rest),
        )
        .await
        .expect("helper still holds stdout")
        .expect("read to end");
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn terminate_escalates_to_kill() {
        let mut child = sh("trap '' TERM; while :; do sleep 1; done");
        tokio::time::sleep(Duration::from_millis(100)).await;
        let status = child
            .terminate(Duration::from_millis(200))
            .await
            .expect("terminate");
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[tokio::test]
    async fn terminate_honours_sigterm() {
        let mut child = sh("sleep 30");
        let status = child.terminate(Duration::from_secs(5)).await.expect("terminate");
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }
}
