//! Unix platform implementation for PTY operations.
//!
//! - PTY master/slave allocation via openpt/grantpt/unlockpt
//! - Async master I/O through tokio's `AsyncFd`
//! - Child processes in their own session, with the slave as controlling
//!   terminal, reaped exclusively through `tokio::process::Child`

mod child;
mod pty;

use std::ffi::OsStr;

pub use child::{UnixChild, spawn_child};
pub use pty::{UnixPtyMaster, disable_echo, open_slave};

use crate::config::PtyConfig;
use crate::error::Result;

/// Spawn `program` with `args` on a fresh PTY.
///
/// Must be called from within a tokio runtime: the master registers with
/// its reactor.
pub fn spawn<S, I>(program: S, args: I, config: &PtyConfig) -> Result<(UnixPtyMaster, UnixChild)>
where
    S: AsRef<OsStr>,
    I: IntoIterator,
    I::Item: AsRef<OsStr>,
{
    let (master, slave_path) = UnixPtyMaster::open()?;
    master.set_window_size(config.window_size.into())?;

    let slave_fd = open_slave(&slave_path)?;
    if !config.echo {
        disable_echo(&slave_fd)?;
    }

    // The slave descriptor is consumed here; once the child exits the
    // master reads EOF.
    let child = spawn_child(slave_fd, program, args, config)?;

    tracing::debug!(pid = child.pid(), tty = %slave_path, "spawned child on pty");
    Ok((master, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn spawn_echo_reads_output_then_eof() {
        let config = PtyConfig::default();
        let (mut master, mut child) = spawn("echo", ["hello"], &config).expect("spawn echo");

        let mut out = Vec::new();
        master.read_to_end(&mut out).await.expect("read to eof");
        assert!(String::from_utf8_lossy(&out).contains("hello"));

        let status = child.wait().await.expect("wait");
        assert!(status.success());
    }

    #[tokio::test]
    async fn spawn_missing_program_fails() {
        let config = PtyConfig::default();
        let err = spawn("/nonexistent/vmm-binary", std::iter::empty::<&str>(), &config)
            .expect_err("missing binary must not spawn");
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }
}
