//! vmm-pty: async pseudo-terminals and child process handles.
//!
//! This crate is the lowest layer of the vmm-expect engine. It allocates a
//! pseudo-terminal, spawns a program with the slave side as its controlling
//! terminal, and hands back two independent objects:
//!
//! - a [`UnixPtyMaster`] implementing `AsyncRead + AsyncWrite`, and
//! - a [`UnixChild`] used to signal, terminate and reap the process.
//!
//! The child handle is not PTY specific: [`UnixChild`] wraps any
//! `tokio::process::Child`, so pipe-based transports reuse the same
//! signalling and graceful-termination logic.
//!
//! # Quick Start
//!
//! ```ignore
//! use vmm_pty::PtyConfig;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! let config = PtyConfig::default();
//! let (mut master, mut child) = vmm_pty::spawn("cat", ["-"], &config)?;
//! master.write_all(b"ping\n").await?;
//! let mut buf = [0u8; 64];
//! let n = master.read(&mut buf).await?;
//! let status = child.terminate(std::time::Duration::from_secs(1)).await?;
//! ```

pub mod config;
pub mod error;
pub mod status;

#[cfg(unix)]
pub mod unix;

// Re-export primary types
pub use config::{PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};
pub use status::ExitStatus;

#[cfg(unix)]
pub use unix::{UnixChild, UnixPtyMaster, spawn};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PtyConfig::default();
        assert_eq!(config.window_size, (80, 24));
        assert!(config.new_session);
        assert!(config.echo);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_true_exits_cleanly() {
        let config = PtyConfig::default();
        let (_master, mut child) =
            spawn("true", std::iter::empty::<&str>(), &config).expect("spawn true");
        let status = child.wait().await.expect("wait");
        assert!(status.success());
        assert!(!child.is_running());
    }
}
