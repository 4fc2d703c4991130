//! SIGINT / SIGTERM handling for a run.
//!
//! The first signal flips a watch channel that the runner observes; the
//! running scenario is then cancelled and cleaned up like any other
//! failure. Further signals are only logged.

use std::io;

use futures::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::{Handle, Signals};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Registered interrupt handler.
#[derive(Debug)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
    handle: Handle,
    task: JoinHandle<()>,
}

impl Interrupt {
    /// Register for SIGINT and SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if signal registration fails.
    pub fn install() -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            while let Some(signal) = signals.next().await {
                let name = if signal == SIGINT { "SIGINT" } else { "SIGTERM" };
                if tx.send_replace(true) {
                    tracing::warn!(signal = name, "already interrupted, cleanup in progress");
                } else {
                    tracing::warn!(signal = name, "interrupted, cancelling the running scenario");
                }
            }
        });

        Ok(Self { rx, handle, task })
    }

    /// A receiver that turns `true` once a signal arrived.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Whether a signal has arrived.
    #[must_use]
    pub fn triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Unregister the handler and wait for its task.
    pub async fn close(self) {
        self.handle.close();
        if let Err(e) = self.task.await {
            tracing::debug!(error = %e, "signal task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sigterm_flips_the_flag() {
        let interrupt = Interrupt::install().expect("install");
        let mut rx = interrupt.subscribe();
        assert!(!interrupt.triggered());

        signal_hook::low_level::raise(SIGTERM).expect("raise");
        tokio::time::timeout(std::time::Duration::from_secs(5), rx.wait_for(|set| *set))
            .await
            .expect("signal observed")
            .expect("sender alive");

        assert!(interrupt.triggered());
        interrupt.close().await;
    }
}
