//! Scenario context: the sessions and cleanups of one scenario run.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::config::{SessionConfig, TimeoutConfig, Transport};
use crate::error::{ExpectError, Result};
use crate::session::{CommandLine, Session};
use crate::types::{ExitCodeClass, ExitStatus, SessionId};

/// Time a deferred cleanup command may run.
const CLEANUP_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// An action run after every session of a scenario has been closed.
pub enum Cleanup {
    /// Remove a file (a disk image, a socket). A missing file is fine.
    RemoveFile(PathBuf),

    /// Run a command line to completion, e.g. deleting a tap device.
    Command(String),

    /// Run arbitrary async code.
    Custom(CleanupFn),
}

impl Cleanup {
    /// Wrap an async closure as a cleanup.
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        Self::Custom(Box::new(move || Box::pin(f())))
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoveFile(path) => f.debug_tuple("RemoveFile").field(path).finish(),
            Self::Command(line) => f.debug_tuple("Command").field(line).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug)]
struct Entry {
    name: String,
    session: Session,
}

/// Sessions, cleanups and progress of one scenario run.
///
/// Sessions are addressed by the [`SessionId`] returned from
/// [`ScenarioContext::open`] or by name.
#[derive(Debug)]
pub struct ScenarioContext {
    scenario: String,
    timeouts: TimeoutConfig,
    transcripts: Option<PathBuf>,
    exit_class: Option<ExitCodeClass>,
    entries: Vec<Entry>,
    cleanups: Vec<Cleanup>,
    stages: Vec<String>,
}

impl ScenarioContext {
    /// Create a context for the scenario named `scenario`.
    #[must_use]
    pub fn new(scenario: impl Into<String>, timeouts: TimeoutConfig) -> Self {
        Self {
            scenario: scenario.into(),
            timeouts,
            transcripts: None,
            exit_class: None,
            entries: Vec::new(),
            cleanups: Vec::new(),
            stages: Vec::new(),
        }
    }

    /// Write a transcript of every session into `dir`.
    #[must_use]
    pub fn with_transcripts(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcripts = Some(dir.into());
        self
    }

    /// Override the exit-code class of steps that do not state their own.
    #[must_use]
    pub fn with_exit_class(mut self, class: Option<ExitCodeClass>) -> Self {
        self.exit_class = class;
        self
    }

    /// Name of the scenario.
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Timeouts in effect.
    #[must_use]
    pub const fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// The exit-code class override, if any.
    #[must_use]
    pub const fn exit_class(&self) -> Option<&ExitCodeClass> {
        self.exit_class.as_ref()
    }

    /// `own` if given, else the override, else `default`.
    #[must_use]
    pub fn resolve_exit_class(
        &self,
        own: Option<&ExitCodeClass>,
        default: impl FnOnce() -> ExitCodeClass,
    ) -> ExitCodeClass {
        own.or(self.exit_class.as_ref())
            .cloned()
            .unwrap_or_else(default)
    }

    /// Record progress; the latest stage is reported when the scenario
    /// fails.
    pub fn set_stage(&mut self, stage: impl Into<String>) {
        let stage = stage.into();
        tracing::info!(scenario = %self.scenario, %stage, "stage");
        self.stages.push(stage);
    }

    /// The most recent stage.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        self.stages.last().map(String::as_str)
    }

    /// Every stage recorded so far, oldest first.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Spawn a session named after its label.
    pub async fn open(&mut self, config: SessionConfig) -> Result<SessionId> {
        let name = config.display_label();
        self.open_named(name, config).await
    }

    /// Spawn a session under `name`.
    ///
    /// A name already in use gets a numeric suffix.
    pub async fn open_named(
        &mut self,
        name: impl Into<String>,
        mut config: SessionConfig,
    ) -> Result<SessionId> {
        let name = self.unique_name(name.into());
        if config.label.is_none() {
            config.label = Some(name.clone());
        }
        if config.transcript.is_none() {
            config.transcript = self.transcript_path(&name);
        }

        let session = Session::spawn(config).await?;
        let id = SessionId(self.entries.len());
        tracing::debug!(scenario = %self.scenario, session = %name, %id, "session registered");
        self.entries.push(Entry { name, session });
        Ok(id)
    }

    fn unique_name(&self, base: String) -> String {
        if self.id_of(&base).is_none() {
            return base;
        }
        (2..)
            .map(|n| format!("{base}-{n}"))
            .find(|candidate| self.id_of(candidate).is_none())
            .unwrap_or(base)
    }

    fn transcript_path(&self, session: &str) -> Option<PathBuf> {
        let dir = self.transcripts.as_ref()?;
        let file = format!("{}.{}.log", sanitize(&self.scenario), sanitize(session));
        Some(dir.join(file))
    }

    /// Look up a session by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<SessionId> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(SessionId)
    }

    /// Borrow a session.
    pub fn session(&mut self, id: SessionId) -> Result<&mut Session> {
        self.entries
            .get_mut(id.0)
            .map(|e| &mut e.session)
            .ok_or_else(|| ExpectError::SessionNotFound {
                name: id.to_string(),
            })
    }

    /// Borrow a session by name.
    pub fn session_named(&mut self, name: &str) -> Result<&mut Session> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .map(|e| &mut e.session)
            .ok_or_else(|| ExpectError::SessionNotFound {
                name: name.to_string(),
            })
    }

    /// Number of sessions opened so far, closed ones included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.entries.len()
    }

    /// Register a cleanup. Cleanups run last-registered first.
    pub fn defer(&mut self, cleanup: Cleanup) {
        tracing::debug!(scenario = %self.scenario, ?cleanup, "cleanup registered");
        self.cleanups.push(cleanup);
    }

    /// Run `line` over pipes to completion and check its exit status.
    ///
    /// For setup commands such as preparing a disk image. Output is logged
    /// at debug level.
    pub async fn run_command(
        &mut self,
        line: &str,
        timeout: Duration,
        class: &ExitCodeClass,
    ) -> Result<ExitStatus> {
        run_command(line, timeout, class, self.timeouts.grace).await
    }

    /// Close every session (newest first), then run the cleanups.
    ///
    /// Never stops at the first failure; every error is logged and
    /// returned. Safe to call more than once.
    pub async fn close_all(&mut self) -> Vec<ExpectError> {
        let mut errors = Vec::new();

        for entry in self.entries.iter_mut().rev() {
            match entry.session.close().await {
                Ok(status) => {
                    tracing::debug!(session = %entry.name, ?status, "closed");
                }
                Err(e) => {
                    tracing::warn!(session = %entry.name, error = %e, "close failed");
                    errors.push(e);
                }
            }
        }

        while let Some(cleanup) = self.cleanups.pop() {
            if let Err(e) = run_cleanup(&self.scenario, cleanup, self.timeouts.grace).await {
                tracing::warn!(scenario = %self.scenario, error = %e, "cleanup failed");
                errors.push(e);
            }
        }
        errors
    }
}

async fn run_cleanup(scenario: &str, cleanup: Cleanup, grace: Duration) -> Result<()> {
    tracing::debug!(scenario, ?cleanup, "running cleanup");
    match cleanup {
        Cleanup::RemoveFile(path) => match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ExpectError::io_context(
                format!("removing {}", path.display()),
                e,
            )),
        },
        Cleanup::Command(line) => run_command(
            &line,
            CLEANUP_COMMAND_TIMEOUT,
            &ExitCodeClass::success(),
            grace,
        )
        .await
        .map(|_| ()),
        Cleanup::Custom(f) => f().await,
    }
}

async fn run_command(
    line: &str,
    timeout: Duration,
    class: &ExitCodeClass,
    grace: Duration,
) -> Result<ExitStatus> {
    let mut config = CommandLine::parse(line)?.into_config();
    config.transport = Transport::Pipe;
    config.timeout.grace = grace;

    tracing::debug!(command = line, "running command");
    let mut session = Session::spawn(config).await?;
    let result = session.expect_exit(class, timeout).await;
    session.refresh();
    let output = session.buffer().to_string_lossy();
    if !output.is_empty() {
        tracing::debug!(command = line, %output, "command output");
    }
    session.close().await?;
    result
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_utils::sh;

    #[tokio::test]
    async fn sessions_by_name_and_id() {
        let mut ctx = ScenarioContext::new("names", TimeoutConfig::default());
        let a = ctx.open_named("monitor", sh("sleep 30")).await.expect("open");
        let b = ctx.open_named("monitor", sh("sleep 30")).await.expect("open");
        assert_ne!(a, b);
        assert_eq!(ctx.id_of("monitor-2"), Some(b));
        assert!(ctx.session_named("monitor").is_ok());
        assert!(matches!(
            ctx.session_named("gdb"),
            Err(ExpectError::SessionNotFound { .. })
        ));
        assert!(ctx.close_all().await.is_empty());
        assert!(!ctx.session(a).expect("session").is_alive());
    }

    #[tokio::test]
    async fn cleanups_run_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut ctx = ScenarioContext::new("cleanups", TimeoutConfig::default());
        for i in 0..3 {
            let order = Arc::clone(&order);
            ctx.defer(Cleanup::custom(move || async move {
                order.lock().expect("lock").push(i);
                Ok(())
            }));
        }
        assert!(ctx.close_all().await.is_empty());
        assert_eq!(*order.lock().expect("lock"), vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn failing_cleanup_does_not_stop_the_rest() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut ctx = ScenarioContext::new("cleanups", TimeoutConfig::default());
        let counter = Arc::clone(&ran);
        ctx.defer(Cleanup::custom(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        ctx.defer(Cleanup::Command("/bin/sh -c 'exit 3'".into()));
        ctx.defer(Cleanup::RemoveFile(PathBuf::from("/nonexistent/disk.img")));

        let errors = ctx.close_all().await;
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ExpectError::ExitCode { .. }));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(ctx.close_all().await.is_empty());
    }

    #[tokio::test]
    async fn run_command_checks_exit_class() {
        let mut ctx = ScenarioContext::new("setup", TimeoutConfig::default());
        let status = ctx
            .run_command("/bin/sh -c 'exit 2'", Duration::from_secs(5), &ExitCodeClass::codes([0, 2]))
            .await
            .expect("accepted");
        assert_eq!(status, ExitStatus::Exited(2));
        assert!(
            ctx.run_command("/bin/sh -c 'exit 2'", Duration::from_secs(5), &ExitCodeClass::success())
                .await
                .is_err()
        );
    }

    #[test]
    fn exit_class_resolution() {
        let ctx = ScenarioContext::new("x", TimeoutConfig::default())
            .with_exit_class(Some(ExitCodeClass::codes([0, 83])));
        let own = ExitCodeClass::codes([2]);
        assert_eq!(ctx.resolve_exit_class(Some(&own), ExitCodeClass::success), own);
        assert_eq!(
            ctx.resolve_exit_class(None, ExitCodeClass::success),
            ExitCodeClass::codes([0, 83])
        );
    }

    #[test]
    fn transcript_names_are_sanitized() {
        let ctx = ScenarioContext::new("gdb hello/quit", TimeoutConfig::default())
            .with_transcripts("/tmp/t");
        assert_eq!(
            ctx.transcript_path("ukvm-bin"),
            Some(PathBuf::from("/tmp/t/gdb_hello_quit.ukvm-bin.log"))
        );
    }
}
