//! Scenarios: scripted interaction with one or more sessions.
//!
//! A [`Scenario`] drives sessions opened through a [`ScenarioContext`] and
//! returns `Ok(())` or the first error. The context owns every session and
//! every deferred cleanup, so whoever runs the scenario can release them all
//! afterwards whatever happened inside.
//!
//! Two ready-made scenario shapes exist:
//!
//! - [`ScriptScenario`]: an ordered list of [`Step`]s, deserializable from a
//!   catalog.
//! - [`DebuggerScenario`]: a monitor waiting for a remote debugger, driven
//!   through attach, breakpoints and one of the [`Terminal`] states.

mod context;
mod debugger;
mod script;

use futures::future::BoxFuture;

pub use context::{Cleanup, ScenarioContext};
pub use debugger::{Breakpoint, DebuggerMarkers, DebuggerScenario, DebuggerState, Exchange, Side, Terminal};
pub use script::{ScriptScenario, Step};

use crate::error::Result;

/// Something the runner can execute.
pub trait Scenario: Send + Sync {
    /// Run the scenario against `ctx`.
    ///
    /// Sessions and cleanups registered on `ctx` are released by the caller
    /// after the returned future finishes, is cancelled or panics.
    fn run<'a>(&'a self, ctx: &'a mut ScenarioContext) -> BoxFuture<'a, Result<()>>;
}

/// A scenario backed by a closure.
pub struct FnScenario<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnScenario<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnScenario").finish_non_exhaustive()
    }
}

impl<F> Scenario for FnScenario<F>
where
    F: for<'a> Fn(&'a mut ScenarioContext) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    fn run<'a>(&'a self, ctx: &'a mut ScenarioContext) -> BoxFuture<'a, Result<()>> {
        (self.f)(ctx)
    }
}

/// Wrap a closure as a [`Scenario`].
///
/// ```
/// use vmm_expect::scenario::from_fn;
/// use vmm_expect::SessionConfig;
///
/// let hello = from_fn(|ctx| {
///     Box::pin(async move {
///         let id = ctx.open(SessionConfig::new("test_hello/ukvm-bin")).await?;
///         ctx.session(id)?.expect("Hello, World").await?;
///         Ok(())
///     })
/// });
/// # let _ = hello;
/// ```
pub fn from_fn<F>(f: F) -> FnScenario<F>
where
    F: for<'a> Fn(&'a mut ScenarioContext) -> BoxFuture<'a, Result<()>> + Send + Sync,
{
    FnScenario { f }
}
