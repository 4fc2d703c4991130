//! Common types: matches, session identity and state, exit-code classes,
//! signals.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use vmm_pty::ExitStatus;
use vmm_pty::PtySignal;

/// A successful expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Index of the top-level alternative that matched (0 for single patterns).
    pub pattern_index: usize,

    /// The matched text.
    pub matched: String,

    /// Explicit capture groups of a regex alternative, in order: group 1
    /// is `captures[0]`. Non-participating groups are empty strings.
    pub captures: Vec<String>,

    /// Output that preceded the match. Consumed together with the match.
    pub before: String,
}

impl Match {
    /// Get a capture group by its regex group number (1 is the first
    /// explicit group). Group 0 is the whole match, available as
    /// [`Match::as_str`], so `capture(0)` is `None`.
    #[must_use]
    pub fn capture(&self, group: usize) -> Option<&str> {
        let index = group.checked_sub(1)?;
        self.captures.get(index).map(String::as_str)
    }

    /// Get the matched text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.matched
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.matched)
    }
}

/// Handle to a session owned by a [`ScenarioContext`](crate::ScenarioContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) usize);

impl SessionId {
    /// The position of the session in opening order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The process is (as far as we know) running.
    Running,

    /// The process exited and was reaped; output may still be buffered.
    Exited(ExitStatus),

    /// The session was closed; no further I/O is possible.
    Closed,
}

impl SessionState {
    /// Check if the session has been closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Exited(status) => write!(f, "exited ({status})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// The set of exit results a scenario accepts from a process.
///
/// Always stated explicitly. Monitor conventions: 0 clean success, 1
/// forcibly terminated, 2 expected non-zero, 83 guest-signalled abort.
///
/// ```
/// use vmm_expect::{ExitCodeClass, ExitStatus};
///
/// let class = ExitCodeClass::codes([0, 2, 83]);
/// assert!(class.accepts(ExitStatus::Exited(83)));
/// assert!(!class.accepts(ExitStatus::Exited(1)));
/// assert!(!class.accepts(ExitStatus::Signaled(15)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExitCodeClass {
    /// Accepted exit codes.
    #[serde(default)]
    pub codes: BTreeSet<i32>,

    /// Whether termination by any signal is accepted.
    #[serde(default)]
    pub signaled: bool,
}

impl ExitCodeClass {
    /// Accept exactly the given exit codes.
    #[must_use]
    pub fn codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
            signaled: false,
        }
    }

    /// Accept only exit code 0.
    #[must_use]
    pub fn success() -> Self {
        Self::codes([0])
    }

    /// Accept termination by a signal only.
    #[must_use]
    pub fn signaled_only() -> Self {
        Self {
            codes: BTreeSet::new(),
            signaled: true,
        }
    }

    /// Also accept termination by a signal.
    #[must_use]
    pub fn or_signaled(mut self) -> Self {
        self.signaled = true;
        self
    }

    /// Check an exit status against the class.
    #[must_use]
    pub fn accepts(&self, status: ExitStatus) -> bool {
        match status {
            ExitStatus::Exited(code) => self.codes.contains(&code),
            ExitStatus::Signaled(_) => self.signaled,
        }
    }
}

impl fmt::Display for ExitCodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<String> = self.codes.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", codes.join(", "))?;
        if self.signaled {
            write!(f, " or terminated by signal")?;
        }
        Ok(())
    }
}

/// Signals that scenarios may deliver to a session's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// SIGINT.
    Interrupt,
    /// SIGQUIT.
    Quit,
    /// SIGTERM.
    Terminate,
    /// SIGKILL.
    Kill,
    /// SIGHUP.
    Hangup,
}

impl From<Signal> for PtySignal {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Interrupt => Self::Interrupt,
            Signal::Quit => Self::Quit,
            Signal::Terminate => Self::Terminate,
            Signal::Kill => Self::Kill,
            Signal::Hangup => Self::Hangup,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Terminate => "SIGTERM",
            Self::Kill => "SIGKILL",
            Self::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Control characters written to a terminal session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChar {
    /// Ctrl+C (ETX), interrupts the foreground job.
    CtrlC,
    /// Ctrl+D (EOT), end of input.
    CtrlD,
    /// Ctrl+Z (SUB), suspend.
    CtrlZ,
    /// Ctrl+\ (FS), quit.
    CtrlBackslash,
}

impl ControlChar {
    /// The byte written for this control character.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::CtrlC => 0x03,
            Self::CtrlD => 0x04,
            Self::CtrlZ => 0x1a,
            Self::CtrlBackslash => 0x1c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_numbers_follow_regex_groups() {
        let m = Match {
            pattern_index: 0,
            matched: "icmp_seq=7 ttl=64".into(),
            captures: vec!["7".into(), "64".into()],
            before: String::new(),
        };
        assert_eq!(m.capture(0), None);
        assert_eq!(m.capture(1), Some("7"));
        assert_eq!(m.capture(2), Some("64"));
        assert_eq!(m.capture(3), None);
    }

    #[test]
    fn exit_class_accepts_listed_codes_only() {
        let class = ExitCodeClass::codes([0, 2, 83]);
        assert!(class.accepts(ExitStatus::Exited(0)));
        assert!(class.accepts(ExitStatus::Exited(2)));
        assert!(!class.accepts(ExitStatus::Exited(1)));
        assert!(!class.accepts(ExitStatus::Signaled(9)));
    }

    #[test]
    fn exit_class_signaled() {
        let class = ExitCodeClass::success().or_signaled();
        assert!(class.accepts(ExitStatus::Signaled(15)));
        assert_eq!(class.to_string(), "{0} or terminated by signal");
    }

    #[test]
    fn exit_class_deserializes_from_toml_shape() {
        let class: ExitCodeClass =
            serde_json::from_str(r#"{"codes": [0, 83], "signaled": true}"#).expect("parse");
        assert_eq!(class, ExitCodeClass::codes([0, 83]).or_signaled());
    }

    #[test]
    fn signal_names() {
        let sig: Signal = serde_json::from_str("\"interrupt\"").expect("parse");
        assert_eq!(sig, Signal::Interrupt);
        assert_eq!(PtySignal::from(sig), PtySignal::Interrupt);
        assert_eq!(sig.to_string(), "SIGINT");
    }

    #[test]
    fn control_bytes() {
        assert_eq!(ControlChar::CtrlC.as_byte(), 3);
        assert_eq!(ControlChar::CtrlD.as_byte(), 4);
    }
}
