//! Command-line templates.
//!
//! Scenario catalogs write commands the way a shell user would:
//!
//! ```text
//! {ukvm} --disk={disk} --net={tap} {kernel} -- verbose
//! gdb --ex="target remote localhost:{port}" {kernel}
//! ```
//!
//! A line is split into words honouring single quotes, double quotes and
//! backslash escapes (no other shell syntax). `{name}` placeholders are then
//! replaced word by word, so a substituted value never splits into several
//! arguments. Words after a standalone `--` go to the guest verbatim.

use std::collections::HashMap;
use std::fmt;

use crate::config::SessionConfig;
use crate::error::{ExpectError, Result};

/// A parsed program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The program to execute.
    pub program: String,
    /// Its arguments.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split `line` into program and arguments.
    pub fn parse(line: &str) -> Result<Self> {
        Self::from_words(split_words(line)?, line)
    }

    /// Split `line` and substitute `{name}` placeholders from `vars`.
    ///
    /// `{{` and `}}` stand for literal braces. An unknown name is an error.
    pub fn expand(line: &str, vars: &HashMap<String, String>) -> Result<Self> {
        let mut words = Vec::new();
        let mut verbatim = false;
        for word in split_words(line)? {
            if verbatim {
                words.push(word);
                continue;
            }
            verbatim = word == "--";
            words.push(substitute(&word, vars)?);
        }
        Self::from_words(words, line)
    }

    fn from_words(mut words: Vec<String>, line: &str) -> Result<Self> {
        if words.is_empty() {
            return Err(ExpectError::config(format!("empty command line: {line:?}")));
        }
        let program = words.remove(0);
        Ok(Self {
            program,
            args: words,
        })
    }

    /// A session configuration running this command with default settings.
    #[must_use]
    pub fn into_config(self) -> SessionConfig {
        SessionConfig::new(self.program).args(self.args)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => word.push(ch),
                        None => return Err(unterminated("single quote", line)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => word.push(ch),
                            Some(ch) => {
                                word.push('\\');
                                word.push(ch);
                            }
                            None => return Err(unterminated("double quote", line)),
                        },
                        Some(ch) => word.push(ch),
                        None => return Err(unterminated("double quote", line)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => word.push(ch),
                    None => return Err(unterminated("escape", line)),
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn unterminated(what: &str, line: &str) -> ExpectError {
    ExpectError::config(format!("unterminated {what} in command line: {line:?}"))
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn substitute(word: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(word.len());
    let mut chars = word.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '}' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if closed && is_var_name(&name) {
                    let value = vars.get(&name).ok_or_else(|| {
                        ExpectError::config(format!("unknown variable {{{name}}} in {word:?}"))
                    })?;
                    out.push_str(value);
                } else {
                    out.push('{');
                    out.push_str(&name);
                    if closed {
                        out.push('}');
                    }
                }
            }
            c => out.push(c),
        }
    }
    Ok(out)
}
