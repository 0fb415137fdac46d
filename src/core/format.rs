//! Command pattern formatting.
//!
//! A command pattern is a shell command containing typed placeholders:
//!
//! | Token        | Resolves to                                              |
//! |--------------|----------------------------------------------------------|
//! | `{i:name}`   | input path (its FIFO path if the input is streaming)     |
//! | `{o:name}`   | output temporary path, atomized after execution          |
//! | `{os:name}`  | output FIFO path, never atomized                         |
//! | `{p:name}`   | parameter value                                          |
//!
//! ```
//! use sciflow::{FileTarget, Target, format_command};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! let mut inputs: HashMap<String, Arc<dyn Target>> = HashMap::new();
//! inputs.insert("in".into(), Arc::new(FileTarget::new("/data/a.txt")));
//! let mut outputs: HashMap<String, Arc<dyn Target>> = HashMap::new();
//! outputs.insert("out".into(), Arc::new(FileTarget::new("/data/a.out")));
//! let params = HashMap::from([("level".to_string(), "3".to_string())]);
//!
//! let cmd = format_command(
//!     "tool -i {i:in} -o {o:out} -p {p:level}",
//!     &inputs,
//!     &outputs,
//!     &params,
//!     "",
//! )
//! .unwrap();
//! assert_eq!(cmd, "tool -i /data/a.txt -o /data/a.out.tmp -p 3");
//! ```

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::target::Target;

static PLACEHOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(os|o|i|p):([^{}:]+)\}").expect("Failed to compile placeholder regex")
});

/// Errors produced while resolving placeholders.
///
/// These are workflow-definition bugs and are never recoverable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// `{i:name}` names an in-port with no target.
    #[error("missing input target for in-port '{port}' in command '{command}'")]
    MissingInput { port: String, command: String },

    /// `{i:name}` names an in-port whose target has an empty path.
    #[error("empty input path for in-port '{port}' in command '{command}'")]
    EmptyInputPath { port: String, command: String },

    /// `{o:name}` or `{os:name}` names an out-port with no target.
    #[error("missing output target for out-port '{port}' in command '{command}'")]
    MissingOutput { port: String, command: String },

    /// `{p:name}` names a parameter that was not supplied.
    #[error("missing value for parameter '{param}' in command '{command}'")]
    MissingParam { param: String, command: String },

    /// `{p:name}` names a parameter whose value is empty.
    #[error("empty value for parameter '{param}' in command '{command}'")]
    EmptyParam { param: String, command: String },

    /// Any other placeholder that resolved to an empty string.
    #[error("placeholder '{token}' resolved to an empty value in command '{command}'")]
    EmptyValue { token: String, command: String },
}

/// The kind of a placeholder token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// `i`
    Input,
    /// `o`
    Output,
    /// `os`
    StreamingOutput,
    /// `p`
    Param,
}

impl PortKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "i" => Some(PortKind::Input),
            "o" => Some(PortKind::Output),
            "os" => Some(PortKind::StreamingOutput),
            "p" => Some(PortKind::Param),
            _ => None,
        }
    }

    /// The tag used in the pattern syntax.
    pub fn tag(&self) -> &'static str {
        match self {
            PortKind::Input => "i",
            PortKind::Output => "o",
            PortKind::StreamingOutput => "os",
            PortKind::Param => "p",
        }
    }
}

impl fmt::Display for PortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A placeholder occurrence in a command pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placeholder<'a> {
    /// The full token text, braces included.
    pub token: &'a str,
    pub kind: PortKind,
    /// Port or parameter name.
    pub name: &'a str,
}

/// Iterate over the placeholders of `pattern` in order of appearance.
///
/// Repeated tokens are yielded once per occurrence.
pub fn placeholders(pattern: &str) -> impl Iterator<Item = Placeholder<'_>> {
    PLACEHOLDER_REGEX.captures_iter(pattern).filter_map(|caps| {
        let token = caps.get(0)?.as_str();
        let kind = PortKind::from_tag(caps.get(1)?.as_str())?;
        let name = caps.get(2)?.as_str();
        Some(Placeholder { token, kind, name })
    })
}

/// Resolve every placeholder in `pattern` and prepend `prefix`.
///
/// Each distinct token is resolved once and all of its occurrences are
/// replaced in a single pass, so substituted values are never rescanned
/// for placeholders. A non-empty `prefix` is prepended with one space.
pub fn format_command(
    pattern: &str,
    inputs: &HashMap<String, Arc<dyn Target>>,
    outputs: &HashMap<String, Arc<dyn Target>>,
    params: &HashMap<String, String>,
    prefix: &str,
) -> Result<String, FormatError> {
    let mut resolved: HashMap<&str, String> = HashMap::new();
    for placeholder in placeholders(pattern) {
        if !resolved.contains_key(placeholder.token) {
            let value = resolve(&placeholder, pattern, inputs, outputs, params)?;
            resolved.insert(placeholder.token, value);
        }
    }

    let command = PLACEHOLDER_REGEX
        .replace_all(pattern, |caps: &Captures| {
            resolved.get(&caps[0]).cloned().unwrap_or_default()
        })
        .into_owned();

    if prefix.is_empty() {
        Ok(command)
    } else {
        Ok(format!("{prefix} {command}"))
    }
}

fn resolve(
    placeholder: &Placeholder<'_>,
    pattern: &str,
    inputs: &HashMap<String, Arc<dyn Target>>,
    outputs: &HashMap<String, Arc<dyn Target>>,
    params: &HashMap<String, String>,
) -> Result<String, FormatError> {
    let name = placeholder.name;
    let value = match placeholder.kind {
        PortKind::Input => {
            let target = inputs.get(name).ok_or_else(|| FormatError::MissingInput {
                port: name.to_string(),
                command: pattern.to_string(),
            })?;
            if target.final_path().is_empty() {
                return Err(FormatError::EmptyInputPath {
                    port: name.to_string(),
                    command: pattern.to_string(),
                });
            }
            // A consumer reads from the pipe when its producer streams.
            if target.is_streaming() {
                target.fifo_path()
            } else {
                target.final_path()
            }
        }
        PortKind::Output | PortKind::StreamingOutput => {
            let target = outputs.get(name).ok_or_else(|| FormatError::MissingOutput {
                port: name.to_string(),
                command: pattern.to_string(),
            })?;
            if placeholder.kind == PortKind::Output {
                target.temp_path()
            } else {
                target.fifo_path()
            }
        }
        PortKind::Param => {
            let value = params.get(name).ok_or_else(|| FormatError::MissingParam {
                param: name.to_string(),
                command: pattern.to_string(),
            })?;
            if value.is_empty() {
                return Err(FormatError::EmptyParam {
                    param: name.to_string(),
                    command: pattern.to_string(),
                });
            }
            value.as_str()
        }
    };

    if value.is_empty() {
        return Err(FormatError::EmptyValue {
            token: placeholder.token.to_string(),
            command: pattern.to_string(),
        });
    }
    Ok(value.to_string())
}
