use std::fmt;

/// Opens a multi-line encapsulated payload
pub const BEGIN_ENCAP: &str = "%BeginEncap%";

/// Closes a multi-line encapsulated payload
pub const END_ENCAP: &str = "%EndEncap%";

/// Line prefix of unsolicited push notifications
pub const EVENT_PREFIX: &str = "EVENT";

/// Line prefix of query replies
pub const INDI_PREFIX: &str = "INDI";

/// Line prefix of acknowledgement echoes
pub const SET_PREFIX: &str = "SET";

/// Line prefix of device-reported errors
pub const ERROR_PREFIX: &str = "ERROR";

/// Target used for console-wide settings such as show profiles
pub const APP_CONTROL: &str = "AppControl";

/// Command verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Set,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Set => "SET",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Key(String),
    Pair(String, String),
}

/// Outbound command: `VERB target key[=value][, key[=value] ...]`
///
/// The line terminator is added when the command is queued, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    verb: Verb,
    target: String,
    params: Vec<Param>,
}

impl Command {
    /// Create a new command addressed at `target`
    pub fn new(verb: Verb, target: impl Into<String>) -> Self {
        Self {
            verb,
            target: target.into(),
            params: Vec::new(),
        }
    }

    /// Start a `GET` command
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Verb::Get, target)
    }

    /// Start a `SET` command
    pub fn set(target: impl Into<String>) -> Self {
        Self::new(Verb::Set, target)
    }

    /// Append a bare key (used by `GET`)
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.params.push(Param::Key(key.into()));
        self
    }

    /// Append a `key=value` pair (used by `SET`)
    pub fn with_value(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.push(Param::Pair(key.into(), value.to_string()));
        self
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether any key has been appended
    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb.as_str(), self.target)?;
        for (i, param) in self.params.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { ", " })?;
            match param {
                Param::Key(key) => f.write_str(key)?,
                Param::Pair(key, value) => write!(f, "{}={}", key, value)?,
            }
        }
        Ok(())
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        command.to_string()
    }
}

/// Credential line sent ahead of any other command when a password is configured
pub(crate) fn login_line(password: &str) -> String {
    format!("LOGIN {}", password)
}

/// Format a value the way the console expects ON/OFF switches
pub(crate) fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
