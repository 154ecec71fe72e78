// Scan command value types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind tag of a scan command
///
/// The tag doubles as the XML element name of the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Comment,
    Move,
    Set,
    Wait,
    WaitFor,
    Log,
    Loop,
    Sequence,
    Parallel,
    Include,
}

impl CommandKind {
    /// All known kinds, in palette order
    pub const ALL: [CommandKind; 10] = [
        CommandKind::Comment,
        CommandKind::Move,
        CommandKind::Set,
        CommandKind::Wait,
        CommandKind::WaitFor,
        CommandKind::Log,
        CommandKind::Loop,
        CommandKind::Sequence,
        CommandKind::Parallel,
        CommandKind::Include,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::Comment => "comment",
            CommandKind::Move => "move",
            CommandKind::Set => "set",
            CommandKind::Wait => "wait",
            CommandKind::WaitFor => "wait_for",
            CommandKind::Log => "log",
            CommandKind::Loop => "loop",
            CommandKind::Sequence => "sequence",
            CommandKind::Parallel => "parallel",
            CommandKind::Include => "include",
        }
    }

    /// Look up a kind by its tag, `None` for tags this build does not know
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Comparison used by a conditional wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Comparison {
    Equals,
    Above,
    AtLeast,
    Below,
    AtMost,
    IncreaseBy,
    DecreaseBy,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::Equals => "EQUALS",
            Comparison::Above => "ABOVE",
            Comparison::AtLeast => "AT_LEAST",
            Comparison::Below => "BELOW",
            Comparison::AtMost => "AT_MOST",
            Comparison::IncreaseBy => "INCREASE_BY",
            Comparison::DecreaseBy => "DECREASE_BY",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let comparison = match text.trim() {
            "EQUALS" => Comparison::Equals,
            "ABOVE" => Comparison::Above,
            "AT_LEAST" => Comparison::AtLeast,
            "BELOW" => Comparison::Below,
            "AT_MOST" => Comparison::AtMost,
            "INCREASE_BY" => Comparison::IncreaseBy,
            "DECREASE_BY" => Comparison::DecreaseBy,
            _ => return None,
        };
        Some(comparison)
    }

    fn symbol(self) -> &'static str {
        match self {
            Comparison::Equals => "=",
            Comparison::Above => ">",
            Comparison::AtLeast => ">=",
            Comparison::Below => "<",
            Comparison::AtMost => "<=",
            Comparison::IncreaseBy => "+=",
            Comparison::DecreaseBy => "-=",
        }
    }
}

/// Value written by a `set` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(number) => write!(f, "{}", number),
            Value::Text(text) => write!(f, "\"{}\"", text),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

/// One executable step of a scan
///
/// Block commands (`Loop`, `Sequence`, `Parallel`) own an ordered body of
/// child commands, so a scan is a tree. An empty body is an empty `Vec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanCommand {
    Comment {
        text: String,
    },
    Move {
        device: String,
        value: f64,
    },
    Set {
        device: String,
        value: Value,
        /// Wait for the write to complete before continuing
        wait: bool,
    },
    Wait {
        seconds: f64,
    },
    WaitFor {
        device: String,
        comparison: Comparison,
        desired: f64,
        tolerance: f64,
        timeout: Option<f64>,
    },
    Log {
        message: String,
        devices: Vec<String>,
    },
    Loop {
        device: String,
        start: f64,
        end: f64,
        step: f64,
        body: Vec<ScanCommand>,
    },
    Sequence {
        body: Vec<ScanCommand>,
    },
    Parallel {
        body: Vec<ScanCommand>,
    },
    Include {
        path: String,
        macros: String,
    },
}

impl ScanCommand {
    pub fn comment(text: impl Into<String>) -> Self {
        ScanCommand::Comment { text: text.into() }
    }

    pub fn move_to(device: impl Into<String>, value: f64) -> Self {
        ScanCommand::Move {
            device: device.into(),
            value,
        }
    }

    pub fn set(device: impl Into<String>, value: impl Into<Value>) -> Self {
        ScanCommand::Set {
            device: device.into(),
            value: value.into(),
            wait: true,
        }
    }

    pub fn wait(seconds: f64) -> Self {
        ScanCommand::Wait { seconds }
    }

    pub fn wait_for(device: impl Into<String>, comparison: Comparison, desired: f64) -> Self {
        ScanCommand::WaitFor {
            device: device.into(),
            comparison,
            desired,
            tolerance: 0.1,
            timeout: None,
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        ScanCommand::Log {
            message: message.into(),
            devices: Vec::new(),
        }
    }

    pub fn log_devices<I, S>(message: impl Into<String>, devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScanCommand::Log {
            message: message.into(),
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }

    pub fn loop_over(
        device: impl Into<String>,
        start: f64,
        end: f64,
        step: f64,
        body: Vec<ScanCommand>,
    ) -> Self {
        ScanCommand::Loop {
            device: device.into(),
            start,
            end,
            step,
            body,
        }
    }

    pub fn sequence(body: Vec<ScanCommand>) -> Self {
        ScanCommand::Sequence { body }
    }

    pub fn parallel(body: Vec<ScanCommand>) -> Self {
        ScanCommand::Parallel { body }
    }

    pub fn include(path: impl Into<String>) -> Self {
        ScanCommand::Include {
            path: path.into(),
            macros: String::new(),
        }
    }

    pub fn kind(&self) -> CommandKind {
        match self {
            ScanCommand::Comment { .. } => CommandKind::Comment,
            ScanCommand::Move { .. } => CommandKind::Move,
            ScanCommand::Set { .. } => CommandKind::Set,
            ScanCommand::Wait { .. } => CommandKind::Wait,
            ScanCommand::WaitFor { .. } => CommandKind::WaitFor,
            ScanCommand::Log { .. } => CommandKind::Log,
            ScanCommand::Loop { .. } => CommandKind::Loop,
            ScanCommand::Sequence { .. } => CommandKind::Sequence,
            ScanCommand::Parallel { .. } => CommandKind::Parallel,
            ScanCommand::Include { .. } => CommandKind::Include,
        }
    }

    /// Child commands, empty for non-block kinds
    pub fn children(&self) -> &[ScanCommand] {
        match self {
            ScanCommand::Loop { body, .. }
            | ScanCommand::Sequence { body }
            | ScanCommand::Parallel { body } => body,
            _ => &[],
        }
    }

    /// Number of commands in this subtree, including `self`
    pub fn count(&self) -> usize {
        1 + self.children().iter().map(ScanCommand::count).sum::<usize>()
    }

    fn collect_devices<'a>(&'a self, devices: &mut BTreeSet<&'a str>) {
        match self {
            ScanCommand::Move { device, .. }
            | ScanCommand::Set { device, .. }
            | ScanCommand::WaitFor { device, .. }
            | ScanCommand::Loop { device, .. } => {
                devices.insert(device.as_str());
            }
            ScanCommand::Log {
                devices: logged, ..
            } => devices.extend(logged.iter().map(String::as_str)),
            _ => {}
        }
        for child in self.children() {
            child.collect_devices(devices);
        }
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanCommand::Comment { text } => write!(f, "Comment '{}'", text),
            ScanCommand::Move { device, value } => write!(f, "Move {} = {}", device, value),
            ScanCommand::Set {
                device,
                value,
                wait,
            } => {
                write!(f, "Set {} = {}", device, value)?;
                if !wait {
                    f.write_str(" (no wait)")?;
                }
                Ok(())
            }
            ScanCommand::Wait { seconds } => write!(f, "Wait {} s", seconds),
            ScanCommand::WaitFor {
                device,
                comparison,
                desired,
                tolerance,
                timeout,
            } => {
                write!(
                    f,
                    "Wait for {} {} {} (+-{})",
                    device,
                    comparison.symbol(),
                    desired,
                    tolerance
                )?;
                if let Some(timeout) = timeout {
                    write!(f, ", timeout {} s", timeout)?;
                }
                Ok(())
            }
            ScanCommand::Log { message, devices } if devices.is_empty() => {
                write!(f, "Log '{}'", message)
            }
            ScanCommand::Log { message, devices } => {
                write!(f, "Log '{}' [{}]", message, devices.join(", "))
            }
            ScanCommand::Loop {
                device,
                start,
                end,
                step,
                ..
            } => write!(f, "Loop {} = {} .. {} step {}", device, start, end, step),
            ScanCommand::Sequence { .. } => f.write_str("Sequence"),
            ScanCommand::Parallel { .. } => f.write_str("Parallel"),
            ScanCommand::Include { path, macros } if macros.is_empty() => {
                write!(f, "Include {}", path)
            }
            ScanCommand::Include { path, macros } => write!(f, "Include {} ({})", path, macros),
        }
    }
}

/// Total number of commands in a sequence, counting nested bodies
pub fn total_count(commands: &[ScanCommand]) -> usize {
    commands.iter().map(ScanCommand::count).sum()
}

/// Sorted, de-duplicated device names referenced anywhere in the sequence
pub fn devices(commands: &[ScanCommand]) -> Vec<String> {
    let mut devices = BTreeSet::new();
    for command in commands {
        command.collect_devices(&mut devices);
    }
    devices.into_iter().map(str::to_string).collect()
}

/// Render a sequence as an indented outline, one command per line
pub fn outline(commands: &[ScanCommand]) -> String {
    fn render(commands: &[ScanCommand], depth: usize, out: &mut String) {
        for command in commands {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&command.to_string());
            out.push('\n');
            render(command.children(), depth + 1, out);
        }
    }

    let mut out = String::new();
    render(commands, 0, &mut out);
    out
}
