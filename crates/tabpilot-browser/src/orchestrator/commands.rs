//! Command surface: descriptors, outcomes, and the per-command policy
//! table.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

/// A requested action, by name, with raw arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// What a command run hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Plain text result.
    Text(String),
    /// Binary image plus companion text.
    ImageText { image: Vec<u8>, text: String },
    /// Caller-facing failure.
    Error(String),
}

impl ToolOutcome {
    pub fn error(message: impl std::fmt::Display) -> Self {
        ToolOutcome::Error(message.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }

    /// The textual part of any outcome.
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Text(t) => t,
            ToolOutcome::ImageText { text, .. } => text,
            ToolOutcome::Error(t) => t,
        }
    }
}

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const NAVIGATION_TIMEOUT_MS: u64 = 60_000;

/// Retry and deadline policy for one command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub timeout_ms: u64,
    pub retries: u32,
    /// Failed navigation-class commands roll back to their checkpoint.
    pub navigation_class: bool,
}

impl CommandSpec {
    const fn action(name: &'static str, retries: u32) -> Self {
        Self {
            name,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries,
            navigation_class: false,
        }
    }

    const fn navigation(name: &'static str) -> Self {
        Self {
            name,
            timeout_ms: NAVIGATION_TIMEOUT_MS,
            retries: 1,
            navigation_class: true,
        }
    }
}

const STANDARD_COMMANDS: &[CommandSpec] = &[
    CommandSpec::action("click", 3),
    CommandSpec::action("fill", 3),
    CommandSpec::action("press_key", 1),
    CommandSpec::action("drag", 1),
    CommandSpec::action("hover", 1),
    CommandSpec::navigation("navigate"),
    CommandSpec::navigation("go_back"),
    CommandSpec::navigation("go_forward"),
    CommandSpec::navigation("reload"),
    CommandSpec::action("open_tab", 1),
    CommandSpec::action("close_tab", 1),
    CommandSpec::action("list_tabs", 1),
    CommandSpec::action("select_tab", 1),
    CommandSpec {
        name: "snapshot",
        timeout_ms: NAVIGATION_TIMEOUT_MS,
        retries: 1,
        navigation_class: false,
    },
    CommandSpec::action("screenshot", 1),
];

/// Known commands, keyed by name.
pub struct CommandTable {
    by_name: HashMap<&'static str, CommandSpec>,
}

impl CommandTable {
    /// The standard command set.
    pub fn standard() -> Self {
        let mut by_name = HashMap::with_capacity(STANDARD_COMMANDS.len());
        for spec in STANDARD_COMMANDS {
            let previous = by_name.insert(spec.name, *spec);
            assert!(previous.is_none(), "duplicate command: {}", spec.name);
        }
        Self { by_name }
    }

    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

// ----------------------------------------------------------------------
// Per-command arguments
// ----------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ClickArgs {
    pub uid: String,
    #[serde(default)]
    pub double: bool,
}

#[derive(Debug, Deserialize)]
pub struct FillArgs {
    pub uid: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct PressKeyArgs {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct DragArgs {
    pub from_uid: String,
    pub to_uid: String,
}

#[derive(Debug, Deserialize)]
pub struct HoverArgs {
    pub uid: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenTabArgs {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TabIdArgs {
    pub target_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SnapshotArgs {
    #[serde(default)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_lookup() {
        let table = CommandTable::standard();
        assert!(table.get("click").is_some());
        assert!(table.get("warp_drive").is_none());

        let click = table.get("click").unwrap();
        assert_eq!(click.retries, 3);
        assert!(!click.navigation_class);

        let navigate = table.get("navigate").unwrap();
        assert!(navigate.navigation_class);
        assert!(navigate.timeout_ms > click.timeout_ms);
    }

    #[test]
    fn test_descriptor_parses_with_default_args() {
        let d: ActionDescriptor = serde_json::from_str(r#"{"name": "list_tabs"}"#).unwrap();
        assert_eq!(d.name, "list_tabs");
        assert!(d.args.is_null());
    }

    #[test]
    fn test_outcome_text_access() {
        assert_eq!(ToolOutcome::Text("ok".into()).text(), "ok");
        assert!(ToolOutcome::error("nope").is_error());
    }
}
