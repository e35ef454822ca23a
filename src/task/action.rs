//! Typed action payloads for agent steps.
//!
//! Every step carries exactly one `Action`; dispatch is an exhaustive match
//! on the closed enum rather than a string switch. `ActionKind` is the
//! `Copy` discriminant used as the executor-registry key.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

static DANGEROUS_COMMAND_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Command fragments that are never run without explicit human approval.
fn dangerous_command_pattern() -> &'static Regex {
    DANGEROUS_COMMAND_PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)(rm\s+-rf\s+/|format\s+[a-z]:|mkfs|dd\s+if=\S+\s+of=/dev/|del\s+/[sq]|drop\s+(table|database)|git\s+push\s+\S*\s*--force)",
        )
        .unwrap()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ReadFile {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        content: String,
    },
    EditFile {
        path: PathBuf,
        find: String,
        replace: String,
    },
    DeleteFile {
        path: PathBuf,
    },
    CreateDirectory {
        path: PathBuf,
    },
    RunCommand {
        command: String,
    },
    Search {
        query: String,
    },
    Analyze {
        target: String,
    },
    GenerateCode {
        prompt: String,
        #[serde(default)]
        target: Option<PathBuf>,
    },
    RunTests {
        #[serde(default)]
        filter: Option<String>,
    },
    Commit {
        message: String,
    },
    Custom {
        name: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::ReadFile { .. } => ActionKind::ReadFile,
            Self::WriteFile { .. } => ActionKind::WriteFile,
            Self::EditFile { .. } => ActionKind::EditFile,
            Self::DeleteFile { .. } => ActionKind::DeleteFile,
            Self::CreateDirectory { .. } => ActionKind::CreateDirectory,
            Self::RunCommand { .. } => ActionKind::RunCommand,
            Self::Search { .. } => ActionKind::Search,
            Self::Analyze { .. } => ActionKind::Analyze,
            Self::GenerateCode { .. } => ActionKind::GenerateCode,
            Self::RunTests { .. } => ActionKind::RunTests,
            Self::Commit { .. } => ActionKind::Commit,
            Self::Custom { .. } => ActionKind::Custom,
        }
    }

    /// Destructive actions always require human approval, regardless of
    /// what plan elaboration claimed.
    pub fn is_destructive(&self) -> bool {
        match self {
            Self::DeleteFile { .. } | Self::Commit { .. } => true,
            Self::RunCommand { command } => dangerous_command_pattern().is_match(command),
            _ => false,
        }
    }

    /// Actions whose outcome is hard to predict up front.
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::GenerateCode { .. } | Self::Analyze { .. })
    }

    /// Actions that mutate the working tree and are recorded for rollback.
    pub fn is_edit(&self) -> bool {
        matches!(
            self,
            Self::WriteFile { .. }
                | Self::EditFile { .. }
                | Self::DeleteFile { .. }
                | Self::CreateDirectory { .. }
        )
    }

    pub fn has_missing_params(&self) -> bool {
        match self {
            Self::ReadFile { path }
            | Self::WriteFile { path, .. }
            | Self::EditFile { path, .. }
            | Self::DeleteFile { path }
            | Self::CreateDirectory { path } => path.as_os_str().is_empty(),
            Self::RunCommand { command } => command.trim().is_empty(),
            Self::Search { query } => query.trim().is_empty(),
            Self::Analyze { target } => target.trim().is_empty(),
            Self::GenerateCode { prompt, .. } => prompt.trim().is_empty(),
            Self::Commit { message } => message.trim().is_empty(),
            Self::Custom { name, .. } => name.trim().is_empty(),
            Self::RunTests { .. } => false,
        }
    }

    /// The filesystem path this action targets, when it has one.
    pub fn target_path(&self) -> Option<&Path> {
        match self {
            Self::ReadFile { path }
            | Self::WriteFile { path, .. }
            | Self::EditFile { path, .. }
            | Self::DeleteFile { path }
            | Self::CreateDirectory { path } => Some(path),
            Self::GenerateCode { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ReadFile,
    WriteFile,
    EditFile,
    DeleteFile,
    CreateDirectory,
    RunCommand,
    Search,
    Analyze,
    GenerateCode,
    RunTests,
    Commit,
    Custom,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::DeleteFile => "delete_file",
            Self::CreateDirectory => "create_directory",
            Self::RunCommand => "run_command",
            Self::Search => "search",
            Self::Analyze => "analyze",
            Self::GenerateCode => "generate_code",
            Self::RunTests => "run_tests",
            Self::Commit => "commit",
            Self::Custom => "custom",
        };
        write!(f, "{}", name)
    }
}
