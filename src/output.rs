//! Shared output formatting for taskorder CLI commands.
//!
//! Every command prints either a JSON envelope (`--json`) or a short human
//! report: a header line followed by optional Summary, Items, Details,
//! Warnings and Next steps blocks.

use serde::Serialize;

use crate::allocator::Placement;
use crate::error::{Error, Result};
use crate::item::{OrderedItem, Scope};
use crate::trigger::RebalanceReason;

pub const SCHEMA_VERSION: &str = "taskorder.v1";

#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone)]
pub struct HumanOutput {
    header: String,
    summary: Vec<(String, String)>,
    rows: Vec<String>,
    details: Vec<String>,
    warnings: Vec<String>,
    next_steps: Vec<String>,
}

impl HumanOutput {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            summary: Vec::new(),
            rows: Vec::new(),
            details: Vec::new(),
            warnings: Vec::new(),
            next_steps: Vec::new(),
        }
    }

    pub fn push_summary(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.summary.push((key.into(), value.into()));
    }

    /// Append one item to the numbered Items block
    ///
    /// Children are indented one level below their list's top level.
    pub fn push_item_row(&mut self, item: &OrderedItem) {
        let indent = if item.scope.parent_id.is_some() { "  " } else { "" };
        let number = self.rows.len() + 1;
        self.rows.push(format!(
            "{number:>3}. {indent}{:>11}  {}  {}",
            item.position, item.id, item.title
        ));
    }

    pub fn push_detail(&mut self, value: impl Into<String>) {
        self.details.push(value.into());
    }

    pub fn push_warning(&mut self, value: impl Into<String>) {
        self.warnings.push(value.into());
    }

    pub fn push_next_step(&mut self, value: impl Into<String>) {
        self.next_steps.push(value.into());
    }

    /// Title, scope and position of a single item
    pub fn push_item_summary(&mut self, item: &OrderedItem) {
        self.push_summary("title", item.title.clone());
        self.push_summary("scope", item.scope.to_string());
        self.push_summary("position", item.position.to_string());
    }
}

#[derive(Serialize)]
struct SuccessEnvelope<'a, T: Serialize> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    data: &'a T,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    warnings: &'a [String],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    next_steps: &'a [String],
}

pub fn emit_success<T: Serialize>(
    options: OutputOptions,
    command: &str,
    data: &T,
    human: Option<&HumanOutput>,
) -> Result<()> {
    if options.json {
        let payload = SuccessEnvelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "success",
            data,
            warnings: human.map(|h| h.warnings.as_slice()).unwrap_or_default(),
            next_steps: human.map(|h| h.next_steps.as_slice()).unwrap_or_default(),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if options.quiet {
        return Ok(());
    }

    if let Some(human) = human {
        println!("{}", format_human(human));
    }

    Ok(())
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: i32,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    schema_version: &'static str,
    command: &'a str,
    status: &'static str,
    error: ErrorBody,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    next_steps: Vec<String>,
}

pub fn emit_error(command: &str, err: &Error, json: bool) -> Result<()> {
    let next_steps = error_next_steps(err);

    if json {
        let payload = ErrorEnvelope {
            schema_version: SCHEMA_VERSION,
            command,
            status: "error",
            error: ErrorBody {
                message: err.to_string(),
                code: err.exit_code(),
                kind: error_kind(err),
                details: err.details(),
            },
            next_steps,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    eprintln!("error: {err}");
    if let Some(hint) = next_steps.first() {
        eprintln!("hint: {hint}");
    }
    Ok(())
}

pub fn format_human(output: &HumanOutput) -> String {
    let mut lines = vec![output.header.clone()];

    if !output.summary.is_empty() {
        lines.push(String::new());
        lines.push("Summary:".to_string());
        for (key, value) in &output.summary {
            if value.is_empty() {
                lines.push(format!("- {key}"));
            } else {
                lines.push(format!("- {key}: {value}"));
            }
        }
    }

    if !output.rows.is_empty() {
        lines.push(String::new());
        lines.push("Items:".to_string());
        lines.extend(output.rows.iter().cloned());
    }

    push_section(&mut lines, "Details", &output.details);
    push_section(&mut lines, "Warnings", &output.warnings);
    push_section(&mut lines, "Next steps", &output.next_steps);

    lines.join("\n")
}

fn push_section(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push(format!("{title}:"));
    lines.extend(items.iter().map(|item| format!("- {item}")));
}

/// `--list L [--parent P]` flags that select `scope`
pub fn scope_flags(scope: &Scope) -> String {
    match &scope.parent_id {
        Some(parent) => format!("--list {} --parent {parent}", scope.list_id),
        None => format!("--list {}", scope.list_id),
    }
}

pub fn placement_label(placement: &Placement) -> String {
    match placement {
        Placement::Seed => "first in scope".to_string(),
        Placement::BeforeFirst { min } => format!("before first ({min})"),
        Placement::Between { target, next } => format!("between {target} and {next}"),
        Placement::Crowded { target, next } => format!("crowded between {target} and {next}"),
        Placement::AfterLast { target } => format!("after last ({target})"),
        Placement::End { max } => format!("end ({max})"),
    }
}

pub fn reason_label(reason: &RebalanceReason) -> String {
    match reason {
        RebalanceReason::MinGap { gap } => format!("min gap {gap}"),
        RebalanceReason::HighWater { max } => format!("max position {max}"),
    }
}

/// First positional argument, skipping flags and the `--root` value
pub fn infer_command_name_from_args() -> String {
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        if arg == "--root" {
            args.next();
            continue;
        }
        if !arg.starts_with('-') {
            return arg;
        }
    }

    "taskorder".to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err.exit_code() {
        2 => "user_error",
        3 => "hierarchy_rejected",
        _ => "operation_failed",
    }
}

fn error_next_steps(err: &Error) -> Vec<String> {
    let step = match err {
        Error::NotInitialized(_) => "taskorder init".to_string(),
        Error::InvalidConfig(_) => "fix .taskorder.toml then retry".to_string(),
        Error::ItemNotFound(_) => "taskorder ls --all --list <list>".to_string(),
        Error::Cycle { .. } | Error::SelfReference { .. } => {
            "pick a parent outside the item's own subtree".to_string()
        }
        Error::HasKeptChildren { item_id, .. } => {
            format!("taskorder ls --list <list> --parent {item_id}")
        }
        Error::LockFailed(_) => "retry once the other writer finishes".to_string(),
        Error::StaleRecord { item_id, .. } => {
            format!("re-run the command; {item_id} changed underneath it")
        }
        _ => return Vec::new(),
    };
    vec![step]
}
