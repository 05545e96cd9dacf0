//! Link declarations.
//!
//! A link is declared either as a bare target name (`"tgt"`) or as an
//! object; the shorthand is exactly `{pv:"tgt"}` with every other key
//! defaulted.

use crate::{LinkError, LinkResult};
use serde::Deserialize;

/// Default monitor queue depth requested from the remote side.
pub const DEFAULT_QUEUE_DEPTH: u32 = 4;

/// Processing request carried by a link, with direction-dependent
/// meaning. For output links it asks the remote side about running
/// side effects on write; for input links it governs local
/// reprocessing on subscription updates (see
/// [`input_policy`](ProcessRequest::input_policy)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRequest {
    /// Server default (output); never reprocess (input).
    #[default]
    None,
    /// Ask the remote side to skip processing (output); reprocess only
    /// if the owning record's scan is passive (input).
    Skip,
    /// Ask the remote side to force processing (output); always
    /// reprocess (input).
    Force,
}

/// Input-side reprocessing policy derived from [`ProcessRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputProcPolicy {
    /// Subscription updates never reprocess the owning record.
    Never,
    /// Every subscription update reprocesses it.
    Always,
    /// Updates reprocess it only when its scan mode is passive.
    IfPassive,
}

impl ProcessRequest {
    /// The input-link interpretation of this request.
    #[must_use]
    pub fn input_policy(self) -> InputProcPolicy {
        match self {
            ProcessRequest::None => InputProcPolicy::Never,
            ProcessRequest::Force => InputProcPolicy::Always,
            ProcessRequest::Skip => InputProcPolicy::IfPassive,
        }
    }
}

/// Severity-propagation mode. Accepted and validated, but intentionally
/// inert at runtime: the maximize-severity behavior is a declared
/// non-goal of this engine, not an oversight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SevrMode {
    /// Do not propagate remote alarms.
    #[default]
    Off,
    /// Would always propagate.
    Always,
    /// Would propagate only INVALID severities.
    IfInvalid,
}

/// A parsed, validated remote link declaration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSpec {
    /// Target PV name.
    pub pv: String,
    /// Sub-field of the remote structure; empty selects the top level.
    #[serde(default)]
    pub field: String,
    /// Advisory monitor queue depth; the remote side may ignore it.
    #[serde(rename = "Q", default = "default_queue_depth")]
    pub queue_depth: u32,
    /// Processing request (direction-dependent, see [`ProcessRequest`]).
    #[serde(default)]
    pub proc: ProcessRequest,
    /// Severity propagation (validated, inert).
    #[serde(default)]
    pub sevr: SevrMode,
    /// Reprocessing order among consumers of the same remote source;
    /// lower values process first, ties by configuration order.
    #[serde(default)]
    pub monorder: i32,
    /// Accumulate writes into one batched remote put instead of putting
    /// immediately.
    #[serde(default)]
    pub defer: bool,
}

fn default_queue_depth() -> u32 {
    DEFAULT_QUEUE_DEPTH
}

impl LinkSpec {
    /// A declaration for a bare target with every option defaulted.
    #[must_use]
    pub fn shorthand(pv: impl Into<String>) -> Self {
        Self {
            pv: pv.into(),
            field: String::new(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            proc: ProcessRequest::default(),
            sevr: SevrMode::default(),
            monorder: 0,
            defer: false,
        }
    }

    /// Parses a declaration: a bare string or a full object.
    pub fn parse(decl: &serde_json::Value) -> LinkResult<Self> {
        match decl {
            serde_json::Value::String(pv) => Ok(Self::shorthand(pv)),
            serde_json::Value::Object(_) => serde_json::from_value(decl.clone())
                .map_err(|e| LinkError::BadConfig(e.to_string())),
            other => Err(LinkError::BadConfig(format!(
                "expected string or object, got {other}"
            ))),
        }
    }
}
