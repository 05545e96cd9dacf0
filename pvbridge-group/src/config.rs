//! Per-record group declarations.
//!
//! A group definition is split among arbitrarily many backing records;
//! each record contributes a JSON snippet of the form
//! `{ "<group>": { "<field>": { ...attributes... } } }`. Group-scope
//! attributes (`+id`, `+meta`, `+atomic`) live under the special empty
//! field name. Declarations accumulate here in arrival order and are
//! merged by the compiler.

use crate::{GroupError, GroupResult};
use pvbridge_value::TimeTagMode;
use serde::Deserialize;
use std::collections::HashMap;

/// How a field's backing value maps into the composite structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    /// Value plus alarm/time metadata as a sub-structure.
    #[default]
    #[serde(alias = "")]
    Scalar,
    /// Value only, metadata dropped.
    Plain,
    /// Value placed as an open variant.
    Any,
    /// Alarm and time metadata only, no value.
    Meta,
    /// No data at all; a put processes the target record.
    Proc,
}

/// Raw attributes of one field entry as a record declares them.
///
/// The group-scope keys are only meaningful under the empty field name;
/// the compiler rejects nothing here so that conflicts can be reported
/// with both contributing records named.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldAttributes {
    /// Group-scope: top-level structural type identifier.
    #[serde(rename = "+id")]
    pub group_id: Option<String>,
    /// Group-scope: map worst-alarm/latest-time metadata to the top level.
    #[serde(rename = "+meta")]
    pub group_meta: Option<bool>,
    /// Group-scope: monitors coalesce per scan pass.
    #[serde(rename = "+atomic")]
    pub group_atomic: Option<bool>,

    /// Mapping kind, `scalar` when unspecified.
    #[serde(rename = "type", default)]
    pub mapping: MappingKind,
    /// Backing channel reference.
    pub channel: Option<String>,
    /// Per-field structural type identifier.
    pub id: Option<String>,
    /// `"*"`, `""`, or a comma-separated list of sibling field names.
    pub trigger: Option<String>,
    /// Presence makes the field put-eligible; ascending application order.
    pub putorder: Option<i32>,
}

/// One record's contribution to one group: ordered field entries.
#[derive(Debug, Clone)]
pub struct Contribution {
    /// The declaring record, for conflict reporting.
    pub record: String,
    /// The group name.
    pub group: String,
    /// Field entries in declaration order. The empty name carries
    /// group-scope attributes.
    pub fields: Vec<(String, FieldAttributes)>,
}

/// Accumulated declarations from all records, in load order.
#[derive(Debug, Clone, Default)]
pub struct GroupDeclarations {
    contributions: Vec<Contribution>,
}

impl GroupDeclarations {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one record's declaration snippet and appends its
    /// contributions. The snippet maps group names to field objects.
    pub fn add_record(&mut self, record: &str, decl: &serde_json::Value) -> GroupResult<()> {
        let groups = decl.as_object().ok_or_else(|| GroupError::BadDeclaration {
            record: record.to_string(),
            detail: "expected an object keyed by group name".to_string(),
        })?;

        for (group, fields_value) in groups {
            let fields_obj =
                fields_value
                    .as_object()
                    .ok_or_else(|| GroupError::BadDeclaration {
                        record: record.to_string(),
                        detail: format!("group {group:?}: expected an object keyed by field name"),
                    })?;

            let mut fields = Vec::with_capacity(fields_obj.len());
            for (field, attrs_value) in fields_obj {
                let attrs: FieldAttributes = serde_json::from_value(attrs_value.clone())
                    .map_err(|e| GroupError::BadDeclaration {
                        record: record.to_string(),
                        detail: format!("group {group:?}, field {field:?}: {e}"),
                    })?;
                fields.push((field.clone(), attrs));
            }

            self.contributions.push(Contribution {
                record: record.to_string(),
                group: group.clone(),
                fields,
            });
        }
        Ok(())
    }

    /// All contributions in load order.
    #[must_use]
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }
}

/// Parses per-channel timestamp tag configuration strings, validating
/// split points at load time.
pub fn parse_time_tags<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> GroupResult<HashMap<String, TimeTagMode>> {
    let mut tags = HashMap::new();
    for (channel, raw) in entries {
        let mode: TimeTagMode = raw.parse()?;
        tags.insert(channel.to_string(), mode);
    }
    Ok(tags)
}
