//! Schema compiler.
//!
//! Merges every record's contributions into one validated, immutable
//! schema per group name. Each group compiles independently: a conflict
//! in one group never poisons another.

use crate::config::{GroupDeclarations, MappingKind};
use crate::{GroupError, GroupResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Compiled trigger set of one field, with sibling references resolved
/// to indices into the schema's field array (no back-pointers, no
/// lifetime coupling to the owning schema).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Changes to this field never post a monitor update.
    Ignore,
    /// Changes to this field post the full composite snapshot.
    All,
    /// Changes to the named sibling fields (by index) post the snapshot.
    Fields(Vec<usize>),
}

/// One compiled field mapping.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name, unique within the group.
    pub name: String,
    /// How the backing value maps into the composite.
    pub mapping: MappingKind,
    /// Backing channel reference.
    pub channel: String,
    /// Optional per-field structural type identifier.
    pub type_id: Option<String>,
    /// Compiled trigger set.
    pub trigger: Trigger,
    /// Ascending put application priority; `None` means not writable.
    pub put_order: Option<i32>,
}

/// A validated, immutable group schema.
#[derive(Debug, Clone)]
pub struct GroupSchema {
    /// Group name; also the externally visible PV name.
    pub name: String,
    /// Optional top-level structural type identifier.
    pub type_id: Option<String>,
    /// Whether worst-alarm/latest-time metadata maps to the top level.
    pub meta_to_top: bool,
    /// Whether monitors coalesce per scan pass.
    pub atomic: bool,
    /// Field mappings in declaration order.
    pub fields: Vec<FieldDef>,
    /// Precomputed: does a change to field `i` post a snapshot?
    post_on_change: Vec<bool>,
    /// Put-eligible field indices, ascending (putorder, declaration).
    put_sequence: Vec<usize>,
}

impl GroupSchema {
    /// Index of a field by name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Whether a change to the field at `index` posts a monitor update.
    ///
    /// A field's own trigger set governs its changes: `All` and any
    /// non-empty explicit set post, `Ignore` suppresses.
    #[must_use]
    pub fn change_triggers_post(&self, index: usize) -> bool {
        self.post_on_change.get(index).copied().unwrap_or(false)
    }

    /// Put-eligible field indices in application order: ascending
    /// put-order, ties broken by declaration order.
    #[must_use]
    pub fn put_sequence(&self) -> &[usize] {
        &self.put_sequence
    }
}

/// Result of compiling all declarations: per-group success or failure.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    /// Successfully compiled schemas by group name.
    pub schemas: BTreeMap<String, Arc<GroupSchema>>,
    /// Groups that failed validation, with the reason.
    pub failures: BTreeMap<String, GroupError>,
}

/// Compiles accumulated declarations into immutable schemas.
pub fn compile(decls: &GroupDeclarations) -> CompileOutcome {
    // Preserve first-appearance order of group names.
    let mut group_order: Vec<String> = Vec::new();
    for c in decls.contributions() {
        if !group_order.contains(&c.group) {
            group_order.push(c.group.clone());
        }
    }

    let mut outcome = CompileOutcome::default();
    for group in group_order {
        match compile_group(&group, decls) {
            Ok(schema) => {
                debug!(group = %schema.name, fields = schema.fields.len(), "compiled group schema");
                outcome.schemas.insert(group, Arc::new(schema));
            }
            Err(e) => {
                warn!(group = %group, error = %e, "group failed to compile");
                outcome.failures.insert(group, e);
            }
        }
    }
    outcome
}

fn compile_group(group: &str, decls: &GroupDeclarations) -> GroupResult<GroupSchema> {
    let mut type_id: Option<(String, String)> = None; // (value, declaring record)
    let mut atomic: Option<(bool, String)> = None;
    let mut meta_to_top = false;

    // (name, attrs, record) in declaration order across contributions.
    let mut raw_fields: Vec<(String, crate::config::FieldAttributes, String)> = Vec::new();

    for c in decls.contributions().iter().filter(|c| c.group == group) {
        for (name, attrs) in &c.fields {
            if name.is_empty() {
                if let Some(id) = &attrs.group_id {
                    match &type_id {
                        Some((existing, first_record)) if existing != id => {
                            return Err(GroupError::SchemaConflict {
                                group: group.to_string(),
                                detail: format!(
                                    "+id {existing:?} from record {first_record} vs {id:?} from record {}",
                                    c.record
                                ),
                            });
                        }
                        Some(_) => {}
                        None => type_id = Some((id.clone(), c.record.clone())),
                    }
                }
                if let Some(a) = attrs.group_atomic {
                    match &atomic {
                        Some((existing, first_record)) if *existing != a => {
                            return Err(GroupError::SchemaConflict {
                                group: group.to_string(),
                                detail: format!(
                                    "+atomic {existing} from record {first_record} vs {a} from record {}",
                                    c.record
                                ),
                            });
                        }
                        Some(_) => {}
                        None => atomic = Some((a, c.record.clone())),
                    }
                }
                if attrs.group_meta == Some(true) {
                    meta_to_top = true;
                }
                continue;
            }

            if raw_fields.iter().any(|(n, _, _)| n == name) {
                return Err(GroupError::DuplicateField {
                    group: group.to_string(),
                    field: name.clone(),
                });
            }
            raw_fields.push((name.clone(), attrs.clone(), c.record.clone()));
        }
    }

    // Resolve attributes into field definitions.
    let names: Vec<&str> = raw_fields.iter().map(|(n, _, _)| n.as_str()).collect();
    let mut fields = Vec::with_capacity(raw_fields.len());
    for (name, attrs, _record) in &raw_fields {
        let channel = attrs
            .channel
            .clone()
            .ok_or_else(|| GroupError::MissingChannel {
                group: group.to_string(),
                field: name.clone(),
            })?;

        let trigger = match attrs.trigger.as_deref() {
            None | Some("") => Trigger::Ignore,
            Some("*") => Trigger::All,
            Some(list) => {
                let mut indices = Vec::new();
                for entry in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    let idx = names.iter().position(|n| *n == entry).ok_or_else(|| {
                        GroupError::UnknownTriggerField {
                            group: group.to_string(),
                            field: name.clone(),
                            trigger: entry.to_string(),
                        }
                    })?;
                    indices.push(idx);
                }
                Trigger::Fields(indices)
            }
        };

        fields.push(FieldDef {
            name: name.clone(),
            mapping: attrs.mapping,
            channel,
            type_id: attrs.id.clone(),
            trigger,
            put_order: attrs.putorder,
        });
    }

    // A change to a field posts when its own trigger set is non-empty;
    // the set names what the update covers, not who else fires.
    let post_on_change: Vec<bool> = fields
        .iter()
        .map(|f| match &f.trigger {
            Trigger::Ignore => false,
            Trigger::All => true,
            Trigger::Fields(set) => !set.is_empty(),
        })
        .collect();

    // Ascending put-order, stable over declaration order.
    let mut put_sequence: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.put_order.is_some())
        .map(|(i, _)| i)
        .collect();
    put_sequence.sort_by_key(|&i| (fields[i].put_order.unwrap_or(0), i));

    Ok(GroupSchema {
        name: group.to_string(),
        type_id: type_id.map(|(v, _)| v),
        meta_to_top,
        atomic: atomic.map(|(v, _)| v).unwrap_or(false),
        fields,
        post_on_change,
        put_sequence,
    })
}
