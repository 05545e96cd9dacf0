//! Composite snapshot assembly.

use crate::config::MappingKind;
use crate::schema::GroupSchema;
use pvbridge_value::{Alarm, FieldReading, Timestamp, Value};
use serde::Serialize;

/// A field's contribution to the composite, shaped by its mapping kind.
/// `proc` fields contribute nothing and are absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MappedOutput {
    /// Value with alarm/time metadata.
    Scalar {
        value: Value,
        alarm: Alarm,
        time: Timestamp,
    },
    /// Value only.
    Plain { value: Value },
    /// Value as an open variant.
    Any { value: Value },
    /// Metadata only.
    Meta { alarm: Alarm, time: Timestamp },
}

/// One named entry of a composite snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldOutput {
    /// Field name within the group.
    pub name: String,
    /// The mapped contribution.
    pub output: MappedOutput,
}

/// An atomically-observable snapshot of the whole group.
///
/// When the schema maps metadata to the top level, `alarm` is the worst
/// severity among contributing fields (ties keep the earliest declared
/// contributor; the precise tie-break is deliberately loose in this
/// domain) and `time` is the latest contributing timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSnapshot {
    /// Group name.
    pub group: String,
    /// Top-level structural type identifier, when declared.
    pub type_id: Option<String>,
    /// Top-level alarm; present only with the group meta flag.
    pub alarm: Option<Alarm>,
    /// Top-level timestamp; present only with the group meta flag.
    pub time: Option<Timestamp>,
    /// Field contributions in declaration order.
    pub fields: Vec<FieldOutput>,
}

impl GroupSnapshot {
    /// Assembles a snapshot from the current per-field readings.
    /// `readings` is indexed like `schema.fields`.
    #[must_use]
    pub fn assemble(schema: &GroupSchema, readings: &[FieldReading]) -> Self {
        let mut fields = Vec::with_capacity(schema.fields.len());
        let mut worst = Alarm::none();
        let mut latest = Timestamp::default();

        for (def, reading) in schema.fields.iter().zip(readings) {
            if def.mapping != MappingKind::Proc {
                worst = worst.worst(&reading.alarm);
                latest = latest.max(reading.time);
            }
            let output = match def.mapping {
                MappingKind::Scalar => MappedOutput::Scalar {
                    value: reading.value.clone(),
                    alarm: reading.alarm.clone(),
                    time: reading.time,
                },
                MappingKind::Plain => MappedOutput::Plain {
                    value: reading.value.clone(),
                },
                MappingKind::Any => MappedOutput::Any {
                    value: reading.value.clone(),
                },
                MappingKind::Meta => MappedOutput::Meta {
                    alarm: reading.alarm.clone(),
                    time: reading.time,
                },
                MappingKind::Proc => continue,
            };
            fields.push(FieldOutput {
                name: def.name.clone(),
                output,
            });
        }

        Self {
            group: schema.name.clone(),
            type_id: schema.type_id.clone(),
            alarm: schema.meta_to_top.then_some(worst),
            time: schema.meta_to_top.then_some(latest),
            fields,
        }
    }

    /// Looks up a field contribution by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&MappedOutput> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.output)
    }
}
