//! Date shifting
//!
//! Every date of one entity moves by the same number of days, derived from
//! the entity id and the shift key:
//!
//! ```text
//! offset = fold(bytes(entity_id + key), 0, |o, b| (o * 131 + b) mod (2R + 1)) - R
//! ```

use chrono::NaiveDate;
use zeroize::Zeroizing;

use super::redact::{self, RedactSettings};
use super::Outcome;
use crate::anonymization::compliance::SAFE_HARBOR_AGE_THRESHOLD;
use crate::anonymization::config::DateShiftScope;
use crate::anonymization::context::OperationKind;
use crate::domain::{classify, NodeId, PartialDate, RecordTree, Result, Scalar, ValueKind, VeilError};

/// Resolved date-shift settings
#[derive(Clone)]
pub struct DateShiftSettings {
    pub key: Zeroizing<String>,
    pub range: i64,
    pub scope: DateShiftScope,
    /// Redaction policy for dates that cannot be shifted
    pub partial_dates: bool,
}

impl std::fmt::Debug for DateShiftSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DateShiftSettings")
            .field("key", &"[REDACTED]")
            .field("range", &self.range)
            .field("scope", &self.scope)
            .field("partial_dates", &self.partial_dates)
            .finish()
    }
}

/// Day offset in `[-range, range]` for an entity
pub fn offset_days(entity_id: &str, key: &str, range: i64) -> i64 {
    let modulus = 2 * range + 1;
    let offset = entity_id
        .bytes()
        .chain(key.bytes())
        .fold(0i64, |offset, byte| (offset * 131 + i64::from(byte)) % modulus);
    offset - range
}

/// Shifts a date node, or redacts it when shifting would keep identifying precision
pub fn shift(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &DateShiftSettings,
    entity_id: &str,
    today: NaiveDate,
) -> Result<Outcome> {
    let ValueKind::Date(style) = classify(&tree.node(node).type_name) else {
        return Ok(Outcome::unchanged());
    };
    let Some(value) = tree.value(node) else {
        return Ok(Outcome::unchanged());
    };

    let date = PartialDate::parse(&value.to_text(), style)?;
    if !date.has_day() {
        return redact_unshiftable(tree, node, settings, today);
    }

    let entity = match settings.scope {
        DateShiftScope::Record => entity_id,
        DateShiftScope::Global => "",
    };
    let days = offset_days(entity, &settings.key, settings.range);
    let shifted = date
        .shifted(days)
        .ok_or_else(|| VeilError::format(format!("date '{}' cannot be shifted", date.render())))?;

    if shifted.age_on(today) > SAFE_HARBOR_AGE_THRESHOLD {
        tree.set_value(node, None);
        return Ok(Outcome::changed(OperationKind::Redacted));
    }

    tree.set_value(node, Some(Scalar::String(shifted.render())));
    Ok(Outcome::changed(OperationKind::DateShifted))
}

/// Redacts a date without day precision under the partial-dates policy
fn redact_unshiftable(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &DateShiftSettings,
    today: NaiveDate,
) -> Result<Outcome> {
    let policy = RedactSettings {
        partial_dates: settings.partial_dates,
        ..Default::default()
    };
    let outcome = redact::redact(tree, node, &policy, today)?;
    // a year-only date already is its partial form
    if outcome.kind.is_none() && tree.value(node).is_some() {
        return Ok(Outcome::changed(OperationKind::PartiallyRedacted));
    }
    Ok(outcome)
}
