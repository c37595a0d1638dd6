//! No-net-change detection.
//!
//! A change the staging record already reflects is never queued. The same
//! comparison confirms exported changes during reconciliation.

use idsync_core::model::{AttributeChangeType, PendingExportAttributeValueChange};
use idsync_core::value::AttributeValue;

/// Whether the current values already reflect `change`.
///
/// Comparison is exact. A clearing Update is current only when no value is
/// present.
#[must_use]
pub fn is_already_current(
    change: &PendingExportAttributeValueChange,
    current_values: &[&AttributeValue],
) -> bool {
    is_current_with_substitute(change, current_values, None)
}

/// As [`is_already_current`], but a clear is also current when the only live
/// value is the substitute the connected system writes in place of an empty
/// value.
#[must_use]
pub fn is_current_with_substitute(
    change: &PendingExportAttributeValueChange,
    current_values: &[&AttributeValue],
    substitute: Option<&AttributeValue>,
) -> bool {
    let holds_only_substitute = || match (substitute, current_values) {
        (Some(substitute), [only]) => *only == substitute,
        _ => false,
    };

    match change.change_type {
        AttributeChangeType::Update => match &change.value {
            Some(intended) => matches!(current_values, [only] if *only == intended),
            None => current_values.is_empty() || holds_only_substitute(),
        },
        AttributeChangeType::Add => match &change.value {
            Some(intended) => current_values.contains(&intended),
            None => true,
        },
        AttributeChangeType::Remove => match &change.value {
            Some(intended) => !current_values.contains(&intended),
            None => true,
        },
        AttributeChangeType::RemoveAll => current_values.is_empty() || holds_only_substitute(),
    }
}
