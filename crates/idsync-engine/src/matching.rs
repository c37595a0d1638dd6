//! Object matching.
//!
//! Computes the value a matching rule compares on and uses it to locate the
//! counterpart of a record: an unjoined staging record for a metaverse object
//! on the export side, or metaverse objects for a staging record on the
//! import side. Value computation never folds case; case-insensitive rules
//! fold only inside the repository lookup.

use tracing::{debug, instrument, warn};

use idsync_core::ids::{ConnectedSystemId, ConnectedSystemObjectTypeId, MetaverseObjectTypeId};
use idsync_core::model::{
    ConnectedSystemObject, MatchingSource, MatchingTarget, MetaverseObject, ObjectMatchingRule,
};
use idsync_core::value::AttributeValue;

use crate::error::{SyncError, SyncResult};
use crate::repository::SyncRepository;

/// A record a matching rule can read source values from.
pub trait MatchingRecord {
    /// Non-empty values for a matching source. Empty when the source refers
    /// to the other side of the join.
    fn matching_values(&self, source: &MatchingSource) -> Vec<&AttributeValue>;
}

impl MatchingRecord for MetaverseObject {
    fn matching_values(&self, source: &MatchingSource) -> Vec<&AttributeValue> {
        match source {
            MatchingSource::MetaverseAttribute(attr) => self.values(attr.id),
            MatchingSource::ConnectedSystemAttribute(_) => Vec::new(),
        }
    }
}

impl MatchingRecord for ConnectedSystemObject {
    fn matching_values(&self, source: &MatchingSource) -> Vec<&AttributeValue> {
        match source {
            MatchingSource::ConnectedSystemAttribute(attr) => self.values(attr.id),
            MatchingSource::MetaverseAttribute(_) => Vec::new(),
        }
    }
}

/// Value a record presents under a matching rule.
///
/// Absent when the rule has no sources or no target, or when the source
/// attribute is unset or empty. The value is returned exactly as stored.
#[must_use]
pub fn compute_matching_value<R: MatchingRecord>(
    record: &R,
    rule: &ObjectMatchingRule,
) -> Option<AttributeValue> {
    rule.target.as_ref()?;
    let source = rule.primary_source()?;
    record.matching_values(source).into_iter().next().cloned()
}

fn sorted(rules: &[ObjectMatchingRule]) -> Vec<&ObjectMatchingRule> {
    let mut ordered: Vec<&ObjectMatchingRule> = rules.iter().collect();
    ordered.sort_by_key(|r| r.order);
    ordered
}

/// Applies matching rules against the repository.
pub struct ObjectMatcher<'a> {
    repository: &'a dyn SyncRepository,
}

impl<'a> ObjectMatcher<'a> {
    #[must_use]
    pub fn new(repository: &'a dyn SyncRepository) -> Self {
        Self { repository }
    }

    /// Find the unjoined staging record a metaverse object should join.
    ///
    /// Rules are tried in order; the first rule yielding exactly one
    /// candidate wins. More than one candidate is an ambiguous match.
    #[instrument(skip(self, mvo, rules), fields(mvo_id = %mvo.id))]
    pub async fn find_connected_system_object(
        &self,
        mvo: &MetaverseObject,
        rules: &[ObjectMatchingRule],
        connected_system_id: ConnectedSystemId,
        object_type_id: ConnectedSystemObjectTypeId,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        for rule in sorted(rules) {
            rule.validate()?;
            let Some(MatchingTarget::ConnectedSystemAttribute(target)) = &rule.target else {
                warn!(rule_id = %rule.id, "Export matching rule does not target a connected system attribute");
                continue;
            };
            let Some(value) = compute_matching_value(mvo, rule) else {
                continue;
            };

            let candidates: Vec<ConnectedSystemObject> = self
                .repository
                .find_connected_system_objects_by_attribute(
                    connected_system_id,
                    object_type_id,
                    target.id,
                    &value,
                    rule.case_sensitive,
                )
                .await?
                .into_iter()
                .filter(|cso| !cso.is_joined())
                .collect();

            match candidates.len() {
                0 => continue,
                1 => {
                    debug!(rule_id = %rule.id, attribute = %target.name, "Matched connected system object");
                    return Ok(candidates.into_iter().next());
                }
                _ => {
                    return Err(SyncError::ambiguous_match(
                        target.name.clone(),
                        value.to_string(),
                        candidates.iter().map(|c| c.id.to_string()).collect(),
                    ));
                }
            }
        }
        Ok(None)
    }

    /// Find the metaverse object a staging record should join.
    #[instrument(skip(self, cso, rules), fields(cso_id = %cso.id))]
    pub async fn find_metaverse_object(
        &self,
        cso: &ConnectedSystemObject,
        rules: &[ObjectMatchingRule],
        metaverse_object_type_id: MetaverseObjectTypeId,
    ) -> SyncResult<Option<MetaverseObject>> {
        for rule in sorted(rules) {
            rule.validate()?;
            let Some(MatchingTarget::MetaverseAttribute(target)) = &rule.target else {
                warn!(rule_id = %rule.id, "Import matching rule does not target a metaverse attribute");
                continue;
            };
            let Some(value) = compute_matching_value(cso, rule) else {
                continue;
            };

            let candidates = self
                .repository
                .find_metaverse_objects_by_attribute(
                    metaverse_object_type_id,
                    target.id,
                    &value,
                    rule.case_sensitive,
                )
                .await?;

            match candidates.len() {
                0 => continue,
                1 => return Ok(candidates.into_iter().next()),
                _ => {
                    return Err(SyncError::ambiguous_match(
                        target.name.clone(),
                        value.to_string(),
                        candidates.iter().map(|m| m.id.to_string()).collect(),
                    ));
                }
            }
        }
        Ok(None)
    }
}
