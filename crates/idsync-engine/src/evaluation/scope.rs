//! Scoping criteria evaluation.
//!
//! Root groups are combined with AND. A rule with no groups is in scope for
//! every metaverse object of its type.

use std::cmp::Ordering;

use idsync_core::model::{ComparisonType, GroupLogic, MetaverseObject, ScopingCriteriaGroup, ScopingCriterion};
use idsync_core::value::AttributeValue;

/// Whether a metaverse object satisfies every root scoping group.
#[must_use]
pub fn is_in_scope(mvo: &MetaverseObject, groups: &[ScopingCriteriaGroup]) -> bool {
    groups.iter().all(|group| evaluate_group(mvo, group))
}

fn evaluate_group(mvo: &MetaverseObject, group: &ScopingCriteriaGroup) -> bool {
    let mut results = group
        .criteria
        .iter()
        .map(|criterion| evaluate_criterion(mvo, criterion))
        .chain(group.child_groups.iter().map(|child| evaluate_group(mvo, child)))
        .peekable();

    // An empty group places no restriction.
    if results.peek().is_none() {
        return true;
    }

    match group.logic {
        GroupLogic::All => results.all(|r| r),
        GroupLogic::Any => results.any(|r| r),
    }
}

fn evaluate_criterion(mvo: &MetaverseObject, criterion: &ScopingCriterion) -> bool {
    let values = mvo.values(criterion.attribute.id);

    match criterion.comparison {
        ComparisonType::IsPresent => return !values.is_empty(),
        ComparisonType::IsNotPresent => return values.is_empty(),
        _ => {}
    }

    let Some(operand) = criterion.value.as_ref() else {
        return false;
    };

    if criterion.comparison == ComparisonType::NotEquals {
        return !values
            .iter()
            .any(|v| v.matches(operand, criterion.case_sensitive));
    }

    values
        .iter()
        .any(|v| compare(v, operand, criterion.comparison, criterion.case_sensitive))
}

fn compare(
    value: &AttributeValue,
    operand: &AttributeValue,
    comparison: ComparisonType,
    case_sensitive: bool,
) -> bool {
    match comparison {
        ComparisonType::Equals => value.matches(operand, case_sensitive),
        ComparisonType::StartsWith | ComparisonType::EndsWith | ComparisonType::Contains => {
            let (Some(haystack), Some(needle)) = (value.as_string(), operand.as_string()) else {
                return false;
            };
            let (haystack, needle) = if case_sensitive {
                (haystack.to_string(), needle.to_string())
            } else {
                (haystack.to_lowercase(), needle.to_lowercase())
            };
            match comparison {
                ComparisonType::StartsWith => haystack.starts_with(&needle),
                ComparisonType::EndsWith => haystack.ends_with(&needle),
                _ => haystack.contains(&needle),
            }
        }
        ComparisonType::LessThan
        | ComparisonType::LessThanOrEquals
        | ComparisonType::GreaterThan
        | ComparisonType::GreaterThanOrEquals => {
            let Some(ordering) = order(value, operand) else {
                return false;
            };
            match comparison {
                ComparisonType::LessThan => ordering == Ordering::Less,
                ComparisonType::LessThanOrEquals => ordering != Ordering::Greater,
                ComparisonType::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        ComparisonType::NotEquals | ComparisonType::IsPresent | ComparisonType::IsNotPresent => {
            false
        }
    }
}

/// Ordering between comparable values. Integers of either width compare
/// numerically; mismatched kinds do not compare.
fn order(value: &AttributeValue, operand: &AttributeValue) -> Option<Ordering> {
    fn as_i64(v: &AttributeValue) -> Option<i64> {
        match v {
            AttributeValue::Integer(i) => Some(i64::from(*i)),
            AttributeValue::LongInteger(i) => Some(*i),
            _ => None,
        }
    }

    if let (Some(a), Some(b)) = (as_i64(value), as_i64(operand)) {
        return Some(a.cmp(&b));
    }
    match (value, operand) {
        (AttributeValue::DateTime(a), AttributeValue::DateTime(b)) => Some(a.cmp(b)),
        (AttributeValue::String(a), AttributeValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::model::{MetaverseAttribute, MetaverseObjectType};
    use idsync_core::value::AttributeDataType;

    fn attrs() -> (MetaverseAttribute, MetaverseAttribute) {
        (
            MetaverseAttribute::new("Department", AttributeDataType::String),
            MetaverseAttribute::new("EmployeeNumber", AttributeDataType::Integer),
        )
    }

    fn person(dept: &MetaverseAttribute, number: &MetaverseAttribute) -> MetaverseObject {
        MetaverseObject::new(MetaverseObjectType::new("person"))
            .with_value(dept, "Engineering")
            .with_value(number, 1200)
    }

    #[test]
    fn test_no_groups_is_in_scope() {
        let (dept, number) = attrs();
        assert!(is_in_scope(&person(&dept, &number), &[]));
    }

    #[test]
    fn test_equals_folds_case_unless_sensitive() {
        let (dept, number) = attrs();
        let mvo = person(&dept, &number);

        let folded = ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(&dept, "engineering")]);
        assert!(is_in_scope(&mvo, &[folded]));

        let mut strict = ScopingCriterion::equals(&dept, "engineering");
        strict.case_sensitive = true;
        assert!(!is_in_scope(&mvo, &[ScopingCriteriaGroup::all(vec![strict])]));
    }

    #[test]
    fn test_any_group_and_nested_children() {
        let (dept, number) = attrs();
        let mvo = person(&dept, &number);

        let group = ScopingCriteriaGroup::any(vec![
            ScopingCriterion::equals(&dept, "Sales"),
            ScopingCriterion::new(
                &number,
                ComparisonType::GreaterThanOrEquals,
                Some(AttributeValue::LongInteger(1000)),
            ),
        ]);
        assert!(is_in_scope(&mvo, &[group]));

        let nested = ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(&dept, "Engineering")])
            .with_child(ScopingCriteriaGroup::any(vec![ScopingCriterion::new(
                &number,
                ComparisonType::LessThan,
                Some(AttributeValue::Integer(1000)),
            )]));
        assert!(!is_in_scope(&mvo, &[nested]));
    }

    #[test]
    fn test_root_groups_are_anded() {
        let (dept, number) = attrs();
        let mvo = person(&dept, &number);
        let groups = vec![
            ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(&dept, "Engineering")]),
            ScopingCriteriaGroup::all(vec![ScopingCriterion::new(&number, ComparisonType::IsNotPresent, None)]),
        ];
        assert!(!is_in_scope(&mvo, &groups));
    }

    #[test]
    fn test_string_operators() {
        let (dept, number) = attrs();
        let mvo = person(&dept, &number);
        let check = |comparison, operand: &str| {
            is_in_scope(
                &mvo,
                &[ScopingCriteriaGroup::all(vec![ScopingCriterion::new(
                    &dept,
                    comparison,
                    Some(AttributeValue::from(operand)),
                )])],
            )
        };

        assert!(check(ComparisonType::StartsWith, "eng"));
        assert!(check(ComparisonType::EndsWith, "RING"));
        assert!(check(ComparisonType::Contains, "gine"));
        assert!(check(ComparisonType::NotEquals, "Sales"));
        assert!(!check(ComparisonType::NotEquals, "ENGINEERING"));
    }

    #[test]
    fn test_missing_operand_never_matches() {
        let (dept, number) = attrs();
        let mvo = person(&dept, &number);
        let group = ScopingCriteriaGroup::all(vec![ScopingCriterion::new(&dept, ComparisonType::Equals, None)]);
        assert!(!is_in_scope(&mvo, &[group]));
    }
}
