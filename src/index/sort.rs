//! Mapping of requested sorts onto index fields

use crate::error::{IndexError, Result};
use crate::index::constants::*;
use crate::models::{EventDetailItem, EventDetailType, EventSort, IndexedDetails, SortField};

/// Value type read from a sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortValueKind {
    I64,
    F64,
    Str,
}

/// One resolved sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKeySpec {
    pub field: String,
    pub kind: SortValueKind,
    pub descending: bool,
}

impl SortKeySpec {
    fn new(field: impl Into<String>, kind: SortValueKind, descending: bool) -> Self {
        Self {
            field: field.into(),
            kind,
            descending,
        }
    }
}

/// Resolve sorts into index fields; an empty request sorts by last seen,
/// newest first.
pub fn map_sorts(
    sorts: &[EventSort],
    details: &IndexedDetails,
    detail_field: impl Fn(&EventDetailItem) -> String,
) -> Result<Vec<SortKeySpec>> {
    if sorts.is_empty() {
        return Ok(vec![SortKeySpec::new(FIELD_LAST_SEEN_TIME, SortValueKind::I64, true)]);
    }

    let mut keys = Vec::with_capacity(sorts.len());
    for sort in sorts {
        let desc = sort.is_descending();
        let (field, kind) = match sort.field {
            SortField::Uuid => (FIELD_UUID, SortValueKind::Str),
            SortField::EventSummary => (FIELD_SUMMARY_NOT_ANALYZED, SortValueKind::Str),
            SortField::Severity => (FIELD_SEVERITY, SortValueKind::I64),
            SortField::Status => (FIELD_STATUS, SortValueKind::I64),
            SortField::Count => (FIELD_COUNT, SortValueKind::I64),
            SortField::FirstSeen => (FIELD_FIRST_SEEN_TIME, SortValueKind::I64),
            SortField::LastSeen => (FIELD_LAST_SEEN_TIME, SortValueKind::I64),
            SortField::StatusChange => (FIELD_STATUS_CHANGE_TIME, SortValueKind::I64),
            SortField::UpdateTime => (FIELD_UPDATE_TIME, SortValueKind::I64),
            SortField::CurrentUserName => (FIELD_CURRENT_USER_NAME, SortValueKind::Str),
            SortField::ElementIdentifier => {
                (FIELD_ELEMENT_IDENTIFIER_NOT_ANALYZED, SortValueKind::Str)
            }
            SortField::ElementTitle => (FIELD_ELEMENT_TITLE_NOT_ANALYZED, SortValueKind::Str),
            SortField::ElementSubIdentifier => {
                (FIELD_ELEMENT_SUB_IDENTIFIER_NOT_ANALYZED, SortValueKind::Str)
            }
            SortField::ElementSubTitle => {
                (FIELD_ELEMENT_SUB_TITLE_NOT_ANALYZED, SortValueKind::Str)
            }
            SortField::EventClass => (FIELD_EVENT_CLASS_NOT_ANALYZED, SortValueKind::Str),
            SortField::EventClassKey => (FIELD_EVENT_CLASS_KEY, SortValueKind::Str),
            SortField::EventKey => (FIELD_EVENT_KEY, SortValueKind::Str),
            SortField::EventGroup => (FIELD_EVENT_GROUP, SortValueKind::Str),
            SortField::Agent => (FIELD_AGENT, SortValueKind::Str),
            SortField::Monitor => (FIELD_MONITOR, SortValueKind::Str),
            SortField::Fingerprint => (FIELD_FINGERPRINT, SortValueKind::Str),
            SortField::Detail => {
                keys.extend(detail_sort(sort, details, &detail_field)?);
                continue;
            }
        };
        keys.push(SortKeySpec::new(field, kind, desc));
    }
    Ok(keys)
}

fn detail_sort(
    sort: &EventSort,
    details: &IndexedDetails,
    detail_field: &impl Fn(&EventDetailItem) -> String,
) -> Result<Vec<SortKeySpec>> {
    let key = sort
        .detail_key
        .as_deref()
        .ok_or_else(|| IndexError::UnsupportedSortField("detail sort without a key".into()))?;
    let item = details
        .get(key)
        .ok_or_else(|| IndexError::UnsupportedSortField(key.to_string()))?;
    let field = detail_field(item);
    let desc = sort.is_descending();

    Ok(match item.detail_type {
        EventDetailType::String => vec![SortKeySpec::new(field, SortValueKind::Str, desc)],
        EventDetailType::Integer | EventDetailType::Long => {
            vec![SortKeySpec::new(field, SortValueKind::I64, desc)]
        }
        EventDetailType::Float | EventDetailType::Double => {
            vec![SortKeySpec::new(field, SortValueKind::F64, desc)]
        }
        // IPv4 before IPv6, then by the fixed-width canonical form
        EventDetailType::IpAddress => vec![
            SortKeySpec::new(
                format!("{}{}", field, IP_ADDRESS_TYPE_SUFFIX),
                SortValueKind::Str,
                desc,
            ),
            SortKeySpec::new(format!("{}{}", field, SORT_SUFFIX), SortValueKind::Str, desc),
        ],
        EventDetailType::Path => vec![SortKeySpec::new(
            format!("{}{}", field, SORT_SUFFIX),
            SortValueKind::Str,
            desc,
        )],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SortDirection;

    fn details() -> IndexedDetails {
        IndexedDetails::new(vec![
            EventDetailItem::new("ip", EventDetailType::IpAddress),
            EventDetailItem::new("load", EventDetailType::Double),
        ])
    }

    fn field(item: &EventDetailItem) -> String {
        format!("details_{}", item.key)
    }

    #[test]
    fn test_default_sort() {
        let keys = map_sorts(&[], &details(), field).unwrap();
        assert_eq!(
            keys,
            vec![SortKeySpec::new(FIELD_LAST_SEEN_TIME, SortValueKind::I64, true)]
        );
    }

    #[test]
    fn test_ip_detail_sorts_by_type_then_canonical() {
        let sorts = [EventSort::detail("ip", SortDirection::Ascending)];
        let keys = map_sorts(&sorts, &details(), field).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].field, "details_ip_type");
        assert_eq!(keys[1].field, "details_ip_sort");
    }

    #[test]
    fn test_element_sorts_use_not_analyzed() {
        let sorts = [
            EventSort::new(SortField::ElementIdentifier, SortDirection::Descending),
            EventSort::detail("load", SortDirection::Ascending),
        ];
        let keys = map_sorts(&sorts, &details(), field).unwrap();
        assert_eq!(keys[0].field, FIELD_ELEMENT_IDENTIFIER_NOT_ANALYZED);
        assert!(keys[0].descending);
        assert_eq!(keys[1].kind, SortValueKind::F64);
    }

    #[test]
    fn test_unknown_detail_sort() {
        let sorts = [EventSort::detail("nope", SortDirection::Ascending)];
        assert!(matches!(
            map_sorts(&sorts, &details(), field),
            Err(IndexError::UnsupportedSortField(key)) if key == "nope"
        ));

        let keyless = [EventSort::new(SortField::Detail, SortDirection::Ascending)];
        assert!(map_sorts(&keyless, &details(), field).is_err());
    }
}
