//! Index field names and encoding constants shared by every backend

/// Version of the document layout; bump when field encodings change
pub const INDEX_VERSION: u32 = 8;

/// Shortest token produced by the identifier n-gram analyzer
pub const MIN_NGRAM_SIZE: usize = 3;

pub const FIELD_UUID: &str = "uuid";
pub const FIELD_CURRENT_USER_NAME: &str = "current_user_name";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_COUNT: &str = "count";
pub const FIELD_LAST_SEEN_TIME: &str = "last_seen_time";
pub const FIELD_FIRST_SEEN_TIME: &str = "first_seen_time";
pub const FIELD_STATUS_CHANGE_TIME: &str = "status_change_time";
pub const FIELD_UPDATE_TIME: &str = "update_time";
pub const FIELD_FINGERPRINT: &str = "fingerprint";
pub const FIELD_SUMMARY: &str = "summary";
pub const FIELD_SUMMARY_NOT_ANALYZED: &str = "summary_not_analyzed";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_EVENT_CLASS: &str = "event_class";
pub const FIELD_EVENT_CLASS_NOT_ANALYZED: &str = "event_class_not_analyzed";
pub const FIELD_AGENT: &str = "agent";
pub const FIELD_MONITOR: &str = "monitor";
pub const FIELD_EVENT_KEY: &str = "event_key";
pub const FIELD_EVENT_CLASS_KEY: &str = "event_class_key";
pub const FIELD_EVENT_GROUP: &str = "event_group";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_TAGS: &str = "tag";
pub const FIELD_ELEMENT_UUID: &str = "element_uuid";
pub const FIELD_ELEMENT_SUB_UUID: &str = "element_sub_uuid";
pub const FIELD_ELEMENT_IDENTIFIER: &str = "element_identifier";
pub const FIELD_ELEMENT_IDENTIFIER_NOT_ANALYZED: &str = "element_identifier_not_analyzed";
pub const FIELD_ELEMENT_SUB_IDENTIFIER: &str = "element_sub_identifier";
pub const FIELD_ELEMENT_SUB_IDENTIFIER_NOT_ANALYZED: &str =
    "element_sub_identifier_not_analyzed";
pub const FIELD_ELEMENT_TITLE: &str = "element_title";
pub const FIELD_ELEMENT_TITLE_NOT_ANALYZED: &str = "element_title_not_analyzed";
pub const FIELD_ELEMENT_SUB_TITLE: &str = "element_sub_title";
pub const FIELD_ELEMENT_SUB_TITLE_NOT_ANALYZED: &str = "element_sub_title_not_analyzed";

/// Serialized summary payload (summary shape only)
pub const FIELD_RECORD: &str = "record";

/// Suffix of the canonical sortable sibling of IP and path details
pub const SORT_SUFFIX: &str = "_sort";

/// Suffix of the `"4"`/`"6"` discriminator of IP details
pub const IP_ADDRESS_TYPE_SUFFIX: &str = "_type";
pub const IP_ADDRESS_TYPE_4: &str = "4";
pub const IP_ADDRESS_TYPE_6: &str = "6";

/// Value indexed for a configured numeric detail the event lacks
pub const NUMERIC_DETAIL_SENTINEL: i64 = i32::MIN as i64;

/// Value indexed for a configured string detail the event lacks
pub const STRING_DETAIL_SENTINEL: &str = "\u{07}";

/// Not-analyzed sibling used for exact and prefix matching of an analyzed field
pub fn non_analyzed_field(field: &str) -> String {
    match field {
        FIELD_SUMMARY => FIELD_SUMMARY_NOT_ANALYZED.to_string(),
        FIELD_EVENT_CLASS => FIELD_EVENT_CLASS_NOT_ANALYZED.to_string(),
        FIELD_ELEMENT_IDENTIFIER => FIELD_ELEMENT_IDENTIFIER_NOT_ANALYZED.to_string(),
        FIELD_ELEMENT_SUB_IDENTIFIER => FIELD_ELEMENT_SUB_IDENTIFIER_NOT_ANALYZED.to_string(),
        FIELD_ELEMENT_TITLE => FIELD_ELEMENT_TITLE_NOT_ANALYZED.to_string(),
        FIELD_ELEMENT_SUB_TITLE => FIELD_ELEMENT_SUB_TITLE_NOT_ANALYZED.to_string(),
        // Path details keep their normalized value in the sort sibling
        other => format!("{}{}", other, SORT_SUFFIX),
    }
}
