use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Event severity, ordered from least to most severe
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    Display,
)]
#[strum(ascii_case_insensitive)]
pub enum EventSeverity {
    Clear,
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl EventSeverity {
    pub const ALL: [EventSeverity; 6] = [
        EventSeverity::Clear,
        EventSeverity::Debug,
        EventSeverity::Info,
        EventSeverity::Warning,
        EventSeverity::Error,
        EventSeverity::Critical,
    ];

    /// Ordinal stored in the index
    pub fn ordinal(&self) -> i32 {
        match self {
            EventSeverity::Clear => 0,
            EventSeverity::Debug => 1,
            EventSeverity::Info => 2,
            EventSeverity::Warning => 3,
            EventSeverity::Error => 4,
            EventSeverity::Critical => 5,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.ordinal() as i64 == ordinal)
    }
}

/// Lifecycle status of an event summary
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    EnumString,
    Display,
)]
#[strum(ascii_case_insensitive)]
pub enum EventStatus {
    New,
    Acknowledged,
    Suppressed,
    Closed,
    Cleared,
    Dropped,
    Aged,
}

impl EventStatus {
    pub const ALL: [EventStatus; 7] = [
        EventStatus::New,
        EventStatus::Acknowledged,
        EventStatus::Suppressed,
        EventStatus::Closed,
        EventStatus::Cleared,
        EventStatus::Dropped,
        EventStatus::Aged,
    ];

    /// Ordinal stored in the index
    pub fn ordinal(&self) -> i32 {
        match self {
            EventStatus::New => 0,
            EventStatus::Acknowledged => 1,
            EventStatus::Suppressed => 2,
            EventStatus::Closed => 3,
            EventStatus::Cleared => 4,
            EventStatus::Dropped => 5,
            EventStatus::Aged => 6,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.ordinal() as i64 == ordinal)
    }

    /// Closed statuses live in the archive
    pub fn is_archived(&self) -> bool {
        matches!(
            self,
            EventStatus::Closed | EventStatus::Cleared | EventStatus::Aged
        )
    }
}

/// The element (and optional sub-element) an event was raised against
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventActor {
    #[serde(default)]
    pub element_uuid: Option<Uuid>,

    #[serde(default)]
    pub element_identifier: String,

    #[serde(default)]
    pub element_title: String,

    #[serde(default)]
    pub element_sub_uuid: Option<Uuid>,

    #[serde(default)]
    pub element_sub_identifier: String,

    #[serde(default)]
    pub element_sub_title: String,
}

/// A typed group of tag uuids attached to an event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventTag {
    pub tag_type: String,
    pub uuids: Vec<String>,
}

/// A named, multi-valued event detail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDetail {
    pub name: String,
    pub values: Vec<String>,
}

/// A user note attached to a summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventNote {
    pub uuid: Uuid,
    pub user_name: String,
    pub message: String,
    pub created_time: DateTime<Utc>,
}

/// A single event occurrence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Occurrence identifier
    pub uuid: Uuid,

    /// Time the occurrence was raised
    pub created_time: DateTime<Utc>,

    /// Dedup key; generated from the actor and class when empty
    #[serde(default)]
    pub fingerprint: String,

    #[serde(default)]
    pub event_class: String,

    #[serde(default)]
    pub event_class_key: String,

    #[serde(default)]
    pub event_key: String,

    #[serde(default)]
    pub event_group: String,

    #[serde(default)]
    pub actor: EventActor,

    #[serde(default)]
    pub summary: String,

    #[serde(default)]
    pub message: String,

    pub severity: EventSeverity,

    #[serde(default)]
    pub agent: String,

    #[serde(default)]
    pub monitor: String,

    #[serde(default)]
    pub tags: Vec<EventTag>,

    #[serde(default)]
    pub details: Vec<EventDetail>,
}

impl Event {
    /// Create a new occurrence stamped with the current time
    pub fn new(summary: impl Into<String>, severity: EventSeverity) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            created_time: Utc::now(),
            fingerprint: String::new(),
            event_class: "/Unknown".to_string(),
            event_class_key: String::new(),
            event_key: String::new(),
            event_group: String::new(),
            actor: EventActor::default(),
            summary: summary.into(),
            message: String::new(),
            severity,
            agent: String::new(),
            monitor: String::new(),
            tags: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Values of the named detail, if present
    pub fn detail_values(&self, name: &str) -> Option<&[String]> {
        self.details
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.values.as_slice())
    }

    /// Generate fingerprint for deduplication
    pub fn generate_fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.actor.element_identifier.as_bytes());
        hasher.update(b"|");
        hasher.update(self.actor.element_sub_identifier.as_bytes());
        hasher.update(b"|");
        hasher.update(self.event_class.as_bytes());
        hasher.update(b"|");
        hasher.update(self.event_key.as_bytes());

        format!("{:x}", hasher.finalize())
    }

    /// Fingerprint used for dedup, falling back to the generated one
    pub fn effective_fingerprint(&self) -> String {
        if self.fingerprint.is_empty() {
            self.generate_fingerprint()
        } else {
            self.fingerprint.clone()
        }
    }
}

/// Rolling summary of all occurrences sharing a fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub uuid: Uuid,

    /// Most recently seen occurrence
    pub occurrence: Event,

    pub status: EventStatus,

    pub first_seen_time: DateTime<Utc>,

    pub status_change_time: DateTime<Utc>,

    pub last_seen_time: DateTime<Utc>,

    pub update_time: DateTime<Utc>,

    /// Number of folded occurrences, at least one
    pub count: u32,

    #[serde(default)]
    pub current_user_uuid: Option<Uuid>,

    #[serde(default)]
    pub current_user_name: Option<String>,

    #[serde(default)]
    pub cleared_by_event_uuid: Option<Uuid>,

    /// Newest first
    #[serde(default)]
    pub notes: Vec<EventNote>,
}

impl EventSummary {
    /// Create a summary from its first occurrence
    pub fn new(mut event: Event) -> Self {
        if event.fingerprint.is_empty() {
            event.fingerprint = event.generate_fingerprint();
        }
        let seen = event.created_time;

        Self {
            uuid: Uuid::new_v4(),
            occurrence: event,
            status: EventStatus::New,
            first_seen_time: seen,
            status_change_time: seen,
            last_seen_time: seen,
            update_time: seen,
            count: 1,
            current_user_uuid: None,
            current_user_name: None,
            cleared_by_event_uuid: None,
            notes: Vec::new(),
        }
    }

    /// Fold another occurrence into this summary.
    ///
    /// Occurrences may arrive out of order: the embedded occurrence is only
    /// replaced when the new one is at least as recent as the last seen time.
    pub fn merge_occurrence(&mut self, event: Event, now: DateTime<Utc>) {
        let seen = event.created_time;
        self.count = self.count.saturating_add(1);
        if seen < self.first_seen_time {
            self.first_seen_time = seen;
        }
        if seen >= self.last_seen_time {
            self.last_seen_time = seen;
            let fingerprint = std::mem::take(&mut self.occurrence.fingerprint);
            self.occurrence = event;
            if self.occurrence.fingerprint.is_empty() {
                self.occurrence.fingerprint = fingerprint;
            }
        }
        self.update_time = now;
    }

    /// Change status, recording the user and status change time
    pub fn update_status(
        &mut self,
        status: EventStatus,
        user: Option<(Uuid, String)>,
        now: DateTime<Utc>,
    ) {
        if self.status != status {
            self.status = status;
            self.status_change_time = now;
        }
        match user {
            Some((uuid, name)) => {
                self.current_user_uuid = Some(uuid);
                self.current_user_name = Some(name);
            }
            None if status == EventStatus::New => {
                self.current_user_uuid = None;
                self.current_user_name = None;
            }
            None => {}
        }
        self.update_time = now;
    }

    pub fn add_note(&mut self, note: EventNote) {
        self.notes.insert(0, note);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.status == EventStatus::Acknowledged
    }

    pub fn severity(&self) -> EventSeverity {
        self.occurrence.severity
    }
}

/// Epoch milliseconds of a timestamp, as stored in the index
pub fn to_millis(time: &DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Timestamp from stored epoch milliseconds
pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}
