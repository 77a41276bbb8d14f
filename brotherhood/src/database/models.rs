//! Document models
//!
//! Rust structs for every document kind. Field names follow the stored
//! camelCase document shape; `id`, `createdAt` and `updatedAt` are filled
//! in by the store.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use crate::sync::Keyed;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a brother was (or prefers to be) contacted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    Call,
    Text,
    Email,
    Whatsapp,
    InPerson,
}

impl ContactMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactMethod::Call => "call",
            ContactMethod::Text => "text",
            ContactMethod::Email => "email",
            ContactMethod::Whatsapp => "whatsapp",
            ContactMethod::InPerson => "in_person",
        }
    }
}

impl fmt::Display for ContactMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_method: Option<ContactMethod>,
    /// Desired days between contacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_days: Option<u32>,
}

/// A member of the user's private contact directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Brother {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact_preferences: ContactPreferences,
    #[serde(default)]
    pub last_contact: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_contact_method: Option<ContactMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for a new brother
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBrother {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact_preferences: ContactPreferences,
}

/// Partial edit of a brother.
///
/// `Some("")` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrotherUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub contact_preferences: Option<ContactPreferences>,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl BrotherUpdate {
    /// Apply to a local copy for optimistic display
    pub fn apply_to(&self, brother: &mut Brother) {
        if let Some(name) = &self.name {
            brother.name = name.trim().to_string();
        }
        if let Some(email) = &self.email {
            brother.email = non_empty(email);
        }
        if let Some(phone) = &self.phone {
            brother.phone = non_empty(phone);
        }
        if let Some(location) = &self.location {
            brother.location = non_empty(location);
        }
        if let Some(notes) = &self.notes {
            brother.notes = non_empty(notes);
        }
        if let Some(prefs) = &self.contact_preferences {
            brother.contact_preferences = prefs.clone();
        }
    }
}

/// One logged contact with a brother
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    pub brother_id: String,
    pub method: ContactMethod,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    /// 1 to 5
    #[serde(default)]
    pub rating: Option<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInteraction {
    pub brother_id: String,
    pub method: ContactMethod,
    /// Defaults to now when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

/// A prayer request on the shared feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuaRequest {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub is_anonymous: bool,
    pub author_id: String,
    pub author_name: String,
    /// User ids that said Ameen, each at most once
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub response_count: u32,
    #[serde(default)]
    pub is_answered: bool,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answer_note: Option<String>,
    #[serde(default)]
    pub edit_count: u32,
    #[serde(default)]
    pub last_edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DuaRequest {
    pub fn has_responded(&self, uid: &str) -> bool {
        self.responses.iter().any(|r| r == uid)
    }

    /// Name shown on the feed
    pub fn display_author(&self) -> &str {
        if self.is_anonymous {
            "Anonymous"
        } else {
            &self.author_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDuaRequest {
    pub text: String,
    #[serde(default)]
    pub is_urgent: bool,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Salah,
    Quran,
    Dhikr,
    Charity,
    Fasting,
    Knowledge,
    Brotherhood,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    /// Start of the period containing `at` (UTC; weeks start Monday)
    pub fn period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let start = match self {
            Frequency::Daily => date,
            Frequency::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Frequency::Monthly => date.with_day(1).unwrap_or(date),
        };
        midnight(start)
    }

    /// Start of the period before the one containing `at`
    pub fn previous_period_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let current = self.period_start(at);
        match self {
            Frequency::Daily => current - Duration::days(1),
            Frequency::Weekly => current - Duration::days(7),
            Frequency::Monthly => {
                let date = current.date_naive();
                let (year, month) = if date.month() == 1 {
                    (date.year() - 1, 12)
                } else {
                    (date.year(), date.month() - 1)
                };
                NaiveDate::from_ymd_opt(year, month, 1)
                    .map(midnight)
                    .unwrap_or(current)
            }
        }
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// A recurring spiritual goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub target: u32,
    pub frequency: Frequency,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub last_completed: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of recording one unit of progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalProgress {
    pub progress: u32,
    pub streak: u32,
}

impl Goal {
    /// Progress counted in the period containing `now`; a rolled-over
    /// period starts again from zero.
    pub fn progress_at(&self, now: DateTime<Utc>) -> u32 {
        match self.last_completed {
            Some(last) if last >= self.frequency.period_start(now) => self.progress,
            _ => 0,
        }
    }

    pub fn is_complete_at(&self, now: DateTime<Utc>) -> bool {
        self.progress_at(now) >= self.target
    }

    /// Progress and streak after recording one unit at `now`, or `None`
    /// when the target for this period is already met.
    ///
    /// The streak counts consecutive periods with recorded progress: it
    /// grows on the first entry of a period that follows an active one,
    /// stays put within a period, and restarts at 1 after a gap.
    pub fn next_progress(&self, now: DateTime<Utc>) -> Option<GoalProgress> {
        let current = self.progress_at(now);
        if current >= self.target {
            return None;
        }

        let period_start = self.frequency.period_start(now);
        let streak = match self.last_completed {
            Some(last) if last >= period_start => self.streak.max(1),
            Some(last) if last >= self.frequency.previous_period_start(now) => self.streak + 1,
            _ => 1,
        };

        Some(GoalProgress {
            progress: current + 1,
            streak,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub target: u32,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub target: Option<u32>,
    pub frequency: Option<Frequency>,
}

impl GoalUpdate {
    pub fn apply_to(&self, goal: &mut Goal) {
        if let Some(title) = &self.title {
            goal.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            goal.description = non_empty(description);
        }
        if let Some(target) = self.target {
            goal.target = target;
        }
        if let Some(frequency) = self.frequency {
            goal.frequency = frequency;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementType {
    Personal,
    Achievement,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A post on the community board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: AnnouncementType,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub likes: u32,
    /// User ids that liked the post, each at most once
    #[serde(default)]
    pub liked_by: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Announcement {
    pub fn is_liked_by(&self, uid: &str) -> bool {
        self.liked_by.iter().any(|u| u == uid)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: AnnouncementType,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementUpdate {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<AnnouncementType>,
}

impl AnnouncementUpdate {
    pub fn apply_to(&self, announcement: &mut Announcement) {
        if let Some(title) = &self.title {
            announcement.title = title.trim().to_string();
        }
        if let Some(content) = &self.content {
            announcement.content = content.trim().to_string();
        }
        if let Some(kind) = self.kind {
            announcement.kind = kind;
        }
    }
}

macro_rules! keyed_by_id {
    ($($model:ty),*) => {
        $(
            impl Keyed for $model {
                fn key(&self) -> &str {
                    &self.id
                }

                fn version(&self) -> DateTime<Utc> {
                    self.updated_at
                }
            }
        )*
    };
}

keyed_by_id!(Brother, Interaction, DuaRequest, Goal, Announcement);
