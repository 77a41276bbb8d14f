//! View helpers
//!
//! Pure functions the presentation layer renders from: contact status
//! buckets, directory search and filtering, and per-viewer dua cards.

use crate::config::{NEEDS_CONTACT_DAYS, RECENT_CONTACT_DAYS, URGENT_CONTACT_DAYS};
use crate::database::models::{Brother, DuaRequest};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How overdue a brother is for contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Recent,
    Good,
    NeedsContact,
    Urgent,
}

impl ContactStatus {
    /// Bucket by whole days since the last contact; never contacted is urgent
    pub fn classify(last_contact: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let Some(last) = last_contact else {
            return ContactStatus::Urgent;
        };
        let days = (now - last).num_days();
        if days > URGENT_CONTACT_DAYS {
            ContactStatus::Urgent
        } else if days > NEEDS_CONTACT_DAYS {
            ContactStatus::NeedsContact
        } else if days > RECENT_CONTACT_DAYS {
            ContactStatus::Good
        } else {
            ContactStatus::Recent
        }
    }

    pub fn of(brother: &Brother, now: DateTime<Utc>) -> Self {
        Self::classify(brother.last_contact, now)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContactStatus::Recent => "Recently contacted",
            ContactStatus::Good => "Good",
            ContactStatus::NeedsContact => "Needs contact",
            ContactStatus::Urgent => "Urgent",
        }
    }

    /// Whether the weekly reminder should mention this brother
    pub fn is_overdue(&self) -> bool {
        matches!(self, ContactStatus::NeedsContact | ContactStatus::Urgent)
    }
}

/// Days since last contact, or `None` if never contacted
pub fn days_since_contact(brother: &Brother, now: DateTime<Utc>) -> Option<i64> {
    brother.last_contact.map(|last| (now - last).num_days())
}

/// Case-insensitive substring match over name, email, location and notes
pub fn matches_search(brother: &Brother, query: &str) -> bool {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }

    std::iter::once(Some(brother.name.as_str()))
        .chain([
            brother.email.as_deref(),
            brother.location.as_deref(),
            brother.notes.as_deref(),
        ])
        .flatten()
        .any(|field| field.to_lowercase().contains(&query))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrotherFilter {
    pub search: String,
    pub status: Option<ContactStatus>,
}

impl BrotherFilter {
    pub fn search(query: &str) -> Self {
        Self {
            search: query.to_string(),
            status: None,
        }
    }

    pub fn status(status: ContactStatus) -> Self {
        Self {
            search: String::new(),
            status: Some(status),
        }
    }
}

/// Apply search and status filter, keeping input order
pub fn filter_brothers(
    brothers: &[Brother],
    filter: &BrotherFilter,
    now: DateTime<Utc>,
) -> Vec<Brother> {
    brothers
        .iter()
        .filter(|b| matches_search(b, &filter.search))
        .filter(|b| filter.status.map_or(true, |s| ContactStatus::of(b, now) == s))
        .cloned()
        .collect()
}

/// Brother counts per status bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub total: usize,
    pub recent: usize,
    pub good: usize,
    pub needs_contact: usize,
    pub urgent: usize,
}

impl StatusCounts {
    pub fn from_brothers(brothers: &[Brother], now: DateTime<Utc>) -> Self {
        brothers.iter().fold(Self::default(), |mut counts, brother| {
            counts.total += 1;
            match ContactStatus::of(brother, now) {
                ContactStatus::Recent => counts.recent += 1,
                ContactStatus::Good => counts.good += 1,
                ContactStatus::NeedsContact => counts.needs_contact += 1,
                ContactStatus::Urgent => counts.urgent += 1,
            }
            counts
        })
    }
}

/// A dua request as one viewer sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuaCard {
    pub id: String,
    pub text: String,
    pub author: String,
    pub is_urgent: bool,
    pub is_answered: bool,
    pub answer_note: Option<String>,
    pub response_count: u32,
    pub has_responded: bool,
    pub is_mine: bool,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
}

impl DuaCard {
    /// Anonymous requests never expose the author's name, not even to
    /// the author.
    pub fn render(dua: &DuaRequest, viewer_id: Option<&str>) -> Self {
        Self {
            id: dua.id.clone(),
            text: dua.text.clone(),
            author: dua.display_author().to_string(),
            is_urgent: dua.is_urgent,
            is_answered: dua.is_answered,
            answer_note: dua.answer_note.clone(),
            response_count: dua.response_count,
            has_responded: viewer_id.map_or(false, |uid| dua.has_responded(uid)),
            is_mine: viewer_id == Some(dua.author_id.as_str()),
            edited: dua.edit_count > 0,
            created_at: dua.created_at,
        }
    }
}
