//! Input validation
//!
//! Field-level checks run before any write. Form validation collects one
//! message per field so the presentation layer can show them inline.

use crate::config::{
    MAX_ANNOUNCEMENT_CONTENT_LENGTH, MAX_ANNOUNCEMENT_TITLE_LENGTH, MAX_ANSWER_NOTE_LENGTH,
    MAX_COMMENT_LENGTH, MAX_DUA_TEXT_LENGTH, MAX_GOAL_TARGET, MAX_GOAL_TITLE_LENGTH,
    MAX_NAME_LENGTH, MAX_NOTES_LENGTH, MAX_PHONE_DIGITS, MIN_DUA_TEXT_LENGTH, MIN_PHONE_DIGITS,
};
use crate::database::models::{
    BrotherUpdate, ContactMethod, ContactPreferences, GoalUpdate, NewBrother, NewGoal,
    NewInteraction,
};
use crate::error::{AppError, Result};
use std::collections::BTreeMap;

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";

/// Remove `<script>...</script>` blocks (case-insensitive).
///
/// An unterminated opening tag swallows the rest of the text, and a stray
/// closing tag is dropped.
pub fn strip_script_tags(input: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with the input
    let lower = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        let next_open = lower[pos..].find(SCRIPT_OPEN).map(|i| pos + i);
        let next_close = lower[pos..].find(SCRIPT_CLOSE).map(|i| pos + i);

        match (next_open, next_close) {
            (Some(open), close) if close.map_or(true, |c| open < c) => {
                output.push_str(&input[pos..open]);
                pos = match lower[open..].find(SCRIPT_CLOSE) {
                    Some(end) => open + end + SCRIPT_CLOSE.len(),
                    None => input.len(),
                };
            }
            (_, Some(close)) => {
                output.push_str(&input[pos..close]);
                pos = close + SCRIPT_CLOSE.len();
            }
            _ => {
                output.push_str(&input[pos..]);
                break;
            }
        }
    }

    output
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Validate dua request text and return the trimmed text to store.
///
/// Any script content blocks the submission outright.
pub fn validate_dua_text(text: &str) -> Result<String> {
    if strip_script_tags(text) != text {
        return Err(AppError::Validation(
            "Dua request contains content that is not allowed".to_string(),
        ));
    }

    let trimmed = text.trim();
    let len = char_len(trimmed);

    if len < MIN_DUA_TEXT_LENGTH {
        return Err(AppError::Validation(format!(
            "Dua request must be at least {} characters",
            MIN_DUA_TEXT_LENGTH
        )));
    }
    if len > MAX_DUA_TEXT_LENGTH {
        return Err(AppError::Validation(format!(
            "Dua request must be at most {} characters",
            MAX_DUA_TEXT_LENGTH
        )));
    }

    Ok(trimmed.to_string())
}

pub fn validate_answer_note(note: Option<&str>) -> Result<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if strip_script_tags(note) != note {
        return Err(AppError::Validation(
            "Note contains content that is not allowed".to_string(),
        ));
    }
    if char_len(note) > MAX_ANSWER_NOTE_LENGTH {
        return Err(AppError::Validation(format!(
            "Note must be at most {} characters",
            MAX_ANSWER_NOTE_LENGTH
        )));
    }
    Ok(Some(note.to_string()))
}

/// Loose structural email check: one `@`, non-empty local part, dotted
/// domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Phone numbers may use `+`, spaces, dashes, dots and parentheses around
/// 7 to 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    allowed && (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Raw input from the add/edit brother form
#[derive(Debug, Clone, Default)]
pub struct BrotherForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub notes: String,
    pub preferred_method: Option<ContactMethod>,
    pub frequency_days: Option<u32>,
}

impl BrotherForm {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<NewBrother> {
        let mut errors = BTreeMap::new();

        let name = self.name.trim();
        check_name(name, &mut errors);
        check_email(&self.email, &mut errors);
        check_phone(&self.phone, &mut errors);
        check_notes(&self.notes, &mut errors);
        check_frequency(self.frequency_days, &mut errors);

        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        Ok(NewBrother {
            name: name.to_string(),
            email: optional(&self.email),
            phone: optional(&self.phone),
            location: optional(&self.location),
            notes: optional(&self.notes),
            contact_preferences: ContactPreferences {
                preferred_method: self.preferred_method,
                frequency_days: self.frequency_days,
            },
        })
    }
}

fn check_name(name: &str, errors: &mut BTreeMap<String, String>) {
    if name.is_empty() {
        errors.insert("name".to_string(), "Name is required".to_string());
    } else if char_len(name) > MAX_NAME_LENGTH {
        errors.insert(
            "name".to_string(),
            format!("Name must be at most {} characters", MAX_NAME_LENGTH),
        );
    }
}

fn check_email(email: &str, errors: &mut BTreeMap<String, String>) {
    let email = email.trim();
    if !email.is_empty() && !is_valid_email(email) {
        errors.insert(
            "email".to_string(),
            "Please enter a valid email address".to_string(),
        );
    }
}

fn check_phone(phone: &str, errors: &mut BTreeMap<String, String>) {
    let phone = phone.trim();
    if !phone.is_empty() && !is_valid_phone(phone) {
        errors.insert(
            "phone".to_string(),
            format!(
                "Phone number must have {} to {} digits",
                MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
            ),
        );
    }
}

fn check_notes(notes: &str, errors: &mut BTreeMap<String, String>) {
    if char_len(notes.trim()) > MAX_NOTES_LENGTH {
        errors.insert(
            "notes".to_string(),
            format!("Notes must be at most {} characters", MAX_NOTES_LENGTH),
        );
    }
}

fn check_frequency(days: Option<u32>, errors: &mut BTreeMap<String, String>) {
    if days == Some(0) {
        errors.insert(
            "frequencyDays".to_string(),
            "Contact frequency must be at least one day".to_string(),
        );
    }
}

pub fn validate_brother_update(update: &BrotherUpdate) -> Result<()> {
    let mut errors = BTreeMap::new();

    if let Some(name) = &update.name {
        check_name(name.trim(), &mut errors);
    }
    if let Some(email) = &update.email {
        check_email(email, &mut errors);
    }
    if let Some(phone) = &update.phone {
        check_phone(phone, &mut errors);
    }
    if let Some(notes) = &update.notes {
        check_notes(notes, &mut errors);
    }
    if let Some(prefs) = &update.contact_preferences {
        check_frequency(prefs.frequency_days, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidFields(errors))
    }
}

pub fn validate_interaction(interaction: &NewInteraction) -> Result<()> {
    if interaction.brother_id.trim().is_empty() {
        return Err(AppError::Validation("A brother must be selected".to_string()));
    }
    if let Some(rating) = interaction.rating {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
    }
    if let Some(notes) = &interaction.notes {
        if char_len(notes.trim()) > MAX_NOTES_LENGTH {
            return Err(AppError::Validation(format!(
                "Notes must be at most {} characters",
                MAX_NOTES_LENGTH
            )));
        }
    }
    Ok(())
}

fn check_goal_title(title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("Goal title is required".to_string()));
    }
    if char_len(title) > MAX_GOAL_TITLE_LENGTH {
        return Err(AppError::Validation(format!(
            "Goal title must be at most {} characters",
            MAX_GOAL_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn check_goal_target(target: u32) -> Result<()> {
    if target == 0 || target > MAX_GOAL_TARGET {
        return Err(AppError::Validation(format!(
            "Target must be between 1 and {}",
            MAX_GOAL_TARGET
        )));
    }
    Ok(())
}

pub fn validate_new_goal(goal: &NewGoal) -> Result<()> {
    check_goal_title(&goal.title)?;
    check_goal_target(goal.target)
}

/// Check a goal edit against the goal's current progress
pub fn validate_goal_update(update: &GoalUpdate, current_progress: u32) -> Result<()> {
    if let Some(title) = &update.title {
        check_goal_title(title)?;
    }
    if let Some(target) = update.target {
        check_goal_target(target)?;
        if target < current_progress {
            return Err(AppError::Validation(format!(
                "Target cannot be lower than current progress ({})",
                current_progress
            )));
        }
    }
    Ok(())
}

pub fn validate_announcement(title: &str, content: &str) -> Result<(String, String)> {
    let title = title.trim();
    let content = content.trim();

    if title.is_empty() || content.is_empty() {
        return Err(AppError::Validation(
            "Title and content are required".to_string(),
        ));
    }
    if char_len(title) > MAX_ANNOUNCEMENT_TITLE_LENGTH {
        return Err(AppError::Validation(format!(
            "Title must be at most {} characters",
            MAX_ANNOUNCEMENT_TITLE_LENGTH
        )));
    }
    if char_len(content) > MAX_ANNOUNCEMENT_CONTENT_LENGTH {
        return Err(AppError::Validation(format!(
            "Content must be at most {} characters",
            MAX_ANNOUNCEMENT_CONTENT_LENGTH
        )));
    }
    if strip_script_tags(title) != title || strip_script_tags(content) != content {
        return Err(AppError::Validation(
            "Announcement contains content that is not allowed".to_string(),
        ));
    }

    Ok((title.to_string(), content.to_string()))
}

pub fn validate_comment(text: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Comment cannot be empty".to_string()));
    }
    if char_len(text) > MAX_COMMENT_LENGTH {
        return Err(AppError::Validation(format!(
            "Comment must be at most {} characters",
            MAX_COMMENT_LENGTH
        )));
    }
    if strip_script_tags(text) != text {
        return Err(AppError::Validation(
            "Comment contains content that is not allowed".to_string(),
        ));
    }
    Ok(text.to_string())
}
