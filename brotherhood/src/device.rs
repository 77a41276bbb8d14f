//! Device integration
//!
//! Contact links for the platform dialer, messaging and mail apps, and the
//! invitation share flow. The share sheet and clipboard are traits so the
//! host shell can supply its own.

use crate::database::{Brother, ContactMethod};
use crate::error::{AppError, Result};

/// Keep the leading `+` and digits, drop spacing and punctuation
fn dial_digits(phone: &str) -> String {
    let trimmed = phone.trim();
    let mut out: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        out.insert(0, '+');
    }
    out
}

fn require_phone(phone: &str) -> Result<String> {
    let digits = dial_digits(phone);
    if digits.trim_start_matches('+').is_empty() {
        return Err(AppError::Validation("Phone number is required".to_string()));
    }
    Ok(digits)
}

pub fn tel_uri(phone: &str) -> Result<String> {
    Ok(format!("tel:{}", require_phone(phone)?))
}

pub fn sms_uri(phone: &str, body: Option<&str>) -> Result<String> {
    let digits = require_phone(phone)?;
    Ok(match body.filter(|b| !b.is_empty()) {
        Some(body) => format!("sms:{}?body={}", digits, urlencoding::encode(body)),
        None => format!("sms:{}", digits),
    })
}

pub fn mailto_uri(email: &str) -> Result<String> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".to_string()));
    }
    Ok(format!("mailto:{}", email))
}

pub fn whatsapp_uri(phone: &str) -> Result<String> {
    let digits = require_phone(phone)?;
    Ok(format!("https://wa.me/{}", digits.trim_start_matches('+')))
}

/// Link that opens the right app for reaching a brother by `method`
pub fn contact_uri(brother: &Brother, method: ContactMethod) -> Result<String> {
    let phone = || {
        brother.phone.as_deref().ok_or_else(|| {
            AppError::FailedPrecondition(format!("{} has no phone number", brother.name))
        })
    };

    match method {
        ContactMethod::Call => tel_uri(phone()?),
        ContactMethod::Text => sms_uri(phone()?, None),
        ContactMethod::Whatsapp => whatsapp_uri(phone()?),
        ContactMethod::Email => {
            let email = brother.email.as_deref().ok_or_else(|| {
                AppError::FailedPrecondition(format!("{} has no email address", brother.name))
            })?;
            mailto_uri(email)
        }
        ContactMethod::InPerson => Err(AppError::Validation(
            "In-person contact has no link".to_string(),
        )),
    }
}

pub fn invitation_text(inviter: &str) -> String {
    format!(
        "Assalamu alaikum! {} invited you to join our Brotherhood. \
         Stay in touch with the brothers, share dua requests and keep each other \
         going on your goals.",
        inviter
    )
}

/// Native share sheet
pub trait ShareSheet: Send + Sync {
    fn is_available(&self) -> bool;
    fn share(&self, text: &str) -> Result<()>;
}

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    Shared,
    Copied,
}

/// Share the invitation, falling back to the clipboard when the share sheet
/// is missing or fails
pub fn share_invitation(
    inviter: &str,
    sheet: &dyn ShareSheet,
    clipboard: &dyn Clipboard,
) -> Result<ShareOutcome> {
    let text = invitation_text(inviter);

    if sheet.is_available() {
        match sheet.share(&text) {
            Ok(()) => return Ok(ShareOutcome::Shared),
            Err(e) => tracing::warn!("Share sheet failed, copying instead: {}", e),
        }
    }

    clipboard.write_text(&text)?;
    tracing::info!("Invitation copied to clipboard");
    Ok(ShareOutcome::Copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ContactPreferences;
    use chrono::Utc;
    use std::sync::Mutex;

    struct FakeSheet {
        available: bool,
        fails: bool,
    }

    impl ShareSheet for FakeSheet {
        fn is_available(&self) -> bool {
            self.available
        }

        fn share(&self, _text: &str) -> Result<()> {
            if self.fails {
                Err(AppError::Generic("cancelled".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct FakeClipboard {
        copied: Mutex<Option<String>>,
    }

    impl Clipboard for FakeClipboard {
        fn write_text(&self, text: &str) -> Result<()> {
            *self.copied.lock().unwrap() = Some(text.to_string());
            Ok(())
        }
    }

    fn brother(phone: Option<&str>, email: Option<&str>) -> Brother {
        Brother {
            id: "b1".to_string(),
            name: "Ali".to_string(),
            email: email.map(str::to_string),
            phone: phone.map(str::to_string),
            location: None,
            notes: None,
            contact_preferences: ContactPreferences::default(),
            last_contact: None,
            last_contact_method: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_phone_uris() {
        assert_eq!(tel_uri("+44 (0)7700 900123").unwrap(), "tel:+4407700900123");
        assert_eq!(
            sms_uri("555-0100", Some("Salaam, how are you?")).unwrap(),
            "sms:5550100?body=Salaam%2C%20how%20are%20you%3F"
        );
        assert_eq!(whatsapp_uri("+1 555 0100").unwrap(), "https://wa.me/15550100");
        assert!(tel_uri(" - ").is_err());
    }

    #[test]
    fn test_contact_uri_by_method() {
        let ali = brother(Some("555 0100"), None);
        assert_eq!(contact_uri(&ali, ContactMethod::Call).unwrap(), "tel:5550100");

        let err = contact_uri(&ali, ContactMethod::Email).unwrap_err();
        assert_eq!(err.code(), "failed-precondition");

        let emailed = brother(None, Some("ali@example.com"));
        assert_eq!(
            contact_uri(&emailed, ContactMethod::Email).unwrap(),
            "mailto:ali@example.com"
        );
        assert!(contact_uri(&emailed, ContactMethod::InPerson).is_err());
    }

    #[test]
    fn test_share_falls_back_to_clipboard() {
        let clipboard = FakeClipboard::default();

        let shared = share_invitation(
            "Yusuf",
            &FakeSheet {
                available: true,
                fails: false,
            },
            &clipboard,
        )
        .unwrap();
        assert_eq!(shared, ShareOutcome::Shared);
        assert!(clipboard.copied.lock().unwrap().is_none());

        for sheet in [
            FakeSheet {
                available: false,
                fails: false,
            },
            FakeSheet {
                available: true,
                fails: true,
            },
        ] {
            let outcome = share_invitation("Yusuf", &sheet, &clipboard).unwrap();
            assert_eq!(outcome, ShareOutcome::Copied);
        }
        assert!(clipboard
            .copied
            .lock()
            .unwrap()
            .as_deref()
            .unwrap()
            .contains("Yusuf invited you"));
    }
}
