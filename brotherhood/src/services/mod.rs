//! Services module
//!
//! Business logic services that coordinate between the presentation layer
//! and the repository.

pub mod announcements;
pub mod brothers;
pub mod dua;
pub mod goals;
pub mod interactions;
pub mod notifications;
pub mod reminders;
pub mod settings;

pub use announcements::AnnouncementsService;
pub use brothers::BrothersService;
pub use dua::{DuaService, DuaView};
pub use goals::GoalsService;
pub use interactions::InteractionsService;
pub use notifications::{NewNotification, Notification, NotificationCenter, NotificationKind};
pub use reminders::RemindersService;
pub use settings::{AppSettings, NotificationSettings, SettingsService};
