//! Brotherhood library
//!
//! Contacts, dua requests, goals, announcements and notifications for a
//! brotherhood community, backed by a live document store.

pub mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod database;
pub mod device;
pub mod error;
pub mod policy;
pub mod push;
pub mod services;
pub mod storage;
pub mod sync;
pub mod validation;
pub mod views;
