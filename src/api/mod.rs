//! API client module for the offline sync subsystem.
//!
//! Provides the HTTP client with auth header injection, keychain token storage,
//! the offline-actions endpoints and request types matching the backend API.

pub mod auth;
pub mod client;
pub mod offline_actions;
pub mod types;

pub use client::ApiClient;
pub use offline_actions::HttpRemote;
