//! # irrigo-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the JSON control API polled by the irrigation control panel
//!   (`/get_program_state`, `/start_zone`, `/save_program`, …)
//! - Map HTTP requests into [`Engine`](irrigo_app::engine::Engine) calls
//!   (driving adapter)
//! - Map results into the `{"success": …, "error": …}` envelope the panel
//!   expects
//!
//! ## Dependency rule
//! Depends on `irrigo-app` (for the engine and port traits) and
//! `irrigo-domain` (for domain types used in request/response mapping).
//! Never leaks axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
