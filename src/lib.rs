//! Local-first persistence with background sync to a hosted per-user table
//! service.
//!
//! The application talks only to [`persistence::Persistence`]. Writes land in
//! the on-device [`db::LocalStore`] and are pushed through the
//! [`mapper`] to a [`remote::RemoteStore`] in the background; on sign-in the
//! [`sync::SyncCoordinator`] pulls every store back down.

pub mod config;
pub mod db;
pub mod logging;
pub mod mapper;
pub mod models;
pub mod persistence;
pub mod remote;
pub mod server;
pub mod sync;

pub use persistence::{Persistence, PersistenceError};
