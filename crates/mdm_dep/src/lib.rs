//! # MDM DEP
//!
//! Keeps the Device Enrollment Program roster in sync and assigns enrollment
//! profiles to new devices.
//!
//! ## Components
//!
//! - [`DepClient`]: the DEP API seam, with [`HttpDepClient`] for Apple's JSON
//!   endpoints and [`MockDepClient`] for tests
//! - [`Watcher`]: the fetch/sync loop, controlled through a [`WatcherHandle`]
//! - [`TokenListener`]: starts the watcher when credentials are published
//! - [`CursorStore`] and [`AutoAssignerStore`]: state kept in a
//!   [`mdm_store::MapStore`]
//! - [`auto_assign`]: profile assignment for newly added devices
//!
//! Cursor conditions reported by the API are structured [`DepError`] kinds;
//! the watcher turns them into phase changes and never surfaces them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assigner;
mod auto_assign;
mod client;
mod config;
mod cursor;
mod error;
mod http;
mod listener;
mod mock;
mod watcher;

pub use assigner::{AutoAssigner, AutoAssignerStore, AUTO_ASSIGN_BUCKET, WILDCARD_FILTER};
pub use auto_assign::{auto_assign, plan, AssignSummary};
pub use client::{
    DepClient, DepClientFactory, DeviceResponse, ProfileAssignment, ASSIGN_FAILED,
    ASSIGN_NOT_ACCESSIBLE, ASSIGN_SUCCESS,
};
pub use config::WatcherConfig;
pub use cursor::{Cursor, CursorStore, DEP_SYNC_BUCKET};
pub use error::{DepError, DepResult, SyncError, SyncResult};
pub use http::{HttpClient, HttpDepClient, HttpResponse, Method, DEFAULT_BASE_URL};
pub use listener::TokenListener;
pub use mock::{MockCall, MockDepClient};
pub use watcher::{SyncPhase, Watcher, WatcherHandle, WatcherStats};
