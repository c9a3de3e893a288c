// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Rideline backends.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod identity;
pub mod job_store;
pub mod profile_store;

pub use adapter::PluginAdapter;
pub use identity::IdentityProvider;
pub use job_store::{JobStore, JobStream};
pub use profile_store::ProfileStore;
