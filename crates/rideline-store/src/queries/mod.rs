// SPDX-FileCopyrightText: 2026 Rideline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the jobs table, its change log, and driver profiles.

pub mod changes;
pub mod jobs;
pub mod profiles;
