// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Store Domain Layer
//!
//! Pure domain types for the aggregate and its contracts. No I/O and no
//! runtime dependencies beyond `async-trait` for the component traits.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`state`] | `AppState`, `Subsystem`, `SystemState`, `ComponentStatus` |
//! | [`memory`] | `MemoryState`, `MemoryNode`, `NodeId` |
//! | [`learning`], [`design`], [`ux`], [`school`], [`assets`], [`suggestions`] | subsystem records |
//! | [`update`] | `StateUpdate` |
//! | [`validation`] | `ValidationResult`, `StateValidationResult`, `Inconsistency` |
//! | [`events`] | `StateEvent`, `ComponentEvent` |
//! | [`component`] | `ManagedComponent`, `StateExport`, `ComponentManager` |
//! | [`config`] | `StoreConfigManifest`, `SyncConfig`, `MaintenanceConfig` |

pub mod assets;
pub mod component;
pub mod config;
pub mod design;
pub mod error;
pub mod events;
pub mod learning;
pub mod memory;
pub mod school;
pub mod state;
pub mod suggestions;
pub mod update;
pub mod ux;
pub mod validation;

pub use assets::*;
pub use component::*;
pub use config::*;
pub use design::*;
pub use error::*;
pub use events::*;
pub use learning::*;
pub use memory::*;
pub use school::*;
pub use state::*;
pub use suggestions::*;
pub use update::*;
pub use ux::*;
pub use validation::*;
