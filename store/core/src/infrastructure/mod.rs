// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: in-process transport and component registry

pub mod components;
pub mod event_bus;

pub use components::{InMemoryComponentManager, StaticComponent};
pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver, StateEventReceiver};
