// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod process;
pub mod repositories;
pub mod tmux;

pub use event_bus::{DomainEvent, EventBus, EventReceiver};
pub use process::UnixProcessControl;
pub use repositories::{InMemoryEventStore, InMemoryPersister, JsonFilePersister, JsonlEventStore};
pub use tmux::TmuxBackend;
