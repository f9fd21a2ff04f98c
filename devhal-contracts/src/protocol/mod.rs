// SPDX-License-Identifier: GPL-3.0-only

pub mod error;
pub mod events;

pub use error::{BusError, HalError, HalErrorKind, PromptError, translate_bus_error};
pub use events::{PowerEvent, StorageEvent};
