// SPDX-License-Identifier: GPL-3.0-only

pub mod cache;
pub mod dbus;
pub mod protocol;
pub mod traits;

pub use cache::{CachedProperties, PropertyCache};
pub use protocol::{
    BusError, HalError, HalErrorKind, PowerEvent, PromptError, StorageEvent, translate_bus_error,
};
pub use traits::PassphrasePrompt;
