// SPDX-License-Identifier: GPL-3.0-only

pub mod prompt;

pub use prompt::PassphrasePrompt;
