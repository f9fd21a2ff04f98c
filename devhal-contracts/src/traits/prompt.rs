// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use crate::PromptError;

/// Collects a passphrase for an encrypted container from the user.
#[async_trait]
pub trait PassphrasePrompt: Send + Sync {
    /// Resolves once the user answered. An empty string means the user cancelled.
    async fn request_passphrase(&self, udi: &str) -> Result<String, PromptError>;
}
