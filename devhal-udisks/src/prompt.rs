// SPDX-License-Identifier: GPL-3.0-only

//! Passphrase prompt served by a desktop UI server over the session bus.
//!
//! The UI server is asked to show a dialog and answers by calling
//! `passphraseReply` on a per-request object path of this process. The reply
//! is matched on path and member only; KDE's server sends it without an
//! interface name.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use devhal_contracts::{BusError, PassphrasePrompt, PromptError};
use futures::StreamExt;
use zbus::message::{Flags, Type};
use zbus::{Connection, MatchRule, MessageStream};

const REPLY_MEMBER: &str = "passphraseReply";

static RETURN_OBJECT_COUNTER: AtomicU32 = AtomicU32::new(1);

/// A fresh, process-unique object path for one passphrase reply.
pub fn generate_return_object_path(prefix: &str) -> String {
    let number = RETURN_OBJECT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{number}")
}

#[derive(Debug, Clone)]
pub struct PromptSettings {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub return_path_prefix: String,
    pub app_id: String,
    /// X11 window to parent the dialog on; 0 for none.
    pub window_id: u32,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            service: "org.kde.kded5".into(),
            path: "/modules/soliduiserver".into(),
            interface: "org.kde.SolidUiServer".into(),
            return_path_prefix: "/org/devhal/StorageAccess".into(),
            app_id: "devhal".into(),
            window_id: 0,
        }
    }
}

pub struct DbusPassphrasePrompt {
    connection: Connection,
    settings: PromptSettings,
}

impl DbusPassphrasePrompt {
    pub fn new(connection: Connection, settings: PromptSettings) -> Self {
        Self {
            connection,
            settings,
        }
    }

    pub async fn session(settings: PromptSettings) -> Result<Self, BusError> {
        Ok(Self::new(Connection::session().await?, settings))
    }

    async fn replies_at(&self, return_object: &str) -> Result<MessageStream, BusError> {
        let rule = MatchRule::builder()
            .msg_type(Type::MethodCall)
            .path(return_object)?
            .member(REPLY_MEMBER)?
            .build();
        Ok(MessageStream::for_match_rule(rule, &self.connection, None).await?)
    }

    async fn show_dialog(&self, udi: &str, return_object: &str) -> Result<(), BusError> {
        let unique_name = self
            .connection
            .unique_name()
            .map(|name| name.to_string())
            .unwrap_or_default();

        let proxy = zbus::Proxy::new(
            &self.connection,
            self.settings.service.clone(),
            self.settings.path.clone(),
            self.settings.interface.clone(),
        )
        .await?;

        proxy
            .call_method(
                "showPassphraseDialog",
                &(
                    udi,
                    unique_name.as_str(),
                    return_object,
                    self.settings.window_id,
                    self.settings.app_id.as_str(),
                ),
            )
            .await?;
        Ok(())
    }

    /// First well-formed `passphraseReply(s)` on the stream.
    async fn next_reply(&self, replies: &mut MessageStream) -> Result<String, PromptError> {
        while let Some(message) = replies.next().await {
            let message = message.map_err(BusError::from)?;
            let passphrase: String = match message.body().deserialize() {
                Ok(passphrase) => passphrase,
                Err(e) => {
                    tracing::debug!("Ignoring malformed passphrase reply: {e}");
                    continue;
                }
            };

            let wants_reply = !message
                .primary_header()
                .flags()
                .contains(Flags::NoReplyExpected);
            if wants_reply {
                if let Err(e) = self.connection.reply(&message.header(), &()).await {
                    tracing::debug!("Could not acknowledge passphrase reply: {e}");
                }
            }
            return Ok(passphrase);
        }
        Err(PromptError::Closed)
    }
}

#[async_trait]
impl PassphrasePrompt for DbusPassphrasePrompt {
    async fn request_passphrase(&self, udi: &str) -> Result<String, PromptError> {
        let return_object = generate_return_object_path(&self.settings.return_path_prefix);
        let mut replies = self.replies_at(&return_object).await?;

        if let Err(e) = self.show_dialog(udi, &return_object).await {
            tracing::warn!("Failed to call the passphrase UI server: {e}");
            return Err(PromptError::Unavailable(e.to_string()));
        }

        self.next_reply(&mut replies).await
    }
}
