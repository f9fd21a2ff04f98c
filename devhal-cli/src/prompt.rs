// SPDX-License-Identifier: GPL-3.0-only

use std::io::BufRead;

use async_trait::async_trait;
use devhal_contracts::{PassphrasePrompt, PromptError};

/// Reads the passphrase as one line from standard input.
pub struct StdinPrompt;

fn first_line(mut reader: impl BufRead) -> std::io::Result<String> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[async_trait]
impl PassphrasePrompt for StdinPrompt {
    async fn request_passphrase(&self, udi: &str) -> Result<String, PromptError> {
        eprintln!("Passphrase for {udi}:");
        tokio::task::spawn_blocking(|| first_line(std::io::stdin().lock()))
            .await
            .map_err(|e| PromptError::Unavailable(e.to_string()))?
            .map_err(|e| PromptError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_line_ending_only() {
        assert_eq!(first_line(&b" secret \r\nrest"[..]).unwrap(), " secret ");
        assert_eq!(first_line(&b""[..]).unwrap(), "");
    }
}
