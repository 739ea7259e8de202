//! Application state
//!
//! A per-process random token (`GET /api/token`) gates every action
//! endpoint; the orchestrator is the shared state everything else hangs
//! off.

use portwatch_orchestrator::Orchestrator;
use rand::RngCore;
use std::sync::Arc;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub token: Arc<str>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            token: Arc::from(generate_token().as_str()),
        }
    }
}

/// 16 random bytes, hex-encoded -- `secrets.token_hex(16)` in spirit.
fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn two_tokens_differ() {
        assert_ne!(generate_token(), generate_token());
    }
}
