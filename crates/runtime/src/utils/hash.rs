//! Hashing utilities for game state.
//!
//! Provides a deterministic digest of the full world for desync reports, so
//! logs from two instances can be compared beyond the PRNG fingerprint.

use game_core::GameState;
use sha2::{Digest, Sha256};

/// SHA-256 of the bincode-serialized state, first 8 bytes as hex.
pub fn state_digest(state: &GameState) -> String {
    match bincode::serialize(state) {
        Ok(bytes) => {
            let hash = Sha256::digest(&bytes);
            hex::encode(&hash[..8])
        }
        Err(_) => String::from("unavailable"),
    }
}
