//! Authentication: bearer token verification for the websocket handshake

pub mod verifier;

pub use verifier::{Claims, TokenVerifier, VerifierConfig, VerifyError};
