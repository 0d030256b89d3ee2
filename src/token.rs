use rand::{rngs::OsRng, TryRngCore};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("entropy source unavailable: {0}")]
pub struct TokenError(String);

/// 128 random bits from the OS, rendered as 32 lowercase hex chars.
pub fn new_token() -> Result<String, TokenError> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError(e.to_string()))?;
    Ok(uuid::Uuid::from_bytes(bytes).simple().to_string())
}
