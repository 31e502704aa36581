pub mod auth;
pub mod delete;
pub mod list;
pub mod register;
pub mod store;
pub mod sync;

use crate::error::{ClientError, Result};

/// Use the flag value when given, otherwise prompt on the terminal.
pub fn resolve_secret(flag: Option<String>, prompt: &str) -> Result<String> {
    match flag {
        Some(value) => Ok(value),
        None => rpassword::prompt_password(prompt)
            .map_err(|e| ClientError::Io(format!("failed to read secret: {e}"))),
    }
}
