//! Thin wrapper around the OS keyring for the reporter credential.

const SERVICE: &str = "studyplan";

/// Keyring entry holding the reporter bearer token.
pub const REPORTER_TOKEN_KEY: &str = "reporter_token";

pub fn get(key: &str) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let entry = keyring::Entry::new(SERVICE, key)?;
    match entry.get_password() {
        Ok(pw) => Ok(Some(pw)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn set(key: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entry = keyring::Entry::new(SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

pub fn delete(key: &str) -> Result<(), Box<dyn std::error::Error>> {
    let entry = keyring::Entry::new(SERVICE, key)?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Stored reporter token, or `None` if absent or the keyring is unavailable.
pub fn reporter_token() -> Option<String> {
    match get(REPORTER_TOKEN_KEY) {
        Ok(token) => token.filter(|t| !t.is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, "keyring unavailable; reporting without a token");
            None
        }
    }
}
