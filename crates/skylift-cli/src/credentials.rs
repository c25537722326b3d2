//! Preflight check for provider credentials.

use anyhow::bail;

/// Fail fast when no credential source is visible. The SDK would
/// discover the same sources itself, but only after the first API
/// call, deep into a launch.
pub fn check() -> anyhow::Result<()> {
    if std::env::var("AWS_ACCESS_KEY_ID").is_ok() && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok()
    {
        return Ok(());
    }
    if let Ok(home) = std::env::var("HOME") {
        if std::path::Path::new(&home).join(".aws/credentials").is_file() {
            return Ok(());
        }
    }
    bail!(
        "no credentials found: set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY, \
         or create ~/.aws/credentials"
    );
}
