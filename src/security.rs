#![forbid(unsafe_code)]

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Startup guard. Everything vidflow writes (downloads, yt-dlp scratch
/// directories) should belong to the service account, not to uid 0.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "refusing to start {process} with uid 0: downloaded files and yt-dlp runs would be owned by root"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_account_may_start() {
        assert!(ensure_not_root_for(Uid::from_raw(1000), "backend").is_ok());
    }

    #[test]
    fn uid_zero_is_refused_with_process_name() {
        let err = ensure_not_root_for(Uid::from_raw(0), "backend").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("refusing to start backend with uid 0"));
        assert!(message.contains("owned by root"));
    }
}
