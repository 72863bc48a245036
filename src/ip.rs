use std::net::IpAddr;

use thiserror::Error;
use tracing::{error, warn};

use crate::scripts::{ScriptDir, ScriptError};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("\"{0}\" is not an IP address")]
    NotAnAddress(Box<str>),
}

/// Asks the `method` script (and, failing that, `fallback`) for the current
/// public address. Each script is invoked at most once per call; `None` means
/// the host has no usable address this round and should be skipped.
pub fn current_ip(scripts: &ScriptDir, method: &str, fallback: Option<&str>) -> Option<IpAddr> {
    match fetch(scripts, method) {
        Ok(ip) => return Some(ip),
        Err(e) => warn!("could not retrieve a valid IP address using \"{method}\": {e}"),
    }

    let fallback = fallback?;

    match fetch(scripts, fallback) {
        Ok(ip) => Some(ip),
        Err(e) => {
            error!("could not retrieve a valid IP address using fallback \"{fallback}\": {e}");
            None
        }
    }
}

fn fetch(scripts: &ScriptDir, method: &str) -> Result<IpAddr, ResolveError> {
    let output = scripts.run(method, None)?;

    if let Ok(ip) = output.parse::<IpAddr>() {
        return Ok(ip);
    }

    // Broken detection scripts tend to print whole error pages; keep the log
    // line short.
    let head = output.chars().take(80).collect::<String>();
    Err(ResolveError::NotAnAddress(head.into()))
}
