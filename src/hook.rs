use tracing::{error, info};

use crate::scripts::ScriptDir;

/// Fires the operator's recovery script for a host that failed to update.
/// Recovery is best-effort: failures in here are logged and swallowed, the
/// hook can never take the update loop down.
pub fn dispatch(scripts: &ScriptDir, script: &str, host_key: &str) -> Option<String> {
    match scripts.run(script, Some(host_key)) {
        Ok(output) => {
            if output.is_empty() {
                info!("recovery script \"{script}\" ran for host \"{host_key}\"");
            } else {
                info!("recovery script \"{script}\" ran for host \"{host_key}\": {output}");
            }
            Some(output)
        }

        Err(e) => {
            error!("recovery script \"{script}\" failed for host \"{host_key}\": {e}");
            None
        }
    }
}
