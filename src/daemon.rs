use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::hook;
use crate::ip;
use crate::scripts::ScriptDir;
use crate::service::UpdateService;

/// The update loop. Owns the configuration for the lifetime of the process
/// and reconciles every host against the current public address, round after
/// round.
pub struct Daemon {
    config: Config,
    config_path: PathBuf,
    scripts: ScriptDir,
    service: Box<dyn UpdateService>,
}

impl Daemon {
    pub fn new(
        config: Config,
        config_path: impl Into<PathBuf>,
        scripts: ScriptDir,
        service: Box<dyn UpdateService>,
    ) -> Self {
        Self {
            config,
            config_path: config_path.into(),
            scripts,
            service,
        }
    }

    /// Runs rounds forever, sleeping the configured delay between them.
    pub fn run(&mut self) -> ! {
        let delay = Duration::from_secs(self.config.settings.update_delay_seconds);

        loop {
            self.run_round();
            debug!("waiting {} second(s)", delay.as_secs());
            thread::sleep(delay);
        }
    }

    /// One pass over every configured host. Returns whether some host's
    /// tracked address changed, which is also when the configuration file
    /// gets rewritten.
    pub fn run_round(&mut self) -> bool {
        let mut dirty = false;

        let Config {
            settings,
            auths,
            hosts,
        } = &mut self.config;

        for (key, entry) in hosts.iter_mut() {
            let fallback = entry
                .fallback
                .then_some(settings.fallback_ip_method.as_ref());

            let Some(current) = ip::current_ip(&self.scripts, &entry.ip_method, fallback) else {
                error!(
                    "skipping \"{}\" as no valid IP address could be retrieved",
                    entry.hostname
                );
                continue;
            };

            if entry.last_ip == Some(current) {
                debug!("\"{}\" already points at {current}", entry.hostname);
                continue;
            }

            info!("updating \"{}\" with IP \"{current}\"", entry.hostname);

            // A dangling reference is caught at startup unless validation
            // was skipped.
            let Some(auth) = auths.get(&entry.auth) else {
                error!(
                    "error encountered while updating \"{key}\": missing authentication \"{}\"",
                    entry.auth
                );

                if settings.on_error.enabled {
                    hook::dispatch(&self.scripts, &settings.on_error.script, key);
                }

                continue;
            };

            match self.service.submit(&entry.hostname, current, auth) {
                Ok(()) => {
                    entry.last_ip = Some(current);
                    dirty = true;
                }

                Err(e) => {
                    error!("error encountered while updating \"{key}\": {e}");

                    if settings.on_error.enabled {
                        hook::dispatch(&self.scripts, &settings.on_error.script, key);
                    }
                }
            }
        }

        if dirty {
            debug!("writing the configuration after an IP change");
            // A failed write leaves the new addresses in memory only; the
            // file catches up the next time an address changes.
            if let Err(e) = self.config.persist(&self.config_path) {
                error!("could not save the configuration file: {e}");
            }
        }

        dirty
    }
}
