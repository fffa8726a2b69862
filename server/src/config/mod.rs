/*
 * Created on Sat Jun 07 2025
 *
 * This file is a part of Photon
 * Photon is a free and open-source in-memory key/value database with
 * Redis-style semantics written by Sayan Nandan ("the Author") with the
 * vision to provide a small, fast and predictable data layer without
 * compromising on correctness.
 *
 * Copyright (c) 2025, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # Server configuration
//!
//! Configuration comes from two layered sources: an optional `photon.toml`
//! in the working directory, overridden by `PHOTON_*` environment
//! variables. Parse failures are collected on an error stack per source so
//! the operator sees everything that's wrong at once instead of one
//! complaint per restart.

// internal modules
mod cfgenv;
mod cfgfile;
mod feedback;
// internal imports
use {
    self::feedback::{ErrorStack, WarningStack},
    crate::dbnet::MAXIMUM_CONNECTION_LIMIT,
    core::str::FromStr,
    std::{
        env::VarError,
        fmt, fs,
        io::ErrorKind,
        net::{IpAddr, Ipv4Addr},
    },
};

// server defaults
const DEFAULT_IPV4: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
const DEFAULT_PORT: u16 = 1234;
const DEFAULT_MAXCON: usize = MAXIMUM_CONNECTION_LIMIT;
/// Connections silent for this long are dropped
const DEFAULT_IDLE_TIMEOUT_MS: u64 = 20_000;
// bgsave defaults
const DEFAULT_BGSAVE_DURATION: u64 = 120;
/// The location of the config file, relative to the working directory
const CONFIG_FILE: &str = "photon.toml";

#[derive(Debug, Clone, PartialEq)]
/// The BGSAVE configuration
pub enum BGSave {
    Enabled(u64),
    Disabled,
}

impl BGSave {
    /// Zero seconds means "don't"
    pub const fn from_duration(every: u64) -> Self {
        if every == 0 {
            BGSave::Disabled
        } else {
            BGSave::Enabled(every)
        }
    }
    pub const fn is_disabled(&self) -> bool {
        matches!(self, BGSave::Disabled)
    }
}

impl Default for BGSave {
    fn default() -> Self {
        BGSave::Enabled(DEFAULT_BGSAVE_DURATION)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The final, fully resolved runtime configuration
pub struct ConfigurationSet {
    pub host: IpAddr,
    pub port: u16,
    pub maxcon: usize,
    pub noart: bool,
    pub idle_timeout_ms: u64,
    pub bgsave: BGSave,
}

impl Default for ConfigurationSet {
    fn default() -> Self {
        ConfigurationSet {
            host: DEFAULT_IPV4,
            port: DEFAULT_PORT,
            maxcon: DEFAULT_MAXCON,
            noart: false,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            bgsave: BGSave::default(),
        }
    }
}

impl ConfigurationSet {
    /// Should the terminal artwork be printed on startup?
    pub const fn is_artful(&self) -> bool {
        !self.noart
    }
}

#[derive(Debug)]
pub enum ConfigError {
    OSError(std::io::Error),
    FileParse(String),
    CfgError(ErrorStack),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OSError(e) => write!(f, "OS error while reading configuration: {}", e),
            Self::FileParse(e) => write!(f, "Bad configuration file: {}", e),
            Self::CfgError(stack) => write!(f, "{}", stack),
        }
    }
}

/// A configuration under construction, accumulating values and complaints
pub struct Configset {
    cfg: ConfigurationSet,
    estack: ErrorStack,
    wstack: WarningStack,
}

impl Configset {
    fn new() -> Self {
        Configset {
            cfg: ConfigurationSet::default(),
            estack: ErrorStack::new("Configuration"),
            wstack: WarningStack::new("Configuration"),
        }
    }
    /// Pull one `T`-typed value out of the environment, if present
    fn env_var<T: FromStr>(
        &mut self,
        key: &'static str,
        set: impl FnOnce(&mut ConfigurationSet, T),
    ) {
        match std::env::var(key) {
            Ok(raw) => match raw.parse::<T>() {
                Ok(value) => set(&mut self.cfg, value),
                Err(_) => self
                    .estack
                    .push(format!("Bad value for `{}`: '{}'", key, raw)),
            },
            Err(VarError::NotPresent) => {}
            Err(VarError::NotUnicode(_)) => self
                .estack
                .push(format!("Bad value for `{}`: not unicode", key)),
        }
    }
    fn apply_file(&mut self, file: cfgfile::Config) {
        self.cfg.host = file.server.host;
        self.cfg.port = file.server.port;
        if let Some(noart) = file.server.noart {
            self.cfg.noart = noart;
        }
        if let Some(maxclient) = file.server.maxclient {
            self.cfg.maxcon = maxclient;
        }
        if let Some(idle_timeout) = file.server.idle_timeout {
            self.cfg.idle_timeout_ms = idle_timeout;
        }
        if let Some(bgsave) = file.bgsave {
            let every = bgsave.every.unwrap_or(DEFAULT_BGSAVE_DURATION);
            self.cfg.bgsave = match bgsave.enabled {
                Some(false) => BGSave::Disabled,
                _ => BGSave::from_duration(every),
            };
        }
    }
    fn validate(&mut self) {
        if self.cfg.maxcon > MAXIMUM_CONNECTION_LIMIT {
            self.wstack.push(format!(
                "The maximum number of connections is capped at {}",
                MAXIMUM_CONNECTION_LIMIT
            ));
            self.cfg.maxcon = MAXIMUM_CONNECTION_LIMIT;
        }
        if self.cfg.maxcon == 0 {
            self.estack.push("`maxclient` must be at least 1");
        }
        if self.cfg.idle_timeout_ms == 0 {
            self.estack.push("`idle_timeout` must be at least 1 ms");
        }
    }
    fn finish(mut self) -> Result<ConfigurationSet, ConfigError> {
        self.validate();
        if self.estack.is_empty() {
            self.wstack.print_warnings();
            Ok(self.cfg)
        } else {
            Err(ConfigError::CfgError(self.estack))
        }
    }
}

/// Resolve the configuration from the file (if any) and the environment
pub fn get_config() -> Result<ConfigurationSet, ConfigError> {
    let mut cs = Configset::new();
    match fs::read_to_string(CONFIG_FILE) {
        Ok(raw) => {
            let parsed =
                toml::from_str(&raw).map_err(|e| ConfigError::FileParse(e.to_string()))?;
            cs.apply_file(parsed);
            log::info!("Using settings from {}", CONFIG_FILE);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("No configuration file supplied. Using default settings");
        }
        Err(e) => return Err(ConfigError::OSError(e)),
    }
    cfgenv::apply_env_config(&mut cs);
    cs.finish()
}

#[cfg(test)]
mod tests {
    use super::{BGSave, Configset, ConfigurationSet};

    #[test]
    fn defaults_are_sane() {
        let cfg = ConfigurationSet::default();
        assert_eq!(cfg.port, 1234);
        assert_eq!(cfg.idle_timeout_ms, 20_000);
        assert!(cfg.is_artful());
        assert_eq!(cfg.bgsave, BGSave::Enabled(120));
    }

    #[test]
    fn file_values_override_defaults() {
        let raw = r#"
            [server]
            host = "0.0.0.0"
            port = 4321
            maxclient = 128

            [bgsave]
            enabled = false
        "#;
        let mut cs = Configset::new();
        cs.apply_file(toml::from_str(raw).unwrap());
        let cfg = cs.finish().unwrap();
        assert_eq!(cfg.port, 4321);
        assert_eq!(cfg.maxcon, 128);
        assert!(cfg.bgsave.is_disabled());
    }

    // one test owns the process environment to keep the harness
    // parallelism-safe
    #[test]
    fn env_source_overrides_and_complains() {
        std::env::set_var("PHOTON_PORT", "9999");
        let raw = r#"
            [server]
            host = "127.0.0.1"
            port = 4321
        "#;
        let mut cs = Configset::new();
        cs.apply_file(toml::from_str(raw).unwrap());
        super::cfgenv::apply_env_config(&mut cs);
        let cfg = cs.finish().unwrap();
        std::env::remove_var("PHOTON_PORT");
        assert_eq!(cfg.port, 9999);

        std::env::set_var("PHOTON_MAXCON", "not-a-number");
        let mut cs = Configset::new();
        super::cfgenv::apply_env_config(&mut cs);
        std::env::remove_var("PHOTON_MAXCON");
        assert!(cs.finish().is_err());
    }

    #[test]
    fn zero_maxcon_is_rejected() {
        let mut cs = Configset::new();
        cs.cfg.maxcon = 0;
        assert!(cs.finish().is_err());
    }
}
