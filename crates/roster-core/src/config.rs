use std::{
    env, fs,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{aggregate::EngineConfig, errors::Error, Result};

/// Typed runtime configuration, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Server
    pub bind_addr: IpAddr,
    pub port: u16,

    // Platform credentials (handed to connectors that need them)
    pub api_id: Option<i32>,
    pub api_hash: Option<String>,
    pub fixture_path: Option<PathBuf>,

    // Enumeration
    pub participants_page_size: usize,
    pub messages_page_size: usize,
    pub members_progress_every: u64,
    pub messages_progress_every: u64,
    pub enumeration_min_interval: Duration,

    // Streaming
    pub stream_buffer: usize,

    // Logging
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0, 0, 0, 0]),
            port: 8000,
            api_id: None,
            api_hash: None,
            fixture_path: None,
            participants_page_size: 200,
            messages_page_size: 100,
            members_progress_every: 50,
            messages_progress_every: 100,
            enumeration_min_interval: Duration::ZERO,
            stream_buffer: 64,
            log_json: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `load` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let get = |key: &str| lookup(key).and_then(non_empty);

        let bind_addr = match get("ROSTER_BIND") {
            Some(s) => s
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| Error::Config(format!("ROSTER_BIND is not an IP address: {s}")))?,
            None => d.bind_addr,
        };
        let port = parse_or(&get, "PORT", d.port)?;

        let api_id = get("API_ID")
            .map(|s| {
                s.trim()
                    .parse::<i32>()
                    .map_err(|_| Error::Config(format!("API_ID must be an integer: {s}")))
            })
            .transpose()?;
        let api_hash = get("API_HASH");
        let fixture_path = get("ROSTER_FIXTURE").map(PathBuf::from);

        let participants_page_size =
            parse_or(&get, "PARTICIPANTS_PAGE_SIZE", d.participants_page_size)?;
        let messages_page_size = parse_or(&get, "MESSAGES_PAGE_SIZE", d.messages_page_size)?;
        let members_progress_every =
            parse_or(&get, "MEMBERS_PROGRESS_EVERY", d.members_progress_every)?;
        let messages_progress_every =
            parse_or(&get, "MESSAGES_PROGRESS_EVERY", d.messages_progress_every)?;
        let enumeration_min_interval =
            Duration::from_millis(parse_or(&get, "ENUMERATION_MIN_INTERVAL_MS", 0u64)?);
        let stream_buffer = parse_or(&get, "STREAM_BUFFER", d.stream_buffer)?;
        let log_json = get("LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(d.log_json);

        for (key, v) in [
            ("PARTICIPANTS_PAGE_SIZE", participants_page_size as u64),
            ("MESSAGES_PAGE_SIZE", messages_page_size as u64),
            ("MEMBERS_PROGRESS_EVERY", members_progress_every),
            ("MESSAGES_PROGRESS_EVERY", messages_progress_every),
            ("STREAM_BUFFER", stream_buffer as u64),
        ] {
            if v == 0 {
                return Err(Error::Config(format!("{key} must be greater than zero")));
            }
        }

        Ok(Self {
            bind_addr,
            port,
            api_id,
            api_hash,
            fixture_path,
            participants_page_size,
            messages_page_size,
            members_progress_every,
            messages_progress_every,
            enumeration_min_interval,
            stream_buffer,
            log_json,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            participants_page_size: self.participants_page_size,
            messages_page_size: self.messages_page_size,
            members_progress_every: self.members_progress_every,
            messages_progress_every: self.messages_progress_every,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {s}"))),
        None => Ok(default),
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Apply `KEY=value` pairs from `path` to the process environment.
/// Variables that are already set keep their value; a missing file is fine.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in dotenv_pairs(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

fn dotenv_pairs(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), dotenv_value(value.trim())))
        })
        .collect()
}

/// Quoted values are taken verbatim; unquoted ones lose a trailing ` # comment`.
fn dotenv_value(raw: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    match raw.find(" #") {
        Some(i) => raw[..i].trim_end().to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0");
        assert_eq!(cfg.participants_page_size, 200);
        assert_eq!(cfg.messages_page_size, 100);
        assert_eq!(cfg.members_progress_every, 50);
        assert_eq!(cfg.messages_progress_every, 100);
        assert_eq!(cfg.stream_buffer, 64);
        assert_eq!(cfg.enumeration_min_interval, Duration::ZERO);
        assert!(cfg.api_id.is_none());
        assert!(!cfg.log_json);
    }

    #[test]
    fn reads_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("ROSTER_BIND", "127.0.0.1"),
            ("PORT", "9001"),
            ("API_ID", "12345"),
            ("API_HASH", "abc"),
            ("ROSTER_FIXTURE", "/tmp/world.json"),
            ("MESSAGES_PROGRESS_EVERY", "10"),
            ("ENUMERATION_MIN_INTERVAL_MS", "250"),
            ("LOG_JSON", "yes"),
        ]))
        .unwrap();

        assert_eq!(cfg.port, 9001);
        assert_eq!(cfg.api_id, Some(12345));
        assert_eq!(cfg.api_hash.as_deref(), Some("abc"));
        assert_eq!(cfg.fixture_path, Some(PathBuf::from("/tmp/world.json")));
        assert_eq!(cfg.engine_config().messages_progress_every, 10);
        assert_eq!(cfg.enumeration_min_interval, Duration::from_millis(250));
        assert!(cfg.log_json);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&[("PORT", "  "), ("API_HASH", "")])).unwrap();
        assert_eq!(cfg.port, 8000);
        assert!(cfg.api_hash.is_none());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("PORT", "eighty")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ROSTER_BIND", "localhost:1")])),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("STREAM_BUFFER", "0")])),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn dotenv_lines() {
        let pairs = dotenv_pairs(
            "# comment\n\
             PORT=9000\n\
             export API_HASH = 'a b'\n\
             ROSTER_FIXTURE=\"/tmp/w #1.json\"\n\
             LOG_JSON=true # enable\n\
             =orphan\n\
             no_equals\n",
        );
        let pairs: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("PORT", "9000"),
                ("API_HASH", "a b"),
                ("ROSTER_FIXTURE", "/tmp/w #1.json"),
                ("LOG_JSON", "true"),
            ]
        );
    }
}
