// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority.  Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/maestro/config.yaml"));
    paths.push(PathBuf::from("/etc/maestro/config.yml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/maestro/config.yaml"));
        paths.push(home.join(".config/maestro/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from("maestro.yaml"));
    paths.push(PathBuf::from("maestro.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).context("deserializing merged config")?
    };
    Ok(config)
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(slot) => merge_yaml(slot, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        let f = write_tmp("agent:\n  max_steps: 4\nsse:\n  heartbeat_seconds: 2\n");
        let c = load(Some(f.path())).unwrap();
        assert_eq!(c.agent.max_steps, 4);
        assert_eq!(c.sse.heartbeat_seconds, 2);
        // Untouched sections keep defaults.
        assert_eq!(c.agent.duplicate_threshold, 2);
    }

    #[test]
    fn load_without_files_yields_defaults() {
        let c = load(None).unwrap();
        assert_eq!(c.agent.max_steps, 10);
    }

    #[test]
    fn malformed_explicit_file_is_an_error() {
        let f = write_tmp("agent: [not, a, mapping\n");
        assert!(load(Some(f.path())).is_err());
    }

    #[test]
    fn merge_yaml_nested_scalar_override() {
        let mut dst: serde_yaml::Value =
            serde_yaml::from_str("a:\n  x: 1\n  y: 2\n").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("a:\n  y: 9\n").unwrap();
        merge_yaml(&mut dst, src);
        assert_eq!(dst["a"]["x"], serde_yaml::Value::from(1));
        assert_eq!(dst["a"]["y"], serde_yaml::Value::from(9));
    }

    #[test]
    fn merge_yaml_sequence_replaced_not_appended() {
        let mut dst: serde_yaml::Value = serde_yaml::from_str("mcp:\n  servers: [a, b]\n").unwrap();
        let src: serde_yaml::Value = serde_yaml::from_str("mcp:\n  servers: [c]\n").unwrap();
        merge_yaml(&mut dst, src);
        let servers = dst["mcp"]["servers"].as_sequence().unwrap();
        assert_eq!(servers.len(), 1);
    }
}
