//! External tool detection and management.
//!
//! The [`ToolRegistry`] discovers and caches the locations of external CLI
//! tools (ffmpeg, ffprobe, and the programs named by the vocal isolation and
//! transcription command templates) and provides lookup methods for the
//! stage executors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Tools every installation needs.
const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// A resolved external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolConfig {
    /// Human-readable tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool configurations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// Every name that was looked up, found or not.
    wanted: Vec<String>,
    tools: BTreeMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover ffmpeg and ffprobe, honouring path overrides from config.
    ///
    /// If the [`sf_core::config::ToolsConfig`] supplies a custom path **and**
    /// that path exists, it is used directly. Otherwise [`which::which`] is
    /// used to locate the tool in `PATH`. Tools that are not found are
    /// omitted from the registry.
    pub fn discover(tools_config: &sf_core::config::ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => tools_config.ffmpeg_path.as_deref(),
                "ffprobe" => tools_config.ffprobe_path.as_deref(),
                _ => None,
            };
            registry.add(name, custom_path);
        }

        registry
    }

    /// Also resolve `program`, which may be a bare name or a path.
    pub fn with_program(mut self, program: &str) -> Self {
        let as_path = Path::new(program);
        if as_path.components().count() > 1 {
            self.add(program, Some(as_path));
        } else {
            self.add(program, None);
        }
        self
    }

    fn add(&mut self, name: &str, custom_path: Option<&Path>) {
        if self.wanted.iter().any(|w| w == name) {
            return;
        }
        self.wanted.push(name.to_string());

        let resolved = match custom_path {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => {
                tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist; searching PATH");
                which::which(name).ok()
            }
            None => which::which(name).ok(),
        };

        if let Some(path) = resolved {
            self.tools.insert(
                name.to_string(),
                ToolConfig {
                    name: name.to_string(),
                    path,
                },
            );
        }
    }

    /// Build a registry from explicit paths without searching `PATH`.
    pub fn from_paths(entries: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        let mut registry = Self::default();
        for (name, path) in entries {
            registry.wanted.push(name.clone());
            registry.tools.insert(name.clone(), ToolConfig { name, path });
        }
        registry
    }

    /// Return the [`ToolConfig`] for the given tool, or an
    /// [`sf_core::Error::Tool`] if the tool was not found during discovery.
    pub fn require(&self, name: &str) -> sf_core::Result<&ToolConfig> {
        self.tools.get(name).ok_or_else(|| {
            sf_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Resolved path for `program`, falling back to the name itself so the
    /// OS can still search `PATH` at spawn time.
    pub fn path_or_name(&self, program: &str) -> PathBuf {
        self.tools
            .get(program)
            .map(|t| t.path.clone())
            .unwrap_or_else(|| PathBuf::from(program))
    }

    /// Check all looked-up tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.wanted
            .iter()
            .map(|name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.clone(),
                    available: true,
                    version: detect_version(name, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.clone(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }

    /// Names that were looked up but not found.
    pub fn missing(&self) -> Vec<&str> {
        self.wanted
            .iter()
            .filter(|w| !self.tools.contains_key(w.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Run `<tool> -version` for ffmpeg/ffprobe or `<tool> --version` otherwise
/// and return the first line of stdout.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let tool = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let version_arg = match tool.as_str() {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::config::ToolsConfig;

    #[test]
    fn discover_with_default_config() {
        let cfg = ToolsConfig::default();
        let registry = ToolRegistry::discover(&cfg);
        // We cannot guarantee any tool is installed in CI,
        // but the call itself must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::discover(&ToolsConfig::default());
        let err = registry.require("nonexistent_tool_xyz").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn check_all_lists_requested_programs() {
        let registry = ToolRegistry::discover(&ToolsConfig::default())
            .with_program("nonexistent_whisper_xyz")
            .with_program("ffmpeg");
        let infos = registry.check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "ffprobe", "nonexistent_whisper_xyz"]);
        assert!(registry.missing().contains(&"nonexistent_whisper_xyz"));
    }

    #[test]
    fn missing_custom_path_falls_back() {
        let cfg = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/definitely/not/ffmpeg")),
            ffprobe_path: None,
        };
        let registry = ToolRegistry::discover(&cfg);
        if let Ok(ffmpeg) = registry.require("ffmpeg") {
            assert_ne!(ffmpeg.path, PathBuf::from("/definitely/not/ffmpeg"));
        }
    }

    #[test]
    fn from_paths_and_path_or_name() {
        let registry =
            ToolRegistry::from_paths([("ffmpeg".to_string(), PathBuf::from("/opt/ff/ffmpeg"))]);
        assert_eq!(registry.require("ffmpeg").unwrap().path, PathBuf::from("/opt/ff/ffmpeg"));
        assert_eq!(registry.path_or_name("ffmpeg"), PathBuf::from("/opt/ff/ffmpeg"));
        assert_eq!(registry.path_or_name("whisper"), PathBuf::from("whisper"));
    }
}
