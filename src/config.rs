use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GraftError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Source parsing configuration
    pub parsing: ParsingConfig,

    /// Placeholder binding rules
    pub binding: BindingConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root that change-set file names are resolved against
    pub root: PathBuf,

    /// Paths to skip when resolving target files
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// Maximum file size to patch (in bytes)
    pub max_file_size: usize,

    /// Treat files whose syntax tree contains errors as unavailable
    pub reject_syntax_errors: bool,
}

/// A right-hand side call shape that binds a placeholder to the declared local
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryShapeConfig {
    pub shape: String,
    pub placeholder: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Factory call shapes, searched in order
    pub factories: Vec<FactoryShapeConfig>,

    /// Parameter type name -> placeholder used by change-set fragments
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Compute changes without writing any file
    pub dry_run: bool,

    /// Print unified diffs for modified files
    pub show_diff: bool,
}

impl Default for Config {
    fn default() -> Self {
        let factory = |shape: &str, placeholder: &str| FactoryShapeConfig {
            shape: shape.to_string(),
            placeholder: placeholder.to_string(),
        };

        let mut parameters = BTreeMap::new();
        parameters.insert("IServiceCollection".to_string(), "services".to_string());
        parameters.insert("IApplicationBuilder".to_string(), "app".to_string());
        parameters.insert("IWebHostEnvironment".to_string(), "env".to_string());
        parameters.insert("IConfiguration".to_string(), "configuration".to_string());

        Self {
            project: ProjectConfig {
                root: PathBuf::from("."),
                ignore_patterns: vec![
                    "bin/".to_string(),
                    "obj/".to_string(),
                    ".git/".to_string(),
                    "node_modules/".to_string(),
                ],
            },
            parsing: ParsingConfig {
                max_file_size: 1024 * 1024, // 1MB
                reject_syntax_errors: true,
            },
            binding: BindingConfig {
                factories: vec![
                    factory("WebApplication.CreateBuilder", "builder"),
                    factory("WebApplication.CreateSlimBuilder", "builder"),
                    factory("Host.CreateApplicationBuilder", "builder"),
                    factory("builder.Build", "app"),
                ],
                parameters,
            },
            output: OutputConfig {
                dry_run: false,
                show_diff: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| GraftError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| GraftError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidates = [
                    "Codegraft.toml",
                    "codegraft.toml",
                    ".codegraft.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
