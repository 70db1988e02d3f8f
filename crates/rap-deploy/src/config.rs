//! Configuration d'un build : fichier de layout (JSON), nom de projet
//! (`package.json`) et paramètres résolus du build.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};
use crate::transpile::DEFAULT_COMPILER;

/// Taille de la flash de la carte (1 Mio).
pub const DEFAULT_FLASH_SIZE: u32 = 1024 * 1024;

/// Origine par défaut de l'application en flash.
pub const DEFAULT_ORIGIN: i64 = 500 * 1024;

/// Utilitaire de flash par défaut.
pub const DEFAULT_FLASHER: &str = "lm4flash";

/// Paramètres de la cible, tous optionnels dans le fichier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Taille totale de la flash.
    pub flash_size: u32,
    /// Origine de l'image ; négative → image relative (OTA).
    pub origin: i64,
    /// Compilateur de scripts (nom cherché dans `PATH` ou chemin).
    pub compiler: String,
    /// Utilitaire de flash.
    pub flasher: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            flash_size: DEFAULT_FLASH_SIZE,
            origin: DEFAULT_ORIGIN,
            compiler: DEFAULT_COMPILER.to_string(),
            flasher: DEFAULT_FLASHER.to_string(),
        }
    }
}

/// Charge le fichier de layout ; `None` → valeurs par défaut.
pub fn load_layout(path: Option<&Path>) -> Result<LayoutConfig> {
    let Some(path) = path else {
        return Ok(LayoutConfig::default());
    };
    let layout_err = |reason: String| DeployError::Layout { path: path.to_path_buf(), reason };
    let text = fs::read_to_string(path).map_err(|e| layout_err(e.to_string()))?;
    let cfg: LayoutConfig = serde_json::from_str(&text).map_err(|e| layout_err(e.to_string()))?;
    if cfg.flash_size == 0 {
        return Err(layout_err("flash_size must be positive".into()));
    }
    tracing::debug!(?cfg, path = %path.display(), "layout chargé");
    Ok(cfg)
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    name: Option<String>,
}

/// Nom du projet, lu dans le champ `name` de `<dir>/package.json`.
pub fn project_name(dir: &Path) -> Result<String> {
    let path = dir.join("package.json");
    let name_err = |reason: String| DeployError::ProjectName { path: path.clone(), reason };
    let text = fs::read_to_string(&path).map_err(|e| name_err(e.to_string()))?;
    let pkg: PackageJson = serde_json::from_str(&text).map_err(|e| name_err(e.to_string()))?;
    match pkg.name.map(|n| n.trim().to_string()) {
        Some(n) if !n.is_empty() => Ok(n),
        _ => Err(name_err("missing `name` field".into())),
    }
}

/// Paramètres d'un build, fixés avant le passage sur le manifeste.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuildConfiguration {
    /// Compiler les scripts `.js`/`.json` ?
    pub compile_scripts: bool,
    /// Origine : négative → disposition relative, sinon offset flash absolu.
    pub origin_address: i64,
    /// Encodage compact ?
    pub compact: bool,
}

impl Default for BuildConfiguration {
    fn default() -> Self { Self { compile_scripts: true, origin_address: DEFAULT_ORIGIN, compact: false } }
}

impl BuildConfiguration {
    /// Construit depuis le layout ; `address` (si donné, même `0`) remplace l'origine.
    pub fn from_layout(layout: &LayoutConfig, compile_scripts: bool, address: Option<i64>, compact: bool) -> Self {
        Self { compile_scripts, origin_address: address.unwrap_or(layout.origin), compact }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_without_file() -> Result<()> {
        let cfg = load_layout(None)?;
        assert_eq!(cfg.flash_size, 1_048_576);
        assert_eq!(cfg.origin, 512_000);
        assert_eq!(cfg.compiler, "ruff-compiler");
        assert_eq!(cfg.flasher, "lm4flash");
        Ok(())
    }

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        fs::write(&path, r#"{ "origin": -1, "flasher": "/opt/bin/lm4flash" }"#).unwrap();
        let cfg = load_layout(Some(&path))?;
        assert_eq!(
            cfg,
            LayoutConfig { origin: -1, flasher: "/opt/bin/lm4flash".into(), ..LayoutConfig::default() }
        );
        Ok(())
    }

    #[test]
    fn invalid_layout_files() {
        let dir = tempfile::tempdir().unwrap();
        let unknown = dir.path().join("unknown.json");
        fs::write(&unknown, r#"{ "orign": 5 }"#).unwrap();
        let zero = dir.path().join("zero.json");
        fs::write(&zero, r#"{ "flash_size": 0 }"#).unwrap();
        let missing = dir.path().join("missing.json");

        for p in [unknown, zero, missing] {
            assert!(matches!(load_layout(Some(&p)), Err(DeployError::Layout { .. })), "{}", p.display());
        }
    }

    #[test]
    fn explicit_zero_address_wins() {
        let layout = LayoutConfig::default();
        assert_eq!(BuildConfiguration::from_layout(&layout, true, Some(0), false).origin_address, 0);
        assert_eq!(BuildConfiguration::from_layout(&layout, true, None, true).origin_address, DEFAULT_ORIGIN);
    }

    #[test]
    fn project_name_from_package_json() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name":"blinky","version":"0.1.0"}"#).unwrap();
        assert_eq!(project_name(dir.path())?, "blinky");

        fs::write(dir.path().join("package.json"), r#"{"version":"0.1.0"}"#).unwrap();
        assert!(matches!(project_name(dir.path()), Err(DeployError::ProjectName { .. })));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(project_name(empty.path()), Err(DeployError::ProjectName { .. })));
        Ok(())
    }
}
