//! Orchestration : build de l'image puis écriture d'un paquet `.bin` ou flash.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rap_core::ManifestEntry;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::assemble::{assemble, plan_image, ImagePlan};
use crate::config::{project_name, BuildConfiguration, DEFAULT_FLASH_SIZE};
use crate::error::{DeployError, Result};
use crate::flash::Flasher;
use crate::transpile::{CompilerStatus, Transpiler};

/// Destination de l'image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployMode {
    /// Écrire un paquet ; sans chemin, le nom du projet est utilisé.
    Package {
        /// Chemin explicite.
        path: Option<PathBuf>,
    },
    /// Flasher la carte.
    Flash,
}

/// Issue d'un déploiement réussi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// Paquet écrit.
    Packaged {
        /// Fichier écrit.
        path: PathBuf,
        /// Rapport de build.
        summary: BuildSummary,
    },
    /// Image flashée.
    Flashed {
        /// Adresse effective.
        address: u32,
        /// Rapport de build.
        summary: BuildSummary,
    },
}

impl DeployOutcome {
    /// Rapport de build.
    pub fn summary(&self) -> &BuildSummary {
        match self {
            DeployOutcome::Packaged { summary, .. } | DeployOutcome::Flashed { summary, .. } => summary,
        }
    }
}

/// Module dans le rapport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSummary {
    /// Nom.
    pub name: String,
    /// Nombre d'objets.
    pub objects: usize,
}

/// Rapport d'un build (sérialisable en JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    /// `relative` ou `absolute`.
    pub layout: &'static str,
    /// Origine demandée.
    pub origin: i64,
    /// Encodage compact ?
    pub compact: bool,
    /// Taille finale de l'image.
    pub image_len: usize,
    /// Modules, dans l'ordre de l'image.
    pub modules: Vec<ModuleSummary>,
    /// Fichiers, dans l'ordre de l'image.
    pub resources: Vec<String>,
    /// Entrées compilées.
    pub compiled: usize,
    /// Entrées copiées telles quelles.
    pub passed_through: usize,
    /// État du compilateur.
    pub compiler: &'static str,
}

impl BuildSummary {
    fn new(plan: &ImagePlan, config: &BuildConfiguration, image_len: usize, compiler: &'static str) -> Self {
        Self {
            layout: if config.origin_address < 0 { "relative" } else { "absolute" },
            origin: config.origin_address,
            compact: config.compact,
            image_len,
            modules: plan
                .modules
                .iter()
                .map(|m| ModuleSummary { name: m.name.clone(), objects: m.objects.len() })
                .collect(),
            resources: plan.resources.iter().map(|e| e.name.to_string()).collect(),
            compiled: plan.compiled,
            passed_through: plan.passed_through,
            compiler,
        }
    }
}

/* ───────────────────────────── Chemins & adresses ───────────────────────────── */

/// Ajoute `.bin` si le chemin ne finit pas déjà par `.bin` (casse ignorée).
pub fn ensure_bin_extension(path: PathBuf) -> PathBuf {
    if path.to_string_lossy().to_ascii_lowercase().ends_with(".bin") {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(".bin");
    PathBuf::from(raw)
}

/// Chemin du paquet : explicite, sinon `<projet>/<nom du package.json>`.
pub fn resolve_package_path(explicit: Option<&Path>, project_dir: &Path) -> Result<PathBuf> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => project_dir.join(project_name(project_dir)?),
    };
    Ok(ensure_bin_extension(path))
}

/// Adresse de flash : l'origine pour une image absolue ; pour une image
/// relative, l'image est posée en fin de flash (`flash_size - image_len`).
pub fn effective_address(origin: i64, image_len: usize, flash_size: u32) -> Result<u32> {
    let address = if origin < 0 {
        i64::from(flash_size) - i64::try_from(image_len).unwrap_or(i64::MAX)
    } else {
        origin
    };
    u32::try_from(address).map_err(|_| DeployError::AddressOutOfRange { address })
}

/// Écriture atomique : fichier temporaire voisin puis renommage.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let write_err = |source| DeployError::ImageWrite { path: path.to_path_buf(), source };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_err)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/* ───────────────────────────── Orchestrateur ───────────────────────────── */

/// Conduit un build complet vers un paquet ou vers la carte.
pub struct Deployer<'f> {
    project_dir: PathBuf,
    flash_size: u32,
    flasher: &'f dyn Flasher,
}

impl<'f> Deployer<'f> {
    /// Déployeur pour le projet donné (flash de 1 Mio par défaut).
    pub fn new(project_dir: impl Into<PathBuf>, flasher: &'f dyn Flasher) -> Self {
        Self { project_dir: project_dir.into(), flash_size: DEFAULT_FLASH_SIZE, flasher }
    }

    /// Taille de flash de la cible.
    pub fn with_flash_size(mut self, flash_size: u32) -> Self {
        self.flash_size = flash_size;
        self
    }

    /// Construit l'image sans la déployer.
    pub fn build(
        &self,
        manifest: Vec<ManifestEntry>,
        config: &BuildConfiguration,
        compiler: CompilerStatus,
    ) -> Result<(Vec<u8>, BuildSummary)> {
        let mut transpiler = Transpiler::new(compiler);
        let plan = plan_image(manifest, &mut transpiler)?;
        let bytes = assemble(&plan, config)?;
        let summary = BuildSummary::new(&plan, config, bytes.len(), transpiler.status().label());
        Ok((bytes, summary))
    }

    /// Build puis paquet ou flash. Toute erreur avant le flash l'empêche.
    pub fn run(
        &self,
        manifest: Vec<ManifestEntry>,
        mode: DeployMode,
        config: &BuildConfiguration,
        compiler: CompilerStatus,
    ) -> Result<DeployOutcome> {
        match mode {
            DeployMode::Package { path } => {
                let path = resolve_package_path(path.as_deref(), &self.project_dir)?;
                let (bytes, summary) = self.build(manifest, config, compiler)?;
                write_bytes_atomic(&path, &bytes)?;
                tracing::info!(path = %path.display(), len = bytes.len(), "paquet écrit");
                Ok(DeployOutcome::Packaged { path, summary })
            }
            DeployMode::Flash => {
                let (bytes, summary) = self.build(manifest, config, compiler)?;
                let address = effective_address(config.origin_address, bytes.len(), self.flash_size)?;

                let mut tmp = NamedTempFile::new()
                    .map_err(|source| DeployError::ImageWrite { path: std::env::temp_dir(), source })?;
                let tmp_path = tmp.path().to_path_buf();
                let write_err = |source| DeployError::ImageWrite { path: tmp_path.clone(), source };
                tmp.as_file_mut().write_all(&bytes).map_err(write_err)?;
                tmp.as_file_mut().flush().map_err(write_err)?;

                self.flasher.flash(tmp.path(), address)?;
                Ok(DeployOutcome::Flashed { address, summary })
            }
        }
    }
}
