//! rap-cli : bibliothèque interne du binaire `rap`
//!
//! Le parsing d'arguments reste dans `main.rs` ; ici :
//! - les tâches haut-niveau (`deploy`, `system upgrade`, `inspect`)
//! - le scan du projet en manifeste ordonné
//! - le rendu de l'inspection d'image
//! - logger (`feature = "trace"`) et lignes d'état colorées (`feature = "color"`)

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use camino::Utf8PathBuf;
use walkdir::{DirEntry, WalkDir};

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

use rap_deploy::prelude::*;
use rap_image::ImageView;

// ───────────────────────────── Types publics ─────────────────────────────

/// Commande haut-niveau (sans parsing CLI, réservé à main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Construire l'image du projet puis flasher ou écrire un paquet.
    Deploy(DeployTask),
    /// Flasher un firmware complet à l'adresse 0.
    Upgrade(UpgradeTask),
    /// Décoder une image `.bin`.
    Inspect(InspectTask),
}

#[derive(Clone, Debug)]
pub struct DeployTask {
    pub project: PathBuf,             // racine du projet (package.json, ruff_modules/)
    pub compile_scripts: bool,        // false avec --source
    pub mode: DeployMode,             // paquet ou flash
    pub compact: bool,                // --package-compact
    pub address: Option<i64>,         // remplace l'origine du layout
    pub layout: Option<PathBuf>,      // fichier JSON de layout
    pub flash_timeout: Option<u64>,   // secondes
    pub summary: bool,                // rapport JSON sur stdout
}

#[derive(Clone, Debug)]
pub struct UpgradeTask {
    pub firmware: PathBuf,
    pub layout: Option<PathBuf>,
    pub flash_timeout: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct InspectTask {
    pub input: PathBuf,
    pub json: bool,
}

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger selon la feature `trace`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .format_timestamp(None)
            .try_init();
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande. Retourne un code de sortie.
pub fn execute(cmd: Command) -> Result<i32> {
    match cmd {
        Command::Deploy(t) => deploy(t),
        Command::Upgrade(t) => upgrade(t),
        Command::Inspect(t) => inspect(&t),
    }
}

fn deploy(task: DeployTask) -> Result<i32> {
    let layout = load_layout(task.layout.as_deref())?;
    let config = BuildConfiguration::from_layout(&layout, task.compile_scripts, task.address, task.compact);
    let manifest = scan_manifest(&task.project)?;
    log::info!("{} entrées dans {}", manifest.len(), task.project.display());

    let compiler = resolve_compiler(config.compile_scripts, &layout.compiler);
    let flasher = Lm4Flash::new(&layout.flasher).with_timeout(task.flash_timeout.map(Duration::from_secs));
    let deployer = Deployer::new(&task.project, &flasher).with_flash_size(layout.flash_size);

    let outcome = deployer.run(manifest, task.mode, &config, compiler).context("deployment failed")?;
    match &outcome {
        DeployOutcome::Packaged { path, summary } => {
            status_ok("PACKAGE", &format!("{} ({} bytes)", path.display(), summary.image_len));
        }
        DeployOutcome::Flashed { address, summary } => {
            status_ok("FLASH", &format!("{} bytes at {address:#x}", summary.image_len));
        }
    }
    if task.summary {
        println!("{}", serde_json::to_string_pretty(outcome.summary())?);
    }
    Ok(0)
}

fn upgrade(task: UpgradeTask) -> Result<i32> {
    let layout = load_layout(task.layout.as_deref())?;
    let flasher = Lm4Flash::new(&layout.flasher).with_timeout(task.flash_timeout.map(Duration::from_secs));
    upgrade_firmware(&flasher, &task.firmware).context("firmware upgrade failed")?;
    status_ok("FLASH", &format!("firmware {} at 0x0", task.firmware.display()));
    Ok(0)
}

fn inspect(task: &InspectTask) -> Result<i32> {
    let bytes = fs::read(&task.input).with_context(|| format!("lecture {}", task.input.display()))?;
    let view = ImageView::from_bytes(&bytes).with_context(|| format!("image invalide: {}", task.input.display()))?;
    if task.json {
        println!("{}", serde_json::to_string_pretty(&inspect_json(&view, bytes.len()))?);
    } else {
        print!("{}", render_inspect(&view, bytes.len()));
    }
    Ok(0)
}

// ───────────────────────────── Manifeste ─────────────────────────────

/// Produit le manifeste d'un projet : fichiers triés par nom, noms logiques
/// en `/`, sans entrées cachées, sans `node_modules` ni paquets `.bin` à la racine.
pub fn scan_manifest(project: &Path) -> Result<Vec<ManifestEntry>> {
    if !project.is_dir() {
        return Err(anyhow!("dossier projet introuvable: {}", project.display()));
    }
    let walker = WalkDir::new(project)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped_dir_entry(e));

    let mut manifest = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("parcours de {}", project.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.depth() == 1 && has_bin_extension(entry.path()) {
            log::debug!("paquet ignoré: {}", entry.path().display());
            continue;
        }
        let rel = entry.path().strip_prefix(project)?;
        manifest.push(ManifestEntry::from_source(logical_name(rel)?, entry.path()));
    }
    Ok(manifest)
}

fn is_skipped_dir_entry(e: &DirEntry) -> bool {
    let name = e.file_name().to_string_lossy();
    name.starts_with('.') || (e.file_type().is_dir() && name == "node_modules")
}

fn has_bin_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
}

fn logical_name(rel: &Path) -> Result<Utf8PathBuf> {
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| anyhow!("chemin non UTF-8: {}", rel.display()))?;
    Ok(Utf8PathBuf::from(parts.join("/")))
}

// ───────────────────────────── Inspection ─────────────────────────────

/// Rendu texte d'une image décodée.
pub fn render_inspect(view: &ImageView, total: usize) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "layout   {}{}", view.kind.name(), if view.compact { " (compact)" } else { "" });
    if let Some(origin) = view.origin {
        let _ = writeln!(s, "origin   {origin:#x}");
    }
    let _ = writeln!(s, "size     {total} bytes");
    let _ = writeln!(s, "crc32    {:#010x}", view.crc32);
    let _ = writeln!(s, "modules  {}", view.modules.len());
    for m in &view.modules {
        let sizes: Vec<String> = m.objects.iter().map(|o| format!("{} B", o.len())).collect();
        let _ = writeln!(s, "  {:<16} {} object(s) {}", m.name, m.objects.len(), sizes.join(", "));
    }
    let _ = writeln!(s, "files    {}", view.files.len());
    for f in &view.files {
        let _ = writeln!(s, "  {:<32} {} B", f.name, f.data.len());
    }
    s
}

fn inspect_json(view: &ImageView, total: usize) -> serde_json::Value {
    serde_json::json!({
        "layout": view.kind.name(),
        "compact": view.compact,
        "origin": view.origin,
        "size": total,
        "crc32": view.crc32,
        "modules": view.modules.iter().map(|m| serde_json::json!({
            "name": m.name,
            "objects": m.objects.iter().map(Vec::len).collect::<Vec<_>>(),
        })).collect::<Vec<_>>(),
        "files": view.files.iter().map(|f| serde_json::json!({
            "name": f.name,
            "size": f.data.len(),
        })).collect::<Vec<_>>(),
    })
}

// ───────────────────────────── Affichage ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.green().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

// ───────────────────────────── Tests ─────────────────────────────
