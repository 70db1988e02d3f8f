//! rap-deploy : constructeur d'images de déploiement.
//!
//! Chaîne : manifeste ordonné → classification → modules natifs / fichiers
//! → compilation des scripts (en place) → image → paquet `.bin` ou flash.
//!
//! ## Modules
//! - [`classify`] : `EntryKind` par extension (`.so`, `.js`, `.json`, reste)
//! - [`group`]    : nom de module sous `ruff_modules`, `ModuleSet` (sentinelle `dht11`)
//! - [`transpile`]: enveloppes, `ScriptCompiler`, `CompilerStatus`, `Transpiler`
//! - [`assemble`] : `plan_image`, `assemble` (sérialiseur de `rap-image`)
//! - [`config`]   : `LayoutConfig` (JSON), `BuildConfiguration`, nom de projet
//! - [`flash`]    : `Flasher`, `Lm4Flash`, `upgrade_firmware`
//! - [`deploy`]   : `Deployer`, `DeployMode`, `DeployOutcome`, `BuildSummary`
//!
//! Les journaux passent par `tracing` (pont `log` activé).

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

pub mod assemble;
pub mod classify;
pub mod config;
pub mod deploy;
pub mod error;
pub mod flash;
pub mod group;
pub mod transpile;

pub use assemble::{assemble, plan_image, ImagePlan};
pub use classify::{classify, EntryKind, ScriptKind};
pub use config::{load_layout, project_name, BuildConfiguration, LayoutConfig};
pub use deploy::{
    effective_address, ensure_bin_extension, resolve_package_path, BuildSummary, DeployMode, DeployOutcome,
    Deployer, ModuleSummary,
};
pub use error::{DeployError, Result};
pub use flash::{upgrade_firmware, Flasher, Lm4Flash};
pub use group::{module_name, ModuleSet, MODULES_DIR, SENTINEL_MODULE};
pub use transpile::{resolve_compiler, CompilerStatus, ProcessCompiler, ScriptCompiler, Transpiled, Transpiler};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/* ------------------------------------------------------------------------- */
/* Prelude                                                                   */
/* ------------------------------------------------------------------------- */

/// Prelude pour le binaire : re-exports compacts.
pub mod prelude {
    pub use crate::{
        load_layout, resolve_compiler, upgrade_firmware,
        BuildConfiguration, BuildSummary, CompilerStatus, DeployError, DeployMode, DeployOutcome, Deployer,
        Flasher, LayoutConfig, Lm4Flash,
    };
    pub use rap_core::{ManifestEntry, Payload};
}
