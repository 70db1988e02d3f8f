//! Erreurs du constructeur d'images.

use std::io;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use rap_core::CoreError;
use thiserror::Error;

/// Alias résultat du crate.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Erreurs de build / déploiement. Aucune n'est retentée.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Objet natif sans ancêtre `ruff_modules` dans son chemin logique.
    #[error("malformed manifest: `{name}` has no `ruff_modules` ancestor to derive its module name")]
    ManifestMalformed {
        /// Entrée fautive.
        name: Utf8PathBuf,
    },

    /// Compilateur trouvé mais impossible à démarrer.
    #[error("unable to run {}", program.display())]
    CompilerUnavailable {
        /// Exécutable résolu.
        program: PathBuf,
        /// Erreur de spawn.
        #[source]
        source: io::Error,
    },

    /// Le compilateur a rendu un statut non nul ; le diagnostic vient de sa sortie standard.
    #[error("compilation of `{name}` failed:\n{diagnostic}")]
    Compilation {
        /// Entrée compilée.
        name: Utf8PathBuf,
        /// Texte capturé sur stdout.
        diagnostic: String,
    },

    /// Lecture d'une entrée `Source` impossible.
    #[error("cannot read `{name}`")]
    EntryRead {
        /// Entrée concernée.
        name: Utf8PathBuf,
        /// Cause.
        #[source]
        source: CoreError,
    },

    /// Échec du sérialiseur d'image.
    #[error("image assembly failed")]
    Image(#[from] CoreError),

    /// Échec d'écriture de l'image (paquet ou fichier temporaire).
    #[error("cannot write image to {}", path.display())]
    ImageWrite {
        /// Destination.
        path: PathBuf,
        /// Cause.
        #[source]
        source: io::Error,
    },

    /// Nom de projet introuvable pour le chemin de paquet par défaut.
    #[error("cannot derive package name from {}: {reason}", path.display())]
    ProjectName {
        /// `package.json` consulté.
        path: PathBuf,
        /// Raison.
        reason: String,
    },

    /// Fichier de layout illisible ou invalide.
    #[error("invalid layout file {}: {reason}", path.display())]
    Layout {
        /// Fichier consulté.
        path: PathBuf,
        /// Raison.
        reason: String,
    },

    /// Adresse de flash effective hors de l'espace adressable.
    #[error("flash address {address} is out of range")]
    AddressOutOfRange {
        /// Adresse calculée.
        address: i64,
    },

    /// Firmware à flasher introuvable.
    #[error("the binary file specified does not exist: {}", path.display())]
    FirmwareMissing {
        /// Chemin donné.
        path: PathBuf,
    },

    /// Issue du mécanisme de flash, propagée telle quelle.
    #[error("flash failed: {0}")]
    Flash(String),
}
