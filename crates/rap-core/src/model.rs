//! Modèle du manifeste de déploiement.
//!
//! Une entrée porte un **nom logique** (chemin dans l'image, extension incluse)
//! et une **charge** : soit un fichier sur disque, soit des octets en mémoire.
//! Le type `Payload` rend l'alternative exclusive par construction.

use std::borrow::Cow;
use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Contenu d'une entrée : chemin disque ou octets en mémoire.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Payload {
    /// Contenu lu sur disque au moment de l'assemblage.
    Source(PathBuf),
    /// Contenu déjà en mémoire (ex: sortie du compilateur).
    Content(Vec<u8>),
}

impl Payload {
    /// Charge les octets (lecture disque pour `Source`, emprunt pour `Content`).
    pub fn load(&self) -> CoreResult<Cow<'_, [u8]>> {
        match self {
            Payload::Content(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            Payload::Source(path) => fs::read(path)
                .map(Cow::Owned)
                .map_err(|source| CoreError::Io { path: path.clone(), source }),
        }
    }

    /// Vrai si la charge référence encore un fichier disque.
    pub fn is_source(&self) -> bool { matches!(self, Payload::Source(_)) }
}

/// Un fichier à inclure dans l'image.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ManifestEntry {
    /// Chemin logique dans l'image (l'extension détermine la classification).
    pub name: Utf8PathBuf,
    /// Contenu.
    pub payload: Payload,
}

impl ManifestEntry {
    /// Entrée adossée à un fichier disque.
    pub fn from_source(name: impl Into<Utf8PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), payload: Payload::Source(path.into()) }
    }

    /// Entrée avec contenu en mémoire.
    pub fn from_content(name: impl Into<Utf8PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), payload: Payload::Content(bytes.into()) }
    }

    /// Nom logique.
    pub fn name(&self) -> &Utf8Path { &self.name }

    /// Extension finale du nom logique (sans le point), sensible à la casse.
    pub fn extension(&self) -> Option<&str> { self.name.extension() }

    /// Remplace la charge par du contenu en mémoire ; le nom (et donc la
    /// position dans le manifeste) est conservé.
    pub fn replace_content(&mut self, bytes: Vec<u8>) { self.payload = Payload::Content(bytes); }
}

/// Groupe nommé d'objets natifs (`.so`) partageant le même module.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleRecord {
    /// Nom du module (enfant direct de `ruff_modules`).
    pub name: String,
    /// Objets dans l'ordre de rencontre du manifeste.
    pub objects: Vec<Payload>,
}

impl ModuleRecord {
    /// Module vide.
    pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), objects: Vec::new() } }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_content_borrows() -> CoreResult<()> {
        let p = Payload::Content(vec![1, 2, 3]);
        assert!(matches!(p.load()?, Cow::Borrowed(&[1, 2, 3])));
        assert!(!p.is_source());
        Ok(())
    }

    #[test]
    fn load_source_reads_file() -> CoreResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();
        let p = Payload::Source(path);
        assert_eq!(p.load()?.as_ref(), b"hello");
        Ok(())
    }

    #[test]
    fn load_missing_source_is_io_error() {
        let p = Payload::Source(PathBuf::from("/definitely/not/here.bin"));
        assert!(matches!(p.load(), Err(CoreError::Io { .. })));
    }

    #[test]
    fn replace_keeps_name() {
        let mut e = ManifestEntry::from_source("app/index.js", "/tmp/index.js");
        e.replace_content(b"bc".to_vec());
        assert_eq!(e.name(), Utf8Path::new("app/index.js"));
        assert_eq!(e.payload, Payload::Content(b"bc".to_vec()));
        assert_eq!(e.extension(), Some("js"));
    }
}
