//! Classification des entrées du manifeste par extension du nom logique.

use rap_core::ManifestEntry;

/// Famille de script compilable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    /// `.js`
    Js,
    /// `.json`
    Json,
}

/// Sort d'une entrée dans le build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Objet natif `.so`, regroupé par module.
    NativeModuleObject,
    /// Script ou donnée pré-compilable.
    Compilable(ScriptKind),
    /// Fichier copié tel quel.
    PassThrough,
}

/// Classe une entrée. Fonction pure du nom (jamais du contenu) ; la
/// comparaison d'extension est exacte et sensible à la casse.
pub fn classify(entry: &ManifestEntry) -> EntryKind {
    match entry.extension() {
        Some("so") => EntryKind::NativeModuleObject,
        Some("js") => EntryKind::Compilable(ScriptKind::Js),
        Some("json") => EntryKind::Compilable(ScriptKind::Json),
        _ => EntryKind::PassThrough,
    }
}
