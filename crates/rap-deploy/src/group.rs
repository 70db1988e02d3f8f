//! Regroupement des objets natifs par module.
//!
//! Le nom de module est le dossier enfant direct de `ruff_modules` sur le
//! chemin logique de l'objet : `a/ruff_modules/foo/bar/obj.so` → `foo`.

use camino::Utf8Path;
use indexmap::IndexMap;
use rap_core::{ManifestEntry, ModuleRecord};

use crate::error::{DeployError, Result};

/// Dossier racine des modules natifs.
pub const MODULES_DIR: &str = "ruff_modules";

/// Module toujours présent (vide) en tête de liste ; attendu par le format d'image.
pub const SENTINEL_MODULE: &str = "dht11";

/// Dérive le nom de module d'un objet natif.
///
/// Remonte les dossiers parents en retenant le dernier nom vu ; s'arrête au
/// premier `ruff_modules`. Pas d'ancêtre `ruff_modules` (ou objet posé
/// directement dedans) → `ManifestMalformed`.
pub fn module_name(name: &Utf8Path) -> Result<String> {
    let malformed = || DeployError::ManifestMalformed { name: name.to_path_buf() };

    let mut child: Option<&str> = None;
    let mut dir = name.parent();
    while let Some(d) = dir {
        match d.file_name() {
            Some(MODULES_DIR) => return child.map(str::to_owned).ok_or_else(malformed),
            Some(base) => child = Some(base),
            None => break,
        }
        dir = d.parent();
    }
    Err(malformed())
}

/// Table ordonnée nom → module, propre à un build.
///
/// L'ordre est celui de la première découverte, après le module sentinelle.
#[derive(Debug, Clone)]
pub struct ModuleSet {
    records: IndexMap<String, ModuleRecord>,
}

impl Default for ModuleSet {
    fn default() -> Self { Self::new() }
}

impl ModuleSet {
    /// Table contenant uniquement le module sentinelle.
    pub fn new() -> Self {
        let mut records = IndexMap::new();
        records.insert(SENTINEL_MODULE.to_string(), ModuleRecord::new(SENTINEL_MODULE));
        Self { records }
    }

    /// Ajoute l'objet au module dérivé de son nom (créé au premier passage).
    pub fn push(&mut self, entry: ManifestEntry) -> Result<()> {
        let module = module_name(&entry.name)?;
        let record = self.records.entry(module).or_insert_with_key(|k| {
            tracing::debug!(module = %k, "nouveau module natif");
            ModuleRecord::new(k.clone())
        });
        tracing::trace!(module = %record.name, object = %entry.name, "objet natif");
        record.objects.push(entry.payload);
        Ok(())
    }

    /// Nombre de modules (sentinelle comprise).
    pub fn len(&self) -> usize { self.records.len() }

    /// Jamais vide : la sentinelle est toujours là.
    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    /// Module par nom.
    pub fn get(&self, name: &str) -> Option<&ModuleRecord> { self.records.get(name) }

    /// Fige la table en liste ordonnée.
    pub fn into_records(self) -> Vec<ModuleRecord> { self.records.into_values().collect() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rap_core::Payload;

    fn so(name: &str, tag: u8) -> ManifestEntry { ManifestEntry::from_content(name, vec![tag]) }

    #[test]
    fn child_of_ruff_modules() -> Result<()> {
        assert_eq!(module_name(Utf8Path::new("a/ruff_modules/foo/bar/obj.so"))?, "foo");
        assert_eq!(module_name(Utf8Path::new("ruff_modules/gpio/gpio.so"))?, "gpio");
        assert_eq!(module_name(Utf8Path::new("/abs/ruff_modules/i2c/x/y/z.so"))?, "i2c");
        // le plus proche gagne
        assert_eq!(module_name(Utf8Path::new("ruff_modules/a/ruff_modules/b/o.so"))?, "b");
        Ok(())
    }

    #[test]
    fn malformed_paths() {
        for bad in ["lib/obj.so", "obj.so", "ruff_modules/obj.so", "/x/y.so"] {
            let err = module_name(Utf8Path::new(bad)).unwrap_err();
            assert!(matches!(err, DeployError::ManifestMalformed { ref name } if name == bad));
        }
    }

    #[test]
    fn sentinel_always_first() {
        let set = ModuleSet::new();
        assert_eq!(set.into_records(), vec![ModuleRecord::new(SENTINEL_MODULE)]);
    }

    #[test]
    fn groups_in_discovery_order() -> Result<()> {
        let mut set = ModuleSet::new();
        set.push(so("ruff_modules/led/a.so", 1))?;
        set.push(so("ruff_modules/button/b.so", 2))?;
        set.push(so("ruff_modules/led/sub/c.so", 3))?;
        let recs = set.into_records();
        let names: Vec<_> = recs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["dht11", "led", "button"]);
        assert_eq!(recs[1].objects, vec![Payload::Content(vec![1]), Payload::Content(vec![3])]);
        assert_eq!(recs[2].objects, vec![Payload::Content(vec![2])]);
        Ok(())
    }

    #[test]
    fn dht11_objects_join_sentinel() -> Result<()> {
        let mut set = ModuleSet::new();
        set.push(so("ruff_modules/dht11/dht11.so", 9))?;
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("dht11").map(|m| m.objects.len()), Some(1));
        Ok(())
    }

    proptest! {
        #[test]
        fn objects_keep_encounter_order(picks in proptest::collection::vec(0usize..3, 0..24)) {
            let mods = ["alpha", "beta", "gamma"];
            let mut set = ModuleSet::new();
            for (i, &m) in picks.iter().enumerate() {
                set.push(so(&format!("ruff_modules/{}/o{}.so", mods[m], i), i as u8)).unwrap();
            }
            for m in mods {
                let expected: Vec<Payload> = picks
                    .iter()
                    .enumerate()
                    .filter(|&(_, &p)| mods[p] == m)
                    .map(|(i, _)| Payload::Content(vec![i as u8]))
                    .collect();
                let got = set.get(m).map(|r| r.objects.clone()).unwrap_or_default();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
