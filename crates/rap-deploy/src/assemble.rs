//! Passage sur le manifeste puis sérialisation de l'image.

use rap_core::{ManifestEntry, ModuleRecord};

use crate::classify::{classify, EntryKind};
use crate::config::BuildConfiguration;
use crate::error::Result;
use crate::group::ModuleSet;
use crate::transpile::{Transpiled, Transpiler};

/// Résultat figé du passage sur le manifeste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlan {
    /// Modules natifs, sentinelle en tête puis ordre de découverte.
    pub modules: Vec<ModuleRecord>,
    /// Entrées non natives, dans l'ordre du manifeste.
    pub resources: Vec<ManifestEntry>,
    /// Entrées remplacées par le bytecode du compilateur.
    pub compiled: usize,
    /// Entrées copiées telles quelles (scripts non compilés compris).
    pub passed_through: usize,
}

/// Classe, regroupe et compile les entrées, dans l'ordre du manifeste.
///
/// La première erreur interrompt le passage.
#[tracing::instrument(level = "debug", skip_all, fields(entries = manifest.len()))]
pub fn plan_image(manifest: Vec<ManifestEntry>, transpiler: &mut Transpiler) -> Result<ImagePlan> {
    let mut modules = ModuleSet::new();
    let mut resources = Vec::with_capacity(manifest.len());
    let (mut compiled, mut passed_through) = (0, 0);

    for mut entry in manifest {
        match classify(&entry) {
            EntryKind::NativeModuleObject => modules.push(entry)?,
            EntryKind::Compilable(kind) => {
                match transpiler.transpile(&mut entry, kind)? {
                    Transpiled::Compiled => compiled += 1,
                    Transpiled::Unchanged => passed_through += 1,
                }
                resources.push(entry);
            }
            EntryKind::PassThrough => {
                passed_through += 1;
                resources.push(entry);
            }
        }
    }

    Ok(ImagePlan { modules: modules.into_records(), resources, compiled, passed_through })
}

/// Sérialise le plan selon la disposition choisie par l'origine.
pub fn assemble(plan: &ImagePlan, config: &BuildConfiguration) -> Result<Vec<u8>> {
    let bytes = rap_image::assemble(config.origin_address, &plan.modules, &plan.resources, config.compact)?;
    tracing::debug!(len = bytes.len(), origin = config.origin_address, compact = config.compact, "image assemblée");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use crate::transpile::CompilerStatus;
    use pretty_assertions::assert_eq;
    use rap_core::Payload;
    use rap_image::{ImageView, LayoutKind};

    fn manifest() -> Vec<ManifestEntry> {
        vec![
            ManifestEntry::from_content("package.json", b"{\"name\":\"demo\"}".to_vec()),
            ManifestEntry::from_content("ruff_modules/led/src/led.so", b"LED".to_vec()),
            ManifestEntry::from_content("src/index.js", b"console.log(1)".to_vec()),
            ManifestEntry::from_content("ruff_modules/gpio/gpio.so", b"GPIO".to_vec()),
            ManifestEntry::from_content("assets/logo.png", vec![0x89, b'P']),
        ]
    }

    #[test]
    fn plan_splits_modules_and_resources() -> Result<()> {
        let mut t = Transpiler::new(CompilerStatus::Disabled);
        let plan = plan_image(manifest(), &mut t)?;
        let names: Vec<_> = plan.modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["dht11", "led", "gpio"]);
        let res: Vec<_> = plan.resources.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(res, ["package.json", "src/index.js", "assets/logo.png"]);
        assert_eq!((plan.compiled, plan.passed_through), (0, 3));
        assert_eq!(plan.resources[1].payload, Payload::Content(b"console.log(1)".to_vec()));
        Ok(())
    }

    #[test]
    fn empty_manifest_still_has_sentinel() -> Result<()> {
        let plan = plan_image(Vec::new(), &mut Transpiler::new(CompilerStatus::Disabled))?;
        assert_eq!(plan.modules, vec![ModuleRecord::new("dht11")]);
        assert!(plan.resources.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_module_aborts() {
        let m = vec![ManifestEntry::from_content("lib/native.so", vec![1])];
        let err = plan_image(m, &mut Transpiler::new(CompilerStatus::Disabled)).unwrap_err();
        assert!(matches!(err, DeployError::ManifestMalformed { .. }));
    }

    #[test]
    fn assembled_image_decodes_to_plan() -> Result<()> {
        let plan = plan_image(manifest(), &mut Transpiler::new(CompilerStatus::Disabled))?;
        let cfg = BuildConfiguration { compile_scripts: false, origin_address: 0x8_0000, compact: false };
        let img = assemble(&plan, &cfg)?;
        let view = ImageView::from_bytes(&img)?;
        assert_eq!(view.kind, LayoutKind::Absolute);
        assert_eq!(view.origin, Some(0x8_0000));
        assert_eq!(view.modules[1].objects, vec![b"LED".to_vec()]);
        assert_eq!(view.files[2].data, vec![0x89, b'P']);
        Ok(())
    }

    #[test]
    fn origin_beyond_u32_is_image_error() -> Result<()> {
        let plan = plan_image(Vec::new(), &mut Transpiler::new(CompilerStatus::Disabled))?;
        let cfg = BuildConfiguration { origin_address: i64::from(u32::MAX) + 1, ..BuildConfiguration::default() };
        assert!(matches!(assemble(&plan, &cfg), Err(DeployError::Image(_))));
        Ok(())
    }
}
