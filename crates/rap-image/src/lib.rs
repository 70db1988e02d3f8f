//! rap-image : Sérialisation des images de déploiement
//!
//! Format :
//! ```text
//! Header: "RAP\0" (4 bytes) + version u16 LE + kind u8 + flags u8
//!   relative : image_len u32 LE   (longueur totale, trailer compris)
//!   absolute : origin u32 LE      (adresse flash de l'octet 0)
//! [Section*]
//!   section = TAG[4] + len u32 LE + payload
//!   "MODS" : table des modules   (nom, nb objets, (addr, len)*)
//!   "ROFS" : table des fichiers  (nom, addr, len)
//!   "DATA" : blobs
//! Dernière section: "CRCC" + u32 (CRC32 sur tout après magic+version)
//! ```
//!
//! Deux stratégies **non interchangeables** derrière `LayoutStrategy` :
//! - `RelativeLayout` : adresses = offset depuis le début de l'image (OTA)
//! - `AbsoluteLayout` : adresses = origin + offset
//!
//! Le choix se fait **une seule fois** par build via [`Layout::for_origin`]
//! (signe de l'origine). Le drapeau `compact` ne change que l'encodage :
//! compteurs u16, longueurs de nom u8, pas d'alignement.
//!
//! API :
//! - [`assemble`] / [`Layout::assemble`] : modules + ressources → octets
//! - [`ImageView::from_bytes`] : octets → contenu logique (validation CRC)

#![deny(missing_docs)]

use rap_core::{
    crc32_ieee, ByteWriter, CoreError, CoreResult, ManifestEntry, ModuleRecord, SectionTag,
    IMAGE_VERSION, MAGIC_RAP,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod absolute;
mod reader;
mod relative;

pub use absolute::AbsoluteLayout;
pub use reader::{BlobRef, FileView, ImageView, ModuleView};
pub use relative::RelativeLayout;

/// Bit `compact` dans l'octet de drapeaux du header.
pub const FLAG_COMPACT: u8 = 0b0000_0001;

/// Alignement des blobs en encodage normal (mot 32 bits).
pub const BLOB_ALIGN: usize = 4;

/// Valeur de bourrage (flash effacée).
pub const PAD_BYTE: u8 = 0xFF;

/// Longueur du préfixe exclu du CRC (magic + version).
pub(crate) const CRC_SKIP: usize = MAGIC_RAP.len() + 2;

/// Longueur du trailer `CRCC` + u32.
pub(crate) const TRAILER_LEN: usize = 8;

/* ─────────────────────────── Disposition ─────────────────────────── */

/// Nature de la disposition, encodée dans le header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum LayoutKind {
    /// Adresses relatives au début de l'image (mise à jour OTA).
    Relative = 0,
    /// Adresses flash absolues.
    Absolute = 1,
}

impl LayoutKind {
    /// Nom court (logs, résumé).
    pub const fn name(self) -> &'static str {
        match self {
            LayoutKind::Relative => "relative",
            LayoutKind::Absolute => "absolute",
        }
    }

    /// Décode l'octet `kind` du header.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(LayoutKind::Relative),
            1 => Some(LayoutKind::Absolute),
            _ => None,
        }
    }
}

/// Stratégie de sérialisation : header propre + règle de résolution d'adresse.
///
/// Le squelette commun (tables, blobs, CRC) est fourni par [`LayoutStrategy::assemble`].
pub trait LayoutStrategy {
    /// Octet `kind` écrit dans le header.
    fn kind(&self) -> LayoutKind;

    /// Champs spécifiques écrits juste après `magic|version|kind|flags`.
    fn write_header(&self, w: &mut ByteWriter);

    /// Convertit un offset dans l'image en adresse encodée dans les tables.
    fn resolve(&self, image_offset: usize) -> CoreResult<u32>;

    /// Dernière retouche avant le CRC ; `final_len` inclut le trailer.
    fn finish(&self, w: &mut ByteWriter, final_len: usize) -> CoreResult<()> {
        let _ = (w, final_len);
        Ok(())
    }

    /// Sérialise modules + ressources dans l'ordre reçu.
    fn assemble(
        &self,
        modules: &[ModuleRecord],
        resources: &[ManifestEntry],
        compact: bool,
    ) -> CoreResult<Vec<u8>> {
        let enc = Encoding { compact };

        let mut w = ByteWriter::new();
        w.write_bytes(MAGIC_RAP);
        w.write_u16_le(IMAGE_VERSION);
        w.write_u8(self.kind() as u8);
        w.write_u8(if compact { FLAG_COMPACT } else { 0 });
        self.write_header(&mut w);
        let header_len = w.len();

        // Blobs : objets des modules puis fichiers, ordre conservé
        let mut blobs = Vec::new();
        for m in modules {
            for obj in &m.objects {
                blobs.push(obj.load()?);
            }
        }
        for r in resources {
            blobs.push(r.payload.load()?);
        }

        let mut data = ByteWriter::new();
        let mut placements = Vec::with_capacity(blobs.len());
        for b in &blobs {
            placements.push((data.len(), b.len()));
            data.write_bytes(b);
            data.pad_to(enc.align(), PAD_BYTE);
        }

        // Passe de mesure : la taille des tables ne dépend pas des valeurs d'adresse
        let (probe_mods, probe_rofs) = enc.tables(modules, resources, &placements, |_| Ok(0))?;
        let data_start = header_len + 8 + probe_mods.len() + 8 + probe_rofs.len() + 8;
        let (mods, rofs) =
            enc.tables(modules, resources, &placements, |off| self.resolve(data_start + off))?;
        debug_assert_eq!(mods.len(), probe_mods.len());
        debug_assert_eq!(rofs.len(), probe_rofs.len());

        write_section(&mut w, SectionTag::MODS, mods.as_slice())?;
        write_section(&mut w, SectionTag::ROFS, rofs.as_slice())?;
        write_section(&mut w, SectionTag::DATA, data.as_slice())?;

        let final_len = w.len() + TRAILER_LEN;
        self.finish(&mut w, final_len)?;

        let crc = crc32_ieee(&w.as_slice()[CRC_SKIP..]);
        w.write_tag(SectionTag::CRCC);
        w.write_u32_le(crc);

        tracing::debug!(
            layout = self.kind().name(),
            compact,
            modules = modules.len(),
            files = resources.len(),
            len = w.len(),
            "image assemblée"
        );
        Ok(w.into_vec())
    }
}

/// Sélecteur fermé des deux stratégies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Disposition relative (origine négative).
    Relative(RelativeLayout),
    /// Disposition absolue à l'origine donnée.
    Absolute(AbsoluteLayout),
}

impl Layout {
    /// `origin < 0` → relative ; `origin >= 0` → absolue à `origin`.
    pub fn for_origin(origin: i64) -> CoreResult<Self> {
        if origin < 0 {
            Ok(Layout::Relative(RelativeLayout))
        } else {
            let origin = u32::try_from(origin).map_err(|_| CoreError::AddressOverflow(i128::from(origin)))?;
            Ok(Layout::Absolute(AbsoluteLayout::new(origin)))
        }
    }

    /// Nature de la disposition.
    pub fn kind(&self) -> LayoutKind { self.strategy().kind() }

    /// Stratégie sous-jacente.
    pub fn strategy(&self) -> &dyn LayoutStrategy {
        match self {
            Layout::Relative(s) => s,
            Layout::Absolute(s) => s,
        }
    }

    /// Sérialise via la stratégie sélectionnée.
    pub fn assemble(
        &self,
        modules: &[ModuleRecord],
        resources: &[ManifestEntry],
        compact: bool,
    ) -> CoreResult<Vec<u8>> {
        self.strategy().assemble(modules, resources, compact)
    }
}

/// Point d'entrée du sérialiseur : `assemble(origin, modules, resources, compact)`.
pub fn assemble(
    origin: i64,
    modules: &[ModuleRecord],
    resources: &[ManifestEntry],
    compact: bool,
) -> CoreResult<Vec<u8>> {
    Layout::for_origin(origin)?.assemble(modules, resources, compact)
}

/* ─────────────────────────── Encodage des tables ─────────────────────────── */

/// Largeur des champs selon le mode (normal / compact).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Encoding {
    pub(crate) compact: bool,
}

impl Encoding {
    pub(crate) const fn align(self) -> usize {
        if self.compact { 1 } else { BLOB_ALIGN }
    }

    fn write_count(self, w: &mut ByteWriter, n: usize, what: &'static str) -> CoreResult<()> {
        if self.compact {
            let v = u16::try_from(n).map_err(|_| CoreError::invalid_length(what, n))?;
            w.write_u16_le(v);
        } else {
            let v = u32::try_from(n).map_err(|_| CoreError::invalid_length(what, n))?;
            w.write_u32_le(v);
        }
        Ok(())
    }

    fn write_name(self, w: &mut ByteWriter, name: &str) -> CoreResult<()> {
        let n = name.len();
        if self.compact {
            let v = u8::try_from(n).map_err(|_| CoreError::invalid_length("name", n))?;
            w.write_u8(v);
        } else {
            let v = u16::try_from(n).map_err(|_| CoreError::invalid_length("name", n))?;
            w.write_u16_le(v);
        }
        w.write_bytes(name.as_bytes());
        Ok(())
    }

    /// Construit les payloads MODS et ROFS ; `placements` suit l'ordre des blobs.
    fn tables(
        self,
        modules: &[ModuleRecord],
        resources: &[ManifestEntry],
        placements: &[(usize, usize)],
        resolve: impl Fn(usize) -> CoreResult<u32>,
    ) -> CoreResult<(ByteWriter, ByteWriter)> {
        let mut blobs = placements.iter();
        let mut next = |what: &'static str| -> CoreResult<(u32, u32)> {
            let &(off, len) = blobs.next().ok_or_else(|| CoreError::corrupted(what))?;
            let len32 = u32::try_from(len).map_err(|_| CoreError::invalid_length(what, len))?;
            Ok((resolve(off)?, len32))
        };

        let mut mods = ByteWriter::new();
        self.write_count(&mut mods, modules.len(), "MODS")?;
        for m in modules {
            self.write_name(&mut mods, &m.name)?;
            self.write_count(&mut mods, m.objects.len(), "objects")?;
            for _ in &m.objects {
                let (addr, len) = next("object")?;
                mods.write_u32_le(addr);
                mods.write_u32_le(len);
            }
        }
        mods.pad_to(self.align(), PAD_BYTE);

        let mut rofs = ByteWriter::new();
        self.write_count(&mut rofs, resources.len(), "ROFS")?;
        for r in resources {
            self.write_name(&mut rofs, r.name.as_str())?;
            let (addr, len) = next("file")?;
            rofs.write_u32_le(addr);
            rofs.write_u32_le(len);
        }
        rofs.pad_to(self.align(), PAD_BYTE);

        Ok((mods, rofs))
    }
}

fn write_section(w: &mut ByteWriter, tag: SectionTag, payload: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| CoreError::invalid_length("section", payload.len()))?;
    w.write_tag(tag);
    w.write_u32_le(len);
    w.write_bytes(payload);
    Ok(())
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rap_core::Payload;

    fn sample() -> (Vec<ModuleRecord>, Vec<ManifestEntry>) {
        let modules = vec![
            ModuleRecord::new("dht11"),
            ModuleRecord {
                name: "gpio".into(),
                objects: vec![Payload::Content(vec![1, 2, 3]), Payload::Content(vec![4; 9])],
            },
        ];
        let resources = vec![
            ManifestEntry::from_content("app/index.js", b"console.log(1)".to_vec()),
            ManifestEntry::from_content("app/package.json", b"{}".to_vec()),
            ManifestEntry::from_content("app/empty.txt", Vec::new()),
        ];
        (modules, resources)
    }

    #[test]
    fn selection_by_origin_sign() -> CoreResult<()> {
        assert_eq!(Layout::for_origin(-1)?.kind(), LayoutKind::Relative);
        assert_eq!(Layout::for_origin(0)?.kind(), LayoutKind::Absolute);
        assert_eq!(Layout::for_origin(512_000)?, Layout::Absolute(AbsoluteLayout::new(512_000)));
        assert!(matches!(Layout::for_origin(1 << 40), Err(CoreError::AddressOverflow(_))));
        Ok(())
    }

    #[test]
    fn header_bytes() -> CoreResult<()> {
        let (m, r) = sample();
        let rel = assemble(-1, &m, &r, false)?;
        assert_eq!(&rel[..4], MAGIC_RAP);
        assert_eq!(rel[6], LayoutKind::Relative as u8);
        assert_eq!(rel[7], 0);
        let abs = assemble(0x8000, &m, &r, true)?;
        assert_eq!(abs[6], LayoutKind::Absolute as u8);
        assert_eq!(abs[7], FLAG_COMPACT);
        assert_eq!(&abs[8..12], &0x8000u32.to_le_bytes());
        Ok(())
    }

    #[test]
    fn compact_is_smaller_same_content() -> CoreResult<()> {
        let (m, r) = sample();
        for origin in [-1_i64, 0x1000] {
            let normal = assemble(origin, &m, &r, false)?;
            let compact = assemble(origin, &m, &r, true)?;
            assert!(compact.len() < normal.len());
            let a = ImageView::from_bytes(&normal)?;
            let b = ImageView::from_bytes(&compact)?;
            assert!(!a.compact && b.compact);
            assert_eq!(a.modules, b.modules);
            assert_eq!(a.files, b.files);
        }
        Ok(())
    }

    #[test]
    fn normal_blobs_are_word_aligned() -> CoreResult<()> {
        let (m, r) = sample();
        let img = assemble(-1, &m, &r, false)?;
        let view = ImageView::from_bytes(&img)?;
        assert_eq!(view.blobs.len(), 5);
        for b in &view.blobs {
            assert_eq!(b.offset % BLOB_ALIGN, 0);
        }
        Ok(())
    }

    #[test]
    fn compact_rejects_long_names() {
        let long = "x".repeat(300);
        let r = vec![ManifestEntry::from_content(long.as_str(), vec![0])];
        assert!(matches!(assemble(-1, &[], &r, true), Err(CoreError::InvalidLength { .. })));
        assert!(assemble(-1, &[], &r, false).is_ok());
    }

    #[test]
    fn missing_source_propagates() {
        let r = vec![ManifestEntry::from_source("a.txt", "/nope/a.txt")];
        assert!(matches!(assemble(0, &[], &r, false), Err(CoreError::Io { .. })));
    }

    proptest! {
        #[test]
        fn any_content_survives_both_encodings(
            files in proptest::collection::vec(
                ("[a-z]{1,12}\\.(js|json|txt)", proptest::collection::vec(any::<u8>(), 0..64)),
                0..8,
            ),
            origin in prop_oneof![Just(-1_i64), 0_i64..0x10_0000],
            compact in any::<bool>(),
        ) {
            let resources: Vec<ManifestEntry> = files
                .iter()
                .map(|(n, d)| ManifestEntry::from_content(n.as_str(), d.clone()))
                .collect();
            let img = assemble(origin, &[ModuleRecord::new("dht11")], &resources, compact).unwrap();
            let view = ImageView::from_bytes(&img).unwrap();
            prop_assert_eq!(view.files.len(), files.len());
            for (f, (n, d)) in view.files.iter().zip(&files) {
                prop_assert_eq!(&f.name, n);
                prop_assert_eq!(&f.data, d);
            }
        }
    }
}
