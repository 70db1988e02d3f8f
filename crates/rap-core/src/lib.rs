//! rap-core : primitives partagées de l'outillage de déploiement
//!
//! Fournit :
//! - le modèle du manifeste (`ManifestEntry`, `Payload`, `ModuleRecord`) dans [`model`]
//! - Constantes d'image (`MAGIC_RAP`, `IMAGE_VERSION`) + `SectionTag` (fourcc)
//! - IO mémoire (little-endian, via `byteorder`) : `ByteWriter`, `ByteReader`
//! - `crc32_ieee` (via `crc32fast`)
//! - Erreurs `CoreError` + alias `CoreResult<T>`
//!
//! Features :
//! - `serde` (par défaut) : derive (dé)sérialisation sur le modèle

#![deny(missing_docs)]

/* ─────────────────────────── Imports ─────────────────────────── */

use std::borrow::Cow;
use std::io;
use std::path::PathBuf;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Modèle du manifeste : entrées, charges utiles, modules natifs.
pub mod model;

pub use model::{ManifestEntry, ModuleRecord, Payload};

/* ─────────────────────────── Résultat commun ─────────────────────────── */

/// Alias résultat commun au core.
pub type CoreResult<T> = core::result::Result<T, CoreError>;

/* ─────────────────────────── Image : constantes & Tags ─────────────────────────── */

/// Magic d'une image : `b"RAP\0"`.
pub const MAGIC_RAP: &[u8; 4] = b"RAP\0";

/// Version actuelle du conteneur d'image.
pub const IMAGE_VERSION: u16 = 1;

/// Tags de section (fourcc), exactement 4 octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SectionTag {
    /// MODS : table des modules natifs
    MODS = u32::from_be_bytes(*b"MODS"),
    /// ROFS : table des fichiers (système de fichiers en lecture seule)
    ROFS = u32::from_be_bytes(*b"ROFS"),
    /// DATA : blobs (objets + fichiers)
    DATA = u32::from_be_bytes(*b"DATA"),
    /// CRCC : CRC32 trailer (u32 LE)
    CRCC = u32::from_be_bytes(*b"CRCC"),
}

impl SectionTag {
    /// Renvoie le fourcc sous forme de 4 octets big-endian.
    pub const fn to_be_bytes(self) -> [u8; 4] { (self as u32).to_be_bytes() }
    /// Lit un tag depuis 4 octets big-endian.
    pub const fn from_be_bytes(b: [u8; 4]) -> Option<Self> {
        match u32::from_be_bytes(b) {
            x if x == SectionTag::MODS as u32 => Some(SectionTag::MODS),
            x if x == SectionTag::ROFS as u32 => Some(SectionTag::ROFS),
            x if x == SectionTag::DATA as u32 => Some(SectionTag::DATA),
            x if x == SectionTag::CRCC as u32 => Some(SectionTag::CRCC),
            _ => None,
        }
    }
}

/* ─────────────────────────── CRC32 IEEE ─────────────────────────── */

/// CRC32 (IEEE 802.3), polynôme 0xEDB88320.
pub fn crc32_ieee(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d'écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Taille courante.
    pub fn len(&self) -> usize { self.buf.len() }
    /// Vrai si rien n'a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un tag (fourcc big-endian).
    pub fn write_tag(&mut self, tag: SectionTag) { self.write_bytes(&tag.to_be_bytes()); }
    /// Écrit un u8.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Écrit un u16 little-endian.
    pub fn write_u16_le(&mut self, v: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, v);
        self.write_bytes(&b);
    }
    /// Écrit un u32 little-endian.
    pub fn write_u32_le(&mut self, v: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, v);
        self.write_bytes(&b);
    }
    /// Réécrit un u32 little-endian déjà réservé à l'offset `at`.
    pub fn patch_u32_le(&mut self, at: usize, v: u32) -> CoreResult<()> {
        let slot = self
            .buf
            .get_mut(at..at + 4)
            .ok_or(CoreError::UnexpectedEof { needed: 4, at: at as u64 })?;
        LittleEndian::write_u32(slot, v);
        Ok(())
    }
    /// Complète avec `fill` jusqu'à un multiple de `align`.
    pub fn pad_to(&mut self, align: usize, fill: u8) {
        if align > 1 {
            let rem = self.buf.len() % align;
            if rem != 0 {
                self.buf.resize(self.buf.len() + (align - rem), fill);
            }
        }
    }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d'octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::UnexpectedEof { needed: n as u64, at: self.off as u64 });
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un tag (fourcc big-endian).
    pub fn read_tag(&mut self) -> CoreResult<SectionTag> {
        let b = self.read_bytes(4)?;
        let arr = [b[0], b[1], b[2], b[3]];
        SectionTag::from_be_bytes(arr).ok_or(CoreError::InvalidSectionTag { raw: u32::from_be_bytes(arr) })
    }

    /// Lit un u8.
    pub fn read_u8(&mut self) -> CoreResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un u16 LE.
    pub fn read_u16_le(&mut self) -> CoreResult<u16> { Ok(LittleEndian::read_u16(self.read_bytes(2)?)) }

    /// Lit un u32 LE.
    pub fn read_u32_le(&mut self) -> CoreResult<u32> { Ok(LittleEndian::read_u32(self.read_bytes(4)?)) }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Erreurs de bas niveau communes (conteneur d'image, lecture des charges).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Magic invalide (attendu `b"RAP\0"`).
    #[error("invalid image magic")]
    InvalidMagic,
    /// Version de conteneur inconnue.
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u16),
    /// Tag de section inconnu.
    #[error("invalid section tag: 0x{raw:08X}")]
    InvalidSectionTag {
        /// Valeur brute du tag.
        raw: u32,
    },
    /// Fin de buffer inattendue.
    #[error("unexpected EOF: need {needed} bytes at {at}")]
    UnexpectedEof {
        /// Nombre d'octets manquants.
        needed: u64,
        /// Offset où l'erreur s'est produite.
        at: u64,
    },
    /// Longueur invalide (dépasse le buffer ou la capacité du champ).
    #[error("invalid length for {section}: {len}")]
    InvalidLength {
        /// Champ ou section concerné.
        section: Cow<'static, str>,
        /// Longueur fautive.
        len: u64,
    },
    /// UTF-8 invalide.
    #[error("invalid utf-8")]
    InvalidUtf8,
    /// Adresse hors de l'espace 32 bits.
    #[error("address overflow: {0} does not fit the 32-bit flash address space")]
    AddressOverflow(i128),
    /// Données corrompues (CRC / format).
    #[error("corrupted: {0}")]
    Corrupted(Cow<'static, str>),
    /// Lecture d'une charge `Source` impossible.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// Fichier concerné.
        path: PathBuf,
        /// Erreur d'origine.
        #[source]
        source: io::Error,
    },
}

impl CoreError {
    /// Construit une erreur « corrompu ».
    pub fn corrupted(msg: impl Into<Cow<'static, str>>) -> Self { CoreError::Corrupted(msg.into()) }

    /// Construit une erreur « longueur invalide ».
    pub fn invalid_length(section: impl Into<Cow<'static, str>>, len: usize) -> Self {
        CoreError::InvalidLength { section: section.into(), len: len as u64 }
    }
}

/* ─────────────────────────── Prélude (reexports utiles) ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    /// Réexports utiles pour une importation rapide.
    pub use super::{
        crc32_ieee, ByteReader, ByteWriter, CoreError, CoreResult, ManifestEntry, ModuleRecord,
        Payload, SectionTag, IMAGE_VERSION, MAGIC_RAP,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_vector() {
        // vecteur de référence CRC-32/ISO-HDLC
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn tags_roundtrip() {
        let t = SectionTag::ROFS;
        assert_eq!(SectionTag::from_be_bytes(t.to_be_bytes()), Some(t));
        assert_eq!(SectionTag::from_be_bytes(*b"NOPE"), None);
    }

    #[test]
    fn writer_reader_le() -> CoreResult<()> {
        let mut w = ByteWriter::new();
        w.write_u8(7);
        w.write_u16_le(0xBEEF);
        w.write_u32_le(0xDEAD_BEEF);
        w.write_tag(SectionTag::DATA);

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u8()?, 7);
        assert_eq!(r.read_u16_le()?, 0xBEEF);
        assert_eq!(r.read_u32_le()?, 0xDEAD_BEEF);
        assert_eq!(r.read_tag()?, SectionTag::DATA);
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn patch_and_pad() -> CoreResult<()> {
        let mut w = ByteWriter::new();
        w.write_u8(1);
        w.pad_to(4, 0xFF);
        assert_eq!(w.as_slice(), &[1, 0xFF, 0xFF, 0xFF]);
        w.patch_u32_le(0, 0x0403_0201)?;
        assert_eq!(w.as_slice(), &[1, 2, 3, 4]);
        assert!(w.patch_u32_le(2, 0).is_err());
        Ok(())
    }

    #[test]
    fn reader_eof() {
        let mut r = ByteReader::new(&[1, 2]);
        assert!(matches!(r.read_u32_le(), Err(CoreError::UnexpectedEof { needed: 4, at: 0 })));
    }
}
