//! Lecture d'une image : validation (magic, version, CRC, longueur) puis
//! décodage du contenu logique. Les adresses des tables sont ramenées à des
//! offsets selon la disposition déclarée dans le header.

use rap_core::{crc32_ieee, ByteReader, CoreError, CoreResult, SectionTag, IMAGE_VERSION, MAGIC_RAP};

use crate::{LayoutKind, CRC_SKIP, FLAG_COMPACT, TRAILER_LEN};

/// Module décodé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleView {
    /// Nom du module.
    pub name: String,
    /// Objets, dans l'ordre de l'image.
    pub objects: Vec<Vec<u8>>,
}

/// Fichier décodé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileView {
    /// Chemin logique.
    pub name: String,
    /// Contenu.
    pub data: Vec<u8>,
}

/// Emplacement d'un blob (objets puis fichiers, ordre des tables).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobRef {
    /// Adresse telle qu'encodée dans la table.
    pub addr: u32,
    /// Offset dans l'image.
    pub offset: usize,
    /// Longueur.
    pub len: usize,
}

/// Contenu logique d'une image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageView {
    /// Disposition déclarée.
    pub kind: LayoutKind,
    /// Origine flash (disposition absolue uniquement).
    pub origin: Option<u32>,
    /// Longueur déclarée (disposition relative uniquement).
    pub image_len: Option<u32>,
    /// Encodage compact ?
    pub compact: bool,
    /// Modules natifs.
    pub modules: Vec<ModuleView>,
    /// Fichiers.
    pub files: Vec<FileView>,
    /// Emplacements bruts des blobs.
    pub blobs: Vec<BlobRef>,
    /// CRC32 lu dans le trailer.
    pub crc32: u32,
}

impl ImageView {
    /// Décode et valide une image complète.
    pub fn from_bytes(data: &[u8]) -> CoreResult<Self> {
        let mut r = ByteReader::new(data);
        if r.read_bytes(MAGIC_RAP.len())? != MAGIC_RAP {
            return Err(CoreError::InvalidMagic);
        }
        let version = r.read_u16_le()?;
        if version != IMAGE_VERSION {
            return Err(CoreError::UnsupportedVersion(version));
        }
        let kind = LayoutKind::from_u8(r.read_u8()?).ok_or_else(|| CoreError::corrupted("unknown layout kind"))?;
        let compact = r.read_u8()? & FLAG_COMPACT != 0;
        let field = r.read_u32_le()?;
        let (origin, image_len) = match kind {
            LayoutKind::Relative => (None, Some(field)),
            LayoutKind::Absolute => (Some(field), None),
        };
        let header_len = r.offset();

        // Trailer CRC
        if data.len() < header_len + TRAILER_LEN {
            return Err(CoreError::UnexpectedEof { needed: TRAILER_LEN as u64, at: header_len as u64 });
        }
        let body_end = data.len() - TRAILER_LEN;
        let mut t = ByteReader::new(&data[body_end..]);
        if t.read_tag()? != SectionTag::CRCC {
            return Err(CoreError::corrupted("missing CRC trailer"));
        }
        let crc32 = t.read_u32_le()?;
        if crc32_ieee(&data[CRC_SKIP..body_end]) != crc32 {
            return Err(CoreError::corrupted("CRC32 mismatch"));
        }
        if let Some(len) = image_len {
            if len as usize != data.len() {
                return Err(CoreError::corrupted("image length mismatch"));
            }
        }

        // Sections
        let mut body = ByteReader::new(&data[header_len..body_end]);
        let mut mods = None;
        let mut rofs = None;
        while body.remaining() > 0 {
            let tag = body.read_tag()?;
            let len = body.read_u32_le()? as usize;
            let payload = body.read_bytes(len)?;
            match tag {
                SectionTag::MODS => mods = Some(payload),
                SectionTag::ROFS => rofs = Some(payload),
                SectionTag::DATA => {}
                SectionTag::CRCC => return Err(CoreError::corrupted("CRC section inside body")),
            }
        }
        let mods = mods.ok_or_else(|| CoreError::corrupted("missing MODS section"))?;
        let rofs = rofs.ok_or_else(|| CoreError::corrupted("missing ROFS section"))?;

        let mut view = ImageView {
            kind,
            origin,
            image_len,
            compact,
            modules: Vec::new(),
            files: Vec::new(),
            blobs: Vec::new(),
            crc32,
        };
        let locate = |addr: u32, len: u32| -> CoreResult<BlobRef> {
            let offset = match origin {
                None => Some(addr),
                Some(o) => addr.checked_sub(o),
            }
            .ok_or_else(|| CoreError::corrupted("address below origin"))? as usize;
            let len = len as usize;
            if offset.checked_add(len).map_or(true, |end| end > body_end) {
                return Err(CoreError::invalid_length("blob", len));
            }
            Ok(BlobRef { addr, offset, len })
        };

        let mut mr = ByteReader::new(mods);
        for _ in 0..read_count(&mut mr, compact)? {
            let name = read_name(&mut mr, compact)?;
            let mut objects = Vec::new();
            for _ in 0..read_count(&mut mr, compact)? {
                let blob = locate(mr.read_u32_le()?, mr.read_u32_le()?)?;
                objects.push(data[blob.offset..blob.offset + blob.len].to_vec());
                view.blobs.push(blob);
            }
            view.modules.push(ModuleView { name, objects });
        }

        let mut fr = ByteReader::new(rofs);
        for _ in 0..read_count(&mut fr, compact)? {
            let name = read_name(&mut fr, compact)?;
            let blob = locate(fr.read_u32_le()?, fr.read_u32_le()?)?;
            view.files.push(FileView { name, data: data[blob.offset..blob.offset + blob.len].to_vec() });
            view.blobs.push(blob);
        }

        Ok(view)
    }

    /// Nombre total d'objets natifs.
    pub fn object_count(&self) -> usize { self.modules.iter().map(|m| m.objects.len()).sum() }
}

fn read_count(r: &mut ByteReader<'_>, compact: bool) -> CoreResult<usize> {
    if compact {
        Ok(usize::from(r.read_u16_le()?))
    } else {
        Ok(r.read_u32_le()? as usize)
    }
}

fn read_name(r: &mut ByteReader<'_>, compact: bool) -> CoreResult<String> {
    let len = if compact { usize::from(r.read_u8()?) } else { usize::from(r.read_u16_le()?) };
    let raw = r.read_bytes(len)?;
    core::str::from_utf8(raw).map(str::to_string).map_err(|_| CoreError::InvalidUtf8)
}
