//! Disposition absolue : l'image est construite pour une adresse flash fixe
//! (`origin`) ; chaque adresse de table vaut `origin + offset`.

use rap_core::{ByteWriter, CoreError, CoreResult};

use crate::{LayoutKind, LayoutStrategy};

/// Stratégie absolue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteLayout {
    origin: u32,
}

impl AbsoluteLayout {
    /// Disposition pour l'adresse flash `origin`.
    pub const fn new(origin: u32) -> Self { Self { origin } }

    /// Adresse flash de l'octet 0 de l'image.
    pub const fn origin(&self) -> u32 { self.origin }
}

impl LayoutStrategy for AbsoluteLayout {
    fn kind(&self) -> LayoutKind { LayoutKind::Absolute }

    fn write_header(&self, w: &mut ByteWriter) { w.write_u32_le(self.origin); }

    fn resolve(&self, image_offset: usize) -> CoreResult<u32> {
        u32::try_from(image_offset)
            .ok()
            .and_then(|off| self.origin.checked_add(off))
            .ok_or_else(|| CoreError::AddressOverflow(i128::from(self.origin) + image_offset as i128))
    }
}
