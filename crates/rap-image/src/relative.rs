//! Disposition relative (OTA) : l'image ne connaît pas son adresse de
//! chargement ; chaque adresse de table est un offset depuis l'octet 0.
//! Le header porte la longueur totale, ce qui permet au chargeur de retrouver
//! le début d'une image placée en fin de flash.

use rap_core::{ByteWriter, CoreError, CoreResult};

use crate::{LayoutKind, LayoutStrategy};

/// Offset du champ `image_len` (après magic|version|kind|flags).
pub(crate) const IMAGE_LEN_OFFSET: usize = 8;

/// Stratégie relative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelativeLayout;

impl LayoutStrategy for RelativeLayout {
    fn kind(&self) -> LayoutKind { LayoutKind::Relative }

    fn write_header(&self, w: &mut ByteWriter) {
        // réservé, complété par `finish`
        w.write_u32_le(0);
    }

    fn resolve(&self, image_offset: usize) -> CoreResult<u32> {
        u32::try_from(image_offset).map_err(|_| CoreError::AddressOverflow(image_offset as i128))
    }

    fn finish(&self, w: &mut ByteWriter, final_len: usize) -> CoreResult<()> {
        let len = u32::try_from(final_len).map_err(|_| CoreError::invalid_length("image", final_len))?;
        w.patch_u32_le(IMAGE_LEN_OFFSET, len)
    }
}
