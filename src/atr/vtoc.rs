//! Volume Table Of Contents: sector 360's free-sector bitmap (§4.4).
//!
//! Standard density covers sectors 0..=719 in a single 90-byte bitmap
//! stored in sector 360. Enhanced density (DOS 2.5) adds a second bitmap
//! block at sector 1024 extending coverage to sector 1023; sectors
//! 1024..=1039 are reserved and never allocable. Within that second
//! sector the bitmap itself starts at byte offset `0x54`, the documented
//! DOS 2.5 constant — the 84 bytes ahead of it are unused padding, not a
//! second sector's worth of primary-bitmap bytes (a 128-byte sector holds
//! 10 header bytes + 90 primary-bitmap bytes already, so `0x54` cannot
//! land inside sector 360 itself without clobbering live free-sector
//! bits; see DESIGN.md).
pub const VTOC_SECTOR: u32 = 360;
pub const VTOC2_SECTOR: u32 = 1024;
pub const VTOC2_BITMAP_OFFSET: usize = 0x54;
pub const DOS_CODE: u8 = 2;
const PRIMARY_BITMAP_BITS: u32 = 720;
const ENHANCED_BITMAP_BITS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct Vtoc {
    pub total_sectors: u16,
    pub free_sectors: u16,
    /// bit `n` set ⇒ sector `n` is free. Indexed from 0; sector numbers on
    /// disk are 1-based, so `bitmap[n]` tracks on-disk sector `n`.
    bitmap: Vec<bool>,
    enhanced: bool,
}

impl Vtoc {
    pub fn new(total_sectors: u16, enhanced: bool) -> Self {
        let bits = if enhanced { ENHANCED_BITMAP_BITS } else { PRIMARY_BITMAP_BITS } as usize;
        let mut bitmap = vec![true; bits];
        // Boot sectors 1..=3, the VTOC sector, and the directory sectors
        // are always allocated (§3 VTOC invariant b).
        for always_allocated in [1u32, 2, 3, VTOC_SECTOR].into_iter().chain(361..=368) {
            if (always_allocated as usize) < bitmap.len() {
                bitmap[always_allocated as usize] = false;
            }
        }
        if enhanced {
            for reserved in VTOC2_SECTOR..=(VTOC2_SECTOR + 15) {
                if (reserved as usize) < bitmap.len() {
                    bitmap[reserved as usize] = false;
                }
            }
        }
        let free_sectors = bitmap.iter().filter(|b| **b).count() as u16;
        Self { total_sectors, free_sectors, bitmap, enhanced }
    }

    /// Parses the primary VTOC sector (and, for enhanced density, the
    /// second bitmap block read separately and passed in as `vtoc2`).
    pub fn parse(sector: &[u8], vtoc2: Option<&[u8]>) -> Self {
        let total_sectors = u16::from_le_bytes([sector[1], sector[2]]);
        let free_sectors = u16::from_le_bytes([sector[3], sector[4]]);
        let mut bitmap = vec![false; PRIMARY_BITMAP_BITS as usize];
        for (byte_idx, byte) in sector[10..100].iter().enumerate() {
            for bit in 0..8 {
                let sector_num = byte_idx * 8 + bit;
                if sector_num < bitmap.len() {
                    bitmap[sector_num] = (byte >> (7 - bit)) & 1 == 1;
                }
            }
        }
        let enhanced = vtoc2.is_some();
        if let Some(vtoc2) = vtoc2 {
            bitmap.resize(ENHANCED_BITMAP_BITS as usize, false);
            let tail = &vtoc2[VTOC2_BITMAP_OFFSET..];
            for (byte_idx, byte) in tail.iter().enumerate() {
                for bit in 0..8 {
                    let sector_num = PRIMARY_BITMAP_BITS as usize + byte_idx * 8 + bit;
                    if sector_num < bitmap.len() {
                        bitmap[sector_num] = (byte >> (7 - bit)) & 1 == 1;
                    }
                }
            }
        }
        Self { total_sectors, free_sectors, bitmap, enhanced }
    }

    /// Encodes the primary 128-byte VTOC sector.
    pub fn encode_primary(&self) -> [u8; 128] {
        let mut out = [0u8; 128];
        out[0] = DOS_CODE;
        out[1..3].copy_from_slice(&self.total_sectors.to_le_bytes());
        out[3..5].copy_from_slice(&self.free_sectors.to_le_bytes());
        for sector_num in 0..PRIMARY_BITMAP_BITS as usize {
            if *self.bitmap.get(sector_num).unwrap_or(&false) {
                let byte_idx = 10 + sector_num / 8;
                out[byte_idx] |= 1 << (7 - sector_num % 8);
            }
        }
        out
    }

    /// Encodes the second 128-byte bitmap block, if this VTOC is enhanced.
    /// The bitmap itself begins at [`VTOC2_BITMAP_OFFSET`]; bytes before
    /// that are left zeroed.
    pub fn encode_secondary(&self) -> Option<[u8; 128]> {
        if !self.enhanced {
            return None;
        }
        let mut out = [0u8; 128];
        for sector_num in PRIMARY_BITMAP_BITS as usize..ENHANCED_BITMAP_BITS as usize {
            if *self.bitmap.get(sector_num).unwrap_or(&false) {
                let offset = sector_num - PRIMARY_BITMAP_BITS as usize;
                out[VTOC2_BITMAP_OFFSET + offset / 8] |= 1 << (7 - offset % 8);
            }
        }
        Some(out)
    }

    pub fn is_sector_free(&self, n: u32) -> bool {
        self.bitmap.get(n as usize).copied().unwrap_or(false)
    }

    pub fn allocate(&mut self, n: u32) {
        if let Some(bit) = self.bitmap.get_mut(n as usize) {
            if *bit {
                *bit = false;
                self.recompute_free_count();
            }
        }
    }

    pub fn free(&mut self, n: u32) {
        if let Some(bit) = self.bitmap.get_mut(n as usize) {
            if !*bit {
                *bit = true;
                self.recompute_free_count();
            }
        }
    }

    pub fn count_free_sectors(&self) -> u16 {
        self.free_sectors
    }

    /// Recounts free sectors directly from the bitmap, ignoring the stored
    /// `free_sectors` header field. Differs from [`Vtoc::count_free_sectors`]
    /// only when the on-disk header byte disagrees with the bitmap it was
    /// parsed alongside.
    pub fn recomputed_free_count(&self) -> u16 {
        self.bitmap.iter().filter(|b| **b).count() as u16
    }

    fn recompute_free_count(&mut self) {
        self.free_sectors = self.bitmap.iter().filter(|b| **b).count() as u16;
    }

    /// First free sector at or after `from`, scanning the bitmap in order.
    pub fn find_free_from(&self, from: u32) -> Option<u32> {
        (from as usize..self.bitmap.len())
            .find(|&n| self.bitmap[n])
            .map(|n| n as u32)
    }
}
