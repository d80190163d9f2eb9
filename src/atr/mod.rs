//! Typed binary container for Atari `.atr` disk images plus the DOS 2.x
//! filesystem layered on top of it (§4.4).

pub mod directory;
pub mod filesystem;
pub mod header;
pub mod vtoc;

pub use directory::{DirectoryEntry, Filename, SectorLink};
pub use header::{AtrHeader, DiskType, ATR_HEADER_LEN, ATR_MAGIC};
pub use vtoc::Vtoc;

use crate::error::AtrError;
use crate::hostfs::HostFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Strict,
    Lenient,
}

/// An in-memory `.atr` image: header, raw sector data, dirty/read-only state.
#[derive(Debug, Clone)]
pub struct AtrImage {
    pub header: AtrHeader,
    pub disk_type: DiskType,
    data: Vec<u8>,
    pub dirty: bool,
    pub backing_path: Option<String>,
    pub read_only: bool,
}

fn disk_type_for(header: &AtrHeader, sector_count_hint: Option<u32>) -> Option<DiskType> {
    let candidates = [
        DiskType::SingleDensity,
        DiskType::EnhancedDensity,
        DiskType::DoubleDensity,
        DiskType::QuadDensity,
    ];
    candidates.into_iter().find(|dt| {
        dt.container_sector_size() == header.sector_size
            && sector_count_hint.map(|hint| dt.sector_count() == hint).unwrap_or(true)
    })
}

impl AtrImage {
    pub fn parse(bytes: &[u8], validation: Validation) -> Result<Self, AtrError> {
        let header = AtrHeader::parse(bytes)?;
        let declared = header.declared_data_len();
        let actual = bytes.len() - ATR_HEADER_LEN;

        let mut data = bytes[ATR_HEADER_LEN..].to_vec();
        match validation {
            Validation::Strict if declared != actual => {
                return Err(AtrError::SizeMismatch { expected: declared, actual });
            }
            Validation::Lenient if declared > actual => {
                data.resize(declared, 0);
            }
            _ => {}
        }

        // Infer disk type from sector size and the declared sector count
        // (double vs. quad density share a sector size but differ in
        // capacity).
        let sector_count_hint =
            infer_sector_count(header.sector_size, data.len() as u64);
        let disk_type = disk_type_for(&header, sector_count_hint)
            .unwrap_or(if header.sector_size == 128 {
                DiskType::SingleDensity
            } else {
                DiskType::DoubleDensity
            });

        Ok(Self { header, disk_type, data, dirty: false, backing_path: None, read_only: false })
    }

    pub fn create(
        path: &str,
        disk_type: DiskType,
        read_only: bool,
        fs: &dyn HostFs,
    ) -> Result<Self, AtrError> {
        if disk_type.is_read_only_only() && !read_only {
            return Err(AtrError::UnsupportedDensity("quad density is read-only".to_string()));
        }
        let header = AtrHeader {
            paragraphs: (disk_type.data_area_len() / 16) as u32,
            sector_size: disk_type.header_sector_size_field(),
        };
        let data = vec![0u8; disk_type.data_area_len()];
        let mut image = Self { header, disk_type, data, dirty: true, backing_path: Some(path.to_string()), read_only };
        image.save_as(path, fs).map_err(|e| AtrError::UnsupportedDensity(e.to_string()))?;
        Ok(image)
    }

    pub fn create_formatted(
        path: &str,
        disk_type: DiskType,
        fs: &dyn HostFs,
    ) -> Result<Self, AtrError> {
        let mut image = Self::create(path, disk_type, false, fs)?;
        image.format();
        image.save(fs).map_err(|e| AtrError::UnsupportedDensity(e.to_string()))?;
        Ok(image)
    }

    pub fn sector_count(&self) -> u32 {
        self.disk_type.sector_count()
    }

    /// Sector size actually used for sector `n` (the boot-sectors-short rule).
    pub fn actual_sector_size(&self, n: u32) -> u16 {
        if matches!(self.disk_type, DiskType::DoubleDensity | DiskType::QuadDensity) && n <= 3 {
            128
        } else {
            self.disk_type.container_sector_size()
        }
    }

    fn sector_offset(&self, n: u32) -> Result<(usize, usize), AtrError> {
        let max = self.sector_count();
        if n < 1 || n > max {
            return Err(AtrError::SectorOutOfRange(n, max));
        }
        let offset = if matches!(self.disk_type, DiskType::DoubleDensity | DiskType::QuadDensity) {
            if n <= 3 {
                (n as usize - 1) * 128
            } else {
                3 * 128 + (n as usize - 4) * self.disk_type.container_sector_size() as usize
            }
        } else {
            (n as usize - 1) * self.disk_type.container_sector_size() as usize
        };
        Ok((offset, self.actual_sector_size(n) as usize))
    }

    pub fn read_sector(&self, n: u32) -> Result<&[u8], AtrError> {
        let (offset, len) = self.sector_offset(n)?;
        Ok(&self.data[offset..offset + len])
    }

    pub fn write_sector(&mut self, n: u32, bytes: &[u8]) -> Result<(), AtrError> {
        if self.read_only {
            return Err(AtrError::ReadOnly);
        }
        let (offset, expected) = self.sector_offset(n)?;
        if bytes.len() != expected {
            return Err(AtrError::SectorSizeMismatch { sector: n, expected, actual: bytes.len() });
        }
        self.data[offset..offset + expected].copy_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ATR_HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn save(&mut self, fs: &dyn HostFs) -> std::io::Result<()> {
        match &self.backing_path {
            Some(path) if !self.dirty => {
                tracing::debug!(path, "save skipped: image is clean");
                let _ = path;
                Ok(())
            }
            Some(path) => {
                let path = path.clone();
                self.save_as(&path, fs)
            }
            None => Ok(()),
        }
    }

    pub fn save_as(&mut self, path: &str, fs: &dyn HostFs) -> std::io::Result<()> {
        let bytes = self.encode();
        fs.write_atomic(std::path::Path::new(path), &bytes)?;
        self.backing_path = Some(path.to_string());
        self.dirty = false;
        tracing::info!(path, "disk image saved");
        Ok(())
    }

    pub fn format(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
        let vtoc = Vtoc::new(self.sector_count() as u16, self.disk_type.is_enhanced());
        self.write_vtoc(&vtoc);
        self.dirty = true;
    }
}

fn infer_sector_count(sector_size: u16, data_len: u64) -> Option<u32> {
    match sector_size {
        128 => {
            if data_len == DiskType::EnhancedDensity.data_area_len() as u64 {
                Some(1040)
            } else {
                Some(720)
            }
        }
        256 => {
            if data_len == DiskType::QuadDensity.data_area_len() as u64 {
                Some(1440)
            } else {
                Some(720)
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostfs::StdHostFs;

    #[test]
    fn create_then_parse_round_trips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.atr");
        let fs = StdHostFs;
        AtrImage::create(path.to_str().unwrap(), DiskType::SingleDensity, false, &fs).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let image = AtrImage::parse(&bytes, Validation::Strict).unwrap();
        assert_eq!(image.disk_type, DiskType::SingleDensity);
        assert_eq!(image.sector_count(), 720);
    }

    #[test]
    fn double_density_boot_sectors_report_128_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dd.atr");
        let fs = StdHostFs;
        let image =
            AtrImage::create(path.to_str().unwrap(), DiskType::DoubleDensity, false, &fs).unwrap();
        assert_eq!(image.actual_sector_size(1), 128);
        assert_eq!(image.actual_sector_size(4), 256);
    }

    #[test]
    fn quad_density_requires_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.atr");
        let fs = StdHostFs;
        let err = AtrImage::create(path.to_str().unwrap(), DiskType::QuadDensity, false, &fs)
            .unwrap_err();
        assert_eq!(err, AtrError::UnsupportedDensity("quad density is read-only".to_string()));
    }

    #[test]
    fn write_sector_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.atr");
        let fs = StdHostFs;
        let mut image =
            AtrImage::create(path.to_str().unwrap(), DiskType::SingleDensity, false, &fs).unwrap();
        let err = image.write_sector(4, &[0u8; 64]).unwrap_err();
        assert_eq!(
            err,
            AtrError::SectorSizeMismatch { sector: 4, expected: 128, actual: 64 }
        );
    }

    #[test]
    fn sector_out_of_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t2.atr");
        let fs = StdHostFs;
        let image =
            AtrImage::create(path.to_str().unwrap(), DiskType::SingleDensity, false, &fs).unwrap();
        assert_eq!(image.read_sector(721).unwrap_err(), AtrError::SectorOutOfRange(721, 720));
    }
}
