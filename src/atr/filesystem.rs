//! DOS 2.x filesystem operations layered on top of [`super::AtrImage`]:
//! VTOC bookkeeping, the 64-entry directory, and file chain walking (§4.4).

use super::directory::{
    DirectoryEntry, Filename, SectorLink, DIRECTORY_ENTRY_LEN, DIRECTORY_FIRST_SECTOR,
    DIRECTORY_LAST_SECTOR, ENTRIES_PER_DIRECTORY, FLAGS_NEW_FILE, FLAG_DELETED, FLAG_LOCKED,
};
use super::vtoc::{Vtoc, VTOC2_SECTOR, VTOC_SECTOR};
use super::AtrImage;
use crate::error::DosError;

const ENTRIES_PER_SECTOR: usize = 8;
const FIRST_DATA_SECTOR: u32 = 4;

impl AtrImage {
    pub fn read_vtoc(&self) -> Vtoc {
        let primary = self.read_sector(VTOC_SECTOR).expect("VTOC sector always in range");
        let mut buf = [0u8; 128];
        buf[..primary.len().min(128)].copy_from_slice(&primary[..primary.len().min(128)]);
        let secondary = if self.disk_type.is_enhanced() {
            self.read_sector(VTOC2_SECTOR).ok().map(|s| {
                let mut b = [0u8; 128];
                b[..s.len().min(128)].copy_from_slice(&s[..s.len().min(128)]);
                b
            })
        } else {
            None
        };
        Vtoc::parse(&buf, secondary.as_ref())
    }

    pub(super) fn write_vtoc(&mut self, vtoc: &Vtoc) {
        let primary = vtoc.encode_primary();
        let sector_size = self.actual_sector_size(VTOC_SECTOR) as usize;
        let mut sector = vec![0u8; sector_size];
        sector[..128.min(sector_size)].copy_from_slice(&primary[..128.min(sector_size)]);
        self.write_sector(VTOC_SECTOR, &sector).expect("VTOC sector always writable");
        if let Some(secondary) = vtoc.encode_secondary() {
            let size2 = self.actual_sector_size(VTOC2_SECTOR) as usize;
            let mut sector2 = vec![0u8; size2];
            sector2[..128.min(size2)].copy_from_slice(&secondary[..128.min(size2)]);
            self.write_sector(VTOC2_SECTOR, &sector2).expect("VTOC2 sector always writable");
        }
    }

    fn read_directory_entries(&self) -> Vec<(DirectoryEntry, Filename)> {
        let mut entries = Vec::with_capacity(ENTRIES_PER_DIRECTORY);
        for sector in DIRECTORY_FIRST_SECTOR..=DIRECTORY_LAST_SECTOR {
            let data = self.read_sector(sector).expect("directory sector always in range");
            for slot in 0..ENTRIES_PER_SECTOR {
                let start = slot * DIRECTORY_ENTRY_LEN;
                let mut raw = [0u8; DIRECTORY_ENTRY_LEN];
                raw.copy_from_slice(&data[start..start + DIRECTORY_ENTRY_LEN]);
                entries.push(DirectoryEntry::parse(&raw));
            }
        }
        entries
    }

    fn write_directory_entry(&mut self, index: usize, entry: &DirectoryEntry, filename: &Filename) {
        let sector = DIRECTORY_FIRST_SECTOR + (index / ENTRIES_PER_SECTOR) as u32;
        let slot = index % ENTRIES_PER_SECTOR;
        let sector_size = self.actual_sector_size(sector) as usize;
        let mut data = self.read_sector(sector).expect("directory sector in range").to_vec();
        data.resize(sector_size, 0);
        let encoded = entry.encode(filename);
        data[slot * DIRECTORY_ENTRY_LEN..(slot + 1) * DIRECTORY_ENTRY_LEN].copy_from_slice(&encoded);
        self.write_sector(sector, &data).expect("directory sector always writable");
    }

    fn bytes_per_data_sector(&self) -> usize {
        self.disk_type.container_sector_size() as usize - 3
    }

    fn find_entry(&self, name: &str) -> Result<(usize, DirectoryEntry, Filename), DosError> {
        let target = Filename::from_string(name)?;
        self.read_directory_entries()
            .into_iter()
            .enumerate()
            .find(|(_, (entry, filename))| {
                !entry.is_available_slot() && *filename == target
            })
            .map(|(i, (e, f))| (i, e, f))
            .ok_or_else(|| DosError::FileNotFound(name.to_string()))
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, DosError> {
        let (index, entry, _) = self.find_entry(name)?;
        let sector_size = self.disk_type.container_sector_size();
        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut sector = entry.start_sector as u32;
        let mut hops = 0u32;
        loop {
            if sector == 0 {
                break;
            }
            if !seen.insert(sector) {
                return Err(DosError::FileChainCorrupted(
                    name.to_string(),
                    format!("sector {sector} revisited"),
                ));
            }
            hops += 1;
            if hops as u16 > entry.sector_count {
                return Err(DosError::FileChainCorrupted(
                    name.to_string(),
                    "chain longer than recorded sector count".to_string(),
                ));
            }
            let data = self
                .read_sector(sector)
                .map_err(|_| DosError::FileChainCorrupted(name.to_string(), "sector out of range".to_string()))?;
            if data.len() < 3 {
                return Err(DosError::FileChainCorrupted(name.to_string(), "sector too short".to_string()));
            }
            let trailer = [data[data.len() - 3], data[data.len() - 2], data[data.len() - 1]];
            let link = SectorLink::decode(trailer, sector_size);
            if link.file_id as usize != index {
                return Err(DosError::FileChainCorrupted(
                    name.to_string(),
                    format!("wrong file id {} at sector {sector}", link.file_id),
                ));
            }
            let payload_len = if link.next_sector == 0 {
                link.bytes_in_sector as usize
            } else {
                data.len() - 3
            };
            out.extend_from_slice(&data[..payload_len.min(data.len() - 3)]);
            sector = link.next_sector as u32;
        }
        Ok(out)
    }

    pub fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), DosError> {
        let filename = Filename::from_string(name)?;
        if self.find_entry(name).is_ok() {
            return Err(DosError::FileExists(name.to_string()));
        }
        let mut entries = self.read_directory_entries();
        let slot_index = entries
            .iter()
            .position(|(entry, _)| entry.is_available_slot())
            .ok_or(DosError::DirectoryFull)?;

        let per_sector = self.bytes_per_data_sector();
        let needed_sectors = data.len().div_ceil(per_sector).max(1);
        let mut vtoc = self.read_vtoc();
        if (vtoc.count_free_sectors() as usize) < needed_sectors {
            return Err(DosError::DiskFull);
        }

        let mut allocated = Vec::with_capacity(needed_sectors);
        let mut cursor = FIRST_DATA_SECTOR;
        for _ in 0..needed_sectors {
            let sector = vtoc
                .find_free_from(cursor)
                .ok_or(DosError::DiskFull)?;
            vtoc.allocate(sector);
            allocated.push(sector);
            cursor = sector + 1;
        }

        let sector_size = self.disk_type.container_sector_size() as usize;
        for (i, &sector) in allocated.iter().enumerate() {
            let chunk_start = i * per_sector;
            let chunk_end = (chunk_start + per_sector).min(data.len());
            let chunk = &data[chunk_start..chunk_end];
            let next_sector = allocated.get(i + 1).copied().unwrap_or(0);
            let link = SectorLink {
                file_id: slot_index as u8,
                next_sector: next_sector as u16,
                bytes_in_sector: chunk.len() as u16,
            };
            let mut buf = vec![0u8; sector_size];
            buf[..chunk.len()].copy_from_slice(chunk);
            let trailer = link.encode(sector_size as u16);
            buf[sector_size - 3..].copy_from_slice(&trailer);
            self.write_sector(sector, &buf).expect("allocated sector always writable");
        }

        let entry = DirectoryEntry {
            flags: FLAGS_NEW_FILE,
            sector_count: allocated.len() as u16,
            start_sector: allocated.first().copied().unwrap_or(0) as u16,
        };
        entries[slot_index] = (entry, filename.clone());
        self.write_directory_entry(slot_index, &entry, &filename);
        self.write_vtoc(&vtoc);
        self.dirty = true;
        Ok(())
    }

    pub fn delete_file(&mut self, name: &str) -> Result<(), DosError> {
        let (index, entry, filename) = self.find_entry(name)?;
        if entry.is_locked() {
            return Err(DosError::FileLocked(name.to_string()));
        }
        let mut vtoc = self.read_vtoc();
        let sector_size = self.disk_type.container_sector_size();
        let mut sector = entry.start_sector as u32;
        let mut seen = std::collections::HashSet::new();
        while sector != 0 {
            if !seen.insert(sector) {
                break;
            }
            let data = self.read_sector(sector).unwrap_or(&[]).to_vec();
            vtoc.free(sector);
            if data.len() < 3 {
                break;
            }
            let trailer = [data[data.len() - 3], data[data.len() - 2], data[data.len() - 1]];
            let link = SectorLink::decode(trailer, sector_size);
            sector = link.next_sector as u32;
        }
        let cleared = DirectoryEntry { flags: FLAG_DELETED, sector_count: 0, start_sector: 0 };
        self.write_directory_entry(index, &cleared, &filename);
        self.write_vtoc(&vtoc);
        self.dirty = true;
        Ok(())
    }

    pub fn rename_file(&mut self, old: &str, new: &str) -> Result<(), DosError> {
        let (index, entry, _) = self.find_entry(old)?;
        let new_name = Filename::from_string(new)?;
        if self.find_entry(new).is_ok() {
            return Err(DosError::FileExists(new.to_string()));
        }
        self.write_directory_entry(index, &entry, &new_name);
        self.dirty = true;
        Ok(())
    }

    fn set_locked(&mut self, name: &str, locked: bool) -> Result<(), DosError> {
        let (index, mut entry, filename) = self.find_entry(name)?;
        if locked {
            entry.flags |= FLAG_LOCKED;
        } else {
            entry.flags &= !FLAG_LOCKED;
        }
        self.write_directory_entry(index, &entry, &filename);
        self.dirty = true;
        Ok(())
    }

    pub fn lock_file(&mut self, name: &str) -> Result<(), DosError> {
        self.set_locked(name, true)
    }

    pub fn unlock_file(&mut self, name: &str) -> Result<(), DosError> {
        self.set_locked(name, false)
    }

    pub fn list_directory(&self, include_deleted: bool, pattern: Option<&str>) -> Vec<(Filename, DirectoryEntry)> {
        self.read_directory_entries()
            .into_iter()
            .filter(|(entry, _)| !entry.is_never_used())
            .filter(|(entry, _)| include_deleted || !entry.is_deleted())
            .filter(|(_, filename)| pattern.map(|p| filename.matches_pattern(p)).unwrap_or(true))
            .map(|(entry, filename)| (filename, entry))
            .collect()
    }

    /// Issues found by a consistency sweep (§4.4 `validate`): free-count
    /// mismatches, chain corruption, double-claimed sectors, sectors
    /// claimed-but-marked-free, and unreachable chains are all reported as
    /// human-readable strings rather than typed errors, since this is a
    /// diagnostic dump rather than a fallible operation.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let vtoc = self.read_vtoc();
        let stored_free = vtoc.count_free_sectors();
        let actual_free = vtoc.recomputed_free_count();
        if stored_free != actual_free {
            issues.push(format!(
                "VTOC free sector count mismatch: header says {stored_free}, bitmap has {actual_free}"
            ));
        }
        let mut claimed: std::collections::HashMap<u32, Vec<String>> = std::collections::HashMap::new();
        for (entry, filename) in self.read_directory_entries() {
            if entry.is_never_used() || entry.is_deleted() {
                continue;
            }
            match self.read_file(&filename.display()) {
                Ok(_) => {}
                Err(e) => issues.push(format!("{}: {e}", filename.display())),
            }
            let mut sector = entry.start_sector as u32;
            let mut seen = std::collections::HashSet::new();
            while sector != 0 && seen.insert(sector) {
                claimed.entry(sector).or_default().push(filename.display());
                if let Ok(data) = self.read_sector(sector) {
                    if data.len() >= 3 {
                        let trailer = [data[data.len() - 3], data[data.len() - 2], data[data.len() - 1]];
                        let link = SectorLink::decode(trailer, self.disk_type.container_sector_size());
                        sector = link.next_sector as u32;
                        continue;
                    }
                }
                break;
            }
        }
        for (sector, owners) in &claimed {
            if owners.len() > 1 {
                issues.push(format!("sector {sector} claimed by {owners:?}"));
            }
            if vtoc.is_sector_free(*sector) {
                issues.push(format!("sector {sector} claimed but marked free in VTOC"));
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::super::header::DiskType;
    use super::super::AtrImage;
    use crate::hostfs::StdHostFs;

    fn formatted_image() -> AtrImage {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.atr");
        let fs = StdHostFs;
        AtrImage::create_formatted(path.to_str().unwrap(), DiskType::SingleDensity, &fs).unwrap()
    }

    #[test]
    fn write_then_read_file_round_trips() {
        let mut image = formatted_image();
        image.write_file("HELLO.TXT", b"hello world").unwrap();
        assert_eq!(image.read_file("hello.txt").unwrap(), b"hello world");
    }

    #[test]
    fn write_duplicate_name_fails_file_exists() {
        let mut image = formatted_image();
        image.write_file("A.TXT", b"1").unwrap();
        assert!(image.write_file("a.txt", b"2").is_err());
    }

    #[test]
    fn delete_then_read_fails_not_found() {
        let mut image = formatted_image();
        image.write_file("A.TXT", b"1").unwrap();
        image.delete_file("A.TXT").unwrap();
        assert!(image.read_file("A.TXT").is_err());
    }

    #[test]
    fn locked_file_cannot_be_deleted() {
        let mut image = formatted_image();
        image.write_file("A.TXT", b"1").unwrap();
        image.lock_file("A.TXT").unwrap();
        assert!(image.delete_file("A.TXT").is_err());
        image.unlock_file("A.TXT").unwrap();
        image.delete_file("A.TXT").unwrap();
    }

    #[test]
    fn list_directory_respects_pattern_and_deleted_filter() {
        let mut image = formatted_image();
        image.write_file("A.TXT", b"1").unwrap();
        image.write_file("B.BAS", b"2").unwrap();
        image.delete_file("A.TXT").unwrap();
        let visible = image.list_directory(false, None);
        assert_eq!(visible.len(), 1);
        let all = image.list_directory(true, None);
        assert_eq!(all.len(), 2);
        let bas_only = image.list_directory(true, Some("*.BAS"));
        assert_eq!(bas_only.len(), 1);
    }

    #[test]
    fn multi_sector_file_spans_the_chain() {
        let mut image = formatted_image();
        let payload = vec![0x42u8; 500];
        image.write_file("BIG.BIN", &payload).unwrap();
        assert_eq!(image.read_file("BIG.BIN").unwrap(), payload);
    }

    #[test]
    fn validate_reports_no_issues_on_a_clean_disk() {
        let mut image = formatted_image();
        image.write_file("A.TXT", b"hi").unwrap();
        assert!(image.validate().is_empty());
    }

}
