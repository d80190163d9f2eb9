//! Eight-slot drive table coordinating [`crate::atr::AtrImage`] instances:
//! mount lifecycle, the "current drive" cursor, and filesystem-forwarding
//! operations used by the DOS command grammar (§4.5).

use std::path::Path;

use crate::atr::{AtrImage, DirectoryEntry, DiskType, Filename, Validation};
use crate::error::{AtrError, DiskManagerError, DosError};
use crate::hostfs::HostFs;

pub const DRIVE_COUNT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveInfo {
    pub drive: u8,
    pub disk_type: DiskType,
    pub path: String,
    pub is_read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveStatus {
    pub drive: u8,
    pub mounted: bool,
    pub path: Option<String>,
    pub disk_type: Option<DiskType>,
    pub is_read_only: bool,
    pub is_current: bool,
}

struct DriveSlot {
    image: Option<AtrImage>,
    path: Option<String>,
}

impl DriveSlot {
    const fn empty() -> Self {
        Self { image: None, path: None }
    }
}

pub struct DiskManager {
    slots: [DriveSlot; DRIVE_COUNT],
    current_drive: u8,
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_drive(n: u8) -> Result<usize, DiskManagerError> {
    if (1..=DRIVE_COUNT as u8).contains(&n) {
        Ok(n as usize - 1)
    } else {
        Err(DiskManagerError::InvalidDrive(n))
    }
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            slots: [
                DriveSlot::empty(), DriveSlot::empty(), DriveSlot::empty(), DriveSlot::empty(),
                DriveSlot::empty(), DriveSlot::empty(), DriveSlot::empty(), DriveSlot::empty(),
            ],
            current_drive: 1,
        }
    }

    fn resolve_drive(&self, drive: Option<u8>) -> Option<u8> {
        drive.or(Some(self.current_drive))
    }

    pub fn mount(
        &mut self,
        drive: u8,
        path: &str,
        read_only: bool,
        fs: &dyn HostFs,
    ) -> Result<DriveInfo, DiskManagerError> {
        let idx = validate_drive(drive)?;
        if !fs.exists(Path::new(path)) {
            return Err(DiskManagerError::PathNotFound(path.to_string()));
        }
        let bytes = fs
            .read(Path::new(path))
            .map_err(|e| DiskManagerError::MountFailed(e.to_string()))?;
        let mut image = AtrImage::parse(&bytes, Validation::Lenient)?;
        image.read_only = read_only;
        image.backing_path = Some(path.to_string());
        let info = DriveInfo {
            drive,
            disk_type: image.disk_type,
            path: path.to_string(),
            is_read_only: read_only,
        };
        self.slots[idx] = DriveSlot { image: Some(image), path: Some(path.to_string()) };
        tracing::info!(drive, path, "disk mounted");
        Ok(info)
    }

    pub fn unmount(&mut self, drive: u8, save: bool, fs: &dyn HostFs) -> Result<(), DiskManagerError> {
        let idx = validate_drive(drive)?;
        if self.slots[idx].image.is_none() {
            return Err(DiskManagerError::DriveEmpty(drive));
        }
        if save {
            if let Some(image) = self.slots[idx].image.as_mut() {
                image.save(fs).map_err(|e| DiskManagerError::MountFailed(e.to_string()))?;
            }
        }
        self.slots[idx] = DriveSlot::empty();
        if self.current_drive == drive {
            self.current_drive = 1;
        }
        tracing::info!(drive, save, "disk unmounted");
        Ok(())
    }

    pub fn change_drive(&mut self, to: u8) -> Result<(), DiskManagerError> {
        validate_drive(to)?;
        self.current_drive = to;
        Ok(())
    }

    pub fn current_drive(&self) -> u8 {
        self.current_drive
    }

    pub fn list_drives(&self) -> [DriveStatus; DRIVE_COUNT] {
        std::array::from_fn(|i| {
            let drive = (i + 1) as u8;
            let slot = &self.slots[i];
            DriveStatus {
                drive,
                mounted: slot.image.is_some(),
                path: slot.path.clone(),
                disk_type: slot.image.as_ref().map(|img| img.disk_type),
                is_read_only: slot.image.as_ref().map(|img| img.read_only).unwrap_or(false),
                is_current: drive == self.current_drive,
            }
        })
    }

    pub fn is_drive_mounted(&self, drive: u8) -> bool {
        match validate_drive(drive) {
            Ok(idx) => self.slots[idx].image.is_some(),
            Err(_) => false,
        }
    }

    /// Silently ignores paths that don't parse as ATR images (automatic
    /// boot-disk discovery feeds arbitrary paths through this).
    pub fn track_booted_disk(&mut self, drive: u8, path: &str, fs: &dyn HostFs) {
        if let Ok(idx) = validate_drive(drive) {
            if let Ok(bytes) = fs.read(Path::new(path)) {
                if let Ok(image) = AtrImage::parse(&bytes, Validation::Lenient) {
                    self.slots[idx] = DriveSlot { image: Some(image), path: Some(path.to_string()) };
                }
            }
        }
    }

    pub fn save_disk(&mut self, drive: u8, fs: &dyn HostFs) -> Result<(), DiskManagerError> {
        let idx = validate_drive(drive)?;
        let image = self.slots[idx].image.as_mut().ok_or(DiskManagerError::DriveEmpty(drive))?;
        image.save(fs).map_err(|e| DiskManagerError::MountFailed(e.to_string()))
    }

    pub fn save_all_disks(&mut self, fs: &dyn HostFs) -> Result<u32, DiskManagerError> {
        let mut saved = 0;
        for slot in self.slots.iter_mut() {
            if let Some(image) = slot.image.as_mut() {
                if image.dirty {
                    image.save(fs).map_err(|e| DiskManagerError::MountFailed(e.to_string()))?;
                    saved += 1;
                }
            }
        }
        Ok(saved)
    }

    fn image(&self, drive: Option<u8>) -> Result<&AtrImage, DiskManagerError> {
        let drive = self.resolve_drive(drive).unwrap_or(self.current_drive);
        let idx = validate_drive(drive)?;
        self.slots[idx].image.as_ref().ok_or(DiskManagerError::DriveEmpty(drive))
    }

    fn image_mut(&mut self, drive: Option<u8>) -> Result<&mut AtrImage, DiskManagerError> {
        let drive = self.resolve_drive(drive).unwrap_or(self.current_drive);
        let idx = validate_drive(drive)?;
        self.slots[idx].image.as_mut().ok_or(DiskManagerError::DriveEmpty(drive))
    }

    pub fn list_directory(
        &self,
        drive: Option<u8>,
        include_deleted: bool,
        pattern: Option<&str>,
    ) -> Result<Vec<(Filename, DirectoryEntry)>, DiskManagerError> {
        Ok(self.image(drive)?.list_directory(include_deleted, pattern))
    }

    pub fn find_file(&self, drive: Option<u8>, name: &str) -> Result<DirectoryEntry, DiskManagerError> {
        let entries = self.image(drive)?.list_directory(false, None);
        entries
            .into_iter()
            .find(|(filename, _)| filename.display().eq_ignore_ascii_case(name))
            .map(|(_, entry)| entry)
            .ok_or_else(|| DosError::FileNotFound(name.to_string()).into())
    }

    pub fn get_file_info(&self, drive: Option<u8>, name: &str) -> Result<DirectoryEntry, DiskManagerError> {
        self.find_file(drive, name)
    }

    pub fn get_info(&self, drive: Option<u8>) -> Result<DriveInfo, DiskManagerError> {
        let drive_num = self.resolve_drive(drive).unwrap_or(self.current_drive);
        let image = self.image(drive)?;
        Ok(DriveInfo {
            drive: drive_num,
            disk_type: image.disk_type,
            path: image.backing_path.clone().unwrap_or_default(),
            is_read_only: image.read_only,
        })
    }

    pub fn read_file(&self, drive: Option<u8>, name: &str) -> Result<Vec<u8>, DiskManagerError> {
        Ok(self.image(drive)?.read_file(name)?)
    }

    pub fn write_file(&mut self, drive: Option<u8>, name: &str, data: &[u8]) -> Result<(), DiskManagerError> {
        let image = self.image_mut(drive)?;
        if image.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        Ok(image.write_file(name, data)?)
    }

    pub fn delete_file(&mut self, drive: Option<u8>, name: &str) -> Result<(), DiskManagerError> {
        let image = self.image_mut(drive)?;
        if image.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        Ok(image.delete_file(name)?)
    }

    pub fn rename_file(&mut self, drive: Option<u8>, old: &str, new: &str) -> Result<(), DiskManagerError> {
        let image = self.image_mut(drive)?;
        if image.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        Ok(image.rename_file(old, new)?)
    }

    pub fn lock_file(&mut self, drive: Option<u8>, name: &str) -> Result<(), DiskManagerError> {
        Ok(self.image_mut(drive)?.lock_file(name)?)
    }

    pub fn unlock_file(&mut self, drive: Option<u8>, name: &str) -> Result<(), DiskManagerError> {
        Ok(self.image_mut(drive)?.unlock_file(name)?)
    }

    pub fn format_disk(&mut self, drive: Option<u8>) -> Result<(), DiskManagerError> {
        let image = self.image_mut(drive)?;
        if image.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        image.format();
        Ok(())
    }

    pub fn export_file(
        &self,
        drive: Option<u8>,
        name: &str,
        host_path: &str,
        fs: &dyn HostFs,
    ) -> Result<(), DiskManagerError> {
        let data = self.image(drive)?.read_file(name)?;
        fs.write(Path::new(host_path), &data).map_err(|e| DiskManagerError::MountFailed(e.to_string()))
    }

    pub fn import_file(
        &mut self,
        drive: Option<u8>,
        host_path: &str,
        name: &str,
        fs: &dyn HostFs,
    ) -> Result<(), DiskManagerError> {
        if !fs.exists(Path::new(host_path)) {
            return Err(DiskManagerError::PathNotFound(host_path.to_string()));
        }
        let data = fs.read(Path::new(host_path)).map_err(|e| DiskManagerError::MountFailed(e.to_string()))?;
        let image = self.image_mut(drive)?;
        if image.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        Ok(image.write_file(name, &data)?)
    }

    pub fn copy_file(
        &mut self,
        from_drive: Option<u8>,
        name: &str,
        to_drive: Option<u8>,
        as_name: Option<&str>,
    ) -> Result<(), DiskManagerError> {
        let data = self.image(from_drive)?.read_file(name)?;
        let dest_name = as_name.unwrap_or(name);
        let dest = self.image_mut(to_drive)?;
        if dest.read_only {
            return Err(DiskManagerError::DiskReadOnly(self.current_drive));
        }
        Ok(dest.write_file(dest_name, &data)?)
    }

    pub fn create_disk(
        &mut self,
        path: &str,
        disk_type: DiskType,
        fs: &dyn HostFs,
    ) -> Result<(), DiskManagerError> {
        AtrImage::create_formatted(path, disk_type, fs).map(|_| ()).map_err(DiskManagerError::Atr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hostfs::StdHostFs;

    #[test]
    fn invalid_drive_numbers_are_rejected() {
        let fs = StdHostFs;
        let mut mgr = DiskManager::new();
        assert_eq!(mgr.mount(0, "/tmp/x.atr", false, &fs).unwrap_err(), DiskManagerError::InvalidDrive(0));
        assert_eq!(mgr.mount(9, "/tmp/x.atr", false, &fs).unwrap_err(), DiskManagerError::InvalidDrive(9));
        assert!(!mgr.is_drive_mounted(0));
        assert!(!mgr.is_drive_mounted(9));
    }

    #[test]
    fn mount_write_read_unmount_round_trip() {
        let fs = StdHostFs;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.atr");
        AtrImage::create_formatted(path.to_str().unwrap(), DiskType::SingleDensity, &fs).unwrap();

        let mut mgr = DiskManager::new();
        let info = mgr.mount(1, path.to_str().unwrap(), false, &fs).unwrap();
        assert_eq!(info.drive, 1);
        assert!(!info.is_read_only);

        mgr.write_file(Some(1), "HELLO.TXT", b"HELLO").unwrap();
        assert_eq!(mgr.read_file(Some(1), "HELLO.TXT").unwrap(), b"HELLO");

        mgr.unmount(1, true, &fs).unwrap();
        assert!(!mgr.is_drive_mounted(1));
        assert_eq!(mgr.current_drive(), 1);

        let mut mgr2 = DiskManager::new();
        mgr2.mount(1, path.to_str().unwrap(), false, &fs).unwrap();
        assert_eq!(mgr2.read_file(Some(1), "HELLO.TXT").unwrap(), b"HELLO");
    }

    #[test]
    fn unmounting_current_drive_resets_to_one() {
        let fs = StdHostFs;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.atr");
        AtrImage::create_formatted(path.to_str().unwrap(), DiskType::SingleDensity, &fs).unwrap();
        let mut mgr = DiskManager::new();
        mgr.mount(3, path.to_str().unwrap(), false, &fs).unwrap();
        mgr.change_drive(3).unwrap();
        mgr.unmount(3, false, &fs).unwrap();
        assert_eq!(mgr.current_drive(), 1);
    }

    #[test]
    fn nil_drive_argument_uses_current_drive() {
        let fs = StdHostFs;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.atr");
        AtrImage::create_formatted(path.to_str().unwrap(), DiskType::SingleDensity, &fs).unwrap();
        let mut mgr = DiskManager::new();
        mgr.mount(2, path.to_str().unwrap(), false, &fs).unwrap();
        mgr.change_drive(2).unwrap();
        mgr.write_file(None, "A.TXT", b"1").unwrap();
        assert_eq!(mgr.read_file(None, "A.TXT").unwrap(), b"1");
    }

    #[test]
    fn save_all_disks_is_idempotent_on_clean_images() {
        let fs = StdHostFs;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.atr");
        AtrImage::create_formatted(path.to_str().unwrap(), DiskType::SingleDensity, &fs).unwrap();
        let mut mgr = DiskManager::new();
        mgr.mount(1, path.to_str().unwrap(), false, &fs).unwrap();
        assert_eq!(mgr.save_all_disks(&fs).unwrap(), 0);
        mgr.write_file(Some(1), "A.TXT", b"1").unwrap();
        assert_eq!(mgr.save_all_disks(&fs).unwrap(), 1);
        assert_eq!(mgr.save_all_disks(&fs).unwrap(), 0);
    }
}
