//! Minimal POSIX-like file table.
//!
//! Fixed low descriptors: 0-2 are the console streams, 3 is a virtual root
//! directory. Neither is openable or closable by the guest. Opened files
//! take fresh slots; a closed slot is tombstoned and never recycled.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

pub const ERRNO_SUCCESS: u16 = 0;
pub const ERRNO_BADF: u16 = 8;
pub const ERRNO_EXIST: u16 = 20;
pub const ERRNO_INVAL: u16 = 28;
pub const ERRNO_IO: u16 = 29;
pub const ERRNO_NOENT: u16 = 44;

pub const FILETYPE_CHARACTER_DEVICE: u8 = 2;
pub const FILETYPE_DIRECTORY: u8 = 3;
pub const FILETYPE_REGULAR_FILE: u8 = 4;

pub const RIGHTS_FD_READ: u64 = 2;
pub const RIGHTS_FD_WRITE: u64 = 64;

pub const OFLAGS_CREAT: u32 = 1;
pub const OFLAGS_DIRECTORY: u32 = 2;
pub const OFLAGS_EXCL: u32 = 4;
pub const OFLAGS_TRUNC: u32 = 8;

pub const FDFLAGS_APPEND: u32 = 1;
pub const FDFLAGS_NONBLOCK: u32 = 4;

const ROOT_DIR_FD: i32 = 3;

/// One slot in the descriptor table.
pub enum FileSlot {
    Stdin,
    Stdout,
    Stderr,
    RootDir,
    File(File),
    Closed,
}

/// The per-run descriptor table.
pub struct FileTable {
    slots: Vec<FileSlot>,
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: vec![
                FileSlot::Stdin,
                FileSlot::Stdout,
                FileSlot::Stderr,
                FileSlot::RootDir,
            ],
        }
    }

    fn slot(&mut self, fd: i32) -> Option<&mut FileSlot> {
        if fd < 0 {
            return None;
        }
        self.slots.get_mut(fd as usize)
    }

    /// Map the WASI flag combination onto exactly one open mode and open
    /// the file. Any combination outside the table is `ERRNO_INVAL`.
    pub fn open(
        &mut self,
        path: &Path,
        oflags: u32,
        rights: u64,
        fdflags: u32,
    ) -> Result<i32, u16> {
        if oflags & OFLAGS_DIRECTORY != 0 || fdflags & FDFLAGS_NONBLOCK != 0 {
            return Err(ERRNO_INVAL);
        }

        let read = rights & RIGHTS_FD_READ != 0;
        let write = rights & RIGHTS_FD_WRITE != 0;
        let create = oflags & OFLAGS_CREAT != 0;
        let excl = oflags & OFLAGS_EXCL != 0;
        let trunc = oflags & OFLAGS_TRUNC != 0;
        let append = fdflags & FDFLAGS_APPEND != 0;

        let mut options = OpenOptions::new();
        let options = if read && !create && !excl && !trunc && !append {
            // "r" / "r+"
            options.read(true).write(write)
        } else if write && create && trunc && !append {
            // "w" family
            options
                .read(read)
                .write(true)
                .create(!excl)
                .create_new(excl)
                .truncate(true)
        } else if write && create && append && !trunc {
            // "a" family
            options
                .read(read)
                .append(true)
                .create(!excl)
                .create_new(excl)
        } else {
            return Err(ERRNO_INVAL);
        };

        let file = options.open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ERRNO_NOENT,
            std::io::ErrorKind::AlreadyExists => ERRNO_EXIST,
            _ => ERRNO_IO,
        })?;

        self.slots.push(FileSlot::File(file));
        Ok(self.slots.len() as i32 - 1)
    }

    /// Close an opened file. Console streams and the root directory are not
    /// closable; a tombstone never comes back.
    pub fn close(&mut self, fd: i32) -> u16 {
        match self.slot(fd) {
            Some(slot @ FileSlot::File(_)) => {
                *slot = FileSlot::Closed;
                ERRNO_SUCCESS
            }
            _ => ERRNO_BADF,
        }
    }

    pub fn write(&mut self, fd: i32, data: &[u8]) -> u16 {
        let result = match self.slot(fd) {
            Some(FileSlot::Stdout) => std::io::stdout().write_all(data),
            Some(FileSlot::Stderr) => std::io::stderr().write_all(data),
            Some(FileSlot::File(file)) => file.write_all(data),
            _ => return ERRNO_BADF,
        };
        match result {
            Ok(()) => ERRNO_SUCCESS,
            Err(_) => ERRNO_IO,
        }
    }

    pub fn read(&mut self, fd: i32, buf: &mut [u8]) -> Result<usize, u16> {
        let result = match self.slot(fd) {
            Some(FileSlot::Stdin) => std::io::stdin().read(buf),
            Some(FileSlot::File(file)) => file.read(buf),
            _ => return Err(ERRNO_BADF),
        };
        result.map_err(|_| ERRNO_IO)
    }

    /// (filetype, fdflags, rights_base, rights_inheriting) for `fdstat_get`.
    pub fn fdstat(&mut self, fd: i32) -> Result<(u8, u16, u64, u64), u16> {
        match self.slot(fd) {
            Some(FileSlot::Stdin) => Ok((FILETYPE_CHARACTER_DEVICE, 0, RIGHTS_FD_READ, 0)),
            Some(FileSlot::Stdout) | Some(FileSlot::Stderr) => Ok((
                FILETYPE_CHARACTER_DEVICE,
                FDFLAGS_APPEND as u16,
                RIGHTS_FD_WRITE,
                0,
            )),
            Some(FileSlot::RootDir) => Ok((
                FILETYPE_DIRECTORY,
                0,
                0,
                RIGHTS_FD_READ | RIGHTS_FD_WRITE,
            )),
            Some(FileSlot::File(_)) => Ok((
                FILETYPE_REGULAR_FILE,
                0,
                RIGHTS_FD_READ | RIGHTS_FD_WRITE,
                0,
            )),
            _ => Err(ERRNO_BADF),
        }
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}
