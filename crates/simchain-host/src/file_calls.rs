//! File polyfill host calls.

use crate::memory;
use crate::HostState;
use std::path::Path;
use wasmtime::{Caller, Linker};

pub fn register(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "open_file",
        |mut caller: Caller<'_, HostState>,
         path_ptr: u32,
         path_len: u32,
         oflags: u32,
         rights: u64,
         fdflags: u32,
         fd_out_ptr: u32|
         -> Result<u32, anyhow::Error> {
            // Out-pointer is part of the call contract; validate it before
            // doing any filesystem work.
            memory::check(&mut caller, fd_out_ptr, 4)?;
            let path = memory::read_string(&mut caller, path_ptr, path_len)?;
            match caller
                .data_mut()
                .files
                .open(Path::new(&path), oflags, rights, fdflags)
            {
                Ok(fd) => {
                    memory::write_i32(&mut caller, fd_out_ptr, fd)?;
                    Ok(0)
                }
                Err(errno) => Ok(errno as u32),
            }
        },
    )?;

    linker.func_wrap(
        "env",
        "close_file",
        |mut caller: Caller<'_, HostState>, fd: i32| -> u32 {
            caller.data_mut().files.close(fd) as u32
        },
    )?;

    linker.func_wrap(
        "env",
        "write_file",
        |mut caller: Caller<'_, HostState>,
         fd: i32,
         ptr: u32,
         len: u32|
         -> Result<u32, anyhow::Error> {
            let data = memory::read_bytes(&mut caller, ptr, len)?;
            Ok(caller.data_mut().files.write(fd, &data) as u32)
        },
    )?;

    linker.func_wrap(
        "env",
        "read_file",
        |mut caller: Caller<'_, HostState>,
         fd: i32,
         ptr: u32,
         len: u32,
         read_out_ptr: u32|
         -> Result<u32, anyhow::Error> {
            memory::check(&mut caller, ptr, len)?;
            memory::check(&mut caller, read_out_ptr, 4)?;
            let mut buf = vec![0u8; len as usize];
            let n = match caller.data_mut().files.read(fd, &mut buf) {
                Ok(n) => n,
                Err(errno) => return Ok(errno as u32),
            };
            memory::write_bytes(&mut caller, ptr, &buf[..n])?;
            memory::write_i32(&mut caller, read_out_ptr, n as i32)?;
            Ok(0)
        },
    )?;

    linker.func_wrap(
        "env",
        "fdstat_get",
        |mut caller: Caller<'_, HostState>,
         fd: i32,
         filetype_ptr: u32,
         flags_ptr: u32,
         rights_base_ptr: u32,
         rights_inheriting_ptr: u32|
         -> Result<u32, anyhow::Error> {
            match caller.data_mut().files.fdstat(fd) {
                Ok((filetype, flags, rights_base, rights_inheriting)) => {
                    memory::write_u8(&mut caller, filetype_ptr, filetype)?;
                    memory::write_u16(&mut caller, flags_ptr, flags)?;
                    memory::write_u64(&mut caller, rights_base_ptr, rights_base)?;
                    memory::write_u64(&mut caller, rights_inheriting_ptr, rights_inheriting)?;
                    Ok(0)
                }
                Err(errno) => Ok(errno as u32),
            }
        },
    )?;

    // Returns 1 with the contents delivered through the allocator callback,
    // or 0 on any failure.
    linker.func_wrap(
        "env",
        "read_whole_file",
        |mut caller: Caller<'_, HostState>,
         path_ptr: u32,
         path_len: u32,
         cb_alloc_data: u32,
         cb_alloc: u32|
         -> Result<u32, anyhow::Error> {
            let path = memory::read_string(&mut caller, path_ptr, path_len)?;
            let Ok(contents) = std::fs::read(&path) else {
                return Ok(0);
            };
            memory::alloc_into(&mut caller, cb_alloc_data, cb_alloc, &contents)?;
            Ok(1)
        },
    )?;

    Ok(())
}
