//! Typed access to guest linear memory.
//!
//! Every read and write validates offset+length against the current memory
//! size first; a violation is a `HostError::MemoryBounds` fault. The
//! allocator-callback helper re-enters the guest, so it re-resolves the
//! memory export and re-checks bounds after the callback returns; the
//! callback may have grown memory, and no host pointer survives it.

use crate::error::HostError;
use wasmtime::{Caller, Memory, Val};

/// Export name of guest linear memory.
const MEMORY_EXPORT: &str = "memory";
/// Export name of the guest function table the allocator callback lives in.
const TABLE_EXPORT: &str = "__indirect_function_table";

/// Resolve the guest's linear memory.
pub fn memory<T>(caller: &mut Caller<'_, T>) -> Result<Memory, HostError> {
    caller
        .get_export(MEMORY_EXPORT)
        .and_then(|e| e.into_memory())
        .ok_or(HostError::MissingExport(MEMORY_EXPORT))
}

fn check_bounds<T>(
    memory: &Memory,
    caller: &Caller<'_, T>,
    ptr: u32,
    len: u32,
) -> Result<(), HostError> {
    let size = memory.data_size(caller) as u64;
    if (ptr as u64) + (len as u64) > size {
        return Err(HostError::MemoryBounds {
            offset: ptr as u64,
            len: len as u64,
        });
    }
    Ok(())
}

/// Validate a region without touching it. Used for out-pointers so the
/// whole call contract is checked up front.
pub fn check<T>(caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Result<(), HostError> {
    let memory = memory(caller)?;
    check_bounds(&memory, caller, ptr, len)
}

/// Read `len` bytes at `ptr`.
pub fn read_bytes<T>(caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Result<Vec<u8>, HostError> {
    let memory = memory(caller)?;
    check_bounds(&memory, caller, ptr, len)?;
    Ok(memory.data(&caller)[ptr as usize..ptr as usize + len as usize].to_vec())
}

/// Read a UTF-8 string at (`ptr`, `len`).
pub fn read_string<T>(caller: &mut Caller<'_, T>, ptr: u32, len: u32) -> Result<String, HostError> {
    let bytes = read_bytes(caller, ptr, len)?;
    String::from_utf8(bytes)
        .map_err(|e| HostError::MalformedArgument(format!("invalid UTF-8: {e}")))
}

/// Write `data` at `ptr`.
pub fn write_bytes<T>(caller: &mut Caller<'_, T>, ptr: u32, data: &[u8]) -> Result<(), HostError> {
    let memory = memory(caller)?;
    check_bounds(&memory, caller, ptr, data.len() as u32)?;
    memory
        .write(caller, ptr as usize, data)
        .map_err(|_| HostError::MemoryBounds {
            offset: ptr as u64,
            len: data.len() as u64,
        })
}

pub fn read_u64<T>(caller: &mut Caller<'_, T>, ptr: u32) -> Result<u64, HostError> {
    let bytes = read_bytes(caller, ptr, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(buf))
}

pub fn read_u128<T>(caller: &mut Caller<'_, T>, ptr: u32) -> Result<u128, HostError> {
    let bytes = read_bytes(caller, ptr, 16)?;
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&bytes);
    Ok(u128::from_le_bytes(buf))
}

pub fn write_u8<T>(caller: &mut Caller<'_, T>, ptr: u32, value: u8) -> Result<(), HostError> {
    write_bytes(caller, ptr, &[value])
}

pub fn write_u16<T>(caller: &mut Caller<'_, T>, ptr: u32, value: u16) -> Result<(), HostError> {
    write_bytes(caller, ptr, &value.to_le_bytes())
}

pub fn write_u32<T>(caller: &mut Caller<'_, T>, ptr: u32, value: u32) -> Result<(), HostError> {
    write_bytes(caller, ptr, &value.to_le_bytes())
}

pub fn write_i32<T>(caller: &mut Caller<'_, T>, ptr: u32, value: i32) -> Result<(), HostError> {
    write_bytes(caller, ptr, &value.to_le_bytes())
}

pub fn write_u64<T>(caller: &mut Caller<'_, T>, ptr: u32, value: u64) -> Result<(), HostError> {
    write_bytes(caller, ptr, &value.to_le_bytes())
}

pub fn write_u128<T>(caller: &mut Caller<'_, T>, ptr: u32, value: u128) -> Result<(), HostError> {
    write_bytes(caller, ptr, &value.to_le_bytes())
}

/// Hand a variable-length result to the guest through its allocator
/// callback: call guest table entry `cb_alloc` with (`cb_alloc_data`,
/// size), treat the returned i32 as the destination offset, then copy.
pub fn alloc_into<T>(
    caller: &mut Caller<'_, T>,
    cb_alloc_data: u32,
    cb_alloc: u32,
    data: &[u8],
) -> Result<(), HostError> {
    let table = caller
        .get_export(TABLE_EXPORT)
        .and_then(|e| e.into_table())
        .ok_or(HostError::MissingExport(TABLE_EXPORT))?;

    let func = match table.get(&mut *caller, cb_alloc) {
        Some(Val::FuncRef(Some(func))) => func,
        Some(Val::FuncRef(None)) => {
            return Err(HostError::BadAllocator(format!(
                "table entry {cb_alloc} is null"
            )))
        }
        _ => {
            return Err(HostError::BadAllocator(format!(
                "table entry {cb_alloc} is out of range or not a function"
            )))
        }
    };
    let typed = func
        .typed::<(u32, u32), u32>(&*caller)
        .map_err(|e| HostError::BadAllocator(format!("wrong allocator signature: {e}")))?;

    // Re-entrant guest call; memory may grow (never shrink) during it.
    let dest = typed
        .call(&mut *caller, (cb_alloc_data, data.len() as u32))
        .map_err(|e| HostError::BadAllocator(format!("allocator trapped: {e}")))?;

    // Destination is validated against the memory size *after* the call.
    write_bytes(caller, dest, data)
}
