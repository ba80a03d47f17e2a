//! Table-access host calls: the primary i64 family and the idx64/idx128
//! secondary-index families.
//!
//! All of them operate on the currently selected chain. Out-pointers are
//! validated before the query runs, and are only written when the query
//! lands on a row; end results leave them untouched, like the original
//! chain ABI.

use crate::error::HostError;
use crate::memory;
use crate::HostState;
use simchain_chain::Partition;
use wasmtime::{Caller, Linker};

fn part(code: u64, scope: u64, table: u64) -> Partition {
    Partition::new(code.into(), scope.into(), table.into())
}

pub fn register(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    // ---- primary i64 family ----

    linker.func_wrap(
        "env",
        "db_find_i64",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         id: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.db_find_i64(part(code, scope, table), id))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_lowerbound_i64",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         id: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.db_lowerbound_i64(part(code, scope, table), id))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_upperbound_i64",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         id: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.db_upperbound_i64(part(code, scope, table), id))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_end_i64",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.db_end_i64(part(code, scope, table)))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_next_i64",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (next, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .db_next_i64(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(next)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_previous_i64",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (previous, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .db_previous_i64(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(previous)
        },
    )?;

    // Copies what fits and returns the full row size, so a zero-length
    // buffer doubles as a size query.
    linker.func_wrap(
        "env",
        "db_get_i64",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         buffer_ptr: u32,
         buffer_len: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, buffer_ptr, buffer_len)?;
            let value = caller
                .data_mut()
                .chains
                .selected_controller()?
                .db_get_i64(iterator)
                .map_err(HostError::Chain)?;
            let n = value.len().min(buffer_len as usize);
            memory::write_bytes(&mut caller, buffer_ptr, &value[..n])?;
            Ok(value.len() as i32)
        },
    )?;

    // ---- idx64 secondary family ----

    linker.func_wrap(
        "env",
        "db_idx64_find_secondary",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u64(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_find_secondary(part(code, scope, table), secondary);
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_find_primary",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary: u64|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, secondary_ptr, 8)?;
            let (it, secondary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_find_primary(part(code, scope, table), primary);
            if let Some(secondary) = secondary {
                memory::write_u64(&mut caller, secondary_ptr, secondary)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_lowerbound",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u64(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, found) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_lowerbound(part(code, scope, table), secondary);
            if let Some((sec, pk)) = found {
                memory::write_u64(&mut caller, secondary_ptr, sec)?;
                memory::write_u64(&mut caller, primary_ptr, pk)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_upperbound",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u64(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, found) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_upperbound(part(code, scope, table), secondary);
            if let Some((sec, pk)) = found {
                memory::write_u64(&mut caller, secondary_ptr, sec)?;
                memory::write_u64(&mut caller, primary_ptr, pk)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_end",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.idx64_end(part(code, scope, table)))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_next",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (next, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_next(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(next)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx64_previous",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (previous, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx64_previous(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(previous)
        },
    )?;

    // ---- idx128 secondary family ----

    linker.func_wrap(
        "env",
        "db_idx128_find_secondary",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u128(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_find_secondary(part(code, scope, table), secondary);
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_find_primary",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary: u64|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, secondary_ptr, 16)?;
            let (it, secondary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_find_primary(part(code, scope, table), primary);
            if let Some(secondary) = secondary {
                memory::write_u128(&mut caller, secondary_ptr, secondary)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_lowerbound",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u128(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, found) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_lowerbound(part(code, scope, table), secondary);
            if let Some((sec, pk)) = found {
                memory::write_u128(&mut caller, secondary_ptr, sec)?;
                memory::write_u64(&mut caller, primary_ptr, pk)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_upperbound",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64,
         secondary_ptr: u32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            let secondary = memory::read_u128(&mut caller, secondary_ptr)?;
            memory::check(&mut caller, primary_ptr, 8)?;
            let (it, found) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_upperbound(part(code, scope, table), secondary);
            if let Some((sec, pk)) = found {
                memory::write_u128(&mut caller, secondary_ptr, sec)?;
                memory::write_u64(&mut caller, primary_ptr, pk)?;
            }
            Ok(it)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_end",
        |mut caller: Caller<'_, HostState>,
         code: u64,
         scope: u64,
         table: u64|
         -> Result<i32, anyhow::Error> {
            let controller = caller.data_mut().chains.selected_controller()?;
            Ok(controller.idx128_end(part(code, scope, table)))
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_next",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (next, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_next(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(next)
        },
    )?;

    linker.func_wrap(
        "env",
        "db_idx128_previous",
        |mut caller: Caller<'_, HostState>,
         iterator: i32,
         primary_ptr: u32|
         -> Result<i32, anyhow::Error> {
            memory::check(&mut caller, primary_ptr, 8)?;
            let (previous, primary) = caller
                .data_mut()
                .chains
                .selected_controller()?
                .idx128_previous(iterator)
                .map_err(HostError::Chain)?;
            if let Some(primary) = primary {
                memory::write_u64(&mut caller, primary_ptr, primary)?;
            }
            Ok(previous)
        },
    )?;

    Ok(())
}
