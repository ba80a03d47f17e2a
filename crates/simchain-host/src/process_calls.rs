//! Process-control, console, argument and clock host calls.

use crate::error::HostError;
use crate::memory;
use crate::HostState;
use once_cell::sync::Lazy;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use wasmtime::{Caller, Linker};

const STDERR_FD: i32 = 2;

const ERRNO_INVAL: u32 = crate::files::ERRNO_INVAL as u32;

/// Monotonic clock anchor for `clock_time_get(CLOCK_MONOTONIC)`.
static MONOTONIC_START: Lazy<Instant> = Lazy::new(Instant::now);

pub fn register(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "abort",
        |_caller: Caller<'_, HostState>| -> Result<(), anyhow::Error> {
            Err(HostError::Aborted.into())
        },
    )?;

    linker.func_wrap(
        "env",
        "exit",
        |_caller: Caller<'_, HostState>, code: i32| -> Result<(), anyhow::Error> {
            Err(HostError::Exit(code).into())
        },
    )?;

    linker.func_wrap(
        "env",
        "assert_message",
        |mut caller: Caller<'_, HostState>,
         condition: u32,
         msg_ptr: u32,
         msg_len: u32|
         -> Result<(), anyhow::Error> {
            if condition != 0 {
                return Ok(());
            }
            let bytes = memory::read_bytes(&mut caller, msg_ptr, msg_len)?;
            let message = String::from_utf8_lossy(&bytes).into_owned();
            Err(HostError::GuestAssertion(message).into())
        },
    )?;

    linker.func_wrap(
        "env",
        "prints",
        |mut caller: Caller<'_, HostState>, ptr: u32, len: u32| -> Result<(), anyhow::Error> {
            let bytes = memory::read_bytes(&mut caller, ptr, len)?;
            caller.data_mut().files.write(STDERR_FD, &bytes);
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "get_arg_counts",
        |mut caller: Caller<'_, HostState>,
         argc_ptr: u32,
         argv_buf_size_ptr: u32|
         -> Result<(), anyhow::Error> {
            let (argc, buf_size) = {
                let args = &caller.data().args;
                let size: u32 = args.iter().map(|a| a.len() as u32 + 1).sum();
                (args.len() as u32, size)
            };
            memory::write_u32(&mut caller, argc_ptr, argc)?;
            memory::write_u32(&mut caller, argv_buf_size_ptr, buf_size)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "get_args",
        |mut caller: Caller<'_, HostState>, argv: u32, argv_buf: u32| -> Result<(), anyhow::Error> {
            // Pointer array at `argv`, NUL-terminated strings at `argv_buf`.
            let args = caller.data().args.clone();
            let mut pointers = Vec::with_capacity(args.len() * 4);
            let mut buffer = Vec::new();
            for arg in &args {
                pointers.extend_from_slice(&(argv_buf + buffer.len() as u32).to_le_bytes());
                buffer.extend_from_slice(arg.as_bytes());
                buffer.push(0);
            }
            memory::write_bytes(&mut caller, argv, &pointers)?;
            memory::write_bytes(&mut caller, argv_buf, &buffer)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "clock_time_get",
        |mut caller: Caller<'_, HostState>,
         id: u32,
         _precision: u64,
         time_ptr: u32|
         -> Result<u32, anyhow::Error> {
            let nanos = match id {
                // CLOCK_REALTIME
                0 => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0),
                // CLOCK_MONOTONIC
                1 => MONOTONIC_START.elapsed().as_nanos() as u64,
                _ => return Ok(ERRNO_INVAL),
            };
            memory::write_u64(&mut caller, time_ptr, nanos)?;
            Ok(0)
        },
    )?;

    Ok(())
}
