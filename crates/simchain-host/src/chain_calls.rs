//! Chain lifecycle and transaction pipeline host calls.

use crate::error::HostError;
use crate::memory;
use crate::HostState;
use simchain_chain::BILLED_CPU_TIME_US;
use simchain_crypto::Keypair;
use simchain_types::{
    PackedTransactionRequest, PublicKeyBytes, SignedTransaction, Transaction,
};
use std::path::PathBuf;
use wasmtime::{Caller, Linker};

fn malformed(what: &str, err: impl std::fmt::Display) -> HostError {
    HostError::MalformedArgument(format!("{what}: {err}"))
}

pub fn register(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    // create_chain("") builds from deterministic genesis; a non-empty path
    // names a snapshot whose identity is validated first.
    linker.func_wrap(
        "env",
        "create_chain",
        |mut caller: Caller<'_, HostState>,
         snapshot_ptr: u32,
         snapshot_len: u32|
         -> Result<u32, anyhow::Error> {
            let path = memory::read_string(&mut caller, snapshot_ptr, snapshot_len)?;
            let snapshot = (!path.is_empty()).then(|| PathBuf::from(&path));
            let handle = caller.data_mut().chains.create(snapshot.as_deref())?;
            Ok(handle)
        },
    )?;

    linker.func_wrap(
        "env",
        "destroy_chain",
        |mut caller: Caller<'_, HostState>, chain: u32| -> Result<(), anyhow::Error> {
            caller.data_mut().chains.destroy(chain)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "shutdown_chain",
        |mut caller: Caller<'_, HostState>, chain: u32| -> Result<(), anyhow::Error> {
            caller.data_mut().chains.shutdown(chain)?;
            Ok(())
        },
    )?;

    // Copies at most dest_len bytes of the session's directory path and
    // returns the full length.
    linker.func_wrap(
        "env",
        "get_chain_path",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         dest_ptr: u32,
         dest_len: u32|
         -> Result<u32, anyhow::Error> {
            memory::check(&mut caller, dest_ptr, dest_len)?;
            let path = caller
                .data_mut()
                .chains
                .get(chain)?
                .path()
                .to_string_lossy()
                .into_owned();
            let bytes = path.as_bytes();
            let n = bytes.len().min(dest_len as usize);
            memory::write_bytes(&mut caller, dest_ptr, &bytes[..n])?;
            Ok(bytes.len() as u32)
        },
    )?;

    linker.func_wrap(
        "env",
        "select_chain_for_db",
        |mut caller: Caller<'_, HostState>, chain: u32| -> Result<(), anyhow::Error> {
            caller.data_mut().chains.select_for_queries(chain)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "start_block",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         skip_ms: i64|
         -> Result<(), anyhow::Error> {
            caller.data_mut().chains.get(chain)?.start_block(chain, skip_ms)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "finish_block",
        |mut caller: Caller<'_, HostState>, chain: u32| -> Result<(), anyhow::Error> {
            caller.data_mut().chains.get(chain)?.finish_block(chain)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "get_head_block_info",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         cb_alloc_data: u32,
         cb_alloc: u32|
         -> Result<(), anyhow::Error> {
            let info = caller.data_mut().chains.get(chain)?.head_block_info(chain)?;
            let encoded = borsh::to_vec(&info).map_err(|e| malformed("block info", e))?;
            memory::alloc_into(&mut caller, cb_alloc_data, cb_alloc, &encoded)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "replace_producer_keys",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         key_ptr: u32,
         key_len: u32|
         -> Result<(), anyhow::Error> {
            let bytes = memory::read_bytes(&mut caller, key_ptr, key_len)?;
            let key =
                PublicKeyBytes::from_slice(&bytes).map_err(|e| malformed("public key", e))?;
            caller
                .data_mut()
                .chains
                .controller(chain)?
                .replace_producer_keys(key);
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "replace_account_keys",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         account: u64,
         permission: u64,
         key_ptr: u32,
         key_len: u32|
         -> Result<(), anyhow::Error> {
            let bytes = memory::read_bytes(&mut caller, key_ptr, key_len)?;
            let key =
                PublicKeyBytes::from_slice(&bytes).map_err(|e| malformed("public key", e))?;
            caller
                .data_mut()
                .chains
                .controller(chain)?
                .replace_account_keys(account.into(), permission.into(), key)
                .map_err(HostError::Chain)?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "push_transaction",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         args_ptr: u32,
         args_len: u32,
         cb_alloc_data: u32,
         cb_alloc: u32|
         -> Result<(), anyhow::Error> {
            let packed = memory::read_bytes(&mut caller, args_ptr, args_len)?;
            let request: PackedTransactionRequest =
                borsh::from_slice(&packed).map_err(|e| malformed("packed transaction", e))?;
            let transaction: Transaction = borsh::from_slice(&request.transaction)
                .map_err(|e| malformed("transaction", e))?;

            let encoded = {
                let controller = caller.data_mut().chains.controller(chain)?;
                controller.start_if_needed();

                let mut signed = SignedTransaction {
                    transaction,
                    signatures: request.signatures,
                    context_free_data: request.context_free_data,
                };
                let digest = controller
                    .signing_digest(&signed.transaction)
                    .map_err(HostError::Chain)?;
                for key in &request.keys {
                    signed
                        .signatures
                        .push(Keypair::from_secret(key).sign_digest(&digest));
                }

                let trace = controller
                    .push_transaction(signed, BILLED_CPU_TIME_US)
                    .map_err(HostError::Chain)?;
                tracing::debug!(
                    status = ?trace.status,
                    elapsed_us = trace.elapsed_us,
                    "pushed transaction"
                );
                borsh::to_vec(&trace).map_err(|e| malformed("trace", e))?
            };
            memory::alloc_into(&mut caller, cb_alloc_data, cb_alloc, &encoded)?;
            Ok(())
        },
    )?;

    // Returns 1 and a trace if the earliest-due scheduled transaction was
    // executed, 0 if nothing is due.
    linker.func_wrap(
        "env",
        "exec_deferred",
        |mut caller: Caller<'_, HostState>,
         chain: u32,
         cb_alloc_data: u32,
         cb_alloc: u32|
         -> Result<u32, anyhow::Error> {
            let encoded = {
                let controller = caller.data_mut().chains.controller(chain)?;
                controller.start_if_needed();
                match controller
                    .exec_deferred(BILLED_CPU_TIME_US)
                    .map_err(HostError::Chain)?
                {
                    Some(trace) => borsh::to_vec(&trace).map_err(|e| malformed("trace", e))?,
                    None => return Ok(0),
                }
            };
            memory::alloc_into(&mut caller, cb_alloc_data, cb_alloc, &encoded)?;
            Ok(1)
        },
    )?;

    Ok(())
}
