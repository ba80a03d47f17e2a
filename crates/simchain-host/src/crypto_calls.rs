//! Cryptographic host calls: digests and test-key signing.

use crate::error::HostError;
use crate::memory;
use crate::HostState;
use simchain_crypto::{hash, Keypair};
use simchain_types::Checksum256;
use wasmtime::{Caller, Linker};

pub fn register(linker: &mut Linker<HostState>) -> anyhow::Result<()> {
    linker.func_wrap(
        "env",
        "sha1",
        |mut caller: Caller<'_, HostState>,
         ptr: u32,
         len: u32,
         out_ptr: u32|
         -> Result<(), anyhow::Error> {
            let data = memory::read_bytes(&mut caller, ptr, len)?;
            memory::write_bytes(&mut caller, out_ptr, hash::sha1(&data).as_bytes())?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "sha256",
        |mut caller: Caller<'_, HostState>,
         ptr: u32,
         len: u32,
         out_ptr: u32|
         -> Result<(), anyhow::Error> {
            let data = memory::read_bytes(&mut caller, ptr, len)?;
            memory::write_bytes(&mut caller, out_ptr, hash::sha256(&data).as_bytes())?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "sha512",
        |mut caller: Caller<'_, HostState>,
         ptr: u32,
         len: u32,
         out_ptr: u32|
         -> Result<(), anyhow::Error> {
            let data = memory::read_bytes(&mut caller, ptr, len)?;
            memory::write_bytes(&mut caller, out_ptr, hash::sha512(&data).as_bytes())?;
            Ok(())
        },
    )?;

    linker.func_wrap(
        "env",
        "ripemd160",
        |mut caller: Caller<'_, HostState>,
         ptr: u32,
         len: u32,
         out_ptr: u32|
         -> Result<(), anyhow::Error> {
            let data = memory::read_bytes(&mut caller, ptr, len)?;
            memory::write_bytes(&mut caller, out_ptr, hash::ripemd160(&data).as_bytes())?;
            Ok(())
        },
    )?;

    // sign(key, digest32) -> wire signature. Copies what fits into the
    // guest buffer, returns the full wire length.
    linker.func_wrap(
        "env",
        "sign",
        |mut caller: Caller<'_, HostState>,
         key_ptr: u32,
         key_len: u32,
         digest_ptr: u32,
         sig_ptr: u32,
         sig_len: u32|
         -> Result<u32, anyhow::Error> {
            let key_bytes = memory::read_bytes(&mut caller, key_ptr, key_len)?;
            let seed: [u8; 32] = key_bytes.as_slice().try_into().map_err(|_| {
                HostError::MalformedArgument(format!(
                    "secret key must be 32 bytes, got {}",
                    key_bytes.len()
                ))
            })?;

            let digest_bytes = memory::read_bytes(&mut caller, digest_ptr, 32)?;
            let digest = Checksum256::from_slice(&digest_bytes)
                .map_err(|e| HostError::MalformedArgument(e.to_string()))?;

            let signature = Keypair::from_seed(&seed).sign_digest(&digest);
            let wire = borsh::to_vec(&signature)
                .map_err(|e| HostError::MalformedArgument(e.to_string()))?;

            let n = wire.len().min(sig_len as usize);
            memory::write_bytes(&mut caller, sig_ptr, &wire[..n])?;
            Ok(wire.len() as u32)
        },
    )?;

    Ok(())
}
