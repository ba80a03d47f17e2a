//! The chain controller: block production, transaction execution, and the
//! read-context boundary.
//!
//! Block production is a two-state machine: no-pending-block /
//! pending-block. Every mutating entry point calls `mutating()` first,
//! which tears down the live read context; table reads rebuild one lazily,
//! so an iterator can never observe a mix of pre- and post-mutation state.

use crate::apply::{self, ACTIVE_PERMISSION, SYSTEM_ACCOUNT};
use crate::blocks::{BlockHeader, BlockLog, SignedBlock};
use crate::error::ChainError;
use crate::genesis::GenesisState;
use crate::read_context::{Partition, ReadContext};
use crate::snapshot::ChainSnapshot;
use crate::state::StateDb;
use simchain_crypto::hash::{sha256, sha256_multi};
use simchain_crypto::verify_digest;
use simchain_types::{
    AccountName, Action, ActionReceipt, ActionTrace, BlockInfo, BlockTimestamp, Checksum256,
    PublicKeyBytes, Signature, SignedTransaction, TimePoint, Transaction, TransactionStatus,
    TransactionTrace, BLOCK_INTERVAL_MS,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Instant;

/// CPU microseconds billed to every executed transaction.
pub const BILLED_CPU_TIME_US: u32 = 2000;

/// Wall-clock budget for executing one transaction's actions.
const TRANSACTION_CPU_BUDGET_US: u128 = 250_000;

struct PendingBlock {
    block_num: u32,
    timestamp: TimePoint,
    transaction_ids: Vec<Checksum256>,
}

/// One independent blockchain instance.
pub struct Controller {
    chain_id: Checksum256,
    producer_key: PublicKeyBytes,
    state: StateDb,
    head_block_num: u32,
    head_block_id: Checksum256,
    head_timestamp: TimePoint,
    pending: Option<PendingBlock>,
    read_ctx: Option<ReadContext>,
    generation: u64,
    slot_seq: i32,
    iter_seq: i32,
    block_log: BlockLog,
    /// Worker pool for signature recovery; always awaited before the next
    /// statement runs, so the guest only ever observes it as latency.
    pool: tokio::runtime::Runtime,
}

impl Controller {
    /// Build a fresh chain from deterministic genesis. Mirrors production
    /// startup: the system account is bound to the producer key and a first
    /// pending block is opened immediately.
    pub fn new(genesis: &GenesisState, data_dir: &Path) -> Result<Self, ChainError> {
        let mut state = StateDb::new();
        state.create_account(SYSTEM_ACCOUNT, ACTIVE_PERMISSION, genesis.initial_producer_key);

        let chain_id = genesis.chain_id();
        let mut controller = Self {
            chain_id,
            producer_key: genesis.initial_producer_key,
            state,
            head_block_num: 0,
            head_block_id: sha256_multi(&[b"simchain.block", chain_id.as_bytes()]),
            head_timestamp: genesis.initial_timestamp,
            pending: None,
            read_ctx: None,
            generation: 0,
            slot_seq: 0,
            iter_seq: 0,
            block_log: BlockLog::new(&data_dir.join("blocks"))?,
            pool: worker_pool()?,
        };
        controller.open_block(controller.head_timestamp.plus_millis(BLOCK_INTERVAL_MS));
        tracing::debug!(chain_id = %controller.chain_id, "created chain from genesis");
        Ok(controller)
    }

    /// Rebuild a chain from a snapshot. No block is opened; the first
    /// mutating call will do that.
    pub fn from_snapshot(snapshot: ChainSnapshot, data_dir: &Path) -> Result<Self, ChainError> {
        let controller = Self {
            chain_id: snapshot.chain_id,
            producer_key: snapshot.producer_key,
            state: snapshot.state,
            head_block_num: snapshot.head_block_num,
            head_block_id: snapshot.head_block_id,
            head_timestamp: snapshot.head_timestamp,
            pending: None,
            read_ctx: None,
            generation: 0,
            slot_seq: 0,
            iter_seq: 0,
            block_log: BlockLog::new(&data_dir.join("blocks"))?,
            pool: worker_pool()?,
        };
        tracing::debug!(chain_id = %controller.chain_id, "restored chain from snapshot");
        Ok(controller)
    }

    pub fn chain_id(&self) -> Checksum256 {
        self.chain_id
    }

    pub fn producer_key(&self) -> PublicKeyBytes {
        self.producer_key
    }

    pub fn is_building_block(&self) -> bool {
        self.pending.is_some()
    }

    pub fn head_block_info(&self) -> BlockInfo {
        BlockInfo {
            block_num: self.head_block_num,
            block_id: self.head_block_id,
            timestamp: BlockTimestamp::from(self.head_timestamp),
        }
    }

    pub fn pending_block_time(&self) -> Result<TimePoint, ChainError> {
        self.pending
            .as_ref()
            .map(|p| p.timestamp)
            .ok_or(ChainError::NoPendingBlock)
    }

    /// Capture the whole chain at its current committed+pending state.
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            chain_id: self.chain_id,
            head_block_num: self.head_block_num,
            head_block_id: self.head_block_id,
            head_timestamp: self.head_timestamp,
            producer_key: self.producer_key,
            state: self.state.clone(),
        }
    }

    /// Every state mutation funnels through here: the read context dies and
    /// its id sequences carry over so stale handles stay detectable.
    fn mutating(&mut self) {
        if let Some(ctx) = self.read_ctx.take() {
            let (slots, iters) = ctx.sequences();
            self.slot_seq = slots;
            self.iter_seq = iters;
        }
        self.generation += 1;
    }

    fn open_block(&mut self, timestamp: TimePoint) {
        self.pending = Some(PendingBlock {
            block_num: self.head_block_num + 1,
            timestamp,
            transaction_ids: Vec::new(),
        });
    }

    /// Finalize any pending block, then open a new one at
    /// head-time + interval + `skip_ms`.
    pub fn start_block(
        &mut self,
        skip_ms: i64,
        sign: impl FnOnce(&Checksum256) -> Signature,
    ) -> Result<(), ChainError> {
        self.mutating();
        if self.pending.is_some() {
            self.finish_block(sign)?;
        }
        self.open_block(
            self.head_timestamp
                .plus_millis(BLOCK_INTERVAL_MS + skip_ms),
        );
        Ok(())
    }

    /// Open a pending block only if none is open.
    pub fn start_if_needed(&mut self) {
        self.mutating();
        if self.pending.is_none() {
            self.open_block(self.head_timestamp.plus_millis(BLOCK_INTERVAL_MS));
        }
    }

    /// Finalize and commit the pending block (opening one first if needed),
    /// signed by the producer.
    pub fn finish_block(
        &mut self,
        sign: impl FnOnce(&Checksum256) -> Signature,
    ) -> Result<(), ChainError> {
        self.start_if_needed();
        let pending = match self.pending.take() {
            Some(p) => p,
            None => return Err(ChainError::NoPendingBlock),
        };

        let header = BlockHeader {
            block_num: pending.block_num,
            previous: self.head_block_id,
            timestamp: BlockTimestamp::from(pending.timestamp),
            transaction_count: pending.transaction_ids.len() as u32,
        };
        let digest = header.digest()?;
        let block = SignedBlock {
            header,
            transaction_ids: pending.transaction_ids,
            producer_signature: sign(&digest),
        };
        self.block_log.append(&block)?;

        self.head_block_num = pending.block_num;
        self.head_block_id = digest;
        self.head_timestamp = pending.timestamp;
        tracing::info!("finish block {}", self.head_block_num);
        Ok(())
    }

    /// Swap the producer key recorded for this chain.
    pub fn replace_producer_keys(&mut self, key: PublicKeyBytes) {
        self.mutating();
        self.producer_key = key;
    }

    /// Rebind one (account, permission) to a new key.
    pub fn replace_account_keys(
        &mut self,
        account: AccountName,
        permission: AccountName,
        key: PublicKeyBytes,
    ) -> Result<(), ChainError> {
        self.mutating();
        if !self.state.set_permission_key(account, permission, key) {
            return Err(ChainError::UnknownAccount(account));
        }
        Ok(())
    }

    /// The digest a signature over `trx` must cover for this chain.
    pub fn signing_digest(&self, trx: &Transaction) -> Result<Checksum256, ChainError> {
        let encoded = borsh::to_vec(trx).map_err(|e| ChainError::Codec(e.to_string()))?;
        Ok(sha256_multi(&[self.chain_id.as_bytes(), &encoded]))
    }

    /// Verify all signatures on the worker pool and collect the recovered
    /// signer keys. The await is immediate; recovery is latency, not
    /// concurrency, from the caller's point of view.
    fn recover_keys(
        &self,
        signed: &SignedTransaction,
    ) -> Result<Result<BTreeSet<PublicKeyBytes>, String>, ChainError> {
        let digest = self.signing_digest(&signed.transaction)?;
        let handles: Vec<_> = signed
            .signatures
            .iter()
            .copied()
            .map(|sig| {
                self.pool
                    .spawn_blocking(move || verify_digest(&sig, &digest).map_err(|e| e.to_string()))
            })
            .collect();

        Ok(self.pool.block_on(async {
            let mut keys = BTreeSet::new();
            for handle in handles {
                match handle.await {
                    Ok(Ok(key)) => {
                        keys.insert(key);
                    }
                    Ok(Err(message)) => return Err(message),
                    Err(join) => return Err(join.to_string()),
                }
            }
            Ok(keys)
        }))
    }

    /// Execute a signed transaction inside the pending block. Execution
    /// failures come back in the trace; only structural problems error.
    pub fn push_transaction(
        &mut self,
        signed: SignedTransaction,
        billed_cpu_us: u32,
    ) -> Result<TransactionTrace, ChainError> {
        self.mutating();
        let pending_time = self.pending_block_time()?;

        let encoded_trx =
            borsh::to_vec(&signed.transaction).map_err(|e| ChainError::Codec(e.to_string()))?;
        let id = sha256(&encoded_trx);

        let keys = match self.recover_keys(&signed)? {
            Ok(keys) => keys,
            Err(message) => {
                return Ok(failed_trace(id, false, format!("signature recovery failed: {message}")))
            }
        };

        if signed.transaction.expiration < pending_time {
            let mut trace = failed_trace(id, false, "transaction expired".to_string());
            trace.status = TransactionStatus::Expired;
            return Ok(trace);
        }

        if let Some(p) = self.pending.as_mut() {
            p.transaction_ids.push(id);
        }

        if signed.transaction.delay_ms > 0 {
            // Authorization is still enforced at scheduling time.
            for act in &signed.transaction.actions {
                if let Err(failure) = apply::check_authorization(&self.state, act, &keys) {
                    return Ok(failed_trace(id, false, failure.message));
                }
            }
            let delay_until = pending_time.plus_millis(signed.transaction.delay_ms as i64);
            self.state.schedule(id, delay_until, signed);
            let mut trace = empty_trace(id, false);
            trace.status = TransactionStatus::Delayed;
            trace.cpu_usage_us = billed_cpu_us;
            return Ok(trace);
        }

        Ok(self.execute_transaction(&signed, &keys, id, false, billed_cpu_us))
    }

    /// Pop and execute the earliest-due scheduled transaction, if any is due
    /// at pending-block time.
    pub fn exec_deferred(
        &mut self,
        billed_cpu_us: u32,
    ) -> Result<Option<TransactionTrace>, ChainError> {
        self.mutating();
        let pending_time = self.pending_block_time()?;
        let Some(scheduled) = self.state.pop_due(pending_time) else {
            return Ok(None);
        };

        let keys = match self.recover_keys(&scheduled.signed)? {
            Ok(keys) => keys,
            Err(message) => {
                return Ok(Some(failed_trace(
                    scheduled.id,
                    true,
                    format!("signature recovery failed: {message}"),
                )))
            }
        };
        Ok(Some(self.execute_transaction(
            &scheduled.signed,
            &keys,
            scheduled.id,
            true,
            billed_cpu_us,
        )))
    }

    fn execute_transaction(
        &mut self,
        signed: &SignedTransaction,
        keys: &BTreeSet<PublicKeyBytes>,
        id: Checksum256,
        scheduled: bool,
        billed_cpu_us: u32,
    ) -> TransactionTrace {
        let start = Instant::now();
        let mut trace = empty_trace(id, scheduled);

        let net_usage = (borsh::to_vec(signed).map(|b| b.len()).unwrap_or(0) as u64 + 7) & !7;
        trace.net_usage = net_usage;
        trace.net_usage_words = (net_usage / 8) as u32;

        let context_free = signed
            .transaction
            .context_free_actions
            .iter()
            .map(|act| (act, true));
        let regular = signed.transaction.actions.iter().map(|act| (act, false));

        let mut failed = None;
        for (ordinal, (act, is_context_free)) in context_free.chain(regular).enumerate() {
            let action_start = Instant::now();
            let mut action_trace = ActionTrace {
                action_ordinal: ordinal as u32 + 1,
                creator_action_ordinal: 0,
                receipt: None,
                receiver: act.account,
                act: act.clone(),
                context_free: is_context_free,
                elapsed_us: 0,
                console: String::new(),
                account_ram_deltas: Vec::new(),
                except: None,
                error_code: None,
            };

            let result = self.dispatch_action(act, is_context_free, keys);
            match result {
                Ok(receipt) => {
                    action_trace.receipt = Some(receipt);
                    action_trace.elapsed_us = action_start.elapsed().as_micros() as i64;
                    trace.action_traces.push(action_trace);
                }
                Err(failure) => {
                    action_trace.except = Some(failure.message.clone());
                    action_trace.error_code = Some(1);
                    action_trace.elapsed_us = action_start.elapsed().as_micros() as i64;
                    trace.action_traces.push(action_trace);
                    failed = Some(failure.message);
                    break;
                }
            }

            if start.elapsed().as_micros() > TRANSACTION_CPU_BUDGET_US {
                failed = Some("transaction CPU budget exceeded".to_string());
                break;
            }
        }

        trace.elapsed_us = start.elapsed().as_micros() as i64;
        match failed {
            Some(message) => {
                trace.status = TransactionStatus::HardFail;
                trace.except = Some(message);
                trace.error_code = Some(1);
            }
            None => {
                trace.status = TransactionStatus::Executed;
                trace.cpu_usage_us = billed_cpu_us;
            }
        }
        trace
    }

    fn dispatch_action(
        &mut self,
        act: &Action,
        is_context_free: bool,
        keys: &BTreeSet<PublicKeyBytes>,
    ) -> Result<ActionReceipt, apply::ApplyFailure> {
        if !self.state.has_account(act.account) {
            return Err(apply::ApplyFailure {
                message: format!("receiver account {} does not exist", act.account),
            });
        }
        if !is_context_free {
            apply::check_authorization(&self.state, act, keys)?;
        }
        apply::apply_action(&mut self.state, act)?;

        let global_sequence = self.state.next_global_sequence();
        let mut auth_sequence = Vec::new();
        for auth in &act.authorization {
            if let Some(meta) = self.state.account_mut(auth.actor) {
                meta.auth_sequence += 1;
                auth_sequence.push((auth.actor, meta.auth_sequence));
            }
        }
        let (recv_sequence, code_sequence, abi_sequence) =
            match self.state.account_mut(act.account) {
                Some(meta) => {
                    meta.recv_sequence += 1;
                    (meta.recv_sequence, meta.code_sequence, meta.abi_sequence)
                }
                None => (0, 0, 0),
            };

        let act_digest = sha256(&borsh::to_vec(act).unwrap_or_default());
        Ok(ActionReceipt {
            receiver: act.account,
            act_digest,
            global_sequence,
            recv_sequence,
            auth_sequence,
            code_sequence,
            abi_sequence,
        })
    }

    // ---- state access for tests and the harness ----

    pub fn state(&self) -> &StateDb {
        &self.state
    }

    /// Mutate state directly (test setup, native tooling). Counts as a
    /// mutating operation: live iterators are invalidated first.
    pub fn with_state_mut<R>(&mut self, f: impl FnOnce(&mut StateDb) -> R) -> R {
        self.mutating();
        f(&mut self.state)
    }

    // ---- table reads ----

    /// Lazily (re)build the read context over the latest state.
    fn reader(&mut self) -> (&mut ReadContext, &StateDb) {
        if self.read_ctx.is_none() {
            self.start_if_needed();
            self.read_ctx = Some(ReadContext::new(self.generation, self.slot_seq, self.iter_seq));
        }
        let Controller { read_ctx, state, .. } = self;
        match read_ctx {
            Some(ctx) => (ctx, state),
            None => unreachable!("read context was just installed"),
        }
    }

    pub fn db_find_i64(&mut self, part: Partition, primary: u64) -> i32 {
        let (ctx, state) = self.reader();
        ctx.find_i64(state, part, primary)
    }

    pub fn db_lowerbound_i64(&mut self, part: Partition, primary: u64) -> i32 {
        let (ctx, state) = self.reader();
        ctx.lowerbound_i64(state, part, primary)
    }

    pub fn db_upperbound_i64(&mut self, part: Partition, primary: u64) -> i32 {
        let (ctx, state) = self.reader();
        ctx.upperbound_i64(state, part, primary)
    }

    pub fn db_end_i64(&mut self, part: Partition) -> i32 {
        let (ctx, _) = self.reader();
        ctx.end_i64(part)
    }

    pub fn db_next_i64(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.next_i64(state, iterator)
    }

    pub fn db_previous_i64(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.previous_i64(state, iterator)
    }

    pub fn db_get_i64(&mut self, iterator: i32) -> Result<Vec<u8>, ChainError> {
        let (ctx, state) = self.reader();
        ctx.get_i64(state, iterator).map(|v| v.to_vec())
    }

    pub fn idx64_find_secondary(&mut self, part: Partition, secondary: u64) -> (i32, Option<u64>) {
        let (ctx, state) = self.reader();
        ctx.idx64_find_secondary(state, part, secondary)
    }

    pub fn idx64_find_primary(&mut self, part: Partition, primary: u64) -> (i32, Option<u64>) {
        let (ctx, state) = self.reader();
        ctx.idx64_find_primary(state, part, primary)
    }

    pub fn idx64_lowerbound(
        &mut self,
        part: Partition,
        secondary: u64,
    ) -> (i32, Option<(u64, u64)>) {
        let (ctx, state) = self.reader();
        ctx.idx64_lowerbound(state, part, secondary)
    }

    pub fn idx64_upperbound(
        &mut self,
        part: Partition,
        secondary: u64,
    ) -> (i32, Option<(u64, u64)>) {
        let (ctx, state) = self.reader();
        ctx.idx64_upperbound(state, part, secondary)
    }

    pub fn idx64_end(&mut self, part: Partition) -> i32 {
        let (ctx, _) = self.reader();
        ctx.idx64_end(part)
    }

    pub fn idx64_next(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.idx64_next(state, iterator)
    }

    pub fn idx64_previous(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.idx64_previous(state, iterator)
    }

    pub fn idx128_find_secondary(
        &mut self,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<u64>) {
        let (ctx, state) = self.reader();
        ctx.idx128_find_secondary(state, part, secondary)
    }

    pub fn idx128_find_primary(&mut self, part: Partition, primary: u64) -> (i32, Option<u128>) {
        let (ctx, state) = self.reader();
        ctx.idx128_find_primary(state, part, primary)
    }

    pub fn idx128_lowerbound(
        &mut self,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<(u128, u64)>) {
        let (ctx, state) = self.reader();
        ctx.idx128_lowerbound(state, part, secondary)
    }

    pub fn idx128_upperbound(
        &mut self,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<(u128, u64)>) {
        let (ctx, state) = self.reader();
        ctx.idx128_upperbound(state, part, secondary)
    }

    pub fn idx128_end(&mut self, part: Partition) -> i32 {
        let (ctx, _) = self.reader();
        ctx.idx128_end(part)
    }

    pub fn idx128_next(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.idx128_next(state, iterator)
    }

    pub fn idx128_previous(&mut self, iterator: i32) -> Result<(i32, Option<u64>), ChainError> {
        let (ctx, state) = self.reader();
        ctx.idx128_previous(state, iterator)
    }
}

fn worker_pool() -> Result<tokio::runtime::Runtime, std::io::Error> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("simchain-recover")
        .build()
}

fn empty_trace(id: Checksum256, scheduled: bool) -> TransactionTrace {
    TransactionTrace {
        id,
        status: TransactionStatus::Executed,
        cpu_usage_us: 0,
        net_usage_words: 0,
        elapsed_us: 0,
        net_usage: 0,
        scheduled,
        action_traces: Vec::new(),
        account_ram_delta: None,
        except: None,
        error_code: None,
        failed_dtrx_trace: Vec::new(),
    }
}

fn failed_trace(id: Checksum256, scheduled: bool, message: String) -> TransactionTrace {
    let mut trace = empty_trace(id, scheduled);
    trace.status = TransactionStatus::HardFail;
    trace.except = Some(message);
    trace.error_code = Some(1);
    trace
}
