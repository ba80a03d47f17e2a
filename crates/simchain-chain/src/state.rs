//! Ordered in-memory state database.
//!
//! Rows and secondary-index entries live in `BTreeMap`/`BTreeSet` keyed by
//! composite tuples, so iteration order over a partition is exactly the
//! ascending (secondary, primary) order the table ABI promises.

use borsh::{BorshDeserialize, BorshSerialize};
use simchain_types::{AccountName, Checksum256, PublicKeyBytes, SignedTransaction, TimePoint};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Per-account bookkeeping: permission keys, contract code/abi, sequences.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct AccountMeta {
    pub permissions: BTreeMap<AccountName, PublicKeyBytes>,
    pub code: Vec<u8>,
    pub abi: Vec<u8>,
    pub recv_sequence: u64,
    pub auth_sequence: u64,
    pub code_sequence: u32,
    pub abi_sequence: u32,
}

/// One table row.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct RowRecord {
    pub payer: AccountName,
    pub value: Vec<u8>,
}

/// A transaction parked in the scheduled queue until its due time.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct ScheduledTransaction {
    pub id: Checksum256,
    pub delay_until: TimePoint,
    pub signed: SignedTransaction,
}

type RowKey = (AccountName, AccountName, AccountName, u64);

/// The whole mutable chain state. Serializable as-is into snapshots.
#[derive(Clone, Debug, Default, BorshSerialize, BorshDeserialize)]
pub struct StateDb {
    accounts: BTreeMap<AccountName, AccountMeta>,
    rows: BTreeMap<RowKey, RowRecord>,
    idx64: BTreeSet<(AccountName, AccountName, AccountName, u64, u64)>,
    idx64_by_pk: BTreeMap<RowKey, u64>,
    idx128: BTreeSet<(AccountName, AccountName, AccountName, u128, u64)>,
    idx128_by_pk: BTreeMap<RowKey, u128>,
    scheduled: BTreeMap<(TimePoint, u64), ScheduledTransaction>,
    schedule_seq: u64,
    global_sequence: u64,
}

impl StateDb {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- accounts ----

    pub fn has_account(&self, name: AccountName) -> bool {
        self.accounts.contains_key(&name)
    }

    pub fn account(&self, name: AccountName) -> Option<&AccountMeta> {
        self.accounts.get(&name)
    }

    pub fn account_mut(&mut self, name: AccountName) -> Option<&mut AccountMeta> {
        self.accounts.get_mut(&name)
    }

    /// Create an account with one permission key. Returns false if the name
    /// is already taken.
    pub fn create_account(
        &mut self,
        name: AccountName,
        permission: AccountName,
        key: PublicKeyBytes,
    ) -> bool {
        if self.accounts.contains_key(&name) {
            return false;
        }
        let mut meta = AccountMeta::default();
        meta.permissions.insert(permission, key);
        self.accounts.insert(name, meta);
        true
    }

    pub fn set_permission_key(
        &mut self,
        account: AccountName,
        permission: AccountName,
        key: PublicKeyBytes,
    ) -> bool {
        match self.accounts.get_mut(&account) {
            Some(meta) => {
                meta.permissions.insert(permission, key);
                true
            }
            None => false,
        }
    }

    /// The key registered for (account, permission), if any.
    pub fn permission_key(
        &self,
        account: AccountName,
        permission: AccountName,
    ) -> Option<PublicKeyBytes> {
        self.accounts
            .get(&account)
            .and_then(|meta| meta.permissions.get(&permission))
            .copied()
    }

    /// Replace every permission key of every account (producer-key swap
    /// helper for tests that rotate the signing key).
    pub fn replace_all_keys(&mut self, key: PublicKeyBytes) {
        for meta in self.accounts.values_mut() {
            for slot in meta.permissions.values_mut() {
                *slot = key;
            }
        }
    }

    // ---- primary rows ----

    pub fn set_row(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
        payer: AccountName,
        value: Vec<u8>,
    ) {
        self.rows.insert((code, scope, table, primary), RowRecord { payer, value });
    }

    pub fn erase_row(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> bool {
        self.rows.remove(&(code, scope, table, primary)).is_some()
    }

    pub fn get_row(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<&RowRecord> {
        self.rows.get(&(code, scope, table, primary))
    }

    /// First primary key >= `primary` in the partition.
    pub fn lowerbound_row(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<u64> {
        self.rows
            .range((code, scope, table, primary)..=(code, scope, table, u64::MAX))
            .next()
            .map(|((_, _, _, pk), _)| *pk)
    }

    /// First primary key > `primary` in the partition.
    pub fn upperbound_row(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<u64> {
        self.rows
            .range((
                Bound::Excluded((code, scope, table, primary)),
                Bound::Included((code, scope, table, u64::MAX)),
            ))
            .next()
            .map(|((_, _, _, pk), _)| *pk)
    }

    /// Last primary key of the partition.
    pub fn last_row(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
    ) -> Option<u64> {
        self.rows
            .range((code, scope, table, 0)..=(code, scope, table, u64::MAX))
            .next_back()
            .map(|((_, _, _, pk), _)| *pk)
    }

    /// Last primary key strictly before `primary`.
    pub fn prev_row(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<u64> {
        self.rows
            .range((
                Bound::Included((code, scope, table, 0)),
                Bound::Excluded((code, scope, table, primary)),
            ))
            .next_back()
            .map(|((_, _, _, pk), _)| *pk)
    }

    // ---- idx64 secondary index ----

    pub fn set_idx64(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
        secondary: u64,
    ) {
        if let Some(old) = self.idx64_by_pk.insert((code, scope, table, primary), secondary) {
            self.idx64.remove(&(code, scope, table, old, primary));
        }
        self.idx64.insert((code, scope, table, secondary, primary));
    }

    pub fn erase_idx64(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> bool {
        match self.idx64_by_pk.remove(&(code, scope, table, primary)) {
            Some(old) => self.idx64.remove(&(code, scope, table, old, primary)),
            None => false,
        }
    }

    pub fn idx64_secondary(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<u64> {
        self.idx64_by_pk.get(&(code, scope, table, primary)).copied()
    }

    /// First entry with secondary >= `secondary`, in (secondary, primary)
    /// order.
    pub fn idx64_lowerbound(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u64,
    ) -> Option<(u64, u64)> {
        self.idx64
            .range((code, scope, table, secondary, 0)..=(code, scope, table, u64::MAX, u64::MAX))
            .next()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    /// First entry with secondary > `secondary`.
    pub fn idx64_upperbound(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u64,
    ) -> Option<(u64, u64)> {
        let next = secondary.checked_add(1)?;
        self.idx64_lowerbound(code, scope, table, next)
    }

    /// Entry immediately after (secondary, primary).
    pub fn idx64_next(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u64,
        primary: u64,
    ) -> Option<(u64, u64)> {
        self.idx64
            .range((
                Bound::Excluded((code, scope, table, secondary, primary)),
                Bound::Included((code, scope, table, u64::MAX, u64::MAX)),
            ))
            .next()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    /// Entry immediately before (secondary, primary).
    pub fn idx64_prev(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u64,
        primary: u64,
    ) -> Option<(u64, u64)> {
        self.idx64
            .range((
                Bound::Included((code, scope, table, 0, 0)),
                Bound::Excluded((code, scope, table, secondary, primary)),
            ))
            .next_back()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    pub fn idx64_last(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
    ) -> Option<(u64, u64)> {
        self.idx64
            .range((code, scope, table, 0, 0)..=(code, scope, table, u64::MAX, u64::MAX))
            .next_back()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    // ---- idx128 secondary index ----

    pub fn set_idx128(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
        secondary: u128,
    ) {
        if let Some(old) = self.idx128_by_pk.insert((code, scope, table, primary), secondary) {
            self.idx128.remove(&(code, scope, table, old, primary));
        }
        self.idx128.insert((code, scope, table, secondary, primary));
    }

    pub fn erase_idx128(
        &mut self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> bool {
        match self.idx128_by_pk.remove(&(code, scope, table, primary)) {
            Some(old) => self.idx128.remove(&(code, scope, table, old, primary)),
            None => false,
        }
    }

    pub fn idx128_secondary(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        primary: u64,
    ) -> Option<u128> {
        self.idx128_by_pk.get(&(code, scope, table, primary)).copied()
    }

    pub fn idx128_lowerbound(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u128,
    ) -> Option<(u128, u64)> {
        self.idx128
            .range((code, scope, table, secondary, 0)..=(code, scope, table, u128::MAX, u64::MAX))
            .next()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    pub fn idx128_upperbound(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u128,
    ) -> Option<(u128, u64)> {
        let next = secondary.checked_add(1)?;
        self.idx128_lowerbound(code, scope, table, next)
    }

    pub fn idx128_next(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u128,
        primary: u64,
    ) -> Option<(u128, u64)> {
        self.idx128
            .range((
                Bound::Excluded((code, scope, table, secondary, primary)),
                Bound::Included((code, scope, table, u128::MAX, u64::MAX)),
            ))
            .next()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    pub fn idx128_prev(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
        secondary: u128,
        primary: u64,
    ) -> Option<(u128, u64)> {
        self.idx128
            .range((
                Bound::Included((code, scope, table, 0, 0)),
                Bound::Excluded((code, scope, table, secondary, primary)),
            ))
            .next_back()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    pub fn idx128_last(
        &self,
        code: AccountName,
        scope: AccountName,
        table: AccountName,
    ) -> Option<(u128, u64)> {
        self.idx128
            .range((code, scope, table, 0, 0)..=(code, scope, table, u128::MAX, u64::MAX))
            .next_back()
            .map(|(_, _, _, sec, pk)| (*sec, *pk))
    }

    // ---- scheduled transactions ----

    /// Park a transaction until `delay_until`. Due-time ties pop in
    /// scheduling order.
    pub fn schedule(&mut self, id: Checksum256, delay_until: TimePoint, signed: SignedTransaction) {
        let seq = self.schedule_seq;
        self.schedule_seq += 1;
        self.scheduled.insert(
            (delay_until, seq),
            ScheduledTransaction {
                id,
                delay_until,
                signed,
            },
        );
    }

    /// Pop the single earliest-due scheduled transaction, if one is due.
    pub fn pop_due(&mut self, now: TimePoint) -> Option<ScheduledTransaction> {
        let key = match self.scheduled.keys().next() {
            Some((due, seq)) if *due <= now => (*due, *seq),
            _ => return None,
        };
        self.scheduled.remove(&key)
    }

    pub fn scheduled_len(&self) -> usize {
        self.scheduled.len()
    }

    // ---- sequences ----

    pub fn next_global_sequence(&mut self) -> u64 {
        self.global_sequence += 1;
        self.global_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> (AccountName, AccountName, AccountName) {
        (AccountName::new(1), AccountName::new(2), AccountName::new(3))
    }

    #[test]
    fn test_row_bounds() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        for pk in [10u64, 20, 30] {
            db.set_row(c, s, t, pk, c, vec![pk as u8]);
        }

        assert_eq!(db.lowerbound_row(c, s, t, 20), Some(20));
        assert_eq!(db.lowerbound_row(c, s, t, 21), Some(30));
        assert_eq!(db.upperbound_row(c, s, t, 20), Some(30));
        assert_eq!(db.upperbound_row(c, s, t, 30), None);
        assert_eq!(db.last_row(c, s, t), Some(30));
        assert_eq!(db.prev_row(c, s, t, 30), Some(20));
        assert_eq!(db.prev_row(c, s, t, 10), None);
    }

    #[test]
    fn test_rows_do_not_leak_across_partitions() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        db.set_row(c, s, t, 5, c, vec![]);
        db.set_row(c, s, AccountName::new(4), 7, c, vec![]);

        assert_eq!(db.lowerbound_row(c, s, t, 0), Some(5));
        assert_eq!(db.upperbound_row(c, s, t, 5), None);
    }

    #[test]
    fn test_idx64_ordering_ties_on_primary() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        db.set_idx64(c, s, t, 9, 7);
        db.set_idx64(c, s, t, 4, 7);
        db.set_idx64(c, s, t, 1, 3);

        assert_eq!(db.idx64_lowerbound(c, s, t, 0), Some((3, 1)));
        assert_eq!(db.idx64_next(c, s, t, 3, 1), Some((7, 4)));
        assert_eq!(db.idx64_next(c, s, t, 7, 4), Some((7, 9)));
        assert_eq!(db.idx64_next(c, s, t, 7, 9), None);
    }

    #[test]
    fn test_idx64_update_moves_entry() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        db.set_idx64(c, s, t, 1, 100);
        db.set_idx64(c, s, t, 1, 5);

        assert_eq!(db.idx64_secondary(c, s, t, 1), Some(5));
        assert_eq!(db.idx64_lowerbound(c, s, t, 0), Some((5, 1)));
        assert_eq!(db.idx64_upperbound(c, s, t, 5), None);
    }

    #[test]
    fn test_idx128_bounds() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        db.set_idx128(c, s, t, 2, 1u128 << 90);
        db.set_idx128(c, s, t, 1, 1);

        assert_eq!(db.idx128_lowerbound(c, s, t, 2), Some((1u128 << 90, 2)));
        assert_eq!(db.idx128_prev(c, s, t, 1u128 << 90, 2), Some((1, 1)));
    }

    #[test]
    fn test_scheduled_pop_order_and_due_gate() {
        let mut db = StateDb::new();
        let strx = SignedTransaction {
            transaction: Default::default(),
            signatures: vec![],
            context_free_data: vec![],
        };
        db.schedule(Checksum256::from_bytes([1; 32]), TimePoint::from_millis(200), strx.clone());
        db.schedule(Checksum256::from_bytes([2; 32]), TimePoint::from_millis(100), strx);

        assert!(db.pop_due(TimePoint::from_millis(50)).is_none());
        let first = db.pop_due(TimePoint::from_millis(500)).unwrap();
        assert_eq!(first.id, Checksum256::from_bytes([2; 32]));
        let second = db.pop_due(TimePoint::from_millis(500)).unwrap();
        assert_eq!(second.id, Checksum256::from_bytes([1; 32]));
        assert!(db.pop_due(TimePoint::from_millis(500)).is_none());
    }

    #[test]
    fn test_snapshot_roundtrip_via_borsh() {
        let (c, s, t) = names();
        let mut db = StateDb::new();
        db.create_account(c, AccountName::new(99), PublicKeyBytes([8u8; 32]));
        db.set_row(c, s, t, 1, c, vec![1, 2, 3]);
        db.set_idx64(c, s, t, 1, 44);

        let bytes = borsh::to_vec(&db).unwrap();
        let back: StateDb = borsh::from_slice(&bytes).unwrap();
        assert_eq!(back.get_row(c, s, t, 1), db.get_row(c, s, t, 1));
        assert_eq!(back.idx64_secondary(c, s, t, 1), Some(44));
        assert!(back.has_account(c));
    }
}
