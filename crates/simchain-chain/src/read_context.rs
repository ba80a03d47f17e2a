//! Read contexts and the table iterator cache.
//!
//! A `ReadContext` is the ephemeral scope under which table iterators are
//! valid. The controller tears it down on every state mutation. Iterator
//! ids and partition slots are issued from session-monotonic counters, so an
//! id minted under an older context can never collide with one minted under
//! the current context; a stale handle is simply absent from the live
//! cache and faults instead of aliasing fresh data.
//!
//! Handle encoding (ABI-visible):
//! - `>= 0`: live row handle
//! - `-1`: "nothing further"; never a valid argument
//! - `<= -2`: end sentinel, `-(slot + 2)` for partition slot `slot`

use crate::error::ChainError;
use crate::state::StateDb;
use simchain_types::AccountName;
use std::collections::HashMap;

/// The (code, scope, table) triple identifying one logical table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Partition {
    pub code: AccountName,
    pub scope: AccountName,
    pub table: AccountName,
}

impl Partition {
    pub const fn new(code: AccountName, scope: AccountName, table: AccountName) -> Self {
        Self { code, scope, table }
    }
}

/// Which index family minted a handle. Crossing families is a fault, not a
/// lookup miss.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IndexFamily {
    Primary,
    Idx64,
    Idx128,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum IterPos {
    Primary(u64),
    Idx64(u64, u64),
    Idx128(u128, u64),
}

#[derive(Clone, Copy, Debug)]
struct IterEntry {
    slot: i32,
    family: IndexFamily,
    pos: IterPos,
}

/// Iterator cache for one generation of one chain's state.
pub struct ReadContext {
    generation: u64,
    slots: HashMap<i32, (Partition, IndexFamily)>,
    slot_of: HashMap<(Partition, IndexFamily), i32>,
    iters: HashMap<i32, IterEntry>,
    /// First slot/iterator id this context may issue; anything below was
    /// issued by a dead predecessor.
    slot_floor: i32,
    iter_floor: i32,
    next_slot: i32,
    next_iter: i32,
}

impl ReadContext {
    pub fn new(generation: u64, slot_seq: i32, iter_seq: i32) -> Self {
        Self {
            generation,
            slots: HashMap::new(),
            slot_of: HashMap::new(),
            iters: HashMap::new(),
            slot_floor: slot_seq,
            iter_floor: iter_seq,
            next_slot: slot_seq,
            next_iter: iter_seq,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Counters to carry into the successor context.
    pub fn sequences(&self) -> (i32, i32) {
        (self.next_slot, self.next_iter)
    }

    fn slot(&mut self, part: Partition, family: IndexFamily) -> i32 {
        if let Some(slot) = self.slot_of.get(&(part, family)) {
            return *slot;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slot_of.insert((part, family), slot);
        self.slots.insert(slot, (part, family));
        slot
    }

    /// The canonical end sentinel of a partition within this context.
    fn end_sentinel(&mut self, part: Partition, family: IndexFamily) -> i32 {
        -(self.slot(part, family) + 2)
    }

    fn issue(&mut self, part: Partition, family: IndexFamily, pos: IterPos) -> i32 {
        let slot = self.slot(part, family);
        let id = self.next_iter;
        self.next_iter += 1;
        self.iters.insert(id, IterEntry { slot, family, pos });
        id
    }

    fn entry(&self, iterator: i32, family: IndexFamily) -> Result<IterEntry, ChainError> {
        if iterator < 0 {
            return Err(ChainError::InvalidIterator(iterator));
        }
        let entry = match self.iters.get(&iterator) {
            Some(entry) => *entry,
            None if iterator < self.iter_floor => {
                return Err(ChainError::StaleIterator(iterator))
            }
            None => return Err(ChainError::InvalidIterator(iterator)),
        };
        if entry.family != family {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        }
        Ok(entry)
    }

    /// Resolve an end sentinel back to its partition, faulting on stale or
    /// foreign handles.
    fn end_partition(
        &self,
        iterator: i32,
        family: IndexFamily,
    ) -> Result<Partition, ChainError> {
        let slot = -iterator - 2;
        match self.slots.get(&slot) {
            Some((part, fam)) if *fam == family => Ok(*part),
            Some(_) => Err(ChainError::IteratorFamilyMismatch(iterator)),
            None if slot < self.slot_floor => Err(ChainError::StaleIterator(iterator)),
            None => Err(ChainError::InvalidIterator(iterator)),
        }
    }

    fn partition_of_slot(&self, slot: i32) -> Partition {
        // Slot came from a live entry; the table is always registered.
        self.slots
            .get(&slot)
            .map(|(part, _)| *part)
            .unwrap_or_else(|| unreachable!("iterator slot without partition"))
    }

    // ---- primary (i64) family ----

    pub fn find_i64(
        &mut self,
        state: &StateDb,
        part: Partition,
        primary: u64,
    ) -> i32 {
        if state.get_row(part.code, part.scope, part.table, primary).is_some() {
            self.issue(part, IndexFamily::Primary, IterPos::Primary(primary))
        } else {
            self.end_sentinel(part, IndexFamily::Primary)
        }
    }

    pub fn lowerbound_i64(&mut self, state: &StateDb, part: Partition, primary: u64) -> i32 {
        match state.lowerbound_row(part.code, part.scope, part.table, primary) {
            Some(pk) => self.issue(part, IndexFamily::Primary, IterPos::Primary(pk)),
            None => self.end_sentinel(part, IndexFamily::Primary),
        }
    }

    pub fn upperbound_i64(&mut self, state: &StateDb, part: Partition, primary: u64) -> i32 {
        match state.upperbound_row(part.code, part.scope, part.table, primary) {
            Some(pk) => self.issue(part, IndexFamily::Primary, IterPos::Primary(pk)),
            None => self.end_sentinel(part, IndexFamily::Primary),
        }
    }

    pub fn end_i64(&mut self, part: Partition) -> i32 {
        self.end_sentinel(part, IndexFamily::Primary)
    }

    /// Step forward. Returns the next handle (or the end sentinel, reached
    /// exactly once; then -1) and the primary key of the row stepped to.
    pub fn next_i64(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            self.end_partition(iterator, IndexFamily::Primary)?;
            return Ok((-1, None));
        }
        let entry = self.entry(iterator, IndexFamily::Primary)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Primary(pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.upperbound_row(part.code, part.scope, part.table, pk) {
            Some(next_pk) => {
                let id = self.issue(part, IndexFamily::Primary, IterPos::Primary(next_pk));
                Ok((id, Some(next_pk)))
            }
            None => Ok((self.end_sentinel(part, IndexFamily::Primary), None)),
        }
    }

    /// Step backward. From the end sentinel this lands on the last row; from
    /// the first row there is nothing further (-1).
    pub fn previous_i64(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            let part = self.end_partition(iterator, IndexFamily::Primary)?;
            return match state.last_row(part.code, part.scope, part.table) {
                Some(pk) => {
                    let id = self.issue(part, IndexFamily::Primary, IterPos::Primary(pk));
                    Ok((id, Some(pk)))
                }
                None => Ok((-1, None)),
            };
        }
        let entry = self.entry(iterator, IndexFamily::Primary)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Primary(pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.prev_row(part.code, part.scope, part.table, pk) {
            Some(prev_pk) => {
                let id = self.issue(part, IndexFamily::Primary, IterPos::Primary(prev_pk));
                Ok((id, Some(prev_pk)))
            }
            None => Ok((-1, None)),
        }
    }

    /// The row value a live primary handle points at.
    pub fn get_i64<'a>(
        &self,
        state: &'a StateDb,
        iterator: i32,
    ) -> Result<&'a [u8], ChainError> {
        let entry = self.entry(iterator, IndexFamily::Primary)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Primary(pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        state
            .get_row(part.code, part.scope, part.table, pk)
            .map(|row| row.value.as_slice())
            .ok_or(ChainError::InvalidIterator(iterator))
    }

    // ---- idx64 secondary family ----

    pub fn idx64_find_secondary(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u64,
    ) -> (i32, Option<u64>) {
        match state.idx64_lowerbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) if sec == secondary => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(sec, pk));
                (id, Some(pk))
            }
            _ => (self.end_sentinel(part, IndexFamily::Idx64), None),
        }
    }

    pub fn idx64_find_primary(
        &mut self,
        state: &StateDb,
        part: Partition,
        primary: u64,
    ) -> (i32, Option<u64>) {
        match state.idx64_secondary(part.code, part.scope, part.table, primary) {
            Some(sec) => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(sec, primary));
                (id, Some(sec))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx64), None),
        }
    }

    pub fn idx64_lowerbound(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u64,
    ) -> (i32, Option<(u64, u64)>) {
        match state.idx64_lowerbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(sec, pk));
                (id, Some((sec, pk)))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx64), None),
        }
    }

    pub fn idx64_upperbound(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u64,
    ) -> (i32, Option<(u64, u64)>) {
        match state.idx64_upperbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(sec, pk));
                (id, Some((sec, pk)))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx64), None),
        }
    }

    pub fn idx64_end(&mut self, part: Partition) -> i32 {
        self.end_sentinel(part, IndexFamily::Idx64)
    }

    pub fn idx64_next(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            self.end_partition(iterator, IndexFamily::Idx64)?;
            return Ok((-1, None));
        }
        let entry = self.entry(iterator, IndexFamily::Idx64)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Idx64(sec, pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.idx64_next(part.code, part.scope, part.table, sec, pk) {
            Some((nsec, npk)) => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(nsec, npk));
                Ok((id, Some(npk)))
            }
            None => Ok((self.end_sentinel(part, IndexFamily::Idx64), None)),
        }
    }

    pub fn idx64_previous(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            let part = self.end_partition(iterator, IndexFamily::Idx64)?;
            return match state.idx64_last(part.code, part.scope, part.table) {
                Some((sec, pk)) => {
                    let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(sec, pk));
                    Ok((id, Some(pk)))
                }
                None => Ok((-1, None)),
            };
        }
        let entry = self.entry(iterator, IndexFamily::Idx64)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Idx64(sec, pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.idx64_prev(part.code, part.scope, part.table, sec, pk) {
            Some((psec, ppk)) => {
                let id = self.issue(part, IndexFamily::Idx64, IterPos::Idx64(psec, ppk));
                Ok((id, Some(ppk)))
            }
            None => Ok((-1, None)),
        }
    }

    // ---- idx128 secondary family ----

    pub fn idx128_find_secondary(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<u64>) {
        match state.idx128_lowerbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) if sec == secondary => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(sec, pk));
                (id, Some(pk))
            }
            _ => (self.end_sentinel(part, IndexFamily::Idx128), None),
        }
    }

    pub fn idx128_find_primary(
        &mut self,
        state: &StateDb,
        part: Partition,
        primary: u64,
    ) -> (i32, Option<u128>) {
        match state.idx128_secondary(part.code, part.scope, part.table, primary) {
            Some(sec) => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(sec, primary));
                (id, Some(sec))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx128), None),
        }
    }

    pub fn idx128_lowerbound(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<(u128, u64)>) {
        match state.idx128_lowerbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(sec, pk));
                (id, Some((sec, pk)))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx128), None),
        }
    }

    pub fn idx128_upperbound(
        &mut self,
        state: &StateDb,
        part: Partition,
        secondary: u128,
    ) -> (i32, Option<(u128, u64)>) {
        match state.idx128_upperbound(part.code, part.scope, part.table, secondary) {
            Some((sec, pk)) => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(sec, pk));
                (id, Some((sec, pk)))
            }
            None => (self.end_sentinel(part, IndexFamily::Idx128), None),
        }
    }

    pub fn idx128_end(&mut self, part: Partition) -> i32 {
        self.end_sentinel(part, IndexFamily::Idx128)
    }

    pub fn idx128_next(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            self.end_partition(iterator, IndexFamily::Idx128)?;
            return Ok((-1, None));
        }
        let entry = self.entry(iterator, IndexFamily::Idx128)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Idx128(sec, pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.idx128_next(part.code, part.scope, part.table, sec, pk) {
            Some((nsec, npk)) => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(nsec, npk));
                Ok((id, Some(npk)))
            }
            None => Ok((self.end_sentinel(part, IndexFamily::Idx128), None)),
        }
    }

    pub fn idx128_previous(
        &mut self,
        state: &StateDb,
        iterator: i32,
    ) -> Result<(i32, Option<u64>), ChainError> {
        if iterator <= -2 {
            let part = self.end_partition(iterator, IndexFamily::Idx128)?;
            return match state.idx128_last(part.code, part.scope, part.table) {
                Some((sec, pk)) => {
                    let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(sec, pk));
                    Ok((id, Some(pk)))
                }
                None => Ok((-1, None)),
            };
        }
        let entry = self.entry(iterator, IndexFamily::Idx128)?;
        let part = self.partition_of_slot(entry.slot);
        let IterPos::Idx128(sec, pk) = entry.pos else {
            return Err(ChainError::IteratorFamilyMismatch(iterator));
        };
        match state.idx128_prev(part.code, part.scope, part.table, sec, pk) {
            Some((psec, ppk)) => {
                let id = self.issue(part, IndexFamily::Idx128, IterPos::Idx128(psec, ppk));
                Ok((id, Some(ppk)))
            }
            None => Ok((-1, None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part() -> Partition {
        Partition::new(AccountName::new(1), AccountName::new(2), AccountName::new(3))
    }

    fn seeded_state() -> StateDb {
        let p = part();
        let mut state = StateDb::new();
        for (pk, sec) in [(1u64, 3u64), (2, 1), (3, 2)] {
            state.set_row(p.code, p.scope, p.table, pk, p.code, vec![pk as u8]);
            state.set_idx64(p.code, p.scope, p.table, pk, sec);
        }
        state
    }

    #[test]
    fn test_lowerbound_then_next_reaches_end_exactly_once() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);

        // Secondary keys {3,1,2}: lowerbound(2) → 2, next → 3, then end once.
        let (it, hit) = ctx.idx64_lowerbound(&state, part(), 2);
        assert_eq!(hit, Some((2, 3)));

        let (it, pk) = ctx.idx64_next(&state, it).unwrap();
        assert_eq!(pk, Some(1));

        let (end_it, none) = ctx.idx64_next(&state, it).unwrap();
        assert!(none.is_none());
        assert_eq!(end_it, ctx.idx64_end(part()));

        // Stepping off the end yields -1, not the sentinel again.
        let (done, _) = ctx.idx64_next(&state, end_it).unwrap();
        assert_eq!(done, -1);
    }

    #[test]
    fn test_end_sentinel_is_canonical_per_partition() {
        let mut ctx = ReadContext::new(1, 0, 0);

        let a = ctx.end_i64(part());
        let b = ctx.end_i64(part());
        assert_eq!(a, b);
        assert!(a <= -2);

        let other = Partition::new(AccountName::new(9), AccountName::new(9), AccountName::new(9));
        assert_ne!(ctx.end_i64(other), a);
    }

    #[test]
    fn test_stale_iterator_faults() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);
        let it = ctx.find_i64(&state, part(), 1);
        assert!(it >= 0);

        // Successor context resumes the id sequence where this one stopped.
        let (slots, iters) = ctx.sequences();
        let mut fresh = ReadContext::new(2, slots, iters);
        assert_eq!(
            fresh.next_i64(&state, it),
            Err(ChainError::StaleIterator(it))
        );
        assert_eq!(
            fresh.get_i64(&state, it).unwrap_err(),
            ChainError::StaleIterator(it)
        );
    }

    #[test]
    fn test_stale_end_sentinel_faults() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);
        let end = ctx.end_i64(part());

        let (slots, iters) = ctx.sequences();
        let mut fresh = ReadContext::new(2, slots, iters);
        assert_eq!(
            fresh.next_i64(&state, end),
            Err(ChainError::StaleIterator(end))
        );
    }

    #[test]
    fn test_family_mismatch_faults() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);
        let primary_it = ctx.find_i64(&state, part(), 1);

        assert_eq!(
            ctx.idx64_next(&state, primary_it),
            Err(ChainError::IteratorFamilyMismatch(primary_it))
        );
    }

    #[test]
    fn test_previous_from_end_lands_on_last_row() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);

        let end = ctx.end_i64(part());
        let (it, pk) = ctx.previous_i64(&state, end).unwrap();
        assert_eq!(pk, Some(3));
        assert!(it >= 0);

        // Walking back past the first row yields -1.
        let (it, pk) = ctx.previous_i64(&state, it).unwrap();
        assert_eq!(pk, Some(2));
        let (it, pk) = ctx.previous_i64(&state, it).unwrap();
        assert_eq!(pk, Some(1));
        let (done, none) = ctx.previous_i64(&state, it).unwrap();
        assert_eq!(done, -1);
        assert!(none.is_none());
    }

    #[test]
    fn test_get_i64_returns_row_value() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);
        let it = ctx.find_i64(&state, part(), 2);
        assert_eq!(ctx.get_i64(&state, it).unwrap(), &[2]);
    }

    #[test]
    fn test_minus_one_is_never_a_valid_argument() {
        let state = seeded_state();
        let mut ctx = ReadContext::new(1, 0, 0);
        assert_eq!(ctx.next_i64(&state, -1), Err(ChainError::InvalidIterator(-1)));
        assert_eq!(
            ctx.previous_i64(&state, -1),
            Err(ChainError::InvalidIterator(-1))
        );
    }
}
