use std::fmt::Debug;
use std::hash::Hash;
use std::ops::BitOr;

use fxhash::FxHashMap;

///Pass index of the synthetic external pseudo-pass: the state a resource was in before the
/// first recorded pass.
pub const EXTERNAL_PASS: i32 = -1;

///One entry of a resource's access history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRecord<A> {
    ///Index of the pass performing the access, [EXTERNAL_PASS] for the initial state.
    pub pass: i32,
    pub intent: A,
}

///Per-handle, append-only access history. Barriers are later derived from each pair of
/// adjacent records, so the memo itself never sorts, it only appends in declaration order.
pub struct AccessMemo<H, A> {
    histories: FxHashMap<H, Vec<AccessRecord<A>>>,
}

impl<H, A> Default for AccessMemo<H, A> {
    fn default() -> Self {
        AccessMemo {
            histories: FxHashMap::default(),
        }
    }
}

impl<H, A> AccessMemo<H, A>
where
    H: Copy + Eq + Hash + Debug,
    A: Copy + PartialEq + BitOr<Output = A> + Debug,
{
    ///Seeds the history of `handle` with its state prior to the first pass. Registering a
    /// handle twice is a caller bug, the old history is discarded with a warning.
    pub fn register_initial(&mut self, handle: H, intent: A) {
        let old = self.histories.insert(
            handle,
            vec![AccessRecord {
                pass: EXTERNAL_PASS,
                intent,
            }],
        );
        if old.is_some() {
            #[cfg(feature = "logging")]
            log::warn!("Resource {:?} registered twice, discarding its previous access history.", handle);
        }
    }

    pub fn contains(&self, handle: H) -> bool {
        self.histories.contains_key(&handle)
    }

    ///Appends an access by pass `pass` to the history of `handle`. The builder issues pass
    /// indices in increasing order; two declarations for the same pass merge into one record
    /// by unioning their intents.
    pub fn update_last_access(&mut self, handle: H, pass: i32, intent: A) {
        let history = self.histories.entry(handle).or_default();
        if let Some(last) = history.last_mut() {
            debug_assert!(last.pass <= pass, "access declarations must arrive in pass order");
            if last.pass == pass {
                last.intent = last.intent | intent;
                return;
            }
        }
        history.push(AccessRecord { pass, intent });
    }

    ///Drops all records of passes at or past `first_invalid`. Used for declarations that
    /// never got a matching pass recorded. Initial records carry [EXTERNAL_PASS] and always
    /// survive, histories stay non-empty.
    pub fn drop_accesses_from(&mut self, first_invalid: i32) {
        for history in self.histories.values_mut() {
            while history.last().map_or(false, |record| record.pass >= first_invalid) {
                history.pop();
            }
        }
    }

    ///Access history of `handle` in declaration order, starting with the initial record.
    pub fn history(&self, handle: H) -> Option<&[AccessRecord<A>]> {
        self.histories.get(&handle).map(|h| h.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &[AccessRecord<A>])> {
        self.histories.iter().map(|(h, v)| (*h, v.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ImageAccess;

    #[test]
    fn initial_record_uses_external_pass() {
        let mut memo = AccessMemo::<u32, ImageAccess>::default();
        memo.register_initial(7, ImageAccess::SAMPLED_READ);
        let history = memo.history(7).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pass, EXTERNAL_PASS);
        assert_eq!(history[0].intent, ImageAccess::SAMPLED_READ);
    }

    #[test]
    fn double_registration_discards_history() {
        let mut memo = AccessMemo::<u32, ImageAccess>::default();
        memo.register_initial(0, ImageAccess::SAMPLED_READ);
        memo.update_last_access(0, 0, ImageAccess::TRANSFER_WRITE);
        memo.register_initial(0, ImageAccess::empty());
        let history = memo.history(0).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].intent, ImageAccess::empty());
    }

    #[test]
    fn dropping_dangling_accesses_keeps_initial_record() {
        let mut memo = AccessMemo::<u32, ImageAccess>::default();
        memo.register_initial(3, ImageAccess::SAMPLED_READ);
        memo.update_last_access(3, 0, ImageAccess::TRANSFER_WRITE);
        memo.update_last_access(3, 1, ImageAccess::SAMPLED_READ);
        memo.drop_accesses_from(1);
        let history = memo.history(3).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].pass, 0);

        memo.drop_accesses_from(0);
        let history = memo.history(3).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].pass, EXTERNAL_PASS);
    }

    #[test]
    fn same_pass_declarations_union() {
        let mut memo = AccessMemo::<u32, ImageAccess>::default();
        memo.register_initial(1, ImageAccess::empty());
        memo.update_last_access(1, 0, ImageAccess::STORAGE_READ);
        memo.update_last_access(1, 0, ImageAccess::STORAGE_WRITE);
        memo.update_last_access(1, 2, ImageAccess::SAMPLED_READ);
        let history = memo.history(1).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].intent, ImageAccess::STORAGE_READ | ImageAccess::STORAGE_WRITE);
        assert_eq!(history[2].pass, 2);
    }
}
