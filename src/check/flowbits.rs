//! Definite-assignment flow sets.
//!
//! A `FlowBits` value tracks, per local-variable slot, whether the slot is
//! definitely assigned (DA) and whether it is possibly assigned, the
//! complement of definitely unassigned (DU). Both are needed at once: the
//! loop back-branch rule distinguishes "unassigned on entry" from
//! "possibly assigned again around the back edge".
//!
//! Values are immutable in spirit: branches receive their own copies and a
//! set handed to one branch never observes mutation performed by a
//! sibling. `join` merges control-flow paths (DA intersects, possibly-
//! assigned unions) and the dead-end sentinel, the state of unreachable
//! code, is its identity.

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowBits {
    dead: bool,
    assigned: Vec<u64>,
    maybe: Vec<u64>,
}

impl FlowBits {
    /// Entry state: nothing assigned, everything reachable.
    pub fn live() -> FlowBits {
        FlowBits { dead: false, assigned: Vec::new(), maybe: Vec::new() }
    }

    /// The state of unreachable code. Absorbing for queries (every slot
    /// reads as both DA and DU) and the identity for `join`.
    pub fn dead_end() -> FlowBits {
        FlowBits { dead: true, assigned: Vec::new(), maybe: Vec::new() }
    }

    pub fn is_dead_end(&self) -> bool {
        self.dead
    }

    fn bit(words: &[u64], slot: u32) -> bool {
        let idx = slot as usize / WORD_BITS;
        words.get(idx).is_some_and(|w| w & (1u64 << (slot as usize % WORD_BITS)) != 0)
    }

    fn set_bit(words: &mut Vec<u64>, slot: u32) {
        let idx = slot as usize / WORD_BITS;
        if words.len() <= idx {
            words.resize(idx + 1, 0);
        }
        words[idx] |= 1u64 << (slot as usize % WORD_BITS);
    }

    /// Definitely assigned on every path reaching this point.
    pub fn is_assigned(&self, slot: u32) -> bool {
        self.dead || Self::bit(&self.assigned, slot)
    }

    /// Definitely unassigned on every path reaching this point.
    pub fn is_unassigned(&self, slot: u32) -> bool {
        self.dead || !Self::bit(&self.maybe, slot)
    }

    /// Record an assignment to `slot`. No effect on the dead-end value.
    pub fn assign(&mut self, slot: u32) {
        if self.dead {
            return;
        }
        Self::set_bit(&mut self.assigned, slot);
        Self::set_bit(&mut self.maybe, slot);
    }

    /// `assign` as a value-to-value operation.
    pub fn with_assign(mut self, slot: u32) -> FlowBits {
        self.assign(slot);
        self
    }

    /// Merge two control-flow paths: a slot is definitely assigned only if
    /// assigned on both, possibly assigned if possibly assigned on either.
    pub fn join(self, other: &FlowBits) -> FlowBits {
        if self.dead {
            return other.clone();
        }
        if other.dead {
            return self;
        }
        let mut assigned = self.assigned;
        // Words past the shorter vector hold no assignments, so the
        // intersection truncates to the shorter length.
        assigned.truncate(other.assigned.len());
        for (w, o) in assigned.iter_mut().zip(&other.assigned) {
            *w &= o;
        }
        let mut maybe = self.maybe;
        if maybe.len() < other.maybe.len() {
            maybe.resize(other.maybe.len(), 0);
        }
        for (w, o) in maybe.iter_mut().zip(&other.maybe) {
            *w |= o;
        }
        FlowBits { dead: false, assigned, maybe }
    }

    /// Sequence the assignments of `other` after this state: a slot is DA
    /// (or possibly assigned) if it is in either. Used when two regions
    /// both execute on the normal path, as with a guarded block followed
    /// by its cleanup.
    pub fn union_assign(mut self, other: &FlowBits) -> FlowBits {
        if self.dead || other.dead {
            // Sequencing with unreachable code contributes nothing.
            return if self.dead { other.clone() } else { self };
        }
        if self.assigned.len() < other.assigned.len() {
            self.assigned.resize(other.assigned.len(), 0);
        }
        for (w, o) in self.assigned.iter_mut().zip(&other.assigned) {
            *w |= o;
        }
        if self.maybe.len() < other.maybe.len() {
            self.maybe.resize(other.maybe.len(), 0);
        }
        for (w, o) in self.maybe.iter_mut().zip(&other.maybe) {
            *w |= o;
        }
        self
    }

    /// Drop all state for slots at or above `limit`, on scope exit.
    pub fn shrink(&mut self, limit: u32) {
        let full_words = limit as usize / WORD_BITS;
        let rem = limit as usize % WORD_BITS;
        for words in [&mut self.assigned, &mut self.maybe] {
            if rem == 0 {
                words.truncate(full_words);
            } else if words.len() > full_words {
                words.truncate(full_words + 1);
                words[full_words] &= (1u64 << rem) - 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_and_query() {
        let mut f = FlowBits::live();
        assert!(!f.is_assigned(0));
        assert!(f.is_unassigned(0));
        f.assign(0);
        f.assign(70); // crosses a word boundary
        assert!(f.is_assigned(0));
        assert!(f.is_assigned(70));
        assert!(!f.is_unassigned(0));
        assert!(!f.is_assigned(1));
        assert!(f.is_unassigned(1));
    }

    #[test]
    fn test_join_is_commutative_and_idempotent() {
        let a = FlowBits::live().with_assign(0).with_assign(1);
        let b = FlowBits::live().with_assign(1).with_assign(2);
        let ab = a.clone().join(&b);
        let ba = b.clone().join(&a);
        assert_eq!(ab, ba);
        assert_eq!(a.clone().join(&a), a);
        // Associativity over a third value.
        let c = FlowBits::live().with_assign(1).with_assign(70);
        assert_eq!(a.clone().join(&b).join(&c), a.clone().join(&c.clone().join(&b)));
    }

    #[test]
    fn test_join_semantics() {
        let a = FlowBits::live().with_assign(0).with_assign(1);
        let b = FlowBits::live().with_assign(1);
        let j = a.join(&b);
        // DA only where assigned on both paths.
        assert!(!j.is_assigned(0));
        assert!(j.is_assigned(1));
        // DU only where untouched on both paths.
        assert!(!j.is_unassigned(0));
        assert!(j.is_unassigned(2));
    }

    #[test]
    fn test_dead_end_is_join_identity() {
        let a = FlowBits::live().with_assign(3);
        assert_eq!(FlowBits::dead_end().join(&a), a);
        assert_eq!(a.clone().join(&FlowBits::dead_end()), a);
        assert!(FlowBits::dead_end().join(&FlowBits::dead_end()).is_dead_end());
    }

    #[test]
    fn test_dead_end_absorbs_queries() {
        let d = FlowBits::dead_end();
        assert!(d.is_assigned(17));
        assert!(d.is_unassigned(17));
    }

    #[test]
    fn test_union_assign() {
        let a = FlowBits::live().with_assign(0);
        let b = FlowBits::live().with_assign(2);
        let u = a.union_assign(&b);
        assert!(u.is_assigned(0));
        assert!(u.is_assigned(2));
        assert!(!u.is_assigned(1));
    }

    #[test]
    fn test_shrink_drops_out_of_scope_slots() {
        let mut f = FlowBits::live();
        f.assign(1);
        f.assign(5);
        f.assign(64);
        f.shrink(4);
        assert!(f.is_assigned(1));
        assert!(!f.is_assigned(5));
        assert!(f.is_unassigned(5));
        assert!(!f.is_assigned(64));
    }
}
