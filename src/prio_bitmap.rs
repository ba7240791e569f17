//! Two-level priority bitmap (C2).
//!
//! The kernel has exactly one fixed priority space — 256 levels, per the
//! data model — so the two-level (32 coarse × 32 fine) structure is written
//! out directly rather than built from generic bit-count machinery.
use core::fmt;

const FINE_WORDS: usize = 32;
const WORD_BITS: u32 = 32;

/// The highest representable priority level (the space is `0..=255`).
pub const MAX_PRIO: usize = 255;

/// Tracks which of 256 priority levels currently have at least one ready
/// task, supporting O(1) `set`/`clear`/`highest`.
#[derive(Clone, Copy)]
pub struct PrioBitmap {
    coarse: u32,
    fine: [u32; FINE_WORDS],
}

impl Default for PrioBitmap {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PrioBitmap {
    pub const EMPTY: Self = Self {
        coarse: 0,
        fine: [0; FINE_WORDS],
    };

    #[inline]
    pub fn set(&mut self, prio: u8) {
        let prio = prio as usize;
        let (word, bit) = (prio / FINE_WORDS, prio % FINE_WORDS);
        self.fine[word] |= 1 << bit;
        self.coarse |= 1 << word;
    }

    #[inline]
    pub fn clear(&mut self, prio: u8) {
        let prio = prio as usize;
        let (word, bit) = (prio / FINE_WORDS, prio % FINE_WORDS);
        self.fine[word] &= !(1 << bit);
        if self.fine[word] == 0 {
            self.coarse &= !(1 << word);
        }
    }

    #[inline]
    pub fn get(&self, prio: u8) -> bool {
        let prio = prio as usize;
        (self.fine[prio / FINE_WORDS] >> (prio % FINE_WORDS)) & 1 != 0
    }

    /// The numerically highest set bit (higher numbers are more urgent,
    /// matching the partition's `max_prio` bound), or `None` if the bitmap
    /// is empty.
    #[inline]
    pub fn highest(&self) -> Option<u8> {
        let word = find_last_set(self.coarse)?;
        let bits = self.fine[word as usize];
        let bit = find_last_set(bits).expect("coarse bit set implies fine word nonzero");
        Some((word * WORD_BITS + bit) as u8)
    }

    pub fn is_empty(&self) -> bool {
        self.coarse == 0
    }
}

impl fmt::Debug for PrioBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..=MAX_PRIO as u16).map(|p| p as u8).filter(|&p| self.get(p)))
            .finish()
    }
}

/// Position of the highest set bit, i.e. `31 - leading_zeros`, the
/// `find-last-set` primitive referenced by §4.2.
#[inline]
fn find_last_set(word: u32) -> Option<u32> {
    if word == 0 {
        None
    } else {
        Some(WORD_BITS - 1 - word.leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_highest() {
        assert_eq!(PrioBitmap::EMPTY.highest(), None);
    }

    #[test]
    fn highest_wins_highest_numeric_priority() {
        let mut bm = PrioBitmap::EMPTY;
        bm.set(200);
        bm.set(10);
        bm.set(99);
        assert_eq!(bm.highest(), Some(200));
    }

    #[test]
    fn clearing_last_bit_in_word_clears_coarse() {
        let mut bm = PrioBitmap::EMPTY;
        bm.set(40);
        assert!(bm.get(40));
        bm.clear(40);
        assert!(bm.is_empty());
        assert_eq!(bm.highest(), None);
    }

    #[test]
    fn boundary_priorities() {
        let mut bm = PrioBitmap::EMPTY;
        bm.set(0);
        bm.set(255);
        assert_eq!(bm.highest(), Some(255));
        bm.clear(255);
        assert_eq!(bm.highest(), Some(0));
    }

    #[quickcheck_macros::quickcheck]
    fn matches_naive_scan(prios: std::vec::Vec<u8>) -> bool {
        let mut bm = PrioBitmap::EMPTY;
        for &p in &prios {
            bm.set(p);
        }
        let expected = (0u16..=255).map(|p| p as u8).rev().find(|&p| prios.contains(&p));
        bm.highest() == expected
    }
}
