//! A growable bitmap in canonical form, used for component signatures.
//!
//! Every entity carries a `Signature` describing which components are
//! attached to it, and every query precomputes the signatures it requires
//! and excludes. Matching an entity against a query is then a handful of
//! word-wise operations instead of a per-component lookup.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Number of bits per storage word.
const WORD_BITS: usize = u64::BITS as usize;

/// A dynamically sized bitmap.
///
/// The bitmap is kept in *canonical form* at all times: the word vector
/// carries no trailing zero words, so `bit_count` always equals
/// `highest set bit + 1` (or zero for the empty set). Two bitmaps are equal
/// iff their word vectors are equal, and hashing is defined over the same
/// canonical vector, which makes `BitSet` directly usable as a map key.
#[derive(Clone, Default, Eq)]
pub struct BitSet {
    words: Vec<u64>,
}

/// A bitmap over component-tag raw values.
pub type Signature = BitSet;

impl BitSet {
    /// Creates an empty bitmap.
    pub fn new() -> Self {
        BitSet { words: Vec::new() }
    }

    /// Creates a bitmap from the given set bits.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut set = BitSet::new();
        for bit in bits {
            set.insert(bit);
        }
        set
    }

    /// Number of significant bits: `highest set bit + 1`, or zero.
    pub fn bit_count(&self) -> usize {
        match self.words.last() {
            Some(&last) => {
                debug_assert_ne!(last, 0, "bitset not in canonical form");
                (self.words.len() - 1) * WORD_BITS + (WORD_BITS - last.leading_zeros() as usize)
            }
            None => 0,
        }
    }

    /// Returns `true` if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of set bits.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Sets `bit`, growing storage as needed.
    pub fn insert(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % WORD_BITS);
    }

    /// Clears `bit`. A no-op if `bit` lies beyond `bit_count`.
    ///
    /// Removing the top bit shrinks storage to the new top, so the result is
    /// indistinguishable (by equality and hash) from a set that never
    /// contained the bit.
    pub fn remove(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if word >= self.words.len() {
            return;
        }
        self.words[word] &= !(1 << (bit % WORD_BITS));
        self.canonicalize();
    }

    /// Tests `bit`.
    pub fn contains(&self, bit: usize) -> bool {
        let word = bit / WORD_BITS;
        match self.words.get(word) {
            Some(&w) => w & (1 << (bit % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Removes all bits.
    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// In-place union: max-length word-wise OR.
    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, &o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= o;
        }
        // Union of two canonical sets cannot produce a trailing zero word.
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &BitSet) {
        self.words.truncate(other.words.len());
        for (w, &o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= o;
        }
        self.canonicalize();
    }

    /// In-place difference: word-wise `a & !b`.
    pub fn subtract_with(&mut self, other: &BitSet) {
        for (w, &o) in self.words.iter_mut().zip(other.words.iter()) {
            *w &= !o;
        }
        self.canonicalize();
    }

    /// Returns the union as a new set.
    pub fn union(&self, other: &BitSet) -> BitSet {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    /// `true` iff every bit of `self` is set in `other`.
    ///
    /// Words missing on either side are treated as zero.
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, &w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// `true` iff `self` and `other` share no bit.
    pub fn is_disjoint(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(&a, &b)| a & b == 0)
    }

    /// Fused superset-and-disjoint test, the hot predicate of query matching:
    /// is `sub` a subset of `self`, and is `self` disjoint from `dis`, in a
    /// single pass.
    pub fn is_superset_disjoint(&self, sub: &BitSet, dis: &BitSet) -> bool {
        let words = sub.words.len().max(dis.words.len());
        for i in 0..words {
            let own = self.words.get(i).copied().unwrap_or(0);
            let s = sub.words.get(i).copied().unwrap_or(0);
            let d = dis.words.get(i).copied().unwrap_or(0);
            if s & !own != 0 || own & d != 0 {
                return false;
            }
        }
        true
    }

    /// Iterates over the set bits in ascending order.
    pub fn ones(&self) -> Ones<'_> {
        Ones {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn canonicalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.words.hash(state);
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ones()).finish()
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        BitSet::from_bits(iter)
    }
}

/// Iterator over the set bits of a [`BitSet`].
pub struct Ones<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl<'a> Iterator for Ones<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.current = self.words[self.word_idx];
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_idx * WORD_BITS + bit)
    }
}
