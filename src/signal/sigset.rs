//! Fixed-width signal set over signal numbers 1..=63.

use super::constants::{is_valid_signal, sig_mask, NSIG};
use super::SignalError;

/// A set of signal numbers backed by a 64-bit mask.
///
/// The canonical correspondence is bit *i* <=> signal *i*; bit 0 is reserved
/// and never set. All operations are pure except the explicitly mutating
/// `add`/`remove`.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSet(u64);

/// Mask with every valid signal bit set (1..=63).
const ALL_SIGNALS: u64 = !1u64;

impl SignalSet {
    /// The empty set.
    pub const fn empty() -> Self {
        SignalSet(0)
    }

    /// The set of every valid signal.
    pub const fn full() -> Self {
        SignalSet(ALL_SIGNALS)
    }

    /// Add a signal. Fails with `InvalidSignal` outside [1,63].
    pub fn add(&mut self, sig: u32) -> Result<(), SignalError> {
        if !is_valid_signal(sig) {
            return Err(SignalError::InvalidSignal);
        }
        self.0 |= sig_mask(sig);
        Ok(())
    }

    /// Remove a signal. Fails with `InvalidSignal` outside [1,63].
    pub fn remove(&mut self, sig: u32) -> Result<(), SignalError> {
        if !is_valid_signal(sig) {
            return Err(SignalError::InvalidSignal);
        }
        self.0 &= !sig_mask(sig);
        Ok(())
    }

    #[inline]
    pub const fn contains(&self, sig: u32) -> bool {
        self.0 & sig_mask(sig) != 0
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.0 == ALL_SIGNALS
    }

    /// Number of signals in the set.
    #[inline]
    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub const fn union(self, other: SignalSet) -> SignalSet {
        SignalSet(self.0 | other.0)
    }

    pub const fn intersect(self, other: SignalSet) -> SignalSet {
        SignalSet(self.0 & other.0)
    }

    /// Complement within the valid signal range; bit 0 stays clear.
    pub const fn complement(self) -> SignalSet {
        SignalSet(!self.0 & ALL_SIGNALS)
    }

    /// Canonical 64-bit representation (bit *i* <=> signal *i*).
    #[inline]
    pub const fn to_mask(self) -> u64 {
        self.0
    }

    /// Build from the canonical representation. Bit 0 is discarded.
    #[inline]
    pub const fn from_mask(mask: u64) -> SignalSet {
        SignalSet(mask & ALL_SIGNALS)
    }

    /// Iterate the contained signal numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=NSIG).filter(move |&sig| self.contains(sig))
    }
}

impl core::fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "SignalSet({:#018x})", self.0)
    }
}
