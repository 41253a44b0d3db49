/// Szudzik's [pairing function][szudzik-pairing], wrapping on overflow.
///
/// Scalar keys and node indices use the full `u64` range, so the result is only
/// injective for small arguments; for hashing that is all we need.
///
/// [szudzik-pairing]: https://en.wikipedia.org/wiki/Pairing_function#Other_pairing_functions
pub fn pairing2(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// Final avalanche step of SplitMix64, used to spread pairing results over
/// the low bits that bucket masks keep.
pub fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

pub trait MyHash {
    /// Structural hash used by the unique tables and memo caches.
    fn hash(&self) -> u64;
}

impl MyHash for u64 {
    fn hash(&self) -> u64 {
        mix64(*self)
    }
}

impl MyHash for (u64, u64) {
    fn hash(&self) -> u64 {
        mix64(pairing2(self.0, self.1))
    }
}
