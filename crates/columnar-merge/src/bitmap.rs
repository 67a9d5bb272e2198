#![forbid(unsafe_code)]

/// Validity bitmap: one bit per row, `1` = valid (non-null).
///
/// Bits are stored little-endian within each `u64` word:
/// - bit 0 is the LSB of word 0
/// - bit 63 is the MSB of word 0
///
/// Bits past `len` in the last word are always zero, so two bitmaps with the same logical
/// contents compare equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

pub(crate) const WORD_BITS: usize = 64;

fn word_count(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

fn tail_mask(len: usize) -> u64 {
    match len % WORD_BITS {
        0 => u64::MAX,
        rem => (1u64 << rem) - 1,
    }
}

impl Bitmap {
    pub fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_capacity_bits(bits: usize) -> Self {
        Self {
            words: Vec::with_capacity(word_count(bits)),
            len: 0,
            ones: 0,
        }
    }

    pub fn with_len_all_true(bits: usize) -> Self {
        if bits == 0 {
            return Self::new();
        }

        let mut words = vec![u64::MAX; word_count(bits)];
        if let Some(last) = words.last_mut() {
            *last = tail_mask(bits);
        }

        Self {
            words,
            len: bits,
            ones: bits,
        }
    }

    pub fn with_len_all_false(bits: usize) -> Self {
        Self {
            words: vec![0u64; word_count(bits)],
            len: bits,
            ones: 0,
        }
    }

    pub fn from_bools(bits: &[bool]) -> Self {
        let mut out = Self::with_capacity_bits(bits.len());
        for &b in bits {
            out.push(b);
        }
        out
    }

    /// Rebuild a bitmap from raw words, clearing any bits past `len`.
    pub fn from_words(mut words: Vec<u64>, len: usize) -> Self {
        words.resize(word_count(len), 0);
        if let Some(last) = words.last_mut() {
            *last &= tail_mask(len);
        }
        let ones = words.iter().map(|w| w.count_ones() as usize).sum();
        Self { words, len, ones }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push(&mut self, value: bool) {
        let bit = self.len % WORD_BITS;
        if bit == 0 {
            self.words.push(0);
        }

        if value {
            let word = self.len / WORD_BITS;
            self.words[word] |= 1u64 << bit;
            self.ones += 1;
        }

        self.len += 1;
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "Bitmap index out of bounds");
        let word = self.words[index / WORD_BITS];
        ((word >> (index % WORD_BITS)) & 1) == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "Bitmap index out of bounds");
        let word_idx = index / WORD_BITS;
        let mask = 1u64 << (index % WORD_BITS);
        let was_set = (self.words[word_idx] & mask) != 0;

        match (was_set, value) {
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                self.words[word_idx] |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    /// Number of valid rows.
    pub fn count_ones(&self) -> usize {
        self.ones
    }

    /// Number of null rows.
    pub fn count_zeros(&self) -> usize {
        self.len - self.ones
    }

    pub fn all_true(&self) -> bool {
        self.ones == self.len
    }

    pub fn as_words(&self) -> &[u64] {
        &self.words
    }

    /// Overwrite every word through `fill` and recount.
    ///
    /// `fill` receives the whole word buffer; bits it writes past `len` are discarded.
    pub(crate) fn overwrite_words(&mut self, fill: impl FnOnce(&mut [u64])) {
        fill(&mut self.words);
        if let Some(last) = self.words.last_mut() {
            *last &= tail_mask(self.len);
        }
        self.ones = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    pub fn extend_from_bitmap(&mut self, other: &Bitmap) {
        if self.len % WORD_BITS == 0 {
            self.words.extend_from_slice(&other.words);
            self.len += other.len;
            self.ones += other.ones;
            return;
        }
        for idx in 0..other.len {
            self.push(other.get(idx));
        }
    }

    pub fn extend_constant(&mut self, bits: usize, value: bool) {
        for _ in 0..bits {
            self.push(value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    pub fn size_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}
