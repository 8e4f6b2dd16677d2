use {
    crate::{ClusterError, KeyHash, KeySpace},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// A contiguous, possibly wrapping, interval of the key space.
///
/// Range bounded inclusively below and exclusively above i.e.
/// `[start..start+length)`, with the end wrapping around the circular space.
/// A range with `length == L` covers the whole space regardless of its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyRangeRepr", into = "KeyRangeRepr")]
pub struct KeyRange {
    keyspace: KeySpace,
    start: u32,
    length: u32,
}

impl KeyRange {
    /// Arguments are expected to be validated by the [`KeySpace`].
    pub(crate) fn new_unchecked(keyspace: KeySpace, start: u32, length: u32) -> Self {
        Self {
            keyspace,
            start,
            length,
        }
    }

    pub fn keyspace(&self) -> KeySpace {
        self.keyspace
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    /// Exclusive end of the range, not normalized: may exceed the key space
    /// length for wrapping ranges.
    pub fn end(&self) -> u32 {
        self.start + self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the range covers every slot of the key space.
    pub fn is_full(&self) -> bool {
        self.length == self.keyspace.length()
    }

    /// Check if the key hash falls into the range.
    pub fn contains(&self, hash: KeyHash) -> bool {
        self.contains_slot(hash.modulo_hash())
    }

    /// Check if the slot falls into the range.
    pub fn contains_slot(&self, slot: u32) -> bool {
        if self.length == 0 {
            return false;
        }
        if self.is_full() {
            return true;
        }
        self.offset_of(slot) < self.length
    }

    /// Number of steps from the key hash clockwise to the start of the range;
    /// zero if the hash is contained in the range.
    pub fn clockwise_distance(&self, hash: KeyHash) -> u32 {
        let slot = hash.modulo_hash() % self.keyspace.length();
        if self.contains_slot(slot) {
            return 0;
        }
        let length = self.keyspace.length();
        (self.start + length - slot) % length
    }

    /// Smallest range covering both ranges.
    ///
    /// Ranges that are not laid out contiguously (there is a gap on both
    /// sides between them) produce the full range: the union of two disjoint
    /// arcs is not an arc, and over-coverage is preferred to under-coverage.
    pub fn union(&self, other: &KeyRange) -> KeyRange {
        debug_assert_eq!(self.keyspace, other.keyspace);
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        if self.is_full() || other.is_full() {
            return Self::new_unchecked(self.keyspace, self.start, self.keyspace.length());
        }
        match (self.extend_over(other), other.extend_over(self)) {
            (Some(a), Some(b)) if b.length < a.length => b,
            (Some(a), _) => a,
            (None, Some(b)) => b,
            (None, None) => Self::new_unchecked(self.keyspace, self.start, self.keyspace.length()),
        }
    }

    /// Marks every slot covered by the range.
    ///
    /// Slots beyond the end of `slots` are ignored.
    pub fn fill(&self, slots: &mut [bool]) {
        let length = self.keyspace.length();
        for i in 0..self.length {
            if let Some(slot) = slots.get_mut(((self.start + i) % length) as usize) {
                *slot = true;
            }
        }
    }

    /// Clockwise offset of the slot from the start of the range.
    fn offset_of(&self, slot: u32) -> u32 {
        let length = self.keyspace.length();
        (slot % length + length - self.start) % length
    }

    /// Range starting at `self.start` and extended to also cover `other`,
    /// provided `other` starts within (or right after) `self`.
    fn extend_over(&self, other: &KeyRange) -> Option<KeyRange> {
        let offset = self.offset_of(other.start);
        if offset > self.length {
            return None;
        }
        let length = self
            .length
            .max(offset + other.length)
            .min(self.keyspace.length());
        Some(Self::new_unchecked(self.keyspace, self.start, length))
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},+{}]", self.start, self.length)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct KeyRangeRepr {
    keyspace: u32,
    start: u32,
    length: u32,
}

impl TryFrom<KeyRangeRepr> for KeyRange {
    type Error = ClusterError;

    fn try_from(repr: KeyRangeRepr) -> Result<Self, Self::Error> {
        KeySpace::new(repr.keyspace)?.range(repr.start, repr.length)
    }
}

impl From<KeyRange> for KeyRangeRepr {
    fn from(range: KeyRange) -> Self {
        Self {
            keyspace: range.keyspace.length(),
            start: range.start,
            length: range.length,
        }
    }
}
