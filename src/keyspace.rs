pub mod range;


use {
    super::{ClusterError, ClusterResult, KeyHash},
    serde::{Deserialize, Serialize},
    std::fmt,
};

pub use range::KeyRange;

/// Circular space of key hash slots.
///
/// Space is defined by a single integer, its length, covering slots
/// `[0, length)`. Logically the space is circular: all [`KeyRange`]s are
/// contiguous by wrapping around at the end of the space.
///
/// Equality and hashing are based on the length alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct KeySpace {
    length: u32,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            length: Self::DEFAULT_LENGTH,
        }
    }
}

impl KeySpace {
    /// Nicely divisible default length; also a conceptually nice analogy to
    /// degrees of a circle.
    pub const DEFAULT_LENGTH: u32 = 360;

    /// Largest supported length; slot arithmetic over two lengths must fit
    /// into `u32`.
    pub const MAX_LENGTH: u32 = i32::MAX as u32;

    /// Creates a key space of a given length, within `[1, MAX_LENGTH]`.
    pub fn new(length: u32) -> ClusterResult<Self> {
        if length == 0 {
            return Err(ClusterError::InvalidArgument(
                "key space length must be positive".into(),
            ));
        }
        if length > Self::MAX_LENGTH {
            return Err(ClusterError::InvalidArgument(format!(
                "key space length {length} exceeds maximum of {}",
                Self::MAX_LENGTH
            )));
        }
        Ok(Self { length })
    }

    /// Number of slots in the key space.
    pub fn length(&self) -> u32 {
        self.length
    }

    /// Creates a range starting at `start` (inclusive) spanning `length` slots.
    ///
    /// Fails if `start` is outside of `[0, L)` or `length` outside of `[0, L]`.
    pub fn range(&self, start: u32, length: u32) -> ClusterResult<KeyRange> {
        if start >= self.length {
            return Err(ClusterError::InvalidArgument(format!(
                "Invalid 'start' argument, {start}; must be [0, {}[",
                self.length
            )));
        }
        if length > self.length {
            return Err(ClusterError::InvalidArgument(format!(
                "Invalid 'length' argument, {length}; must be [0, {}]",
                self.length
            )));
        }
        Ok(KeyRange::new_unchecked(*self, start, length))
    }

    /// Parses a range from its compact textual form.
    ///
    /// Accepts both `"[start,+length]"` (as produced by `Display`) and the
    /// bare `"start,length"` form.
    pub fn parse_range(&self, text: &str) -> ClusterResult<KeyRange> {
        let invalid = || ClusterError::InvalidArgument(format!("Invalid key range '{text}'"));
        let body = text.trim();
        let body = body
            .strip_prefix('[')
            .and_then(|b| b.strip_suffix(']'))
            .unwrap_or(body);
        let (start, length) = body.split_once(',').ok_or_else(invalid)?;
        let start = start.trim().parse::<u32>().map_err(|_| invalid())?;
        let length = length.trim();
        let length = length
            .strip_prefix('+')
            .unwrap_or(length)
            .parse::<u32>()
            .map_err(|_| invalid())?;
        self.range(start, length)
    }

    /// Zero-length range.
    pub fn empty_range(&self) -> KeyRange {
        KeyRange::new_unchecked(*self, 0, 0)
    }

    /// Range covering the whole space.
    pub fn full_range(&self) -> KeyRange {
        KeyRange::new_unchecked(*self, 0, self.length)
    }

    /// Reduces a raw routing hash into this key space.
    pub fn hash(&self, full_hash: u64) -> KeyHash {
        KeyHash::new(full_hash, self.length)
    }

    /// Calculates the range of the node at `index`, when the space is divided
    /// into `segment_count` segments and each node covers `copies` consecutive
    /// segments starting from its own.
    ///
    /// Evenly divisible spaces use exact integer arithmetic. Otherwise segment
    /// boundaries are rounded to the nearest slot, wrapping the end past the
    /// start when needed.
    pub fn calc_segment(&self, index: u32, segment_count: u32, copies: u32) -> ClusterResult<KeyRange> {
        // Trivial case: a single node covers everything.
        if segment_count <= 1 {
            return Ok(self.full_range());
        }
        if index >= segment_count {
            return Err(ClusterError::InvalidArgument(format!(
                "Invalid segment index {index}; must be [0, {segment_count}["
            )));
        }
        if copies == 0 {
            return Err(ClusterError::InvalidArgument(
                "Number of copies must be positive".into(),
            ));
        }

        // Other full coverage cases still must start at the node's own segment.
        let copies = copies.min(segment_count);
        let length = u64::from(self.length);

        if self.length % segment_count == 0 {
            let simple = self.length / segment_count;
            return self.range(index * simple, copies * simple);
        }

        let segment_length = length as f64 / f64::from(segment_count);
        let start = (segment_length * f64::from(index)).round() as u64;
        if copies == segment_count {
            return self.range((start % length) as u32, self.length);
        }
        let end = (segment_length * f64::from((index + copies) % segment_count)).round() as u64;
        let span = if end < start { end + length - start } else { end - start };
        self.range((start % length) as u32, span.min(length) as u32)
    }

    /// Number of slots covered by the union of given ranges.
    ///
    /// Result is within `[0, L]`, between "no coverage" and "full coverage".
    pub fn coverage<'a, I>(&self, ranges: I) -> u32
    where
        I: IntoIterator<Item = &'a KeyRange>,
    {
        let mut slots = vec![false; self.length as usize];
        for range in ranges {
            range.fill(&mut slots);
        }
        let covered = slots.iter().filter(|covered| **covered).count() as u32;
        covered.min(self.length)
    }
}

impl TryFrom<u32> for KeySpace {
    type Error = ClusterError;

    fn try_from(length: u32) -> ClusterResult<Self> {
        Self::new(length)
    }
}

impl From<KeySpace> for u32 {
    fn from(keyspace: KeySpace) -> Self {
        keyspace.length
    }
}

impl fmt::Display for KeySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[0,+{}]", self.length)
    }
}
