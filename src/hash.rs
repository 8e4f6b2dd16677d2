use {
    super::{ClusterError, ClusterResult},
    auto_impl::auto_impl,
    bytes::Bytes,
    rapidhash::v3::rapidhash_v3,
    std::{
        fmt,
        hash::{BuildHasher, BuildHasherDefault, Hasher},
    },
};

/// Default hasher for routing keys.
///
/// This uses the rapidhash V3 algorithm for hashing keys.
/// For C++ compatibility, relies on the default seed and secrets.
///
/// The output is portable across platforms and major releases, which is
/// required since clients and servers in different processes must agree on
/// the routing hash of every key.
#[derive(Default)]
pub struct DefaultHasher(Vec<u8>);

impl Hasher for DefaultHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }

    fn finish(&self) -> u64 {
        rapidhash_v3(&self.0)
    }
}

/// Builder of [`DefaultHasher`] instances.
pub type DefaultBuildHasher = BuildHasherDefault<DefaultHasher>;

/// Hash of a key reduced to a slot of the key space.
///
/// Kept apart from the raw hash value so that the two are never mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHash {
    full_hash: u64,
    modulo_hash: u32,
}

impl KeyHash {
    /// Reduces `full_hash` into `[0, keyspace_length)`.
    ///
    /// Key space length is validated by the owning [`KeySpace`], so it is
    /// never zero here.
    ///
    /// [`KeySpace`]: crate::KeySpace
    pub(crate) fn new(full_hash: u64, keyspace_length: u32) -> Self {
        Self {
            full_hash,
            modulo_hash: (full_hash % u64::from(keyspace_length)) as u32,
        }
    }

    /// Raw routing hash the slot was computed from.
    pub fn full_hash(&self) -> u64 {
        self.full_hash
    }

    /// Slot within the key space.
    pub fn modulo_hash(&self) -> u32 {
        self.modulo_hash
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.modulo_hash)
    }
}

/// Opaque byte form of an entry key, as used by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawKey(Bytes);

impl RawKey {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Converts between application keys and their routing and raw forms.
///
/// The routing hash must be deterministic and stable across processes.
#[auto_impl(&, Arc)]
pub trait EntryKeyConverter: Send + Sync {
    /// Application key type.
    type Key: fmt::Display + Send + Sync;

    /// Routing hash of the key, before reduction into the key space.
    fn routing_hash(&self, key: &Self::Key) -> u64;

    /// Raw byte form of the key.
    fn to_raw(&self, key: &Self::Key) -> RawKey;

    /// Decodes a key from its raw byte form.
    fn from_raw(&self, raw: &RawKey) -> ClusterResult<Self::Key>;
}

/// Converter for plain UTF-8 string keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8KeyConverter;

impl EntryKeyConverter for Utf8KeyConverter {
    type Key = String;

    fn routing_hash(&self, key: &String) -> u64 {
        DefaultBuildHasher::default().hash_one(key.as_str())
    }

    fn to_raw(&self, key: &String) -> RawKey {
        RawKey::new(key.clone().into_bytes())
    }

    fn from_raw(&self, raw: &RawKey) -> ClusterResult<String> {
        String::from_utf8(raw.as_bytes().to_vec())
            .map_err(|e| ClusterError::InvalidArgument(format!("raw key is not UTF-8: {e}")))
    }
}
