//! Canonical vertex serialization.
//!
//! A vertex batches transition blobs under parent references. Its id is the
//! SHA-256 of its serialized bytes, so the byte layout is canonical: parents
//! and restrictions sorted ascending and unique, transition blobs sorted by
//! their hashes. Re-serializing any parsed vertex yields identical bytes and
//! an identical id.
//!
//! Two layouts exist. Version 0 predates epochs: it carries no epoch and no
//! restrictions. Version 1 carries both.

use snowdag_codec::{
    Packer, UnpackError, Unpacker, CODEC_VERSION_POST_FORK, CODEC_VERSION_PRE_FORK,
};
use snowdag_ids::{hash256, is_sorted_and_unique, sort_and_dedup, Id};
use thiserror::Error;

/// Upper bound on transitions batched into one vertex.
pub const MAX_TRANSITIONS_PER_VERTEX: usize = 128;

/// Errors from building or parsing a vertex.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VertexError {
    #[error("vertex has no transitions and no parents")]
    Empty,

    #[error("vertex has {0} transitions, max is {MAX_TRANSITIONS_PER_VERTEX}")]
    TooManyTransitions(usize),

    #[error("vertex carries an empty transition")]
    EmptyTransition,

    #[error("parent ids are not sorted and unique")]
    UnsortedParents,

    #[error("restrictions are not sorted and unique")]
    UnsortedRestrictions,

    #[error("transitions are not sorted by hash")]
    UnsortedTransitions,

    #[error("version 0 vertex cannot carry epochs or restrictions")]
    PreForkFields,

    #[error("unsupported vertex version {0}")]
    UnsupportedVersion(u16),

    #[error("vertex decoding failed: {0}")]
    Decode(#[from] UnpackError),
}

/// An immutable, canonically serialized vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex {
    version: u16,
    chain_id: Id,
    height: u64,
    epoch: u32,
    parent_ids: Vec<Id>,
    transitions: Vec<Vec<u8>>,
    restrictions: Vec<Id>,
    id: Id,
    bytes: Vec<u8>,
}

impl Vertex {
    /// Builds a vertex, sorting fields into canonical order.
    ///
    /// The serialization version follows the epoch: epoch 0 produces a
    /// version 0 vertex (which cannot carry restrictions), later epochs
    /// produce version 1.
    pub fn build(
        chain_id: Id,
        height: u64,
        epoch: u32,
        mut parent_ids: Vec<Id>,
        mut transitions: Vec<Vec<u8>>,
        mut restrictions: Vec<Id>,
    ) -> Result<Self, VertexError> {
        sort_and_dedup(&mut parent_ids);
        transitions.sort_by_key(|tr| hash256(tr));
        transitions.dedup();
        sort_and_dedup(&mut restrictions);

        let version = if epoch == 0 {
            CODEC_VERSION_PRE_FORK
        } else {
            CODEC_VERSION_POST_FORK
        };
        if version == CODEC_VERSION_PRE_FORK && !restrictions.is_empty() {
            return Err(VertexError::PreForkFields);
        }

        let vertex = Self::assemble(version, chain_id, height, epoch, parent_ids, transitions, restrictions)?;
        Ok(vertex)
    }

    /// Parses a vertex from its canonical bytes, rejecting non-canonical
    /// encodings.
    pub fn parse(bytes: &[u8]) -> Result<Self, VertexError> {
        let mut unpacker = Unpacker::new(bytes);
        let version = unpacker.unpack_short()?;
        if version != CODEC_VERSION_PRE_FORK && version != CODEC_VERSION_POST_FORK {
            return Err(VertexError::UnsupportedVersion(version));
        }

        let chain_id_bytes: [u8; 32] = unpacker.unpack_fixed_bytes()?;
        let chain_id = Id::from_bytes(chain_id_bytes);
        let height = unpacker.unpack_long()?;

        let epoch = if version == CODEC_VERSION_PRE_FORK {
            0
        } else {
            unpacker.unpack_int()?
        };

        let parent_count = unpacker.unpack_int()? as usize;
        let mut parent_ids = Vec::with_capacity(parent_count.min(64));
        for _ in 0..parent_count {
            let raw: [u8; 32] = unpacker.unpack_fixed_bytes()?;
            parent_ids.push(Id::from_bytes(raw));
        }

        let transition_count = unpacker.unpack_int()? as usize;
        let mut transitions = Vec::with_capacity(transition_count.min(MAX_TRANSITIONS_PER_VERTEX));
        for _ in 0..transition_count {
            transitions.push(unpacker.unpack_bytes()?);
        }

        let restrictions = if version == CODEC_VERSION_PRE_FORK {
            Vec::new()
        } else {
            let count = unpacker.unpack_int()? as usize;
            let mut restrictions = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                let raw: [u8; 32] = unpacker.unpack_fixed_bytes()?;
                restrictions.push(Id::from_bytes(raw));
            }
            restrictions
        };

        if !unpacker.is_exhausted() {
            return Err(VertexError::Decode(UnpackError::TrailingBytes(
                unpacker.remaining(),
            )));
        }

        let vertex = Self::assemble(version, chain_id, height, epoch, parent_ids, transitions, restrictions)?;
        debug_assert_eq!(vertex.bytes, bytes);
        Ok(vertex)
    }

    fn assemble(
        version: u16,
        chain_id: Id,
        height: u64,
        epoch: u32,
        parent_ids: Vec<Id>,
        transitions: Vec<Vec<u8>>,
        restrictions: Vec<Id>,
    ) -> Result<Self, VertexError> {
        if transitions.is_empty() && parent_ids.is_empty() {
            return Err(VertexError::Empty);
        }
        if transitions.len() > MAX_TRANSITIONS_PER_VERTEX {
            return Err(VertexError::TooManyTransitions(transitions.len()));
        }
        if transitions.iter().any(Vec::is_empty) {
            return Err(VertexError::EmptyTransition);
        }
        if !is_sorted_and_unique(&parent_ids) {
            return Err(VertexError::UnsortedParents);
        }
        if !is_sorted_and_unique(&restrictions) {
            return Err(VertexError::UnsortedRestrictions);
        }
        let hashes: Vec<_> = transitions.iter().map(|tr| hash256(tr)).collect();
        if hashes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(VertexError::UnsortedTransitions);
        }

        let mut packer = Packer::new(512);
        packer.pack_short(version);
        packer.pack_fixed_bytes(chain_id.as_bytes());
        packer.pack_long(height);
        if version != CODEC_VERSION_PRE_FORK {
            packer.pack_int(epoch);
        }
        packer.pack_int(parent_ids.len() as u32);
        for parent in &parent_ids {
            packer.pack_fixed_bytes(parent.as_bytes());
        }
        packer.pack_int(transitions.len() as u32);
        for transition in &transitions {
            packer.pack_bytes(transition);
        }
        if version != CODEC_VERSION_PRE_FORK {
            packer.pack_int(restrictions.len() as u32);
            for restriction in &restrictions {
                packer.pack_fixed_bytes(restriction.as_bytes());
            }
        }
        let bytes = packer.into_bytes();
        let id = Id::from_hash(&bytes);

        Ok(Self {
            version,
            chain_id,
            height,
            epoch,
            parent_ids,
            transitions,
            restrictions,
            id,
            bytes,
        })
    }

    #[must_use]
    pub fn id(&self) -> Id {
        self.id
    }

    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[must_use]
    pub fn chain_id(&self) -> Id {
        self.chain_id
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.height
    }

    #[must_use]
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    #[must_use]
    pub fn parent_ids(&self) -> &[Id] {
        &self.parent_ids
    }

    #[must_use]
    pub fn transitions(&self) -> &[Vec<u8>] {
        &self.transitions
    }

    #[must_use]
    pub fn restrictions(&self) -> &[Id] {
        &self.restrictions
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
