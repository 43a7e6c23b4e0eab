//! One replica of the linked list: an arena holding all element headers
//! first, then all value buffers, addressed by index instead of raw address.

use std::mem;

use crate::store::codec::{self, WORD_SIZE};
use crate::utils::ChaseError;

/// Index of a list element within its arena.
pub type NodeIdx = u32;

/// Identifier of a replica arena; equals its index in the replica set.
pub type ArenaId = u32;

/// Arena sizes are rounded up to this alignment.
pub const ARENA_ALIGN: usize = 64;

/// Non-owning reference to a value buffer inside some arena. `offset` counts
/// bytes from the arena start, so it always lands past the header region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    /// Arena the value lives in.
    pub arena: ArenaId,

    /// Value length in bytes.
    pub len: u32,

    /// Byte offset from the start of the arena.
    pub offset: u64,
}

/// One node of the singly linked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListElement {
    /// Key, equal to the element's construction order.
    pub key: u64,

    /// Following element in the same arena, `None` for the terminal node.
    pub next: Option<NodeIdx>,

    /// Where this element's value bytes are.
    pub value: ValueRef,
}

/// Byte layout of one arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaLayout {
    /// Element header region, rounded up to `ARENA_ALIGN`.
    pub nodes_bytes: usize,

    /// Value region holding `num_elements * value_size` bytes.
    pub values_bytes: usize,

    /// Whole arena including tail padding, a multiple of `ARENA_ALIGN`.
    pub total_bytes: usize,
}

#[inline]
fn align_up(size: usize) -> Option<usize> {
    size.checked_add(ARENA_ALIGN - 1)
        .map(|s| s / ARENA_ALIGN * ARENA_ALIGN)
}

impl ArenaLayout {
    /// Computes the layout for given list shape, failing on overflow.
    pub fn new(
        num_elements: usize,
        value_size: usize,
    ) -> Result<Self, ChaseError> {
        let overflow = || {
            ChaseError::msg(format!(
                "arena size overflow: {} elements x {} bytes",
                num_elements, value_size
            ))
        };

        let nodes_bytes = num_elements
            .checked_mul(mem::size_of::<ListElement>())
            .and_then(align_up)
            .ok_or_else(overflow)?;
        let values_bytes =
            num_elements.checked_mul(value_size).ok_or_else(overflow)?;
        let total_bytes = nodes_bytes
            .checked_add(values_bytes)
            .and_then(align_up)
            .ok_or_else(overflow)?;

        Ok(ArenaLayout {
            nodes_bytes,
            values_bytes,
            total_bytes,
        })
    }
}

/// A single replica arena. Immutable once built.
#[derive(Debug)]
pub struct Replica {
    /// My arena ID.
    id: ArenaId,

    /// Byte layout.
    layout: ArenaLayout,

    /// Element headers, contiguous.
    nodes: Vec<ListElement>,

    /// Value region plus tail padding, contiguous.
    values: Vec<u8>,
}

impl Replica {
    /// Allocates and populates one replica. Element `e` gets key `e`, links
    /// to `e + 1` (the last one is terminal), and a value whose whole words
    /// follow the codec. Allocation failure is reported as an error.
    pub fn build(
        id: ArenaId,
        num_elements: usize,
        value_size: usize,
    ) -> Result<Self, ChaseError> {
        if num_elements > NodeIdx::MAX as usize {
            return Err(ChaseError::msg(format!(
                "{} elements not addressable by node index",
                num_elements
            )));
        }
        let value_len = u32::try_from(value_size).map_err(|_| {
            ChaseError::msg(format!("value size {} too large", value_size))
        })?;
        let layout = ArenaLayout::new(num_elements, value_size)?;

        let mut nodes = Vec::new();
        nodes.try_reserve_exact(num_elements)?;
        let mut values = Vec::new();
        values.try_reserve_exact(layout.total_bytes - layout.nodes_bytes)?;
        values.resize(layout.total_bytes - layout.nodes_bytes, 0u8);

        let num_words = codec::words_per_value(value_size);
        for e in 0..num_elements {
            let next = if e + 1 < num_elements {
                Some((e + 1) as NodeIdx)
            } else {
                None
            };
            let value_start = e * value_size;
            nodes.push(ListElement {
                key: e as u64,
                next,
                value: ValueRef {
                    arena: id,
                    len: value_len,
                    offset: (layout.nodes_bytes + value_start) as u64,
                },
            });

            for w in 0..num_words {
                let word = codec::value_at(e as u64, w as u64);
                let start = value_start + w * WORD_SIZE;
                values[start..start + WORD_SIZE]
                    .copy_from_slice(&word.to_le_bytes());
            }
        }

        Ok(Replica {
            id,
            layout,
            nodes,
            values,
        })
    }

    /// Gets my arena ID.
    pub fn id(&self) -> ArenaId {
        self.id
    }

    /// Gets my byte layout.
    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    /// Number of elements in the list.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the list has no elements.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the first element, `None` for an empty list.
    #[inline]
    pub fn head(&self) -> Option<NodeIdx> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    /// Gets the element at given index.
    #[inline]
    pub fn node(&self, idx: NodeIdx) -> Option<&ListElement> {
        self.nodes.get(idx as usize)
    }

    /// Borrows the bytes referred to by `vref`, which must point into this
    /// arena's value region.
    pub fn value_bytes(&self, vref: &ValueRef) -> Result<&[u8], ChaseError> {
        if vref.arena != self.id {
            return Err(ChaseError::msg(format!(
                "value ref of arena {} used on arena {}",
                vref.arena, self.id
            )));
        }
        let start = usize::try_from(vref.offset)
            .ok()
            .and_then(|o| o.checked_sub(self.layout.nodes_bytes))
            .ok_or_else(|| {
                ChaseError::msg(format!(
                    "value offset {} inside header region",
                    vref.offset
                ))
            })?;
        let end = start + vref.len as usize;
        self.values.get(start..end).ok_or_else(|| {
            ChaseError::msg(format!(
                "value range {}..{} out of arena bounds",
                vref.offset,
                vref.offset + vref.len as u64
            ))
        })
    }

    /// Copies out the whole words of the value referred to by `vref`.
    pub fn value_words(&self, vref: &ValueRef) -> Result<Vec<u64>, ChaseError> {
        let bytes = self.value_bytes(vref)?;
        let mut words = Vec::new();
        words.try_reserve_exact(bytes.len() / WORD_SIZE)?;
        for chunk in bytes.chunks_exact(WORD_SIZE) {
            let mut word = [0u8; WORD_SIZE];
            word.copy_from_slice(chunk);
            words.push(u64::from_le_bytes(word));
        }
        Ok(words)
    }
}
