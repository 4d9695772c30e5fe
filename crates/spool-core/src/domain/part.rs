//! Committed part bookkeeping.

use serde::{Deserialize, Serialize};

use super::ids::PartToken;

/// One flushed part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    pub part_number: u32,
    pub token: PartToken,
}

/// Ordered list of flushed parts.
///
/// Invariant: part numbers are exactly `1..=len` in flush order. The only way
/// to add a part is [`PartList::push`], which assigns the next number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartList {
    parts: Vec<PartRecord>,
}

impl PartList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Part number the next flushed part will receive.
    pub fn next_part_number(&self) -> u32 {
        self.parts.len() as u32 + 1
    }

    pub fn push(&mut self, token: PartToken) -> &PartRecord {
        let part_number = self.next_part_number();
        self.parts.push(PartRecord { part_number, token });
        &self.parts[self.parts.len() - 1]
    }

    pub fn as_slice(&self) -> &[PartRecord] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether the list is dense and ordered (`1..=len`).
    ///
    /// Always true for lists built through `push`. Lists decoded from the
    /// cache are checked with this before use.
    pub fn is_contiguous(&self) -> bool {
        self.parts
            .iter()
            .enumerate()
            .all(|(i, part)| part.part_number as usize == i + 1)
    }
}

/// Committed offset together with the parts that make it up.
///
/// Kept as a single cache entry so an acknowledged part and the offset it
/// advances are always written together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    pub committed: u64,
    pub parts: PartList,
}

impl TransferProgress {
    /// Record an acknowledged part of `size` bytes; returns its part number.
    pub fn record_part(&mut self, token: PartToken, size: u64) -> u32 {
        let part_number = self.parts.push(token).part_number;
        self.committed += size;
        part_number
    }

    /// Progress of a finished upload: everything committed, no pending parts.
    pub fn completed(declared_length: u64) -> Self {
        Self {
            committed: declared_length,
            parts: PartList::new(),
        }
    }
}
