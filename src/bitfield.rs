//! Bitfield-aware table generation.
//!
//! A core receiving packets for a source vertex can say, per atom of that
//! vertex, whether it has any synapses for the atom. Those answers arrive as
//! [`BitFieldBuffer`]s: one bit per atom, keyed by the vertex's base key and
//! tagged with the processor they came from.
//!
//! [`generate_table`] folds a set of bitfields into a routing table. Each
//! entry covering a bitfield's base key is expanded into one exact entry
//! per atom, and the processor bits whose bitfield marks the atom as
//! redundant are cleared from that atom's route. The expanded table is
//! larger but routes fewer useless packets; ordered covering then merges it
//! back down.

use crate::error::{CompressorError, Result};
use crate::key_mask::KeyMask;
use crate::pool::MemoryPool;
use crate::table::{Entry, RoutingTable, N_LINKS};
use bitvec::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Route bit for processor `p`.
#[inline]
pub const fn processor_bit(processor: u32) -> u32 {
    1 << (N_LINKS + processor)
}

/// Per-atom "needed" flags for one source vertex on one processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitFieldBuffer {
    pub base_key: u32,
    pub processor: u32,
    pub bits: Vec<u32>,
}

impl BitFieldBuffer {
    pub fn new(base_key: u32, processor: u32, bits: Vec<u32>) -> Self {
        Self {
            base_key,
            processor,
            bits,
        }
    }

    /// Bitfield with the atoms in `set` marked and all others redundant.
    pub fn from_atoms(base_key: u32, processor: u32, n_atoms: usize, set: &[usize]) -> Self {
        let mut bits = bitvec![u32, Lsb0; 0; n_atoms];
        for &atom in set {
            if atom < n_atoms {
                bits.set(atom, true);
            }
        }
        Self::new(base_key, processor, bits.into_vec())
    }

    pub fn n_words(&self) -> usize {
        self.bits.len()
    }

    /// Whether the processor needs packets for `atom`.
    ///
    /// Atoms beyond the end of the bitfield read as not needed.
    #[inline]
    pub fn atom_is_set(&self, atom: usize) -> bool {
        self.bits
            .view_bits::<Lsb0>()
            .get(atom)
            .map_or(false, |b| *b)
    }

    /// Number of atoms the processor needs.
    pub fn count_set(&self) -> usize {
        self.bits.view_bits::<Lsb0>().count_ones()
    }

    /// Parse `[base_key, n_words, bits...]`.
    pub fn from_words(processor: u32, words: &[u32]) -> Result<Self> {
        let (base_key, n_words) = match words {
            [base_key, n_words, ..] => (*base_key, *n_words as usize),
            _ => {
                return Err(CompressorError::InvalidInput(
                    "bitfield header needs 2 words".into(),
                ))
            }
        };
        let body = &words[2..];
        if body.len() < n_words {
            return Err(CompressorError::InvalidInput(format!(
                "bitfield for key {:#010x} needs {} words, got {}",
                base_key,
                n_words,
                body.len()
            )));
        }
        Ok(Self::new(base_key, processor, body[..n_words].to_vec()))
    }

    pub fn to_words(&self) -> Vec<u32> {
        let mut words = Vec::with_capacity(2 + self.bits.len());
        words.push(self.base_key);
        words.push(self.bits.len() as u32);
        words.extend_from_slice(&self.bits);
        words
    }
}

/// Side table from a vertex's base key to its number of atoms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAtomMap {
    atoms: HashMap<u32, u32>,
}

impl KeyAtomMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, base_key: u32, n_atoms: u32) -> Option<u32> {
        self.atoms.insert(base_key, n_atoms)
    }

    pub fn atoms(&self, base_key: u32) -> Option<u32> {
        self.atoms.get(&base_key).copied()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl FromIterator<(u32, u32)> for KeyAtomMap {
    fn from_iter<I: IntoIterator<Item = (u32, u32)>>(iter: I) -> Self {
        Self {
            atoms: iter.into_iter().collect(),
        }
    }
}

/// Bitfields of one vertex, one per processor.
struct VertexFields<'a> {
    base_key: u32,
    n_atoms: u32,
    fields: Vec<&'a BitFieldBuffer>,
}

impl VertexFields<'_> {
    /// Route for `atom` with redundant processors removed.
    fn route(&self, route: u32, atom: usize) -> u32 {
        self.fields
            .iter()
            .filter(|bf| !bf.atom_is_set(atom))
            .fold(route, |r, bf| r & !processor_bit(bf.processor))
    }
}

/// Expand `entries` with the information in `bitfields`.
///
/// Entries not covering any bitfield's base key are copied unchanged. An
/// expanded entry is kept after its atoms only when it also matches keys
/// outside them. Relative order is preserved, with each entry's expansion
/// taking the entry's place. Vertex key ranges are assumed disjoint.
pub fn generate_table(
    entries: &[Entry],
    bitfields: &[BitFieldBuffer],
    atoms: &KeyAtomMap,
    pool: &Arc<MemoryPool>,
) -> Result<RoutingTable> {
    let mut vertices = Vec::new();
    for (base_key, fields) in bitfields
        .iter()
        .into_group_map_by(|bf| bf.base_key)
        .into_iter()
        .sorted_by_key(|(k, _)| *k)
    {
        let n_atoms = atoms.atoms(base_key).ok_or_else(|| {
            CompressorError::InvalidInput(format!("no atom count for key {:#010x}", base_key))
        })?;
        if let Some(short) = fields.iter().find(|bf| bf.bits.len() * 32 < n_atoms as usize) {
            return Err(CompressorError::InvalidInput(format!(
                "bitfield for key {:#010x} on processor {} holds {} atoms, vertex has {}",
                base_key,
                short.processor,
                short.bits.len() * 32,
                n_atoms
            )));
        }
        vertices.push(VertexFields {
            base_key,
            n_atoms,
            fields,
        });
    }

    let mut out = Vec::new();
    let mut lease = pool.lease(entries.len() * std::mem::size_of::<Entry>())?;
    out.try_reserve(entries.len())?;

    for entry in entries {
        let km = entry.key_mask;
        let mut expanded = 0u64;

        for vertex in vertices.iter().filter(|v| km.matches(v.base_key)) {
            let added = (0..vertex.n_atoms)
                .filter(|atom| km.matches(vertex.base_key.wrapping_add(*atom)))
                .count();
            lease.grow(added * std::mem::size_of::<Entry>())?;
            out.try_reserve(added)?;

            for atom in 0..vertex.n_atoms {
                let key = vertex.base_key.wrapping_add(atom);
                if km.matches(key) {
                    out.push(Entry {
                        key_mask: KeyMask::exact(key),
                        route: vertex.route(entry.route, atom as usize),
                        source: entry.source,
                    });
                }
            }
            expanded += added as u64;
        }

        let matched = if km.key & !km.mask != 0 {
            0
        } else {
            1u64 << km.count_xs()
        };
        if expanded < matched {
            out.push(*entry);
        }
    }

    log::debug!(
        "generated {} entries from {} with {} bitfields",
        out.len(),
        entries.len(),
        bitfields.len()
    );
    Ok(RoutingTable::from_entries(out))
}
