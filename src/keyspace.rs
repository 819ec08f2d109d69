//! Deterministic mapping between logical integer values and the synthetic
//! documents, range queries, and point-mutation targets exercised against the
//! store under test.
//!
//! Every document carries the exact logical value plus 32 "mix" fields, each
//! the value perturbed by a uniformly random offset scaled to a power of two.
//! `mix[0]` tracks the value closely, `mix[31]` is essentially random. The
//! store under test indexes and partitions on these fields, which is what
//! makes the randomness of shard and index selection independently tunable.

use crate::range::ValueRange;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of mix fields carried by every document.
pub const MIX_FIELDS: usize = 32;

const TWO_31: i64 = 1 << 31;
const TWO_32: i64 = 1 << 32;

/// Fold any integer onto the signed 32-bit range by modular wraparound.
///
/// Out-of-range values wrap rather than clamp: `wrap(2^31) == -2^31`. Values
/// already in range map to themselves.
pub fn wrap(value: i64) -> i32 {
    // Reduce first so the shift below cannot overflow for any i64 input.
    let folded = value.rem_euclid(TWO_32);
    let shifted = (folded + TWO_31) % TWO_32;
    (shifted - TWO_31) as i32
}

/// Perturb `value` by a uniformly random offset in `[-2^power/2, +2^power/2)`
/// and wrap the result back into the 32-bit range.
pub fn smear(rng: &mut StdRng, value: i32, power: u32) -> i32 {
    let range = 1i64 << power;
    let offset = rng.random_range(0..range);
    wrap(i64::from(value) - range / 2 + offset)
}

/// Opaque per-run client identity embedded in every document and predicate,
/// isolating concurrent runs against the same collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u64);

impl ClientId {
    pub fn mint(rng: &mut StdRng) -> Self {
        Self(rng.random())
    }
}

/// Unique document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId(pub u128);

impl DocId {
    /// Derived from the client identity and the logical value, so the id
    /// order follows insertion order.
    pub fn incremental(client_id: ClientId, value: i32) -> Self {
        Self((u128::from(client_id.0) << 64) | u128::from(value as u32))
    }

    /// Fresh opaque id with no relation to the value.
    pub fn random(rng: &mut StdRng) -> Self {
        Self(rng.random())
    }
}

/// Which identifier variant documents are minted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdMode {
    Incremental,
    Random,
}

/// A stored document: the exact value, its 32 randomized mix fields, and the
/// identities needed to scope it to one run. Immutable after insert except
/// for the `updated` marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub client_id: ClientId,
    pub value: i32,
    pub mix: [i32; MIX_FIELDS],
    pub updated: bool,
}

impl Document {
    /// Build the document for `value`: wrap it, smear all 32 mix fields, and
    /// mint an identifier per `id_mode`.
    pub fn generate(rng: &mut StdRng, client_id: ClientId, id_mode: IdMode, value: i64) -> Self {
        let value = wrap(value);

        let mut mix = [0i32; MIX_FIELDS];
        for (i, slot) in mix.iter_mut().enumerate() {
            *slot = smear(rng, value, i as u32 + 1);
        }

        let id = match id_mode {
            IdMode::Incremental => DocId::incremental(client_id, value),
            IdMode::Random => DocId::random(rng),
        };

        Self {
            id,
            client_id,
            value,
            mix,
            updated: false,
        }
    }
}

/// The single mutation the workload applies to existing documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    MarkUpdated,
}

/// Bound on one mix field, widened by `2^field` beyond the queried value
/// range so the randomly shifted stored value still falls inside it.
///
/// The widening is a deliberate over-approximation. It does not handle
/// wraparound at the edges of the 32-bit range; workloads start at zero and
/// stay far from the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixWindow {
    pub field: usize,
    pub low: i64,
    pub high: i64,
}

impl MixWindow {
    fn build(field: usize, range: ValueRange) -> Self {
        let widened = range.widen(1i64 << field);
        Self {
            field,
            low: widened.low,
            high: widened.high,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let v = i64::from(doc.mix[self.field]);
        v >= self.low && v < self.high
    }
}

/// Predicate selecting documents of one client whose value lies in a range,
/// filtered down to multiples of `2^sparsity`, with widened windows over the
/// shard-key and index mix fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub client_id: ClientId,
    pub range: ValueRange,
    pub sparsity: u32,
    pub shard_key_window: MixWindow,
    pub index_window: MixWindow,
}

impl RangeQuery {
    pub fn build(
        client_id: ClientId,
        shard_key_mix: usize,
        index_mix: usize,
        range: ValueRange,
        sparsity: u32,
    ) -> Self {
        Self {
            client_id,
            range,
            sparsity,
            shard_key_window: MixWindow::build(shard_key_mix, range),
            index_window: MixWindow::build(index_mix, range),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let value = i64::from(doc.value);
        doc.client_id == self.client_id
            && self.range.contains(value)
            && value.rem_euclid(1i64 << self.sparsity) == 0
            && self.shard_key_window.matches(doc)
            && self.index_window.matches(doc)
    }
}

/// Predicate targeting a single document for update or delete: exact identity
/// on the value plus the same widened mix windows as a range query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointTarget {
    pub client_id: ClientId,
    pub value: i32,
    pub shard_key_window: MixWindow,
    pub index_window: MixWindow,
}

impl PointTarget {
    pub fn build(client_id: ClientId, shard_key_mix: usize, index_mix: usize, value: i32) -> Self {
        let range = ValueRange::from_pair(i64::from(value), i64::from(value) + 1);
        Self {
            client_id,
            value,
            shard_key_window: MixWindow::build(shard_key_mix, range),
            index_window: MixWindow::build(index_mix, range),
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.client_id == self.client_id
            && doc.value == self.value
            && self.shard_key_window.matches(doc)
            && self.index_window.matches(doc)
    }
}
