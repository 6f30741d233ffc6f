use super::*;
use crate::bpv7::{
    block::{Block, Data},
    bundle::{Bundle, Id},
    dtn_time::DtnTime,
    primary_block::FragmentInfo,
};
use std::collections::HashMap;
use std::sync::Mutex;

/// Counters exposed for observability.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FragmentationStats {
    pub fragmented_bundles: u64,
    pub created_fragments: u64,
    pub reassembled_bundles: u64,
    pub abandoned_sets: u64,
    pub duplicate_fragments: u64,
}

/// Accumulator for the fragments of one original bundle.
struct FragmentSet {
    total_len: u64,
    fragments: Vec<Arc<Bundle>>,
    expiry: DtnTime,
    complete: bool,
}

/// Splits oversized bundles for a link MTU and reassembles received
/// fragments into their original bundles.
pub struct FragmentationManager {
    sets: Mutex<HashMap<Id, FragmentSet>>,
    stats: Mutex<FragmentationStats>,
}

impl Default for FragmentationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentationManager {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(HashMap::new()),
            stats: Mutex::new(FragmentationStats::default()),
        }
    }

    /// Split `bundle` into fragments no larger than `max_fragment_size` when
    /// encoded.
    ///
    /// Returns an empty list when the bundle must not be fragmented, is an
    /// administrative record, or already fits.
    pub fn fragment(&self, bundle: &Bundle, max_fragment_size: usize) -> Vec<Bundle> {
        if bundle.primary.flags.do_not_fragment {
            debug!("bundle {} must not be fragmented", bundle.id());
            return Vec::new();
        }
        if bundle.is_admin_record() {
            debug!("administrative record must not be fragmented");
            return Vec::new();
        }
        if bundle.to_cbor().len() <= max_fragment_size {
            return Vec::new();
        }
        let Some(payload) = bundle.payload() else {
            warn!("bundle {} has no payload block, cannot fragment", bundle.id());
            return Vec::new();
        };

        let total_len = payload.len() as u64;
        let budget = payload_budget(bundle, max_fragment_size);
        let num_fragments = (total_len as usize).div_ceil(budget);

        debug!(
            "fragmenting bundle {} into {num_fragments} fragments, payload budget {budget}",
            bundle.id()
        );

        let mut fragments = Vec::with_capacity(num_fragments);
        for i in 0..num_fragments {
            let offset = i * budget;
            let end = (offset + budget).min(total_len as usize);

            let mut primary = bundle.primary.clone();
            primary.fragment = Some(FragmentInfo {
                offset: offset as u64,
                total_len,
            });

            let mut fragment = Bundle {
                primary,
                blocks: Vec::new(),
            };
            for block in replicated_blocks(bundle) {
                fragment.blocks.push(block.clone());
            }
            fragment.blocks.push(Block {
                number: 1,
                flags: bundle
                    .payload_block()
                    .map(|b| b.flags)
                    .unwrap_or_default(),
                crc_type: bundle
                    .payload_block()
                    .map(|b| b.crc_type)
                    .unwrap_or_default(),
                data: Data::Payload(payload[offset..end].into()),
            });
            fragments.push(fragment);
        }

        let mut stats = self.stats.lock().expect("stats lock");
        stats.fragmented_bundles += 1;
        stats.created_fragments += fragments.len() as u64;
        fragments
    }

    /// Record an arriving fragment, returning the reassembled original once
    /// coverage is total.
    ///
    /// Duplicate offsets are rejected, and fragments of an already expired
    /// set are discarded rather than resurrecting it.
    pub fn add_fragment(&self, fragment: Arc<Bundle>) -> Option<Bundle> {
        let Some(info) = fragment.primary.fragment else {
            warn!("bundle {} is not a fragment", fragment.id());
            return None;
        };
        if fragment.is_expired() {
            trace!("discarding expired fragment {}", fragment.id());
            return None;
        }

        let original_id = original_id(&fragment);

        let (reassembled, duplicate) = {
            let mut sets = self.sets.lock().expect("fragment sets lock");
            let set = sets.entry(original_id.clone()).or_insert_with(|| FragmentSet {
                total_len: info.total_len,
                fragments: Vec::new(),
                expiry: fragment.expiry(),
                complete: false,
            });
            set.expiry = set.expiry.min(fragment.expiry());

            if set
                .fragments
                .iter()
                .any(|f| f.primary.fragment.map(|i| i.offset) == Some(info.offset))
            {
                (None, true)
            } else {
                set.fragments.push(fragment);
                trace!(
                    "fragment {}/{} added for {original_id} ({} so far)",
                    info.offset,
                    set.total_len,
                    set.fragments.len()
                );
                (try_reassemble(set), false)
            }
        };

        if duplicate {
            debug!("duplicate fragment at offset {} for {original_id}", info.offset);
            self.stats.lock().expect("stats lock").duplicate_fragments += 1;
            return None;
        }
        if reassembled.is_some() {
            self.stats.lock().expect("stats lock").reassembled_bundles += 1;
        }
        reassembled
    }

    /// Drop every fragment set whose earliest expiration has passed;
    /// returns the count removed.
    pub fn cleanup(&self, now: DtnTime) -> usize {
        let mut sets = self.sets.lock().expect("fragment sets lock");
        let before = sets.len();
        let mut abandoned = 0;
        sets.retain(|id, set| {
            if now > set.expiry {
                if !set.complete {
                    debug!("abandoning incomplete fragment set {id}");
                    abandoned += 1;
                }
                false
            } else {
                true
            }
        });
        let removed = before - sets.len();
        drop(sets);
        self.stats.lock().expect("stats lock").abandoned_sets += abandoned;
        removed
    }

    pub fn stats(&self) -> FragmentationStats {
        *self.stats.lock().expect("stats lock")
    }
}

/// The per-fragment payload budget: the fragment size less the replicated
/// header overhead, floored at half the fragment size.
fn payload_budget(bundle: &Bundle, max_fragment_size: usize) -> usize {
    let mut overhead = bundle.primary.to_cbor().len();
    for block in replicated_blocks(bundle) {
        overhead += block.to_cbor().len();
    }
    if max_fragment_size > overhead {
        max_fragment_size - overhead
    } else {
        max_fragment_size / 2
    }
    .max(1)
}

fn replicated_blocks(bundle: &Bundle) -> impl Iterator<Item = &Block> {
    bundle
        .blocks
        .iter()
        .filter(|b| !matches!(b.data, Data::Payload(_)) && b.flags.must_replicate)
}

/// The bundle id the fragments reassemble into: the fragment's id with the
/// fragment fields zeroed.
pub fn original_id(fragment: &Bundle) -> Id {
    Id {
        fragment_offset: None,
        ..fragment.id()
    }
}

fn try_reassemble(set: &mut FragmentSet) -> Option<Bundle> {
    if set.complete {
        return None;
    }

    set.fragments.sort_by_key(|f| {
        f.primary.fragment.map(|i| i.offset).unwrap_or_default()
    });

    // Walk sorted fragments checking for gaps in coverage
    let mut covered = 0u64;
    for fragment in &set.fragments {
        let offset = fragment.primary.fragment.map(|i| i.offset).unwrap_or_default();
        if offset > covered {
            return None;
        }
        let len = fragment.payload().map(|p| p.len() as u64).unwrap_or_default();
        covered = covered.max(offset + len);
    }
    if covered < set.total_len {
        return None;
    }

    // Start from the first fragment's primary block with the fragment
    // fields removed
    let first = &set.fragments[0];
    let mut primary = first.primary.clone();
    primary.fragment = None;

    // Overlapping payload slices are permitted; the last writer wins
    let mut payload = vec![0u8; set.total_len as usize];
    for fragment in &set.fragments {
        let offset = fragment.primary.fragment.map(|i| i.offset).unwrap_or_default() as usize;
        if let Some(data) = fragment.payload() {
            payload[offset..offset + data.len()].copy_from_slice(data);
        }
    }

    let mut reassembled = Bundle {
        primary,
        blocks: Vec::new(),
    };
    for block in first
        .blocks
        .iter()
        .filter(|b| !matches!(b.data, Data::Payload(_)))
    {
        reassembled.blocks.push(block.clone());
    }
    reassembled.blocks.push(Block {
        number: 1,
        flags: first.payload_block().map(|b| b.flags).unwrap_or_default(),
        crc_type: first
            .payload_block()
            .map(|b| b.crc_type)
            .unwrap_or_default(),
        data: Data::Payload(payload.into()),
    });

    set.complete = true;
    Some(reassembled)
}
