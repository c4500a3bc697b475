//! Configuration exchange between replicas running in overlapping macrostate windows.
//!
//! Replicas never wait for each other. A replica either publishes its configuration for a
//! peer or tries to pick up what the peer published for it; anything missing, stale or
//! unreadable just means there is nothing to attempt this time.

use super::TrialOutcome;
use crate::core::io::record::{RecordWriter, Records};
use crate::core::io::traits::Restartable;
use crate::core::models::space::Space;
use crate::engine::criteria::{AcceptanceQuery, MoveTag};
use crate::engine::error::EngineError;
use crate::engine::mailbox::{Mailbox, restore_mailbox};
use crate::engine::rng::McRng;
use crate::engine::system::System;
use rand::Rng;
use tracing::{debug, warn};

/// Tolerance for matching the local order parameter against a registered overlap.
const ORDER_TOLERANCE: f64 = 1e-8;

/// A peer window sharing the macrostate `order` with this replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub order: f64,
    pub peer: usize,
    /// Peer β minus local β.
    pub dbeta: f64,
    /// Peer ln z minus local ln z.
    pub dlnz: f64,
}

#[derive(Debug, Clone)]
pub struct ReplicaSwap {
    rank: usize,
    overlaps: Vec<Overlap>,
    /// Line count of the first configuration published to each overlap; zero until then.
    published_lines: Vec<usize>,
    mailbox: Box<dyn Mailbox>,
}

impl ReplicaSwap {
    pub fn new(rank: usize, mailbox: Box<dyn Mailbox>) -> Self {
        Self {
            rank,
            overlaps: Vec::new(),
            published_lines: Vec::new(),
            mailbox,
        }
    }

    pub fn add_overlap(&mut self, order: f64, peer: usize, dbeta: f64, dlnz: f64) {
        self.overlaps.push(Overlap {
            order,
            peer,
            dbeta,
            dlnz,
        });
        self.published_lines.push(0);
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn overlaps(&self) -> &[Overlap] {
        &self.overlaps
    }

    fn key(from: usize, to: usize, order: f64) -> String {
        format!("swpp{}p{}o{}", from, to, order)
    }

    pub(super) fn attempt(&mut self, system: &mut System, rng: &mut McRng) -> Result<TrialOutcome, EngineError> {
        let order = system.space.n_molecules() as f64;
        let matching: Vec<usize> = self
            .overlaps
            .iter()
            .enumerate()
            .filter(|(_, o)| (o.order - order).abs() < ORDER_TOLERANCE)
            .map(|(i, _)| i)
            .collect();
        if matching.is_empty() {
            return Ok(TrialOutcome::Skipped);
        }
        let index = matching[rng.gen_range(0..matching.len())];
        let overlap = self.overlaps[index];

        if rng.uniform() < 0.5 {
            let payload = system.space.to_records().into_string();
            self.mailbox
                .put(&Self::key(self.rank, overlap.peer, order), &payload)?;
            if self.published_lines[index] == 0 {
                self.published_lines[index] = payload.lines().count();
            }
            return Ok(TrialOutcome::Skipped);
        }

        let key = Self::key(overlap.peer, self.rank, order);
        let Some(payload) = self.mailbox.try_get(&key)? else {
            debug!(key = %key, "No configuration published by peer yet.");
            return Ok(TrialOutcome::Skipped);
        };
        let lines = payload.lines().count();
        if lines == 0 || lines != self.published_lines[index] {
            warn!(key = %key, lines, expected = self.published_lines[index], "Skipping stale or partial configuration.");
            return Ok(TrialOutcome::Skipped);
        }
        let mut foreign = match Records::parse(&payload, key.as_str())
            .and_then(|records| {
                records.expect_class(Space::CLASS)?;
                Space::from_records(&records)
            }) {
            Ok(space) => space,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unreadable configuration.");
                return Ok(TrialOutcome::Skipped);
            }
        };

        let foreign_pair = system.pair.clone_onto(&foreign)?;
        let pe_new = foreign_pair.total();
        let de = pe_new - system.pair.total();
        let query = AcceptanceQuery {
            ln_ratio: order * overlap.dlnz - pe_new * overlap.dbeta - system.criteria.beta() * de,
            energy: pe_new,
            tag: MoveTag::Swap,
            macrostate: order,
        };

        if system.criteria.accept(&query, rng) {
            system.space.swap_configuration(&mut foreign)?;
            system.init_energy()?;
            self.mailbox.put(&key, &foreign.to_records().into_string())?;
            debug!(key = %key, config_id = system.space.config_id(), "Swapped configuration with peer.");
            Ok(TrialOutcome::Accepted)
        } else {
            Ok(TrialOutcome::Rejected)
        }
    }

    pub(super) fn write_records(&self, out: &mut RecordWriter) {
        out.record("rank", self.rank);
        out.record("nOverlaps", self.overlaps.len());
        for (i, (o, lines)) in self.overlaps.iter().zip(&self.published_lines).enumerate() {
            out.list(
                &format!("overlap{}", i),
                &[
                    o.order.to_string(),
                    o.peer.to_string(),
                    o.dbeta.to_string(),
                    o.dlnz.to_string(),
                    lines.to_string(),
                ],
            );
        }
        self.mailbox.write_records(out);
    }

    pub(super) fn from_records(records: &Records) -> Result<Self, EngineError> {
        let mut swap = Self::new(records.required("rank")?, restore_mailbox(records)?);
        let n: usize = records.required("nOverlaps")?;
        for i in 0..n {
            let key = format!("overlap{}", i);
            let fields: Vec<String> = records.list(&key)?;
            let parse = |s: &str| s.parse::<f64>().map_err(|_| records.invalid(&key, s));
            let [order, peer, dbeta, dlnz, lines] = fields.as_slice() else {
                return Err(records.invalid(&key, fields.join(" ")).into());
            };
            swap.add_overlap(
                parse(order.as_str())?,
                peer.parse().map_err(|_| records.invalid(&key, peer.as_str()))?,
                parse(dbeta.as_str())?,
                parse(dlnz.as_str())?,
            );
            swap.published_lines[i] = lines
                .parse()
                .map_err(|_| records.invalid(&key, lines.as_str()))?;
        }
        Ok(swap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures;
    use crate::engine::mailbox::MemoryMailbox;

    fn pair_of_replicas() -> (System, ReplicaSwap, System, ReplicaSwap) {
        let mailbox = MemoryMailbox::new();
        let mut space_a = fixtures::lattice_space(2, 3.0, false);
        space_a.set_config_id(1);
        let mut space_b = fixtures::lattice_space(2, 3.1, false);
        space_b.set_config_id(2);
        let a = fixtures::system(space_a, 8);
        let b = fixtures::system(space_b, 8);

        let mut swap_a = ReplicaSwap::new(0, Box::new(mailbox.clone()));
        swap_a.add_overlap(8.0, 1, 0.0, 0.0);
        let mut swap_b = ReplicaSwap::new(1, Box::new(mailbox));
        swap_b.add_overlap(8.0, 0, 0.0, 0.0);
        (a, swap_a, b, swap_b)
    }

    #[test]
    fn no_overlap_means_the_attempt_is_skipped() {
        let mut system = fixtures::system(fixtures::lattice_space(2, 3.0, false), 8);
        let mut swap = ReplicaSwap::new(0, Box::new(MemoryMailbox::new()));
        swap.add_overlap(3.0, 1, 0.0, 0.0);
        let mut rng = McRng::seed_from_u64(1);
        assert_eq!(swap.attempt(&mut system, &mut rng).unwrap(), TrialOutcome::Skipped);
    }

    #[test]
    fn replicas_eventually_exchange_configurations() {
        let (mut a, mut swap_a, mut b, mut swap_b) = pair_of_replicas();
        let mut rng_a = McRng::seed_from_u64(1);
        let mut rng_b = McRng::seed_from_u64(2);

        let mut swapped = false;
        for _ in 0..200 {
            let outcome_a = swap_a.attempt(&mut a, &mut rng_a).unwrap();
            let outcome_b = swap_b.attempt(&mut b, &mut rng_b).unwrap();
            fixtures::assert_consistent(&a);
            fixtures::assert_consistent(&b);
            if outcome_a == TrialOutcome::Accepted || outcome_b == TrialOutcome::Accepted {
                swapped = true;
                break;
            }
        }
        assert!(swapped);
        // Whichever replica accepted now carries the peer's configuration id.
        assert!(a.space.config_id() == 2 || b.space.config_id() == 1);
    }

    #[test]
    fn unpublished_peer_is_skipped() {
        let (mut a, mut swap_a, _, _) = pair_of_replicas();
        let mut rng = McRng::seed_from_u64(7);
        for _ in 0..20 {
            assert_eq!(swap_a.attempt(&mut a, &mut rng).unwrap(), TrialOutcome::Skipped);
        }
    }

    #[cfg(feature = "replica-exchange")]
    #[test]
    fn records_round_trip_overlaps_and_line_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = crate::engine::mailbox::FsMailbox::new(dir.path()).unwrap();
        let mut swap = ReplicaSwap::new(3, Box::new(mailbox));
        swap.add_overlap(12.0, 2, -0.01, 0.5);
        swap.published_lines[0] = 42;

        let mut out = RecordWriter::new();
        swap.write_records(&mut out);
        let restored = ReplicaSwap::from_records(&Records::parse(out.as_str(), "memory").unwrap()).unwrap();
        assert_eq!(restored.rank(), 3);
        assert_eq!(restored.overlaps(), swap.overlaps());
        assert_eq!(restored.published_lines, vec![42]);
    }
}
