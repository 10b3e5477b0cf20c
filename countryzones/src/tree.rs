//! Country zone trees: how a country's zones agreed and diverged over time.
//!
//! The tree is grown newest-period-first: all of a country's histories end at
//! the same instant, so the synthetic root fans out into groups of zones
//! whose final periods are identical, each group fans out again where the
//! previous period differs, and so on back through time until a zone's
//! periods run out. Runs of unanimous periods are then compressed into
//! single nodes, and every node is labelled with its highest-priority member.
//!
//! The shape answers the two questions the resolver asks: do two zones tie
//! for the top priority anywhere (a clash the data maintainer must break),
//! and from which instant onward is each zone's behaviour indistinguishable
//! from a higher-priority survivor (its `not_used_after` metadata).
//!
//! Nodes live in an arena indexed by handles; traversal hands out handles in
//! pre-order and callers fold over them.

use std::collections::HashMap;

use thiserror::Error;

use crate::history::{PeriodKey, ZoneHistory};
use crate::Instant;

const ROOT: usize = 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("no zone histories supplied for {0}")]
    NoHistories(String),
    #[error("{country}: history for {zone_id} does not cover the shared window")]
    MisalignedHistory { country: String, zone_id: String },
    #[error(
        "{country}: zones {zones:?} ran out of periods while siblings kept going \
         ({offset} periods before the window end)"
    )]
    PartialPartition {
        country: String,
        zones: Vec<String>,
        offset: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("priority clashes in {country}: {clashes:?}")]
pub struct PriorityClashError {
    pub country: String,
    pub clashes: Vec<PriorityClash>,
}

/// A tie for the top priority among the zones of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityClash {
    pub zone_ids: Vec<String>,
    pub priority: u8,
}

/// Per-zone usage metadata derived from the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneUsage {
    /// The instant after which the zone behaves like `replaced_by`, or
    /// `None` while it is still distinct at the end of the window.
    pub not_used_after: Option<Instant>,
    /// The higher-priority zone that stands in for it from then on.
    pub replaced_by: Option<String>,
}

#[derive(Debug)]
struct Node {
    /// Indices into the tree's history list.
    zones: Vec<usize>,
    /// How many periods back from the window end this node's span starts.
    period_offset: usize,
    /// How many consecutive periods the node covers.
    period_count: usize,
    parent: usize,
    children: Vec<usize>,
    /// The unique highest-priority member, once finalized.
    primary: Option<usize>,
    clash: bool,
}

#[derive(Debug)]
pub struct ZoneTree {
    country: String,
    end: Instant,
    histories: Vec<ZoneHistory>,
    nodes: Vec<Node>,
}

impl ZoneTree {
    /// Builds the tree for one country. Every history must cover exactly
    /// `[start, end)`.
    pub fn build(
        country: &str,
        histories: Vec<ZoneHistory>,
        start: Instant,
        end: Instant,
    ) -> Result<ZoneTree, TreeError> {
        if histories.is_empty() {
            return Err(TreeError::NoHistories(country.to_owned()));
        }
        for history in &histories {
            let covers = history
                .periods()
                .first()
                .is_some_and(|p| p.start() == start)
                && history.periods().last().is_some_and(|p| p.end() == end);
            if !covers {
                return Err(TreeError::MisalignedHistory {
                    country: country.to_owned(),
                    zone_id: history.zone_id().to_owned(),
                });
            }
        }

        let root = Node {
            zones: (0..histories.len()).collect(),
            period_offset: 0,
            period_count: 0,
            parent: ROOT,
            children: Vec::new(),
            primary: None,
            clash: false,
        };
        let mut tree = ZoneTree {
            country: country.to_owned(),
            end,
            histories,
            nodes: vec![root],
        };
        tree.grow()?;
        tree.compress();
        tree.finalize();
        Ok(tree)
    }

    /// Splits each node's zones by the period one step further back, until
    /// every zone has run out of periods.
    fn grow(&mut self) -> Result<(), TreeError> {
        let mut stack = vec![ROOT];
        while let Some(handle) = stack.pop() {
            let offset = self.nodes[handle].period_offset;
            let members = self.nodes[handle].zones.clone();

            let mut groups: Vec<(PeriodKey, Vec<usize>)> = Vec::new();
            let mut exhausted = Vec::new();
            for zone in members {
                let history = &self.histories[zone];
                let len = history.periods().len();
                if offset >= len {
                    exhausted.push(zone);
                    continue;
                }
                let idx = len - (offset + 1);
                let key = history.key_over_range(idx, idx + 1);
                match groups.iter_mut().find(|(existing, _)| *existing == key) {
                    Some((_, group)) => group.push(zone),
                    None => groups.push((key, vec![zone])),
                }
            }

            if groups.is_empty() {
                // Every member agreed through its earliest period; this node
                // is their leaf.
                continue;
            }
            if !exhausted.is_empty() {
                return Err(TreeError::PartialPartition {
                    country: self.country.clone(),
                    zones: exhausted
                        .into_iter()
                        .map(|z| self.histories[z].zone_id().to_owned())
                        .collect(),
                    offset,
                });
            }

            for (_, group) in groups {
                let child = self.nodes.len();
                self.nodes.push(Node {
                    zones: group,
                    period_offset: offset + 1,
                    period_count: 1,
                    parent: handle,
                    children: Vec::new(),
                    primary: None,
                    clash: false,
                });
                self.nodes[handle].children.push(child);
                stack.push(child);
            }
        }
        Ok(())
    }

    /// Merges every single-child chain into its head node. The retained node
    /// absorbs the chain's period count and adopts the deepest node's
    /// children; detached nodes stay in the arena but are unreachable.
    fn compress(&mut self) {
        let mut stack = vec![ROOT];
        while let Some(handle) = stack.pop() {
            if handle != ROOT {
                while self.nodes[handle].children.len() == 1 {
                    let child = self.nodes[handle].children[0];
                    self.nodes[handle].period_count += self.nodes[child].period_count;
                    self.nodes[handle].period_offset = self.nodes[child].period_offset;
                    self.nodes[handle].children = std::mem::take(&mut self.nodes[child].children);
                    let grandchildren = self.nodes[handle].children.clone();
                    for grandchild in grandchildren {
                        self.nodes[grandchild].parent = handle;
                    }
                }
            }
            stack.extend(self.nodes[handle].children.iter().copied());
        }
    }

    fn finalize(&mut self) {
        let handles: Vec<usize> = self.preorder().collect();
        for handle in handles {
            let node = &self.nodes[handle];
            let top = node
                .zones
                .iter()
                .map(|&z| self.histories[z].priority())
                .max()
                .expect("nodes are never empty");
            let mut at_top = node
                .zones
                .iter()
                .copied()
                .filter(|&z| self.histories[z].priority() == top);
            let primary = at_top.next();
            let clash = at_top.next().is_some();
            let node = &mut self.nodes[handle];
            node.primary = primary;
            node.clash = clash;
        }
    }

    /// Handles of the real (non-root) nodes, parents before children.
    pub fn preorder(&self) -> Preorder<'_> {
        let mut stack = self.nodes[ROOT].children.clone();
        stack.reverse();
        Preorder { tree: self, stack }
    }

    /// The instant at which a node's newest period ends.
    fn end_instant(&self, handle: usize) -> Instant {
        let node = &self.nodes[handle];
        let periods = self.histories[node.zones[0]].periods();
        let newest_backward = node.period_offset - node.period_count;
        periods[periods.len() - 1 - newest_backward].end()
    }

    /// One report per node whose top priority is tied. An empty list means
    /// usage computation is safe.
    pub fn validate(&self) -> Vec<PriorityClash> {
        self.preorder()
            .filter(|&handle| self.nodes[handle].clash)
            .map(|handle| {
                let node = &self.nodes[handle];
                let priority = self.histories[node.primary.expect("finalized")].priority();
                PriorityClash {
                    zone_ids: node
                        .zones
                        .iter()
                        .filter(|&&z| self.histories[z].priority() == priority)
                        .map(|&z| self.histories[z].zone_id().to_owned())
                        .collect(),
                    priority,
                }
            })
            .collect()
    }

    /// Derives per-zone usage metadata. A node whose span ends at or before
    /// `end_cutoff` marks its zones as replaced by the parent's primary from
    /// that instant on; nodes hanging off the root count as running to the
    /// window end. The first (shallowest) entry for a zone wins, so a zone
    /// that is primary near the root keeps its still-in-use entry.
    pub fn compute_usage(
        &self,
        end_cutoff: Instant,
    ) -> Result<HashMap<String, ZoneUsage>, PriorityClashError> {
        let clashes = self.validate();
        if !clashes.is_empty() {
            return Err(PriorityClashError {
                country: self.country.clone(),
                clashes,
            });
        }

        let mut usage: HashMap<String, ZoneUsage> = HashMap::new();
        for handle in self.preorder() {
            let node = &self.nodes[handle];
            let under_root = node.parent == ROOT;
            let end = if under_root {
                self.end
            } else {
                self.end_instant(handle)
            };
            let entry = if end > end_cutoff {
                ZoneUsage {
                    not_used_after: None,
                    replaced_by: None,
                }
            } else {
                let replacement = (!under_root).then(|| {
                    let parent = &self.nodes[node.parent];
                    self.histories[parent.primary.expect("finalized")]
                        .zone_id()
                        .to_owned()
                });
                ZoneUsage {
                    not_used_after: Some(end),
                    replaced_by: replacement,
                }
            };

            if node.children.is_empty() {
                for &zone in &node.zones {
                    let _ = usage
                        .entry(self.histories[zone].zone_id().to_owned())
                        .or_insert_with(|| entry.clone());
                }
            } else {
                let primary = node.primary.expect("finalized");
                let _ = usage
                    .entry(self.histories[primary].zone_id().to_owned())
                    .or_insert(entry);
            }
        }
        Ok(usage)
    }
}

/// Pre-order walk over the real nodes of a [`ZoneTree`].
pub struct Preorder<'a> {
    tree: &'a ZoneTree,
    stack: Vec<usize>,
}

impl Iterator for Preorder<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let handle = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[handle].children.iter().rev().copied());
        Some(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ZoneHistory;
    use crate::rules::{CompiledZoneRules, ZoneOffset};

    fn offset(raw: i64, dst: i64, name: &str) -> ZoneOffset {
        ZoneOffset {
            raw_offset_ms: raw,
            dst_offset_ms: dst,
            name: name.to_owned(),
        }
    }

    /// Alternating EST/EDT every 100ms from the beginning of time.
    fn eastern() -> CompiledZoneRules {
        let rest = (1..10)
            .map(|i| {
                let dst = if i % 2 == 1 { 1000 } else { 0 };
                let name = if dst != 0 { "EDT" } else { "EST" };
                (i * 100, offset(-5000, dst, name))
            })
            .collect();
        CompiledZoneRules::new(offset(-5000, 0, "EST"), rest)
    }

    /// Its own schedule until 300, then identical to `eastern`.
    fn detroit() -> CompiledZoneRules {
        let rest = (3..10)
            .map(|i| {
                let dst = if i % 2 == 1 { 1000 } else { 0 };
                let name = if dst != 0 { "EDT" } else { "EST" };
                (i * 100, offset(-5000, dst, name))
            })
            .collect();
        CompiledZoneRules::new(offset(-6000, 0, "CST"), rest)
    }

    /// Constant until 600, then identical to `eastern`.
    fn indiana() -> CompiledZoneRules {
        let rest = (6..10)
            .map(|i| {
                let dst = if i % 2 == 1 { 1000 } else { 0 };
                let name = if dst != 0 { "EDT" } else { "EST" };
                (i * 100, offset(-5000, dst, name))
            })
            .collect();
        CompiledZoneRules::new(offset(-5000, 0, "IST"), rest)
    }

    /// Never agrees with anything above.
    fn pacific() -> CompiledZoneRules {
        CompiledZoneRules::new(offset(-8000, 0, "PST"), vec![])
    }

    fn history(rules: &CompiledZoneRules, id: &str, priority: i64) -> ZoneHistory {
        ZoneHistory::from_rules(rules, id, priority, 0, 1000).expect("valid priority")
    }

    fn us_like_tree() -> ZoneTree {
        ZoneTree::build(
            "us",
            vec![
                history(&eastern(), "America/New_York", 10),
                history(&detroit(), "America/Detroit", 1),
                history(&indiana(), "America/Indianapolis", 9),
                history(&pacific(), "America/Los_Angeles", 2),
            ],
            0,
            1000,
        )
        .expect("tree builds")
    }

    #[test]
    fn merged_zones_report_when_they_stopped_being_distinct() {
        let tree = us_like_tree();
        let usage = tree.compute_usage(900).expect("no clashes");

        assert_eq!(
            usage["America/New_York"],
            ZoneUsage {
                not_used_after: None,
                replaced_by: None
            }
        );
        assert_eq!(
            usage["America/Los_Angeles"],
            ZoneUsage {
                not_used_after: None,
                replaced_by: None
            }
        );
        assert_eq!(
            usage["America/Detroit"],
            ZoneUsage {
                not_used_after: Some(300),
                replaced_by: Some("America/New_York".to_owned())
            }
        );
        assert_eq!(
            usage["America/Indianapolis"],
            ZoneUsage {
                not_used_after: Some(600),
                replaced_by: Some("America/New_York".to_owned())
            }
        );
        assert_eq!(usage.len(), 4);
    }

    #[test]
    fn cutoff_hides_merges_beyond_it() {
        let tree = us_like_tree();
        let usage = tree.compute_usage(500).expect("no clashes");

        // Indiana only merged at 600, past the cutoff, so it reads as still
        // distinct; Detroit's 300 is within it.
        assert_eq!(usage["America/Indianapolis"].not_used_after, None);
        assert_eq!(usage["America/Detroit"].not_used_after, Some(300));
    }

    #[test]
    fn identical_zones_under_the_root_stay_in_use() {
        let tree = ZoneTree::build(
            "de",
            vec![
                history(&eastern(), "Europe/Berlin", 10),
                history(&eastern(), "Europe/Busingen", 1),
            ],
            0,
            1000,
        )
        .expect("tree builds");

        let usage = tree.compute_usage(900).expect("no clashes");
        assert_eq!(usage["Europe/Berlin"].not_used_after, None);
        assert_eq!(usage["Europe/Busingen"].not_used_after, None);
    }

    #[test]
    fn tied_top_priorities_are_reported_and_block_usage() {
        let tree = ZoneTree::build(
            "de",
            vec![
                history(&eastern(), "Europe/Berlin", 5),
                history(&eastern(), "Europe/Busingen", 5),
            ],
            0,
            1000,
        )
        .expect("tree builds");

        let clashes = tree.validate();
        assert_eq!(clashes.len(), 1);
        assert_eq!(clashes[0].priority, 5);
        assert_eq!(
            clashes[0].zone_ids,
            vec!["Europe/Berlin".to_owned(), "Europe/Busingen".to_owned()]
        );

        let err = tree.compute_usage(900).expect_err("clash blocks usage");
        assert_eq!(err.clashes, clashes);
    }

    #[test]
    fn lower_priority_twin_does_not_clash() {
        let tree = ZoneTree::build(
            "de",
            vec![
                history(&eastern(), "Europe/Berlin", 7),
                history(&eastern(), "Europe/Busingen", 1),
            ],
            0,
            1000,
        )
        .expect("tree builds");
        assert!(tree.validate().is_empty());
    }

    #[test]
    fn histories_must_cover_the_shared_window() {
        let short = ZoneHistory::from_rules(&eastern(), "America/New_York", 1, 100, 1000)
            .expect("valid priority");
        let err = ZoneTree::build("us", vec![short], 0, 1000).expect_err("misaligned");
        assert_eq!(
            err,
            TreeError::MisalignedHistory {
                country: "us".to_owned(),
                zone_id: "America/New_York".to_owned(),
            }
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            ZoneTree::build("us", vec![], 0, 1000).expect_err("empty"),
            TreeError::NoHistories("us".to_owned())
        );
    }

    #[test]
    fn preorder_visits_parents_before_children() {
        let tree = us_like_tree();
        let mut seen = Vec::new();
        for handle in tree.preorder() {
            let parent = tree.nodes[handle].parent;
            assert!(parent == ROOT || seen.contains(&parent));
            seen.push(handle);
        }
        assert!(!seen.is_empty());
    }
}
