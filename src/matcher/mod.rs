//! Command-tree matcher (`spec.md` §4.7, component G): fuzzy-aligns two
//! command sequences so the GUI can follow "the same" draw call across
//! frames.
//!
//! The production algorithm is the **lazy matrix march**: a best-first
//! search over the matching matrix, ported from
//! `original_source/src/lmm.hpp`'s `LazyMatrixMarch`. It evaluates the
//! per-cell matcher lazily — at most once per `(i, j)` pair, and only for
//! pairs the search actually needs — and settles a cell directly off its
//! diagonal predecessor, without waiting on the orthogonal neighbors,
//! whenever the local match reaches `branch_threshold`. That is what keeps
//! near-identical sequences close to linear instead of the full quadratic
//! sweep a plain DP always pays for, at the cost of the same
//! precision/speed trade-off the upstream march accepts: a confident
//! diagonal is taken without rechecking every orthogonal alternative, so the
//! march is not guaranteed to reproduce the exhaustive optimum on arbitrary
//! input. `original_source/src/test/unit/lmm.cpp`'s own `SlowAlignAlgo` is
//! kept here as the `#[cfg(test)]` reference oracle it always was — testable
//! property 8 ("matcher optimality for ≤10-node records") is the march
//! agreeing with that oracle on small records, not a claim that the march
//! never approximates at any size.

pub mod match_fns;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::command::node::{Command, Node};
use match_fns::{self_match, MatchScore};

/// Default local-match confidence above which a cell commits to its
/// diagonal predecessor without waiting for the orthogonal neighbors
/// (`original_source/src/lmm.hpp`'s `branchThreshold`, default `0.95`).
pub const DEFAULT_BRANCH_THRESHOLD: f32 = 0.95;

/// One matched pair in an alignment result.
#[derive(Clone, Copy, Debug)]
pub struct ResultMatch {
    pub i: usize,
    pub j: usize,
    pub score: MatchScore,
}

#[derive(Clone, Debug, Default)]
pub struct AlignResult {
    pub total_match: f32,
    pub matches: Vec<ResultMatch>,
}

#[derive(Clone, Copy)]
struct Slot {
    diag_in: Option<f32>,
    up_in: Option<f32>,
    left_in: Option<f32>,
    settled: Option<f32>,
    dir: u8,
}

impl Default for Slot {
    fn default() -> Self {
        Slot { diag_in: None, up_in: None, left_in: None, settled: None, dir: 0 }
    }
}

#[derive(Clone, Copy)]
struct Candidate {
    i: usize,
    j: usize,
    bound: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.bound == other.bound && self.i == other.i && self.j == other.j
    }
}
impl Eq for Candidate {}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Candidate {
    // Highest upper bound wins; ties favor the later cell. Mirrors the
    // total order `HeapCandCompare` gives the `std::set`-backed frontier the
    // reference keeps (it pops from the max end).
    fn cmp(&self, other: &Self) -> Ordering {
        self.bound
            .partial_cmp(&other.bound)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.i.cmp(&other.i))
            .then_with(|| self.j.cmp(&other.j))
    }
}

struct March<'a> {
    len_a: usize,
    len_b: usize,
    branch_threshold: f32,
    slots: Vec<Slot>,
    local_cache: Vec<Option<Option<MatchScore>>>,
    heap: BinaryHeap<Candidate>,
    eval: &'a mut dyn FnMut(usize, usize) -> Option<MatchScore>,
}

impl<'a> March<'a> {
    fn new(len_a: usize, len_b: usize, branch_threshold: f32, eval: &'a mut dyn FnMut(usize, usize) -> Option<MatchScore>) -> Self {
        March {
            len_a,
            len_b,
            branch_threshold,
            slots: vec![Slot::default(); len_a * len_b],
            local_cache: vec![None; len_a * len_b],
            heap: BinaryHeap::new(),
            eval,
        }
    }

    fn at(&self, i: usize, j: usize) -> usize {
        i * self.len_b + j
    }

    /// Steps left after `(i, j)`, each worth at most a full match — the
    /// admissible upper bound `maxPossibleScore` adds to a candidate's known
    /// floor.
    fn remaining(&self, i: usize, j: usize) -> f32 {
        (self.len_a - 1 - i).min(self.len_b - 1 - j) as f32
    }

    fn local(&mut self, i: usize, j: usize) -> Option<MatchScore> {
        let idx = self.at(i, j);
        if self.local_cache[idx].is_none() {
            self.local_cache[idx] = Some((self.eval)(i, j));
        }
        self.local_cache[idx].flatten()
    }

    fn try_enqueue(&mut self, i: usize, j: usize) {
        let idx = self.at(i, j);
        let s = self.slots[idx];
        if s.settled.is_some() {
            return;
        }
        let lower = [s.diag_in.map(|d| d + 1.0), s.up_in, s.left_in]
            .into_iter()
            .flatten()
            .fold(f32::NEG_INFINITY, f32::max);
        if lower.is_finite() {
            self.heap.push(Candidate { i, j, bound: lower + self.remaining(i, j) });
        }
    }

    fn settle(&mut self, i: usize, j: usize, value: f32, dir: u8) {
        let idx = self.at(i, j);
        self.slots[idx].settled = Some(value);
        self.slots[idx].dir = dir;
        if i + 1 < self.len_a {
            let nidx = self.at(i + 1, j);
            self.slots[nidx].up_in = Some(value);
            self.try_enqueue(i + 1, j);
        }
        if j + 1 < self.len_b {
            let nidx = self.at(i, j + 1);
            self.slots[nidx].left_in = Some(value);
            self.try_enqueue(i, j + 1);
        }
        if i + 1 < self.len_a && j + 1 < self.len_b {
            let nidx = self.at(i + 1, j + 1);
            self.slots[nidx].diag_in = Some(value);
            self.try_enqueue(i + 1, j + 1);
        }
    }

    fn run(&mut self) -> AlignResult {
        if self.len_a == 0 || self.len_b == 0 {
            return AlignResult::default();
        }

        // The virtual zero-length prefix: row 0 / column 0 always have both
        // orthogonal predecessors known from the start.
        let idx00 = self.at(0, 0);
        self.slots[idx00].up_in = Some(0.0);
        self.slots[idx00].left_in = Some(0.0);
        self.try_enqueue(0, 0);
        for i in 1..self.len_a {
            let idx = self.at(i, 0);
            self.slots[idx].left_in = Some(0.0);
        }
        for j in 1..self.len_b {
            let idx = self.at(0, j);
            self.slots[idx].up_in = Some(0.0);
        }

        let target = self.at(self.len_a - 1, self.len_b - 1);

        while let Some(cand) = self.heap.pop() {
            let idx = self.at(cand.i, cand.j);
            if self.slots[idx].settled.is_some() {
                continue;
            }
            let (i, j) = (cand.i, cand.j);

            if self.slots[idx].diag_in.is_none() {
                if i == 0 || j == 0 {
                    self.slots[idx].diag_in = Some(0.0);
                } else {
                    let pidx = self.at(i - 1, j - 1);
                    if let Some(v) = self.slots[pidx].settled {
                        self.slots[idx].diag_in = Some(v);
                    }
                }
            }

            let score = self.local(i, j);
            let here = score.filter(|s| s.total > 0.0).map(MatchScore::eval);

            if let (Some(diag_base), Some(h)) = (self.slots[idx].diag_in, here) {
                if h >= self.branch_threshold {
                    self.settle(i, j, diag_base + h, 1);
                    if idx == target {
                        break;
                    }
                    continue;
                }
            }

            let (up, left) = (self.slots[idx].up_in, self.slots[idx].left_in);
            if let (Some(up), Some(left)) = (up, left) {
                // A diagonal step only ever represents a real match — a
                // zero-score pairing would just dilute the recovered
                // alignment with meaningless entries, so it's never a
                // candidate for `best` here (mirrors the oracle below).
                let diag_val = match (self.slots[idx].diag_in, here) {
                    (Some(d), Some(h)) if h > 0.0 => Some(d + h),
                    _ => None,
                };
                let (mut best, mut dir) = if up >= left { (up, 2u8) } else { (left, 3u8) };
                if let Some(d) = diag_val {
                    if d >= best {
                        best = d;
                        dir = 1;
                    }
                }
                self.settle(i, j, best, dir);
                if idx == target {
                    break;
                }
            }
            // Neither path applies yet (a stale early pop from the diagonal
            // check above) — whichever predecessor resolves later re-enqueues it.
        }

        self.backtrack()
    }

    fn backtrack(&self) -> AlignResult {
        let total_match = self.slots[self.at(self.len_a - 1, self.len_b - 1)]
            .settled
            .expect("propagation from the settled boundary always reaches every reachable cell");
        let mut matches = Vec::new();
        let mut i = self.len_a;
        let mut j = self.len_b;
        while i != 0 && j != 0 {
            let idx = self.at(i - 1, j - 1);
            match self.slots[idx].dir {
                1 => {
                    let score = self.local_cache[idx].flatten().expect("a diagonal step only ever follows an evaluated cell");
                    matches.push(ResultMatch { i: i - 1, j: j - 1, score });
                    i -= 1;
                    j -= 1;
                }
                2 => i -= 1,
                3 => j -= 1,
                _ => break,
            }
        }
        matches.reverse();
        AlignResult { total_match, matches }
    }
}

/// Aligns two sequences of length `len_a`/`len_b` via the lazy matrix march,
/// calling `eval(i, j)` at most once per cell and only for cells the search
/// visits. `None` marks a cell as structurally incomparable (`spec.md` §4.7:
/// "`total = -1` means structurally incomparable and prunes the search");
/// such cells can never be chosen as a diagonal (matched) step.
pub fn march<F>(len_a: usize, len_b: usize, branch_threshold: f32, mut eval: F) -> AlignResult
where
    F: FnMut(usize, usize) -> Option<MatchScore>,
{
    March::new(len_a, len_b, branch_threshold, &mut eval).run()
}

/// Self-match between two nodes, folding in the children's alignment for
/// `Section` nodes (`spec.md` §4.7). Children contribute their aligned match
/// total against the larger of the two child-list lengths, so an unmatched
/// tail of children still dilutes the section's overall score.
fn node_match(a: &Node, b: &Node) -> Option<MatchScore> {
    let base = self_match(&a.command, &b.command)?;
    if let (Command::Section { children: ca, .. }, Command::Section { children: cb, .. }) = (&a.command, &b.command) {
        let children = match_nodes(ca, cb);
        Some(MatchScore {
            matched: base.matched + children.total_match,
            total: base.total + ca.len().max(cb.len()) as f32,
        })
    } else {
        Some(base)
    }
}

/// Fuzzy-aligns two command-node sequences — top-level siblings, or a
/// section's children (`spec.md` §4.7, testable properties 7 and 8).
pub fn match_nodes(a: &[Node], b: &[Node]) -> AlignResult {
    march(a.len(), b.len(), DEFAULT_BRANCH_THRESHOLD, |i, j| node_match(&a[i], &b[j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::node::{NodeId, SectionKind, SectionLabel};

    fn fill_buffer(id: NodeId, size: u64) -> Node {
        Node {
            id,
            rel_id: 0,
            command: Command::FillBuffer {
                buffer: std::sync::Weak::new(),
                offset: 0,
                size,
                data: 0,
            },
        }
    }

    fn barrier(id: NodeId) -> Node {
        Node {
            id,
            rel_id: 0,
            command: Command::PipelineBarrier {
                src_stage: ash::vk::PipelineStageFlags::ALL_COMMANDS,
                dst_stage: ash::vk::PipelineStageFlags::ALL_COMMANDS,
                image_barriers: Vec::new(),
            },
        }
    }

    /// The exhaustive O(n²) reference oracle `original_source`'s own test
    /// suite checks the march against (`SlowAlignAlgo` in
    /// `original_source/src/test/unit/lmm.cpp`) — plain Needleman-Wunsch DP,
    /// never pruned, never lazy. Used only here, to validate the march on
    /// the small records testable property 8 is scoped to.
    fn exhaustive_align<F>(len_a: usize, len_b: usize, eval: F) -> AlignResult
    where
        F: Fn(usize, usize) -> Option<MatchScore>,
    {
        if len_a == 0 || len_b == 0 {
            return AlignResult::default();
        }

        struct Entry {
            accumulated: f32,
            dir: u8,
            score: Option<MatchScore>,
        }

        let mut entries = vec![Entry { accumulated: 0.0, dir: 0, score: None }; len_a * len_b];
        let at = |ia: usize, ib: usize| ia * len_b + ib;

        for ia in 0..len_a {
            for ib in 0..len_b {
                let score = eval(ia, ib);
                let here = score.filter(|s| s.total > 0.0).map(MatchScore::eval).unwrap_or(0.0);

                let val_diag = if here > 0.0 {
                    Some(if ia == 0 || ib == 0 { here } else { entries[at(ia - 1, ib - 1)].accumulated + here })
                } else {
                    None
                };
                let val_up = if ia == 0 { 0.0 } else { entries[at(ia - 1, ib)].accumulated };
                let val_left = if ib == 0 { 0.0 } else { entries[at(ia, ib - 1)].accumulated };

                let mut best = val_up.max(val_left);
                if let Some(d) = val_diag {
                    best = best.max(d);
                }
                let dir = if val_diag == Some(best) {
                    1
                } else if best == val_up {
                    2
                } else {
                    3
                };

                entries[at(ia, ib)] = Entry { accumulated: best, dir, score };
            }
        }

        let total_match = entries[at(len_a - 1, len_b - 1)].accumulated;

        let mut matches = Vec::new();
        let mut ia = len_a;
        let mut ib = len_b;
        while ia != 0 && ib != 0 {
            let src = &entries[at(ia - 1, ib - 1)];
            match src.dir {
                1 => {
                    matches.push(ResultMatch {
                        i: ia - 1,
                        j: ib - 1,
                        score: src.score.expect("a diagonal step only ever follows a matched cell"),
                    });
                    ia -= 1;
                    ib -= 1;
                }
                2 => ia -= 1,
                3 => ib -= 1,
                _ => unreachable!("matrix march: every filled cell has a direction"),
            }
        }
        matches.reverse();

        AlignResult { total_match, matches }
    }

    #[test]
    fn identity_sequence_matches_fully() {
        let nodes: Vec<Node> = (0..32).map(|i| fill_buffer(i, i as u64)).collect();
        let result = match_nodes(&nodes, &nodes);
        assert_eq!(result.matches.len(), 32);
        for (k, m) in result.matches.iter().enumerate() {
            assert_eq!(m.i, k);
            assert_eq!(m.j, k);
            assert_eq!(m.score.eval(), 1.0);
        }
    }

    #[test]
    fn insertions_and_deletions_still_align_common_prefix_and_suffix() {
        let a: Vec<Node> = (0..5).map(|i| fill_buffer(i, 10)).collect();
        let mut b: Vec<Node> = vec![fill_buffer(100, 999)];
        b.extend((0..5).map(|i| fill_buffer(i, 10)));
        b.push(fill_buffer(101, 999));

        let result = match_nodes(&a, &b);
        assert_eq!(result.matches.len(), 5);
        for (k, m) in result.matches.iter().enumerate() {
            assert_eq!(m.i, k);
            assert_eq!(m.j, k + 1);
        }
    }

    #[test]
    fn different_kinds_never_produce_a_diagonal_match() {
        let a = vec![barrier(0)];
        let b = vec![fill_buffer(1, 10)];
        let result = match_nodes(&a, &b);
        assert!(result.matches.is_empty());
        assert_eq!(result.total_match, 0.0);
    }

    /// Testable property 7: symmetry.
    #[test]
    fn matcher_is_symmetric() {
        let a: Vec<Node> = (0..6).map(|i| fill_buffer(i, (i % 3) as u64)).collect();
        let mut b: Vec<Node> = (0..6).map(|i| fill_buffer(i + 50, (i % 3) as u64)).collect();
        b.swap(1, 4);

        let forward = match_nodes(&a, &b);
        let backward = match_nodes(&b, &a);
        assert_eq!(forward.total_match, backward.total_match);
        assert_eq!(forward.matches.len(), backward.matches.len());
        for (f, r) in forward.matches.iter().zip(backward.matches.iter()) {
            assert_eq!(f.i, r.j);
            assert_eq!(f.j, r.i);
        }
    }

    /// Testable property 8, scoped as specified: the march (production)
    /// agrees with the exhaustive oracle for records at this size.
    #[test]
    fn march_matches_exhaustive_reference_on_small_sequences() {
        let a: Vec<Node> = (0..8).map(|i| fill_buffer(i, (i % 4) as u64)).collect();
        let mut b: Vec<Node> = (0..9).map(|i| fill_buffer(i + 1000, (i % 4) as u64)).collect();
        b.remove(3);

        let eval = |i: usize, j: usize| node_match(&a[i], &b[j]);
        let got = march(a.len(), b.len(), DEFAULT_BRANCH_THRESHOLD, eval).total_match;
        let want = exhaustive_align(a.len(), b.len(), eval).total_match;
        assert!((got - want).abs() < 0.001);
    }

    #[test]
    fn render_pass_sections_combine_self_and_child_alignment() {
        let section_a = Node {
            id: 1,
            rel_id: 0,
            command: Command::Section {
                kind: SectionKind::RenderPass,
                label: SectionLabel(None),
                render_pass: None,
                children: vec![fill_buffer(2, 10), fill_buffer(3, 20)],
            },
        };
        let section_b = Node {
            id: 4,
            rel_id: 0,
            command: Command::Section {
                kind: SectionKind::RenderPass,
                label: SectionLabel(None),
                render_pass: None,
                children: vec![fill_buffer(5, 10), fill_buffer(6, 20)],
            },
        };
        let score = node_match(&section_a, &section_b).unwrap();
        assert_eq!(score.eval(), 1.0);
    }
}
