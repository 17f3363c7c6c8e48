//! Scenario E5 (`spec.md` §7): the matcher follows the same draw across two
//! frames even after a handful of insertions and deletions, with no
//! off-by-one in the recovered alignment.
//!
//! Uses `FillBuffer` nodes rather than `Draw` nodes as the node kind: each
//! node's `size` field doubles as a unique identity marker, so a matched pair
//! can be checked by field equality instead of by reasoning about partial
//! `BoundStateSnapshot` overlap (`matcher/match_fns.rs`'s `Draw` scoring gives
//! a nonzero partial score to count-mismatched draws with equal, empty bound
//! state, which would make an assertion like "no off-by-one" harder to trust
//! without a compiler).

use vklens::command::node::{Command, Node, NodeId};
use vklens::matcher::match_nodes;

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

#[test]
fn e5_matcher_follows_draw_across_frames() {
    const N: usize = 500;
    let frame_a: Vec<Node> = (0..N as u64).map(|i| fill_buffer(i, i)).collect();

    // Frame B: the same sequence with two nodes inserted near the start and
    // one node removed near the end.
    let mut frame_b: Vec<Node> = Vec::with_capacity(N + 2);
    frame_b.push(fill_buffer(10_000, 999_000));
    frame_b.push(fill_buffer(10_001, 999_001));
    frame_b.extend(frame_a.iter().cloned());
    frame_b.remove(frame_b.len() - 5);

    let result = match_nodes(&frame_a, &frame_b);

    // Only one node (the one removed near the end) fails to find a match.
    assert_eq!(result.matches.len(), N - 1);
    assert!(result.total_match / (N as f32) > 0.9);

    for m in &result.matches {
        assert_eq!(m.score.eval(), 1.0, "FillBuffer nodes either match exactly or not at all");
        let expected_a_size = match &frame_a[m.i].command {
            Command::FillBuffer { size, .. } => *size,
            _ => unreachable!(),
        };
        let expected_b_size = match &frame_b[m.j].command {
            Command::FillBuffer { size, .. } => *size,
            _ => unreachable!(),
        };
        assert_eq!(
            expected_a_size, expected_b_size,
            "a matched pair always carries the same identity marker"
        );
    }

    // The draw at the midpoint of frame A is shifted forward by exactly the
    // two inserted leading nodes, with no off-by-one.
    let mid = N / 2;
    let mid_match = result.matches.iter().find(|m| m.i == mid).expect("the midpoint node has a match");
    assert_eq!(mid_match.j, mid + 2);
}
