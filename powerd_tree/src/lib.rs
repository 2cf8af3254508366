//! Per-level reduction-tree communicator: send/receive policy down, sample
//! up, with overhead accounting and non-blocking "incomplete" semantics.
//!
//! Grounded on `examples/original_source/src/TreeComm.hpp` for the public
//! method/field shape, and on `communication`'s allocator pattern (build a
//! fixed `Vec` of per-index channel endpoints once, reuse every tick) for
//! the Rust channel idiom; the transport itself is a [`GroupChannel`] trait
//! with one in-process implementation, since a real network transport for
//! the tree is out of this core's scope (see SPEC_FULL.md §10.4).
//!
//! A level's "down" traffic is one channel per child (a parent writes each
//! child's slice separately; each child reads its own slice from a single
//! inbound channel). "Up" traffic is the mirror image: each child has one
//! outbound channel, and the parent reads all of them.

mod channel;
mod error;

pub use channel::{mpsc_pair, GroupChannel};
pub use error::Error;

use error::Result;

/// Maximum fan-out for a single level, mirroring `TreeComm::M_MAX_FAN_OUT`.
pub const MAX_FAN_OUT: usize = 16;

/// The channel endpoints a node needs for the levels it owns.
pub struct LevelChannels {
    /// Receives this node's own policy from its parent. `None` at the root
    /// level, whose policy instead comes from an external source.
    pub down_in: Option<Box<dyn GroupChannel>>,
    /// One sender per child, used by `send_down`.
    pub down_out: Vec<Box<dyn GroupChannel>>,
    /// Sends this node's aggregated sample to its parent. `None` at the
    /// root level, whose sample instead goes to an external sink.
    pub up_out: Option<Box<dyn GroupChannel>>,
    /// One receiver per child, used by `receive_up`.
    pub up_in: Vec<Box<dyn GroupChannel>>,
}

struct LevelState {
    fan_out: usize,
    num_send_down: usize,
    num_send_up: usize,
    channels: LevelChannels,
    last_policy: Vec<f64>,
    last_samples: Vec<Vec<f64>>,
    overhead_bytes: u64,
}

/// Per-level send-up/send-down with freshness tracking, owned by one node
/// for the levels it controls.
pub struct TreeComm {
    levels: Vec<LevelState>,
    root_level: usize,
}

impl TreeComm {
    /// Builds a tree communicator for the levels this node owns, indexed
    /// `0..fan_out.len()`. `fan_out[level]` is the number of children level
    /// `level` has; `num_send_down`/`num_send_up` fix the message vector
    /// lengths for that level.
    pub fn new(
        fan_out: Vec<usize>,
        num_send_down: Vec<usize>,
        num_send_up: Vec<usize>,
        channels: Vec<LevelChannels>,
    ) -> Self {
        assert_eq!(fan_out.len(), num_send_down.len());
        assert_eq!(fan_out.len(), num_send_up.len());
        assert_eq!(fan_out.len(), channels.len());
        let root_level = fan_out.len().saturating_sub(1);
        let levels = fan_out
            .into_iter()
            .zip(num_send_down)
            .zip(num_send_up)
            .zip(channels)
            .map(|(((fan_out, num_send_down), num_send_up), channels)| {
                assert_eq!(channels.down_out.len(), fan_out, "one down_out channel per child");
                assert_eq!(channels.up_in.len(), fan_out, "one up_in channel per child");
                LevelState {
                    fan_out,
                    num_send_down,
                    num_send_up,
                    channels,
                    last_policy: vec![f64::NAN; num_send_down],
                    last_samples: vec![vec![f64::NAN; num_send_up]; fan_out],
                    overhead_bytes: 0,
                }
            })
            .collect();
        TreeComm { levels, root_level }
    }

    pub fn num_level_controlled(&self) -> usize {
        self.levels.len()
    }

    pub fn root_level(&self) -> usize {
        self.root_level
    }

    pub fn max_level(&self) -> usize {
        self.levels.len()
    }

    pub fn level_size(&self, level: usize) -> Result<usize> {
        self.level(level).map(|l| l.fan_out)
    }

    /// This node's rank among its siblings at `level`. Always 0: a node
    /// owns at most one rank per level in this core (hierarchical
    /// federation across multiple ranks at one level is out of scope).
    pub fn level_rank(&self, level: usize) -> Result<usize> {
        self.level(level).map(|_| 0)
    }

    fn level(&self, level: usize) -> Result<&LevelState> {
        self.levels.get(level).ok_or(Error::LevelRange(level))
    }

    fn level_mut(&mut self, level: usize) -> Result<&mut LevelState> {
        self.levels.get_mut(level).ok_or(Error::LevelRange(level))
    }

    /// Sends `sample_vector` up from `level` to its parent. Length must
    /// equal that level's `num_send_up`. `level-range` if `level` is not
    /// owned, or if the level is root and has no `up_out` channel.
    pub fn send_up(&mut self, level: usize, sample_vector: &[f64]) -> Result<()> {
        let state = self.level_mut(level)?;
        if sample_vector.len() != state.num_send_up {
            return Err(Error::Invalid(format!(
                "send_up at level {level}: expected length {}, got {}",
                state.num_send_up,
                sample_vector.len()
            )));
        }
        let channel = state
            .channels
            .up_out
            .as_deref_mut()
            .ok_or_else(|| Error::Ordering(format!("level {level} has no parent to send up to")))?;
        channel.send(sample_vector.to_vec())?;
        state.overhead_bytes += (sample_vector.len() * std::mem::size_of::<f64>()) as u64;
        Ok(())
    }

    /// Sends one policy vector per child from `level` downward. The slice
    /// length must equal that level's fan-out; each vector's length must
    /// equal `num_send_down`.
    pub fn send_down(&mut self, level: usize, per_child_policy: &[Vec<f64>]) -> Result<()> {
        let state = self.level_mut(level)?;
        if per_child_policy.len() != state.fan_out {
            return Err(Error::Invalid(format!(
                "send_down at level {level}: expected {} children, got {}",
                state.fan_out,
                per_child_policy.len()
            )));
        }
        for child in per_child_policy {
            if child.len() != state.num_send_down {
                return Err(Error::Invalid(format!(
                    "send_down at level {level}: expected length {}, got {}",
                    state.num_send_down,
                    child.len()
                )));
            }
        }
        for (channel, policy) in state.channels.down_out.iter_mut().zip(per_child_policy) {
            channel.send(policy.clone())?;
            state.overhead_bytes += (policy.len() * std::mem::size_of::<f64>()) as u64;
        }
        Ok(())
    }

    /// Non-blocking: returns `false` (with `out_per_child_samples` left at
    /// the last known value) unless every child has produced a fresh
    /// message since the last call.
    pub fn receive_up(&mut self, level: usize, out_per_child_samples: &mut Vec<Vec<f64>>) -> Result<bool> {
        let state = self.level_mut(level)?;
        let mut samples = state.last_samples.clone();
        let mut all_fresh = !state.channels.up_in.is_empty();
        for (i, channel) in state.channels.up_in.iter_mut().enumerate() {
            match channel.try_recv()? {
                Some(v) => {
                    if v.len() != state.num_send_up {
                        return Err(Error::Invalid(format!(
                            "receive_up at level {level} child {i}: expected length {}, got {}",
                            state.num_send_up,
                            v.len()
                        )));
                    }
                    samples[i] = v;
                }
                None => all_fresh = false,
            }
        }
        state.last_samples = samples.clone();
        *out_per_child_samples = samples;
        Ok(all_fresh)
    }

    /// Non-blocking: returns `false` (with `out_policy` left at the last
    /// known value) if the parent has not produced a fresh policy yet, or
    /// if `level` is root (no parent: always stale).
    pub fn receive_down(&mut self, level: usize, out_policy: &mut Vec<f64>) -> Result<bool> {
        let state = self.level_mut(level)?;
        let channel = match state.channels.down_in.as_deref_mut() {
            Some(c) => c,
            None => {
                *out_policy = state.last_policy.clone();
                return Ok(false);
            }
        };
        match channel.try_recv()? {
            Some(policy) => {
                if policy.len() != state.num_send_down {
                    return Err(Error::Invalid(format!(
                        "receive_down at level {level}: expected length {}, got {}",
                        state.num_send_down,
                        policy.len()
                    )));
                }
                state.last_policy = policy.clone();
                *out_policy = policy;
                Ok(true)
            }
            None => {
                *out_policy = state.last_policy.clone();
                Ok(false)
            }
        }
    }

    /// Bytes sent by this node across all owned levels so far.
    pub fn overhead_send(&self) -> u64 {
        self.levels.iter().map(|l| l.overhead_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_of_two(down_in: Box<dyn GroupChannel>, up_out: Box<dyn GroupChannel>) -> TreeComm {
        TreeComm::new(
            vec![0],
            vec![2],
            vec![3],
            vec![LevelChannels { down_in: Some(down_in), down_out: vec![], up_out: Some(up_out), up_in: vec![] }],
        )
    }

    fn root_of_two() -> (TreeComm, TreeComm, TreeComm) {
        let (down_a_send, down_a_recv) = mpsc_pair();
        let (down_b_send, down_b_recv) = mpsc_pair();
        let (up_a_send, up_a_recv) = mpsc_pair();
        let (up_b_send, up_b_recv) = mpsc_pair();
        let root = TreeComm::new(
            vec![2],
            vec![2],
            vec![3],
            vec![LevelChannels {
                down_in: None,
                down_out: vec![down_a_send, down_b_send],
                up_out: None,
                up_in: vec![up_a_recv, up_b_recv],
            }],
        );
        let leaf_a = leaf_of_two(down_a_recv, up_a_send);
        let leaf_b = leaf_of_two(down_b_recv, up_b_send);
        (root, leaf_a, leaf_b)
    }

    #[test]
    fn level_range_is_checked() {
        let (mut root, _a, _b) = root_of_two();
        let mut buf = Vec::new();
        assert!(matches!(root.receive_down(5, &mut buf), Err(Error::LevelRange(5))));
    }

    #[test]
    fn send_down_length_mismatch_is_invalid() {
        let (mut root, _a, _b) = root_of_two();
        assert!(root.send_down(0, &[vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn root_has_no_parent_to_send_up_to() {
        let (mut root, _a, _b) = root_of_two();
        assert!(root.send_up(0, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn receive_up_without_send_reports_incomplete() {
        let (mut root, _a, _b) = root_of_two();
        let mut out = Vec::new();
        let fresh = root.receive_up(0, &mut out).unwrap();
        assert!(!fresh);
        assert_eq!(out.len(), 2);
        assert!(out[0].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn end_to_end_two_level_tree_two_children() {
        let (mut root, mut leaf_a, mut leaf_b) = root_of_two();

        root.send_down(0, &[vec![10.0, 20.0], vec![10.0, 20.0]]).unwrap();

        let mut policy_a = Vec::new();
        assert!(leaf_a.receive_down(0, &mut policy_a).unwrap());
        assert_eq!(policy_a, vec![10.0, 20.0]);
        let mut policy_b = Vec::new();
        assert!(leaf_b.receive_down(0, &mut policy_b).unwrap());
        assert_eq!(policy_b, vec![10.0, 20.0]);

        leaf_a.send_up(0, &[1.0, 2.0, 3.0]).unwrap();
        leaf_b.send_up(0, &[4.0, 5.0, 6.0]).unwrap();

        let mut samples = Vec::new();
        assert!(root.receive_up(0, &mut samples).unwrap());
        assert_eq!(samples, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);

        let summed: Vec<f64> = (0..3).map(|i| samples[0][i] + samples[1][i]).collect();
        assert_eq!(summed, vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn overhead_send_accumulates_bytes() {
        let (mut root, _a, _b) = root_of_two();
        assert_eq!(root.overhead_send(), 0);
        root.send_down(0, &[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert!(root.overhead_send() > 0);
    }
}
