//! Topology Simulator
//! ==================
//!
//! A small participant graph. Node identity is durable for the lifetime of
//! the engine; the edge set is thrown away and regenerated wholesale, so
//! edges carry no identity of their own.
//!
//! Two update rules run on separate schedules:
//! - **drift**: size random walk in [20, 80], reward accrual, hue from reward
//! - **jitter**: position random walk clamped into [0.1, 0.9]², occasional rewiring

use crate::names;
use crate::rng::LcgRng;
use serde::{Deserialize, Serialize};

const POSITION_RANGE: (f64, f64) = (0.1, 0.9);
const SIZE_RANGE: (f64, f64) = (20.0, 80.0);
const JITTER_STEP: f64 = 0.01;
const ONE_HOUR_MS: i64 = 3_600_000;

/// Formats the node color for a hue.
fn hsl(hue: f64) -> String {
    format!("hsl({hue}, 70%, 60%)")
}

/// Hue derived from accumulated reward: `180 + (reward * 10) mod 100`.
pub fn hue_for_reward(reward: f64) -> f64 {
    180.0 + (reward * 10.0).rem_euclid(100.0)
}

/// A participant in the simulated network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    /// Normalized, within [0.1, 0.9]
    pub x: f64,
    /// Normalized, within [0.1, 0.9]
    pub y: f64,
    pub size: f64,
    pub hue: f64,
    pub color: String,
    /// Epoch ms
    pub last_activity: u64,
    pub total_rewards: f64,
}

/// An undirected-looking, ordered pair of node ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    /// Within [0.3, 1]
    pub strength: f64,
}

/// Full graph copy handed to consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Owns the node and edge sets.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl Topology {
    /// Generates 20-40 nodes and 15-30 edges.
    pub fn generate(rng: &mut LcgRng, now_ms: u64) -> Self {
        let count = rng.next_int(20, 40);
        let nodes = (0..count)
            .map(|i| {
                let user_id = names::user_id(rng);
                let user_name = names::user_name(rng);
                let x = rng.next_real(POSITION_RANGE.0, POSITION_RANGE.1);
                let y = rng.next_real(POSITION_RANGE.0, POSITION_RANGE.1);
                let size = rng.next_real(20.0, 60.0);
                let hue = rng.next_int(180, 280) as f64;
                let idle = rng.next_int(0, ONE_HOUR_MS) as u64;
                GraphNode {
                    id: format!("node-{i}"),
                    user_id,
                    user_name,
                    x,
                    y,
                    size,
                    hue,
                    color: hsl(hue),
                    last_activity: now_ms.saturating_sub(idle),
                    total_rewards: rng.next_real(0.5, 10.0),
                }
            })
            .collect();

        let mut topology = Self {
            nodes,
            edges: Vec::new(),
        };
        topology.regenerate_edges(rng);
        topology
    }

    /// Discards every edge and draws 15-30 fresh ones (endpoints with replacement).
    pub fn regenerate_edges(&mut self, rng: &mut LcgRng) {
        let count = rng.next_int(15, 30);
        let last = self.nodes.len() as i64 - 1;
        self.edges = (0..count)
            .filter_map(|_| {
                let from = self.nodes.get(rng.next_int(0, last) as usize)?.id.clone();
                let to = self.nodes.get(rng.next_int(0, last) as usize)?.id.clone();
                Some(GraphEdge {
                    from,
                    to,
                    strength: rng.next_real(0.3, 1.0),
                })
            })
            .collect();
    }

    /// Slow mutation: size walk, reward accrual, hue recomputation.
    pub fn drift(&mut self, rng: &mut LcgRng) {
        for node in &mut self.nodes {
            node.size = (node.size + rng.next_real(-2.0, 3.0)).clamp(SIZE_RANGE.0, SIZE_RANGE.1);
            node.total_rewards += rng.next_real(0.0, 0.1);
            node.hue = hue_for_reward(node.total_rewards);
            node.color = hsl(node.hue);
        }
    }

    /// Positional jitter; returns whether the edge set was regenerated.
    pub fn jitter(&mut self, rng: &mut LcgRng, rewire_probability: f64) -> bool {
        for node in &mut self.nodes {
            node.x = (node.x + rng.next_real(-JITTER_STEP, JITTER_STEP))
                .clamp(POSITION_RANGE.0, POSITION_RANGE.1);
            node.y = (node.y + rng.next_real(-JITTER_STEP, JITTER_STEP))
                .clamp(POSITION_RANGE.0, POSITION_RANGE.1);
        }
        let rewire = rng.chance(rewire_probability);
        if rewire {
            self.regenerate_edges(rng);
        }
        rewire
    }

    pub fn nodes(&self) -> Vec<GraphNode> {
        self.nodes.clone()
    }

    pub fn edges(&self) -> Vec<GraphEdge> {
        self.edges.clone()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes(),
            edges: self.edges(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_generation_bounds() {
        for seed in 0..50 {
            let mut rng = LcgRng::new(seed);
            let topo = Topology::generate(&mut rng, 10_000_000);
            assert!((20..=40).contains(&topo.node_count()));
            assert!((15..=30).contains(&topo.edge_count()));
            for node in topo.nodes() {
                assert!((0.1..=0.9).contains(&node.x) && (0.1..=0.9).contains(&node.y));
                assert!((180.0..=280.0).contains(&node.hue));
            }
            for edge in topo.edges() {
                assert!((0.3..1.0).contains(&edge.strength));
            }
        }
    }

    #[test]
    fn test_jitter_keeps_positions_and_node_identity() {
        let mut rng = LcgRng::new(12);
        let mut topo = Topology::generate(&mut rng, 0);
        let ids: Vec<_> = topo.nodes().into_iter().map(|n| n.id).collect();
        let mut rewired = 0;
        for _ in 0..500 {
            if topo.jitter(&mut rng, 0.3) {
                rewired += 1;
            }
            for node in topo.nodes() {
                assert!((0.1..=0.9).contains(&node.x) && (0.1..=0.9).contains(&node.y));
            }
            assert!((15..=30).contains(&topo.edge_count()));
        }
        let after: Vec<_> = topo.nodes().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, after);
        assert!(rewired > 0 && rewired < 500);
    }

    #[test]
    fn test_jitter_step_is_small() {
        let mut rng = LcgRng::new(13);
        let mut topo = Topology::generate(&mut rng, 0);
        let before = topo.nodes();
        topo.jitter(&mut rng, 0.0);
        for (a, b) in before.iter().zip(topo.nodes()) {
            assert!((a.x - b.x).abs() <= 0.01 + 1e-12);
            assert!((a.y - b.y).abs() <= 0.01 + 1e-12);
        }
    }

    #[test]
    fn test_drift_bounds_and_hue() {
        let mut rng = LcgRng::new(14);
        let mut topo = Topology::generate(&mut rng, 0);
        let before = topo.nodes();
        for _ in 0..300 {
            topo.drift(&mut rng);
        }
        for (a, b) in before.iter().zip(topo.nodes()) {
            assert!((20.0..=80.0).contains(&b.size));
            assert!(b.total_rewards >= a.total_rewards);
            assert_relative_eq!(b.hue, hue_for_reward(b.total_rewards));
            assert_eq!(b.color, format!("hsl({}, 70%, 60%)", b.hue));
        }
    }

    #[test]
    fn test_hue_wraps() {
        assert_relative_eq!(hue_for_reward(0.0), 180.0);
        assert_relative_eq!(hue_for_reward(12.5), 205.0);
        assert_relative_eq!(hue_for_reward(10.0), 180.0);
    }
}
