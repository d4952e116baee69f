//! Route optimization passes.
//!
//! Both passes are heuristics: de-duplication shrinks a coordinate set by
//! removing stops reachable within one scan circle of another, and the
//! nearest-neighbour pass orders the survivors into a short traversal.
//! No optimality guarantee is made or required.

use crate::coord::{self, Coordinate};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

/// Default number of shuffled de-duplication attempts.
pub const DEFAULT_DEDUPE_ATTEMPTS: usize = 5;

/// Removes coordinates reachable within `circle_size_m` of another stop.
///
/// One pass repeatedly takes a coordinate, drops every remaining
/// coordinate within the circle, and appends the taken coordinate to the
/// output. With `attempts > 1` the whole pass is repeated on shuffled
/// input and the shortest output wins (fewer stops is better).
///
/// The output is never longer than the input, and no two output points
/// are within `circle_size_m` of each other.
pub fn dedupe(coords: &[Coordinate], circle_size_m: f64, attempts: usize) -> Vec<Coordinate> {
    let mut rng = rand::thread_rng();
    let mut best: Option<Vec<Coordinate>> = None;

    for attempt in 0..attempts.max(1) {
        let mut input: Vec<Coordinate> = coords.to_vec();
        if attempt > 0 {
            input.shuffle(&mut rng);
        }
        let candidate = dedupe_once(input, circle_size_m);
        match &best {
            Some(current) if candidate.len() >= current.len() => {}
            _ => best = Some(candidate),
        }
    }
    best.unwrap_or_default()
}

fn dedupe_once(input: Vec<Coordinate>, circle_size_m: f64) -> Vec<Coordinate> {
    let mut queue: VecDeque<Coordinate> = input.into();
    let mut output = Vec::new();
    while let Some(point) = queue.pop_front() {
        queue.retain(|other| coord::haversine_meters(&point, other) > circle_size_m);
        output.push(point);
    }
    output
}

/// Orders a coordinate set by greedy nearest-neighbour traversal.
///
/// Starting from a random index, repeatedly moves to whichever remaining
/// coordinate is closest to the current one. The result contains exactly
/// the input coordinates.
pub fn nearest_neighbor_order(coords: &[Coordinate]) -> Vec<Coordinate> {
    if coords.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<Coordinate> = coords.to_vec();
    let start = rand::thread_rng().gen_range(0..remaining.len());
    let mut current = remaining.swap_remove(start);
    let mut route = vec![current];

    while !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_dist = f64::MAX;
        for (idx, candidate) in remaining.iter().enumerate() {
            let d = coord::haversine_meters(&current, candidate);
            if d < best_dist {
                best_dist = d;
                best_idx = idx;
            }
        }
        current = remaining.swap_remove(best_idx);
        route.push(current);
    }
    route
}

/// De-duplicates then orders a coordinate set.
pub fn optimize(coords: &[Coordinate], circle_size_m: f64, attempts: usize) -> Vec<Coordinate> {
    nearest_neighbor_order(&dedupe(coords, circle_size_m, attempts))
}
