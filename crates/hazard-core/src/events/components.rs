//! Connected-component labelling of exceedance masks.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Row/column neighbour offsets, 4-connected (N, E, S, W).
pub const N4_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

/// Row/column neighbour offsets, 8-connected (N, NE, E, SE, S, SW, W, NW).
pub const N8_OFFSETS: [(isize, isize); 8] = [(-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1), (-1, -1)];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    #[default]
    Eight,
}

impl Connectivity {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &N4_OFFSETS,
            Connectivity::Eight => &N8_OFFSETS,
        }
    }
}

/// One connected region of flagged cells. `cells` are row-major indices in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub cells: Vec<usize>,
}

impl Component {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Label every connected region of `true` cells. Components come out in
/// order of their lowest cell index.
pub fn connected_components(mask: &[bool], width: usize, height: usize, conn: Connectivity) -> Vec<Component> {
    debug_assert_eq!(mask.len(), width * height);
    let mut visited = vec![false; mask.len()];
    let mut out = Vec::new();
    let mut queue = VecDeque::new();

    for seed in 0..mask.len() {
        if !mask[seed] || visited[seed] {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        let mut cells = Vec::new();
        while let Some(i) = queue.pop_front() {
            cells.push(i);
            let (r, c) = ((i / width) as isize, (i % width) as isize);
            for &(dr, dc) in conn.offsets() {
                let nr = r + dr;
                let nc = c + dc;
                if nr < 0 || nc < 0 || nr >= height as isize || nc >= width as isize {
                    continue;
                }
                let j = nr as usize * width + nc as usize;
                if mask[j] && !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }
        cells.sort_unstable();
        out.push(Component { cells });
    }
    out
}
