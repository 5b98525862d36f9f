use anyhow::{anyhow, bail, Context};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::str::FromStr;

use crate::common::{Agent, INFINITY};

#[derive(Debug, Clone)]
pub struct Tile {
    passable: bool,
    pub neighbors: Vec<(usize, usize)>, // Stores coordinates of accessible neighbors
}

impl Tile {
    pub fn is_passable(&self) -> bool {
        self.passable
    }
}

/// Four-connected grid, addressed as `(row, column)`.
#[derive(Debug, Clone)]
pub struct Map {
    pub height: usize,
    pub width: usize,
    pub grid: Vec<Vec<Tile>>,
    /// Exact distances to a goal cell, keyed by that goal.
    pub heuristic: HashMap<(usize, usize), Vec<Vec<usize>>>,
}

impl FromStr for Map {
    type Err = anyhow::Error;

    /// Parses the MovingAI format: `type`, `height`, `width`, `map` header
    /// followed by one row per line, `.` passable and anything else blocked.
    fn from_str(content: &str) -> anyhow::Result<Self> {
        let mut lines = content.lines();

        let mut header_value = |name: &str| -> anyhow::Result<usize> {
            let line = lines
                .find(|line| line.starts_with(name))
                .ok_or_else(|| anyhow!("missing `{name}` line in map header"))?;
            line.split_whitespace()
                .last()
                .ok_or_else(|| anyhow!("missing value for `{name}`"))?
                .parse::<usize>()
                .with_context(|| format!("invalid value for `{name}`"))
        };
        let height = header_value("height")?;
        let width = header_value("width")?;

        if !lines.any(|line| line.trim() == "map") {
            bail!("missing `map` line in map header");
        }

        let mut grid = Vec::with_capacity(height);
        for line in lines.take(height) {
            let row: Vec<Tile> = line
                .trim_end()
                .chars()
                .map(|ch| Tile {
                    passable: ch == '.',
                    neighbors: Vec::new(),
                })
                .collect();
            if row.len() != width {
                bail!(
                    "map row {} has {} cells, expected {width}",
                    grid.len(),
                    row.len()
                );
            }
            grid.push(row);
        }
        if grid.len() != height {
            bail!("map has {} rows, expected {height}", grid.len());
        }

        let mut map = Map {
            height,
            width,
            grid,
            heuristic: HashMap::new(),
        };
        map.initialize_neighbors();
        Ok(map)
    }
}

impl Map {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("cannot read map file {path}"))?;
        content
            .parse()
            .with_context(|| format!("error with map file: {path}"))
    }

    /// Builds an in-memory map from rows of `.` (free) and `@` (obstacle).
    pub fn from_rows(rows: &[&str]) -> anyhow::Result<Self> {
        let width = rows.first().map_or(0, |row| row.len());
        let content = format!(
            "type octile\nheight {}\nwidth {width}\nmap\n{}",
            rows.len(),
            rows.join("\n")
        );
        content.parse()
    }

    fn initialize_neighbors(&mut self) {
        for x in 0..self.height {
            for y in 0..self.width {
                if self.grid[x][y].passable {
                    self.grid[x][y].neighbors = self.get_neighbors(x, y, false);
                }
            }
        }
    }

    pub fn get_neighbors(&self, x: usize, y: usize, allow_stay: bool) -> Vec<(usize, usize)> {
        let directions = [(-1, 0), (1, 0), (0, -1), (0, 1), (0, 0)]; // Up, down, left, right, stay
        let mut neighbors = Vec::new();

        for &(dx, dy) in &directions {
            if !allow_stay && dx == 0 && dy == 0 {
                continue;
            }
            let new_x = x as i64 + dx;
            let new_y = y as i64 + dy;
            if new_x >= 0
                && new_y >= 0
                && new_x < self.height as i64
                && new_y < self.width as i64
                && self.grid[new_x as usize][new_y as usize].passable
            {
                neighbors.push((new_x as usize, new_y as usize));
            }
        }

        neighbors
    }

    pub fn is_on_grid(&self, x: usize, y: usize) -> bool {
        x < self.height && y < self.width
    }

    pub fn is_passable(&self, x: usize, y: usize) -> bool {
        self.is_on_grid(x, y) && self.grid[x][y].is_passable()
    }

    /// Precomputes exact goal distances for every agent goal.
    pub fn compute_perfect_heuristic(&mut self, agents: &[Agent]) {
        for agent in agents {
            if !self.heuristic.contains_key(&agent.goal) {
                let table = self.heuristic_bfs(agent.goal);
                self.heuristic.insert(agent.goal, table);
            }
        }
    }

    pub fn heuristic_bfs(&self, goal: (usize, usize)) -> Vec<Vec<usize>> {
        let mut heuristic = vec![vec![INFINITY; self.width]; self.height];
        if !self.is_passable(goal.0, goal.1) {
            return heuristic;
        }
        let mut queue = VecDeque::new();

        heuristic[goal.0][goal.1] = 0;
        queue.push_back(goal);

        // Unit costs, so breadth-first order is distance order.
        while let Some((x, y)) = queue.pop_front() {
            let next_cost = heuristic[x][y] + 1;
            for &(new_x, new_y) in &self.grid[x][y].neighbors {
                if next_cost < heuristic[new_x][new_y] {
                    heuristic[new_x][new_y] = next_cost;
                    queue.push_back((new_x, new_y));
                }
            }
        }

        heuristic
    }

    /// Admissible distance from `from` to `goal`: the exact table when one
    /// was precomputed for `goal`, Manhattan distance otherwise. Returns
    /// [`INFINITY`] when the table proves `goal` unreachable.
    pub fn distance(&self, from: (usize, usize), goal: (usize, usize)) -> usize {
        if let Some(table) = self.heuristic.get(&goal) {
            return table[from.0][from.1];
        }
        from.0.abs_diff(goal.0) + from.1.abs_diff(goal.1)
    }

    /// [`Map::distance`] scaled by `weight`.
    pub fn weighted_distance(&self, from: (usize, usize), goal: (usize, usize), weight: f64) -> usize {
        let distance = self.distance(from, goal);
        if distance == INFINITY || weight == 1.0 {
            return distance;
        }
        (distance as f64 * weight).ceil() as usize
    }

    pub fn count_passable(&self) -> usize {
        self.grid
            .iter()
            .flatten()
            .filter(|tile| tile.is_passable())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_map() {
        let map = Map::from_rows(&["@@@@", "@..@", "@...", "@@.@"]).unwrap();

        assert_eq!(map.height, 4);
        assert_eq!(map.width, 4);
        assert_eq!(map.count_passable(), 6);

        assert!(!map.is_passable(0, 0));
        assert!(!map.is_passable(1, 0));
        assert!(!map.is_passable(0, 1));
        assert!(map.is_passable(1, 1));
        assert!(!map.is_passable(7, 1));

        let neighbors = map.get_neighbors(1, 1, false);
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors.contains(&(2, 1)));
        assert!(neighbors.contains(&(1, 2)));

        let neighbors = map.get_neighbors(1, 1, true);
        assert_eq!(neighbors.len(), 3);
        assert!(neighbors.contains(&(1, 1)));
    }

    #[test]
    fn test_parse_movingai_header() {
        let content = "type octile\nheight 2\nwidth 3\nmap\n..@\n...\n";
        let map: Map = content.parse().unwrap();
        assert_eq!((map.height, map.width), (2, 3));
        assert!(!map.is_passable(0, 2));
    }

    #[test]
    fn test_reject_short_row() {
        let content = "type octile\nheight 2\nwidth 3\nmap\n..\n...\n";
        assert!(content.parse::<Map>().is_err());
    }

    #[test]
    fn test_perfect_heuristic() {
        // Wall forces a detour around the right side.
        let mut map = Map::from_rows(&["...", "@@.", "..."]).unwrap();
        let agents = vec![Agent {
            id: 0,
            start: (0, 0),
            goal: (2, 0),
        }];
        assert_eq!(map.distance((0, 0), (2, 0)), 2);

        map.compute_perfect_heuristic(&agents);
        assert_eq!(map.distance((0, 0), (2, 0)), 6);
        assert_eq!(map.distance((2, 2), (2, 0)), 2);
        assert_eq!(map.distance((1, 0), (2, 0)), INFINITY);
        assert_eq!(map.weighted_distance((2, 2), (2, 0), 1.5), 3);
    }
}
