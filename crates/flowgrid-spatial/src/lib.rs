//! Grid occupancy index for flow parts.
//!
//! Maps grid cells to the parts covering them, with multi-tile footprints,
//! rotation and optional map bounds. Parts live on layers: two parts may
//! share a cell only when their layers differ (a pipe under a wire). The
//! index implements [`SpatialQuery`], so a flow system can discover
//! adjacency straight from it.

use flowgrid_core::id::{NetworkFamilyId, NodeId};
use flowgrid_core::spatial::{Direction, GridPosition, SpatialQuery};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Width and height of a part, in cells, before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Footprint {
    pub width: u32,
    pub height: u32,
}

impl Footprint {
    pub fn single() -> Self {
        Self {
            width: 1,
            height: 1,
        }
    }

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// For quarter turns width and height are swapped.
    pub fn rotated(&self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::None | Rotation::Cw180 => *self,
            Rotation::Cw90 | Rotation::Cw270 => Self {
                width: self.height,
                height: self.width,
            },
        }
    }

    /// Every tile covered at `origin` (the top-left corner), row by row.
    pub fn tiles(self, origin: GridPosition) -> impl Iterator<Item = GridPosition> {
        let w = self.width as i32;
        let h = self.height as i32;
        (0..h).flat_map(move |dy| (0..w).map(move |dx| GridPosition::new(origin.x + dx, origin.y + dy)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    pub fn all() -> [Rotation; 4] {
        [
            Rotation::None,
            Rotation::Cw90,
            Rotation::Cw180,
            Rotation::Cw270,
        ]
    }

    pub fn rotate_cw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw90,
            Rotation::Cw90 => Rotation::Cw180,
            Rotation::Cw180 => Rotation::Cw270,
            Rotation::Cw270 => Rotation::None,
        }
    }

    pub fn rotate_ccw(self) -> Self {
        match self {
            Rotation::None => Rotation::Cw270,
            Rotation::Cw90 => Rotation::None,
            Rotation::Cw180 => Rotation::Cw90,
            Rotation::Cw270 => Rotation::Cw180,
        }
    }
}

/// Where and how a part sits on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub origin: GridPosition,
    pub footprint: Footprint,
    pub rotation: Rotation,
    pub layer: NetworkFamilyId,
}

impl Placement {
    pub fn tiles(self) -> impl Iterator<Item = GridPosition> {
        self.footprint.rotated(self.rotation).tiles(self.origin)
    }
}

/// Errors from spatial operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SpatialError {
    #[error("position is occupied on this layer")]
    Occupied,
    #[error("part is not placed on the grid")]
    NotPlaced,
    #[error("part is already placed on the grid")]
    AlreadyPlaced,
    #[error("footprint leaves the map at ({x}, {y})")]
    OutOfBounds { x: i32, y: i32 },
}

// ---------------------------------------------------------------------------
// SpatialIndex
// ---------------------------------------------------------------------------

/// Bidirectional map between cells and parts.
///
/// - `tiles`: (cell, layer) -> part covering it
/// - `placements`: part -> origin, footprint, rotation and layer
#[derive(Debug, Default)]
pub struct SpatialIndex {
    bounds: Option<(u32, u32)>,
    tiles: BTreeMap<(GridPosition, NetworkFamilyId), NodeId>,
    placements: SecondaryMap<NodeId, Placement>,
}

impl SpatialIndex {
    /// An unbounded index.
    pub fn new() -> Self {
        Self::default()
    }

    /// An index covering `0..width` by `0..height`.
    pub fn with_bounds(width: u32, height: u32) -> Self {
        Self {
            bounds: Some((width, height)),
            ..Self::default()
        }
    }

    pub fn bounds(&self) -> Option<(u32, u32)> {
        self.bounds
    }

    pub fn in_bounds(&self, pos: GridPosition) -> bool {
        match self.bounds {
            None => true,
            Some((w, h)) => {
                pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < w && (pos.y as u32) < h
            }
        }
    }

    // -- Placement --

    /// Place a part. Origin is the top-left corner after rotation.
    pub fn place(&mut self, node: NodeId, placement: Placement) -> Result<(), SpatialError> {
        if self.placements.contains_key(node) {
            return Err(SpatialError::AlreadyPlaced);
        }
        self.check_free(&placement)?;
        for tile in placement.tiles() {
            self.tiles.insert((tile, placement.layer), node);
        }
        self.placements.insert(node, placement);
        Ok(())
    }

    /// Place a single-cell part on `layer`.
    pub fn place_single(
        &mut self,
        node: NodeId,
        origin: GridPosition,
        layer: NetworkFamilyId,
    ) -> Result<(), SpatialError> {
        self.place(
            node,
            Placement {
                origin,
                footprint: Footprint::single(),
                rotation: Rotation::None,
                layer,
            },
        )
    }

    /// Remove a part, returning where it was.
    pub fn remove(&mut self, node: NodeId) -> Result<Placement, SpatialError> {
        let placement = self.placements.remove(node).ok_or(SpatialError::NotPlaced)?;
        for tile in placement.tiles() {
            self.tiles.remove(&(tile, placement.layer));
        }
        Ok(placement)
    }

    pub fn can_place(&self, placement: &Placement) -> bool {
        self.check_free(placement).is_ok()
    }

    fn check_free(&self, placement: &Placement) -> Result<(), SpatialError> {
        for tile in placement.tiles() {
            if !self.in_bounds(tile) {
                return Err(SpatialError::OutOfBounds {
                    x: tile.x,
                    y: tile.y,
                });
            }
            if self.tiles.contains_key(&(tile, placement.layer)) {
                return Err(SpatialError::Occupied);
            }
        }
        Ok(())
    }

    // -- Point queries --

    pub fn node_at(&self, pos: GridPosition, layer: NetworkFamilyId) -> Option<NodeId> {
        self.tiles.get(&(pos, layer)).copied()
    }

    /// Every part covering `pos`, in layer order.
    pub fn nodes_at(&self, pos: GridPosition) -> Vec<NodeId> {
        let low = (pos, NetworkFamilyId(u32::MIN));
        let high = (pos, NetworkFamilyId(u32::MAX));
        self.tiles.range(low..=high).map(|(_, node)| *node).collect()
    }

    pub fn placement(&self, node: NodeId) -> Option<&Placement> {
        self.placements.get(node)
    }

    pub fn is_occupied(&self, pos: GridPosition) -> bool {
        !self.nodes_at(pos).is_empty()
    }

    // -- Area queries --

    /// Unique parts with any tile inside the inclusive rectangle.
    pub fn nodes_in_rect(&self, min: GridPosition, max: GridPosition) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let low = (min, NetworkFamilyId(u32::MIN));
        let high = (max, NetworkFamilyId(u32::MAX));
        self.tiles
            .range(low..=high)
            .filter(|((pos, _), _)| pos.y >= min.y && pos.y <= max.y)
            .filter_map(|(_, node)| seen.insert(*node).then_some(*node))
            .collect()
    }

    // -- Adjacency --

    /// Parts on the same layer touching any edge tile of `node`.
    pub fn neighbors_4(&self, node: NodeId) -> Vec<(Direction, NodeId)> {
        let Some(placement) = self.placements.get(node) else {
            return Vec::new();
        };
        let own: BTreeSet<GridPosition> = placement.tiles().collect();
        let mut seen = BTreeSet::new();
        let mut result = Vec::new();
        for dir in Direction::all() {
            for tile in &own {
                let next = tile.step(dir);
                if own.contains(&next) {
                    continue;
                }
                if let Some(&other) = self.tiles.get(&(next, placement.layer))
                    && seen.insert((dir as u8, other))
                {
                    result.push((dir, other));
                }
            }
        }
        result
    }

    // -- Stats --

    pub fn node_count(&self) -> usize {
        self.placements.len()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }
}

impl SpatialQuery for SpatialIndex {
    fn cells_occupied_by(&self, node: NodeId) -> Vec<GridPosition> {
        self.placements
            .get(node)
            .map(|p| p.tiles().collect())
            .unwrap_or_default()
    }

    fn parts_at(&self, cell: GridPosition) -> Vec<NodeId> {
        self.nodes_at(cell)
    }

    fn is_in_bounds(&self, cell: GridPosition) -> bool {
        self.in_bounds(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn make_nodes(count: usize) -> (SlotMap<NodeId, ()>, Vec<NodeId>) {
        let mut sm = SlotMap::with_key();
        let ids: Vec<NodeId> = (0..count).map(|_| sm.insert(())).collect();
        (sm, ids)
    }

    const GROUND: NetworkFamilyId = NetworkFamilyId(0);
    const WIRES: NetworkFamilyId = NetworkFamilyId(1);

    fn at(x: i32, y: i32, footprint: Footprint, rotation: Rotation) -> Placement {
        Placement {
            origin: GridPosition::new(x, y),
            footprint,
            rotation,
            layer: GROUND,
        }
    }

    #[test]
    fn rotated_footprint_swaps_sides() {
        let fp = Footprint::new(3, 1);
        assert_eq!(fp.rotated(Rotation::Cw90), Footprint::new(1, 3));
        assert_eq!(fp.rotated(Rotation::Cw180), fp);
        for r in Rotation::all() {
            assert_eq!(r.rotate_cw().rotate_ccw(), r);
        }
    }

    #[test]
    fn placement_tiles_follow_rotation() {
        let tiles: Vec<GridPosition> = at(2, 3, Footprint::new(3, 1), Rotation::Cw270)
            .tiles()
            .collect();
        assert_eq!(
            tiles,
            vec![
                GridPosition::new(2, 3),
                GridPosition::new(2, 4),
                GridPosition::new(2, 5),
            ]
        );
        // Detached from any borrow of the placement.
        let owned = {
            let placement = at(0, 0, Footprint::new(2, 2), Rotation::None);
            placement.tiles()
        };
        assert_eq!(owned.count(), 4);
    }

    #[test]
    fn place_multi_tile_with_rotation() {
        let (_sm, ids) = make_nodes(1);
        let mut index = SpatialIndex::new();
        index
            .place(ids[0], at(5, 5, Footprint::new(2, 1), Rotation::Cw90))
            .unwrap();

        assert_eq!(index.node_at(GridPosition::new(5, 5), GROUND), Some(ids[0]));
        assert_eq!(index.node_at(GridPosition::new(5, 6), GROUND), Some(ids[0]));
        assert_eq!(index.node_at(GridPosition::new(6, 5), GROUND), None);
        assert_eq!(index.cells_occupied_by(ids[0]).len(), 2);
    }

    #[test]
    fn same_layer_overlap_is_rejected() {
        let (_sm, ids) = make_nodes(3);
        let mut index = SpatialIndex::new();
        index
            .place(ids[0], at(0, 0, Footprint::new(2, 2), Rotation::None))
            .unwrap();
        assert_eq!(
            index.place(ids[1], at(1, 1, Footprint::single(), Rotation::None)),
            Err(SpatialError::Occupied)
        );
        assert_eq!(
            index.place(ids[0], at(9, 9, Footprint::single(), Rotation::None)),
            Err(SpatialError::AlreadyPlaced)
        );

        assert!(index.is_occupied(GridPosition::new(1, 1)));
        assert!(!index.can_place(&at(1, 1, Footprint::single(), Rotation::None)));
        assert!(index.can_place(&at(2, 0, Footprint::single(), Rotation::None)));

        // A wire may share the cell.
        index.place_single(ids[2], GridPosition::new(1, 1), WIRES).unwrap();
        assert_eq!(index.parts_at(GridPosition::new(1, 1)), vec![ids[0], ids[2]]);
    }

    #[test]
    fn bounds_reject_and_report() {
        let (_sm, ids) = make_nodes(1);
        let mut index = SpatialIndex::with_bounds(4, 4);
        assert_eq!(
            index.place(ids[0], at(3, 0, Footprint::new(2, 1), Rotation::None)),
            Err(SpatialError::OutOfBounds { x: 4, y: 0 })
        );
        assert!(!index.is_in_bounds(GridPosition::new(-1, 0)));
        assert!(index.is_in_bounds(GridPosition::new(3, 3)));
        assert!(SpatialIndex::new().is_in_bounds(GridPosition::new(-50, 900)));
    }

    #[test]
    fn remove_frees_tiles() {
        let (_sm, ids) = make_nodes(2);
        let mut index = SpatialIndex::new();
        index
            .place(ids[0], at(0, 0, Footprint::new(2, 2), Rotation::None))
            .unwrap();
        let placement = index.remove(ids[0]).unwrap();
        assert_eq!(placement.origin, GridPosition::new(0, 0));
        assert_eq!(index.tile_count(), 0);
        assert_eq!(index.remove(ids[0]), Err(SpatialError::NotPlaced));
        index.place_single(ids[1], GridPosition::new(1, 1), GROUND).unwrap();
    }

    #[test]
    fn neighbors_stay_on_layer() {
        let (_sm, ids) = make_nodes(4);
        let mut index = SpatialIndex::new();
        index.place_single(ids[0], GridPosition::new(5, 5), GROUND).unwrap();
        index.place_single(ids[1], GridPosition::new(5, 4), GROUND).unwrap();
        index.place_single(ids[2], GridPosition::new(6, 5), WIRES).unwrap();
        index
            .place(ids[3], at(3, 5, Footprint::new(2, 2), Rotation::None))
            .unwrap();

        let neighbors = index.neighbors_4(ids[0]);
        assert_eq!(neighbors.len(), 2);
        assert!(neighbors.contains(&(Direction::North, ids[1])));
        assert!(neighbors.contains(&(Direction::West, ids[3])));
    }

    #[test]
    fn rect_query_deduplicates() {
        let (_sm, ids) = make_nodes(2);
        let mut index = SpatialIndex::new();
        index
            .place(ids[0], at(0, 0, Footprint::new(3, 3), Rotation::None))
            .unwrap();
        index.place_single(ids[1], GridPosition::new(10, 10), GROUND).unwrap();
        let found = index.nodes_in_rect(GridPosition::new(0, 0), GridPosition::new(4, 4));
        assert_eq!(found, vec![ids[0]]);
    }
}
