// SPDX-License-Identifier: Apache-2.0

//! Map state: tiles, cell occupancy, mine cells, per-team fog grids and
//! the queries the rest of the simulation builds on.
//!
//! Cell values layer several meanings onto one `u16`:
//! - values `< CELL_EMPTY` are entity ids occupying the cell,
//! - `CELL_EMPTY` is free ground,
//! - `CELL_BLOCKED` is impassable terrain,
//! - `CELL_UNREACHABLE` is a flood-fill-isolated island (blocked for
//!   placement, reclaimable when a ramp reconnects it),
//! - `CELL_DECORATION_0 + k` are cosmetic occupants that still block
//!   building placement.

pub mod fog;
pub mod gen;
pub mod pathfind;

use rustc_hash::FxHashMap;

use crate::entity::{Entity, EntityId, EntityType, IdArray, ID_NULL};
use crate::math::{ivec2, IVec2, Rect};
use crate::MAX_PLAYERS;

/// First non-entity cell value: free ground.
pub const CELL_EMPTY: u16 = ID_NULL;
/// Impassable terrain (walls, water, off-island).
pub const CELL_BLOCKED: u16 = CELL_EMPTY + 1;
/// Isolated island cell; treated like blocked for placement.
pub const CELL_UNREACHABLE: u16 = CELL_EMPTY + 2;
/// First of five decoration values.
pub const CELL_DECORATION_0: u16 = CELL_EMPTY + 3;

/// Number of distinct decoration values.
pub const DECORATION_COUNT: u16 = 5;

/// Tile sprites the simulation distinguishes. Rendering owns the pixels;
/// the simulation only needs sand/wall/ramp/water classes and the
/// stair range for `is_tile_ramp`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
#[allow(missing_docs)]
pub enum TileSprite {
    Sand = 0,
    Sand2,
    Sand3,
    WallNorthEdge,
    WallEastEdge,
    WallSouthEdge,
    WallWestEdge,
    WallNeCorner,
    WallNwCorner,
    WallSeCorner,
    WallSwCorner,
    WallNeInnerCorner,
    WallSeInnerCorner,
    WallSwInnerCorner,
    WallNwInnerCorner,
    WallSouthFront,
    WallSwFront,
    WallSeFront,
    // Ramp range: everything from here through WallWestStairBottom is
    // walkable stairs; `is_tile_ramp` tests this span.
    WallSouthStairLeft,
    WallSouthStairCenter,
    WallSouthStairRight,
    WallSouthStairFrontLeft,
    WallSouthStairFrontCenter,
    WallSouthStairFrontRight,
    WallNorthStairLeft,
    WallNorthStairCenter,
    WallNorthStairRight,
    WallEastStairTop,
    WallEastStairCenter,
    WallEastStairBottom,
    WallWestStairTop,
    WallWestStairCenter,
    WallWestStairBottom,
    /// Base water tile; the 47 autotile variants follow it.
    Water,
}

/// One map tile: sprite index plus elevation class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tile {
    /// Sprite index; `TileSprite` discriminant, plus an autotile offset
    /// for water variants.
    pub sprite: u16,
    /// Elevation class (0 low, 1 high, 2 cliff top).
    pub elevation: u8,
}

impl Tile {
    const SAND: Self = Self {
        sprite: TileSprite::Sand as u16,
        elevation: 0,
    };
}

/// Fog value: never seen.
pub const FOG_HIDDEN: i32 = 0;
/// Fog value: seen before, not covered now ("fog memory").
pub const FOG_EXPLORED: i32 = 1;
/// Smallest fog value meaning "actively revealed"; larger values count
/// additional overlapping sight sources.
pub const FOG_REVEALED_MIN: i32 = 2;

/// Snapshot of an entity taken as it fell out of a team's sight, used to
/// draw fog memory until the team sees the cell again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RememberedEntity {
    /// What was seen (render resolves the sprite from type + frame).
    pub entity_type: EntityType,
    /// Animation frame at the time of the snapshot.
    pub frame: IVec2,
    /// Owner at the time of the snapshot.
    pub player_id: u8,
    /// Top-left cell.
    pub cell: IVec2,
    /// Footprint edge length.
    pub cell_size: i32,
}

/// The authoritative map grids.
#[derive(Clone, Debug)]
pub struct Map {
    /// Width in cells.
    pub width: i32,
    /// Height in cells.
    pub height: i32,
    /// Row-major tiles.
    pub tiles: Vec<Tile>,
    /// Row-major occupancy values.
    pub cells: Vec<u16>,
    /// Parallel grid of planted land-mine ids (`ID_NULL` when none).
    pub mine_cells: Vec<EntityId>,
    /// Per-team sight reference counts.
    pub fog: [Vec<i32>; MAX_PLAYERS],
    /// Per-team detector coverage counts.
    pub detection: [Vec<i32>; MAX_PLAYERS],
    /// Per-team fog memory.
    pub remembered_entities: [FxHashMap<EntityId, RememberedEntity>; MAX_PLAYERS],
    /// Set whenever fog changed this tick; rendering clears it.
    pub is_fog_dirty: bool,
    /// Hall cell per player, fixed at bake time.
    pub player_spawns: [IVec2; MAX_PLAYERS],
}

impl Map {
    /// Creates an all-sand, all-empty map of the given dimensions.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let area = (width * height) as usize;
        Self {
            width,
            height,
            tiles: vec![Tile::SAND; area],
            cells: vec![CELL_EMPTY; area],
            mine_cells: vec![ID_NULL; area],
            fog: core::array::from_fn(|_| vec![FOG_HIDDEN; area]),
            detection: core::array::from_fn(|_| vec![0; area]),
            remembered_entities: core::array::from_fn(|_| FxHashMap::default()),
            is_fog_dirty: false,
            player_spawns: [ivec2(-1, -1); MAX_PLAYERS],
        }
    }

    #[inline]
    pub(crate) fn index(&self, cell: IVec2) -> usize {
        (cell.x + cell.y * self.width) as usize
    }

    /// Whether `cell` lies on the map.
    #[must_use]
    pub const fn is_cell_in_bounds(&self, cell: IVec2) -> bool {
        !(cell.x < 0 || cell.y < 0 || cell.x >= self.width || cell.y >= self.height)
    }

    /// Whether a `cell_size` square anchored at `cell` lies on the map.
    #[must_use]
    pub const fn is_cell_rect_in_bounds(&self, cell: IVec2, cell_size: i32) -> bool {
        !(cell.x < 0
            || cell.y < 0
            || cell.x + cell_size - 1 >= self.width
            || cell.y + cell_size - 1 >= self.height)
    }

    /// Tile at `cell` (caller guarantees bounds).
    #[must_use]
    pub fn get_tile(&self, cell: IVec2) -> Tile {
        self.tiles[self.index(cell)]
    }

    /// Occupancy value at `cell` (caller guarantees bounds).
    #[must_use]
    pub fn get_cell(&self, cell: IVec2) -> u16 {
        self.cells[self.index(cell)]
    }

    /// Writes `value` over a `cell_size` square anchored at `cell`.
    pub fn set_cell_rect(&mut self, cell: IVec2, cell_size: i32, value: u16) {
        for y in cell.y..cell.y + cell_size {
            for x in cell.x..cell.x + cell_size {
                let index = self.index(ivec2(x, y));
                self.cells[index] = value;
            }
        }
    }

    /// Whether every cell of the rect holds exactly `value`.
    #[must_use]
    pub fn is_cell_rect_equal_to(&self, cell: IVec2, cell_size: i32, value: u16) -> bool {
        for y in cell.y..cell.y + cell_size {
            for x in cell.x..cell.x + cell_size {
                if self.get_cell(ivec2(x, y)) != value {
                    return false;
                }
            }
        }
        true
    }

    /// Whether the tile at `cell` is part of a stair run.
    #[must_use]
    pub fn is_tile_ramp(&self, cell: IVec2) -> bool {
        let sprite = self.get_tile(cell).sprite;
        sprite >= TileSprite::WallSouthStairLeft as u16
            && sprite <= TileSprite::WallWestStairBottom as u16
    }

    /// Whether the rect sits on one elevation with no ramps inside it.
    #[must_use]
    pub fn is_cell_rect_same_elevation(&self, cell: IVec2, size: IVec2) -> bool {
        let base = self.get_tile(cell).elevation;
        for x in cell.x..cell.x + size.x {
            for y in cell.y..cell.y + size.y {
                if self.get_tile(ivec2(x, y)).elevation != base || self.is_tile_ramp(ivec2(x, y)) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether any cell of the rect is actively revealed to `team`.
    #[must_use]
    pub fn is_cell_rect_revealed(&self, team: usize, cell: IVec2, cell_size: i32) -> bool {
        for y in cell.y..cell.y + cell_size {
            for x in cell.x..cell.x + cell_size {
                if self.fog[team][self.index(ivec2(x, y))] >= FOG_REVEALED_MIN {
                    return true;
                }
            }
        }
        false
    }

    /// Fog value for `team` at `cell`.
    #[must_use]
    pub fn get_fog(&self, team: usize, cell: IVec2) -> i32 {
        self.fog[team][self.index(cell)]
    }

    /// Whether `team` has detector coverage at `cell`.
    #[must_use]
    pub fn is_cell_detected(&self, team: usize, cell: IVec2) -> bool {
        self.detection[team][self.index(cell)] > 0
    }
}

/// The occupancy rule, square variant.
///
/// Cells above `CELL_EMPTY` (blocked / unreachable / decoration) always
/// block. Cells holding an entity block unless the entity is a unit that
/// is close to `origin` (manhattan ≤ 5), with the mining-traffic
/// exception when `gold_walk` is set. `origin == (-1, -1)` disables the
/// own-rect carve-out.
#[must_use]
pub fn is_cell_rect_occupied(
    map: &Map,
    entities: &IdArray<Entity>,
    cell: IVec2,
    cell_size: i32,
    origin: IVec2,
    gold_walk: bool,
) -> bool {
    is_cell_rect_occupied_xy(
        map,
        entities,
        cell,
        ivec2(cell_size, cell_size),
        origin,
        gold_walk,
    )
}

/// The occupancy rule for an arbitrary `size` rect. See
/// [`is_cell_rect_occupied`].
#[must_use]
pub fn is_cell_rect_occupied_xy(
    map: &Map,
    entities: &IdArray<Entity>,
    cell: IVec2,
    size: IVec2,
    origin: IVec2,
    gold_walk: bool,
) -> bool {
    let origin_id = if origin.x == -1 {
        ID_NULL
    } else {
        map.get_cell(origin)
    };
    let origin_rect = Rect::new(origin, size);

    for y in cell.y..cell.y + size.y {
        for x in cell.x..cell.x + size.x {
            let cell_id = map.get_cell(ivec2(x, y));
            if cell_id > CELL_EMPTY {
                return true;
            }
            if cell_id == CELL_EMPTY || origin_rect.has_point(ivec2(x, y)) {
                continue;
            }
            let Some(entity) = entities.get_by_id(cell_id) else {
                return true;
            };
            if !entity.entity_type.is_unit() {
                return true;
            }
            if origin_id != ID_NULL && IVec2::manhattan_distance(origin, ivec2(x, y)) > 5 {
                continue;
            }
            if gold_walk && entity.is_mining() {
                continue;
            }

            return true;
        }
    }

    false
}

/// Nearest free cell for a `start_size` footprint on the ring around a
/// `rect_size` square at `rect_position`, measured from `start`. Walks
/// the ring deterministically (west edge down, south edge right, east
/// edge up, north edge left). Falls back to `start` when the ring is
/// full.
#[must_use]
pub fn get_nearest_cell_around_rect(
    map: &Map,
    entities: &IdArray<Entity>,
    start: IVec2,
    start_size: i32,
    rect_position: IVec2,
    rect_size: i32,
    gold_walk: bool,
    ignore_cell: Option<IVec2>,
) -> IVec2 {
    find_free_cell_around_rect(
        map,
        entities,
        start,
        start_size,
        rect_position,
        rect_size,
        gold_walk,
        ignore_cell,
    )
    .unwrap_or(start)
}

/// [`get_nearest_cell_around_rect`] without the start-cell fallback:
/// `None` means the whole ring is occupied. Exit placement (unloading,
/// mine exits, production spawns) uses this so a full ring is
/// distinguishable from a hit.
#[must_use]
pub fn find_free_cell_around_rect(
    map: &Map,
    entities: &IdArray<Entity>,
    start: IVec2,
    start_size: i32,
    rect_position: IVec2,
    rect_size: i32,
    gold_walk: bool,
    ignore_cell: Option<IVec2>,
) -> Option<IVec2> {
    let mut nearest_cell = start;
    let mut nearest_cell_dist = -1;

    let cell_begin = ring_begin(rect_position, rect_size, start_size);
    let cell_end = ring_end(rect_position, rect_size, start_size, &cell_begin);
    let cell_step = RING_STEPS;

    let mut index = 0;
    let mut cell = cell_begin[0];
    while index < 4 {
        if map.is_cell_rect_in_bounds(cell, start_size) && Some(cell) != ignore_cell {
            let occupied =
                is_cell_rect_occupied(map, entities, cell, start_size, ivec2(-1, -1), gold_walk);
            let dist = IVec2::manhattan_distance(start, cell);
            if !occupied && (nearest_cell_dist == -1 || dist < nearest_cell_dist) {
                nearest_cell = cell;
                nearest_cell_dist = dist;
            }
        }

        if cell == cell_end[index] {
            index += 1;
            if index < 4 {
                cell = cell_begin[index];
            }
        } else {
            cell += cell_step[index];
        }
    }

    if nearest_cell_dist == -1 {
        None
    } else {
        Some(nearest_cell)
    }
}

pub(crate) const RING_STEPS: [IVec2; 4] = [ivec2(0, 1), ivec2(1, 0), ivec2(0, -1), ivec2(-1, 0)];

pub(crate) fn ring_begin(rect_position: IVec2, rect_size: i32, start_size: i32) -> [IVec2; 4] {
    [
        rect_position + ivec2(-start_size, -(start_size - 1)),
        rect_position + ivec2(-(start_size - 1), rect_size),
        rect_position + ivec2(rect_size, rect_size - 1),
        rect_position + ivec2(rect_size - 1, -start_size),
    ]
}

pub(crate) fn ring_end(
    rect_position: IVec2,
    rect_size: i32,
    _start_size: i32,
    begin: &[IVec2; 4],
) -> [IVec2; 4] {
    [
        ivec2(begin[0].x, rect_position.y + rect_size - 1),
        ivec2(rect_position.x + rect_size - 1, begin[1].y),
        ivec2(begin[2].x, begin[0].y),
        ivec2(begin[0].x + 1, begin[3].y),
    ]
}

/// Nearest cell of a building footprint to `from` (where a builder will
/// stand to start construction).
#[must_use]
pub fn get_nearest_cell_in_rect(from: IVec2, rect_position: IVec2, rect_size: i32) -> IVec2 {
    let mut nearest = rect_position;
    let mut nearest_dist = IVec2::manhattan_distance(from, nearest);
    for y in rect_position.y..rect_position.y + rect_size {
        for x in rect_position.x..rect_position.x + rect_size {
            let dist = IVec2::manhattan_distance(from, ivec2(x, y));
            if dist < nearest_dist {
                nearest = ivec2(x, y);
                nearest_dist = dist;
            }
        }
    }
    nearest
}

#[cfg(test)]
mod tests {
    use super::{is_cell_rect_occupied, Map, TileSprite, CELL_BLOCKED, CELL_EMPTY};
    use crate::entity::{Entity, EntityMode, EntityType, IdArray};
    use crate::math::ivec2;

    fn empty_world() -> (Map, IdArray<Entity>) {
        (Map::new(16, 16), IdArray::new())
    }

    #[test]
    fn bounds_checks_cover_rects() {
        let (map, _) = empty_world();
        assert!(map.is_cell_in_bounds(ivec2(15, 15)));
        assert!(!map.is_cell_in_bounds(ivec2(16, 0)));
        assert!(map.is_cell_rect_in_bounds(ivec2(14, 14), 2));
        assert!(!map.is_cell_rect_in_bounds(ivec2(15, 14), 2));
    }

    #[test]
    fn blocked_cells_always_occupy() {
        let (mut map, entities) = empty_world();
        map.set_cell_rect(ivec2(4, 4), 1, CELL_BLOCKED);
        assert!(is_cell_rect_occupied(
            &map,
            &entities,
            ivec2(4, 4),
            1,
            ivec2(-1, -1),
            false
        ));
    }

    #[test]
    fn nearby_units_do_not_block_but_distant_ones_do() {
        let (mut map, mut entities) = empty_world();
        let id = entities.push(Entity::new(
            EntityType::Miner,
            0,
            ivec2(5, 5),
            EntityMode::UnitIdle,
        ));
        map.set_cell_rect(ivec2(5, 5), 1, id);

        // Origin adjacent to the unit: passable (transient sharing).
        assert!(!is_cell_rect_occupied(
            &map,
            &entities,
            ivec2(5, 5),
            1,
            ivec2(4, 5),
            false
        ));
        // Origin across the map: blocked.
        assert!(is_cell_rect_occupied(
            &map,
            &entities,
            ivec2(5, 5),
            1,
            ivec2(15, 15),
            false
        ));
        // No origin: blocked.
        assert!(is_cell_rect_occupied(
            &map,
            &entities,
            ivec2(5, 5),
            1,
            ivec2(-1, -1),
            false
        ));
    }

    #[test]
    fn buildings_block_regardless_of_distance() {
        let (mut map, mut entities) = empty_world();
        let id = entities.push(Entity::new(
            EntityType::House,
            0,
            ivec2(8, 8),
            EntityMode::BuildingFinished,
        ));
        map.set_cell_rect(ivec2(8, 8), 2, id);
        assert!(is_cell_rect_occupied(
            &map,
            &entities,
            ivec2(8, 8),
            1,
            ivec2(9, 7),
            false
        ));
    }

    #[test]
    fn ramp_detection_uses_the_stair_sprite_span() {
        let (mut map, _) = empty_world();
        let index = map.index(ivec2(3, 3));
        map.tiles[index].sprite = TileSprite::WallEastStairCenter as u16;
        assert!(map.is_tile_ramp(ivec2(3, 3)));
        map.tiles[index].sprite = TileSprite::WallEastEdge as u16;
        assert!(!map.is_tile_ramp(ivec2(3, 3)));
    }

    #[test]
    fn cell_value_layers_order_correctly() {
        assert!(CELL_BLOCKED > CELL_EMPTY);
        let (map, _) = empty_world();
        assert_eq!(map.get_cell(ivec2(0, 0)), CELL_EMPTY);
    }
}
