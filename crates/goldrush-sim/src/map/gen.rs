// SPDX-License-Identifier: Apache-2.0

//! Procedural map baker: quantized noise in, tiled map with ramps,
//! spawns, gold and decorations out.
//!
//! The passes and their order are observable: every LCG draw here shifts
//! the stream for everything after it, so the sequence (shore cleanup →
//! gap widening → artifact demotion → tile bake with re-bake loop →
//! south fronts → ramps → blocking → flood fill → spawns → gold disk →
//! decoration disk) is as much a part of the contract as the outputs.

use crate::entity::{Entity, EntityMode, EntityType, IdArray, PLAYER_NONE};
use crate::map::{
    is_cell_rect_occupied, is_cell_rect_occupied_xy, Map, TileSprite, CELL_BLOCKED,
    CELL_DECORATION_0, CELL_EMPTY, CELL_UNREACHABLE,
};
use crate::math::{ivec2, Direction, IVec2, Lcg, DIRECTION_COUNT, DIRECTION_MASK};
use crate::noise::NoiseMap;
use crate::MAX_PLAYERS;

/// Gold stocked in every mine at bake time.
pub const GOLD_MINE_STARTING_GOLD: u32 = 5000;

const WATER_WALL_DIST: i32 = 4;
const ELEVATION_NEAR_DIST: i32 = 4;
const PLAYER_SPAWN_SIZE: i32 = 11;
const PLAYER_SPAWN_MARGIN: i32 = 11;
const STAIR_RADIUS: i32 = 2;
const DECORATION_DISK_RADIUS: i32 = 16;

fn wall_autotile_lookup(neighbors: u32) -> Option<TileSprite> {
    match neighbors {
        1 | 3 | 129 | 131 => Some(TileSprite::WallNorthEdge),
        4 | 6 | 12 | 14 => Some(TileSprite::WallEastEdge),
        16 | 24 | 48 | 56 => Some(TileSprite::WallSouthEdge),
        64 | 96 | 192 | 224 => Some(TileSprite::WallWestEdge),
        7 | 15 | 135 | 143 | 66 => Some(TileSprite::WallNeCorner),
        193 | 195 | 225 | 227 | 132 => Some(TileSprite::WallNwCorner),
        112 | 120 | 240 | 248 | 72 => Some(TileSprite::WallSwCorner),
        28 | 30 | 60 | 62 | 36 => Some(TileSprite::WallSeCorner),
        2 => Some(TileSprite::WallNeInnerCorner),
        8 => Some(TileSprite::WallSeInnerCorner),
        32 => Some(TileSprite::WallSwInnerCorner),
        128 => Some(TileSprite::WallNwInnerCorner),
        _ => None,
    }
}

// A diagonal neighbor bit is only expressible when both flanking
// cardinals are set; 47 of the 256 masks survive that rule.
fn is_canonical_water_mask(mask: u32) -> bool {
    for diagonal in [1_usize, 3, 5, 7] {
        if mask & DIRECTION_MASK[diagonal] == 0 {
            continue;
        }
        let prev = DIRECTION_MASK[diagonal - 1];
        let next = DIRECTION_MASK[(diagonal + 1) % DIRECTION_COUNT];
        if mask & prev == 0 || mask & next == 0 {
            return false;
        }
    }
    true
}

// Autotile offset: the rank of this mask among the canonical masks, so
// every peer maps the 47 variants identically without a shared table.
fn water_autotile_offset(mask: u32) -> u16 {
    debug_assert!(is_canonical_water_mask(mask));
    (0..mask).filter(|&m| is_canonical_water_mask(m)).count() as u16
}

#[derive(Clone)]
struct PoissonDiskParams {
    avoid_values: Vec<i32>,
    disk_radius: i32,
    allow_unreachable_cells: bool,
    margin: IVec2,
}

fn poisson_is_point_valid(map: &Map, params: &PoissonDiskParams, point: IVec2) -> bool {
    if point.x < params.margin.x
        || point.x >= map.width - params.margin.x
        || point.y < params.margin.y
        || point.y >= map.height - params.margin.y
    {
        return false;
    }

    let cell = map.get_cell(point);
    if cell == CELL_UNREACHABLE {
        if !params.allow_unreachable_cells {
            return false;
        }
    } else if cell != CELL_EMPTY {
        return false;
    }
    if map.is_tile_ramp(point) {
        return false;
    }

    for nx in point.x - params.disk_radius..=point.x + params.disk_radius {
        for ny in point.y - params.disk_radius..=point.y + params.disk_radius {
            let near_point = ivec2(nx, ny);
            if !map.is_cell_in_bounds(near_point) {
                continue;
            }
            let avoid_value = params.avoid_values[map.index(near_point)];
            if avoid_value != 0 && IVec2::manhattan_distance(point, near_point) <= avoid_value {
                return false;
            }
        }
    }

    true
}

fn poisson_disk(map: &Map, lcg: &mut Lcg, mut params: PoissonDiskParams) -> Vec<IVec2> {
    let mut sample = Vec::new();
    let mut frontier = Vec::new();

    let mut first;
    loop {
        first = ivec2(
            1 + lcg.rand() % (map.width - 2),
            1 + lcg.rand() % (map.height - 2),
        );
        if poisson_is_point_valid(map, &params, first) {
            break;
        }
    }

    frontier.push(first);
    sample.push(first);
    params.avoid_values[map.index(first)] = params.disk_radius;

    // Candidate offsets: a Bresenham circle at the disk radius.
    let mut circle_offset_points = Vec::new();
    {
        let mut x = 0;
        let mut y = params.disk_radius;
        let mut d = 3 - 2 * params.disk_radius;
        push_circle_octants(&mut circle_offset_points, x, y);
        while y >= x {
            if d > 0 {
                y -= 1;
                d += 4 * (x - y) + 10;
            } else {
                d += 4 * x + 6;
            }
            x += 1;
            push_circle_octants(&mut circle_offset_points, x, y);
        }
    }

    while !frontier.is_empty() {
        let next_index = (lcg.rand() % frontier.len() as i32) as usize;
        let next = frontier[next_index];

        let mut child_attempts = 0;
        let mut child_is_valid = false;
        let mut child = next;
        while !child_is_valid && child_attempts < 30 {
            child_attempts += 1;
            child = next + circle_offset_points[(lcg.rand() % circle_offset_points.len() as i32) as usize];
            child_is_valid = poisson_is_point_valid(map, &params, child);
        }
        if child_is_valid {
            frontier.push(child);
            sample.push(child);
            params.avoid_values[map.index(child)] = params.disk_radius;
        } else {
            frontier.remove(next_index);
        }
    }

    sample
}

fn push_circle_octants(points: &mut Vec<IVec2>, x: i32, y: i32) {
    points.push(ivec2(x, y));
    points.push(ivec2(-x, y));
    points.push(ivec2(x, -y));
    points.push(ivec2(-x, -y));
    points.push(ivec2(y, x));
    points.push(ivec2(-y, x));
    points.push(ivec2(y, -x));
    points.push(ivec2(-y, -x));
}

/// Creates a gold mine entity and stamps its footprint into the cell grid.
pub fn create_gold_mine(
    map: &mut Map,
    entities: &mut IdArray<Entity>,
    cell: IVec2,
    gold: u32,
) -> crate::entity::EntityId {
    let mut mine = Entity::new(EntityType::GoldMine, PLAYER_NONE, cell, EntityMode::Gold);
    mine.gold_held = gold;
    let id = entities.push(mine);
    map.set_cell_rect(cell, EntityType::GoldMine.cell_size(), id);
    id
}

/// Bakes the whole map from quantized noise. `gold_disk_radius` comes
/// from the match's map-size setting (42 or 48).
pub fn map_init(
    map: &mut Map,
    entities: &mut IdArray<Entity>,
    lcg: &mut Lcg,
    noise: &NoiseMap,
    gold_disk_radius: i32,
) {
    // The baker owns a mutable copy of the quantized grid; cleanup passes
    // rewrite it before tiles are baked from it.
    let mut noise_map = noise.map.clone();
    let width = map.width;
    let height = map.height;
    let noise_at = |grid: &[i8], cell: IVec2| grid[(cell.x + cell.y * width) as usize];

    // Clear out water that is too close to walls.
    for x in 0..width {
        for y in 0..height {
            if noise_map[(x + y * width) as usize] != -1 {
                continue;
            }

            let mut is_too_close_to_wall = false;
            'scan: for nx in x - WATER_WALL_DIST..=x + WATER_WALL_DIST {
                for ny in y - WATER_WALL_DIST..=y + WATER_WALL_DIST {
                    if !map.is_cell_in_bounds(ivec2(nx, ny)) {
                        continue;
                    }
                    if noise_at(&noise_map, ivec2(nx, ny)) > 0
                        && IVec2::manhattan_distance(ivec2(x, y), ivec2(nx, ny)) <= WATER_WALL_DIST
                    {
                        is_too_close_to_wall = true;
                        break 'scan;
                    }
                }
            }
            if is_too_close_to_wall {
                noise_map[(x + y * width) as usize] = 0;
            }
        }
    }

    // Widen gaps that are too narrow.
    for y in 0..height {
        for x in 0..width {
            let here = noise_map[(x + y * width) as usize];
            if here == -1 || here == 2 {
                continue;
            }

            for direction in [Direction::North, Direction::East, Direction::South, Direction::West]
            {
                let wall = ivec2(x, y) + direction.step();
                if !map.is_cell_in_bounds(wall) {
                    continue;
                }
                if noise_at(&noise_map, wall) > here {
                    for step in 0..3 {
                        let opposite = ivec2(x, y) - direction.step() * (step + 1);
                        if map.is_cell_in_bounds(opposite) && noise_at(&noise_map, opposite) > here
                        {
                            noise_map[(opposite.x + opposite.y * width) as usize] = here;
                        }
                    }
                }
            }
        }
    }

    // Remove elevation artifacts: demote the highest tier until stable.
    loop {
        let mut elevation_artifact_count = 0_u32;
        for x in 0..width {
            for y in 0..height {
                if noise_map[(x + y * width) as usize] != 2 {
                    continue;
                }

                let mut is_highground_too_close = false;
                'near: for nx in x - ELEVATION_NEAR_DIST..=x + ELEVATION_NEAR_DIST {
                    for ny in y - ELEVATION_NEAR_DIST..=y + ELEVATION_NEAR_DIST {
                        if !map.is_cell_in_bounds(ivec2(nx, ny)) {
                            continue;
                        }
                        if noise_at(&noise_map, ivec2(nx, ny)) != 1 {
                            is_highground_too_close = true;
                            break 'near;
                        }
                    }
                }
                if is_highground_too_close {
                    noise_map[(x + y * width) as usize] = 1;
                    elevation_artifact_count += 1;
                }
            }
        }
        if elevation_artifact_count == 0 {
            break;
        }
    }

    // Bake map tiles; unmapped wall masks are artifacts whose noise gets
    // decremented before the whole grid is re-baked.
    let mut artifacts: Vec<IVec2> = Vec::new();
    loop {
        map.tiles.fill(crate::map::Tile {
            sprite: TileSprite::Sand as u16,
            elevation: 0,
        });
        for artifact in &artifacts {
            noise_map[(artifact.x + artifact.y * width) as usize] -= 1;
        }
        artifacts.clear();

        for y in 0..height {
            for x in 0..width {
                let index = (x + y * width) as usize;
                let here = noise_map[index];
                if here >= 0 {
                    map.tiles[index].elevation = here as u8;
                    // First check if we need to place a regular wall here.
                    let mut neighbors = 0_u32;
                    if here > 0 {
                        for direction in Direction::ALL {
                            let neighbor_cell = ivec2(x, y) + direction.step();
                            if !map.is_cell_in_bounds(neighbor_cell) {
                                continue;
                            }
                            if here > noise_at(&noise_map, neighbor_cell) {
                                neighbors += direction.mask();
                            }
                        }
                    }

                    if neighbors == 0 {
                        // Regular sand tile with stochastic variants.
                        let new_index = lcg.rand() % 7;
                        map.tiles[index].sprite = if new_index < 4 && index % 3 == 0 {
                            if new_index == 1 {
                                TileSprite::Sand3 as u16
                            } else {
                                TileSprite::Sand2 as u16
                            }
                        } else {
                            TileSprite::Sand as u16
                        };
                    } else {
                        // Wall tile.
                        match wall_autotile_lookup(neighbors) {
                            Some(sprite) => map.tiles[index].sprite = sprite as u16,
                            None => artifacts.push(ivec2(x, y)),
                        }
                    }
                } else if here == -1 {
                    let mut neighbors = 0_u32;
                    // Check adjacent neighbors.
                    for direction in
                        [Direction::North, Direction::East, Direction::South, Direction::West]
                    {
                        let neighbor_cell = ivec2(x, y) + direction.step();
                        if !map.is_cell_in_bounds(neighbor_cell)
                            || here == noise_at(&noise_map, neighbor_cell)
                        {
                            neighbors += direction.mask();
                        }
                    }
                    // Check diagonal neighbors, only between set cardinals.
                    for diagonal in [1_usize, 3, 5, 7] {
                        let neighbor_cell = ivec2(x, y) + Direction::from_index(diagonal).step();
                        let prev_mask = DIRECTION_MASK[diagonal - 1];
                        let next_mask = DIRECTION_MASK[(diagonal + 1) % DIRECTION_COUNT];
                        if neighbors & prev_mask != prev_mask || neighbors & next_mask != next_mask
                        {
                            continue;
                        }
                        if !map.is_cell_in_bounds(neighbor_cell)
                            || here == noise_at(&noise_map, neighbor_cell)
                        {
                            neighbors += DIRECTION_MASK[diagonal];
                        }
                    }
                    map.tiles[index] = crate::map::Tile {
                        sprite: TileSprite::Water as u16 + water_autotile_offset(neighbors),
                        elevation: 0,
                    };
                }
            }
        }

        if artifacts.is_empty() {
            break;
        }
    }

    // Place front walls below south-facing edges.
    for index in (width as usize)..(width * height) as usize {
        let previous = index - width as usize;
        let sprite = map.tiles[previous].sprite;
        if sprite == TileSprite::WallSouthEdge as u16 {
            map.tiles[index].sprite = TileSprite::WallSouthFront as u16;
        } else if sprite == TileSprite::WallSwCorner as u16 {
            map.tiles[index].sprite = TileSprite::WallSwFront as u16;
        } else if sprite == TileSprite::WallSeCorner as u16 {
            map.tiles[index].sprite = TileSprite::WallSeFront as u16;
        }
    }

    generate_ramps(map);

    // Block all walls and water.
    for index in 0..(width * height) as usize {
        let sprite = map.tiles[index].sprite;
        let cell = ivec2(index as i32 % width, index as i32 / width);
        let is_sand = sprite == TileSprite::Sand as u16
            || sprite == TileSprite::Sand2 as u16
            || sprite == TileSprite::Sand3 as u16;
        if !(is_sand || map.is_tile_ramp(cell)) {
            map.cells[index] = CELL_BLOCKED;
        }
    }

    calculate_unreachable_cells(map, entities);

    // Determine player spawns: clockwise diagonals starting northeast.
    for player_id in 0..MAX_PLAYERS {
        map.player_spawns[player_id] = ivec2(-1, -1);
    }
    let mut found_spawns = [ivec2(-1, -1); MAX_PLAYERS];
    for (player_id, found) in found_spawns.iter_mut().enumerate() {
        let spawn_direction = 1 + player_id * 2;
        *found = find_player_spawn(map, entities, spawn_direction);
    }
    for found in found_spawns {
        let mut spawn_index = (lcg.rand() % MAX_PLAYERS as i32) as usize;
        while map.player_spawns[spawn_index].x != -1 {
            spawn_index = (spawn_index + 1) % MAX_PLAYERS;
        }
        map.player_spawns[spawn_index] = found;
    }

    // Gold mines: one per spawn, then a Poisson disk of extra patches.
    let mut params = PoissonDiskParams {
        avoid_values: vec![0; (width * height) as usize],
        disk_radius: gold_disk_radius,
        allow_unreachable_cells: false,
        margin: ivec2(5, 5),
    };

    for player_id in 0..MAX_PLAYERS {
        let mine_cell = map.player_spawns[player_id];
        create_gold_mine(map, entities, mine_cell, GOLD_MINE_STARTING_GOLD);
        params.avoid_values[map.index(mine_cell)] = params.disk_radius;

        let hall_cell = player_spawn_town_hall_cell(map, entities, mine_cell);
        assert!(
            hall_cell.x != -1,
            "no town hall site around spawn mine ({}, {})",
            mine_cell.x,
            mine_cell.y
        );
        map.player_spawns[player_id] = hall_cell;
    }

    for index in 0..(width * height) as usize {
        let cell = ivec2(index as i32 % width, index as i32 / width);
        if map.cells[index] == CELL_BLOCKED || map.is_tile_ramp(cell) {
            params.avoid_values[index] = 4;
        }
    }

    let gold_sample = poisson_disk(map, lcg, params.clone());
    for patch in &gold_sample {
        create_gold_mine(map, entities, *patch, GOLD_MINE_STARTING_GOLD);
    }
    // Recalculate unreachables in case the gold cells blocked anything.
    calculate_unreachable_cells(map, entities);

    // Keep decorations away from gold and spawns.
    for entity in entities.iter() {
        if entity.entity_type == EntityType::GoldMine {
            params.avoid_values[map.index(entity.cell)] = 4;
        }
    }
    for player_id in 0..MAX_PLAYERS {
        params.avoid_values[map.index(map.player_spawns[player_id])] = 16;
    }

    // Decorations: a second disk over the same avoid table.
    params.disk_radius = DECORATION_DISK_RADIUS;
    params.allow_unreachable_cells = true;
    params.margin = ivec2(0, 0);
    let decoration_cells = poisson_disk(map, lcg, params);
    for cell in decoration_cells {
        let index = map.index(cell);
        map.cells[index] = CELL_DECORATION_0 + (lcg.rand() % 5) as u16;
    }
}

#[allow(clippy::too_many_lines)]
fn generate_ramps(map: &mut Map) {
    let mut stair_cells: Vec<IVec2> = Vec::new();
    for pass in 0..2 {
        for x in 0..map.width {
            for y in 0..map.height {
                let tile = map.get_tile(ivec2(x, y));
                // Only generate ramps on straight edged walls.
                let is_straight_edge = tile.sprite == TileSprite::WallSouthEdge as u16
                    || tile.sprite == TileSprite::WallNorthEdge as u16
                    || tile.sprite == TileSprite::WallWestEdge as u16
                    || tile.sprite == TileSprite::WallEastEdge as u16;
                if !is_straight_edge {
                    continue;
                }
                let is_horizontal = tile.sprite == TileSprite::WallSouthEdge as u16
                    || tile.sprite == TileSprite::WallNorthEdge as u16;
                let is_vertical = !is_horizontal;
                let mut step_direction = if is_horizontal { ivec2(-1, 0) } else { ivec2(0, -1) };

                // Walk to both ends of the straight run.
                let mut stair_min = ivec2(x, y);
                while map.is_cell_in_bounds(stair_min)
                    && map.get_tile(stair_min).sprite == tile.sprite
                {
                    stair_min += step_direction;
                    if is_vertical {
                        let adjacent_cell = stair_min
                            + ivec2(
                                if tile.sprite == TileSprite::WallEastEdge as u16 { 1 } else { -1 },
                                0,
                            );
                        if !map.is_cell_in_bounds(adjacent_cell)
                            || map.get_cell(adjacent_cell) != CELL_EMPTY
                        {
                            break;
                        }
                    }
                }
                let mut stair_max = ivec2(x, y);
                stair_min -= step_direction;
                step_direction = -step_direction;
                while map.is_cell_in_bounds(stair_max)
                    && map.get_tile(stair_max).sprite == tile.sprite
                {
                    stair_max += step_direction;
                    if is_vertical {
                        let adjacent_cell = stair_min
                            + ivec2(
                                if tile.sprite == TileSprite::WallEastEdge as u16 { 1 } else { -1 },
                                0,
                            );
                        if !map.is_cell_in_bounds(adjacent_cell)
                            || map.get_cell(adjacent_cell) != CELL_EMPTY
                        {
                            break;
                        }
                    }
                }
                stair_max -= step_direction;

                let mut stair_length = IVec2::manhattan_distance(stair_max, stair_min);
                let min_stair_length = if pass == 0 { 3 } else { 2 };
                if stair_length < min_stair_length {
                    continue;
                }

                // Symmetrically trim long runs to at most 4.
                let mut chop_from_max = true;
                while stair_length > 4 {
                    if chop_from_max {
                        stair_max -= step_direction;
                    } else {
                        stair_min += step_direction;
                    }
                    chop_from_max = !chop_from_max;
                    stair_length -= 1;
                }

                let too_close = stair_cells.iter().any(|stair_cell| {
                    let dist = IVec2::manhattan_distance(*stair_cell, stair_min)
                        .min(IVec2::manhattan_distance(*stair_cell, stair_max));
                    dist < 16
                });
                if too_close {
                    continue;
                }

                stair_cells.push(stair_min);
                stair_cells.push(stair_max);
                let mut cell = stair_min;
                while cell != stair_max + step_direction {
                    let stair_tile = if tile.sprite == TileSprite::WallNorthEdge as u16 {
                        if cell == stair_min {
                            TileSprite::WallNorthStairLeft
                        } else if cell == stair_max {
                            TileSprite::WallNorthStairRight
                        } else {
                            TileSprite::WallNorthStairCenter
                        }
                    } else if tile.sprite == TileSprite::WallEastEdge as u16 {
                        if cell == stair_min {
                            TileSprite::WallEastStairTop
                        } else if cell == stair_max {
                            TileSprite::WallEastStairBottom
                        } else {
                            TileSprite::WallEastStairCenter
                        }
                    } else if tile.sprite == TileSprite::WallWestEdge as u16 {
                        if cell == stair_min {
                            TileSprite::WallWestStairTop
                        } else if cell == stair_max {
                            TileSprite::WallWestStairBottom
                        } else {
                            TileSprite::WallWestStairCenter
                        }
                    } else if cell == stair_min {
                        TileSprite::WallSouthStairLeft
                    } else if cell == stair_max {
                        TileSprite::WallSouthStairRight
                    } else {
                        TileSprite::WallSouthStairCenter
                    };

                    let index = map.index(cell);
                    map.tiles[index].sprite = stair_tile as u16;

                    // South stairs overwrite the tile below with their
                    // front face.
                    let south_front_tile = match stair_tile {
                        TileSprite::WallSouthStairLeft => Some(TileSprite::WallSouthStairFrontLeft),
                        TileSprite::WallSouthStairRight => {
                            Some(TileSprite::WallSouthStairFrontRight)
                        }
                        TileSprite::WallSouthStairCenter => {
                            Some(TileSprite::WallSouthStairFrontCenter)
                        }
                        _ => None,
                    };
                    if let Some(front) = south_front_tile {
                        let below_cell = cell + ivec2(0, 1);
                        if map.is_cell_in_bounds(below_cell) {
                            let below = map.index(below_cell);
                            map.tiles[below].sprite = front as u16;
                        }
                    }

                    cell += step_direction;
                }
            }
        }
    }
}

/// Island-labels every passable cell; everything off the largest island
/// becomes [`CELL_UNREACHABLE`].
pub fn calculate_unreachable_cells(map: &mut Map, entities: &IdArray<Entity>) {
    // Assume any previously unreachable cells are now empty / reachable.
    for value in &mut map.cells {
        if *value == CELL_UNREACHABLE {
            *value = CELL_EMPTY;
        }
    }

    let area = (map.width * map.height) as usize;
    let mut islands: Vec<i32> = vec![-1; area];
    let mut island_size: Vec<i32> = Vec::new();

    let passable = |map: &Map, entities: &IdArray<Entity>, index: usize| {
        let value = map.cells[index];
        if value == CELL_BLOCKED {
            return false;
        }
        if value < CELL_EMPTY {
            // Buildings and gold block island flow; units do not.
            return entities
                .get_by_id(value)
                .is_some_and(|entity| entity.entity_type.is_unit());
        }
        true
    };

    loop {
        // First unassigned passable cell seeds the next island.
        let mut seed = None;
        for index in 0..area {
            if !passable(map, entities, index) {
                continue;
            }
            if islands[index] == -1 {
                seed = Some(index);
                break;
            }
        }
        let Some(seed) = seed else {
            break;
        };

        let island_index = island_size.len() as i32;
        island_size.push(0);

        let mut frontier = vec![ivec2(seed as i32 % map.width, seed as i32 / map.width)];
        while !frontier.is_empty() {
            let next = frontier.remove(0);
            if !map.is_cell_in_bounds(next) {
                continue;
            }
            let index = map.index(next);
            if !passable(map, entities, index) {
                continue;
            }
            if islands[index] != -1 {
                continue;
            }

            islands[index] = island_index;
            island_size[island_index as usize] += 1;

            for direction in
                [Direction::North, Direction::East, Direction::South, Direction::West]
            {
                frontier.push(next + direction.step());
            }
        }
    }

    let mut biggest_island = 0;
    for island_index in 1..island_size.len() {
        if island_size[island_index] > island_size[biggest_island] {
            biggest_island = island_index;
        }
    }
    for index in 0..area {
        if map.cells[index] == CELL_EMPTY && islands[index] != biggest_island as i32 {
            map.cells[index] = CELL_UNREACHABLE;
        }
    }
}

/// Reconnects an unreachable pocket after a ramp or demolition opens a
/// path at `cell`.
pub fn recalculate_unreachable_cells(map: &mut Map, cell: IVec2) {
    let mut frontier = Vec::new();

    for direction in [Direction::North, Direction::East, Direction::South, Direction::West] {
        let child = cell + direction.step();
        if map.is_cell_in_bounds(child) && map.get_cell(child) == CELL_UNREACHABLE {
            frontier.push(child);
        }
    }

    while !frontier.is_empty() {
        let next = frontier.remove(0);
        if !map.is_cell_in_bounds(next) || map.get_cell(next) != CELL_UNREACHABLE {
            continue;
        }

        let index = map.index(next);
        map.cells[index] = CELL_EMPTY;

        for direction in Direction::ALL {
            frontier.push(next + direction.step());
        }
    }
}

// Breadth-first search outward from the diagonal's fixed offset for the
// nearest 11×11 rect on one elevation with no occupancy, then nudge the
// mine candidate toward the map center on east/south diagonals and
// reject candidates near stairs or occupied cells.
fn find_player_spawn(map: &Map, entities: &IdArray<Entity>, spawn_direction: usize) -> IVec2 {
    let spawn_size = ivec2(PLAYER_SPAWN_SIZE, PLAYER_SPAWN_SIZE);
    let direction_step = Direction::from_index(spawn_direction).step();
    let start = ivec2(map.width / 2, map.height / 2)
        + ivec2(
            direction_step.x * (map.width / 2 - PLAYER_SPAWN_MARGIN),
            direction_step.y * (map.height / 2 - PLAYER_SPAWN_MARGIN),
        );

    let mut frontier = vec![start];
    let mut explored = vec![false; (map.width * map.height) as usize];
    let mut spawn_point = ivec2(-1, -1);

    while !frontier.is_empty() && spawn_point.x == -1 {
        let mut next_index = 0;
        for index in 1..frontier.len() {
            if IVec2::manhattan_distance(frontier[index], start)
                < IVec2::manhattan_distance(frontier[next_index], start)
            {
                next_index = index;
            }
        }
        let next = frontier.remove(next_index);

        if map.is_cell_rect_same_elevation(next, spawn_size)
            && !is_cell_rect_occupied_xy(map, entities, next, spawn_size, ivec2(-1, -1), false)
        {
            let mut candidate = next;
            if spawn_direction == Direction::Northeast as usize
                || spawn_direction == Direction::Southeast as usize
            {
                candidate.x += 5;
            }
            if spawn_direction == Direction::Southeast as usize
                || spawn_direction == Direction::Southwest as usize
            {
                candidate.y += 5;
            }

            // Last check: candidate must not hug stairs or walls.
            let mut is_candidate_valid = true;
            'check: for x in candidate.x - STAIR_RADIUS..candidate.x + 3 + STAIR_RADIUS {
                for y in candidate.y - STAIR_RADIUS..candidate.y + 3 + STAIR_RADIUS {
                    if !map.is_cell_in_bounds(ivec2(x, y)) {
                        continue;
                    }
                    if map.is_tile_ramp(ivec2(x, y)) || map.get_cell(ivec2(x, y)) != CELL_EMPTY {
                        is_candidate_valid = false;
                        break 'check;
                    }
                }
            }
            if is_candidate_valid {
                spawn_point = candidate;
                break;
            }
        }

        explored[map.index(next)] = true;
        for direction in Direction::ALL {
            let child = next + direction.step();
            if !map.is_cell_rect_in_bounds(child, spawn_size.x) {
                continue;
            }
            if explored[map.index(child)] {
                continue;
            }
            if frontier.contains(&child) {
                continue;
            }
            frontier.push(child);
        }
    }

    if spawn_point.x == -1 {
        // No valid site on this diagonal; fall back to the search origin.
        spawn_point = start;
    }
    spawn_point
}

/// Nearest hall footprint around a spawn mine: walks the ring two cells
/// out, insisting on matching elevation and a stair-free neighborhood,
/// falling back to the plain nearest-ring search.
pub fn player_spawn_town_hall_cell(
    map: &Map,
    entities: &IdArray<Entity>,
    mine_cell: IVec2,
) -> IVec2 {
    let mut nearest_cell = ivec2(-1, -1);
    let mut nearest_cell_dist = -1;
    let rect_position = mine_cell - ivec2(4, 4);
    let rect_size = 11;
    let start_size = EntityType::Hall.cell_size();
    let start = mine_cell;

    let cell_begin = crate::map::ring_begin(rect_position, rect_size, start_size);
    let cell_end = crate::map::ring_end(rect_position, rect_size, start_size, &cell_begin);
    let cell_step = crate::map::RING_STEPS;

    let mut index = 0;
    let mut cell = cell_begin[0];
    while index < 4 {
        let mut cell_is_valid = map.is_cell_rect_in_bounds(cell, start_size);
        if cell_is_valid {
            cell_is_valid = !is_cell_rect_occupied(map, entities, cell, start_size, ivec2(-1, -1), false)
                && map.is_cell_rect_same_elevation(cell, ivec2(start_size, start_size))
                && map.get_tile(cell).elevation == map.get_tile(mine_cell).elevation
                && (nearest_cell_dist == -1
                    || IVec2::manhattan_distance(start, cell) < nearest_cell_dist);
        }
        if cell_is_valid {
            'ring: for x in cell.x - STAIR_RADIUS..cell.x + start_size + STAIR_RADIUS + 1 {
                for y in cell.y - STAIR_RADIUS..cell.y + start_size + STAIR_RADIUS + 1 {
                    if !map.is_cell_in_bounds(ivec2(x, y)) {
                        continue;
                    }
                    if map.is_tile_ramp(ivec2(x, y)) || map.get_cell(ivec2(x, y)) != CELL_EMPTY {
                        cell_is_valid = false;
                        break 'ring;
                    }
                }
            }
        }

        if cell_is_valid {
            nearest_cell = cell;
            nearest_cell_dist = IVec2::manhattan_distance(start, cell);
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

    if nearest_cell_dist != -1 {
        nearest_cell
    } else {
        crate::map::get_nearest_cell_around_rect(
            map,
            entities,
            start,
            start_size,
            rect_position,
            rect_size,
            false,
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{is_canonical_water_mask, map_init, water_autotile_offset};
    use crate::entity::{EntityType, IdArray};
    use crate::map::{Map, CELL_BLOCKED, CELL_EMPTY};
    use crate::math::Lcg;
    use crate::noise;

    #[test]
    fn canonical_water_masks_number_forty_seven() {
        let count = (0_u32..256).filter(|&m| is_canonical_water_mask(m)).count();
        assert_eq!(count, 47);
        // Offsets are dense over the canonical set.
        assert_eq!(water_autotile_offset(0), 0);
        assert_eq!(water_autotile_offset(255), 46);
    }

    #[test]
    fn bake_is_deterministic() {
        let grid = noise::generate(1743160839, 96, 96);

        let mut map_a = Map::new(96, 96);
        let mut entities_a = IdArray::new();
        let mut lcg_a = Lcg::new(1743160839);
        map_init(&mut map_a, &mut entities_a, &mut lcg_a, &grid, 42);

        let mut map_b = Map::new(96, 96);
        let mut entities_b = IdArray::new();
        let mut lcg_b = Lcg::new(1743160839);
        map_init(&mut map_b, &mut entities_b, &mut lcg_b, &grid, 42);

        assert_eq!(map_a.tiles, map_b.tiles);
        assert_eq!(map_a.cells, map_b.cells);
        assert_eq!(map_a.player_spawns, map_b.player_spawns);
        assert_eq!(lcg_a.state(), lcg_b.state());
        assert_eq!(entities_a.len(), entities_b.len());
    }

    #[test]
    fn bake_places_spawn_mines_and_halls() {
        let grid = noise::generate(1743160839, 96, 96);
        let mut map = Map::new(96, 96);
        let mut entities = IdArray::new();
        let mut lcg = Lcg::new(1743160839);
        map_init(&mut map, &mut entities, &mut lcg, &grid, 42);

        let mines = entities
            .iter()
            .filter(|e| e.entity_type == EntityType::GoldMine)
            .count();
        assert!(mines >= 4, "expected at least the 4 spawn mines, got {mines}");

        for spawn in map.player_spawns {
            assert!(spawn.x != -1 && spawn.y != -1);
            assert!(map.is_cell_rect_in_bounds(spawn, EntityType::Hall.cell_size()));
        }
    }

    #[test]
    fn bake_blocks_water_and_walls() {
        let grid = noise::generate(99, 96, 96);
        let mut map = Map::new(96, 96);
        let mut entities = IdArray::new();
        let mut lcg = Lcg::new(99);
        map_init(&mut map, &mut entities, &mut lcg, &grid, 42);

        let blocked = map.cells.iter().filter(|&&c| c == CELL_BLOCKED).count();
        let empty = map.cells.iter().filter(|&&c| c == CELL_EMPTY).count();
        assert!(blocked > 0, "a 96x96 map should have some terrain");
        assert!(empty > blocked, "most of the map should stay walkable");
    }
}
