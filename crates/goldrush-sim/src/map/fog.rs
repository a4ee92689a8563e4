// SPDX-License-Identifier: Apache-2.0

//! Per-team fog of war via Bresenham sight rays.
//!
//! `fog_update` raytraces from the center of an entity rect to every cell
//! on the perimeter of a `(2·sight + size)²` square. Rays stop at the
//! sight radius (squared comparison, no roots) and the moment they climb
//! onto higher ground. Counters reference-count overlapping sight
//! sources; the conceal path snapshots selectable non-unit entities into
//! the team's fog memory just before the cell goes dark.

use crate::entity::{Entity, IdArray, ID_NULL};
use crate::map::{Map, RememberedEntity, CELL_EMPTY, FOG_EXPLORED, FOG_REVEALED_MIN};
use crate::math::{ivec2, Direction, IVec2};

/// Applies (or removes) one sight source for `team`.
///
/// `increment` raises the fog counters; decrementing asserts the counter
/// was raised first — going below "explored" indicates a reveal/conceal
/// imbalance, which is a simulation bug, never user input.
pub fn fog_update(
    map: &mut Map,
    entities: &IdArray<Entity>,
    team: usize,
    cell: IVec2,
    cell_size: i32,
    sight: i32,
    increment: bool,
    has_detection: bool,
) {
    let search_corners = [
        cell - ivec2(sight, sight),
        cell + ivec2((cell_size - 1) + sight, -sight),
        cell + ivec2((cell_size - 1) + sight, (cell_size - 1) + sight),
        cell + ivec2(-sight, (cell_size - 1) + sight),
    ];

    for search_index in 0..4 {
        let search_goal = search_corners[(search_index + 1) % 4];
        // Corner 0 walks east, 1 south, 2 west, 3 north.
        let search_step = Direction::from_index((search_index * 2 + 2) % 8).step();

        let mut line_end = search_corners[search_index];
        while line_end != search_goal {
            let line_start = line_start_for(cell, cell_size, line_end);
            cast_ray(
                map,
                entities,
                team,
                line_start,
                line_end,
                sight,
                increment,
                has_detection,
            );
            line_end += search_step;
        }
    }

    map.is_fog_dirty = true;
}

// Rays leave from the rect center: the single center cell for sizes 1 and
// 3, or whichever cell of the 2×2 center block is nearest the ray end for
// sizes 2 and 4.
fn line_start_for(cell: IVec2, cell_size: i32, line_end: IVec2) -> IVec2 {
    debug_assert!((1..=4).contains(&cell_size), "unhandled cell size");
    match cell_size {
        1 => cell,
        3 => cell + ivec2(1, 1),
        _ => {
            let center_cell = if cell_size == 2 { cell } else { cell + ivec2(1, 1) };
            let x = if line_end.x < center_cell.x {
                center_cell.x
            } else if line_end.x > center_cell.x + 1 {
                center_cell.x + 1
            } else {
                line_end.x
            };
            let y = if line_end.y < center_cell.y {
                center_cell.y
            } else if line_end.y > center_cell.y + 1 {
                center_cell.y + 1
            } else {
                line_end.y
            };
            ivec2(x, y)
        }
    }
}

fn cast_ray(
    map: &mut Map,
    entities: &IdArray<Entity>,
    team: usize,
    line_start: IVec2,
    line_end: IVec2,
    sight: i32,
    increment: bool,
    has_detection: bool,
) {
    // Keep the slope between 0 and 1: step the major axis by 1 and roll
    // the minor axis on accumulated error.
    let use_x_step = (line_end.x - line_start.x).abs() >= (line_end.y - line_start.y).abs();
    let slope = 2 * if use_x_step {
        (line_end.y - line_start.y).abs()
    } else {
        (line_end.x - line_start.x).abs()
    };
    let mut slope_error = slope
        - if use_x_step {
            (line_end.x - line_start.x).abs()
        } else {
            (line_end.y - line_start.y).abs()
        };
    let (line_step, line_opposite_step) = if use_x_step {
        (
            ivec2(if line_end.x >= line_start.x { 1 } else { -1 }, 0),
            ivec2(0, if line_end.y >= line_start.y { 1 } else { -1 }),
        )
    } else {
        (
            ivec2(0, if line_end.y >= line_start.y { 1 } else { -1 }),
            ivec2(if line_end.x >= line_start.x { 1 } else { -1 }, 0),
        )
    };

    let mut line_cell = line_start;
    while line_cell != line_end {
        if !map.is_cell_in_bounds(line_cell)
            || IVec2::euclidean_distance_squared(line_start, line_cell) > sight * sight
        {
            break;
        }

        let index = map.index(line_cell);
        if increment {
            if map.fog[team][index] <= FOG_EXPLORED {
                map.fog[team][index] = FOG_REVEALED_MIN;
            } else {
                map.fog[team][index] += 1;
            }
            if has_detection {
                map.detection[team][index] += 1;
            }
        } else {
            assert!(
                map.fog[team][index] >= FOG_REVEALED_MIN,
                "fog counter underflow at ({}, {}) for team {team}",
                line_cell.x,
                line_cell.y
            );
            map.fog[team][index] -= 1;
            if has_detection {
                map.detection[team][index] -= 1;
            }

            remember_concealed_entity(map, entities, team, line_cell);
        }

        if map.get_tile(line_cell).elevation > map.get_tile(line_start).elevation {
            break;
        }

        slope_error += slope;
        if slope_error >= 0 {
            line_cell += line_opposite_step;
            slope_error -= 2 * if use_x_step {
                (line_end.x - line_start.x).abs()
            } else {
                (line_end.y - line_start.y).abs()
            };
        }
        line_cell += line_step;
    }
}

// Snapshot whatever selectable non-unit entity sits here into the team's
// fog memory. Mine cells are consulted before the occupancy grid; land
// mines themselves are then excluded by type.
fn remember_concealed_entity(
    map: &mut Map,
    entities: &IdArray<Entity>,
    team: usize,
    line_cell: IVec2,
) {
    let index = map.index(line_cell);
    let mut cell_value = map.mine_cells[index];
    if cell_value == ID_NULL {
        let raw = map.cells[index];
        if raw >= CELL_EMPTY {
            return;
        }
        cell_value = raw;
    }
    let Some(entity) = entities.get_by_id(cell_value) else {
        return;
    };
    if entity.entity_type.is_unit()
        || !entity.is_selectable()
        || entity.entity_type == crate::entity::EntityType::LandMine
    {
        return;
    }
    map.remembered_entities[team].insert(
        cell_value,
        RememberedEntity {
            entity_type: entity.entity_type,
            frame: entity.animation.frame,
            player_id: entity.player_id,
            cell: entity.cell,
            cell_size: entity.cell_size(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::fog_update;
    use crate::entity::IdArray;
    use crate::map::{Map, FOG_EXPLORED, FOG_HIDDEN, FOG_REVEALED_MIN};
    use crate::math::ivec2;

    #[test]
    fn reveal_then_conceal_leaves_explored() {
        let mut map = Map::new(32, 32);
        let entities = IdArray::new();
        fog_update(&mut map, &entities, 0, ivec2(16, 16), 1, 8, true, false);
        assert!(map.get_fog(0, ivec2(16, 16)) >= FOG_REVEALED_MIN);
        assert!(map.is_fog_dirty);

        fog_update(&mut map, &entities, 0, ivec2(16, 16), 1, 8, false, false);
        assert_eq!(map.get_fog(0, ivec2(16, 16)), FOG_EXPLORED);
    }

    #[test]
    fn overlapping_sources_reference_count() {
        let mut map = Map::new(32, 32);
        let entities = IdArray::new();
        fog_update(&mut map, &entities, 0, ivec2(10, 10), 1, 6, true, false);
        fog_update(&mut map, &entities, 0, ivec2(12, 10), 1, 6, true, false);

        fog_update(&mut map, &entities, 0, ivec2(10, 10), 1, 6, false, false);
        // Cells near the second source stay revealed.
        assert!(map.get_fog(0, ivec2(12, 10)) >= FOG_REVEALED_MIN);
    }

    #[test]
    fn sight_radius_bounds_the_reveal() {
        let mut map = Map::new(64, 64);
        let entities = IdArray::new();
        fog_update(&mut map, &entities, 0, ivec2(32, 32), 1, 5, true, false);
        assert_eq!(map.get_fog(0, ivec2(32 + 10, 32)), FOG_HIDDEN);
    }

    #[test]
    fn higher_ground_occludes_the_ray() {
        let mut map = Map::new(64, 64);
        let entities = IdArray::new();
        // Wall column at x = 36, elevation 2; the viewer stands at (32, 32)
        // on elevation 0 with sight 8.
        for y in 0..64 {
            let index = map.index(ivec2(36, y));
            map.tiles[index].elevation = 2;
        }
        fog_update(&mut map, &entities, 0, ivec2(32, 32), 1, 8, true, false);

        // Cells beyond the wall on the direct line stay hidden.
        for x in 37..=40 {
            assert_eq!(
                map.get_fog(0, ivec2(x, 32)),
                FOG_HIDDEN,
                "cell ({x}, 32) should be occluded"
            );
        }
        // The wall cell itself is seen (the ray stops after counting it).
        assert!(map.get_fog(0, ivec2(36, 32)) >= FOG_REVEALED_MIN);
    }

    #[test]
    fn detection_counters_track_fog() {
        let mut map = Map::new(32, 32);
        let entities = IdArray::new();
        fog_update(&mut map, &entities, 1, ivec2(8, 8), 1, 4, true, true);
        assert!(map.is_cell_detected(1, ivec2(8, 8)));
        fog_update(&mut map, &entities, 1, ivec2(8, 8), 1, 4, false, true);
        assert!(!map.is_cell_detected(1, ivec2(8, 8)));
    }
}
