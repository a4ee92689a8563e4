// SPDX-License-Identifier: Apache-2.0

//! Building production and research queues.
//!
//! Queue rules: at most five items, gold is deducted on enqueue and
//! refunded on dequeue, an upgrade is in exactly one of
//! `player_upgrades` / `player_upgrades_in_progress` at a time, and
//! production completion is gated by population room and a free exit
//! cell (each held behind its own timer sentinel while it retries).

use crate::entity::{
    behavior, BuildingQueueItem, EntityId, EntityMode, EntityType, Target,
    BUILDING_DEQUEUE_POP_BACK, BUILDING_QUEUE_BLOCKED, BUILDING_QUEUE_EXIT_BLOCKED,
    BUILDING_QUEUE_MAX, ID_NULL, UPGRADE_WAR_WAGON,
};
use crate::event::{
    AlertType, MatchEvent, STATUS_BUILDING_EXIT_BLOCKED, STATUS_BUILDING_QUEUE_FULL,
    STATUS_NOT_ENOUGH_GOLD, STATUS_NOT_ENOUGH_HOUSE,
};
use crate::map::find_free_cell_around_rect;
use crate::state::MatchState;

/// Population granted by each finished hall or house.
pub const POPULATION_PER_HOUSE: u32 = 10;
/// Hard population ceiling.
pub const POPULATION_MAX: u32 = 200;

/// Current population of `player_id`: live units weighted by cost.
#[must_use]
pub fn player_population(state: &MatchState, player_id: u8) -> u32 {
    let mut population = 0;
    for entity in state.entities.iter() {
        if entity.player_id == player_id && entity.entity_type.is_unit() && entity.health != 0 {
            population += entity.data().unit.map_or(0, |unit| unit.population_cost);
        }
    }
    population
}

/// Population ceiling of `player_id`: 10 per finished hall or house,
/// capped at 200.
#[must_use]
pub fn player_max_population(state: &MatchState, player_id: u8) -> u32 {
    let mut max_population = 0;
    for building in state.entities.iter() {
        if building.player_id == player_id
            && building.mode == EntityMode::BuildingFinished
            && (building.entity_type == EntityType::House
                || building.entity_type == EntityType::Hall)
        {
            max_population += POPULATION_PER_HOUSE;
            if max_population == POPULATION_MAX {
                return POPULATION_MAX;
            }
        }
    }
    max_population
}

/// Whether `player_id` owns the upgrade.
#[must_use]
pub fn player_has_upgrade(state: &MatchState, player_id: u8, upgrade: u32) -> bool {
    state.player_upgrades[player_id as usize] & upgrade == upgrade
}

/// Whether the upgrade is neither owned nor queued anywhere.
#[must_use]
pub fn player_upgrade_is_available(state: &MatchState, player_id: u8, upgrade: u32) -> bool {
    (state.player_upgrades[player_id as usize]
        | state.player_upgrades_in_progress[player_id as usize])
        & upgrade
        == 0
}

/// Applies a `BuildingEnqueue` command.
pub(crate) fn handle_enqueue(
    state: &mut MatchState,
    player_id: u8,
    building_id: EntityId,
    item: BuildingQueueItem,
) {
    let Some(building_index) = state.entities.index_of(building_id) else {
        return;
    };
    if !state.entities[building_index].is_selectable() {
        return;
    }
    if state.player_gold[player_id as usize] < item.cost() {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_NOT_ENOUGH_GOLD,
        });
        return;
    }
    if state.entities[building_index].queue.len() == BUILDING_QUEUE_MAX {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_BUILDING_QUEUE_FULL,
        });
        return;
    }
    // Reject if the upgrade is already owned or being researched.
    if let BuildingQueueItem::Upgrade(upgrade) = item {
        if !player_upgrade_is_available(state, player_id, upgrade) {
            return;
        }
    }

    // Owning wagon armor turns wagon orders into war wagons; the price
    // charged stays the price of the item as submitted.
    let mut queued_item = item;
    if let BuildingQueueItem::Unit(EntityType::Wagon) = item {
        if player_has_upgrade(state, player_id, UPGRADE_WAR_WAGON) {
            queued_item = BuildingQueueItem::Unit(EntityType::WarWagon);
        }
    }

    if let BuildingQueueItem::Upgrade(upgrade) = queued_item {
        state.player_upgrades_in_progress[player_id as usize] |= upgrade;
    }

    state.player_gold[player_id as usize] -= item.cost();
    let building = &mut state.entities[building_index];
    let was_empty = building.queue.is_empty();
    building.queue.push(queued_item);
    if was_empty {
        building.timer = queued_item.duration();
    }
}

/// Applies a `BuildingDequeue` command.
pub(crate) fn handle_dequeue(
    state: &mut MatchState,
    player_id: u8,
    building_id: EntityId,
    index: u32,
) {
    let Some(building_index) = state.entities.index_of(building_id) else {
        return;
    };
    if !state.entities[building_index].is_selectable() {
        return;
    }
    if state.entities[building_index].queue.is_empty() {
        return;
    }

    let queue_len = state.entities[building_index].queue.len();
    let item_index = if index == BUILDING_DEQUEUE_POP_BACK {
        queue_len - 1
    } else {
        index as usize
    };
    if item_index >= queue_len {
        return;
    }

    let item = state.entities[building_index].queue[item_index];
    state.player_gold[player_id as usize] += item.cost();
    if let BuildingQueueItem::Upgrade(upgrade) = item {
        let owner = state.entities[building_index].player_id as usize;
        state.player_upgrades_in_progress[owner] &= !upgrade;
    }

    let building = &mut state.entities[building_index];
    building.queue.remove(item_index);
    if item_index == 0 {
        // The in-flight item was cancelled; restart on the next one.
        building.timer = building.queue.first().map_or(0, |next| next.duration());
    }
}

/// Per-tick progress for a finished building's queue.
pub(crate) fn update_building(state: &mut MatchState, building_index: usize) {
    let Some(&item) = state.entities[building_index].queue.first() else {
        return;
    };
    let player_id = state.entities[building_index].player_id;

    match state.entities[building_index].timer {
        BUILDING_QUEUE_BLOCKED => {
            // Waiting on population room.
            if let BuildingQueueItem::Unit(unit_type) = item {
                let cost = unit_type.data().unit.map_or(0, |unit| unit.population_cost);
                if player_population(state, player_id) + cost
                    <= player_max_population(state, player_id)
                {
                    try_complete(state, building_index, item);
                }
            }
        }
        BUILDING_QUEUE_EXIT_BLOCKED => try_complete(state, building_index, item),
        0 => try_complete(state, building_index, item),
        _ => state.entities[building_index].timer -= 1,
    }
}

fn try_complete(state: &mut MatchState, building_index: usize, item: BuildingQueueItem) {
    let player_id = state.entities[building_index].player_id;
    match item {
        BuildingQueueItem::Upgrade(upgrade) => {
            state.player_upgrades[player_id as usize] |= upgrade;
            state.player_upgrades_in_progress[player_id as usize] &= !upgrade;
            let cell = state.entities[building_index].cell;
            let cell_size = state.entities[building_index].cell_size();
            state.events.push(MatchEvent::Alert {
                alert_type: AlertType::ResearchFinished,
                player_id,
                cell,
                cell_size,
            });
            advance_queue(state, building_index);
        }
        BuildingQueueItem::Unit(unit_type) => {
            let population_cost = unit_type.data().unit.map_or(0, |unit| unit.population_cost);
            if player_population(state, player_id) + population_cost
                > player_max_population(state, player_id)
            {
                if state.entities[building_index].timer != BUILDING_QUEUE_BLOCKED {
                    state.entities[building_index].timer = BUILDING_QUEUE_BLOCKED;
                    state.events.push(MatchEvent::Status {
                        player_id,
                        message: STATUS_NOT_ENOUGH_HOUSE,
                    });
                }
                return;
            }

            let building_cell = state.entities[building_index].cell;
            let building_size = state.entities[building_index].cell_size();
            let rally_point = state.entities[building_index].rally_point;
            // Spawn on the ring cell nearest the rally point, or nearest
            // the building itself without one.
            let toward = if rally_point.x == -1 { building_cell } else { rally_point };
            let Some(spawn_cell) = find_free_cell_around_rect(
                &state.map,
                &state.entities,
                toward,
                unit_type.cell_size(),
                building_cell,
                building_size,
                false,
                None,
            ) else {
                if state.entities[building_index].timer != BUILDING_QUEUE_EXIT_BLOCKED {
                    state.entities[building_index].timer = BUILDING_QUEUE_EXIT_BLOCKED;
                    state.events.push(MatchEvent::Status {
                        player_id,
                        message: STATUS_BUILDING_EXIT_BLOCKED,
                    });
                }
                return;
            };

            let unit_id = behavior::create_entity(state, unit_type, player_id, spawn_cell);
            state.events.push(MatchEvent::Alert {
                alert_type: AlertType::UnitTrained,
                player_id,
                cell: spawn_cell,
                cell_size: unit_type.cell_size(),
            });

            // Dispatch to the rally point; rallying onto a gold mine
            // sends the unit to work.
            if rally_point.x != -1 {
                let rally_target = rally_target_for(&state.map, &state.entities, rally_point);
                if let Some(unit) = state.entities.get_by_id_mut(unit_id) {
                    behavior::set_target(unit, rally_target);
                }
            }

            advance_queue(state, building_index);
        }
    }
}

fn rally_target_for(
    map: &crate::map::Map,
    entities: &crate::entity::IdArray<crate::entity::Entity>,
    rally_point: crate::math::IVec2,
) -> Target {
    if map.is_cell_in_bounds(rally_point) {
        let cell_value = map.get_cell(rally_point);
        if cell_value < ID_NULL {
            if let Some(entity) = entities.get_by_id(cell_value) {
                if entity.entity_type == EntityType::GoldMine {
                    return Target::Gold(cell_value);
                }
            }
        }
    }
    Target::Cell(rally_point)
}

fn advance_queue(state: &mut MatchState, building_index: usize) {
    let building = &mut state.entities[building_index];
    building.queue.remove(0);
    building.timer = building.queue.first().map_or(0, |next| next.duration());
}

#[cfg(test)]
mod tests {
    use super::{player_max_population, player_population, POPULATION_PER_HOUSE};
    use crate::entity::{Entity, EntityMode, EntityType};
    use crate::math::ivec2;
    use crate::state::{MatchState, Player, PlayerStatus};

    fn bare_state() -> MatchState {
        let mut players = [Player::default(); crate::MAX_PLAYERS];
        players[0] = Player {
            status: PlayerStatus::Playing,
            team: 0,
        };
        MatchState::bare(32, 32, players, 7)
    }

    #[test]
    fn population_counts_live_units_only() {
        let mut state = bare_state();
        state.entities.push(Entity::new(
            EntityType::Miner,
            0,
            ivec2(1, 1),
            EntityMode::UnitIdle,
        ));
        let mut dead = Entity::new(EntityType::Cowboy, 0, ivec2(2, 1), EntityMode::UnitIdle);
        dead.health = 0;
        state.entities.push(dead);
        state.entities.push(Entity::new(
            EntityType::Wagon,
            0,
            ivec2(4, 4),
            EntityMode::UnitIdle,
        ));

        assert_eq!(player_population(&state, 0), 1 + 2);
    }

    #[test]
    fn max_population_requires_finished_houses() {
        let mut state = bare_state();
        state.entities.push(Entity::new(
            EntityType::House,
            0,
            ivec2(1, 1),
            EntityMode::BuildingFinished,
        ));
        state.entities.push(Entity::new(
            EntityType::House,
            0,
            ivec2(4, 1),
            EntityMode::BuildingInProgress,
        ));

        assert_eq!(player_max_population(&state, 0), POPULATION_PER_HOUSE);
    }
}
