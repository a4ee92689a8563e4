// SPDX-License-Identifier: Apache-2.0

//! The per-tick entity state machine: movement with cell handoff,
//! combat, construction, repair, garrisons, mining, land mines, smoke
//! and deaths.
//!
//! Entities update once per tick in store order. All mutation flows
//! through `MatchState`; nothing here touches wall clocks, floats or
//! hash-map iteration order, so two peers stepping the same state reach
//! the same bytes.

use crate::entity::{
    cell_center, production, Animation, AnimationName, Entity, EntityId, EntityMode, EntityType,
    Target, BUILDING_FADE_DURATION, ENTITY_FLAG_DAMAGE_FLICKER, ENTITY_FLAG_HOLD_POSITION,
    ENTITY_FLAG_INVISIBLE, ENTITY_UNLOAD_ALL, GOLD_PATCH_ID_NULL, ID_NULL, PLAYER_NONE,
    UPGRADE_EXPLOSIVES,
};
use crate::event::{
    AlertType, MatchEvent, SoundName, STATUS_BUILDING_EXIT_BLOCKED, STATUS_CANT_BUILD,
    STATUS_MINE_EXIT_BLOCKED, STATUS_NOT_ENOUGH_GOLD, STATUS_REPAIR_TARGET_INVALID,
    STATUS_UNDER_ATTACK,
};
use crate::map::fog::fog_update;
use crate::map::{
    find_free_cell_around_rect, get_nearest_cell_around_rect, get_nearest_cell_in_rect,
    is_cell_rect_occupied, pathfind::pathfind, CELL_EMPTY,
};
use crate::math::{Direction, Fixed, IVec2};
use crate::state::{MatchState, MapReveal, Projectile, ProjectileSprite};

/// Ticks a blocked mover waits before re-pathing.
pub const PATH_PAUSE_DURATION: u32 = 20;
/// Consecutive pathfinding failures before an order is dropped.
pub const PATHFIND_ATTEMPTS_MAX: u32 = 4;
/// Ticks between construction credit points.
pub const BUILD_TICK_DURATION: u32 = 8;
/// Ticks between repair credit points.
pub const REPAIR_TICK_DURATION: u32 = 8;
/// Hit points a fresh construction site starts with.
pub const BUILDING_STARTING_HEALTH: i32 = 10;
/// Ticks a miner spends inside a gold mine per trip.
pub const MINE_DURATION: u32 = 75;
/// Gold carried out per mining trip.
pub const GOLD_PER_TRIP: u32 = 10;
/// Ticks between blocked-exit retries inside a mine.
pub const MINE_EXIT_RETRY: u32 = 10;
/// Smoke bomb recharge in ticks.
pub const SMOKE_COOLDOWN_DURATION: u32 = 600;
/// Squared throw range of a smoke bomb.
pub const SMOKE_RANGE_SQUARED: i32 = 49;
/// Ticks a smoke reveal lasts once the bomb lands.
pub const SMOKE_REVEAL_DURATION: u32 = 300;
/// Sight granted by a smoke reveal.
pub const SMOKE_REVEAL_SIGHT: i32 = 4;
/// Blast reach of sappers and land mines, in manhattan cells.
pub const EXPLODE_RADIUS: i32 = 2;
/// Ticks of the under-attack indicator.
pub const TAKING_DAMAGE_DURATION: u32 = 30;
/// Ticks between idle health regeneration points.
pub const HEALTH_REGEN_DURATION: u32 = 180;

/// Replaces an entity's active order. Clears the stale path, the retry
/// counter and hold-position; remembers gold orders for resumption.
pub(crate) fn set_target(entity: &mut Entity, target: Target) {
    entity.path.clear();
    entity.pathfind_attempts = 0;
    entity.set_flag(ENTITY_FLAG_HOLD_POSITION, false);
    if let Target::Gold(_) = target {
        entity.remembered_gold_target = target;
    }
    entity.target = target;
    if entity.entity_type.is_unit()
        && matches!(
            entity.mode,
            EntityMode::UnitMove | EntityMode::UnitMoveBlocked | EntityMode::UnitMoveFinished
        )
    {
        entity.mode = EntityMode::UnitIdle;
    }
}

/// Pops the next queued order, or goes idle.
fn pop_target_queue(entity: &mut Entity) {
    if entity.target_queue.is_empty() {
        set_target(entity, Target::None);
    } else {
        let next = entity.target_queue.remove(0);
        set_target(entity, next);
    }
}

/// Creates a live entity, stamps its footprint and reveals its sight.
///
/// Public because match bootstrap and scenario tooling place entities
/// directly; in-match creation otherwise flows through production and
/// build orders.
pub fn create_entity(
    state: &mut MatchState,
    entity_type: EntityType,
    player_id: u8,
    cell: IVec2,
) -> EntityId {
    let mode = if entity_type.is_unit() {
        EntityMode::UnitIdle
    } else if entity_type == EntityType::LandMine {
        EntityMode::MineArm
    } else {
        EntityMode::BuildingFinished
    };
    let mut entity = Entity::new(entity_type, player_id, cell, mode);
    if entity_type == EntityType::LandMine {
        entity.animation = Animation::start(AnimationName::MineArm);
        entity.set_flag(ENTITY_FLAG_INVISIBLE, true);
    }
    let id = state.entities.push(entity);
    let size = entity_type.cell_size();
    if entity_type == EntityType::LandMine {
        let index = state.map.index(cell);
        state.map.mine_cells[index] = id;
    } else {
        state.map.set_cell_rect(cell, size, id);
    }
    let data = entity_type.data();
    let team = state.team_of(player_id);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        cell,
        size,
        data.sight,
        true,
        data.has_detection,
    );
    id
}

/// Manhattan distance between `cell` and the nearest cell of a rect.
fn manhattan_distance_to_rect(cell: IVec2, rect_position: IVec2, rect_size: i32) -> i32 {
    let nearest = get_nearest_cell_in_rect(cell, rect_position, rect_size);
    IVec2::manhattan_distance(cell, nearest)
}

/// Squared euclidean distance between `cell` and the nearest cell of a
/// rect (range checks against multi-cell targets).
fn distance_squared_to_rect(cell: IVec2, rect_position: IVec2, rect_size: i32) -> i32 {
    let nearest = get_nearest_cell_in_rect(cell, rect_position, rect_size);
    IVec2::euclidean_distance_squared(cell, nearest)
}

/// Updates the entity at dense `index` for one tick.
pub fn entity_update(state: &mut MatchState, index: usize) {
    tick_timers(state, index);

    match state.entities[index].entity_type {
        EntityType::GoldMine => gold_mine_update(state, index),
        EntityType::LandMine => land_mine_update(state, index),
        ty if ty.is_building() => building_update(state, index),
        _ => unit_update(state, index),
    }
}

fn tick_timers(state: &mut MatchState, index: usize) {
    let entity = &mut state.entities[index];
    if entity.cooldown_timer > 0 {
        entity.cooldown_timer -= 1;
    }
    if entity.taking_damage_timer > 0 {
        entity.taking_damage_timer -= 1;
        if entity.taking_damage_timer == 0 {
            entity.set_flag(ENTITY_FLAG_DAMAGE_FLICKER, false);
        }
    }

    // Idle units slowly close their wounds.
    if entity.entity_type.is_unit()
        && entity.health > 0
        && entity.health < entity.data().max_health
        && entity.mode == EntityMode::UnitIdle
    {
        entity.health_regen_timer += 1;
        if entity.health_regen_timer >= HEALTH_REGEN_DURATION {
            entity.health_regen_timer = 0;
            entity.health += 1;
        }
    } else {
        entity.health_regen_timer = 0;
    }
}

fn gold_mine_update(state: &mut MatchState, index: usize) {
    match state.entities[index].mode {
        EntityMode::Gold => {
            if state.entities[index].gold_held == 0 {
                collapse_gold_mine(state, index);
            }
        }
        EntityMode::GoldMinedOut => {
            if state.entities[index].timer > 0 {
                state.entities[index].timer -= 1;
            }
        }
        _ => {}
    }
}

fn collapse_gold_mine(state: &mut MatchState, index: usize) {
    let mine_id = state.entities.id_of(index);
    let mine_cell = state.entities[index].cell;
    state.entities[index].mode = EntityMode::GoldMinedOut;
    state.entities[index].timer = 1;

    state.events.push(MatchEvent::Sound {
        sound: SoundName::GoldMineCollapse,
        position: mine_cell,
    });

    // Anyone working this patch loses the order and hears about it.
    let mut notified = [false; crate::MAX_PLAYERS];
    for other_index in 0..state.entities.len() {
        if other_index == index {
            continue;
        }
        let worked_here = state.entities[other_index].gold_patch_id == mine_id;
        if !worked_here {
            continue;
        }
        let player_id = state.entities[other_index].player_id;
        state.entities[other_index].gold_patch_id = GOLD_PATCH_ID_NULL;
        state.entities[other_index].remembered_gold_target = Target::None;
        if matches!(state.entities[other_index].target, Target::Gold(id) if id == mine_id) {
            pop_target_queue(&mut state.entities[other_index]);
        }
        if player_id != PLAYER_NONE && !notified[player_id as usize] {
            notified[player_id as usize] = true;
            state.events.push(MatchEvent::Status {
                player_id,
                message: crate::event::STATUS_MINE_COLLAPSED,
            });
            state.events.push(MatchEvent::Alert {
                alert_type: AlertType::MineCollapsed,
                player_id,
                cell: mine_cell,
                cell_size: EntityType::GoldMine.cell_size(),
            });
        }
    }
}

fn land_mine_update(state: &mut MatchState, index: usize) {
    // A shot mine goes off; one already detonating must not re-trigger.
    if state.entities[index].health <= 0 {
        if matches!(
            state.entities[index].mode,
            EntityMode::MineArm | EntityMode::MinePrime
        ) {
            let id = state.entities.id_of(index);
            explode(state, id);
        } else {
            state.entities[index].animation.update();
        }
        return;
    }
    match state.entities[index].mode {
        EntityMode::MineArm => {
            state.entities[index].animation.update();
            if !state.entities[index].animation.is_playing {
                state.entities[index].mode = EntityMode::MinePrime;
            }
        }
        EntityMode::MinePrime => {
            // Trip on any adjacent enemy unit.
            let mine_cell = state.entities[index].cell;
            let mine_player = state.entities[index].player_id;
            let mine_team = state.team_of(mine_player);
            let mut tripped = false;
            for other_index in 0..state.entities.len() {
                let other = &state.entities[other_index];
                if !other.entity_type.is_unit()
                    || other.health <= 0
                    || other.garrison_id != ID_NULL
                    || other.player_id == PLAYER_NONE
                    || state.team_of(other.player_id) == mine_team
                {
                    continue;
                }
                if IVec2::manhattan_distance(other.cell, mine_cell) <= 1 {
                    tripped = true;
                    break;
                }
            }
            if tripped {
                let id = state.entities.id_of(index);
                explode(state, id);
            }
        }
        _ => {}
    }
}

fn building_update(state: &mut MatchState, index: usize) {
    // Zero health turns any building state into a lingering wreck.
    if state.entities[index].health <= 0
        && state.entities[index].mode != EntityMode::BuildingDestroyed
    {
        destroy_building(state, index);
        return;
    }

    match state.entities[index].mode {
        EntityMode::BuildingInProgress => {
            if state.entities[index].health >= state.entities[index].data().max_health {
                state.entities[index].health = state.entities[index].data().max_health;
                state.entities[index].mode = EntityMode::BuildingFinished;
                let cell = state.entities[index].cell;
                let cell_size = state.entities[index].cell_size();
                let player_id = state.entities[index].player_id;
                state.events.push(MatchEvent::Alert {
                    alert_type: AlertType::BuildingFinished,
                    player_id,
                    cell,
                    cell_size,
                });
            }
        }
        EntityMode::BuildingFinished => production::update_building(state, index),
        EntityMode::BuildingDestroyed => {
            if state.entities[index].timer > 0 {
                state.entities[index].timer -= 1;
            }
        }
        _ => {}
    }
}

fn destroy_building(state: &mut MatchState, index: usize) {
    // Refund nothing, but release in-progress research bits so the
    // upgrades can be queued elsewhere.
    let owner = state.entities[index].player_id as usize;
    let queue = core::mem::take(&mut state.entities[index].queue);
    for item in queue {
        if let crate::entity::BuildingQueueItem::Upgrade(upgrade) = item {
            state.player_upgrades_in_progress[owner] &= !upgrade;
        }
    }

    state.entities[index].mode = EntityMode::BuildingDestroyed;
    state.entities[index].timer = BUILDING_FADE_DURATION;
    state.entities[index].animation = Animation::start(AnimationName::BuildingDestroyed);
    let cell = state.entities[index].cell;
    state.events.push(MatchEvent::Sound {
        sound: SoundName::BuildingCollapse,
        position: cell,
    });

    // Passengers die with a collapsing bunker.
    let garrisoned = core::mem::take(&mut state.entities[index].garrisoned_units);
    for unit_id in garrisoned {
        if let Some(unit) = state.entities.get_by_id_mut(unit_id) {
            unit.health = 0;
        }
    }
}

#[allow(clippy::too_many_lines)]
fn unit_update(state: &mut MatchState, index: usize) {
    // Passengers ride; their own machine is paused until unload.
    if state.entities[index].garrison_id != ID_NULL {
        return;
    }

    // Death transition happens before anything else.
    if state.entities[index].health <= 0
        && !matches!(
            state.entities[index].mode,
            EntityMode::UnitDeath | EntityMode::UnitDeathFade | EntityMode::UnitMine
        )
        && state.entities[index].garrison_id == ID_NULL
    {
        begin_death(state, index);
        return;
    }

    match state.entities[index].mode {
        EntityMode::UnitDeath => {
            state.entities[index].animation.update();
            if !state.entities[index].animation.is_playing {
                state.entities[index].mode = EntityMode::UnitDeathFade;
                state.entities[index].animation = Animation::start(AnimationName::UnitDeathFade);
            }
            return;
        }
        EntityMode::UnitDeathFade => {
            state.entities[index].animation.update();
            return;
        }
        EntityMode::UnitMine => {
            mine_interior_update(state, index);
            return;
        }
        EntityMode::UnitOutMine => {
            // Stepping out blends straight back into order processing.
            state.entities[index].mode = EntityMode::UnitIdle;
        }
        EntityMode::UnitMoveBlocked => {
            if state.entities[index].timer > 0 {
                state.entities[index].timer -= 1;
            }
            if state.entities[index].timer == 0 {
                state.entities[index].mode = EntityMode::UnitIdle;
                state.entities[index].path.clear();
                state.entities[index].pathfind_attempts += 1;
                if state.entities[index].pathfind_attempts >= PATHFIND_ATTEMPTS_MAX {
                    pop_target_queue(&mut state.entities[index]);
                }
            }
            return;
        }
        EntityMode::UnitAttackWindup | EntityMode::UnitSoldierRangedWindup => {
            attack_windup_update(state, index);
            return;
        }
        EntityMode::UnitTinkerThrow => {
            smoke_windup_update(state, index);
            return;
        }
        EntityMode::UnitBuild => {
            construction_update(state, index);
            return;
        }
        EntityMode::UnitRepair => {
            repair_update(state, index);
            return;
        }
        _ => {}
    }

    // Attack cooldown runs while the unit does anything else.
    if state.entities[index].timer > 0 {
        state.entities[index].timer -= 1;
    }

    process_orders(state, index);

    if state.entities[index].mode == EntityMode::UnitMove {
        step_along_path(state, index);
    }

    state.entities[index].animation.update();
}

fn begin_death(state: &mut MatchState, index: usize) {
    let id = state.entities.id_of(index);
    let entity = &mut state.entities[index];
    let cell = entity.cell;
    let cell_size = entity.cell_size();
    let player_id = entity.player_id;
    let sight = entity.data().sight;
    let has_detection = entity.data().has_detection;
    entity.mode = EntityMode::UnitDeath;
    entity.animation = Animation::start(AnimationName::UnitDeath);
    entity.target = Target::None;
    entity.target_queue.clear();
    entity.path.clear();

    // Anyone riding inside dies with the carrier.
    let garrisoned = core::mem::take(&mut state.entities[index].garrisoned_units);
    for unit_id in garrisoned {
        if let Some(unit) = state.entities.get_by_id_mut(unit_id) {
            unit.health = 0;
        }
    }

    // The corpse stops blocking and stops seeing immediately. A builder
    // hidden inside a construction site holds no cells and already gave
    // its sight up, so only an on-map footprint is released.
    let on_map = state.map.get_cell(cell) == id;
    if on_map {
        for y in cell.y..cell.y + cell_size {
            for x in cell.x..cell.x + cell_size {
                let map_index = state.map.index(crate::math::ivec2(x, y));
                if state.map.cells[map_index] == id {
                    state.map.cells[map_index] = CELL_EMPTY;
                }
            }
        }
        let team = state.team_of(player_id);
        fog_update(
            &mut state.map,
            &state.entities,
            team,
            cell,
            cell_size,
            sight,
            false,
            has_detection,
        );
    }
    state.events.push(MatchEvent::Sound {
        sound: SoundName::Death,
        position: cell,
    });
}

// ── Orders ───────────────────────────────────────────────────────────

fn process_orders(state: &mut MatchState, index: usize) {
    match state.entities[index].target {
        Target::None => {
            if state.entities[index].mode == EntityMode::UnitMoveFinished {
                state.entities[index].mode = EntityMode::UnitIdle;
            }
            if !state.entities[index].target_queue.is_empty() {
                pop_target_queue(&mut state.entities[index]);
                return;
            }
            idle_auto_acquire(state, index);
        }
        Target::Cell(cell) => {
            if state.entities[index].cell == cell
                || (state.entities[index].mode == EntityMode::UnitMoveFinished
                    && state.entities[index].path.is_empty())
            {
                state.entities[index].mode = EntityMode::UnitIdle;
                pop_target_queue(&mut state.entities[index]);
                return;
            }
            walk_toward(state, index, cell);
        }
        Target::AttackCell(cell) => {
            // Engage anything that shows up on the way.
            if let Some(enemy_id) = find_attack_target(state, index) {
                let entity = &mut state.entities[index];
                entity.target_queue.insert(0, Target::AttackCell(cell));
                entity.path.clear();
                entity.pathfind_attempts = 0;
                entity.target = Target::AttackEntity(enemy_id);
                return;
            }
            if state.entities[index].cell == cell
                || (state.entities[index].mode == EntityMode::UnitMoveFinished
                    && state.entities[index].path.is_empty())
            {
                state.entities[index].mode = EntityMode::UnitIdle;
                pop_target_queue(&mut state.entities[index]);
                return;
            }
            walk_toward(state, index, cell);
        }
        Target::Unload(cell) => {
            if state.entities[index].cell == cell
                || (state.entities[index].mode == EntityMode::UnitMoveFinished
                    && state.entities[index].path.is_empty())
            {
                state.entities[index].mode = EntityMode::UnitIdle;
                unload_unit(state, index, ENTITY_UNLOAD_ALL);
                pop_target_queue(&mut state.entities[index]);
                return;
            }
            walk_toward(state, index, cell);
        }
        Target::Smoke(cell) => smoke_order(state, index, cell),
        Target::Entity(id) => entity_order(state, index, id),
        Target::AttackEntity(id) => attack_entity_order(state, index, id),
        Target::Repair { id, .. } => repair_order(state, index, id),
        Target::Build(build) => build_order(state, index, build),
        Target::BuildAssist(id) => build_assist_order(state, index, id),
        Target::Gold(id) => gold_order(state, index, id),
    }
}

// Keep walking toward `goal`, repathing when the path ran out.
fn walk_toward(state: &mut MatchState, index: usize, goal: IVec2) {
    if state.entities[index].mode == EntityMode::UnitMove {
        return;
    }
    let from = state.entities[index].cell;
    if from == goal {
        state.entities[index].mode = EntityMode::UnitMoveFinished;
        return;
    }
    let cell_size = state.entities[index].cell_size();
    let gold_walk = state.entities[index].is_mining();
    let path = pathfind(&state.map, &state.entities, from, goal, cell_size, gold_walk, None);
    let entity = &mut state.entities[index];
    if path.is_empty() {
        entity.pathfind_attempts += 1;
        if entity.pathfind_attempts >= PATHFIND_ATTEMPTS_MAX {
            pop_target_queue(entity);
        } else {
            entity.mode = EntityMode::UnitMoveFinished;
        }
        return;
    }
    entity.path = path;
    entity.pathfind_attempts = 0;
    entity.mode = EntityMode::UnitMove;
    if entity.animation.name != AnimationName::UnitMove {
        entity.animation = Animation::start(AnimationName::UnitMove);
    }
}

fn step_along_path(state: &mut MatchState, index: usize) {
    let speed = state.entities[index]
        .data()
        .unit
        .map_or(Fixed::ZERO, |unit| unit.speed);
    let mut movement_left = speed;

    while movement_left > Fixed::ZERO {
        let entity = &state.entities[index];
        let step_goal = cell_center(entity.cell, entity.cell_size());

        if entity.position == step_goal {
            // At a cell center: take the next step or finish.
            if state.entities[index].path.is_empty() {
                state.entities[index].mode = EntityMode::UnitMoveFinished;
                break;
            }
            let next_cell = state.entities[index].path[0];
            let from_cell = state.entities[index].cell;
            if let Some(direction) = Direction::from_step(next_cell - from_cell) {
                state.entities[index].direction = direction;
            }

            let cell_size = state.entities[index].cell_size();
            let gold_walk = state.entities[index].is_mining();
            if is_cell_rect_occupied(&state.map, &state.entities, next_cell, cell_size, from_cell, gold_walk)
            {
                state.entities[index].mode = EntityMode::UnitMoveBlocked;
                state.entities[index].timer = PATH_PAUSE_DURATION;
                break;
            }

            // Hand the footprint over to the next cell, fog included.
            let id = state.entities.id_of(index);
            let player_id = state.entities[index].player_id;
            let sight = state.entities[index].data().sight;
            let has_detection = state.entities[index].data().has_detection;
            let team = state.team_of(player_id);
            state.map.set_cell_rect(from_cell, cell_size, CELL_EMPTY);
            fog_update(
                &mut state.map,
                &state.entities,
                team,
                from_cell,
                cell_size,
                sight,
                false,
                has_detection,
            );
            state.entities[index].cell = next_cell;
            state.map.set_cell_rect(next_cell, cell_size, id);
            fog_update(
                &mut state.map,
                &state.entities,
                team,
                next_cell,
                cell_size,
                sight,
                true,
                has_detection,
            );
            state.entities[index].path.remove(0);
            state.entities[index].timer = 0;
        }

        // Advance the sub-cell position toward the current cell center.
        let entity = &mut state.entities[index];
        let step_goal = cell_center(entity.cell, entity.cell_size());
        let distance_to_goal = entity.position.distance_to(step_goal);
        if distance_to_goal > movement_left {
            let step = entity.direction.step();
            entity.position += step.to_fvec() * movement_left;
            movement_left = Fixed::ZERO;
        } else {
            entity.position = step_goal;
            movement_left -= distance_to_goal;
            if entity.path.is_empty() {
                movement_left = Fixed::ZERO;
                if entity.mode == EntityMode::UnitMove {
                    entity.mode = EntityMode::UnitMoveFinished;
                }
            }
        }
    }
}

// ── Combat ───────────────────────────────────────────────────────────

fn can_see_entity(state: &MatchState, viewer_team: usize, target: &Entity) -> bool {
    if !target.has_flag(ENTITY_FLAG_INVISIBLE) {
        return true;
    }
    state.map.is_cell_detected(viewer_team, target.cell)
}

// Store-order scan for the best visible enemy: highest attack priority
// first, then squared distance, then store order.
fn find_attack_target(state: &MatchState, index: usize) -> Option<EntityId> {
    let attacker = &state.entities[index];
    let unit_data = attacker.data().unit?;
    if unit_data.damage == 0 {
        return None;
    }
    let team = state.team_of(attacker.player_id);
    let reach = if attacker.has_flag(ENTITY_FLAG_HOLD_POSITION) {
        unit_data.range_squared
    } else {
        attacker.data().sight * attacker.data().sight
    };

    let mut best: Option<(u32, i32, EntityId)> = None;
    for other_index in 0..state.entities.len() {
        if other_index == index {
            continue;
        }
        let other = &state.entities[other_index];
        if other.player_id == PLAYER_NONE
            || state.team_of(other.player_id) == team
            || other.health <= 0
            || other.garrison_id != ID_NULL
            || matches!(
                other.mode,
                EntityMode::UnitDeath
                    | EntityMode::UnitDeathFade
                    | EntityMode::UnitMine
                    | EntityMode::BuildingDestroyed
            )
            || other.entity_type == EntityType::GoldMine
        {
            continue;
        }
        if !can_see_entity(state, team, other) {
            continue;
        }
        let dist = distance_squared_to_rect(attacker.cell, other.cell, other.cell_size());
        if dist > reach {
            continue;
        }
        let priority = other.data().attack_priority;
        let better = match best {
            None => true,
            Some((best_priority, best_dist, _)) => {
                priority > best_priority || (priority == best_priority && dist < best_dist)
            }
        };
        if better {
            best = Some((priority, dist, state.entities.id_of(other_index)));
        }
    }
    best.map(|(_, _, id)| id)
}

fn idle_auto_acquire(state: &mut MatchState, index: usize) {
    if state.entities[index].mode != EntityMode::UnitIdle {
        return;
    }
    // Workers keep working; they fight only when ordered to.
    if matches!(
        state.entities[index].entity_type,
        EntityType::Miner | EntityType::Tinker
    ) {
        return;
    }
    if let Some(enemy_id) = find_attack_target(state, index) {
        // Assigned directly rather than through set_target: holding units
        // keep their flag while they return fire.
        let entity = &mut state.entities[index];
        entity.target = Target::AttackEntity(enemy_id);
        entity.path.clear();
        entity.pathfind_attempts = 0;
    }
}

fn attack_entity_order(state: &mut MatchState, index: usize, target_id: EntityId) {
    let Some(target_index) = state.entities.index_of(target_id) else {
        pop_target_queue(&mut state.entities[index]);
        return;
    };

    // Targets that died, hid, or cloaked away stop being chased.
    let team = state.team_of(state.entities[index].player_id);
    let drop_target = {
        let target = &state.entities[target_index];
        target.health <= 0
            || target.garrison_id != ID_NULL
            || matches!(
                target.mode,
                EntityMode::UnitDeath
                    | EntityMode::UnitDeathFade
                    | EntityMode::UnitMine
                    | EntityMode::BuildingDestroyed
            )
            || !can_see_entity(state, team, target)
    };
    if drop_target {
        pop_target_queue(&mut state.entities[index]);
        return;
    }

    let Some(unit_data) = state.entities[index].data().unit else {
        pop_target_queue(&mut state.entities[index]);
        return;
    };
    if unit_data.damage == 0 {
        pop_target_queue(&mut state.entities[index]);
        return;
    }

    let target_cell = state.entities[target_index].cell;
    let target_size = state.entities[target_index].cell_size();
    let dist = distance_squared_to_rect(state.entities[index].cell, target_cell, target_size);

    if dist <= unit_data.range_squared && dist >= unit_data.min_range_squared {
        // In range: wind up, if the cooldown allows.
        if state.entities[index].timer > 0 {
            return;
        }
        let my_cell = state.entities[index].cell;
        let nearest = get_nearest_cell_in_rect(my_cell, target_cell, target_size);
        if let Some(direction) = Direction::from_step(IVec2 {
            x: (nearest.x - my_cell.x).signum(),
            y: (nearest.y - my_cell.y).signum(),
        }) {
            state.entities[index].direction = direction;
        }
        let is_soldier_ranged =
            state.entities[index].entity_type == EntityType::Soldier && dist > 2;
        state.entities[index].mode = if is_soldier_ranged {
            EntityMode::UnitSoldierRangedWindup
        } else {
            EntityMode::UnitAttackWindup
        };
        state.entities[index].animation = Animation::start(AnimationName::UnitAttack);
        return;
    }

    // Out of range: chase unless holding position.
    if state.entities[index].has_flag(ENTITY_FLAG_HOLD_POSITION) {
        return;
    }
    if dist < unit_data.min_range_squared {
        // Inside the dead zone with nowhere sensible to go; stand fast.
        return;
    }
    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        state.entities[index].cell,
        state.entities[index].cell_size(),
        target_cell,
        target_size,
        false,
        None,
    );
    // Moving targets invalidate old paths.
    if state.entities[index].path.last().copied() != Some(goal)
        && state.entities[index].mode == EntityMode::UnitMove
    {
        state.entities[index].path.clear();
        state.entities[index].mode = EntityMode::UnitIdle;
    }
    walk_toward(state, index, goal);
}

fn attack_windup_update(state: &mut MatchState, index: usize) {
    state.entities[index].animation.update();
    if state.entities[index].animation.is_playing {
        return;
    }

    // The windup lands: deal the hit if the target is still in reach.
    let Some(unit_data) = state.entities[index].data().unit else {
        state.entities[index].mode = EntityMode::UnitIdle;
        return;
    };
    let target_id = match state.entities[index].target {
        Target::AttackEntity(id) => id,
        _ => {
            state.entities[index].mode = EntityMode::UnitIdle;
            return;
        }
    };
    state.entities[index].mode = EntityMode::UnitIdle;
    state.entities[index].timer = unit_data.attack_cooldown;
    state.entities[index].animation = Animation::start(AnimationName::UnitIdle);

    let Some(target_index) = state.entities.index_of(target_id) else {
        return;
    };
    let target_cell = state.entities[target_index].cell;
    let target_size = state.entities[target_index].cell_size();
    let dist = distance_squared_to_rect(state.entities[index].cell, target_cell, target_size);
    if dist > unit_data.range_squared || state.entities[target_index].health <= 0 {
        return;
    }

    let sound = match state.entities[index].entity_type {
        EntityType::Cannon => SoundName::Cannon,
        EntityType::Miner | EntityType::Bandit | EntityType::Sapper => SoundName::Pickaxe,
        _ => SoundName::Gunshot,
    };
    let position = state.entities[index].cell;
    state.events.push(MatchEvent::Sound { sound, position });

    deal_damage(state, index, target_index, unit_data.damage);
}

/// Applies `damage` from attacker to defender, with armor, flicker and
/// the rate-limited under-attack alert.
pub(crate) fn deal_damage(
    state: &mut MatchState,
    _attacker_index: usize,
    target_index: usize,
    damage: i32,
) {
    let armor = state.entities[target_index].data().armor;
    let dealt = (damage - armor).max(1);
    let target = &mut state.entities[target_index];
    target.health = (target.health - dealt).max(0);
    target.set_flag(ENTITY_FLAG_DAMAGE_FLICKER, true);

    let owner = target.player_id;
    let was_calm = target.taking_damage_timer == 0;
    target.taking_damage_timer = TAKING_DAMAGE_DURATION;
    let cell = target.cell;
    let cell_size = target.cell_size();
    if owner != PLAYER_NONE && was_calm {
        state.events.push(MatchEvent::Status {
            player_id: owner,
            message: STATUS_UNDER_ATTACK,
        });
        state.events.push(MatchEvent::Alert {
            alert_type: AlertType::UnderAttack,
            player_id: owner,
            cell,
            cell_size,
        });
    }
}

/// Detonates the entity with `id`: area damage around it, then death.
pub(crate) fn explode(state: &mut MatchState, id: EntityId) {
    let Some(index) = state.entities.index_of(id) else {
        return;
    };
    let cell = state.entities[index].cell;
    let cell_size = state.entities[index].cell_size();
    let damage = state.entities[index]
        .data()
        .unit
        .map_or(50, |unit| unit.damage);

    state.events.push(MatchEvent::Sound {
        sound: SoundName::Explosion,
        position: cell,
    });

    // Collect victims first; damage shifts nothing in the store.
    let mut victims = Vec::new();
    for other_index in 0..state.entities.len() {
        if other_index == index {
            continue;
        }
        let other = &state.entities[other_index];
        if other.health <= 0 || other.garrison_id != ID_NULL {
            continue;
        }
        // Neutral rock, rubble, and anyone underground are spared.
        if other.entity_type == EntityType::GoldMine
            || matches!(
                other.mode,
                EntityMode::BuildingDestroyed | EntityMode::UnitMine
            )
        {
            continue;
        }
        let dist = manhattan_distance_to_rect(
            get_nearest_cell_in_rect(other.cell, cell, cell_size),
            other.cell,
            other.cell_size(),
        );
        if dist <= EXPLODE_RADIUS {
            victims.push(other_index);
        }
    }
    for victim in victims {
        deal_damage(state, index, victim, damage);
    }

    // The charge consumes its carrier.
    if state.entities[index].entity_type == EntityType::LandMine {
        let mine_index = state.map.index(cell);
        state.map.mine_cells[mine_index] = ID_NULL;
        state.entities[index].health = 0;
        state.entities[index].mode = EntityMode::UnitDeathFade;
        state.entities[index].animation = Animation::start(AnimationName::UnitDeathFade);
    } else {
        state.entities[index].health = 0;
    }
}

// ── Construction, repair, assist ─────────────────────────────────────

fn build_order(state: &mut MatchState, index: usize, build: crate::entity::BuildTarget) {
    if build.building_id != ID_NULL {
        // Construction already started; credit ticks happen in UnitBuild.
        state.entities[index].mode = EntityMode::UnitBuild;
        state.entities[index].timer = BUILD_TICK_DURATION;
        return;
    }

    let at_site = state.entities[index].cell == build.unit_cell;
    if !at_site {
        if state.entities[index].mode == EntityMode::UnitMoveFinished
            && state.entities[index].path.is_empty()
            && state.entities[index].cell != build.unit_cell
        {
            // Could not reach the site.
            state.entities[index].mode = EntityMode::UnitIdle;
            pop_target_queue(&mut state.entities[index]);
            return;
        }
        walk_toward(state, index, build.unit_cell);
        return;
    }

    let player_id = state.entities[index].player_id;
    if build.building_type == EntityType::LandMine {
        plant_land_mine(state, index, build);
        return;
    }

    // Validate the site now; the world may have changed since the click.
    let size = build.building_type.cell_size();
    let my_cell = state.entities[index].cell;
    let placeable = state.map.is_cell_rect_in_bounds(build.building_cell, size)
        && state
            .map
            .is_cell_rect_same_elevation(build.building_cell, crate::math::ivec2(size, size))
        && !is_cell_rect_occupied(
            &state.map,
            &state.entities,
            build.building_cell,
            size,
            my_cell,
            false,
        );
    if !placeable {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_CANT_BUILD,
        });
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    let cost = build.building_type.data().gold_cost;
    if state.player_gold[player_id as usize] < cost {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_NOT_ENOUGH_GOLD,
        });
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    state.player_gold[player_id as usize] -= cost;

    // The builder vanishes into the site; its sight comes back when it
    // steps out (or the order is cancelled).
    let builder_cell = state.entities[index].cell;
    let builder_size = state.entities[index].cell_size();
    let sight = state.entities[index].data().sight;
    let has_detection = state.entities[index].data().has_detection;
    let team = state.team_of(player_id);
    state.map.set_cell_rect(builder_cell, builder_size, CELL_EMPTY);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        builder_cell,
        builder_size,
        sight,
        false,
        has_detection,
    );

    let mut building = Entity::new(
        build.building_type,
        player_id,
        build.building_cell,
        EntityMode::BuildingInProgress,
    );
    building.health = BUILDING_STARTING_HEALTH;
    let building_id = state.entities.push(building);
    state.map.set_cell_rect(build.building_cell, size, building_id);
    let building_data = build.building_type.data();
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        build.building_cell,
        size,
        building_data.sight,
        true,
        building_data.has_detection,
    );

    let entity = &mut state.entities[index];
    entity.target = Target::Build(crate::entity::BuildTarget {
        building_id,
        ..build
    });
    entity.mode = EntityMode::UnitBuild;
    entity.timer = BUILD_TICK_DURATION;
    entity.animation = Animation::start(AnimationName::UnitBuild);
    state.events.push(MatchEvent::Sound {
        sound: SoundName::Hammer,
        position: build.building_cell,
    });
}

fn plant_land_mine(state: &mut MatchState, index: usize, build: crate::entity::BuildTarget) {
    let player_id = state.entities[index].player_id;
    if state.player_upgrades[player_id as usize] & UPGRADE_EXPLOSIVES == 0 {
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    let cost = EntityType::LandMine.data().gold_cost;
    if state.player_gold[player_id as usize] < cost {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_NOT_ENOUGH_GOLD,
        });
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    let mine_index = state.map.index(build.building_cell);
    if state.map.mine_cells[mine_index] != ID_NULL {
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    state.player_gold[player_id as usize] -= cost;
    create_entity(state, EntityType::LandMine, player_id, build.building_cell);
    pop_target_queue(&mut state.entities[index]);
}

fn construction_update(state: &mut MatchState, index: usize) {
    let build = match state.entities[index].target {
        Target::Build(build) => build,
        _ => {
            state.entities[index].mode = EntityMode::UnitIdle;
            return;
        }
    };
    let Some(building_index) = state.entities.index_of(build.building_id) else {
        // The site vanished under us (cancelled elsewhere).
        state.entities[index].mode = EntityMode::UnitIdle;
        pop_target_queue(&mut state.entities[index]);
        return;
    };

    if state.entities[building_index].mode != EntityMode::BuildingInProgress {
        finish_building_work(state, index, building_index);
        return;
    }

    state.entities[index].animation.update();
    if state.entities[index].timer > 0 {
        state.entities[index].timer -= 1;
        return;
    }
    state.entities[index].timer = BUILD_TICK_DURATION;
    let building = &mut state.entities[building_index];
    building.health = (building.health + 1).min(building.data().max_health);
}

// Step out of (or away from) a completed building and move on.
fn finish_building_work(state: &mut MatchState, index: usize, building_index: usize) {
    let builder_id = state.entities.id_of(index);
    let building_cell = state.entities[building_index].cell;
    let building_size = state.entities[building_index].cell_size();

    let inside = state.map.get_cell(state.entities[index].cell) != builder_id;
    if inside {
        let exit_cell = find_free_cell_around_rect(
            &state.map,
            &state.entities,
            state.entities[index].cell,
            state.entities[index].cell_size(),
            building_cell,
            building_size,
            false,
            None,
        )
        .unwrap_or(building_cell);
        let builder_size = state.entities[index].cell_size();
        let player_id = state.entities[index].player_id;
        let sight = state.entities[index].data().sight;
        let has_detection = state.entities[index].data().has_detection;
        state.entities[index].cell = exit_cell;
        state.entities[index].position = cell_center(exit_cell, builder_size);
        state.map.set_cell_rect(exit_cell, builder_size, builder_id);
        let team = state.team_of(player_id);
        fog_update(
            &mut state.map,
            &state.entities,
            team,
            exit_cell,
            builder_size,
            sight,
            true,
            has_detection,
        );
    }
    state.entities[index].mode = EntityMode::UnitIdle;
    state.entities[index].animation = Animation::start(AnimationName::UnitIdle);
    pop_target_queue(&mut state.entities[index]);
}

fn build_assist_order(state: &mut MatchState, index: usize, lead_id: EntityId) {
    let Some(lead_index) = state.entities.index_of(lead_id) else {
        pop_target_queue(&mut state.entities[index]);
        return;
    };
    let build = match state.entities[lead_index].target {
        Target::Build(build) => build,
        _ => {
            pop_target_queue(&mut state.entities[index]);
            return;
        }
    };
    if build.building_id == ID_NULL {
        // Lead hasn't broken ground yet; trail toward the site.
        walk_toward(state, index, build.unit_cell);
        return;
    }
    // Join in from outside the footprint.
    let adjacency = manhattan_distance_to_rect(
        state.entities[index].cell,
        build.building_cell,
        build.building_type.cell_size(),
    );
    if adjacency <= 1 {
        state.entities[index].target = Target::Build(build);
        state.entities[index].mode = EntityMode::UnitBuild;
        state.entities[index].timer = BUILD_TICK_DURATION;
        state.entities[index].animation = Animation::start(AnimationName::UnitBuild);
        return;
    }
    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        state.entities[index].cell,
        state.entities[index].cell_size(),
        build.building_cell,
        build.building_type.cell_size(),
        false,
        None,
    );
    walk_toward(state, index, goal);
}

fn repair_order(state: &mut MatchState, index: usize, target_id: EntityId) {
    let player_id = state.entities[index].player_id;
    let team = state.team_of(player_id);
    let valid = state.entities.index_of(target_id).is_some_and(|t| {
        let target = &state.entities[t];
        target.entity_type.is_building()
            && target.health > 0
            && state.team_of(target.player_id) == team
            && !matches!(target.mode, EntityMode::BuildingDestroyed)
    });
    if !valid {
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_REPAIR_TARGET_INVALID,
        });
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    let target_index = match state.entities.index_of(target_id) {
        Some(t) => t,
        None => return,
    };
    let target_cell = state.entities[target_index].cell;
    let target_size = state.entities[target_index].cell_size();
    if manhattan_distance_to_rect(state.entities[index].cell, target_cell, target_size) <= 1 {
        state.entities[index].mode = EntityMode::UnitRepair;
        state.entities[index].timer = REPAIR_TICK_DURATION;
        state.entities[index].animation = Animation::start(AnimationName::UnitBuild);
        return;
    }
    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        state.entities[index].cell,
        state.entities[index].cell_size(),
        target_cell,
        target_size,
        false,
        None,
    );
    walk_toward(state, index, goal);
}

fn repair_update(state: &mut MatchState, index: usize) {
    let (target_id, health_repaired) = match state.entities[index].target {
        Target::Repair {
            id,
            health_repaired,
        } => (id, health_repaired),
        _ => {
            state.entities[index].mode = EntityMode::UnitIdle;
            return;
        }
    };
    let Some(target_index) = state.entities.index_of(target_id) else {
        state.entities[index].mode = EntityMode::UnitIdle;
        pop_target_queue(&mut state.entities[index]);
        return;
    };
    let target_full = state.entities[target_index].health
        >= state.entities[target_index].data().max_health
        || state.entities[target_index].health <= 0;
    if target_full {
        state.entities[index].mode = EntityMode::UnitIdle;
        pop_target_queue(&mut state.entities[index]);
        return;
    }

    state.entities[index].animation.update();
    if state.entities[index].timer > 0 {
        state.entities[index].timer -= 1;
        return;
    }
    state.entities[index].timer = REPAIR_TICK_DURATION;
    state.entities[target_index].health += 1;
    state.entities[index].target = Target::Repair {
        id: target_id,
        health_repaired: health_repaired + 1,
    };
}

// ── Garrison ─────────────────────────────────────────────────────────

fn entity_order(state: &mut MatchState, index: usize, target_id: EntityId) {
    let Some(target_index) = state.entities.index_of(target_id) else {
        pop_target_queue(&mut state.entities[index]);
        return;
    };
    let target = &state.entities[target_index];
    if target.health <= 0 || !target.is_selectable() {
        pop_target_queue(&mut state.entities[index]);
        return;
    }

    let my_team = state.team_of(state.entities[index].player_id);
    let same_team = target.player_id != PLAYER_NONE && state.team_of(target.player_id) == my_team;

    // Following an enemy means attacking it.
    if !same_team && target.player_id != PLAYER_NONE {
        state.entities[index].target = Target::AttackEntity(target_id);
        return;
    }

    let target_cell = target.cell;
    let target_size = target.cell_size();
    let capacity = target.data().garrison_capacity;
    let occupied: u32 = target
        .garrisoned_units
        .iter()
        .filter_map(|id| state.entities.get_by_id(*id))
        .map(|unit| unit.data().garrison_size)
        .sum();
    let my_size = state.entities[index].data().garrison_size;
    let wants_garrison = same_team
        && capacity > 0
        && occupied + my_size <= capacity
        && state.entities[index].entity_type.is_unit();

    if manhattan_distance_to_rect(state.entities[index].cell, target_cell, target_size) <= 1 {
        if wants_garrison {
            garrison_unit(state, index, target_index);
        } else {
            state.entities[index].mode = EntityMode::UnitIdle;
            pop_target_queue(&mut state.entities[index]);
        }
        return;
    }

    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        state.entities[index].cell,
        state.entities[index].cell_size(),
        target_cell,
        target_size,
        false,
        None,
    );
    if state.entities[index].path.last().copied() != Some(goal)
        && state.entities[index].mode == EntityMode::UnitMove
    {
        state.entities[index].path.clear();
        state.entities[index].mode = EntityMode::UnitIdle;
    }
    walk_toward(state, index, goal);
}

fn garrison_unit(state: &mut MatchState, index: usize, carrier_index: usize) {
    let unit_id = state.entities.id_of(index);
    let carrier_id = state.entities.id_of(carrier_index);

    let cell = state.entities[index].cell;
    let cell_size = state.entities[index].cell_size();
    let player_id = state.entities[index].player_id;
    let sight = state.entities[index].data().sight;
    let has_detection = state.entities[index].data().has_detection;
    let team = state.team_of(player_id);

    state.map.set_cell_rect(cell, cell_size, CELL_EMPTY);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        cell,
        cell_size,
        sight,
        false,
        has_detection,
    );

    state.entities[carrier_index].garrisoned_units.push(unit_id);
    let unit = &mut state.entities[index];
    unit.garrison_id = carrier_id;
    unit.mode = EntityMode::UnitIdle;
    unit.target = Target::None;
    unit.target_queue.clear();
    unit.path.clear();
}

/// Unloads one passenger (`unit_id`) or all of them
/// ([`ENTITY_UNLOAD_ALL`]). Passengers with no free adjacent cell stay
/// aboard and the owner hears about it.
pub(crate) fn unload_unit(state: &mut MatchState, carrier_index: usize, unit_id: EntityId) {
    let carrier_cell = state.entities[carrier_index].cell;
    let carrier_size = state.entities[carrier_index].cell_size();
    let carrier_player = state.entities[carrier_index].player_id;

    let to_unload: Vec<EntityId> = if unit_id == ENTITY_UNLOAD_ALL {
        state.entities[carrier_index].garrisoned_units.clone()
    } else {
        state.entities[carrier_index]
            .garrisoned_units
            .iter()
            .copied()
            .filter(|id| *id == unit_id)
            .collect()
    };

    for id in to_unload {
        let Some(unit_index) = state.entities.index_of(id) else {
            continue;
        };
        let unit_size = state.entities[unit_index].cell_size();
        let Some(exit_cell) = find_free_cell_around_rect(
            &state.map,
            &state.entities,
            carrier_cell,
            unit_size,
            carrier_cell,
            carrier_size,
            false,
            None,
        ) else {
            state.events.push(MatchEvent::Status {
                player_id: carrier_player,
                message: STATUS_BUILDING_EXIT_BLOCKED,
            });
            break;
        };

        state.entities[carrier_index]
            .garrisoned_units
            .retain(|g| *g != id);
        let player_id = state.entities[unit_index].player_id;
        let sight = state.entities[unit_index].data().sight;
        let has_detection = state.entities[unit_index].data().has_detection;
        state.entities[unit_index].garrison_id = ID_NULL;
        state.entities[unit_index].cell = exit_cell;
        state.entities[unit_index].position = cell_center(exit_cell, unit_size);
        state.map.set_cell_rect(exit_cell, unit_size, id);
        let team = state.team_of(player_id);
        fog_update(
            &mut state.map,
            &state.entities,
            team,
            exit_cell,
            unit_size,
            sight,
            true,
            has_detection,
        );
    }
}

// ── Mining ───────────────────────────────────────────────────────────

fn gold_order(state: &mut MatchState, index: usize, mine_id: EntityId) {
    if state.entities[index].entity_type != EntityType::Miner {
        // Everyone else just walks up to the mine.
        state.entities[index].target = Target::Entity(mine_id);
        return;
    }

    if state.entities[index].gold_held > 0 {
        deliver_gold(state, index);
        return;
    }

    let Some(mine_index) = state.entities.index_of(mine_id) else {
        pop_target_queue(&mut state.entities[index]);
        return;
    };
    if state.entities[mine_index].mode != EntityMode::Gold
        || state.entities[mine_index].gold_held == 0
    {
        pop_target_queue(&mut state.entities[index]);
        return;
    }

    let mine_cell = state.entities[mine_index].cell;
    let mine_size = state.entities[mine_index].cell_size();
    if manhattan_distance_to_rect(state.entities[index].cell, mine_cell, mine_size) <= 1 {
        enter_gold_mine(state, index, mine_index);
        return;
    }
    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        state.entities[index].cell,
        state.entities[index].cell_size(),
        mine_cell,
        mine_size,
        true,
        None,
    );
    walk_toward(state, index, goal);
}

fn enter_gold_mine(state: &mut MatchState, index: usize, mine_index: usize) {
    let mine_id = state.entities.id_of(mine_index);
    // The trip's haul is claimed on entry so two miners can't overdraw.
    let available = state.entities[mine_index].gold_held;
    let haul = available.min(GOLD_PER_TRIP);
    state.entities[mine_index].gold_held -= haul;

    let cell = state.entities[index].cell;
    let cell_size = state.entities[index].cell_size();
    let player_id = state.entities[index].player_id;
    let sight = state.entities[index].data().sight;
    let has_detection = state.entities[index].data().has_detection;
    let team = state.team_of(player_id);
    state.map.set_cell_rect(cell, cell_size, CELL_EMPTY);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        cell,
        cell_size,
        sight,
        false,
        has_detection,
    );

    let miner = &mut state.entities[index];
    miner.mode = EntityMode::UnitMine;
    miner.timer = MINE_DURATION;
    miner.gold_patch_id = mine_id;
    miner.gold_held = haul;
    miner.path.clear();

    state.events.push(MatchEvent::Sound {
        sound: SoundName::Pickaxe,
        position: cell,
    });
}

fn mine_interior_update(state: &mut MatchState, index: usize) {
    if state.entities[index].timer > 0 {
        state.entities[index].timer -= 1;
        return;
    }

    let mine_id = state.entities[index].gold_patch_id;
    let Some(mine_index) = state.entities.index_of(mine_id) else {
        // The patch collapsed while we were inside; surface anywhere.
        let own_cell = state.entities[index].cell;
        try_exit_mine(state, index, own_cell, 1);
        return;
    };
    let mine_cell = state.entities[mine_index].cell;
    let mine_size = state.entities[mine_index].cell_size();
    try_exit_mine(state, index, mine_cell, mine_size);
}

fn try_exit_mine(state: &mut MatchState, index: usize, rect_cell: IVec2, rect_size: i32) {
    let unit_size = state.entities[index].cell_size();
    let player_id = state.entities[index].player_id;

    // Prefer surfacing toward the drop-off hall.
    let toward = nearest_allied_hall(state, player_id, rect_cell)
        .map_or(rect_cell, |(_, hall_cell)| hall_cell);

    let Some(exit_cell) = find_free_cell_around_rect(
        &state.map,
        &state.entities,
        toward,
        unit_size,
        rect_cell,
        rect_size,
        true,
        None,
    ) else {
        state.entities[index].timer = MINE_EXIT_RETRY;
        state.events.push(MatchEvent::Status {
            player_id,
            message: STATUS_MINE_EXIT_BLOCKED,
        });
        return;
    };

    let id = state.entities.id_of(index);
    let sight = state.entities[index].data().sight;
    let has_detection = state.entities[index].data().has_detection;
    state.entities[index].cell = exit_cell;
    state.entities[index].position = cell_center(exit_cell, unit_size);
    state.entities[index].mode = EntityMode::UnitOutMine;
    state.map.set_cell_rect(exit_cell, unit_size, id);
    let team = state.team_of(player_id);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        exit_cell,
        unit_size,
        sight,
        true,
        has_detection,
    );
}

fn nearest_allied_hall(
    state: &MatchState,
    player_id: u8,
    near: IVec2,
) -> Option<(usize, IVec2)> {
    let team = state.team_of(player_id);
    let mut best: Option<(i32, usize, IVec2)> = None;
    for hall_index in 0..state.entities.len() {
        let hall = &state.entities[hall_index];
        if hall.entity_type != EntityType::Hall
            || hall.mode != EntityMode::BuildingFinished
            || hall.player_id == PLAYER_NONE
            || state.team_of(hall.player_id) != team
        {
            continue;
        }
        let dist = manhattan_distance_to_rect(near, hall.cell, hall.cell_size());
        if best.is_none_or(|(best_dist, _, _)| dist < best_dist) {
            best = Some((dist, hall_index, hall.cell));
        }
    }
    best.map(|(_, hall_index, cell)| (hall_index, cell))
}

fn deliver_gold(state: &mut MatchState, index: usize) {
    let player_id = state.entities[index].player_id;
    let my_cell = state.entities[index].cell;
    let Some((hall_index, hall_cell)) = nearest_allied_hall(state, player_id, my_cell) else {
        // Nowhere to deliver; hold the gold and the order.
        state.entities[index].mode = EntityMode::UnitIdle;
        return;
    };
    let hall_size = state.entities[hall_index].cell_size();

    if manhattan_distance_to_rect(my_cell, hall_cell, hall_size) <= 1 {
        let haul = state.entities[index].gold_held;
        state.entities[index].gold_held = 0;
        state.player_gold[player_id as usize] += haul;

        // Head back to the remembered patch, if it still stands.
        let remembered = state.entities[index].remembered_gold_target;
        match remembered {
            Target::Gold(mine_id) if state.entities.index_of(mine_id).is_some() => {
                state.entities[index].target = Target::Gold(mine_id);
                state.entities[index].path.clear();
                state.entities[index].pathfind_attempts = 0;
            }
            _ => pop_target_queue(&mut state.entities[index]),
        }
        return;
    }

    let goal = get_nearest_cell_around_rect(
        &state.map,
        &state.entities,
        my_cell,
        state.entities[index].cell_size(),
        hall_cell,
        hall_size,
        true,
        None,
    );
    walk_toward(state, index, goal);
}

// ── Smoke ────────────────────────────────────────────────────────────

fn smoke_order(state: &mut MatchState, index: usize, target_cell: IVec2) {
    if state.entities[index].cooldown_timer != 0 {
        pop_target_queue(&mut state.entities[index]);
        return;
    }
    let my_cell = state.entities[index].cell;
    if IVec2::euclidean_distance_squared(my_cell, target_cell) <= SMOKE_RANGE_SQUARED {
        state.entities[index].mode = EntityMode::UnitTinkerThrow;
        state.entities[index].animation = Animation::start(AnimationName::UnitAttack);
        return;
    }
    walk_toward(state, index, target_cell);
}

fn smoke_windup_update(state: &mut MatchState, index: usize) {
    state.entities[index].animation.update();
    if state.entities[index].animation.is_playing {
        return;
    }
    let target_cell = match state.entities[index].target {
        Target::Smoke(cell) => cell,
        _ => {
            state.entities[index].mode = EntityMode::UnitIdle;
            return;
        }
    };
    let player_id = state.entities[index].player_id;
    let my_cell = state.entities[index].cell;
    state.entities[index].cooldown_timer = SMOKE_COOLDOWN_DURATION;
    state.entities[index].mode = EntityMode::UnitIdle;
    state.entities[index].animation = Animation::start(AnimationName::UnitIdle);
    pop_target_queue(&mut state.entities[index]);

    state.projectiles.push(Projectile {
        sprite: ProjectileSprite::Smoke,
        position: cell_center(my_cell, 1),
        target: cell_center(target_cell, 1),
    });
    // The reveal is anchored now; its fog lifts when the timer runs out.
    let team = state.team_of(player_id);
    fog_update(
        &mut state.map,
        &state.entities,
        team,
        target_cell,
        1,
        SMOKE_REVEAL_SIGHT,
        true,
        false,
    );
    state.map_reveals.push(MapReveal {
        player_id,
        cell: target_cell,
        cell_size: 1,
        sight: SMOKE_REVEAL_SIGHT,
        timer: SMOKE_REVEAL_DURATION,
    });
}
