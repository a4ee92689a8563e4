// SPDX-License-Identifier: Apache-2.0

//! Player commands: the tagged union, its exact wire layout, and the
//! handler that applies one command for one player.
//!
//! Wire layout is little-endian and tightly packed, one tag byte per
//! input (see the match in [`serialize_input`]). Both peers run this same
//! codec, so the observable contract is symmetric round-trip:
//! `deserialize(serialize(x)) == x`. Decoding is length-checked and
//! returns typed errors instead of trusting the remote peer.
//!
//! Handling never returns errors either: commands referencing dead or
//! invalid entities are silently dropped per entity, and user-facing
//! rejections surface as `Status` events.

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::entity::{
    behavior, production, BuildTarget, BuildingQueueItem, EntityId, EntityType, Target,
    ENTITY_FLAG_HOLD_POSITION, ENTITY_UNLOAD_ALL, ID_NULL,
};
use crate::event::{MatchEvent, STATUS_SMOKE_COOLDOWN};
use crate::map::get_nearest_cell_in_rect;
use crate::math::{ivec2, IVec2, Rect};
use crate::state::MatchState;

/// Common payload of the seven move-family commands.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MoveInput {
    /// Queue behind the current order instead of replacing it.
    pub shift_command: bool,
    /// Clicked cell.
    pub target_cell: IVec2,
    /// Clicked entity, or [`ID_NULL`] for ground orders.
    pub target_id: EntityId,
    /// Commanded units.
    pub entity_ids: Vec<EntityId>,
}

/// Payload of stop/defend commands.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StopInput {
    /// Commanded units.
    pub entity_ids: Vec<EntityId>,
}

/// Payload of the build command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildInput {
    /// Queue behind the current order instead of replacing it.
    pub shift_command: bool,
    /// What to construct.
    pub building_type: EntityType,
    /// Top-left footprint cell.
    pub target_cell: IVec2,
    /// Selected builders; the nearest becomes the lead.
    pub entity_ids: Vec<EntityId>,
}

/// A player command. Tag values are wire format; the move family shares
/// its numbering with the target union it produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Padding input carried by otherwise-empty turn bundles.
    None,
    /// Move to a cell.
    MoveCell(MoveInput),
    /// Follow or interact with an entity.
    MoveEntity(MoveInput),
    /// Attack-move to a cell.
    MoveAttackCell(MoveInput),
    /// Attack an entity.
    MoveAttackEntity(MoveInput),
    /// Repair an allied building.
    MoveRepair(MoveInput),
    /// Move a carrier somewhere, then unload it.
    MoveUnload(MoveInput),
    /// Throw a smoke bomb at a cell.
    MoveSmoke(MoveInput),
    /// Cancel orders.
    Stop(StopInput),
    /// Cancel orders and hold position.
    Defend(StopInput),
    /// Construct a building.
    Build(BuildInput),
    /// Cancel a building under construction.
    BuildCancel {
        /// Building to cancel.
        building_id: EntityId,
    },
    /// Append to a building's production/research queue.
    BuildingEnqueue {
        /// Producing building.
        building_id: EntityId,
        /// Item to enqueue.
        item: BuildingQueueItem,
    },
    /// Remove an item from a building's queue.
    BuildingDequeue {
        /// Producing building.
        building_id: EntityId,
        /// Queue index, or [`crate::entity::BUILDING_DEQUEUE_POP_BACK`].
        index: u32,
    },
    /// Unload every passenger of the given carriers.
    Unload {
        /// Carriers to empty.
        entity_ids: Vec<EntityId>,
    },
    /// Unload one specific garrisoned unit.
    SingleUnload {
        /// The garrisoned unit.
        unit_id: EntityId,
    },
    /// Set rally points.
    Rally {
        /// New rally cell.
        rally_point: IVec2,
        /// Buildings to apply it to.
        building_ids: Vec<EntityId>,
    },
    /// Detonate sappers / land mines.
    Explode {
        /// Entities to detonate.
        entity_ids: Vec<EntityId>,
    },
    /// Chat line.
    Chat {
        /// Message text.
        message: String,
    },
}

const TAG_NONE: u8 = 0;
const TAG_MOVE_CELL: u8 = 1;
const TAG_MOVE_ENTITY: u8 = 2;
const TAG_MOVE_ATTACK_CELL: u8 = 3;
const TAG_MOVE_ATTACK_ENTITY: u8 = 4;
const TAG_MOVE_REPAIR: u8 = 5;
const TAG_MOVE_UNLOAD: u8 = 6;
const TAG_MOVE_SMOKE: u8 = 7;
const TAG_STOP: u8 = 8;
const TAG_DEFEND: u8 = 9;
const TAG_BUILD: u8 = 10;
const TAG_BUILD_CANCEL: u8 = 11;
const TAG_BUILDING_ENQUEUE: u8 = 12;
const TAG_BUILDING_DEQUEUE: u8 = 13;
const TAG_UNLOAD: u8 = 14;
const TAG_SINGLE_UNLOAD: u8 = 15;
const TAG_RALLY: u8 = 16;
const TAG_EXPLODE: u8 = 17;
const TAG_CHAT: u8 = 18;

const ITEM_TYPE_UNIT: u8 = 0;
const ITEM_TYPE_UPGRADE: u8 = 1;

/// Wire decoding failures. Peers running the same build never produce
/// these; they guard against truncation and corruption.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended inside an input.
    #[error("input truncated")]
    Truncated,
    /// Unknown input tag byte.
    #[error("unknown input tag {0}")]
    UnknownTag(u8),
    /// Unknown entity type discriminant.
    #[error("unknown entity type {0}")]
    UnknownEntityType(u32),
    /// Unknown queue item discriminant.
    #[error("unknown queue item type {0}")]
    UnknownItemType(u8),
    /// Chat bytes were not valid UTF-8.
    #[error("chat text is not valid utf-8")]
    InvalidChatText,
}

fn put_ivec2(out: &mut Vec<u8>, v: IVec2) {
    out.put_i32_le(v.x);
    out.put_i32_le(v.y);
}

fn put_ids_u8(out: &mut Vec<u8>, ids: &[EntityId]) {
    out.put_u8(ids.len() as u8);
    for id in ids {
        out.put_u16_le(*id);
    }
}

fn put_ids_u16(out: &mut Vec<u8>, ids: &[EntityId]) {
    out.put_u16_le(ids.len() as u16);
    for id in ids {
        out.put_u16_le(*id);
    }
}

/// Appends one input to `out` in wire layout.
pub fn serialize_input(input: &Input, out: &mut Vec<u8>) {
    match input {
        Input::None => out.put_u8(TAG_NONE),
        Input::MoveCell(body)
        | Input::MoveEntity(body)
        | Input::MoveAttackCell(body)
        | Input::MoveAttackEntity(body)
        | Input::MoveRepair(body)
        | Input::MoveUnload(body)
        | Input::MoveSmoke(body) => {
            out.put_u8(match input {
                Input::MoveCell(_) => TAG_MOVE_CELL,
                Input::MoveEntity(_) => TAG_MOVE_ENTITY,
                Input::MoveAttackCell(_) => TAG_MOVE_ATTACK_CELL,
                Input::MoveAttackEntity(_) => TAG_MOVE_ATTACK_ENTITY,
                Input::MoveRepair(_) => TAG_MOVE_REPAIR,
                Input::MoveUnload(_) => TAG_MOVE_UNLOAD,
                _ => TAG_MOVE_SMOKE,
            });
            out.put_u8(u8::from(body.shift_command));
            put_ivec2(out, body.target_cell);
            out.put_u16_le(body.target_id);
            put_ids_u8(out, &body.entity_ids);
        }
        Input::Stop(body) | Input::Defend(body) => {
            out.put_u8(if matches!(input, Input::Stop(_)) {
                TAG_STOP
            } else {
                TAG_DEFEND
            });
            put_ids_u8(out, &body.entity_ids);
        }
        Input::Build(body) => {
            out.put_u8(TAG_BUILD);
            out.put_u8(u8::from(body.shift_command));
            out.put_u8(body.building_type as u8);
            put_ivec2(out, body.target_cell);
            put_ids_u16(out, &body.entity_ids);
        }
        Input::BuildCancel { building_id } => {
            out.put_u8(TAG_BUILD_CANCEL);
            out.put_u16_le(*building_id);
        }
        Input::BuildingEnqueue { building_id, item } => {
            out.put_u8(TAG_BUILDING_ENQUEUE);
            out.put_u16_le(*building_id);
            match item {
                BuildingQueueItem::Unit(unit_type) => {
                    out.put_u8(ITEM_TYPE_UNIT);
                    out.put_u32_le(*unit_type as u32);
                }
                BuildingQueueItem::Upgrade(upgrade) => {
                    out.put_u8(ITEM_TYPE_UPGRADE);
                    out.put_u32_le(*upgrade);
                }
            }
        }
        Input::BuildingDequeue { building_id, index } => {
            out.put_u8(TAG_BUILDING_DEQUEUE);
            out.put_u16_le(*building_id);
            out.put_u32_le(*index);
        }
        Input::Unload { entity_ids } => {
            out.put_u8(TAG_UNLOAD);
            put_ids_u16(out, entity_ids);
        }
        Input::SingleUnload { unit_id } => {
            out.put_u8(TAG_SINGLE_UNLOAD);
            out.put_u16_le(*unit_id);
        }
        Input::Rally {
            rally_point,
            building_ids,
        } => {
            out.put_u8(TAG_RALLY);
            put_ivec2(out, *rally_point);
            put_ids_u16(out, building_ids);
        }
        Input::Explode { entity_ids } => {
            out.put_u8(TAG_EXPLODE);
            put_ids_u16(out, entity_ids);
        }
        Input::Chat { message } => {
            out.put_u8(TAG_CHAT);
            out.put_u8(message.len() as u8);
            out.put_slice(message.as_bytes());
        }
    }
}

fn need(buf: &&[u8], bytes: usize) -> Result<(), DecodeError> {
    if buf.remaining() < bytes {
        return Err(DecodeError::Truncated);
    }
    Ok(())
}

fn get_ivec2(buf: &mut &[u8]) -> Result<IVec2, DecodeError> {
    need(buf, 8)?;
    let x = buf.get_i32_le();
    let y = buf.get_i32_le();
    Ok(ivec2(x, y))
}

fn get_ids(buf: &mut &[u8], count: usize) -> Result<Vec<EntityId>, DecodeError> {
    need(buf, count * 2)?;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(buf.get_u16_le());
    }
    Ok(ids)
}

fn get_move(buf: &mut &[u8]) -> Result<MoveInput, DecodeError> {
    need(buf, 1)?;
    let shift_command = buf.get_u8() != 0;
    let target_cell = get_ivec2(buf)?;
    need(buf, 3)?;
    let target_id = buf.get_u16_le();
    let count = buf.get_u8() as usize;
    let entity_ids = get_ids(buf, count)?;
    Ok(MoveInput {
        shift_command,
        target_cell,
        target_id,
        entity_ids,
    })
}

/// Decodes one input from the front of `buf`, advancing it.
pub fn deserialize_input(buf: &mut &[u8]) -> Result<Input, DecodeError> {
    need(buf, 1)?;
    let tag = buf.get_u8();
    match tag {
        TAG_NONE => Ok(Input::None),
        TAG_MOVE_CELL => Ok(Input::MoveCell(get_move(buf)?)),
        TAG_MOVE_ENTITY => Ok(Input::MoveEntity(get_move(buf)?)),
        TAG_MOVE_ATTACK_CELL => Ok(Input::MoveAttackCell(get_move(buf)?)),
        TAG_MOVE_ATTACK_ENTITY => Ok(Input::MoveAttackEntity(get_move(buf)?)),
        TAG_MOVE_REPAIR => Ok(Input::MoveRepair(get_move(buf)?)),
        TAG_MOVE_UNLOAD => Ok(Input::MoveUnload(get_move(buf)?)),
        TAG_MOVE_SMOKE => Ok(Input::MoveSmoke(get_move(buf)?)),
        TAG_STOP | TAG_DEFEND => {
            need(buf, 1)?;
            let count = buf.get_u8() as usize;
            let entity_ids = get_ids(buf, count)?;
            let body = StopInput { entity_ids };
            if tag == TAG_STOP {
                Ok(Input::Stop(body))
            } else {
                Ok(Input::Defend(body))
            }
        }
        TAG_BUILD => {
            need(buf, 2)?;
            let shift_command = buf.get_u8() != 0;
            let type_index = buf.get_u8();
            let building_type = EntityType::from_index(type_index)
                .ok_or(DecodeError::UnknownEntityType(u32::from(type_index)))?;
            let target_cell = get_ivec2(buf)?;
            need(buf, 2)?;
            let count = buf.get_u16_le() as usize;
            let entity_ids = get_ids(buf, count)?;
            Ok(Input::Build(BuildInput {
                shift_command,
                building_type,
                target_cell,
                entity_ids,
            }))
        }
        TAG_BUILD_CANCEL => {
            need(buf, 2)?;
            Ok(Input::BuildCancel {
                building_id: buf.get_u16_le(),
            })
        }
        TAG_BUILDING_ENQUEUE => {
            need(buf, 7)?;
            let building_id = buf.get_u16_le();
            let item_type = buf.get_u8();
            let item_value = buf.get_u32_le();
            let item = match item_type {
                ITEM_TYPE_UNIT => BuildingQueueItem::Unit(
                    EntityType::from_index(item_value as u8)
                        .ok_or(DecodeError::UnknownEntityType(item_value))?,
                ),
                ITEM_TYPE_UPGRADE => BuildingQueueItem::Upgrade(item_value),
                other => return Err(DecodeError::UnknownItemType(other)),
            };
            Ok(Input::BuildingEnqueue { building_id, item })
        }
        TAG_BUILDING_DEQUEUE => {
            need(buf, 6)?;
            Ok(Input::BuildingDequeue {
                building_id: buf.get_u16_le(),
                index: buf.get_u32_le(),
            })
        }
        TAG_UNLOAD => {
            need(buf, 2)?;
            let count = buf.get_u16_le() as usize;
            Ok(Input::Unload {
                entity_ids: get_ids(buf, count)?,
            })
        }
        TAG_SINGLE_UNLOAD => {
            need(buf, 2)?;
            Ok(Input::SingleUnload {
                unit_id: buf.get_u16_le(),
            })
        }
        TAG_RALLY => {
            let rally_point = get_ivec2(buf)?;
            need(buf, 2)?;
            let count = buf.get_u16_le() as usize;
            Ok(Input::Rally {
                rally_point,
                building_ids: get_ids(buf, count)?,
            })
        }
        TAG_EXPLODE => {
            need(buf, 2)?;
            let count = buf.get_u16_le() as usize;
            Ok(Input::Explode {
                entity_ids: get_ids(buf, count)?,
            })
        }
        TAG_CHAT => {
            need(buf, 1)?;
            let len = buf.get_u8() as usize;
            need(buf, len)?;
            let mut bytes = vec![0_u8; len];
            buf.copy_to_slice(&mut bytes);
            let message = String::from_utf8(bytes).map_err(|_| DecodeError::InvalidChatText)?;
            Ok(Input::Chat { message })
        }
        other => Err(DecodeError::UnknownTag(other)),
    }
}

/// Serializes a whole turn bundle.
#[must_use]
pub fn serialize_bundle(inputs: &[Input]) -> Vec<u8> {
    let mut out = Vec::new();
    for input in inputs {
        serialize_input(input, &mut out);
    }
    out
}

/// Decodes a whole turn bundle.
pub fn deserialize_bundle(mut bytes: &[u8]) -> Result<Vec<Input>, DecodeError> {
    let mut inputs = Vec::new();
    while !bytes.is_empty() {
        inputs.push(deserialize_input(&mut bytes)?);
    }
    Ok(inputs)
}

/// Applies one command issued by `player_id`.
///
/// Invalid target ids (dead or removed since the command was issued) are
/// silently dropped for the affected entities; player-facing rejections
/// emit `Status` events.
pub fn handle(state: &mut MatchState, player_id: u8, input: &Input) {
    match input {
        Input::None => {}
        Input::MoveCell(body)
        | Input::MoveEntity(body)
        | Input::MoveAttackCell(body)
        | Input::MoveAttackEntity(body)
        | Input::MoveRepair(body)
        | Input::MoveUnload(body) => handle_move(state, input, body),
        Input::MoveSmoke(body) => handle_smoke(state, player_id, body),
        Input::Stop(body) | Input::Defend(body) => {
            let hold = matches!(input, Input::Defend(_));
            for id in &body.entity_ids {
                let Some(index) = state.entities.index_of(*id) else {
                    continue;
                };
                if !state.entities[index].is_selectable() {
                    continue;
                }
                let entity = &mut state.entities[index];
                entity.path.clear();
                entity.target_queue.clear();
                behavior::set_target(entity, Target::None);
                if hold {
                    entity.set_flag(ENTITY_FLAG_HOLD_POSITION, true);
                }
            }
        }
        Input::Build(body) => handle_build(state, body),
        Input::BuildCancel { building_id } => handle_build_cancel(state, *building_id),
        Input::BuildingEnqueue { building_id, item } => {
            production::handle_enqueue(state, player_id, *building_id, *item);
        }
        Input::BuildingDequeue { building_id, index } => {
            production::handle_dequeue(state, player_id, *building_id, *index);
        }
        Input::Unload { entity_ids } => {
            for id in entity_ids {
                let Some(index) = state.entities.index_of(*id) else {
                    continue;
                };
                if !state.entities[index].is_selectable()
                    || state.entities[index].garrisoned_units.is_empty()
                {
                    continue;
                }
                behavior::unload_unit(state, index, ENTITY_UNLOAD_ALL);
            }
        }
        Input::SingleUnload { unit_id } => {
            let Some(unit_index) = state.entities.index_of(*unit_id) else {
                return;
            };
            let unit = &state.entities[unit_index];
            if unit.health == 0 || unit.garrison_id == ID_NULL {
                return;
            }
            let carrier_id = unit.garrison_id;
            let Some(carrier_index) = state.entities.index_of(carrier_id) else {
                return;
            };
            behavior::unload_unit(state, carrier_index, *unit_id);
        }
        Input::Rally {
            rally_point,
            building_ids,
        } => {
            for id in building_ids {
                let Some(index) = state.entities.index_of(*id) else {
                    continue;
                };
                if !state.entities[index].is_selectable() {
                    continue;
                }
                state.entities[index].rally_point = *rally_point;
            }
        }
        Input::Explode { entity_ids } => {
            // Snapshot the list first: an entity that died during the
            // LATENCY window must not explode, but survivors all explode
            // together even if one kills another mid-loop.
            let mut entities_to_explode = Vec::with_capacity(entity_ids.len());
            for id in entity_ids {
                if let Some(index) = state.entities.index_of(*id) {
                    if state.entities[index].is_selectable() {
                        entities_to_explode.push(*id);
                    }
                }
            }
            for id in entities_to_explode {
                behavior::explode(state, id);
            }
        }
        Input::Chat { message } => {
            state.events.push(MatchEvent::Chat {
                player_id,
                text: message.clone(),
            });
        }
    }
}

fn handle_move(state: &mut MatchState, input: &Input, body: &MoveInput) {
    // Resolve the clicked entity for the entity-target variants.
    let mut target_index = None;
    if matches!(
        input,
        Input::MoveEntity(_) | Input::MoveAttackEntity(_) | Input::MoveRepair(_)
    ) {
        target_index = state.entities.index_of(body.target_id);
        if let Some(index) = target_index {
            if !state.entities[index].is_selectable() {
                target_index = None;
            }
        }
    }

    // Ground orders offset each unit by its place in the group, so
    // formations keep their shape instead of piling on one cell.
    let mut group_center = ivec2(0, 0);
    let mut should_move_as_group = target_index.is_none();
    if should_move_as_group {
        let mut unit_count = 0;
        let mut group_min = ivec2(0, 0);
        let mut group_max = ivec2(0, 0);
        for id in &body.entity_ids {
            let Some(entity_index) = state.entities.index_of(*id) else {
                continue;
            };
            if !state.entities[entity_index].is_selectable() {
                continue;
            }
            let entity_cell = state.entities[entity_index].cell;
            if unit_count == 0 {
                group_min = entity_cell;
                group_max = entity_cell;
            } else {
                group_min.x = group_min.x.min(entity_cell.x);
                group_min.y = group_min.y.min(entity_cell.y);
                group_max.x = group_max.x.max(entity_cell.x);
                group_max.y = group_max.y.max(entity_cell.y);
            }
            unit_count += 1;
        }

        let group_rect = Rect::new(group_min, group_max - group_min);
        group_center = ivec2(
            group_rect.position.x + group_rect.size.x / 2,
            group_rect.position.y + group_rect.size.y / 2,
        );

        // A lone unit, or a click inside the formation, converges instead.
        if unit_count < 2 || group_rect.has_point(body.target_cell) {
            should_move_as_group = false;
        }
    }

    for id in &body.entity_ids {
        let Some(entity_index) = state.entities.index_of(*id) else {
            continue;
        };
        if !state.entities[entity_index].is_selectable() {
            continue;
        }

        let target = if let Some(target_index) = target_index {
            let target_id = state.entities.id_of(target_index);
            if matches!(input, Input::MoveRepair(_)) {
                Target::Repair {
                    id: target_id,
                    health_repaired: 0,
                }
            } else if target_id == *id {
                Target::None
            } else if matches!(input, Input::MoveAttackEntity(_)) {
                Target::AttackEntity(target_id)
            } else if state.entities[target_index].entity_type == EntityType::GoldMine {
                Target::Gold(target_id)
            } else {
                Target::Entity(target_id)
            }
        } else {
            let mut cell = body.target_cell;
            if should_move_as_group && state.map.is_cell_in_bounds(body.target_cell) {
                let entity_cell = state.entities[entity_index].cell;
                let group_move_cell = body.target_cell + (entity_cell - group_center);
                if state.map.is_cell_in_bounds(group_move_cell)
                    && IVec2::manhattan_distance(group_move_cell, body.target_cell) <= 3
                    && state.map.get_tile(group_move_cell).elevation
                        == state.map.get_tile(body.target_cell).elevation
                {
                    cell = group_move_cell;
                }
            }
            match input {
                Input::MoveAttackCell(_) => Target::AttackCell(cell),
                Input::MoveUnload(_) => Target::Unload(cell),
                _ => Target::Cell(cell),
            }
        };

        let entity = &mut state.entities[entity_index];
        if !body.shift_command || (entity.target.is_none() && entity.target_queue.is_empty()) {
            entity.target_queue.clear();
            behavior::set_target(entity, target);
        } else {
            entity.target_queue.push(target);
        }
    }
}

fn handle_smoke(state: &mut MatchState, player_id: u8, body: &MoveInput) {
    let mut smoke_thrower_index: Option<usize> = None;
    let mut all_units_are_dead = true;
    for id in &body.entity_ids {
        let Some(unit_index) = state.entities.index_of(*id) else {
            continue;
        };
        if !state.entities[unit_index].is_selectable() {
            continue;
        }
        all_units_are_dead = false;
        if state.entities[unit_index].cooldown_timer != 0 {
            continue;
        }
        let closer = smoke_thrower_index.is_none_or(|current| {
            IVec2::manhattan_distance(state.entities[unit_index].cell, body.target_cell)
                < IVec2::manhattan_distance(state.entities[current].cell, body.target_cell)
        });
        if closer {
            smoke_thrower_index = Some(unit_index);
        }
    }

    let Some(thrower_index) = smoke_thrower_index else {
        if !all_units_are_dead {
            state.events.push(MatchEvent::Status {
                player_id,
                message: STATUS_SMOKE_COOLDOWN,
            });
        }
        return;
    };

    let smoke_target = Target::Smoke(body.target_cell);
    let entity = &mut state.entities[thrower_index];
    if !body.shift_command || (entity.target.is_none() && entity.target_queue.is_empty()) {
        entity.target_queue.clear();
        behavior::set_target(entity, smoke_target);
    } else {
        entity.target_queue.push(smoke_target);
    }
}

fn handle_build(state: &mut MatchState, body: &BuildInput) {
    // Viable builders only.
    let mut builder_ids = Vec::new();
    for id in &body.entity_ids {
        let Some(entity_index) = state.entities.index_of(*id) else {
            continue;
        };
        if !state.entities[entity_index].is_selectable() {
            continue;
        }
        builder_ids.push(*id);
    }

    // The nearest builder leads; ties go to list order.
    let mut lead_builder_id = ID_NULL;
    let mut nearest_dist = -1;
    for id in &builder_ids {
        if let Some(builder) = state.entities.get_by_id(*id) {
            let dist = IVec2::manhattan_distance(body.target_cell, builder.cell);
            if nearest_dist == -1 || dist < nearest_dist {
                lead_builder_id = *id;
                nearest_dist = dist;
            }
        }
    }
    if lead_builder_id == ID_NULL {
        return;
    }

    let lead_cell = match state.entities.get_by_id(lead_builder_id) {
        Some(builder) => builder.cell,
        None => return,
    };
    let unit_cell = if body.building_type == EntityType::LandMine {
        body.target_cell
    } else {
        get_nearest_cell_in_rect(lead_cell, body.target_cell, body.building_type.cell_size())
    };
    let build_target = Target::Build(BuildTarget {
        building_id: ID_NULL,
        unit_cell,
        building_cell: body.target_cell,
        building_type: body.building_type,
    });

    if let Some(lead_builder) = state.entities.get_by_id_mut(lead_builder_id) {
        if !body.shift_command
            || (lead_builder.target.is_none() && lead_builder.target_queue.is_empty())
        {
            lead_builder.target_queue.clear();
            behavior::set_target(lead_builder, build_target);
        } else {
            lead_builder.target_queue.push(build_target);
        }
    }

    // Helpers fall in behind the lead builder.
    if body.building_type != EntityType::LandMine && !body.shift_command {
        for builder_id in builder_ids {
            if builder_id == lead_builder_id {
                continue;
            }
            if let Some(builder) = state.entities.get_by_id_mut(builder_id) {
                if builder.is_selectable() {
                    behavior::set_target(builder, Target::BuildAssist(lead_builder_id));
                }
            }
        }
    }
}

fn handle_build_cancel(state: &mut MatchState, building_id: EntityId) {
    let Some(building_index) = state.entities.index_of(building_id) else {
        return;
    };
    if !state.entities[building_index].is_selectable() {
        return;
    }

    let building = &state.entities[building_index];
    let building_data = building.data();
    // Refund the unbuilt fraction; the built part of the cost is sunk.
    let gold_refund = building_data.gold_cost
        - ((building.health as u32 * building_data.gold_cost) / building_data.max_health as u32);
    let owner = building.player_id;
    state.player_gold[owner as usize] += gold_refund;

    // Pull the lead builder back out of the site.
    for entity_index in 0..state.entities.len() {
        let is_this_builder = matches!(
            state.entities[entity_index].target,
            Target::Build(build) if build.building_id == building_id
        );
        if is_this_builder {
            let builder_id = state.entities.id_of(entity_index);
            let builder = &mut state.entities[entity_index];
            if let Target::Build(build) = builder.target {
                builder.cell = build.building_cell;
            }
            builder.position = builder.target_position();
            builder.target = Target::None;
            builder.mode = crate::entity::EntityMode::UnitIdle;
            builder.target_queue.clear();
            let builder_cell = builder.cell;
            let builder_size = builder.cell_size();
            let builder_player = builder.player_id;
            let sight = builder.data().sight;
            let has_detection = builder.data().has_detection;
            let team = state.team_of(builder_player);
            state.map.set_cell_rect(builder_cell, builder_size, builder_id);
            crate::map::fog::fog_update(
                &mut state.map,
                &state.entities,
                team,
                builder_cell,
                builder_size,
                sight,
                true,
                has_detection,
            );
            break;
        }
    }

    // Destroy the building; the regular update turns zero health into the
    // destroyed wreck.
    state.entities[building_index].health = 0;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::{deserialize_bundle, serialize_bundle, DecodeError, Input, MoveInput, StopInput};
    use crate::entity::{BuildingQueueItem, EntityType, UPGRADE_SMOKE};
    use crate::math::ivec2;

    fn roundtrip(input: Input) {
        let bytes = serialize_bundle(core::slice::from_ref(&input));
        let decoded = deserialize_bundle(&bytes).unwrap();
        assert_eq!(decoded, vec![input]);
    }

    #[test]
    fn every_variant_roundtrips() {
        roundtrip(Input::None);
        roundtrip(Input::MoveCell(MoveInput {
            shift_command: true,
            target_cell: ivec2(-3, 90),
            target_id: 4097,
            entity_ids: vec![1, 2, 3],
        }));
        roundtrip(Input::MoveRepair(MoveInput {
            shift_command: false,
            target_cell: ivec2(0, 0),
            target_id: 12,
            entity_ids: vec![9],
        }));
        roundtrip(Input::Stop(StopInput {
            entity_ids: vec![7, 8],
        }));
        roundtrip(Input::Defend(StopInput { entity_ids: vec![] }));
        roundtrip(Input::Build(super::BuildInput {
            shift_command: true,
            building_type: EntityType::House,
            target_cell: ivec2(5, 5),
            entity_ids: vec![11, 13],
        }));
        roundtrip(Input::BuildCancel { building_id: 44 });
        roundtrip(Input::BuildingEnqueue {
            building_id: 3,
            item: BuildingQueueItem::Unit(EntityType::Wagon),
        });
        roundtrip(Input::BuildingEnqueue {
            building_id: 3,
            item: BuildingQueueItem::Upgrade(UPGRADE_SMOKE),
        });
        roundtrip(Input::BuildingDequeue {
            building_id: 3,
            index: 4,
        });
        roundtrip(Input::Unload {
            entity_ids: vec![400],
        });
        roundtrip(Input::SingleUnload { unit_id: 2 });
        roundtrip(Input::Rally {
            rally_point: ivec2(31, 7),
            building_ids: vec![5, 6],
        });
        roundtrip(Input::Explode {
            entity_ids: vec![77],
        });
        roundtrip(Input::Chat {
            message: "gg gold rush".to_owned(),
        });
    }

    #[test]
    fn bundles_concatenate() {
        let bundle = vec![
            Input::None,
            Input::MoveCell(MoveInput {
                shift_command: false,
                target_cell: ivec2(1, 2),
                target_id: 0,
                entity_ids: vec![5],
            }),
            Input::Chat {
                message: "hi".to_owned(),
            },
        ];
        let bytes = serialize_bundle(&bundle);
        assert_eq!(deserialize_bundle(&bytes).unwrap(), bundle);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let bytes = serialize_bundle(&[Input::MoveCell(MoveInput {
            shift_command: false,
            target_cell: ivec2(1, 2),
            target_id: 0,
            entity_ids: vec![5, 6, 7],
        })]);
        assert_eq!(
            deserialize_bundle(&bytes[..bytes.len() - 1]),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn unknown_tag_is_an_error() {
        assert_eq!(deserialize_bundle(&[0xee]), Err(DecodeError::UnknownTag(0xee)));
    }

    #[test]
    fn layout_is_tightly_packed_little_endian() {
        let bytes = serialize_bundle(&[Input::MoveCell(MoveInput {
            shift_command: true,
            target_cell: ivec2(0x0102_0304, -1),
            target_id: 0x0a0b,
            entity_ids: vec![0x0102],
        })]);
        assert_eq!(
            bytes,
            vec![
                1, // tag
                1, // shift
                0x04, 0x03, 0x02, 0x01, // cell.x LE
                0xff, 0xff, 0xff, 0xff, // cell.y LE
                0x0b, 0x0a, // target id LE
                1,    // count
                0x02, 0x01, // entity id LE
            ]
        );
    }
}
