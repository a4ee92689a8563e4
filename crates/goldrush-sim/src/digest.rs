// SPDX-License-Identifier: Apache-2.0

//! Canonical state digest for desync audits.
//!
//! Every field that participates in the lockstep contract is fed to a
//! blake3 hasher in a fixed order with explicit little-endian encoding —
//! no serde in between, so the byte stream is canonical by construction.
//! Two peers with equal digests after the same tick are bit-identical in
//! everything the simulation can observe; a divergence pinpoints the
//! first tick where they are not.

use blake3::Hasher;

use crate::entity::{Animation, BuildingQueueItem, Entity, Target};
use crate::math::{FVec2, IVec2};
use crate::state::MatchState;
use crate::MAX_PLAYERS;

/// A 32-byte state digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateDigest(pub [u8; 32]);

impl StateDigest {
    /// Hex rendering for logs and CLI output.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl core::fmt::Display for StateDigest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn put_i32(hasher: &mut Hasher, value: i32) {
    hasher.update(&value.to_le_bytes());
}

fn put_u32(hasher: &mut Hasher, value: u32) {
    hasher.update(&value.to_le_bytes());
}

fn put_ivec2(hasher: &mut Hasher, value: IVec2) {
    put_i32(hasher, value.x);
    put_i32(hasher, value.y);
}

fn put_fvec2(hasher: &mut Hasher, value: FVec2) {
    put_i32(hasher, value.x.raw());
    put_i32(hasher, value.y.raw());
}

fn put_animation(hasher: &mut Hasher, animation: &Animation) {
    put_u32(hasher, animation.name as u32);
    put_u32(hasher, animation.timer);
    put_ivec2(hasher, animation.frame);
    put_u32(hasher, animation.loops_remaining);
    hasher.update(&[u8::from(animation.is_playing)]);
}

fn put_target(hasher: &mut Hasher, target: &Target) {
    match target {
        Target::None => put_u32(hasher, 0),
        Target::Cell(cell) => {
            put_u32(hasher, 1);
            put_ivec2(hasher, *cell);
        }
        Target::Entity(id) => {
            put_u32(hasher, 2);
            put_u32(hasher, u32::from(*id));
        }
        Target::AttackCell(cell) => {
            put_u32(hasher, 3);
            put_ivec2(hasher, *cell);
        }
        Target::AttackEntity(id) => {
            put_u32(hasher, 4);
            put_u32(hasher, u32::from(*id));
        }
        Target::Repair {
            id,
            health_repaired,
        } => {
            put_u32(hasher, 5);
            put_u32(hasher, u32::from(*id));
            put_u32(hasher, *health_repaired);
        }
        Target::Unload(cell) => {
            put_u32(hasher, 6);
            put_ivec2(hasher, *cell);
        }
        Target::Smoke(cell) => {
            put_u32(hasher, 7);
            put_ivec2(hasher, *cell);
        }
        Target::Build(build) => {
            put_u32(hasher, 8);
            put_u32(hasher, u32::from(build.building_id));
            put_ivec2(hasher, build.unit_cell);
            put_ivec2(hasher, build.building_cell);
            put_u32(hasher, build.building_type as u32);
        }
        Target::BuildAssist(id) => {
            put_u32(hasher, 9);
            put_u32(hasher, u32::from(*id));
        }
        Target::Gold(id) => {
            put_u32(hasher, 10);
            put_u32(hasher, u32::from(*id));
        }
    }
}

fn put_entity(hasher: &mut Hasher, entity: &Entity) {
    put_u32(hasher, entity.entity_type as u32);
    put_u32(hasher, entity.mode as u32);
    hasher.update(&[entity.player_id]);
    put_u32(hasher, entity.flags);
    put_ivec2(hasher, entity.cell);
    put_fvec2(hasher, entity.position);
    put_u32(hasher, entity.direction as u32);
    put_i32(hasher, entity.health);
    put_target(hasher, &entity.target);
    put_u32(hasher, entity.target_queue.len() as u32);
    for target in &entity.target_queue {
        put_target(hasher, target);
    }
    put_target(hasher, &entity.remembered_gold_target);
    put_u32(hasher, entity.path.len() as u32);
    for cell in &entity.path {
        put_ivec2(hasher, *cell);
    }
    put_u32(hasher, entity.pathfind_attempts);
    put_u32(hasher, entity.queue.len() as u32);
    for item in &entity.queue {
        match item {
            BuildingQueueItem::Unit(unit_type) => {
                put_u32(hasher, 0);
                put_u32(hasher, *unit_type as u32);
            }
            BuildingQueueItem::Upgrade(upgrade) => {
                put_u32(hasher, 1);
                put_u32(hasher, *upgrade);
            }
        }
    }
    put_ivec2(hasher, entity.rally_point);
    put_u32(hasher, entity.timer);
    put_animation(hasher, &entity.animation);
    put_u32(hasher, entity.garrisoned_units.len() as u32);
    for id in &entity.garrisoned_units {
        put_u32(hasher, u32::from(*id));
    }
    put_u32(hasher, u32::from(entity.garrison_id));
    put_u32(hasher, entity.cooldown_timer);
    put_u32(hasher, entity.gold_held);
    put_u32(hasher, u32::from(entity.gold_patch_id));
    put_u32(hasher, entity.taking_damage_timer);
    put_u32(hasher, entity.health_regen_timer);
}

/// Digests the full observable simulation state.
#[must_use]
pub fn state_digest(state: &MatchState) -> StateDigest {
    let mut hasher = Hasher::new();

    put_u32(&mut hasher, state.lcg.state());

    put_i32(&mut hasher, state.map.width);
    put_i32(&mut hasher, state.map.height);
    for tile in &state.map.tiles {
        hasher.update(&tile.sprite.to_le_bytes());
        hasher.update(&[tile.elevation]);
    }
    for cell in &state.map.cells {
        hasher.update(&cell.to_le_bytes());
    }
    for mine in &state.map.mine_cells {
        hasher.update(&mine.to_le_bytes());
    }
    for team in 0..MAX_PLAYERS {
        for fog in &state.map.fog[team] {
            put_i32(&mut hasher, *fog);
        }
        for detection in &state.map.detection[team] {
            put_i32(&mut hasher, *detection);
        }
    }
    for spawn in state.map.player_spawns {
        put_ivec2(&mut hasher, spawn);
    }

    for player_id in 0..MAX_PLAYERS {
        put_u32(&mut hasher, state.player_gold[player_id]);
        put_u32(&mut hasher, state.player_upgrades[player_id]);
        put_u32(&mut hasher, state.player_upgrades_in_progress[player_id]);
    }

    put_u32(&mut hasher, state.entities.len() as u32);
    for index in 0..state.entities.len() {
        put_u32(&mut hasher, u32::from(state.entities.id_of(index)));
        put_entity(&mut hasher, &state.entities[index]);
    }

    put_u32(&mut hasher, state.projectiles.len() as u32);
    for projectile in &state.projectiles {
        put_fvec2(&mut hasher, projectile.position);
        put_fvec2(&mut hasher, projectile.target);
    }

    put_u32(&mut hasher, state.particles.len() as u32);
    for particle in &state.particles {
        put_animation(&mut hasher, &particle.animation);
        put_i32(&mut hasher, particle.vframe);
        put_ivec2(&mut hasher, particle.position);
    }

    put_u32(&mut hasher, state.map_reveals.len() as u32);
    for reveal in &state.map_reveals {
        hasher.update(&[reveal.player_id]);
        put_ivec2(&mut hasher, reveal.cell);
        put_i32(&mut hasher, reveal.cell_size);
        put_i32(&mut hasher, reveal.sight);
        put_u32(&mut hasher, reveal.timer);
    }

    StateDigest(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::state_digest;
    use crate::state::{MatchState, Player, PlayerStatus};

    fn player_row() -> [Player; crate::MAX_PLAYERS] {
        let mut players = [Player::default(); crate::MAX_PLAYERS];
        players[0] = Player {
            status: PlayerStatus::Playing,
            team: 0,
        };
        players
    }

    #[test]
    fn equal_states_hash_equal() {
        let a = MatchState::bare(16, 16, player_row(), 7);
        let b = MatchState::bare(16, 16, player_row(), 7);
        assert_eq!(state_digest(&a), state_digest(&b));
    }

    #[test]
    fn rng_state_is_observable() {
        let a = MatchState::bare(16, 16, player_row(), 7);
        let mut b = MatchState::bare(16, 16, player_row(), 7);
        b.lcg.rand();
        assert_ne!(state_digest(&a), state_digest(&b));
    }

    #[test]
    fn gold_is_observable() {
        let a = MatchState::bare(16, 16, player_row(), 7);
        let mut b = MatchState::bare(16, 16, player_row(), 7);
        b.player_gold[0] += 1;
        assert_ne!(state_digest(&a), state_digest(&b));
    }
}
