// SPDX-License-Identifier: Apache-2.0

//! The authoritative match state and its per-tick update.
//!
//! One `MatchState` per process; every mutation happens inside
//! [`MatchState::update`] or an input handler it calls, on one thread.
//! The update order inside a tick is observable: particles, then
//! projectiles, then map reveals, then every entity in store order, then
//! dead-entity removal, then the remembered-entity sweep.

use crate::entity::{
    behavior, Animation, AnimationName, Entity, EntityMode, EntityType, IdArray, ID_NULL,
    PLAYER_NONE,
};
use crate::event::{MatchEvent, SoundName};
use crate::map::{fog::fog_update, gen, Map, CELL_EMPTY};
use crate::math::{ivec2, FVec2, Fixed, IVec2, Lcg};
use crate::noise::NoiseMap;
use crate::MAX_PLAYERS;

/// Gold every player starts with.
pub const PLAYER_STARTING_GOLD: u32 = 450;

/// Flight speed of smoke projectiles, cells per tick.
pub const PROJECTILE_SMOKE_SPEED: Fixed = Fixed::from_int(4);

/// Map-size presets carried by the match settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapSize {
    /// 96 × 96 cells.
    Small,
    /// 128 × 128 cells.
    Medium,
    /// 164 × 164 cells.
    Large,
}

impl MapSize {
    /// Edge length in cells.
    #[must_use]
    pub const fn tile_size(self) -> u32 {
        match self {
            Self::Small => 96,
            Self::Medium => 128,
            Self::Large => 164,
        }
    }

    /// Poisson-disk radius used for extra gold patches.
    #[must_use]
    pub const fn gold_disk_radius(self) -> i32 {
        match self {
            Self::Small | Self::Medium => 42,
            Self::Large => 48,
        }
    }
}

/// Match-level settings every peer agrees on before loading.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchSettings {
    /// Map-size preset.
    pub map_size: MapSize,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            map_size: MapSize::Small,
        }
    }
}

/// Participation state of one player slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerStatus {
    /// Slot unused.
    #[default]
    None,
    /// Playing; the driver requires this player's bundles.
    Playing,
    /// Gone; bundles are no longer required, entities stay as obstacles.
    Disconnected,
}

/// One player slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Player {
    /// Participation state.
    pub status: PlayerStatus,
    /// Team index; fog and alliances key on this.
    pub team: u8,
}

/// Projectile sprites the renderer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectileSprite {
    /// Smoke bomb in flight.
    Smoke,
}

/// A projectile in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projectile {
    /// Which sprite to draw.
    pub sprite: ProjectileSprite,
    /// Current sub-cell position.
    pub position: FVec2,
    /// Landing position.
    pub target: FVec2,
}

/// Particle sprites the renderer distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleSprite {
    /// Smoke cloud.
    Smoke,
}

/// A visual particle. Produced deterministically by the simulation,
/// consumed only by rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Particle {
    /// Which sprite sheet.
    pub sprite: ParticleSprite,
    /// Playback state.
    pub animation: Animation,
    /// Vertical sheet row.
    pub vframe: i32,
    /// World cell anchor.
    pub position: IVec2,
}

/// A timed fog reveal unanchored from any entity (smoke bombs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapReveal {
    /// Player whose team sees through it.
    pub player_id: u8,
    /// Anchor cell.
    pub cell: IVec2,
    /// Anchor rect size.
    pub cell_size: i32,
    /// Sight radius.
    pub sight: i32,
    /// Ticks left; the reveal's fog lifts at zero.
    pub timer: u32,
}

/// The authoritative simulation state shared by all peers.
#[derive(Clone, Debug)]
pub struct MatchState {
    /// The only random source in the simulation.
    pub lcg: Lcg,
    /// Tiles, occupancy, fog.
    pub map: Map,
    /// Every live entity.
    pub entities: IdArray<Entity>,
    /// Projectiles in flight.
    pub projectiles: Vec<Projectile>,
    /// Visual particles.
    pub particles: Vec<Particle>,
    /// Timed fog reveals.
    pub map_reveals: Vec<MapReveal>,
    /// Player slots.
    pub players: [Player; MAX_PLAYERS],
    /// Gold per player.
    pub player_gold: [u32; MAX_PLAYERS],
    /// Completed upgrade bits per player.
    pub player_upgrades: [u32; MAX_PLAYERS],
    /// Queued-but-unfinished upgrade bits per player.
    pub player_upgrades_in_progress: [u32; MAX_PLAYERS],
    /// Host-facing event queue; drained by the embedding layer.
    pub events: Vec<MatchEvent>,
}

impl MatchState {
    /// Team of a player slot. Neutral entities ([`PLAYER_NONE`]) never
    /// reach the fog paths — callers guard on ownership first — so the
    /// out-of-range fallback only has to be deterministic, not meaningful.
    #[must_use]
    pub fn team_of(&self, player_id: u8) -> usize {
        if player_id as usize >= MAX_PLAYERS {
            return 0;
        }
        self.players[player_id as usize].team as usize
    }

    /// Minimal state for unit tests: an open map, no bake, no entities.
    #[must_use]
    pub fn bare(width: i32, height: i32, players: [Player; MAX_PLAYERS], lcg_seed: i32) -> Self {
        Self {
            lcg: Lcg::new(lcg_seed),
            map: Map::new(width, height),
            entities: IdArray::new(),
            projectiles: Vec::new(),
            particles: Vec::new(),
            map_reveals: Vec::new(),
            players,
            player_gold: [0; MAX_PLAYERS],
            player_upgrades: [0; MAX_PLAYERS],
            player_upgrades_in_progress: [0; MAX_PLAYERS],
            events: Vec::new(),
        }
    }

    /// Seeded match bootstrap: bake the map from noise, then give every
    /// live player their starting gold, wagon and miners.
    ///
    /// Both peers must pass byte-identical `lcg_seed`, `noise`, `players`
    /// and `settings`; everything downstream is derived from them.
    #[must_use]
    pub fn init(
        lcg_seed: i32,
        noise: &NoiseMap,
        players: [Player; MAX_PLAYERS],
        settings: &MatchSettings,
    ) -> Self {
        let mut state = Self::bare(noise.width as i32, noise.height as i32, players, lcg_seed);

        gen::map_init(
            &mut state.map,
            &mut state.entities,
            &mut state.lcg,
            noise,
            settings.map_size.gold_disk_radius(),
        );

        for player_id in 0..MAX_PLAYERS as u8 {
            if state.players[player_id as usize].status == PlayerStatus::None {
                continue;
            }
            state.player_gold[player_id as usize] = PLAYER_STARTING_GOLD;

            let player_spawn = state.map.player_spawns[player_id as usize];
            behavior::create_entity(
                &mut state,
                EntityType::Wagon,
                player_id,
                player_spawn + ivec2(1, 0),
            );
            behavior::create_entity(&mut state, EntityType::Miner, player_id, player_spawn);
            behavior::create_entity(
                &mut state,
                EntityType::Miner,
                player_id,
                player_spawn + ivec2(0, 1),
            );
            behavior::create_entity(
                &mut state,
                EntityType::Miner,
                player_id,
                player_spawn + ivec2(3, 0),
            );
            behavior::create_entity(
                &mut state,
                EntityType::Miner,
                player_id,
                player_spawn + ivec2(3, 1),
            );
        }

        state
    }

    /// Advances the simulation one tick.
    pub fn update(&mut self) {
        self.update_particles();
        self.update_projectiles();
        self.update_map_reveals();

        for entity_index in 0..self.entities.len() {
            behavior::entity_update(self, entity_index);
        }

        self.remove_dead_entities();
        self.sweep_remembered_entities();
    }

    fn update_particles(&mut self) {
        let mut particle_index = 0;
        while particle_index < self.particles.len() {
            self.particles[particle_index].animation.update();

            // Smoke chains start → loop → end before disappearing.
            if !self.particles[particle_index].animation.is_playing {
                let name = self.particles[particle_index].animation.name;
                if name == AnimationName::ParticleSmokeStart {
                    self.particles[particle_index].animation =
                        Animation::start(AnimationName::ParticleSmoke);
                } else if name == AnimationName::ParticleSmoke {
                    self.particles[particle_index].animation =
                        Animation::start(AnimationName::ParticleSmokeEnd);
                }
            }

            if self.particles[particle_index].animation.is_playing {
                particle_index += 1;
            } else {
                self.particles.remove(particle_index);
            }
        }
    }

    fn update_projectiles(&mut self) {
        let mut projectile_index = 0;
        while projectile_index < self.projectiles.len() {
            let projectile = &mut self.projectiles[projectile_index];
            let distance = projectile.position.distance_to(projectile.target);
            if distance <= PROJECTILE_SMOKE_SPEED {
                // Impact: leave the cloud behind.
                let position = projectile.target.to_ivec();
                self.particles.push(Particle {
                    sprite: ParticleSprite::Smoke,
                    animation: Animation::start(AnimationName::ParticleSmokeStart),
                    vframe: 0,
                    position,
                });
                self.events.push(MatchEvent::Sound {
                    sound: SoundName::Smoke,
                    position,
                });
                self.projectiles.remove(projectile_index);
            } else {
                let step = (projectile.target - projectile.position) * PROJECTILE_SMOKE_SPEED
                    / distance;
                projectile.position += step;
                projectile_index += 1;
            }
        }
    }

    fn update_map_reveals(&mut self) {
        let mut reveal_index = 0;
        while reveal_index < self.map_reveals.len() {
            self.map_reveals[reveal_index].timer -= 1;
            if self.map_reveals[reveal_index].timer == 0 {
                let reveal = self.map_reveals.remove(reveal_index);
                let team = self.team_of(reveal.player_id);
                fog_update(
                    &mut self.map,
                    &self.entities,
                    team,
                    reveal.cell,
                    reveal.cell_size,
                    reveal.sight,
                    false,
                    false,
                );
            } else {
                reveal_index += 1;
            }
        }
    }

    fn remove_dead_entities(&mut self) {
        let mut entity_index = 0;
        while entity_index < self.entities.len() {
            let entity = &self.entities[entity_index];
            let faded_out = entity.mode == EntityMode::UnitDeathFade && !entity.animation.is_playing;
            let died_garrisoned = entity.garrison_id != ID_NULL && entity.health == 0;
            let wreck_expired = entity.mode == EntityMode::BuildingDestroyed && entity.timer == 0;
            let mine_collapsed = entity.mode == EntityMode::GoldMinedOut && entity.timer == 0;

            if !(faded_out || died_garrisoned || wreck_expired || mine_collapsed) {
                entity_index += 1;
                continue;
            }

            let id = self.entities.id_of(entity_index);
            let entity = &self.entities[entity_index];
            let player_id = entity.player_id;
            let garrison_id = entity.garrison_id;
            let cell = entity.cell;
            let cell_size = entity.cell_size();
            let sight = entity.data().sight;
            let has_detection = entity.data().has_detection;

            // Lift this entity's fog. Units gave their sight up when they
            // began dying; buildings and land mines see until their wreck
            // clears. Neutral and garrisoned entities contributed none.
            let entity_type = self.entities[entity_index].entity_type;
            if player_id != PLAYER_NONE && garrison_id == ID_NULL && !entity_type.is_unit() {
                let team = self.team_of(player_id);
                fog_update(
                    &mut self.map,
                    &self.entities,
                    team,
                    cell,
                    cell_size,
                    sight,
                    false,
                    has_detection,
                );
            }

            // Free whatever footprint it still holds.
            for y in cell.y..cell.y + cell_size {
                for x in cell.x..cell.x + cell_size {
                    if !self.map.is_cell_in_bounds(ivec2(x, y)) {
                        continue;
                    }
                    let map_index = self.map.index(ivec2(x, y));
                    if self.map.cells[map_index] == id {
                        self.map.cells[map_index] = CELL_EMPTY;
                    }
                    if self.map.mine_cells[map_index] == id {
                        self.map.mine_cells[map_index] = ID_NULL;
                    }
                }
            }

            // A passenger dying frees its slot aboard the carrier.
            if garrison_id != ID_NULL {
                if let Some(carrier) = self.entities.get_by_id_mut(garrison_id) {
                    carrier.garrisoned_units.retain(|g| *g != id);
                }
            }

            self.entities.remove_at(entity_index);
            self.events.push(MatchEvent::EntityRemoved { id });
        }
    }

    // Forget remembered entities a team can see are gone.
    fn sweep_remembered_entities(&mut self) {
        if !self.map.is_fog_dirty {
            return;
        }
        for player_id in 0..MAX_PLAYERS as u8 {
            if self.players[player_id as usize].status == PlayerStatus::None {
                continue;
            }
            let team = self.team_of(player_id);

            // Collect first: removal decisions must not observe partial
            // mutation of the memory map.
            let mut forget: Vec<crate::entity::EntityId> = Vec::new();
            for (id, remembered) in &self.map.remembered_entities[team] {
                let gone = match self.entities.index_of(*id) {
                    None => true,
                    Some(index) => self.entities[index].health == 0,
                };
                let observed = self
                    .map
                    .is_cell_rect_revealed(team, remembered.cell, remembered.cell_size)
                    || (remembered.player_id != PLAYER_NONE
                        && self.team_of(remembered.player_id) == team);
                if gone && observed {
                    forget.push(*id);
                }
            }
            forget.sort_unstable();
            for id in forget {
                self.map.remembered_entities[team].remove(&id);
            }
        }
        self.map.is_fog_dirty = false;
    }

    /// Marks a player disconnected: the driver stops expecting bundles,
    /// their entities stay alive as ownerless obstacles.
    pub fn disconnect_player(&mut self, player_id: u8) {
        if (player_id as usize) < MAX_PLAYERS {
            self.players[player_id as usize].status = PlayerStatus::Disconnected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MapSize, MatchSettings, MatchState, Player, PlayerStatus};
    use crate::entity::EntityType;
    use crate::noise;

    fn two_players() -> [Player; crate::MAX_PLAYERS] {
        let mut players = [Player::default(); crate::MAX_PLAYERS];
        players[0] = Player {
            status: PlayerStatus::Playing,
            team: 0,
        };
        players[1] = Player {
            status: PlayerStatus::Playing,
            team: 1,
        };
        players
    }

    #[test]
    fn init_gives_each_player_their_starting_force() {
        let grid = noise::generate(1743160839, 96, 96);
        let state = MatchState::init(
            1743160839,
            &grid,
            two_players(),
            &MatchSettings {
                map_size: MapSize::Small,
            },
        );

        for player_id in 0..2 {
            let miners = state
                .entities
                .iter()
                .filter(|e| e.player_id == player_id && e.entity_type == EntityType::Miner)
                .count();
            let wagons = state
                .entities
                .iter()
                .filter(|e| e.player_id == player_id && e.entity_type == EntityType::Wagon)
                .count();
            assert_eq!(miners, 4);
            assert_eq!(wagons, 1);
            assert_eq!(state.player_gold[player_id as usize], 450);
        }
    }

    #[test]
    fn init_is_deterministic() {
        let grid = noise::generate(7, 96, 96);
        let settings = MatchSettings {
            map_size: MapSize::Small,
        };
        let mut a = MatchState::init(7, &grid, two_players(), &settings);
        let mut b = MatchState::init(7, &grid, two_players(), &settings);
        for _ in 0..20 {
            a.update();
            b.update();
        }
        assert_eq!(a.lcg.state(), b.lcg.state());
        assert_eq!(a.entities.len(), b.entities.len());
        assert_eq!(a.map.cells, b.map.cells);
    }

    #[test]
    fn update_runs_the_tick_order_without_panicking() {
        let grid = noise::generate(99, 96, 96);
        let mut state = MatchState::init(
            99,
            &grid,
            two_players(),
            &MatchSettings {
                map_size: MapSize::Small,
            },
        );
        for _ in 0..60 {
            state.update();
        }
        assert!(state.entities.len() >= 2);
    }
}
