// SPDX-License-Identifier: Apache-2.0

//! Entity model: the tagged record every simulated object shares, the
//! per-type static data tables, targets and building queues.
//!
//! There is deliberately no trait-object polymorphism here: entities are
//! one sum-typed record dispatched by explicit `match`, which keeps
//! serialization and lockstep determinism trivial to audit.

pub mod animation;
pub mod behavior;
pub mod production;
pub mod store;

use crate::math::{ivec2, Direction, FVec2, Fixed, IVec2};

pub use animation::{Animation, AnimationName};
pub use store::{EntityId, IdArray, ID_MAX, ID_NULL};

/// Owner id for unowned entities (gold mines, wrecks after disconnect).
pub const PLAYER_NONE: u8 = crate::MAX_PLAYERS as u8;

/// Maximum queued production/research items per building.
pub const BUILDING_QUEUE_MAX: usize = 5;

/// Dequeue index meaning "pop the most recently enqueued item".
pub const BUILDING_DEQUEUE_POP_BACK: u32 = BUILDING_QUEUE_MAX as u32;

/// Building timer sentinel: production held for population room.
pub const BUILDING_QUEUE_BLOCKED: u32 = u32::MAX;

/// Building timer sentinel: production held for a free exit cell.
pub const BUILDING_QUEUE_EXIT_BLOCKED: u32 = u32::MAX - 1;

/// Ticks a destroyed building lingers as an obstacle.
pub const BUILDING_FADE_DURATION: u32 = 300;

/// Unload argument meaning "every garrisoned unit".
pub const ENTITY_UNLOAD_ALL: EntityId = ID_NULL;

/// Entity flag: unit refuses to chase (defend command).
pub const ENTITY_FLAG_HOLD_POSITION: u32 = 1;

/// Entity flag: damage flicker is active (render hint, sim-owned timer).
pub const ENTITY_FLAG_DAMAGE_FLICKER: u32 = 2;

/// Entity flag: cloaked; enemies need detection coverage to target it.
pub const ENTITY_FLAG_INVISIBLE: u32 = 4;

/// Everything that can exist on the map.
///
/// Unit variants come first, then buildings, then the two map-object
/// types; `is_unit`/`is_building` depend on this ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum EntityType {
    Miner,
    Cowboy,
    Bandit,
    Wagon,
    WarWagon,
    Jockey,
    Sapper,
    Tinker,
    Soldier,
    Cannon,
    Spy,
    Hall,
    Camp,
    House,
    Saloon,
    Bunker,
    Coop,
    Smith,
    Barracks,
    Sheriffs,
    LandMine,
    GoldMine,
}

impl EntityType {
    /// All types in discriminant order (used by the wire codec).
    pub const ALL: [Self; 22] = [
        Self::Miner,
        Self::Cowboy,
        Self::Bandit,
        Self::Wagon,
        Self::WarWagon,
        Self::Jockey,
        Self::Sapper,
        Self::Tinker,
        Self::Soldier,
        Self::Cannon,
        Self::Spy,
        Self::Hall,
        Self::Camp,
        Self::House,
        Self::Saloon,
        Self::Bunker,
        Self::Coop,
        Self::Smith,
        Self::Barracks,
        Self::Sheriffs,
        Self::LandMine,
        Self::GoldMine,
    ];

    /// Type from its wire discriminant.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Mobile unit?
    #[must_use]
    pub const fn is_unit(self) -> bool {
        (self as u8) <= (Self::Spy as u8)
    }

    /// Player-constructed building?
    #[must_use]
    pub const fn is_building(self) -> bool {
        (self as u8) >= (Self::Hall as u8) && (self as u8) <= (Self::Sheriffs as u8)
    }

    /// Static data for this type.
    #[must_use]
    pub fn data(self) -> &'static EntityData {
        &ENTITY_DATA[self as usize]
    }

    /// Footprint edge length in cells.
    #[must_use]
    pub fn cell_size(self) -> i32 {
        self.data().cell_size
    }
}

/// Per-type combat and movement parameters for units.
#[derive(Clone, Copy, Debug)]
pub struct UnitData {
    /// Population slots the unit occupies.
    pub population_cost: u32,
    /// Cells per tick.
    pub speed: Fixed,
    /// Base damage before armor.
    pub damage: i32,
    /// Ticks between attacks.
    pub attack_cooldown: u32,
    /// Squared maximum attack range; `2` means melee (diagonal adjacency).
    pub range_squared: i32,
    /// Squared minimum range (artillery dead zone).
    pub min_range_squared: i32,
}

/// Static per-type entity parameters.
#[derive(Clone, Copy, Debug)]
pub struct EntityData {
    /// Display name, also used in diagnostics.
    pub name: &'static str,
    /// Footprint edge length in cells.
    pub cell_size: i32,
    /// Gold cost to build or train.
    pub gold_cost: u32,
    /// Ticks to train (units) or research reference (unused for buildings).
    pub train_duration: u32,
    /// Hit points when complete.
    pub max_health: i32,
    /// Sight radius in cells.
    pub sight: i32,
    /// Flat damage reduction.
    pub armor: i32,
    /// Auto-target preference; higher is attacked first.
    pub attack_priority: u32,
    /// Garrison slots offered to other units.
    pub garrison_capacity: u32,
    /// Garrison slots this entity occupies when riding.
    pub garrison_size: u32,
    /// Whether this entity reveals cloaked enemies.
    pub has_detection: bool,
    /// Whether a rally point may be set.
    pub can_rally: bool,
    /// Unit parameters; `None` for buildings and map objects.
    pub unit: Option<UnitData>,
}

const fn spd(raw_per_64k: i32) -> Fixed {
    Fixed::from_raw(raw_per_64k)
}

const NOT_A_UNIT: Option<UnitData> = None;

macro_rules! unit {
    ($pop:expr, $speed:expr, $dmg:expr, $cd:expr, $range2:expr, $min2:expr) => {
        Some(UnitData {
            population_cost: $pop,
            speed: $speed,
            damage: $dmg,
            attack_cooldown: $cd,
            range_squared: $range2,
            min_range_squared: $min2,
        })
    };
}

/// Static data table, indexed by `EntityType` discriminant.
#[rustfmt::skip]
pub static ENTITY_DATA: [EntityData; 22] = [
    EntityData { name: "Miner",      cell_size: 1, gold_cost: 50,  train_duration: 30, max_health: 25,  sight: 7,  armor: 0, attack_priority: 1, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0xCCCC), 3,  30, 2,   0) },
    EntityData { name: "Cowboy",     cell_size: 1, gold_cost: 100, train_duration: 45, max_health: 40,  sight: 9,  armor: 0, attack_priority: 2, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0xE666), 8,  40, 36,  0) },
    EntityData { name: "Bandit",     cell_size: 1, gold_cost: 75,  train_duration: 40, max_health: 50,  sight: 8,  armor: 0, attack_priority: 2, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0x10000), 6, 25, 2,   0) },
    EntityData { name: "Wagon",      cell_size: 2, gold_cost: 200, train_duration: 60, max_health: 120, sight: 9,  armor: 0, attack_priority: 1, garrison_capacity: 4, garrison_size: 2, has_detection: false, can_rally: false, unit: unit!(2, spd(0x14CCC), 0, 0,  0,   0) },
    EntityData { name: "War Wagon",  cell_size: 2, gold_cost: 200, train_duration: 60, max_health: 150, sight: 9,  armor: 1, attack_priority: 2, garrison_capacity: 4, garrison_size: 2, has_detection: false, can_rally: false, unit: unit!(2, spd(0x13333), 10, 40, 25, 0) },
    EntityData { name: "Jockey",     cell_size: 1, gold_cost: 125, train_duration: 45, max_health: 35,  sight: 10, armor: 0, attack_priority: 2, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0x16666), 6, 30, 25,  0) },
    EntityData { name: "Sapper",     cell_size: 1, gold_cost: 100, train_duration: 40, max_health: 30,  sight: 7,  armor: 0, attack_priority: 3, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0x10000), 60, 0, 2,   0) },
    EntityData { name: "Tinker",     cell_size: 1, gold_cost: 150, train_duration: 50, max_health: 30,  sight: 8,  armor: 0, attack_priority: 1, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0xE666), 0,  0,  0,   0) },
    EntityData { name: "Soldier",    cell_size: 1, gold_cost: 150, train_duration: 55, max_health: 60,  sight: 9,  armor: 1, attack_priority: 2, garrison_capacity: 0, garrison_size: 1, has_detection: false, can_rally: false, unit: unit!(1, spd(0xE666), 12, 35, 49,  4) },
    EntityData { name: "Cannon",     cell_size: 2, gold_cost: 300, train_duration: 75, max_health: 80,  sight: 10, armor: 0, attack_priority: 3, garrison_capacity: 0, garrison_size: 2, has_detection: false, can_rally: false, unit: unit!(2, spd(0xB333), 30, 90, 100, 9) },
    EntityData { name: "Spy",        cell_size: 1, gold_cost: 125, train_duration: 45, max_health: 35,  sight: 10, armor: 0, attack_priority: 2, garrison_capacity: 0, garrison_size: 1, has_detection: true,  can_rally: false, unit: unit!(1, spd(0x11999), 8, 30, 25,  0) },
    EntityData { name: "Town Hall",  cell_size: 4, gold_cost: 400, train_duration: 0,  max_health: 1000, sight: 9, armor: 2, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: true,  unit: NOT_A_UNIT },
    EntityData { name: "Camp",       cell_size: 2, gold_cost: 150, train_duration: 0,  max_health: 300, sight: 7,  armor: 1, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
    EntityData { name: "House",      cell_size: 2, gold_cost: 100, train_duration: 0,  max_health: 200, sight: 5,  armor: 0, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
    EntityData { name: "Saloon",     cell_size: 3, gold_cost: 200, train_duration: 0,  max_health: 400, sight: 7,  armor: 1, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: true,  unit: NOT_A_UNIT },
    EntityData { name: "Bunker",     cell_size: 2, gold_cost: 150, train_duration: 0,  max_health: 300, sight: 8,  armor: 2, attack_priority: 0, garrison_capacity: 4, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
    EntityData { name: "Chicken Coop", cell_size: 2, gold_cost: 200, train_duration: 0, max_health: 250, sight: 6, armor: 0, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: true,  unit: NOT_A_UNIT },
    EntityData { name: "Blacksmith", cell_size: 3, gold_cost: 250, train_duration: 0,  max_health: 350, sight: 6,  armor: 1, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
    EntityData { name: "Barracks",   cell_size: 3, gold_cost: 250, train_duration: 0,  max_health: 500, sight: 7,  armor: 1, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: true,  unit: NOT_A_UNIT },
    EntityData { name: "Sheriff's Office", cell_size: 3, gold_cost: 300, train_duration: 0, max_health: 450, sight: 11, armor: 1, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: true, can_rally: true, unit: NOT_A_UNIT },
    EntityData { name: "Land Mine",  cell_size: 1, gold_cost: 30,  train_duration: 0,  max_health: 5,   sight: 2,  armor: 0, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
    EntityData { name: "Gold Mine",  cell_size: 3, gold_cost: 0,   train_duration: 0,  max_health: 0,   sight: 0,  armor: 0, attack_priority: 0, garrison_capacity: 0, garrison_size: 0, has_detection: false, can_rally: false, unit: NOT_A_UNIT },
];

/// Player-wide upgrade bit: wagons train as war wagons.
pub const UPGRADE_WAR_WAGON: u32 = 1;
/// Player-wide upgrade bit: sappers may plant land mines.
pub const UPGRADE_EXPLOSIVES: u32 = 2;
/// Player-wide upgrade bit: soldiers fight back in melee.
pub const UPGRADE_BAYONETS: u32 = 4;
/// Player-wide upgrade bit: tinkers may throw smoke bombs.
pub const UPGRADE_SMOKE: u32 = 8;

/// Static data for a researchable upgrade.
#[derive(Clone, Copy, Debug)]
pub struct UpgradeData {
    /// Display name.
    pub name: &'static str,
    /// Gold cost to enqueue.
    pub gold_cost: u32,
    /// Research duration in ticks.
    pub research_duration: u32,
}

/// Data for an upgrade bit; unknown bits fall back to a zero-cost entry.
#[must_use]
pub const fn upgrade_data(upgrade: u32) -> UpgradeData {
    match upgrade {
        UPGRADE_WAR_WAGON => UpgradeData {
            name: "Wagon Armor",
            gold_cost: 300,
            research_duration: 50,
        },
        UPGRADE_EXPLOSIVES => UpgradeData {
            name: "Explosives",
            gold_cost: 400,
            research_duration: 75,
        },
        UPGRADE_BAYONETS => UpgradeData {
            name: "Bayonets",
            gold_cost: 200,
            research_duration: 50,
        },
        UPGRADE_SMOKE => UpgradeData {
            name: "Smoke Bombs",
            gold_cost: 300,
            research_duration: 60,
        },
        _ => UpgradeData {
            name: "",
            gold_cost: 0,
            research_duration: 0,
        },
    }
}

/// What an entity is currently doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EntityMode {
    UnitIdle,
    UnitMove,
    UnitMoveBlocked,
    UnitMoveFinished,
    UnitBuild,
    UnitRepair,
    UnitAttackWindup,
    UnitSoldierRangedWindup,
    /// Inside a gold mine, digging.
    UnitMine,
    /// Just stepped out of a gold mine carrying ore.
    UnitOutMine,
    UnitTinkerThrow,
    UnitDeath,
    UnitDeathFade,
    BuildingInProgress,
    BuildingFinished,
    BuildingDestroyed,
    MineArm,
    MinePrime,
    Gold,
    GoldMinedOut,
}

/// Build order payload: where the builder stands and what goes where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildTarget {
    /// The building once construction has started; [`ID_NULL`] before.
    pub building_id: EntityId,
    /// Cell the builder walks to before construction starts.
    pub unit_cell: IVec2,
    /// Top-left cell of the building footprint.
    pub building_cell: IVec2,
    /// What gets built.
    pub building_type: EntityType,
}

/// An entity's active order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Target {
    /// No order.
    #[default]
    None,
    /// Walk to a cell.
    Cell(IVec2),
    /// Follow / interact with an entity.
    Entity(EntityId),
    /// Attack-move to a cell.
    AttackCell(IVec2),
    /// Attack a specific entity.
    AttackEntity(EntityId),
    /// Repair an allied building, tracking credited health.
    Repair {
        /// Building being repaired.
        id: EntityId,
        /// Health points credited so far (refund bookkeeping).
        health_repaired: u32,
    },
    /// Move to a cell, then unload all passengers.
    Unload(IVec2),
    /// Throw a smoke bomb at a cell.
    Smoke(IVec2),
    /// Construct a building.
    Build(BuildTarget),
    /// Help another builder with their current build order.
    BuildAssist(EntityId),
    /// Mine the given gold mine.
    Gold(EntityId),
}

impl Target {
    /// Whether this is the empty order.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One queued production or research item in a building.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildingQueueItem {
    /// Train a unit of the given type.
    Unit(EntityType),
    /// Research the upgrade with the given bit.
    Upgrade(u32),
}

impl BuildingQueueItem {
    /// Gold cost to enqueue this item.
    #[must_use]
    pub fn cost(self) -> u32 {
        match self {
            Self::Unit(unit_type) => unit_type.data().gold_cost,
            Self::Upgrade(upgrade) => upgrade_data(upgrade).gold_cost,
        }
    }

    /// Ticks until this item completes.
    #[must_use]
    pub fn duration(self) -> u32 {
        match self {
            Self::Unit(unit_type) => unit_type.data().train_duration,
            Self::Upgrade(upgrade) => upgrade_data(upgrade).research_duration,
        }
    }
}

/// Marker for "no remembered gold patch".
pub const GOLD_PATCH_ID_NULL: EntityId = ID_NULL;

/// The polymorphic simulation record.
#[derive(Clone, Debug)]
pub struct Entity {
    /// What this entity is.
    pub entity_type: EntityType,
    /// Current state-machine mode.
    pub mode: EntityMode,
    /// Owning player, or [`PLAYER_NONE`].
    pub player_id: u8,
    /// Flag bitset (`ENTITY_FLAG_*`).
    pub flags: u32,

    /// Top-left occupied grid cell.
    pub cell: IVec2,
    /// Sub-cell position in fixed point.
    pub position: FVec2,
    /// Facing.
    pub direction: Direction,

    /// Current hit points; 0 triggers the death transition.
    pub health: i32,
    /// Active order.
    pub target: Target,
    /// Orders applied when the current one completes.
    pub target_queue: Vec<Target>,
    /// Last gold order, resumed after deliveries.
    pub remembered_gold_target: Target,
    /// Remaining cells to walk, front first.
    pub path: Vec<IVec2>,
    /// Consecutive pathfinding failures; 4 drops the order.
    pub pathfind_attempts: u32,

    /// Production/research queue (buildings only).
    pub queue: Vec<BuildingQueueItem>,
    /// Default destination for freshly produced units.
    pub rally_point: IVec2,
    /// Multi-purpose countdown (windups, fades, repair ticks, mining).
    pub timer: u32,

    /// Simulation-side animation bookkeeping.
    pub animation: Animation,

    /// Ids hiding inside this entity.
    pub garrisoned_units: Vec<EntityId>,
    /// Carrier id if this entity is garrisoned, else [`ID_NULL`].
    pub garrison_id: EntityId,
    /// Ability cooldown (smoke bombs).
    pub cooldown_timer: u32,

    /// Gold carried (miners) or remaining (gold mines).
    pub gold_held: u32,
    /// Gold mine this miner last worked, or [`GOLD_PATCH_ID_NULL`].
    pub gold_patch_id: EntityId,

    /// Ticks left on the under-attack indicator.
    pub taking_damage_timer: u32,
    /// Ticks until the next idle health regeneration point.
    pub health_regen_timer: u32,
}

impl Entity {
    /// Creates a record in the given mode with type defaults applied.
    #[must_use]
    pub fn new(entity_type: EntityType, player_id: u8, cell: IVec2, mode: EntityMode) -> Self {
        let data = entity_type.data();
        Self {
            entity_type,
            mode,
            player_id,
            flags: 0,
            cell,
            position: cell_center(cell, data.cell_size),
            direction: Direction::South,
            health: data.max_health,
            target: Target::None,
            target_queue: Vec::new(),
            remembered_gold_target: Target::None,
            path: Vec::new(),
            pathfind_attempts: 0,
            queue: Vec::new(),
            rally_point: ivec2(-1, -1),
            timer: 0,
            animation: Animation::start(AnimationName::UnitIdle),
            garrisoned_units: Vec::new(),
            garrison_id: ID_NULL,
            cooldown_timer: 0,
            gold_held: 0,
            gold_patch_id: GOLD_PATCH_ID_NULL,
            taking_damage_timer: 0,
            health_regen_timer: 0,
        }
    }

    /// Static data for this entity's type.
    #[must_use]
    pub fn data(&self) -> &'static EntityData {
        self.entity_type.data()
    }

    /// Footprint edge length.
    #[must_use]
    pub fn cell_size(&self) -> i32 {
        self.entity_type.cell_size()
    }

    /// Whether the flag bit is set.
    #[must_use]
    pub const fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// Sets or clears a flag bit.
    pub fn set_flag(&mut self, flag: u32, value: bool) {
        if value {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Whether this entity can still be targeted by commands and appear
    /// in fog memory. Gold mines and destroyed-building wrecks count
    /// despite zero health; dying, hidden and garrisoned entities do not.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        if self.garrison_id != ID_NULL {
            return false;
        }
        match self.mode {
            EntityMode::UnitDeath
            | EntityMode::UnitDeathFade
            | EntityMode::UnitMine
            | EntityMode::GoldMinedOut => false,
            EntityMode::BuildingDestroyed | EntityMode::Gold => true,
            _ => self.health > 0,
        }
    }

    /// Whether the unit currently counts as working a gold mine for the
    /// occupancy gold-walk exception.
    #[must_use]
    pub fn is_mining(&self) -> bool {
        match self.mode {
            EntityMode::UnitMine | EntityMode::UnitOutMine => true,
            _ => matches!(self.target, Target::Gold(_)),
        }
    }

    /// Fixed-point center of the entity's occupied rect.
    #[must_use]
    pub fn target_position(&self) -> FVec2 {
        cell_center(self.cell, self.cell_size())
    }
}

/// Fixed-point center of a `size × size` rect anchored at `cell`.
#[must_use]
pub fn cell_center(cell: IVec2, size: i32) -> FVec2 {
    use crate::math::fvec2;
    let half = Fixed::from_int(size) / Fixed::from_int(2);
    fvec2(
        Fixed::from_int(cell.x) + half,
        Fixed::from_int(cell.y) + half,
    )
}

#[cfg(test)]
mod tests {
    use super::{BuildingQueueItem, Entity, EntityMode, EntityType, UPGRADE_WAR_WAGON};
    use crate::math::ivec2;

    #[test]
    fn type_classes_split_cleanly() {
        for ty in EntityType::ALL {
            let class_count = u32::from(ty.is_unit()) + u32::from(ty.is_building());
            match ty {
                EntityType::LandMine | EntityType::GoldMine => assert_eq!(class_count, 0),
                _ => assert_eq!(class_count, 1, "{ty:?}"),
            }
        }
    }

    #[test]
    fn unit_data_present_exactly_for_units() {
        for ty in EntityType::ALL {
            assert_eq!(ty.data().unit.is_some(), ty.is_unit(), "{ty:?}");
        }
    }

    #[test]
    fn queue_item_costs_come_from_the_tables() {
        assert_eq!(BuildingQueueItem::Unit(EntityType::Miner).cost(), 50);
        assert_eq!(BuildingQueueItem::Upgrade(UPGRADE_WAR_WAGON).cost(), 300);
    }

    #[test]
    fn garrisoned_units_are_not_selectable() {
        let mut unit = Entity::new(EntityType::Miner, 0, ivec2(3, 3), EntityMode::UnitIdle);
        assert!(unit.is_selectable());
        unit.garrison_id = 7;
        assert!(!unit.is_selectable());
    }
}
