// SPDX-License-Identifier: Apache-2.0

//! Events the simulation emits to its host.
//!
//! These are purely observational: the host plays sounds, pings the
//! minimap and prints status lines, none of which feeds back into the
//! simulation. User-visible input problems (not enough gold, blocked
//! exits, cooldowns) surface here as `Status` events with stable string
//! identifiers — they are never errors.

use crate::entity::EntityId;
use crate::math::IVec2;

/// Stable status identifier: placement rejected.
pub const STATUS_CANT_BUILD: &str = "STATUS_CANT_BUILD";
/// Stable status identifier: not enough gold.
pub const STATUS_NOT_ENOUGH_GOLD: &str = "STATUS_NOT_ENOUGH_GOLD";
/// Stable status identifier: population cap reached.
pub const STATUS_NOT_ENOUGH_HOUSE: &str = "STATUS_NOT_ENOUGH_HOUSE";
/// Stable status identifier: production queue full.
pub const STATUS_BUILDING_QUEUE_FULL: &str = "STATUS_BUILDING_QUEUE_FULL";
/// Stable status identifier: a worked gold mine ran dry.
pub const STATUS_MINE_COLLAPSED: &str = "STATUS_MINE_COLLAPSED";
/// Stable status identifier: units under attack away from view.
pub const STATUS_UNDER_ATTACK: &str = "STATUS_UNDER_ATTACK";
/// Stable status identifier: no free cell to step out of a gold mine.
pub const STATUS_MINE_EXIT_BLOCKED: &str = "STATUS_MINE_EXIT_BLOCKED";
/// Stable status identifier: no free cell to leave a building.
pub const STATUS_BUILDING_EXIT_BLOCKED: &str = "STATUS_BUILDING_EXIT_BLOCKED";
/// Stable status identifier: repair needs an allied building.
pub const STATUS_REPAIR_TARGET_INVALID: &str = "STATUS_REPAIR_TARGET_INVALID";
/// Stable status identifier: smoke bomb still recharging.
pub const STATUS_SMOKE_COOLDOWN: &str = "STATUS_SMOKE_COOLDOWN";

/// Sound cues the host resolves to actual audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SoundName {
    Gunshot,
    Cannon,
    Explosion,
    Smoke,
    Hammer,
    Pickaxe,
    Death,
    BuildingCollapse,
    GoldMineCollapse,
}

/// Minimap alert classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum AlertType {
    UnderAttack,
    BuildingFinished,
    UnitTrained,
    ResearchFinished,
    MineCollapsed,
}

/// One host-facing event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchEvent {
    /// Play a positional sound.
    Sound {
        /// Which cue.
        sound: SoundName,
        /// World cell it originates from.
        position: IVec2,
    },
    /// Ping the minimap for one player.
    Alert {
        /// Alert class.
        alert_type: AlertType,
        /// Player the alert belongs to.
        player_id: u8,
        /// Alert anchor cell.
        cell: IVec2,
        /// Anchor rect size.
        cell_size: i32,
    },
    /// Show a status line to one player.
    Status {
        /// Player the message belongs to.
        player_id: u8,
        /// Stable message identifier.
        message: &'static str,
    },
    /// Deliver a chat line from a player.
    Chat {
        /// Sender.
        player_id: u8,
        /// Message text.
        text: String,
    },
    /// A selectable entity finished dying or was destroyed (host clears
    /// selections referring to it).
    EntityRemoved {
        /// The id that is now free.
        id: EntityId,
    },
}
