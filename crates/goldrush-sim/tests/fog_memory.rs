// SPDX-License-Identifier: Apache-2.0

#![allow(missing_docs)]

use goldrush_sim::entity::{behavior, EntityType};
use goldrush_sim::map::fog::fog_update;
use goldrush_sim::math::ivec2;
use goldrush_sim::state::{MatchState, Player, PlayerStatus};
use goldrush_sim::MAX_PLAYERS;

fn two_team_state() -> MatchState {
    let mut players = [Player::default(); MAX_PLAYERS];
    players[0] = Player {
        status: PlayerStatus::Playing,
        team: 0,
    };
    players[1] = Player {
        status: PlayerStatus::Playing,
        team: 1,
    };
    MatchState::bare(48, 48, players, 5)
}

#[test]
fn concealed_buildings_are_remembered_and_swept_when_seen_gone() {
    let mut state = two_team_state();

    // Player 1 owns a house; player 0 walks a scout's sight over it.
    let house_id = behavior::create_entity(&mut state, EntityType::House, 1, ivec2(20, 20));

    let viewer_cell = ivec2(16, 20);
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 9, true, false);
    assert!(state.map.is_cell_rect_revealed(0, ivec2(20, 20), 2));

    // Sight withdraws: the house is snapshotted into team 0's memory.
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 9, false, false);
    assert!(!state.map.is_cell_rect_revealed(0, ivec2(20, 20), 2));
    let remembered = state.map.remembered_entities[0]
        .get(&house_id)
        .copied();
    assert!(remembered.is_some_and(|r| {
        r.entity_type == EntityType::House && r.cell == ivec2(20, 20) && r.cell_size == 2
    }));

    // The house burns down while unobserved; memory must survive.
    if let Some(house) = state.entities.get_by_id_mut(house_id) {
        house.health = 0;
    }
    state.update();
    assert!(state.map.remembered_entities[0].contains_key(&house_id));

    // Re-observing the empty lot clears the memory.
    let mut ticks = 0;
    while state.entities.index_of(house_id).is_some() && ticks < 1000 {
        state.update();
        ticks += 1;
    }
    assert!(
        state.entities.index_of(house_id).is_none(),
        "wreck never faded"
    );
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 9, true, false);
    state.update();
    assert!(!state.map.remembered_entities[0].contains_key(&house_id));
}

#[test]
fn units_are_not_remembered() {
    let mut state = two_team_state();
    let bandit_id = behavior::create_entity(&mut state, EntityType::Bandit, 1, ivec2(20, 20));

    let viewer_cell = ivec2(17, 20);
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 8, true, false);
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 8, false, false);

    assert!(!state.map.remembered_entities[0].contains_key(&bandit_id));
}

#[test]
fn land_mines_are_never_remembered() {
    let mut state = two_team_state();
    let mine_id = behavior::create_entity(&mut state, EntityType::LandMine, 1, ivec2(20, 20));
    assert_eq!(state.map.mine_cells[(20 + 20 * 48) as usize], mine_id);

    let viewer_cell = ivec2(17, 20);
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 8, true, false);
    fog_update(&mut state.map, &state.entities, 0, viewer_cell, 1, 8, false, false);

    assert!(!state.map.remembered_entities[0].contains_key(&mine_id));
}
