// SPDX-License-Identifier: Apache-2.0
//! Gold Rush developer CLI: bake maps, run headless matches, print
//! per-tick state digests for cross-peer determinism audits.

// A CLI's job is to print.
#![allow(clippy::print_stdout)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use goldrush_proto::{Message, Packet};
use goldrush_sim::entity::EntityType;
use goldrush_sim::lockstep::{LockstepDriver, TickOutcome};
use goldrush_sim::state::{MapSize, MatchSettings, Player, PlayerStatus};
use goldrush_sim::{noise_generate, state_digest, Input, MatchState, MAX_PLAYERS};

#[derive(Parser)]
#[command(name = "goldrush", about = "Gold Rush lockstep audit tool", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bake a map from a seed and print its vital statistics.
    Bake {
        /// Match seed shared by all peers.
        #[arg(long)]
        seed: i32,
        /// Map size preset: small, medium or large.
        #[arg(long, default_value = "small")]
        size: String,
    },
    /// Run a headless match for N ticks, printing periodic digests.
    Run {
        /// Match seed shared by all peers.
        #[arg(long)]
        seed: i32,
        /// Map size preset: small, medium or large.
        #[arg(long, default_value = "small")]
        size: String,
        /// Number of ticks to simulate.
        #[arg(long, default_value_t = 600)]
        ticks: u32,
        /// Number of players (2 to 4).
        #[arg(long, default_value_t = 2)]
        players: usize,
        /// Print a digest every this many ticks.
        #[arg(long, default_value_t = 60)]
        digest_every: u32,
    },
}

fn parse_size(size: &str) -> Result<MapSize> {
    Ok(match size {
        "small" => MapSize::Small,
        "medium" => MapSize::Medium,
        "large" => MapSize::Large,
        other => bail!("unknown map size {other:?} (small, medium, large)"),
    })
}

fn player_row(count: usize) -> Result<[Player; MAX_PLAYERS]> {
    if !(2..=MAX_PLAYERS).contains(&count) {
        bail!("player count must be between 2 and {MAX_PLAYERS}");
    }
    let mut players = [Player::default(); MAX_PLAYERS];
    for (team, player) in players.iter_mut().take(count).enumerate() {
        *player = Player {
            status: PlayerStatus::Playing,
            team: team as u8,
        };
    }
    Ok(players)
}

fn init_match(seed: i32, size: MapSize, players: [Player; MAX_PLAYERS]) -> MatchState {
    let edge = size.tile_size();
    let noise = noise_generate(seed as u32 as u64, edge, edge);
    MatchState::init(seed, &noise, players, &MatchSettings { map_size: size })
}

fn bake(seed: i32, size: MapSize) -> Result<()> {
    let state = init_match(seed, size, player_row(2)?);

    let mines = state
        .entities
        .iter()
        .filter(|e| e.entity_type == EntityType::GoldMine)
        .count();
    println!("seed:    {seed}");
    println!("size:    {0}x{0}", size.tile_size());
    println!("mines:   {mines}");
    for (player_id, spawn) in state.map.player_spawns.iter().enumerate() {
        println!("spawn {player_id}: ({}, {})", spawn.x, spawn.y);
    }
    println!("digest:  {}", state_digest(&state));
    Ok(())
}

fn run(seed: i32, size: MapSize, ticks: u32, players: usize, digest_every: u32) -> Result<()> {
    let players = player_row(players)?;
    let mut state = init_match(seed, size, players);
    let mut driver = LockstepDriver::new(0, &state);
    let mut wire_bytes = 0_usize;

    println!("tick 0: {}", state_digest(&state));
    for tick in 1..=ticks {
        // Headless run: stand in for every remote peer with empty turns.
        for (player_id, player) in players.iter().enumerate().skip(1) {
            if player.status == PlayerStatus::Playing && driver.pending_bundles(player_id as u8) == 0
            {
                driver.enqueue_remote_bundle(player_id as u8, vec![Input::None]);
            }
        }
        match driver.update(&mut state) {
            TickOutcome::Advanced { outgoing } => {
                // Account for what a real transport would have carried.
                if let Some(bundle) = outgoing {
                    let frame = Packet::encode(&Message::Input {
                        player_id: 0,
                        bundle,
                    });
                    wire_bytes += frame.len();
                }
            }
            TickOutcome::Stalled => bail!("stalled at tick {tick}; headless feed failed"),
        }
        state.events.clear();
        if tick % digest_every == 0 {
            println!("tick {tick}: {}", state_digest(&state));
        }
    }
    println!("final:  {}", state_digest(&state));
    println!("wire:   {wire_bytes} bytes of outgoing input frames");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Bake { seed, size } => bake(seed, parse_size(&size)?),
        Command::Run {
            seed,
            size,
            ticks,
            players,
            digest_every,
        } => run(seed, parse_size(&size)?, ticks, players, digest_every),
    }
}
