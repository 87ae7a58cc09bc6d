//! # Deathmatch Server Library
//!
//! This library provides the authoritative server for a team deathmatch
//! shooter. It owns the canonical combat state, resolves every shot, runs the
//! round state machine, and broadcasts the results to all connected clients.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Combat
//! Clients only ask: "I pulled the trigger", "I want to reload", "put me on
//! blue". The server decides whether the request is allowed, traces hitscan
//! rays against level geometry and player hitboxes, applies damage, and
//! reports deaths and respawns. No client can change health, ammo or score
//! directly.
//!
//! ### Round Flow
//! Players gather in the lobby, the host starts the match, and rounds are
//! played until one team has won `rounds_to_win` of them. A round ends the
//! moment every member of a team is dead; the other team scores exactly one
//! point no matter how many death reports arrive.
//!
//! ### State Broadcasting
//! Every tick the server sends a `MatchState` snapshot (round, scores, every
//! player's health, ammo and position). One-off effects such as shot tracers,
//! deaths and respawns are pushed to everyone; hitmarkers and dry-fire clicks
//! go only to the player they concern.
//!
//! ## Architecture Design
//!
//! ### Single Writer
//! The [`game::Match`] value is owned by the server's event loop and mutated
//! only there. Network receive, send and timeout checks run as separate tasks
//! that talk to the loop over channels, so gameplay never needs a lock.
//!
//! ### Deferred Work Without Sleeping
//! Respawns, reload completions and the pause between rounds are entries in
//! a deadline-ordered scheduler that the loop drains every tick. Each entry
//! carries a guard (life counter, reload epoch, round number) so a timer that
//! outlived its context is dropped instead of acting on the wrong state.
//!
//! ## Module Organization
//!
//! - `world`: ray queries against level geometry and player hitboxes
//! - `hit_resolver`: pellets, spread, team filtering and headshot damage
//! - `combat`: per-player health, ammo, fire cooldown and reload state
//! - `life_cycle`: damage application, death and respawn
//! - `round`: the lobby / round / match-over state machine
//! - `teams`: team membership and spawn lookup
//! - `timers`: the deadline scheduler
//! - `events`: change notifications for observers
//! - `game`: the `Match` tying everything together
//! - `client_manager` and `network`: the UDP transport
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::MatchConfig;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // ~60Hz
//!         16,
//!         MatchConfig::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod combat;
pub mod error;
pub mod events;
pub mod game;
pub mod hit_resolver;
pub mod life_cycle;
pub mod network;
pub mod round;
pub mod teams;
pub mod timers;
pub mod world;
