//! Round & Register Orchestrator
//!
//! Drives the phase machine:
//!
//! ```text
//! Waiting ─start─▶ Programming ─▶ Executing (registers 1-5) ─▶ Cleanup ─┐
//!                      ▲                     │                          │
//!                      │                     └──▶ Finished              │
//!                      └────────────────────────────────────────────────┘
//! ```
//!
//! [`advance`] runs after every state-changing command and moves the game
//! forward until it is blocked on a connected player's decision. Registers
//! resolve without input, except that a damage-prevention window pauses the
//! register after its lasers.

use tracing::{debug, error, info, warn};

use crate::game::board::{Board, TileKind};
use crate::game::cards::{Deck, ProgramCard};
use crate::game::command::{Applied, CommandError};
use crate::game::events::GameEventData;
use crate::game::options::build_option_deck;
use crate::game::state::{Game, Phase, Player, PlayerId};
use crate::game::wait::{self, WaitKind};
use crate::game::{damage, movement, options, power};
use crate::REGISTER_COUNT;

// =============================================================================
// LOBBY
// =============================================================================

/// Seat a player in the lobby.
pub fn join(game: &mut Game, player_id: PlayerId, name: &str) -> Result<Applied, CommandError> {
    if game.phase != Phase::Waiting {
        return Err(CommandError::WrongPhase { command: "join", phase: game.phase });
    }
    if game.player(&player_id).is_some() {
        return Err(CommandError::AlreadyJoined(player_id));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(CommandError::InvalidName);
    }
    if game.players.len() >= game.rules.max_players {
        return Err(CommandError::RoomFull { max: game.rules.max_players });
    }

    game.players.push(Player::new(player_id, name, game.rules.starting_lives));
    info!(room = %game.room_code, player = %player_id, name, "player joined");
    game.push_event(GameEventData::PlayerJoined { player_id, name: name.to_string() });
    Ok(Applied::Changed)
}

/// Put every robot on its dock and deal the first round.
///
/// Players take docks 1, 2, ... in join order.
pub fn start(game: &mut Game, board: Board) -> Result<Applied, CommandError> {
    if game.phase != Phase::Waiting {
        return Err(CommandError::WrongPhase { command: "start", phase: game.phase });
    }
    board.validate()?;

    let joined = game.players.len();
    if joined < game.rules.min_players {
        return Err(CommandError::NotEnoughPlayers {
            required: game.rules.min_players,
            joined,
        });
    }
    if joined > board.starting_positions.len() {
        return Err(CommandError::NotEnoughDocks {
            docks: board.starting_positions.len(),
            players: joined,
        });
    }

    for (player, dock) in game.players.iter_mut().zip(&board.starting_positions) {
        player.dock = dock.number;
        player.position = Some(dock.position);
        player.direction = dock.direction;
    }

    info!(
        room = %game.room_code,
        board = %board.name,
        players = joined,
        seed = %hex::encode(game.rng_seed.to_be_bytes()),
        "race started"
    );
    game.board = Some(board);
    game.option_deck = build_option_deck(&mut game.rng);
    game.started_with = joined;
    begin_round(game);
    Ok(Applied::Changed)
}

/// Mark a player connected or disconnected.
///
/// Disconnected players never block a wait; their decisions take defaults.
pub fn set_connected(game: &mut Game, player_id: &PlayerId, connected: bool) -> Result<Applied, CommandError> {
    let player = game.player_mut(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    if player.is_disconnected != connected {
        return Ok(Applied::Ignored);
    }
    player.is_disconnected = !connected;
    info!(room = %game.room_code, player = %player_id, connected, "connection changed");
    game.push_event(GameEventData::ConnectionChanged { player_id: *player_id, connected });
    Ok(Applied::Changed)
}

// =============================================================================
// PROGRAMMING
// =============================================================================

fn programming_index(game: &Game, player_id: &PlayerId, command: &'static str) -> Result<usize, CommandError> {
    if game.phase != Phase::Programming {
        return Err(CommandError::WrongPhase { command, phase: game.phase });
    }
    let index = game.player_index(player_id).ok_or(CommandError::UnknownPlayer(*player_id))?;
    if !game.players[index].can_program() {
        return Err(CommandError::NotActing(*player_id));
    }
    Ok(index)
}

/// Map card ids onto register slots, checking they come from the hand once each.
fn resolve_slots(
    player: &Player,
    ids: impl Iterator<Item = Option<u32>>,
) -> Result<[Option<ProgramCard>; REGISTER_COUNT], CommandError> {
    let mut slots = [None; REGISTER_COUNT];
    let mut used: Vec<u32> = Vec::with_capacity(REGISTER_COUNT);

    for (slot, id) in slots.iter_mut().zip(ids) {
        let Some(id) = id else { continue };
        if used.contains(&id) {
            return Err(CommandError::DuplicateCard(id));
        }
        let card = player
            .dealt_cards
            .iter()
            .find(|c| c.id == id)
            .ok_or(CommandError::UnknownCard(id))?;
        used.push(id);
        *slot = Some(*card);
    }
    Ok(slots)
}

/// Replace the in-progress selection.
///
/// Updates arriving after submission are stale and ignored.
pub fn register_update(
    game: &mut Game,
    player_id: &PlayerId,
    selected: &[Option<u32>],
) -> Result<Applied, CommandError> {
    let index = programming_index(game, player_id, "register-update")?;
    let player = &game.players[index];
    if player.submitted {
        debug!(room = %game.room_code, player = %player_id, "stale register update ignored");
        return Ok(Applied::Ignored);
    }
    if selected.len() > REGISTER_COUNT {
        return Err(CommandError::TooManyCards { max: REGISTER_COUNT, got: selected.len() });
    }

    let slots = resolve_slots(player, selected.iter().copied())?;
    game.players[index].selected_cards = slots;
    Ok(Applied::Changed)
}

/// Lock in a complete program.
pub fn submit_cards(game: &mut Game, player_id: &PlayerId, cards: &[u32]) -> Result<Applied, CommandError> {
    let index = programming_index(game, player_id, "submit-cards")?;
    let player = &game.players[index];
    if player.submitted {
        return Err(CommandError::AlreadySubmitted);
    }
    if cards.len() != REGISTER_COUNT {
        return Err(CommandError::IncompleteProgram { expected: REGISTER_COUNT, got: cards.len() });
    }

    let slots = resolve_slots(player, cards.iter().map(|&id| Some(id)))?;
    let player = &mut game.players[index];
    player.selected_cards = slots;
    player.submitted = true;
    debug!(room = %game.room_code, player = %player_id, "program submitted");
    Ok(Applied::Changed)
}

/// Clear the in-progress selection.
///
/// A submitted program is locked; resets after submission are ignored.
pub fn reset_cards(game: &mut Game, player_id: &PlayerId) -> Result<Applied, CommandError> {
    let index = programming_index(game, player_id, "reset-cards")?;
    let player = &mut game.players[index];
    if player.submitted {
        debug!(room = %game.room_code, player = %player_id, "reset after submit ignored");
        return Ok(Applied::Ignored);
    }
    player.selected_cards = [None; REGISTER_COUNT];
    Ok(Applied::Changed)
}

/// Fill empty registers with random unselected hand cards.
fn auto_fill(game: &mut Game, index: usize) {
    let player = &game.players[index];
    let mut spare: Vec<ProgramCard> = player
        .dealt_cards
        .iter()
        .filter(|card| !player.selected_cards.contains(&Some(**card)))
        .copied()
        .collect();
    let mut slots = player.selected_cards;

    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        if spare.is_empty() {
            break;
        }
        let pick = game.rng.next_int(spare.len() as u32) as usize;
        *slot = Some(spare.remove(pick));
    }

    let player = &mut game.players[index];
    player.selected_cards = slots;
    player.submitted = true;
    let player_id = player.id;
    game.push_event(GameEventData::ProgramAutoFilled { player_id });
}

/// Close programming: auto-fill whoever has not submitted, default the
/// power-down answers and start executing.
fn finish_programming(game: &mut Game) {
    for index in 0..game.players.len() {
        if wait::is_pending(game, &game.players[index], WaitKind::Cards) {
            auto_fill(game, index);
        }
    }
    power::apply_power_down_defaults(game);

    game.current_register = 0;
    set_phase(game, Phase::Executing);
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Resolve one register up to and including its lasers.
fn resolve_register(game: &mut Game) {
    let register = game.current_register;
    debug!(room = %game.room_code, round = game.round_number, register = register + 1, "resolving register");

    options::reset_register_flags(game);
    game.damage_windows.clear();

    movement::execute_cards(game, register as usize);
    movement::run_conveyors(game, true);
    movement::run_conveyors(game, true);
    movement::run_conveyors(game, false);
    movement::run_gears(game);
    movement::run_pushers(game, register);

    let hits = movement::fire_lasers(game);
    movement::resolve_hits(game, hits);
}

/// Book checkpoints and destruction, then move to the next register.
fn finish_register(game: &mut Game) {
    game.damage_windows.clear();
    let finishers = movement::touch_checkpoints(game);
    damage::process_destructions(game);

    if check_game_end(game, &finishers) {
        return;
    }

    if (game.current_register as usize) + 1 < REGISTER_COUNT {
        game.current_register += 1;
    } else {
        enter_cleanup(game);
    }
}

/// Run registers until the round ends, the game ends or a window pauses.
fn run_registers(game: &mut Game) {
    while game.phase == Phase::Executing {
        if !game.damage_windows.is_empty() {
            if wait::is_open(game, WaitKind::DamagePrevention) {
                return;
            }
            // Windows left open by players who disconnected
            options::resolve_all_windows(game);
            finish_register(game);
            continue;
        }

        resolve_register(game);
        if game.damage_windows.is_empty() {
            finish_register(game);
        }
    }
}

/// End the race if someone finished or only one robot is left.
///
/// Simultaneous finishers are ranked by the priority of the card they ran
/// this register, then by join order.
fn check_game_end(game: &mut Game, finishers: &[usize]) -> bool {
    let active = game.active_player_count();
    let last_standing = active == 0 || (game.started_with >= 2 && active <= 1);
    if finishers.is_empty() && !last_standing {
        return false;
    }

    let register = game.current_register as usize;
    let priority = |index: usize| {
        game.players[index]
            .selected_cards
            .get(register)
            .copied()
            .flatten()
            .map_or(0, |c| c.priority)
    };

    let winner = if finishers.is_empty() {
        game.players.iter().find(|p| !p.eliminated).map(|p| p.id)
    } else {
        finishers
            .iter()
            .copied()
            .max_by(|&a, &b| priority(a).cmp(&priority(b)).then(b.cmp(&a)))
            .map(|index| game.players[index].id)
    };

    game.winner = winner;
    set_phase(game, Phase::Finished);
    match winner {
        Some(id) => info!(room = %game.room_code, winner = %id, round = game.round_number, "race finished"),
        None => info!(room = %game.room_code, round = game.round_number, "race finished without a winner"),
    }
    game.push_event(GameEventData::GameEnded { winner });
    true
}

// =============================================================================
// CLEANUP
// =============================================================================

/// Repair and option tiles pay out, destroyed robots are asked where to
/// re-enter.
fn enter_cleanup(game: &mut Game) {
    set_phase(game, Phase::Cleanup);

    for index in 0..game.players.len() {
        let player = &game.players[index];
        if player.eliminated {
            continue;
        }
        let Some(position) = player.position else { continue };
        let tile = game.board.as_ref().and_then(|b| b.tile_at(position));

        match tile {
            Some(TileKind::Repair) => damage::repair_player(game, index, 1),
            Some(TileKind::Option) => {
                damage::repair_player(game, index, 1);
                if options::draw_option_card(game, index).is_none() {
                    debug!(room = %game.room_code, "option deck empty");
                }
            }
            _ => {}
        }
    }

    damage::open_respawns(game);
}

fn finish_cleanup(game: &mut Game) {
    damage::apply_card_loss_defaults(game);
    damage::place_respawns(game);
    begin_round(game);
}

/// Start a new round: power transitions, fresh shuffled deck, new hands.
pub fn begin_round(game: &mut Game) {
    game.round_number += 1;
    game.current_register = 0;
    game.damage_windows.clear();

    for index in 0..game.players.len() {
        let player = &mut game.players[index];
        let change = power::start_round(player);
        player.clear_program();
        let player_id = player.id;
        if let Some((from, to)) = change {
            game.push_event(GameEventData::PowerChanged { player_id, from, to });
        }
    }
    options::reset_register_flags(game);

    let mut deck = Deck::new(&game.rules.excluded_cards);
    deck.shuffle(&mut game.rng);
    let hand_size = game.rules.hand_size;

    for index in 0..game.players.len() {
        if !game.players[index].can_program() {
            continue;
        }
        let hand = match deck.deal_hand(hand_size) {
            Ok(hand) => hand,
            Err(err) => {
                error!(room = %game.room_code, %err, "deck too small for a full hand");
                deck.deal_hand(deck.len()).unwrap_or_default()
            }
        };
        let count = hand.len();
        let player = &mut game.players[index];
        player.dealt_cards = hand;
        let player_id = player.id;
        game.push_event(GameEventData::CardsDealt { player_id, count });
    }

    info!(room = %game.room_code, round = game.round_number, "round started");
    game.push_event(GameEventData::RoundStarted { round: game.round_number });
    set_phase(game, Phase::Programming);
}

// =============================================================================
// ADVANCE
// =============================================================================

fn set_phase(game: &mut Game, to: Phase) {
    let from = game.phase;
    if from == to {
        return;
    }
    game.phase = to;
    debug!(room = %game.room_code, %from, %to, "phase changed");
    game.push_event(GameEventData::PhaseChanged { from, to });
}

/// Move the game forward until it needs input from a connected player.
///
/// A room nobody is connected to holds still. At most one new round begins
/// per call.
pub fn advance(game: &mut Game) {
    let mut rounds_begun = 0;

    loop {
        if !game.has_connected_players() {
            debug!(room = %game.room_code, "no connected players, holding");
            return;
        }

        match game.phase {
            Phase::Waiting | Phase::Finished => return,
            Phase::Programming => {
                if wait::is_open(game, WaitKind::Cards) || wait::is_open(game, WaitKind::PowerDown) {
                    return;
                }
                finish_programming(game);
            }
            Phase::Executing => {
                if wait::is_open(game, WaitKind::DamagePrevention) {
                    return;
                }
                run_registers(game);
            }
            Phase::Cleanup => {
                if wait::is_open(game, WaitKind::Respawn) || wait::is_open(game, WaitKind::OptionCardLoss) {
                    return;
                }
                if rounds_begun > 0 {
                    return;
                }
                finish_cleanup(game);
                rounds_begun += 1;
            }
        }
    }
}

/// Resolve a timed-out wait with its default.
///
/// Timers armed for an earlier opening of the wait are ignored.
pub fn expire(game: &mut Game, kind: WaitKind, serial: u64) -> Applied {
    if !wait::open_waits(game).contains(&(kind, serial)) {
        debug!(room = %game.room_code, %kind, serial, "stale timer ignored");
        return Applied::Ignored;
    }
    warn!(room = %game.room_code, %kind, round = game.round_number, "wait timed out, applying defaults");

    match kind {
        WaitKind::Cards => finish_programming(game),
        WaitKind::PowerDown => power::apply_power_down_defaults(game),
        WaitKind::DamagePrevention => options::resolve_all_windows(game),
        WaitKind::Respawn => damage::place_respawns(game),
        WaitKind::OptionCardLoss => damage::apply_card_loss_defaults(game),
    }
    Applied::Changed
}

// =============================================================================
// TESTS
// =============================================================================
