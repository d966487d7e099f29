use log::debug;
use shared::{next_player_id, Direction, PlayerState};

/// Client-side view of the arena: the local player plus a mirror of the last
/// roster the server sent
#[derive(Debug, Default)]
pub struct ClientGameState {
    local: Option<PlayerState>,
    roster: Vec<PlayerState>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts a local player into the game
    ///
    /// A player that is already in game is kept. Otherwise a new player with
    /// a fresh id is spawned at a random position.
    pub fn join(&mut self) -> PlayerState {
        if let Some(player) = self.local.as_ref().filter(|p| p.in_game) {
            return player.clone();
        }

        let player = PlayerState::spawn(next_player_id());
        debug!("Spawned local player #{} at ({}, {})", player.id, player.x, player.y);
        self.local = Some(player.clone());
        player
    }

    /// Marks the local player as out of the game and returns the state to
    /// announce, if there was an in-game player
    pub fn leave(&mut self) -> Option<PlayerState> {
        let player = self.local.as_mut().filter(|p| p.in_game)?;
        player.in_game = false;
        Some(player.clone())
    }

    /// Applies a move intent to the local player
    ///
    /// Returns the new state when the player actually moved.
    pub fn apply_move(&mut self, direction: Direction) -> Option<PlayerState> {
        let player = self.local.as_mut().filter(|p| p.in_game)?;
        player.step(direction).then(|| player.clone())
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.local.as_ref()
    }

    /// State to re-send after (re)connecting so the server admits the player
    pub fn announcement(&self) -> Option<PlayerState> {
        self.local.as_ref().filter(|p| p.in_game).cloned()
    }

    /// Replaces the mirror roster wholesale
    pub fn replace_roster(&mut self, players: Vec<PlayerState>) {
        self.roster = players;
    }

    pub fn clear_roster(&mut self) {
        self.roster.clear();
    }

    pub fn roster(&self) -> &[PlayerState] {
        &self.roster
    }

    /// In-game players from the mirror, excluding the local player
    pub fn remote_players(&self) -> Vec<PlayerState> {
        let local_id = self.local.as_ref().map(|p| p.id);
        self.roster
            .iter()
            .filter(|p| p.in_game && Some(p.id) != local_id)
            .cloned()
            .collect()
    }
}
