use std::sync::Arc;

use log::{info, warn};
use shakmaty::Color;
use thiserror::Error;

use crate::engine::{EngineError, EngineLauncher, EngineSession};
use crate::options::UciOption;
use crate::pgn::GameRecord;
use crate::pool::Processor;
use crate::score::{self, ScoreError};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error("engine reported no score before bestmove {mv} at ply {ply}")]
    MissingScore { ply: usize, mv: String },
    #[error("player '{player}' is neither White ({white}) nor Black ({black})")]
    PlayerNotFound { player: String, white: String, black: String },
    #[error("player '{0}' is named as both White and Black")]
    AmbiguousPlayer(String),
}

/// How long an engine process lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// New process for every game, told to quit once the verdict is known.
    #[default]
    PerGame,
    /// One process per worker, reset with `ucinewgame` between games.
    /// The process is started by the worker's first game, so a launch
    /// failure is reported against that game. A failed game or an engine
    /// error discards the process and the next game starts a fresh one.
    PerWorker,
}

/// Immutable settings shared by every worker.
pub struct ReplayContext {
    pub launcher: Arc<dyn EngineLauncher>,
    pub player: String,
    pub options: Vec<UciOption>,
    pub policy: SessionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub ply: usize,
    pub recorded_move: String,
    pub engine_move: String,
    pub recorded_score: String,
    pub engine_score: Option<String>,
    pub game: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// Stopped at `ply` because the move carried no usable annotation.
    Aborted { ply: usize },
    Failed(Box<Mismatch>),
}

impl Verdict {
    /// The line printed for this game, if any. Only failures are reported.
    pub fn report(&self) -> Option<String> {
        match self {
            Verdict::Failed(m) => Some(format!("Failed: {}", m.game)),
            Verdict::Passed | Verdict::Aborted { .. } => None,
        }
    }
}

struct ReplayState {
    position: String,
    ply: usize,
}

impl ReplayState {
    fn advance(&mut self, uci: &str) {
        self.position.push(' ');
        self.position.push_str(uci);
        self.ply += 1;
    }
}

/// Walks a game's principal line and checks that the engine, given the
/// recorded node budget, plays the recorded move with the recorded score.
pub struct ReplayVerifier {
    ctx: Arc<ReplayContext>,
    session: Option<EngineSession>,
}

impl ReplayVerifier {
    pub fn new(ctx: Arc<ReplayContext>) -> Self { Self { ctx, session: None } }

    pub fn verify(&mut self, game: &GameRecord) -> Result<Verdict, ReplayError> {
        let side = self.target_side(game)?;
        let mut state = ReplayState { position: game.position_prefix(), ply: 0 };
        let verdict = match self.walk(game, side, &mut state) {
            Ok(v) => v,
            Err(e) => {
                // Protocol state is unknown after an error, never reuse the process
                self.session = None;
                return Err(e);
            }
        };
        match (&verdict, self.ctx.policy) {
            (Verdict::Failed(_), _) | (_, SessionPolicy::PerGame) => self.close(),
            _ => {}
        }
        Ok(verdict)
    }

    fn target_side(&self, game: &GameRecord) -> Result<Color, ReplayError> {
        let player = self.ctx.player.as_str();
        let white = game.white().unwrap_or("?");
        let black = game.black().unwrap_or("?");
        match (white == player, black == player) {
            (true, false) => Ok(Color::White),
            (false, true) => Ok(Color::Black),
            (true, true) => Err(ReplayError::AmbiguousPlayer(player.to_string())),
            (false, false) => Err(ReplayError::PlayerNotFound {
                player: player.to_string(), white: white.to_string(), black: black.to_string(),
            }),
        }
    }

    fn walk(&mut self, game: &GameRecord, side: Color, state: &mut ReplayState) -> Result<Verdict, ReplayError> {
        self.begin_game()?;
        for mv in &game.moves {
            if mv.mover != side {
                state.advance(&mv.uci);
                continue;
            }
            let Some(note) = mv.annotation() else {
                warn!("{}: no annotation at ply {} ({}), stopping early", self.ctx.player, state.ply + 1, mv.san);
                return Ok(Verdict::Aborted { ply: state.ply });
            };
            let session = self.session.as_mut().ok_or(EngineError::Closed)?;
            session.wait_ready()?;
            let report = session.search_nodes(&state.position, note.nodes)?;

            let mismatch = |engine_score: Option<String>| Mismatch {
                ply: state.ply, recorded_move: mv.uci.clone(), engine_move: report.best_move.clone(),
                recorded_score: note.score.clone(), engine_score, game: game.to_pgn(),
            };
            if report.best_move != mv.uci {
                info!("ply {}: recorded {} but engine played {}", state.ply, mv.uci, report.best_move);
                return Ok(Verdict::Failed(Box::new(mismatch(None))));
            }
            let (kind, value) = report.score.as_ref()
                .ok_or_else(|| ReplayError::MissingScore { ply: state.ply, mv: report.best_move.clone() })?;
            let engine_score = score::convert(kind, value)?;
            if engine_score != note.score {
                info!("ply {}: recorded score {} but engine reported {}", state.ply, note.score, engine_score);
                return Ok(Verdict::Failed(Box::new(mismatch(Some(engine_score)))));
            }
            state.advance(&mv.uci);
        }
        Ok(Verdict::Passed)
    }

    /// Brings the session (new or reused) to a clean, ready state.
    fn begin_game(&mut self) -> Result<(), ReplayError> {
        let session = match self.session.take() {
            Some(s) => s,
            None => {
                let mut s = self.ctx.launcher.launch()?;
                s.handshake()?;
                s
            }
        };
        let session = self.session.insert(session);
        for opt in &self.ctx.options {
            session.set_option(&opt.name, &opt.value)?;
        }
        session.send("ucinewgame")?;
        session.wait_ready()?;
        Ok(())
    }

    /// `quit` failures are logged by the session; the verdict stands either way.
    fn close(&mut self) {
        if let Some(session) = self.session.take() { let _ = session.quit(); }
    }
}

impl Processor for ReplayVerifier {
    type Item = GameRecord;
    type Output = Verdict;
    type Error = ReplayError;

    fn process(&mut self, game: GameRecord) -> Result<Verdict, ReplayError> { self.verify(&game) }

    fn shutdown(mut self) { self.close(); }
}
