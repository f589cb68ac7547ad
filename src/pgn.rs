use std::fmt::Write as _;
use std::io::{self, Read};
use std::ops::ControlFlow;

use pgn_reader::{Nag, RawComment, RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, Position};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgnError {
    #[error("pgn read failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid FEN '{fen}': {reason}")]
    Fen { fen: String, reason: String },
    #[error("illegal move {san} at ply {ply}")]
    IllegalMove { san: String, ply: usize },
}

/// Per-move comment written by match runners: `<score> <depth>/<seldepth> <time_ms> <nodes>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub score: String,
    pub depth: Option<(u32, u32)>,
    pub time_ms: String,
    pub nodes: u64,
}

impl Annotation {
    /// Exactly four whitespace separated tokens with an integer node count, else `None`.
    pub fn parse(comment: &str) -> Option<Self> {
        let tokens: Vec<&str> = comment.split_whitespace().collect();
        let [score, depths, time_ms, nodes] = tokens.as_slice() else { return None };
        let nodes = nodes.parse::<u64>().ok()?;
        let depth = depths.split_once('/').and_then(|(d, sd)| Some((d.parse().ok()?, sd.parse().ok()?)));
        Some(Self { score: score.to_string(), depth, time_ms: time_ms.to_string(), nodes })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub mover: Color,
    pub fullmove: u32,
    pub san: String,
    pub uci: String,
    pub comment: Option<String>,
}

impl PlayedMove {
    pub fn annotation(&self) -> Option<Annotation> { self.comment.as_deref().and_then(Annotation::parse) }
}

/// One game along its principal line. Side variations are dropped while reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub headers: Vec<(String, String)>,
    pub comment: Option<String>,
    pub moves: Vec<PlayedMove>,
    /// Full movetext as read: side lines, NAGs and every comment included.
    pub movetext: String,
}

impl GameRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn white(&self) -> Option<&str> { self.header("White") }
    pub fn black(&self) -> Option<&str> { self.header("Black") }
    pub fn fen(&self) -> Option<&str> { self.header("FEN") }

    /// `position startpos moves` or `position fen <fen> moves`, ready for appending.
    pub fn position_prefix(&self) -> String {
        match self.fen() {
            Some(fen) => format!("position fen {} moves", fen),
            None => "position startpos moves".to_string(),
        }
    }

    /// Renders the whole game back to PGN text, side lines included.
    pub fn to_pgn(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.headers {
            let _ = writeln!(out, "[{} \"{}\"]", k, v.replace('\\', "\\\\").replace('"', "\\\""));
        }
        out.push('\n');
        if !self.movetext.is_empty() {
            out.push_str(&self.movetext);
            out.push(' ');
        }
        out.push_str(self.header("Result").unwrap_or("*"));
        out
    }
}

/// Writes movetext back out in export form while the game is read.
struct TextWriter {
    out: String,
    start_turn: Color,
    start_fullmove: u32,
    // Next ply of every open line, innermost last
    lines: Vec<usize>,
    need_number: bool,
}

impl TextWriter {
    fn new(pos: &Chess) -> Self {
        Self {
            out: String::new(),
            start_turn: pos.turn(),
            start_fullmove: pos.fullmoves().get(),
            lines: vec![0],
            need_number: true,
        }
    }

    fn in_variation(&self) -> bool { self.lines.len() > 1 }

    fn token(&mut self, t: &str) {
        if !self.out.is_empty() && !self.out.ends_with('(') { self.out.push(' '); }
        self.out.push_str(t);
    }

    fn san(&mut self, san: &str) {
        let ply = self.lines.last().copied().unwrap_or(0);
        let half = ply + usize::from(self.start_turn == Color::Black);
        let fullmove = self.start_fullmove as usize + half / 2;
        if half % 2 == 0 {
            self.token(&format!("{}.", fullmove));
        } else if self.need_number {
            self.token(&format!("{}...", fullmove));
        }
        self.token(san);
        self.need_number = false;
        if let Some(next) = self.lines.last_mut() { *next += 1; }
    }

    fn nag(&mut self, nag: u8) { self.token(&format!("${}", nag)); }

    fn comment(&mut self, text: &str) {
        self.token(&format!("{{ {} }}", text));
        self.need_number = true;
    }

    /// A side line replaces the last move of the line it branches from.
    fn begin_variation(&mut self) {
        let ply = self.lines.last().copied().unwrap_or(0).saturating_sub(1);
        self.lines.push(ply);
        self.token("(");
        self.need_number = true;
    }

    fn end_variation(&mut self) {
        if self.in_variation() { self.lines.pop(); }
        self.out.push(')');
        self.need_number = true;
    }
}

pub struct Movetext {
    headers: Vec<(String, String)>,
    pos: Chess,
    mode: CastlingMode,
    comment: Option<String>,
    moves: Vec<PlayedMove>,
    text: TextWriter,
}

/// pgn-reader visitor that plays the mainline, converting SAN to UCI on the fly.
/// Side lines are kept as text only.
#[derive(Default)]
pub struct RecordVisitor;

fn push_comment(slot: &mut Option<String>, text: &str) {
    if text.is_empty() { return; }
    match slot {
        Some(existing) => { existing.push(' '); existing.push_str(text); }
        None => *slot = Some(text.to_string()),
    }
}

impl Visitor for RecordVisitor {
    type Tags = Vec<(String, String)>;
    type Movetext = Movetext;
    type Output = Result<GameRecord, PgnError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(Vec::new())
    }

    fn tag(&mut self, tags: &mut Self::Tags, name: &[u8], value: RawTag<'_>) -> ControlFlow<Self::Output> {
        let name = String::from_utf8_lossy(name).into_owned();
        let value = String::from_utf8_lossy(&value.decode()).into_owned();
        tags.push((name, value));
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let chess960 = tags.iter().any(|(k, v)| k == "Variant" && v.to_ascii_lowercase().contains("960"));
        let mode = if chess960 { CastlingMode::Chess960 } else { CastlingMode::Standard };
        let pos = match tags.iter().find(|(k, _)| k == "FEN") {
            Some((_, fen)) => match setup_position(fen, mode) {
                Ok(p) => p,
                Err(e) => return ControlFlow::Break(Err(e)),
            },
            None => Chess::default(),
        };
        let text = TextWriter::new(&pos);
        ControlFlow::Continue(Movetext { headers: tags, pos, mode, comment: None, moves: Vec::new(), text })
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        let san = san_plus.to_string();
        if movetext.text.in_variation() {
            movetext.text.san(&san);
            return ControlFlow::Continue(());
        }
        let m = match san_plus.san.to_move(&movetext.pos) {
            Ok(m) => m,
            Err(_) => {
                let ply = movetext.moves.len() + 1;
                return ControlFlow::Break(Err(PgnError::IllegalMove { san, ply }));
            }
        };
        let mover = movetext.pos.turn();
        let fullmove = movetext.pos.fullmoves().get();
        let uci = m.clone().to_uci(movetext.mode).to_string();
        movetext.pos.play_unchecked(m);
        movetext.text.san(&san);
        movetext.moves.push(PlayedMove { mover, fullmove, san, uci, comment: None });
        ControlFlow::Continue(())
    }

    fn comment(&mut self, movetext: &mut Self::Movetext, comment: RawComment<'_>) -> ControlFlow<Self::Output> {
        let text = String::from_utf8_lossy(comment.as_bytes());
        let text = text.trim();
        if text.is_empty() { return ControlFlow::Continue(()); }
        movetext.text.comment(text);
        if movetext.text.in_variation() { return ControlFlow::Continue(()); }
        match movetext.moves.last_mut() {
            Some(mv) => push_comment(&mut mv.comment, text),
            None => push_comment(&mut movetext.comment, text),
        }
        ControlFlow::Continue(())
    }

    fn nag(&mut self, movetext: &mut Self::Movetext, nag: Nag) -> ControlFlow<Self::Output> {
        movetext.text.nag(nag.0);
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, movetext: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        movetext.text.begin_variation();
        ControlFlow::Continue(Skip(false))
    }

    fn end_variation(&mut self, movetext: &mut Self::Movetext) -> ControlFlow<Self::Output> {
        movetext.text.end_variation();
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        Ok(GameRecord {
            headers: movetext.headers,
            comment: movetext.comment,
            moves: movetext.moves,
            movetext: movetext.text.out,
        })
    }
}

fn setup_position(fen: &str, mode: CastlingMode) -> Result<Chess, PgnError> {
    let bad = |reason: String| PgnError::Fen { fen: fen.to_string(), reason };
    let parsed: Fen = fen.parse().map_err(|e: shakmaty::fen::ParseFenError| bad(e.to_string()))?;
    parsed.into_position(mode).map_err(|e| bad(e.to_string()))
}

/// Lazily yields games from a PGN stream, one per `next()`.
pub struct GameReader<R: Read> {
    reader: Reader<R>,
    visitor: RecordVisitor,
    failed: bool,
}

impl<R: Read> GameReader<R> {
    pub fn new(input: R) -> Self { Self { reader: Reader::new(input), visitor: RecordVisitor, failed: false } }
}

impl<R: Read> Iterator for GameReader<R> {
    type Item = Result<GameRecord, PgnError>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed { return None; }
        match self.reader.read_game(&mut self.visitor) {
            Ok(Some(game)) => Some(game),
            Ok(None) => None,
            Err(e) => {
                // The stream is unusable after an i/o error
                self.failed = true;
                Some(Err(PgnError::Io(e)))
            }
        }
    }
}

/// Parses the first game of a PGN string.
pub fn read_game(text: &str) -> Option<Result<GameRecord, PgnError>> {
    GameReader::new(text.as_bytes()).next()
}
