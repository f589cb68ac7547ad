use shakmaty::Color;

use crate::options::UciOption;
use crate::pgn::GameRecord;

/// Which recorded search limit the script reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Nodes,
    Depth,
}

/// Builds a UCI command script that puts an engine back into the state it
/// was in while playing `side` in `game`.
///
/// Each search is followed by `wait`, an engine extension that blocks until
/// the running search finishes, so the script can be piped straight into
/// the engine's stdin. The script ends at the first move of `side` whose
/// annotation is missing or lacks the requested limit; the position for
/// that move is still emitted so the engine is left at the point of interest.
pub fn reproduce(game: &GameRecord, side: Color, limit: SearchLimit, options: &[UciOption]) -> Vec<String> {
    let mut out = vec!["uci".to_string()];
    for opt in options {
        out.push(format!("setoption name {} value {}", opt.name, opt.value));
    }
    out.push("ucinewgame".to_string());
    out.push("isready".to_string());

    let mut pos = game.position_prefix();
    for mv in &game.moves {
        if mv.mover == side {
            out.push(pos.clone());
            let go = mv.annotation().and_then(|note| match limit {
                SearchLimit::Nodes => Some(format!("go nodes {}", note.nodes)),
                SearchLimit::Depth => note.depth.map(|(depth, _)| format!("go depth {}", depth)),
            });
            let Some(go) = go else { break };
            out.push(go);
            out.push("wait".to_string());
        }
        pos.push(' ');
        pos.push_str(&mv.uci);
    }
    out
}
