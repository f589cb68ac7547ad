use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("unrecognized score kind '{0}'")]
    UnknownKind(String),
    #[error("score value '{0}' is not an integer")]
    InvalidValue(String),
    #[error("mate score of zero cannot be annotated")]
    ZeroMate,
}

/// The two score flavours a UCI `info` line can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Cp,
    Mate,
}

impl FromStr for ScoreKind {
    type Err = ScoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cp" => Ok(ScoreKind::Cp),
            "mate" => Ok(ScoreKind::Mate),
            other => Err(ScoreError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { ScoreKind::Cp => f.write_str("cp"), ScoreKind::Mate => f.write_str("mate") }
    }
}

/// Engine score as reported by `score <kind> <value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineScore {
    pub kind: ScoreKind,
    pub value: i32,
}

impl EngineScore {
    /// Parses the two tokens following `score` on an info line.
    pub fn parse(kind: &str, value: &str) -> Result<Self, ScoreError> {
        let kind = kind.parse::<ScoreKind>()?;
        let value = value.parse::<i32>().map_err(|_| ScoreError::InvalidValue(value.to_string()))?;
        Ok(Self { kind, value })
    }

    pub fn to_annotation(self) -> Result<String, ScoreError> { annotate(self.kind, self.value) }
}

/// Renders an engine score the way match runners write it into PGN comments:
/// pawns with an explicit sign and two decimals, or `+M<plies>` / `-M<plies>`.
pub fn annotate(kind: ScoreKind, value: i32) -> Result<String, ScoreError> {
    let v = value as i64;
    match kind {
        ScoreKind::Cp if v == 0 => Ok("0.00".to_string()),
        ScoreKind::Cp => {
            // Integer formatting keeps the two decimals exact
            let sign = if v < 0 { '-' } else { '+' };
            let a = v.unsigned_abs();
            Ok(format!("{}{}.{:02}", sign, a / 100, a % 100))
        }
        ScoreKind::Mate if v < 0 => Ok(format!("-M{}", (2 * v).unsigned_abs())),
        ScoreKind::Mate if v > 0 => Ok(format!("+M{}", (2 * v - 1).unsigned_abs())),
        ScoreKind::Mate => Err(ScoreError::ZeroMate),
    }
}

/// String-typed entry point matching the raw protocol tokens.
pub fn convert(kind: &str, value: &str) -> Result<String, ScoreError> {
    EngineScore::parse(kind, value)?.to_annotation()
}
