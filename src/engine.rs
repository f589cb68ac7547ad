use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use log::{debug, warn};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn engine '{path}': {source}")]
    Spawn { path: PathBuf, source: io::Error },
    #[error("engine i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("engine closed its output stream")]
    Closed,
    #[error("malformed bestmove line '{0}'")]
    MissingBestMove(String),
}

/// Raw result of one `go`: the proposed move and the last score seen before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchReport {
    pub best_move: String,
    pub score: Option<(String, String)>,
}

/// Synchronous line-based control of one UCI engine.
///
/// Commands are written and flushed one at a time; reads block until the
/// engine produces a full line. There are no timeouts: a silent engine
/// blocks the caller forever.
pub struct EngineSession {
    label: String,
    child: Option<Child>,
    writer: Box<dyn Write + Send>,
    reader: Box<dyn BufRead + Send>,
    buf: String,
}

impl EngineSession {
    pub fn start(path: &Path) -> Result<Self, EngineError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| EngineError::Spawn { path: path.to_path_buf(), source })?;
        let stdin = child.stdin.take().ok_or(EngineError::Closed)?;
        let stdout = child.stdout.take().ok_or(EngineError::Closed)?;
        let label = format!("{}[{}]", path.display(), child.id());
        debug!("{} spawned", label);
        let mut session = Self::from_streams(label, stdin, BufReader::new(stdout));
        session.child = Some(child);
        Ok(session)
    }

    /// Wraps already-connected streams, e.g. an in-process engine.
    pub fn from_streams<W, R>(label: impl Into<String>, writer: W, reader: R) -> Self
    where
        W: Write + Send + 'static,
        R: BufRead + Send + 'static,
    {
        Self { label: label.into(), child: None, writer: Box::new(writer), reader: Box::new(reader), buf: String::new() }
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!("{} > {}", self.label, cmd);
        writeln!(self.writer, "{}", cmd)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn read_line(&mut self) -> Result<String, EngineError> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 { return Err(EngineError::Closed); }
        let line = self.buf.trim_end().to_string();
        debug!("{} < {}", self.label, line);
        Ok(line)
    }

    /// Reads and discards lines until one equals `token`.
    pub fn wait_for(&mut self, token: &str) -> Result<(), EngineError> {
        while self.read_line()? != token {}
        Ok(())
    }

    /// `uci` handshake. Options are only accepted after `uciok`.
    pub fn handshake(&mut self) -> Result<(), EngineError> {
        self.send("uci")?;
        self.wait_for("uciok")
    }

    /// Barrier: nothing sent earlier is still being processed once this returns.
    pub fn wait_ready(&mut self) -> Result<(), EngineError> {
        self.send("isready")?;
        self.wait_for("readyok")
    }

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        self.send(&format!("setoption name {} value {}", name, value))
    }

    /// Sends `position` then `go nodes`, and reads until `bestmove`.
    /// Every `score` report is tracked; the last one before `bestmove` wins.
    pub fn search_nodes(&mut self, position: &str, nodes: u64) -> Result<SearchReport, EngineError> {
        self.send(position)?;
        self.send(&format!("go nodes {}", nodes))?;
        let mut score = None;
        loop {
            let line = self.read_line()?;
            if line.contains("bestmove") {
                let best_move = line.split_whitespace().nth(1)
                    .ok_or_else(|| EngineError::MissingBestMove(line.clone()))?
                    .to_string();
                return Ok(SearchReport { best_move, score });
            }
            if let Some(s) = parse_score(&line) { score = Some(s); }
        }
    }

    /// Asks the engine to exit without waiting for it. Consumes the session so
    /// a second `quit` cannot be sent.
    pub fn quit(mut self) -> Result<(), EngineError> {
        let sent = self.send("quit");
        let EngineSession { label, child, writer, .. } = self;
        drop(writer);
        if let Some(mut child) = child {
            match child.try_wait() {
                Ok(Some(_)) => {}
                // Reap in the background so finished engines don't linger as zombies
                _ => { thread::spawn(move || { let _ = child.wait(); }); }
            }
        }
        if let Err(e) = &sent { warn!("{} quit not delivered: {}", label, e); }
        sent
    }
}

/// Extracts `(kind, value)` from a line carrying ` score <kind> <value>`.
pub fn parse_score(line: &str) -> Option<(String, String)> {
    let mut tokens = line.split_whitespace().skip_while(|t| *t != "score");
    tokens.next()?;
    let kind = tokens.next()?;
    let value = tokens.next()?;
    Some((kind.to_string(), value.to_string()))
}

/// Something that can bring up a fresh engine session.
pub trait EngineLauncher: Send + Sync {
    fn launch(&self) -> Result<EngineSession, EngineError>;
}

/// Launches an engine binary from a filesystem path.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    pub path: PathBuf,
}

impl EngineCommand {
    pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl EngineLauncher for EngineCommand {
    fn launch(&self) -> Result<EngineSession, EngineError> { EngineSession::start(&self.path) }
}
