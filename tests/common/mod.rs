#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use nodereplay::{EngineError, EngineLauncher, EngineSession};
use std::collections::HashMap;
use std::io::{self, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Write half of an in-memory pipe: each completed line is one message.
pub struct LineWriter {
    tx: Sender<String>,
    buf: Vec<u8>,
    transcript: Option<Arc<Mutex<Vec<String>>>>,
}

impl Write for LineWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim_end().to_string();
            if let Some(t) = &self.transcript { t.lock().unwrap().push(format!("> {}", line)); }
            self.tx.send(line).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "engine gone"))?;
        }
        Ok(data.len())
    }
    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

/// Read half of an in-memory pipe. Returns EOF once the sender is dropped.
pub struct LineReader {
    rx: Receiver<String>,
    pending: Vec<u8>,
}

impl Read for LineReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv() {
                Ok(line) => { self.pending = line.into_bytes(); self.pending.push(b'\n'); }
                Err(_) => return Ok(0),
            }
        }
        let n = out.len().min(self.pending.len());
        out[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

/// What the engine prints for one `go`.
#[derive(Clone, Debug)]
pub struct Reply {
    pub info: Vec<String>,
    pub bestmove: String,
    pub hang_up: bool,
}

pub fn reply(bestmove: &str, scores: &[&str]) -> Reply {
    let info = scores.iter().enumerate()
        .map(|(i, s)| format!("info depth {} seldepth {} score {} nodes {} pv {}", i + 1, i + 2, s, (i + 1) * 100, bestmove))
        .collect();
    Reply { info, bestmove: bestmove.to_string(), hang_up: false }
}

/// The engine prints one progress line and then exits mid-search.
pub fn hang_up() -> Reply {
    Reply { info: vec!["info depth 1 score cp 0".to_string()], bestmove: String::new(), hang_up: true }
}

/// Replies keyed by the move list of the searched position.
#[derive(Clone, Default)]
pub struct Script {
    replies: HashMap<String, Reply>,
    handshake_delay: Duration,
}

impl Script {
    pub fn new() -> Self { Self::default() }
    pub fn on(mut self, moves: &str, reply: Reply) -> Self {
        self.replies.insert(moves.to_string(), reply);
        self
    }

    /// Pause before answering `uci`, like an engine loading its network.
    pub fn slow_handshake(mut self, millis: u64) -> Self {
        self.handshake_delay = Duration::from_millis(millis);
        self
    }
}

/// Minimal UCI responder driven by a `Script`.
struct ScriptedEngine {
    script: Script,
    moves: String,
    out: Sender<String>,
    log: Arc<Mutex<Vec<String>>>,
    transcript: Arc<Mutex<Vec<String>>>,
}

impl ScriptedEngine {
    fn say(&self, line: impl Into<String>) -> bool { self.out.send(line.into()).is_ok() }

    fn cmd_position(&mut self, args: &str) {
        self.moves = match args.split_once(" moves") {
            Some((_, rest)) => rest.trim().to_string(),
            None => String::new(),
        };
    }

    fn cmd_go(&mut self) -> bool {
        let r = self.script.replies.get(&self.moves).cloned()
            .unwrap_or_else(|| reply("0000", &["cp 0"]));
        for line in r.info {
            if !self.say(line) { return false; }
        }
        if r.hang_up { return false; }
        self.say(format!("bestmove {}", r.bestmove))
    }

    fn run_loop(mut self, commands: Receiver<String>) {
        for line in commands {
            self.log.lock().unwrap().push(line.clone());
            let ok = if line == "uci" {
                thread::sleep(self.script.handshake_delay);
                self.transcript.lock().unwrap().push("< uciok".to_string());
                self.say("id name Scripted") && self.say("uciok")
            } else if line == "isready" {
                self.say("readyok")
            } else if line == "quit" {
                break;
            } else if let Some(rest) = line.strip_prefix("position ") {
                self.cmd_position(rest);
                true
            } else if line.starts_with("go") {
                self.cmd_go()
            } else {
                true
            };
            if !ok { break; }
        }
    }
}

/// Launches scripted engines on background threads and records every
/// command they receive, across all launches, in order.
/// `transcript` interleaves commands as written (`> `) with `uciok` as sent (`< `).
pub struct ScriptedLauncher {
    script: Script,
    pub log: Arc<Mutex<Vec<String>>>,
    pub transcript: Arc<Mutex<Vec<String>>>,
    pub launches: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            log: Arc::new(Mutex::new(Vec::new())),
            transcript: Arc::new(Mutex::new(Vec::new())),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn commands(&self) -> Vec<String> { self.log.lock().unwrap().clone() }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Engines run on their own threads; give them a moment to log `cmd`.
    pub fn wait_for(&self, cmd: &str, times: usize) -> bool {
        for _ in 0..200 {
            if self.count(cmd) >= times { return true; }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

impl EngineLauncher for ScriptedLauncher {
    fn launch(&self) -> Result<EngineSession, EngineError> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst);
        let (cmd_tx, cmd_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let engine = ScriptedEngine {
            script: self.script.clone(),
            moves: String::new(),
            out: out_tx,
            log: Arc::clone(&self.log),
            transcript: Arc::clone(&self.transcript),
        };
        thread::spawn(move || engine.run_loop(cmd_rx));
        let writer = LineWriter { tx: cmd_tx, buf: Vec::new(), transcript: Some(Arc::clone(&self.transcript)) };
        let reader = BufReader::new(LineReader { rx: out_rx, pending: Vec::new() });
        Ok(EngineSession::from_streams(format!("scripted-{}", n), writer, reader))
    }
}

/// Italian opening, Torch (White) against Stockfish, annotated for both sides.
pub const ITALIAN: &str = r#"[Event "SPRT"]
[White "Torch"]
[Black "Stockfish"]
[Result "*"]

1. e4 { +0.34 12/18 103 45213 } e5 { -0.30 14/20 98 50001 } 2. Nf3 { +0.41 13/19 110 52000 } Nc6 { -0.38 13/17 95 48000 } 3. Bc4 { +0.29 12/21 120 61234 } *
"#;

pub fn torch_script() -> Script {
    Script::new()
        .on("", reply("e2e4", &["cp 20", "cp 34"]))
        .on("e2e4 e7e5", reply("g1f3", &["cp 41"]))
        .on("e2e4 e7e5 g1f3 b8c6", reply("f1c4", &["cp 35", "cp 29"]))
}

/// A session wired to the test: returns the session, the commands it sends,
/// and the sender that plays the engine's output.
pub fn piped_session() -> (EngineSession, Receiver<String>, Sender<String>) {
    let (cmd_tx, cmd_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();
    let writer = LineWriter { tx: cmd_tx, buf: Vec::new(), transcript: None };
    let reader = BufReader::new(LineReader { rx: out_rx, pending: Vec::new() });
    (EngineSession::from_streams("piped", writer, reader), cmd_rx, out_tx)
}
