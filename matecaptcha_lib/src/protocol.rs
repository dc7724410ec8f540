//! Typed view of the line protocol spoken with the analysis engine.
//!
//! Only the subset needed to set up positions and run `go mate` / `go depth`
//! searches is modelled. There are no request ids in this protocol, a reply
//! belongs to whichever command is outstanding.

use crate::board::MoveSpec;
use crate::error::EngineError;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Principal variation reported by the engine. May be empty.
pub type SearchLine = SmallVec<[MoveSpec; 16]>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
   Uci,
   IsReady,
   NewGame,
   Position(String), // FEN
   GoMate(u32),      // Search for a forced mate in at most this many moves
   GoDepth(u32),     // Fixed depth best move search
   Stop,
   Quit,
}

impl fmt::Display for Command {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      match self {
         Command::Uci => f.write_str("uci"),
         Command::IsReady => f.write_str("isready"),
         Command::NewGame => f.write_str("ucinewgame"),
         Command::Position(fen) => write!(f, "position fen {}", fen),
         Command::GoMate(moves) => write!(f, "go mate {}", moves),
         Command::GoDepth(depth) => write!(f, "go depth {}", depth),
         Command::Stop => f.write_str("stop"),
         Command::Quit => f.write_str("quit"),
      }
   }
}

/// A progress notification (`info ...`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoLine {
   pub depth: Option<u32>,
   /// Moves to mate, negative when the side to move is getting mated
   pub mate: Option<i32>,
   pub centipawns: Option<i32>,
   pub pv: SearchLine,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
   UciOk,
   ReadyOk,
   Info(InfoLine),
   BestMove(Option<MoveSpec>),
   Other(String),
}

fn malformed(line: &str) -> EngineError {
   EngineError::Protocol(line.to_owned())
}

fn parse_info(line: &str) -> Result<InfoLine, EngineError> {
   let mut info = InfoLine::default();
   let mut tokens = line.split_whitespace().skip(1);
   while let Some(token) = tokens.next() {
      match token {
         "depth" => {
            info.depth = Some(tokens.next().and_then(|x| x.parse().ok()).ok_or_else(|| malformed(line))?);
         }
         "score" => {
            let kind = tokens.next();
            let value: i32 = tokens.next().and_then(|x| x.parse().ok()).ok_or_else(|| malformed(line))?;
            match kind {
               Some("mate") => info.mate = Some(value),
               Some("cp") => info.centipawns = Some(value),
               _ => return Err(malformed(line)),
            }
         }
         "pv" => {
            for a_move in tokens.by_ref() {
               info.pv.push(a_move.parse().map_err(|_| malformed(line))?);
            }
         }
         // free text until the end of the line
         "string" => break,
         "lowerbound" | "upperbound" => {}
         _ => {
            let _ = tokens.next();
         }
      }
   }
   Ok(info)
}

impl FromStr for Reply {
   type Err = EngineError;

   fn from_str(line: &str) -> Result<Reply, EngineError> {
      let line = line.trim();
      let mut tokens = line.split_whitespace();
      match tokens.next() {
         Some("uciok") => Ok(Reply::UciOk),
         Some("readyok") => Ok(Reply::ReadyOk),
         Some("info") => parse_info(line).map(Reply::Info),
         Some("bestmove") => match tokens.next() {
            None | Some("(none)") | Some("0000") => Ok(Reply::BestMove(None)),
            Some(a_move) => a_move.parse().map(|m| Reply::BestMove(Some(m))).map_err(|_| malformed(line)),
         },
         _ => Ok(Reply::Other(line.to_owned())),
      }
   }
}

impl fmt::Display for InfoLine {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str("info")?;
      if let Some(depth) = self.depth {
         write!(f, " depth {}", depth)?;
      }
      if let Some(mate) = self.mate {
         write!(f, " score mate {}", mate)?;
      } else if let Some(cp) = self.centipawns {
         write!(f, " score cp {}", cp)?;
      }
      if !self.pv.is_empty() {
         f.write_str(" pv")?;
         for a_move in self.pv.iter() {
            write!(f, " {}", a_move)?;
         }
      }
      Ok(())
   }
}

impl fmt::Display for Reply {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      match self {
         Reply::UciOk => f.write_str("uciok"),
         Reply::ReadyOk => f.write_str("readyok"),
         Reply::Info(info) => write!(f, "{}", info),
         Reply::BestMove(Some(m)) => write!(f, "bestmove {}", m),
         Reply::BestMove(None) => f.write_str("bestmove (none)"),
         Reply::Other(line) => f.write_str(line),
      }
   }
}
