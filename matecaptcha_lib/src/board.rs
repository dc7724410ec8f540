use crate::error::{ParseMoveError, PuzzleError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position, Role, Square};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
   White,
   Black,
}

impl Side {
   pub fn fen_char(self) -> char {
      match self {
         Side::White => 'w',
         Side::Black => 'b',
      }
   }
}

impl std::ops::Not for Side {
   type Output = Side;
   fn not(self) -> Side {
      match self {
         Side::Black => Side::White,
         Side::White => Side::Black,
      }
   }
}

impl From<shakmaty::Color> for Side {
   fn from(color: shakmaty::Color) -> Side {
      match color {
         shakmaty::Color::White => Side::White,
         shakmaty::Color::Black => Side::Black,
      }
   }
}

impl From<Side> for shakmaty::Color {
   fn from(side: Side) -> shakmaty::Color {
      match side {
         Side::White => shakmaty::Color::White,
         Side::Black => shakmaty::Color::Black,
      }
   }
}

impl FromStr for Side {
   type Err = String;

   fn from_str(s: &str) -> Result<Side, String> {
      match s {
         "w" | "white" => Ok(Side::White),
         "b" | "black" => Ok(Side::Black),
         _ => Err(format!("Expected one of w, b, white or black for a side, got {}", s)),
      }
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
   Pawn,
   Knight,
   Bishop,
   Rook,
   Queen,
   King,
}

impl PieceKind {
   /// Lowercase FEN letter
   pub fn letter(self) -> char {
      match self {
         PieceKind::Pawn => 'p',
         PieceKind::Knight => 'n',
         PieceKind::Bishop => 'b',
         PieceKind::Rook => 'r',
         PieceKind::Queen => 'q',
         PieceKind::King => 'k',
      }
   }

   pub fn from_letter(letter: char) -> Option<PieceKind> {
      match letter.to_ascii_lowercase() {
         'p' => Some(PieceKind::Pawn),
         'n' => Some(PieceKind::Knight),
         'b' => Some(PieceKind::Bishop),
         'r' => Some(PieceKind::Rook),
         'q' => Some(PieceKind::Queen),
         'k' => Some(PieceKind::King),
         _ => None,
      }
   }

   /// Material value in pawns. Kings count for nothing.
   pub fn value(self) -> u32 {
      match self {
         PieceKind::Pawn => 1,
         PieceKind::Knight => 3,
         PieceKind::Bishop => 3,
         PieceKind::Rook => 5,
         PieceKind::Queen => 9,
         PieceKind::King => 0,
      }
   }
}

impl From<PieceKind> for Role {
   fn from(kind: PieceKind) -> Role {
      match kind {
         PieceKind::Pawn => Role::Pawn,
         PieceKind::Knight => Role::Knight,
         PieceKind::Bishop => Role::Bishop,
         PieceKind::Rook => Role::Rook,
         PieceKind::Queen => Role::Queen,
         PieceKind::King => Role::King,
      }
   }
}

impl From<Role> for PieceKind {
   fn from(role: Role) -> PieceKind {
      match role {
         Role::Pawn => PieceKind::Pawn,
         Role::Knight => PieceKind::Knight,
         Role::Bishop => PieceKind::Bishop,
         Role::Rook => PieceKind::Rook,
         Role::Queen => PieceKind::Queen,
         Role::King => PieceKind::King,
      }
   }
}

/// Side owning more non-king material among `pieces`. `None` on a tie.
pub fn majority_side<'a, I>(pieces: I) -> Option<Side>
where
   I: IntoIterator<Item = &'a PiecePlacement>,
{
   let (mut white, mut black) = (0u32, 0u32);
   for piece in pieces {
      match piece.side {
         Side::White => white += piece.kind.value(),
         Side::Black => black += piece.kind.value(),
      }
   }
   match white.cmp(&black) {
      Ordering::Greater => Some(Side::White),
      Ordering::Less => Some(Side::Black),
      Ordering::Equal => None,
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PiecePlacement {
   pub kind: PieceKind,
   pub side: Side,
}

impl PiecePlacement {
   pub const fn new(kind: PieceKind, side: Side) -> PiecePlacement {
      PiecePlacement { kind, side }
   }

   /// FEN letter, uppercase for white
   pub fn fen_char(self) -> char {
      match self.side {
         Side::White => self.kind.letter().to_ascii_uppercase(),
         Side::Black => self.kind.letter(),
      }
   }

   pub fn from_fen_char(c: char) -> Option<PiecePlacement> {
      let kind = PieceKind::from_letter(c)?;
      let side = if c.is_ascii_uppercase() { Side::White } else { Side::Black };
      Some(PiecePlacement { kind, side })
   }

   /// Parses a run of FEN letters such as `QQnb` into a material list.
   pub fn parse_list(s: &str) -> Result<Vec<PiecePlacement>, String> {
      s.chars()
         .filter(|c| !c.is_whitespace() && *c != ',')
         .map(|c| PiecePlacement::from_fen_char(c).ok_or_else(|| format!("{} is not a FEN piece letter", c)))
         .collect()
   }
}

/// A move in coordinate form, as UCI engines print them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MoveSpec {
   pub from: Square,
   pub to: Square,
   pub promotion: Option<PieceKind>,
}

impl MoveSpec {
   pub fn new(from: Square, to: Square) -> MoveSpec {
      MoveSpec {
         from,
         to,
         promotion: None,
      }
   }

   fn to_uci(self) -> UciMove {
      UciMove::Normal {
         from: self.from,
         to: self.to,
         promotion: self.promotion.map(Role::from),
      }
   }

   pub(crate) fn from_move(m: &Move) -> Option<MoveSpec> {
      match UciMove::from_move(m, CastlingMode::Standard) {
         UciMove::Normal { from, to, promotion } => Some(MoveSpec {
            from,
            to,
            promotion: promotion.map(PieceKind::from),
         }),
         _ => None,
      }
   }
}

impl fmt::Display for MoveSpec {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}{}", self.from, self.to)?;
      if let Some(promotion) = self.promotion {
         write!(f, "{}", promotion.letter())?;
      }
      Ok(())
   }
}

impl FromStr for MoveSpec {
   type Err = ParseMoveError;

   fn from_str(s: &str) -> Result<MoveSpec, ParseMoveError> {
      if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
         return Err(ParseMoveError::Length(s.to_owned()));
      }
      let from: Square = s[..2].parse().map_err(|_| ParseMoveError::Square(s[..2].to_owned()))?;
      let to: Square = s[2..4].parse().map_err(|_| ParseMoveError::Square(s[2..4].to_owned()))?;
      let promotion = match s[4..].chars().next() {
         None => None,
         Some(c) => match PieceKind::from_letter(c) {
            Some(kind @ (PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen))
               if c.is_ascii_lowercase() =>
            {
               Some(kind)
            }
            _ => return Err(ParseMoveError::Promotion(c)),
         },
      };
      Ok(MoveSpec { from, to, promotion })
   }
}

impl TryFrom<String> for MoveSpec {
   type Error = ParseMoveError;

   fn try_from(s: String) -> Result<MoveSpec, ParseMoveError> {
      s.parse()
   }
}

impl From<MoveSpec> for String {
   fn from(m: MoveSpec) -> String {
      m.to_string()
   }
}

/// A rule-legal chess position together with its FEN.
///
/// Construction always goes through full validation, so holding a
/// `BoardPosition` means the position has both kings, the side not to move
/// is not in check and the notation is well formed.
#[derive(Clone, Debug)]
pub struct BoardPosition {
   fen: String,
   chess: Chess,
}

impl BoardPosition {
   pub fn from_fen(fen: &str) -> Result<BoardPosition, PuzzleError> {
      let fen = fen.trim();
      let sections = fen.split_whitespace().count();
      if sections != 6 {
         return Err(PuzzleError::InvalidPosition(format!(
            "malformed FEN; expected 6 whitespace delimited sections, found {}",
            sections
         )));
      }
      let parsed: Fen = fen
         .parse()
         .map_err(|e| PuzzleError::InvalidPosition(format!("{}: {}", fen, e)))?;
      let chess: Chess = parsed
         .into_position(CastlingMode::Standard)
         .map_err(|e| PuzzleError::InvalidPosition(format!("{}: {}", fen, e)))?;
      Ok(BoardPosition::from_chess(chess))
   }

   pub(crate) fn from_chess(chess: Chess) -> BoardPosition {
      let fen = Fen::from_position(chess.clone(), EnPassantMode::Legal).to_string();
      BoardPosition { fen, chess }
   }

   pub(crate) fn chess(&self) -> &Chess {
      &self.chess
   }

   pub fn fen(&self) -> &str {
      &self.fen
   }

   pub fn side_to_move(&self) -> Side {
      self.chess.turn().into()
   }

   pub fn is_check(&self) -> bool {
      self.chess.is_check()
   }

   pub fn is_checkmate(&self) -> bool {
      self.chess.is_checkmate()
   }

   pub fn is_stalemate(&self) -> bool {
      self.chess.is_stalemate()
   }

   pub fn legal_moves(&self) -> Vec<MoveSpec> {
      self.chess.legal_moves().iter().filter_map(MoveSpec::from_move).collect()
   }

   /// Applies `a_move` if it is legal here. `None` means illegal.
   #[must_use]
   pub fn play(&self, a_move: &MoveSpec) -> Option<BoardPosition> {
      let m = a_move.to_uci().to_move(&self.chess).ok()?;
      let mut next = self.chess.clone();
      next.play_unchecked(&m);
      Some(BoardPosition::from_chess(next))
   }

   /// Every legal move that checkmates immediately.
   pub fn mating_moves(&self) -> Vec<MoveSpec> {
      let moves: Vec<Move> = self.chess.legal_moves().into_iter().collect();
      moves.par_iter().filter_map(|m| self.mates_with(m)).collect()
   }

   /// The first mating move in generation order, if any.
   pub fn find_mate_in_one(&self) -> Option<MoveSpec> {
      let moves: Vec<Move> = self.chess.legal_moves().into_iter().collect();
      moves.par_iter().find_map_first(|m| self.mates_with(m))
   }

   fn mates_with(&self, m: &Move) -> Option<MoveSpec> {
      let mut after = self.chess.clone();
      after.play_unchecked(m);
      if after.is_checkmate() {
         MoveSpec::from_move(m)
      } else {
         None
      }
   }

   /// Sum of non-king material owned by `side`, in pawns.
   pub fn material_value(&self, side: Side) -> u32 {
      self.pieces()
         .iter()
         .filter(|(_, piece)| piece.side == side)
         .map(|(_, piece)| piece.kind.value())
         .sum()
   }

   /// Side ahead in non-king material, `None` when level.
   pub fn majority_side(&self) -> Option<Side> {
      majority_side(self.pieces().iter().map(|(_, piece)| piece))
   }

   pub fn pieces(&self) -> Vec<(Square, PiecePlacement)> {
      let board = self.chess.board();
      Square::ALL
         .iter()
         .filter_map(|&sq| {
            board
               .piece_at(sq)
               .map(|piece| (sq, PiecePlacement::new(piece.role.into(), piece.color.into())))
         })
         .collect()
   }
}

impl PartialEq for BoardPosition {
   fn eq(&self, other: &BoardPosition) -> bool {
      self.fen == other.fen
   }
}

impl Eq for BoardPosition {}

impl fmt::Display for BoardPosition {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      f.write_str(&self.fen)
   }
}

impl FromStr for BoardPosition {
   type Err = PuzzleError;

   fn from_str(s: &str) -> Result<BoardPosition, PuzzleError> {
      BoardPosition::from_fen(s)
   }
}

impl Serialize for BoardPosition {
   fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
      serializer.serialize_str(&self.fen)
   }
}

impl<'de> Deserialize<'de> for BoardPosition {
   fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<BoardPosition, D::Error> {
      let fen = String::deserialize(deserializer)?;
      BoardPosition::from_fen(&fen).map_err(serde::de::Error::custom)
   }
}
