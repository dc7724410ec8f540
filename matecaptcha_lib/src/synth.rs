use crate::board::{BoardPosition, PieceKind, PiecePlacement, Side};
use crate::error::PuzzleError;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

const MINOR_PIECES: [PieceKind; 2] = [PieceKind::Knight, PieceKind::Bishop];
const MAJOR_PIECES: [PieceKind; 2] = [PieceKind::Rook, PieceKind::Queen];

/// Picks 2 to 4 attacking pieces for `side`, the first 1 or 2 of them rooks
/// or queens and the rest knights or bishops.
pub fn random_material<R: Rng + ?Sized>(rng: &mut R, side: Side) -> Vec<PiecePlacement> {
   let count = rng.gen_range(2..=4);
   let majors = rng.gen_range(1..=2);
   (0..count)
      .map(|i| {
         let kind = if i < majors {
            MAJOR_PIECES[rng.gen_range(0..MAJOR_PIECES.len())]
         } else {
            MINOR_PIECES[rng.gen_range(0..MINOR_PIECES.len())]
         };
         PiecePlacement::new(kind, side)
      })
      .collect()
}

/// Scatters `material` plus both kings over the board until the result is a
/// quiet legal position with `side` to move.
///
/// A candidate is kept only if it parses, is neither mate nor stalemate,
/// the side to move is not in check, and handing the move to the other side
/// would not put that side in check either.
pub fn synthesize<R: Rng + ?Sized>(
   rng: &mut R,
   material: &[PiecePlacement],
   side: Side,
   max_attempts: usize,
) -> Result<BoardPosition, PuzzleError> {
   if material.len() + 2 > 64 {
      return Err(PuzzleError::TooManyPieces { count: material.len() });
   }
   let pieces: Vec<PiecePlacement> = material
      .iter()
      .copied()
      .chain([
         PiecePlacement::new(PieceKind::King, Side::White),
         PiecePlacement::new(PieceKind::King, Side::Black),
      ])
      .collect();

   let mut squares: Vec<usize> = (0..64).collect();
   for attempt in 0..max_attempts {
      squares.shuffle(rng);
      let mut grid = [None; 64];
      for (piece, &square) in pieces.iter().zip(squares.iter()) {
         grid[square] = Some(*piece);
      }
      let placement = render_placement(&grid);
      if let Some(position) = accept(&placement, side) {
         debug!("placement {} accepted after {} attempts", position, attempt + 1);
         return Ok(position);
      }
   }
   Err(PuzzleError::GenerationExhausted { attempts: max_attempts })
}

fn accept(placement: &str, side: Side) -> Option<BoardPosition> {
   let position = BoardPosition::from_fen(&format!("{} {} - - 0 1", placement, side.fen_char())).ok()?;
   if position.is_checkmate() || position.is_stalemate() || position.is_check() {
      return None;
   }
   let flipped = BoardPosition::from_fen(&format!("{} {} - - 0 1", placement, (!side).fen_char())).ok()?;
   if flipped.is_check() {
      return None;
   }
   Some(position)
}

/// Piece placement field of a FEN. Index 0 is a1, 63 is h8.
pub fn render_placement(grid: &[Option<PiecePlacement>; 64]) -> String {
   let mut buf = String::with_capacity(72);
   for rank in (0..8).rev() {
      let mut empty = 0u8;
      for file in 0..8 {
         match grid[rank * 8 + file] {
            Some(piece) => {
               if empty > 0 {
                  buf.push(char::from(b'0' + empty));
                  empty = 0;
               }
               buf.push(piece.fen_char());
            }
            None => empty += 1,
         }
      }
      if empty > 0 {
         buf.push(char::from(b'0' + empty));
      }
      if rank > 0 {
         buf.push('/');
      }
   }
   buf
}
