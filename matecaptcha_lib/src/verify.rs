use crate::board::MoveSpec;
use crate::generator::Puzzle;
use serde::Serialize;

pub const CORRECT_MESSAGE: &str = "Correct solution!";
pub const INCORRECT_MESSAGE: &str = "Incorrect solution. Try again.";

/// Whether `submitted` is legal in the puzzle position and mates.
///
/// Any mating move counts, not only the stored answer, since a position may
/// hold more than one mate.
pub fn verify(puzzle: &Puzzle, submitted: &MoveSpec) -> bool {
   puzzle
      .position
      .play(submitted)
      .map_or(false, |after| after.is_checkmate())
}

/// Like [`verify`] for raw user input. Text that is not a move is wrong.
pub fn verify_str(puzzle: &Puzzle, submitted: &str) -> bool {
   match submitted.trim().parse::<MoveSpec>() {
      Ok(a_move) => verify(puzzle, &a_move),
      Err(_) => false,
   }
}

/// Result of a verification as shown to the person solving.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Verdict {
   pub correct: bool,
   pub message: &'static str,
}

impl Verdict {
   pub fn new(correct: bool) -> Verdict {
      Verdict {
         correct,
         message: if correct { CORRECT_MESSAGE } else { INCORRECT_MESSAGE },
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::board::BoardPosition;

   const TWO_ROOKS: &str = "6k1/5ppp/8/8/8/8/8/RR4K1 w - - 0 1";

   fn puzzle(fen: &str, answer: &str) -> Puzzle {
      Puzzle {
         position: BoardPosition::from_fen(fen).unwrap(),
         answer_move: answer.parse().unwrap(),
      }
   }

   #[test]
   fn stored_answer_is_correct() {
      let puzzle = puzzle(TWO_ROOKS, "a1a8");
      let answer = puzzle.answer_move;
      assert!(verify(&puzzle, &answer));
      assert_eq!(Verdict::new(verify(&puzzle, &answer)).message, "Correct solution!");
      // no state carried between calls
      let copy = puzzle.clone();
      for _ in 0..3 {
         assert!(verify(&copy, &answer));
      }
   }

   #[test]
   fn any_mating_move_is_accepted() {
      let puzzle = puzzle(TWO_ROOKS, "a1a8");
      let mates = puzzle.position.mating_moves();
      assert_eq!(mates.len(), 2);
      for a_move in puzzle.position.legal_moves() {
         let mates_here = puzzle.position.play(&a_move).unwrap().is_checkmate();
         assert_eq!(verify(&puzzle, &a_move), mates_here, "{}", a_move);
      }
      assert!(verify_str(&puzzle, "b1b8"));
   }

   #[test]
   fn non_mating_and_illegal_moves_are_rejected() {
      let puzzle = puzzle(TWO_ROOKS, "a1a8");
      assert!(!verify_str(&puzzle, "g1h1"));
      assert!(!verify_str(&puzzle, "a1a2"));
      assert_eq!(Verdict::new(verify_str(&puzzle, "g1h1")).message, "Incorrect solution. Try again.");
      // illegal: the rook can't jump over the other rook
      assert!(!verify_str(&puzzle, "a1c1"));
      // black piece moved on white's turn
      assert!(!verify_str(&puzzle, "g8h8"));
   }

   #[test]
   fn garbage_input_is_rejected() {
      let puzzle = puzzle(TWO_ROOKS, "a1a8");
      assert!(!verify_str(&puzzle, ""));
      assert!(!verify_str(&puzzle, "Ra8#"));
      assert!(!verify_str(&puzzle, "a1a9"));
      assert!(verify_str(&puzzle, " a1a8\n"));
   }

   #[test]
   fn verdict_serializes() {
      let json = serde_json::to_string(&Verdict::new(true)).unwrap();
      assert_eq!(json, r#"{"correct":true,"message":"Correct solution!"}"#);
   }
}
