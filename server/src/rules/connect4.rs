use super::{MoveError, Outcome, RuleEngine, Seat};

const ROWS: usize = 6;
const COLS: usize = 7;

/// Four-in-a-row with gravity; moves are a column index
#[derive(Debug, Clone, Default)]
pub struct Connect4 {
    /// Row 0 is the bottom of the board
    grid: [[Option<Seat>; COLS]; ROWS],
}

impl Connect4 {
    pub fn new() -> Self {
        Self::default()
    }

    fn line_from(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<Seat> {
        let seat = self.grid[row][col]?;
        for step in 1..4 {
            let r = row as isize + dr * step;
            let c = col as isize + dc * step;
            if r < 0 || c < 0 || r >= ROWS as isize || c >= COLS as isize {
                return None;
            }
            if self.grid[r as usize][c as usize] != Some(seat) {
                return None;
            }
        }
        Some(seat)
    }
}

impl RuleEngine for Connect4 {
    fn start_new_game(&mut self) -> Seat {
        self.grid = [[None; COLS]; ROWS];
        Seat::First
    }

    fn apply_move(&mut self, seat: Seat, move_data: &str) -> Result<(), MoveError> {
        if self.check_winner() != Outcome::InProgress {
            return Err(MoveError::GameOver);
        }

        let col: usize = move_data
            .trim()
            .parse()
            .map_err(|_| MoveError::Malformed(move_data.to_string()))?;
        if col >= COLS {
            return Err(MoveError::OutOfBounds);
        }

        let row = (0..ROWS)
            .find(|&row| self.grid[row][col].is_none())
            .ok_or(MoveError::ColumnFull)?;
        self.grid[row][col] = Some(seat);
        Ok(())
    }

    fn check_winner(&self) -> Outcome {
        for row in 0..ROWS {
            for col in 0..COLS {
                for (dr, dc) in [(0, 1), (1, 0), (1, 1), (1, -1)] {
                    if let Some(seat) = self.line_from(row, col, dr, dc) {
                        return Outcome::Won(seat);
                    }
                }
            }
        }

        if self.grid[ROWS - 1].iter().all(Option::is_some) {
            Outcome::Draw
        } else {
            Outcome::InProgress
        }
    }

    fn board(&self) -> String {
        self.grid
            .iter()
            .rev()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or('.', Seat::symbol))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertical_win() {
        let mut engine = Connect4::new();
        engine.start_new_game();
        for _ in 0..3 {
            engine.apply_move(Seat::First, "3").unwrap();
            engine.apply_move(Seat::Second, "4").unwrap();
        }
        assert_eq!(engine.check_winner(), Outcome::InProgress);
        engine.apply_move(Seat::First, "3").unwrap();
        assert_eq!(engine.check_winner(), Outcome::Won(Seat::First));
    }

    #[test]
    fn test_diagonal_win() {
        let mut engine = Connect4::new();
        engine.start_new_game();
        // Staircase for Second along columns 0..=3
        let moves = [
            (Seat::Second, "0"),
            (Seat::First, "1"),
            (Seat::Second, "1"),
            (Seat::First, "2"),
            (Seat::First, "2"),
            (Seat::Second, "2"),
            (Seat::First, "3"),
            (Seat::First, "3"),
            (Seat::First, "3"),
            (Seat::Second, "3"),
        ];
        for (seat, col) in moves {
            engine.apply_move(seat, col).unwrap();
        }
        assert_eq!(engine.check_winner(), Outcome::Won(Seat::Second));
    }

    #[test]
    fn test_full_column() {
        let mut engine = Connect4::new();
        let mut seat = engine.start_new_game();
        for _ in 0..ROWS {
            engine.apply_move(seat, "0").unwrap();
            seat = seat.other();
        }
        assert_eq!(engine.apply_move(seat, "0"), Err(MoveError::ColumnFull));
        assert_eq!(engine.apply_move(seat, "7"), Err(MoveError::OutOfBounds));
        assert!(engine.board().starts_with("O......"));
    }
}
