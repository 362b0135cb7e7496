use super::{parse_pair, MoveError, Outcome, RuleEngine, Seat};

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Three-in-a-row on a 3x3 grid; moves are `row,col`
#[derive(Debug, Clone, Default)]
pub struct TicTacToe {
    cells: [Option<Seat>; 9],
}

impl TicTacToe {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RuleEngine for TicTacToe {
    fn start_new_game(&mut self) -> Seat {
        self.cells = [None; 9];
        Seat::First
    }

    fn apply_move(&mut self, seat: Seat, move_data: &str) -> Result<(), MoveError> {
        if self.check_winner() != Outcome::InProgress {
            return Err(MoveError::GameOver);
        }

        let (row, col) = parse_pair(move_data)?;
        if row > 2 || col > 2 {
            return Err(MoveError::OutOfBounds);
        }

        let cell = &mut self.cells[row * 3 + col];
        if cell.is_some() {
            return Err(MoveError::Occupied);
        }
        *cell = Some(seat);
        Ok(())
    }

    fn check_winner(&self) -> Outcome {
        for line in LINES {
            if let Some(seat) = self.cells[line[0]] {
                if self.cells[line[1]] == Some(seat) && self.cells[line[2]] == Some(seat) {
                    return Outcome::Won(seat);
                }
            }
        }

        if self.cells.iter().all(Option::is_some) {
            Outcome::Draw
        } else {
            Outcome::InProgress
        }
    }

    fn board(&self) -> String {
        self.cells
            .chunks(3)
            .map(|row| {
                row.iter()
                    .map(|cell| cell.map_or('.', Seat::symbol))
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}
