//! Lottery draws.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;
use tracing::warn;

/// Numbers per draw.
pub const DRAW_SIZE: usize = 6;

/// Smallest valid number.
pub const MIN_NUMBER: u32 = 1;

/// Largest valid number.
pub const MAX_NUMBER: u32 = 49;

/// Built-in past draws the history starts from.
const INITIAL_DRAWS: [[u32; DRAW_SIZE]; 5] = [
    [4, 11, 19, 27, 38, 45],
    [2, 9, 16, 30, 41, 47],
    [7, 13, 22, 29, 35, 49],
    [1, 8, 17, 24, 33, 40],
    [5, 14, 21, 26, 39, 44],
];

/// Why a sequence of numbers is not a draw.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("expected 6 numbers, got {0}")]
    WrongLength(usize),

    #[error("{0} is outside 1-49")]
    OutOfRange(u32),

    #[error("{0} appears more than once")]
    Duplicate(u32),
}

/// Six distinct numbers in `MIN_NUMBER..=MAX_NUMBER`.
///
/// Keeps the order it was built with; generated draws are [`sorted`](Self::sorted)
/// before they are stored. Serialized as a plain JSON array and re-validated
/// when read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct Draw([u8; DRAW_SIZE]);

impl Draw {
    /// Validate `values`, keeping their order.
    pub fn from_values(values: &[u32]) -> Result<Self, DrawError> {
        if values.len() != DRAW_SIZE {
            return Err(DrawError::WrongLength(values.len()));
        }

        let mut numbers = [0u8; DRAW_SIZE];
        for (slot, &value) in numbers.iter_mut().zip(values) {
            if !(MIN_NUMBER..=MAX_NUMBER).contains(&value) {
                return Err(DrawError::OutOfRange(value));
            }
            *slot = value as u8;
        }

        let mut ordered = numbers;
        ordered.sort_unstable();
        if let Some(pair) = ordered.windows(2).find(|w| w[0] == w[1]) {
            return Err(DrawError::Duplicate(u32::from(pair[0])));
        }

        Ok(Self(numbers))
    }

    /// The same numbers, ascending.
    pub fn sorted(mut self) -> Self {
        self.0.sort_unstable();
        self
    }

    /// The numbers, in stored order.
    pub fn numbers(&self) -> [u32; DRAW_SIZE] {
        self.0.map(u32::from)
    }

    /// Whether `number` was drawn.
    pub fn contains(&self, number: u32) -> bool {
        self.0.iter().any(|&n| u32::from(n) == number)
    }
}

impl TryFrom<Vec<u32>> for Draw {
    type Error = DrawError;

    fn try_from(values: Vec<u32>) -> Result<Self, Self::Error> {
        Self::from_values(&values)
    }
}

impl From<Draw> for Vec<u32> {
    fn from(draw: Draw) -> Self {
        draw.numbers().to_vec()
    }
}

impl fmt::Display for Draw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        f.write_str(&parts.join(" - "))
    }
}

/// The seed history, most recent first.
pub fn initial_draws() -> Vec<Draw> {
    INITIAL_DRAWS
        .iter()
        .filter_map(|values| Draw::from_values(values).ok())
        .collect()
}

// ==================== History ====================

/// Draws, most recent first.
///
/// Reading a stored history skips entries that are not valid draws instead
/// of rejecting the whole list, so one bad entry cannot cost the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct History(Vec<Draw>);

impl History {
    /// A history with `draw` in front of `self`.
    pub fn prepended(&self, draw: Draw) -> Self {
        let mut next = Vec::with_capacity(self.0.len() + 1);
        next.push(draw);
        next.extend_from_slice(&self.0);
        Self(next)
    }
}

impl From<Vec<Draw>> for History {
    fn from(draws: Vec<Draw>) -> Self {
        Self(draws)
    }
}

impl Deref for History {
    type Target = [Draw];

    fn deref(&self) -> &[Draw] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for History {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry {
            Valid(Draw),
            Invalid(serde_json::Value),
        }

        let entries = Vec::<Entry>::deserialize(deserializer)?;
        let mut draws = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                Entry::Valid(draw) => draws.push(draw),
                Entry::Invalid(raw) => warn!(%raw, "Skipping invalid stored draw"),
            }
        }
        Ok(Self(draws))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_keeps_order() {
        let draw = Draw::from_values(&[9, 3, 7, 1, 5, 2]).unwrap();
        assert_eq!(draw.numbers(), [9, 3, 7, 1, 5, 2]);
        assert_eq!(draw.sorted().numbers(), [1, 2, 3, 5, 7, 9]);
        assert!(draw.contains(7));
        assert!(!draw.contains(4));
    }

    #[test]
    fn test_wrong_length() {
        assert_eq!(
            Draw::from_values(&[1, 2, 3, 4, 5]),
            Err(DrawError::WrongLength(5))
        );
        assert_eq!(
            Draw::from_values(&[1, 2, 3, 4, 5, 6, 7]),
            Err(DrawError::WrongLength(7))
        );
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            Draw::from_values(&[0, 2, 3, 4, 5, 6]),
            Err(DrawError::OutOfRange(0))
        );
        assert_eq!(
            Draw::from_values(&[1, 2, 3, 4, 5, 50]),
            Err(DrawError::OutOfRange(50))
        );
    }

    #[test]
    fn test_duplicate() {
        assert_eq!(
            Draw::from_values(&[8, 2, 3, 8, 5, 6]),
            Err(DrawError::Duplicate(8))
        );
    }

    #[test]
    fn test_serde_is_plain_array() {
        let draw = Draw::from_values(&[49, 1, 20, 13, 7, 33]).unwrap();
        let json = serde_json::to_string(&draw).unwrap();
        assert_eq!(json, "[49,1,20,13,7,33]");
        assert_eq!(serde_json::from_str::<Draw>(&json).unwrap(), draw);
    }

    #[test]
    fn test_invalid_stored_draw_is_rejected() {
        assert!(serde_json::from_str::<Draw>("[1,2,3]").is_err());
        assert!(serde_json::from_str::<Draw>("[1,1,2,3,4,5]").is_err());
    }

    #[test]
    fn test_initial_draws_are_valid() {
        assert_eq!(initial_draws().len(), INITIAL_DRAWS.len());
    }

    #[test]
    fn test_display() {
        let draw = Draw::from_values(&[6, 5, 4, 3, 2, 1]).unwrap();
        assert_eq!(draw.to_string(), "6 - 5 - 4 - 3 - 2 - 1");
        assert_eq!(draw.sorted().to_string(), "1 - 2 - 3 - 4 - 5 - 6");
    }

    #[test]
    fn test_history_skips_invalid_entries() {
        let raw = r#"[[1,2,3,4,5,6],[7,8,9,10,11,12],[1,2,3,4,5,50],"x",[3,3,4,5,6,7]]"#;
        let history: History = serde_json::from_str(raw).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[1].numbers(), [7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn test_history_that_is_not_a_list_fails() {
        assert!(serde_json::from_str::<History>("{\"draws\": []}").is_err());
    }

    #[test]
    fn test_history_prepended() {
        let first = Draw::from_values(&[1, 2, 3, 4, 5, 6]).unwrap();
        let second = Draw::from_values(&[40, 3, 27, 11, 49, 6]).unwrap();
        let history = History::from(vec![first]).prepended(second);

        assert_eq!(&*history, &[second, first]);
        assert_eq!(
            serde_json::to_string(&history).unwrap(),
            "[[40,3,27,11,49,6],[1,2,3,4,5,6]]"
        );
    }
}
