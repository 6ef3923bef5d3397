use crate::db::schema::TaskType;

/// Ballot reactions in option order. A vote may not carry more options than
/// this set has symbols.
pub const BALLOT_SYMBOLS: [&str; 9] = [
    "1\u{FE0F}\u{20E3}",
    "2\u{FE0F}\u{20E3}",
    "3\u{FE0F}\u{20E3}",
    "4\u{FE0F}\u{20E3}",
    "5\u{FE0F}\u{20E3}",
    "6\u{FE0F}\u{20E3}",
    "7\u{FE0F}\u{20E3}",
    "8\u{FE0F}\u{20E3}",
    "9\u{FE0F}\u{20E3}",
];

pub const APPROVAL_STANDARD: &str = "\u{2705}";
pub const APPROVAL_BONUS: &str = "\u{1F31F}";

pub fn symbol_for_index(index: usize) -> Option<&'static str> {
    BALLOT_SYMBOLS.get(index).copied()
}

pub fn index_for_symbol(symbol: &str) -> Option<usize> {
    BALLOT_SYMBOLS.iter().position(|s| *s == symbol)
}

/// Which instance class an approval reaction attests, if any.
pub fn approval_task_type(symbol: &str) -> Option<TaskType> {
    match symbol {
        APPROVAL_STANDARD => Some(TaskType::Standard),
        APPROVAL_BONUS => Some(TaskType::Bonus),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn nine_distinct_symbols() {
        let unique: HashSet<&str> = BALLOT_SYMBOLS.iter().copied().collect();
        assert_eq!(unique.len(), 9);
    }

    #[test]
    fn symbol_index_round_trip() {
        for (i, symbol) in BALLOT_SYMBOLS.iter().enumerate() {
            assert_eq!(symbol_for_index(i), Some(*symbol));
            assert_eq!(index_for_symbol(symbol), Some(i));
        }
        assert_eq!(symbol_for_index(9), None);
        assert_eq!(index_for_symbol("x"), None);
    }

    #[test]
    fn approval_symbols_map_to_task_types() {
        assert_eq!(approval_task_type(APPROVAL_STANDARD), Some(TaskType::Standard));
        assert_eq!(approval_task_type(APPROVAL_BONUS), Some(TaskType::Bonus));
        assert_eq!(approval_task_type(BALLOT_SYMBOLS[0]), None);
    }
}
