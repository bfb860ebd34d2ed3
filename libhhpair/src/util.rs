use crate::structs::PairState;

#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

/// Picks the better of two (score, state) candidates; the first wins ties.
#[inline(always)]
pub fn max2<T: PartialOrd>(first: (T, PairState), second: (T, PairState)) -> (T, PairState) {
    if second.0 > first.0 {
        second
    } else {
        first
    }
}

/// Picks the best origin of a match-match cell.
///
/// The predecessors are ordered MM, GD, IM, DG, MI and an earlier one wins
/// ties. Starting a new alignment (STOP) only wins when it is strictly
/// better than every predecessor.
#[inline(always)]
pub fn max6<T: PartialOrd + Copy>(stop: T, predecessors: [T; 5]) -> (T, PairState) {
    const STATES: [PairState; 5] = [
        PairState::MM,
        PairState::GD,
        PairState::IM,
        PairState::DG,
        PairState::MI,
    ];

    let mut best = (predecessors[0], STATES[0]);
    for (&score, &state) in predecessors.iter().zip(STATES.iter()).skip(1) {
        if score > best.0 {
            best = (score, state);
        }
    }

    if stop > best.0 {
        (stop, PairState::Stop)
    } else {
        best
    }
}

/// Picks the best origin of a maximum accuracy cell, ordered STOP, MM, MI,
/// IM; a later candidate must be strictly better to win.
#[inline(always)]
pub fn max4<T: PartialOrd + Copy>(
    stop: T,
    diagonal: T,
    vertical: T,
    horizontal: T,
) -> (T, PairState) {
    let mut best = (stop, PairState::Stop);
    for candidate in [
        (diagonal, PairState::MM),
        (vertical, PairState::MI),
        (horizontal, PairState::IM),
    ] {
        if candidate.0 > best.0 {
            best = candidate;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max6_tie_order() {
        assert_eq!(max6(0.0, [1.0, 1.0, 1.0, 1.0, 1.0]), (1.0, PairState::MM));
        assert_eq!(max6(0.0, [0.0, 1.0, 1.0, 2.0, 2.0]), (2.0, PairState::DG));
        assert_eq!(max6(1.0, [1.0, 0.0, 0.0, 0.0, 0.0]), (1.0, PairState::MM));
        assert_eq!(max6(1.5, [1.0, 0.0, 0.0, 0.0, 0.0]), (1.5, PairState::Stop));
        assert_eq!(
            max6(0.0f32, [f32::NEG_INFINITY; 5]),
            (0.0, PairState::Stop)
        );
    }

    #[test]
    fn test_max4_and_max2() {
        assert_eq!(max4(1.0, 1.0, 1.0, 1.0), (1.0, PairState::Stop));
        assert_eq!(max4(0.0, 1.0, 2.0, 2.0), (2.0, PairState::MI));
        assert_eq!(
            max2((1.0, PairState::MM), (1.0, PairState::GD)),
            (1.0, PairState::MM)
        );
        assert_eq!(
            max2((1.0, PairState::MM), (2.0, PairState::GD)),
            (2.0, PairState::GD)
        );
    }
}
