use std::collections::HashMap;

/// Motif lengths searched, shortest first.
pub const MOTIF_LENGTHS: [usize; 3] = [3, 4, 5];

/// A length-5 motif must account for more than this share of all counted windows...
pub const FIVE_SHARE_OF_TOTAL: f64 = 0.25;
/// ...and beat this fraction of the length-4 count.
pub const FIVE_OVER_FOUR: f64 = 0.79;
/// Same pair of tests for length 4 against length 3.
pub const FOUR_SHARE_OF_TOTAL: f64 = 0.30;
pub const FOUR_OVER_THREE: f64 = 0.79;

/// The representative chord progression of a piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Motif {
    /// `None` when nothing repeated at any length.
    pub chords: Option<Vec<String>>,
    pub count: usize,
}

impl Motif {
    fn none() -> Self {
        Self { chords: None, count: 0 }
    }
}

/// Most frequent window of `length` symbols, with its count.
///
/// Windows whose first and last symbols are equal are wrap-arounds of a
/// shorter repeat and are not counted. Ties go to the window seen first.
pub fn most_repeated_window<S: AsRef<str>>(chords: &[S], length: usize) -> Option<(Vec<&str>, usize)> {
    if length == 0 || chords.len() < length {
        return None;
    }

    let mut counts: HashMap<Vec<&str>, (usize, usize)> = HashMap::new();
    for (position, window) in chords.windows(length).enumerate() {
        let first = window[0].as_ref();
        let last = window[length - 1].as_ref();
        if first == last {
            continue;
        }
        let key: Vec<&str> = window.iter().map(|c| c.as_ref()).collect();
        counts.entry(key).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(window, (count, _))| (window, count))
}

/// Pick the representative motif for a trimmed chord sequence.
pub fn find_motif<S: AsRef<str>>(chords: &[S]) -> Motif {
    if chords.len() < MOTIF_LENGTHS[0] {
        return Motif {
            chords: Some(chords.iter().map(|c| c.as_ref().to_string()).collect()),
            count: 1,
        };
    }

    let [three, four, five] = MOTIF_LENGTHS.map(|len| most_repeated_window(chords, len));
    let picked = match choose_length(window_count(&three), window_count(&four), window_count(&five)) {
        Some(3) => three,
        Some(4) => four,
        Some(5) => five,
        _ => None,
    };

    match picked {
        Some((window, count)) => Motif {
            chords: Some(collapse_period_two(window)),
            count,
        },
        None => Motif::none(),
    }
}

/// Decide which motif length wins given the per-length counts.
///
/// Longer motifs only win when they dominate both the overall count and the
/// next-shorter candidate; otherwise the best-supported shorter one is used.
pub fn choose_length(count_3: usize, count_4: usize, count_5: usize) -> Option<usize> {
    let total = (count_3 + count_4 + count_5) as f64;
    let (c3, c4, c5) = (count_3 as f64, count_4 as f64, count_5 as f64);

    if total == 0.0 {
        None
    } else if c5 > FIVE_SHARE_OF_TOTAL * total && c5 > FIVE_OVER_FOUR * c4 {
        Some(5)
    } else if c4 > FOUR_SHARE_OF_TOTAL * total && c4 > FOUR_OVER_THREE * c3 {
        Some(4)
    } else if count_3 > 0 {
        Some(3)
    } else if count_4 > 0 {
        Some(4)
    } else {
        Some(5)
    }
}

fn window_count(candidate: &Option<(Vec<&str>, usize)>) -> usize {
    candidate.as_ref().map_or(0, |(_, count)| *count)
}

/// A 4-chord motif of the form A B A B is really the 2-chord loop A B.
fn collapse_period_two(window: Vec<&str>) -> Vec<String> {
    let window = if window.len() == 4 && window[0] == window[2] && window[1] == window[3] {
        &window[..2]
    } else {
        &window[..]
    };
    window.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn decision_table() {
        assert_eq!(choose_length(2, 0, 8), Some(5));
        assert_eq!(choose_length(10, 9, 0), Some(4));
        assert_eq!(choose_length(0, 0, 0), None);
        // Five dominates the total but not four
        assert_eq!(choose_length(0, 10, 7), Some(4));
        // Nothing dominates: fall back to three
        assert_eq!(choose_length(10, 5, 1), Some(3));
        // Only five present
        assert_eq!(choose_length(0, 0, 1), Some(5));
        // Four below 0.79 of three, no three-way dominance
        assert_eq!(choose_length(10, 7, 0), Some(3));
    }

    #[test]
    fn palindromic_window_never_counted() {
        let chords = seq("C G C G C G C");
        assert_eq!(most_repeated_window(&chords, 3), None);

        let chords = seq("C G C F");
        let (window, count) = most_repeated_window(&chords, 3).unwrap();
        assert_eq!(window, vec!["G", "C", "F"]);
        assert_eq!(count, 1);
    }

    #[test]
    fn tie_goes_to_first_seen_window() {
        let chords = seq("A B C D E F");
        let (window, count) = most_repeated_window(&chords, 3).unwrap();
        assert_eq!(window, vec!["A", "B", "C"]);
        assert_eq!(count, 1);
    }

    #[test]
    fn too_short_for_window() {
        let chords = seq("A B");
        assert_eq!(most_repeated_window(&chords, 3), None);
    }

    #[test]
    fn short_input_is_its_own_motif() {
        assert_eq!(
            find_motif(&seq("Am F")),
            Motif { chords: Some(seq("Am F")), count: 1 }
        );
        let empty: Vec<String> = Vec::new();
        assert_eq!(
            find_motif(&empty),
            Motif { chords: Some(Vec::new()), count: 1 }
        );
    }

    #[test]
    fn four_chord_loop_detected() {
        // I-V-vi-IV repeated
        let chords = seq("C G Am F C G Am F C G Am F C G Am F");
        let motif = find_motif(&chords);
        // count_3 = 4, count_4 = 4, count_5 = 0 (every 5-window starts and ends on the same chord)
        assert_eq!(motif.chords, Some(seq("C G Am F")));
        assert_eq!(motif.count, 4);
    }

    #[test]
    fn two_chord_loop_collapses() {
        // Length-3 windows all wrap (X Y X); length-4 windows A B A B survive
        let chords = seq("Am E Am E Am E Am E");
        let motif = find_motif(&chords);
        assert_eq!(motif.chords, Some(seq("Am E")));
        assert_eq!(motif.count, 3);
    }

    #[test]
    fn constant_chord_has_no_motif() {
        let chords = seq("C C C C C C");
        assert_eq!(find_motif(&chords), Motif { chords: None, count: 0 });
    }
}
