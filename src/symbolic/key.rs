use std::fmt;

/// Krumhansl-Kessler major key profile.
const MAJOR_PROFILE: [f64; 12] = [6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17];

// Tonic spellings use '-' for flats; the record assembler rewrites them.
const MAJOR_TONICS: [&str; 12] = ["C", "D-", "D", "E-", "E", "F", "F#", "G", "A-", "A", "B-", "B"];
const MINOR_TONICS: [&str; 12] = ["C", "C#", "D", "E-", "E", "F", "F#", "G", "G#", "A", "B-", "B"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key {
    pub tonic_pitch_class: u8,
    pub mode: Mode,
    /// Pearson correlation with the winning profile.
    pub correlation: f64,
}

impl Key {
    pub fn tonic(&self) -> &'static str {
        let pc = usize::from(self.tonic_pitch_class % 12);
        match self.mode {
            Mode::Major => MAJOR_TONICS[pc],
            Mode::Minor => MINOR_TONICS[pc],
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            Mode::Major => "major",
            Mode::Minor => "minor",
        };
        write!(f, "{} {}", self.tonic(), mode)
    }
}

/// Krumhansl-Schmuckler key estimate from a duration-weighted pitch-class
/// histogram. Correlates against all 24 rotated profiles; `None` for an
/// empty histogram.
pub fn detect_key(histogram: &[f64; 12]) -> Option<Key> {
    let total: f64 = histogram.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let mut best: Option<Key> = None;
    for root in 0..12u8 {
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + usize::from(root)) % 12] / total;
        }

        for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let correlation = pearson(&rotated, profile);
            if best.is_none_or(|b| correlation > b.correlation) {
                best = Some(Key {
                    tonic_pitch_class: root,
                    mode,
                    correlation,
                });
            }
        }
    }

    best
}

fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean = x.iter().sum::<f64>() / 12.0;
    let y_mean = y.iter().sum::<f64>() / 12.0;

    let (mut num, mut x_sq, mut y_sq) = (0.0, 0.0, 0.0);
    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 { 0.0 } else { num / denom }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(pitch_classes: &[(usize, f64)]) -> [f64; 12] {
        let mut h = [0.0; 12];
        for &(pc, w) in pitch_classes {
            h[pc] += w;
        }
        h
    }

    #[test]
    fn c_major_scale() {
        // Tonic triad weighted heavier than passing tones
        let h = histogram(&[(0, 4.0), (2, 1.0), (4, 3.0), (5, 1.0), (7, 3.0), (9, 1.0), (11, 1.0)]);
        let key = detect_key(&h).unwrap();
        assert_eq!(key.tonic_pitch_class, 0);
        assert_eq!(key.mode, Mode::Major);
        assert_eq!(key.to_string(), "C major");
    }

    #[test]
    fn a_minor_triad() {
        let h = histogram(&[(9, 4.0), (0, 3.0), (4, 3.0), (2, 1.0), (11, 1.0)]);
        let key = detect_key(&h).unwrap();
        assert_eq!(key.to_string(), "A minor");
    }

    #[test]
    fn flat_keys_use_music21_spelling() {
        // B-flat major: Bb D F heavy
        let h = histogram(&[(10, 4.0), (2, 3.0), (5, 3.0), (0, 1.0), (3, 1.0), (7, 1.0), (9, 1.0)]);
        let key = detect_key(&h).unwrap();
        assert_eq!(key.to_string(), "B- major");
    }

    #[test]
    fn empty_histogram() {
        assert_eq!(detect_key(&[0.0; 12]), None);
    }
}
