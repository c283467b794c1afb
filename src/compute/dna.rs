//! DNA encoding of behavior records.
//!
//! A record is reduced to a shuffled sequence of weighted symbols plus a handful of
//! scalar descriptors (characteristic vector, chaos index, fractal dimension,
//! evolution factor). Encoding is deterministic: identical record fields and
//! reference instant always yield a bit-identical [`Dna`].
//!
//! The encoder never fails. Degenerate input (empty history, zero elapsed days,
//! all-zero metrics) resolves to fixed defaults.

use std::f64::consts::{E, LN_2, PI};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rng::SequenceRng;
use crate::schema::BehaviorRecord;

/// Chaos index returned for histories too short to iterate.
pub const DEFAULT_CHAOS_INDEX: f64 = 0.5;
/// Fractal dimension returned for short or degenerate histories.
pub const DEFAULT_FRACTAL_DIMENSION: f64 = 1.5;
/// Hour assumed when the record has no time-of-day component.
pub const DEFAULT_HOUR: u32 = 12;

const CHAOS_MIN_HISTORY: usize = 10;
const FRACTAL_MIN_HISTORY: usize = 20;
const BOX_SCALES: [usize; 5] = [1, 2, 4, 8, 16];

/// Symbol kinds making up a DNA sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nucleotide {
    /// Completion.
    A,
    /// Streak.
    T,
    /// Intensity.
    C,
    /// Growth.
    G,
    /// Variability.
    U,
    /// Creativity.
    X,
}

impl Nucleotide {
    /// All kinds in append order.
    pub const ALL: [Nucleotide; 6] = [
        Nucleotide::A,
        Nucleotide::T,
        Nucleotide::C,
        Nucleotide::G,
        Nucleotide::U,
        Nucleotide::X,
    ];

    /// Sequence used when every computed count is zero.
    pub const FALLBACK: [Nucleotide; 4] =
        [Nucleotide::A, Nucleotide::T, Nucleotide::C, Nucleotide::G];

    /// Fixed irrational weight of this symbol.
    #[inline]
    pub fn weight(self) -> f64 {
        match self {
            Nucleotide::A => 1.618_033_988_749_895, // golden ratio
            Nucleotide::T => std::f64::consts::SQRT_2,
            Nucleotide::C => 1.732_050_807_568_877_2, // sqrt(3)
            Nucleotide::G => E / 2.0,
            Nucleotide::U => PI / 3.0,
            Nucleotide::X => LN_2,
        }
    }

    /// Maximum number of repetitions contributed to a sequence.
    #[inline]
    pub fn ceiling(self) -> usize {
        match self {
            Nucleotide::A => 100,
            Nucleotide::T => 100,
            Nucleotide::C => 50,
            Nucleotide::G => 80,
            Nucleotide::U => 60,
            Nucleotide::X => 40,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn symbol(self) -> char {
        match self {
            Nucleotide::A => 'A',
            Nucleotide::T => 'T',
            Nucleotide::C => 'C',
            Nucleotide::G => 'G',
            Nucleotide::U => 'U',
            Nucleotide::X => 'X',
        }
    }
}

/// Symbolic encoding of one behavior record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dna {
    /// Shuffled symbol sequence. Never shorter than 4.
    pub sequence: Vec<Nucleotide>,
    /// completion, streak/365, intensity, growth, variability, creativity,
    /// hour/24, category/10.
    pub characteristics: [f64; 8],
    pub evolution_factor: f64,
    /// Logistic-map state after iterating the history, in [0, 1].
    pub chaos_index: f64,
    /// Box-counting estimate, always > 0.
    pub fractal_dimension: f64,
}

impl Dna {
    /// Number of occurrences of `kind` in the sequence.
    pub fn count(&self, kind: Nucleotide) -> usize {
        self.sequence.iter().filter(|&&n| n == kind).count()
    }

    /// Occurrence count per kind, indexed by [`Nucleotide::index`].
    pub fn counts(&self) -> [usize; 6] {
        let mut counts = [0usize; 6];
        for n in &self.sequence {
            counts[n.index()] += 1;
        }
        counts
    }

    /// Symbol weights in sequence order.
    pub fn weights(&self) -> Vec<f64> {
        self.sequence.iter().map(|n| n.weight()).collect()
    }

    /// Sequence rendered as a string of symbol letters.
    pub fn sequence_string(&self) -> String {
        self.sequence.iter().map(|n| n.symbol()).collect()
    }
}

/// Converts behavior records into [`Dna`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DnaEncoder;

impl DnaEncoder {
    /// Encode against the current wall-clock time.
    pub fn encode(record: &BehaviorRecord) -> Dna {
        Self::encode_at(record, Utc::now())
    }

    /// Encode with an explicit reference instant for elapsed-day computation.
    pub fn encode_at(record: &BehaviorRecord, as_of: DateTime<Utc>) -> Dna {
        let variability = variability(&record.history);
        let creativity = creativity(record);

        let counts = symbol_counts(record, variability, creativity);
        let sequence = assemble_sequence(&counts, &record.id);

        let hour = record.time_of_day.unwrap_or(DEFAULT_HOUR);
        let characteristics = [
            record.completion_rate,
            record.streak_days as f64 / 365.0,
            record.intensity,
            record.growth_rate,
            variability,
            creativity,
            hour as f64 / 24.0,
            record.category.ordinal() as f64 / 10.0,
        ];

        let days = (as_of - record.start_date).num_days().max(0) as u64;

        Dna {
            sequence,
            characteristics,
            evolution_factor: evolution_factor(days, record.streak_days),
            chaos_index: chaos_index(&record.history, record.completion_rate),
            fractal_dimension: fractal_dimension(&record.history),
        }
    }
}

/// Concatenate `counts` repetitions of each kind in A T C G U X order and shuffle
/// with the identifier-seeded generator. Falls back to `[A, T, C, G]` when empty.
pub fn assemble_sequence(counts: &[usize; 6], id: &str) -> Vec<Nucleotide> {
    let mut sequence: Vec<Nucleotide> = Nucleotide::ALL
        .iter()
        .zip(counts.iter())
        .flat_map(|(&kind, &count)| std::iter::repeat_n(kind, count))
        .collect();

    if sequence.is_empty() {
        return Nucleotide::FALLBACK.to_vec();
    }
    SequenceRng::from_identifier(id).shuffle(&mut sequence);
    sequence
}

/// Per-kind repetition counts in [`Nucleotide::ALL`] order, each clamped to its ceiling.
pub fn symbol_counts(record: &BehaviorRecord, variability: f64, creativity: f64) -> [usize; 6] {
    let scaled = |value: f64, scale: f64, kind: Nucleotide| -> usize {
        let rounded = (value * scale).round();
        if rounded.is_nan() || rounded <= 0.0 {
            0
        } else {
            (rounded as usize).min(kind.ceiling())
        }
    };

    [
        scaled(record.completion_rate, 100.0, Nucleotide::A),
        (record.streak_days as usize).min(Nucleotide::T.ceiling()),
        scaled(record.intensity, 50.0, Nucleotide::C),
        scaled(record.growth_rate, 80.0, Nucleotide::G),
        scaled(variability, 60.0, Nucleotide::U),
        scaled(creativity, 40.0, Nucleotide::X),
    ]
}

/// Fraction of adjacent history entries that differ.
pub fn variability(history: &[bool]) -> f64 {
    if history.len() <= 1 {
        return 0.0;
    }
    let changes = history.windows(2).filter(|w| w[0] != w[1]).count();
    changes as f64 / (history.len() - 1) as f64
}

/// Mean of three [0, 1] terms: gap irregularity, category rarity, growth x completion.
pub fn creativity(record: &BehaviorRecord) -> f64 {
    let irregularity = interval_variation(&record.timestamps).clamp(0.0, 1.0);
    let rarity = (1.0 / record.category.frequency_weight()).clamp(0.0, 1.0);
    let momentum = (record.growth_rate * record.completion_rate).clamp(0.0, 1.0);
    (irregularity + rarity + momentum) / 3.0
}

/// Coefficient of variation of the gaps between consecutive events.
pub fn interval_variation(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();

    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    if mean <= 0.0 {
        return 0.0;
    }
    let variance = gaps.iter().map(|g| (g - mean) * (g - mean)).sum::<f64>() / gaps.len() as f64;
    variance.sqrt() / mean
}

/// `ln(d+1)/ln(365) * (streak/d) * pi`, with consistency 0 when `d == 0`.
pub fn evolution_factor(days_elapsed: u64, streak_days: u32) -> f64 {
    if days_elapsed == 0 {
        return 0.0;
    }
    let d = days_elapsed as f64;
    let base = (d + 1.0).ln() / 365.0f64.ln();
    let consistency = streak_days as f64 / d;
    base * consistency * PI
}

/// Logistic-map iteration over the history with `r = 3.57 + 0.43 * completion`.
///
/// The state is clamped to [0, 1] after each step; the `0.1 * v` drive can
/// otherwise push it past 1 where the map diverges.
pub fn chaos_index(history: &[bool], completion_rate: f64) -> f64 {
    if history.len() <= CHAOS_MIN_HISTORY {
        return DEFAULT_CHAOS_INDEX;
    }
    let r = 3.57 + 0.43 * completion_rate.clamp(0.0, 1.0);
    history.iter().fold(0.5f64, |x, &v| {
        let drive = if v { 0.1 } else { 0.0 };
        (r * x * (1.0 - x) + drive).clamp(0.0, 1.0)
    })
}

/// Box-counting dimension of the history over scales 1, 2, 4, 8, 16.
pub fn fractal_dimension(history: &[bool]) -> f64 {
    if history.len() <= FRACTAL_MIN_HISTORY {
        return DEFAULT_FRACTAL_DIMENSION;
    }

    let points: Vec<(f64, f64)> = BOX_SCALES
        .iter()
        .map(|&scale| {
            let occupied = history
                .chunks(scale)
                .filter(|window| window.iter().any(|&v| v))
                .count()
                .max(1);
            ((scale as f64).ln(), (occupied as f64).ln())
        })
        .collect();

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.0).sum();
    let sum_y: f64 = points.iter().map(|p| p.1).sum();
    let sum_xy: f64 = points.iter().map(|p| p.0 * p.1).sum();
    let sum_xx: f64 = points.iter().map(|p| p.0 * p.0).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return DEFAULT_FRACTAL_DIMENSION;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    let dimension = slope.abs();
    if dimension.is_finite() && dimension > 0.0 {
        dimension
    } else {
        DEFAULT_FRACTAL_DIMENSION
    }
}
