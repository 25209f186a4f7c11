use crate::data::{Record, UniqueSampleId};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::io::{self, BufReader, ErrorKind};
use std::iter::FromIterator;
use std::ops::{Add, Sub};

mod scored_record;
pub use self::scored_record::ScoredRecord;

/// Score substituted for samples a coordinate did not score.
pub const DEFAULT_SCORE: f64 = 0.;

/// A score shape that ledgers can accumulate.
pub trait ScoreValue: Clone + PartialEq + Send + Sync {
    /// Value standing in for a sample missing from one side of a combination.
    fn zero() -> Self;

    fn plus(&self, other: &Self) -> Self;

    fn minus(&self, other: &Self) -> Self;

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool;
}

impl ScoreValue for f64 {
    fn zero() -> Self {
        DEFAULT_SCORE
    }

    fn plus(&self, other: &Self) -> Self {
        self + other
    }

    fn minus(&self, other: &Self) -> Self {
        self - other
    }

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self - other).abs() <= epsilon
    }
}

/// Caching hint for a ledger. Never affects combination results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLevel {
    None,
    MemoryOnly,
    MemoryOnlySer,
    MemoryAndDisk,
    DiskOnly,
}

/// Scores of a set of samples keyed by their unique sample ids.
///
/// Ledgers are immutable once built; combining two produces a new one.
#[derive(Clone, Debug)]
pub struct DataScores<T> {
    scores: HashMap<UniqueSampleId, T>,
    name: Option<String>,
    storage_level: StorageLevel,
}

/// Bare numeric scores produced by a single coordinate.
pub type CoordinateDataScores = DataScores<f64>;

/// Scores bundled with the label, weight and tags of the scored record.
pub type ModelDataScores = DataScores<ScoredRecord>;

impl<T: ScoreValue> DataScores<T> {
    pub fn new() -> Self {
        Self::from(HashMap::new())
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn get(&self, uid: UniqueSampleId) -> Option<&T> {
        self.scores.get(&uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UniqueSampleId, &T)> {
        self.scores.iter()
    }

    pub fn into_inner(self) -> HashMap<UniqueSampleId, T> {
        self.scores
    }

    /// Full outer join on sample id.
    ///
    /// A sample present on one side only is combined with `default` standing in
    /// for the other side. Samples absent from both sides never appear.
    ///
    ///     # use photon_game::score::CoordinateDataScores;
    ///     let a: CoordinateDataScores = vec![(1, 3.), (2, 5.)].into_iter().collect();
    ///     let b: CoordinateDataScores = vec![(2, 1.), (3, 4.)].into_iter().collect();
    ///     let max = a.combine(&b, |x, y| x.max(*y), &std::f64::NEG_INFINITY);
    ///     assert_eq!(Some(&5.), max.get(2));
    ///     assert_eq!(Some(&4.), max.get(3));
    ///     assert_eq!(3, max.len());
    ///
    pub fn combine<F>(&self, other: &Self, op: F, default: &T) -> Self
    where
        F: Fn(&T, &T) -> T + Sync,
    {
        let both_or_left = self.scores.par_iter().map(|(&uid, a)| {
            let b = other.scores.get(&uid).unwrap_or(default);
            (uid, op(a, b))
        });
        let right_only = other
            .scores
            .par_iter()
            .filter(|(uid, _)| !self.scores.contains_key(*uid))
            .map(|(&uid, b)| (uid, op(default, b)));

        Self::from(both_or_left.chain(right_only).collect::<HashMap<_, _>>())
    }

    /// Whether `pred` holds for every sample of the full outer join.
    fn join_all<F>(&self, other: &Self, pred: F) -> bool
    where
        F: Fn(Option<&T>, Option<&T>) -> bool + Sync,
    {
        self.scores
            .par_iter()
            .all(|(uid, a)| pred(Some(a), other.scores.get(uid)))
            && other
                .scores
                .par_iter()
                .filter(|(uid, _)| !self.scores.contains_key(*uid))
                .all(|(_, b)| pred(None, Some(b)))
    }

    /// Equality with a tolerance on the numeric part of the scores.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.join_all(other, |a, b| match (a, b) {
            (Some(a), Some(b)) => a.approx_eq(b, epsilon),
            _ => false,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_ref().map(|s| s.as_str())
    }

    pub fn set_name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn storage_level(&self) -> StorageLevel {
        self.storage_level
    }

    pub fn persist(&mut self, storage_level: StorageLevel) -> &mut Self {
        debug!(
            "Persisting scores {} with storage level {:?}",
            self.display_name(),
            storage_level
        );
        self.storage_level = storage_level;
        self
    }

    /// Force the scores to be computed, returning how many samples they cover.
    pub fn materialize(&self) -> usize {
        let n_samples = self.scores.len();
        debug!(
            "Materialized scores {} over {} samples",
            self.display_name(),
            n_samples
        );
        n_samples
    }

    /// Evict the scores from any cache. The ledger stays usable.
    pub fn release(&mut self) -> &mut Self {
        if self.storage_level != StorageLevel::None {
            debug!("Releasing scores {}", self.display_name());
            self.storage_level = StorageLevel::None;
        }
        self
    }

    fn display_name(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }
}

impl<T: ScoreValue> Default for DataScores<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<HashMap<UniqueSampleId, T>> for DataScores<T> {
    fn from(scores: HashMap<UniqueSampleId, T>) -> Self {
        DataScores {
            scores,
            name: None,
            storage_level: StorageLevel::None,
        }
    }
}

impl<T> FromIterator<(UniqueSampleId, T)> for DataScores<T> {
    fn from_iter<I: IntoIterator<Item = (UniqueSampleId, T)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<HashMap<_, _>>())
    }
}

/// Samples must match one to one with equal scores. Follows `T`'s own equality,
/// so a ledger holding a NaN score is not equal to itself; score files with
/// non-finite scores are rejected on load.
impl<T: ScoreValue> PartialEq for DataScores<T> {
    fn eq(&self, other: &Self) -> bool {
        self.join_all(other, |a, b| match (a, b) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        })
    }
}

impl<'a, T: ScoreValue> Add<&'a DataScores<T>> for &'a DataScores<T> {
    type Output = DataScores<T>;

    fn add(self, other: &'a DataScores<T>) -> DataScores<T> {
        self.combine(other, T::plus, &T::zero())
    }
}

impl<'a, T: ScoreValue> Sub<&'a DataScores<T>> for &'a DataScores<T> {
    type Output = DataScores<T>;

    fn sub(self, other: &'a DataScores<T>) -> DataScores<T> {
        self.combine(other, T::minus, &T::zero())
    }
}

impl<T: ScoreValue> Add for DataScores<T> {
    type Output = DataScores<T>;

    fn add(self, other: DataScores<T>) -> DataScores<T> {
        &self + &other
    }
}

impl<T: ScoreValue> Sub for DataScores<T> {
    type Output = DataScores<T>;

    fn sub(self, other: DataScores<T>) -> DataScores<T> {
        &self - &other
    }
}

impl DataScores<f64> {
    /// Parse a line of a scores file, in the format: uid score
    fn parse_score_line(line: &str) -> io::Result<(UniqueSampleId, f64)> {
        let mut token_iter = line.split_whitespace();
        let uid = token_iter
            .next()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or(ErrorKind::InvalidData)?;
        let score = token_iter
            .next()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|score| score.is_finite())
            .ok_or(ErrorKind::InvalidData)?;
        if token_iter.next().is_some() {
            return Err(io::Error::from(ErrorKind::InvalidData));
        }
        Ok((uid, score))
    }

    pub fn load_scores_file(path: &str) -> io::Result<Self> {
        info!("Loading scores from {}", path);
        let start_t = time::precise_time_s();

        let mut scores = HashMap::new();
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let (uid, score) = Self::parse_score_line(&line)?;
            if scores.insert(uid, score).is_some() {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("Duplicate sample id {} in {}", uid, path),
                ));
            }
        }

        info!(
            "Loaded {} scores; it took {:.2}s",
            scores.len(),
            time::precise_time_s() - start_t
        );
        let mut data_scores = Self::from(scores);
        data_scores.set_name(path);
        Ok(data_scores)
    }

    /// Write one `uid score` line per sample, ordered by uid.
    pub fn write_scores<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let mut uid_score_pairs: Vec<_> = self.scores.iter().collect();
        uid_score_pairs.sort_unstable_by_key(|&(&uid, _)| uid);
        for (uid, score) in uid_score_pairs {
            writeln!(writer, "{} {}", uid, score)?;
        }
        Ok(())
    }
}

impl DataScores<ScoredRecord> {
    /// Pair each record with its coordinate score, or the default score if it has none.
    pub fn from_records(records: &[Record], scores: &CoordinateDataScores) -> Self {
        records
            .par_iter()
            .map(|r| {
                let score = scores.get(r.uid).cloned().unwrap_or(DEFAULT_SCORE);
                (r.uid, r.to_scored_record(score))
            }).collect::<HashMap<_, _>>()
            .into()
    }

    /// Numeric predictions only, for consumers that need nothing else.
    pub fn to_scores(&self) -> CoordinateDataScores {
        self.scores
            .par_iter()
            .map(|(&uid, scored)| (uid, scored.score))
            .collect::<HashMap<_, _>>()
            .into()
    }
}
