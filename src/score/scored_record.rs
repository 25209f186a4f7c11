use super::{ScoreValue, DEFAULT_SCORE};
use std::collections::BTreeMap;

/// A prediction together with what is needed to write it out.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub score: f64,
    pub label: Option<f64>,
    pub weight: f64,
    pub id_tags: BTreeMap<String, String>,
}

impl ScoredRecord {
    fn has_metadata(&self) -> bool {
        self.label.is_some() || !self.id_tags.is_empty()
    }

    /// Copy of the metadata-carrying side with the given score; left side wins ties.
    fn with_score(&self, other: &Self, score: f64) -> Self {
        let source = if self.has_metadata() || !other.has_metadata() {
            self
        } else {
            other
        };
        ScoredRecord {
            score,
            ..source.clone()
        }
    }
}

impl ScoreValue for ScoredRecord {
    fn zero() -> Self {
        ScoredRecord {
            score: DEFAULT_SCORE,
            label: None,
            weight: 1.,
            id_tags: BTreeMap::new(),
        }
    }

    fn plus(&self, other: &Self) -> Self {
        self.with_score(other, self.score + other.score)
    }

    fn minus(&self, other: &Self) -> Self {
        self.with_score(other, self.score - other.score)
    }

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.score - other.score).abs() <= epsilon
            && self.label == other.label
            && self.weight == other.weight
            && self.id_tags == other.id_tags
    }
}

#[cfg(test)]
mod tests {
    use super::ScoredRecord;
    use crate::data::Record;
    use crate::score::{ModelDataScores, ScoreValue};

    fn scored(uid: u64, score: f64) -> ScoredRecord {
        Record::new(uid, 1.)
            .with_attribute("userId", format!("u{}", uid).as_str())
            .to_scored_record(score)
    }

    #[test]
    fn test_plus_keeps_metadata() {
        let a = scored(1, 0.5);
        let sum = a.plus(&ScoredRecord::zero());
        assert_eq!(a, sum);

        let diff = ScoredRecord::zero().minus(&a);
        assert_eq!(-0.5, diff.score);
        assert_eq!(a.id_tags, diff.id_tags);
        assert_eq!(a.label, diff.label);
    }

    #[test]
    fn test_model_scores_combine() {
        let a: ModelDataScores = vec![(1, scored(1, 3.)), (2, scored(2, 5.))]
            .into_iter()
            .collect();
        let b: ModelDataScores = vec![(2, scored(2, 1.)), (3, scored(3, 4.))]
            .into_iter()
            .collect();
        let expected: ModelDataScores = vec![
            (1, scored(1, 3.)),
            (2, scored(2, 6.)),
            (3, scored(3, 4.)),
        ].into_iter()
        .collect();
        assert_eq!(expected, &a + &b);
        assert_eq!(&a + &b, &b + &a);
        assert_eq!(
            vec![(1, 3.), (2, 4.), (3, -4.)]
                .into_iter()
                .collect::<crate::score::CoordinateDataScores>(),
            (&a - &b).to_scores()
        );
    }
}
