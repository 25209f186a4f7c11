use std::fmt;

/// Summary of how evenly records are spread over partitions.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadStats {
    pub min: u64,
    pub max: u64,
    pub median: u64,
    /// Ratio of the largest load to the mean load; 1 is perfect balance.
    pub imbalance: f64,
}

impl LoadStats {
    ///     # use photon_game::metrics::LoadStats;
    ///     let stats = LoadStats::from_loads(&[101, 100, 99]);
    ///     assert_eq!((99, 101, 100), (stats.min, stats.max, stats.median));
    ///
    pub fn from_loads(loads: &[u64]) -> Self {
        assert!(!loads.is_empty());
        let mut sorted = loads.to_vec();
        let median = *order_stat::kth(&mut sorted, loads.len() / 2);
        let min = *loads.iter().min().unwrap_or(&0);
        let max = *loads.iter().max().unwrap_or(&0);
        let mean = loads.iter().sum::<u64>() as f64 / loads.len() as f64;
        let imbalance = if mean > 0. { max as f64 / mean } else { 1. };
        LoadStats {
            min,
            max,
            median,
            imbalance,
        }
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "partition loads min/median/max = {}/{}/{}, imbalance {:.3}",
            self.min, self.median, self.max, self.imbalance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::LoadStats;

    #[test]
    fn test_from_loads() {
        let stats = LoadStats::from_loads(&[10, 30, 20, 20]);
        assert_eq!(10, stats.min);
        assert_eq!(30, stats.max);
        assert_eq!(20, stats.median);
        assert_eq!(1.5, stats.imbalance);
    }

    #[test]
    fn test_from_empty_partitions() {
        let stats = LoadStats::from_loads(&[0, 0]);
        assert_eq!(1., stats.imbalance);
        assert_eq!(
            "partition loads min/median/max = 0/0/0, imbalance 1.000",
            stats.to_string()
        );
    }
}
