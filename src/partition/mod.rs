use crate::data::{Broadcast, REId, Record, Value};
use crate::error::{Error, Result};
use crate::metrics::LoadStats;
use fasthash::murmur3::hash32_with_seed;
use rayon::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::io;

/// Longest-processing-time greedy packing of weighted entities.
pub mod bin_packing;

mod groups;
pub use self::groups::EntityGroups;

use self::bin_packing::{greedy_assign, PartitionLoads};

/// Explicit entity-to-partition assignments.
pub type PartitionMap = HashMap<REId, usize>;

#[derive(Clone, Debug)]
pub struct PartitionerConfig {
    pub n_partitions: usize,
    /// Maximum number of entities given an explicit assignment.
    pub capacity: usize,
    /// Maximum number of records per entity used for local training.
    pub active_data_upper_bound: Option<usize>,
}

impl Default for PartitionerConfig {
    fn default() -> Self {
        Self {
            n_partitions: 16,
            capacity: 10000,
            active_data_upper_bound: None,
        }
    }
}

impl PartitionerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_partitions == 0 {
            return Err(Error::invalid_config(
                "n_partitions",
                "positive",
                self.n_partitions,
            ));
        }
        if self.capacity == 0 {
            return Err(Error::invalid_config("capacity", "positive", self.capacity));
        }
        if self.active_data_upper_bound == Some(0) {
            return Err(Error::invalid_config(
                "active_data_upper_bound",
                "positive when set",
                0,
            ));
        }
        Ok(())
    }

    /// Check that a previously saved partitioner can serve this configuration.
    pub fn check_loaded(&self, partitioner: &EntityPartitioner) -> Result<()> {
        self.validate()?;
        if partitioner.n_partitions() != self.n_partitions {
            return Err(Error::invalid_config(
                "n_partitions",
                "equal to the loaded partition map's partition count",
                self.n_partitions,
            ));
        }
        if partitioner.partition_map().len() > self.capacity {
            return Err(Error::invalid_config(
                "capacity",
                "at least the loaded partition map's entity count",
                self.capacity,
            ));
        }
        Ok(())
    }

    /// Build a partitioner that co-locates the records of each entity named by
    /// `entity_field`, balancing record counts across partitions.
    pub fn build(&self, records: &[Record], entity_field: &str) -> Result<EntityPartitioner> {
        self.build_with_loads(records, entity_field)
            .map(|(partitioner, _)| partitioner)
    }

    /// Same as `build`, also returning the estimated load of each partition.
    pub fn build_with_loads(
        &self,
        records: &[Record],
        entity_field: &str,
    ) -> Result<(EntityPartitioner, PartitionLoads)> {
        self.validate()?;

        info!("Building entity partitioner with parameters {:?}", self);
        let start_t = time::precise_time_s();

        let mut entity_counts: Vec<(&str, u64)> =
            count_entities(records, entity_field)?.into_iter().collect();
        entity_counts.sort_unstable_by(|(id1, c1), (id2, c2)| c2.cmp(c1).then(id1.cmp(id2)));

        let n_entities = entity_counts.len();
        if n_entities > self.capacity {
            info!(
                "Tracking the {} largest of {} entities; the rest fall back to hashing",
                self.capacity, n_entities
            );
            entity_counts.truncate(self.capacity);
        }

        let weights: Vec<u64> = entity_counts
            .iter()
            .map(|&(_, count)| match self.active_data_upper_bound {
                Some(bound) => count.min(bound as u64),
                None => count,
            }).collect();
        let (assignments, loads) = greedy_assign(&weights, self.n_partitions);

        let partition_map: PartitionMap = izip!(entity_counts, assignments)
            .map(|((id, _), p)| (id.to_owned(), p))
            .collect();

        info!(
            "Entity partitioner built over {} entities; it took {:.2}s; {}",
            partition_map.len(),
            time::precise_time_s() - start_t,
            LoadStats::from_loads(&loads)
        );
        let partitioner = EntityPartitioner {
            n_partitions: self.n_partitions,
            partition_map: Broadcast::new(partition_map),
        };
        Ok((partitioner, loads))
    }
}

fn entity_id<'a>(value: &'a Value) -> Result<&'a str> {
    value.as_str().ok_or_else(|| Error::TypeMismatch {
        expected: "string entity id",
        found: value.type_name().to_owned(),
    })
}

/// Count records per entity, skipping records without the entity attribute.
fn count_entities<'a>(records: &'a [Record], entity_field: &str) -> Result<HashMap<&'a str, u64>> {
    records
        .par_iter()
        .filter_map(|r| r.attribute(entity_field).map(entity_id))
        .try_fold(HashMap::new, |mut counts, id| {
            *counts.entry(id?).or_insert(0) += 1;
            Ok(counts)
        }).try_reduce(HashMap::new, |mut counts, other| {
            for (id, count) in other {
                *counts.entry(id).or_insert(0) += count;
            }
            Ok(counts)
        })
}

/// Assigns entities to partitions using a broadcast map, hashing unknown ones.
#[derive(Clone, Debug)]
pub struct EntityPartitioner {
    n_partitions: usize,
    partition_map: Broadcast<PartitionMap>,
}

#[derive(Serialize, Deserialize)]
struct SavedPartitioner {
    n_partitions: usize,
    partition_map: PartitionMap,
}

impl EntityPartitioner {
    pub fn n_partitions(&self) -> usize {
        self.n_partitions
    }

    pub fn partition_map(&self) -> &PartitionMap {
        self.partition_map.value()
    }

    pub fn partition_of(&self, entity: &str) -> usize {
        match self.partition_map.get(entity) {
            Some(&p) => p,
            None => {
                trace!("Entity {} not in partition map, hashing", entity);
                hash_partition(entity, self.n_partitions)
            }
        }
    }

    pub fn partition_of_value(&self, value: &Value) -> Result<usize> {
        entity_id(value).map(|id| self.partition_of(id))
    }

    /// Drop the broadcast partition map. The partitioner is unusable afterwards.
    pub fn release(self) {
        self.partition_map.release();
    }

    pub fn save<W: io::Write>(&self, writer: W) -> io::Result<()> {
        info!("Saving partition map...");
        let start_t = time::precise_time_s();

        let saved = SavedPartitioner {
            n_partitions: self.n_partitions,
            partition_map: self.partition_map.value().clone(),
        };
        bincode::serialize_into(writer, &saved)
            .or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))?;

        info!(
            "Partition map saved; it took {:.2}s",
            time::precise_time_s() - start_t
        );
        Ok(())
    }

    pub fn load<R: io::Read>(reader: R) -> io::Result<Self> {
        info!("Loading partition map...");
        let start_t = time::precise_time_s();

        let saved: SavedPartitioner = bincode::deserialize_from(reader)
            .or_else(|e| Err(io::Error::new(io::ErrorKind::Other, e)))?;
        if saved.n_partitions == 0
            || saved
                .partition_map
                .values()
                .any(|&p| p >= saved.n_partitions)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Partition map holds out-of-range partitions",
            ));
        }

        info!(
            "Partition map with {} entities loaded; it took {:.2}s",
            saved.partition_map.len(),
            time::precise_time_s() - start_t
        );
        Ok(Self {
            n_partitions: saved.n_partitions,
            partition_map: Broadcast::new(saved.partition_map),
        })
    }
}

/// Deterministic fallback partition for entities without an explicit assignment.
///
///     # use photon_game::partition::hash_partition;
///     assert_eq!(hash_partition("user42", 7), hash_partition("user42", 7));
///     assert!(hash_partition("user42", 7) < 7);
///
pub fn hash_partition(entity: &str, n_partitions: usize) -> usize {
    hash32_with_seed(&entity, 0) as usize % n_partitions
}

impl PartialEq for EntityPartitioner {
    fn eq(&self, other: &Self) -> bool {
        self.partition_map() == other.partition_map()
    }
}

impl Eq for EntityPartitioner {}

impl Hash for EntityPartitioner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent over the map entries
        let mut sum = 0u64;
        for entry in self.partition_map() {
            let mut hasher = DefaultHasher::new();
            entry.hash(&mut hasher);
            sum = sum.wrapping_add(hasher.finish());
        }
        state.write_u64(sum);
    }
}

#[cfg(test)]
mod tests {
    use super::{hash_partition, PartitionerConfig};
    use crate::data::{Record, Value};
    use crate::error::Error;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn records_with_counts(counts: &[(&str, usize)]) -> Vec<Record> {
        let mut records = Vec::new();
        for &(entity, count) in counts {
            for _ in 0..count {
                let uid = records.len() as u64;
                records.push(Record::new(uid, 0.).with_attribute("userId", entity));
            }
        }
        records
    }

    fn config(n_partitions: usize, capacity: usize, bound: Option<usize>) -> PartitionerConfig {
        PartitionerConfig {
            n_partitions,
            capacity,
            active_data_upper_bound: bound,
        }
    }

    fn hash_of<T: Hash>(t: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        t.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_build_greedy_trace() {
        let records = records_with_counts(&[("a", 100), ("b", 50), ("c", 50), ("d", 1)]);
        let (partitioner, loads) = config(2, 10, None)
            .build_with_loads(&records, "userId")
            .unwrap();
        assert_eq!(
            &hashmap! {
                "a".to_owned() => 0,
                "b".to_owned() => 1,
                "c".to_owned() => 1,
                "d".to_owned() => 0,
            },
            partitioner.partition_map()
        );
        assert_eq!(vec![101, 100], loads);
    }

    #[test]
    fn test_build_skips_records_without_entity() {
        let mut records = records_with_counts(&[("a", 3)]);
        records.push(Record::new(99, 0.).with_attribute("itemId", "i1"));
        let partitioner = config(2, 10, None).build(&records, "userId").unwrap();
        assert_eq!(&hashmap! {"a".to_owned() => 0}, partitioner.partition_map());
    }

    #[test]
    fn test_build_truncates_to_capacity() {
        let records = records_with_counts(&[("a", 5), ("b", 4), ("c", 3), ("d", 2)]);
        let partitioner = config(3, 2, None).build(&records, "userId").unwrap();
        let map = partitioner.partition_map();
        assert_eq!(2, map.len());
        assert!(map.contains_key("a") && map.contains_key("b"));
        assert_eq!(hash_partition("d", 3), partitioner.partition_of("d"));
    }

    #[test]
    fn test_build_clamps_weights_to_active_bound() {
        // Without the bound, b and c would share a partition opposite a
        let records = records_with_counts(&[("a", 100), ("b", 10), ("c", 10)]);
        let (partitioner, loads) = config(2, 10, Some(10))
            .build_with_loads(&records, "userId")
            .unwrap();
        assert_eq!(vec![20, 10], loads);
        assert_eq!(0, partitioner.partition_of("a"));
        assert_eq!(1, partitioner.partition_of("b"));
        assert_eq!(0, partitioner.partition_of("c"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let records = records_with_counts(&[("a", 1)]);
        match config(0, 10, None).build(&records, "userId") {
            Err(Error::InvalidConfiguration { param, .. }) => assert_eq!("n_partitions", param),
            other => panic!("unexpected result {:?}", other),
        }
        match config(2, 0, None).build(&records, "userId") {
            Err(Error::InvalidConfiguration { param, .. }) => assert_eq!("capacity", param),
            other => panic!("unexpected result {:?}", other),
        }
        match config(2, 10, Some(0)).build(&records, "userId") {
            Err(Error::InvalidConfiguration { param, .. }) => {
                assert_eq!("active_data_upper_bound", param)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_build_rejects_non_string_entity() {
        let records = vec![Record::new(0, 0.).with_attribute("userId", Value::Int(3))];
        match config(2, 10, None).build(&records, "userId") {
            Err(Error::TypeMismatch { found, .. }) => assert_eq!("integer", found),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_partition_of_falls_back_to_hash() {
        let records = records_with_counts(&[("a", 2)]);
        let partitioner = config(5, 10, None).build(&records, "userId").unwrap();
        for entity in &["x", "y", "zzz", ""] {
            let p = partitioner.partition_of(entity);
            assert!(p < 5);
            assert_eq!(hash_partition(entity, 5), p);
            assert_eq!(p, partitioner.partition_of(entity));
        }
    }

    #[test]
    fn test_partition_of_value() {
        let records = records_with_counts(&[("a", 2), ("b", 1)]);
        let partitioner = config(2, 10, None).build(&records, "userId").unwrap();
        assert_eq!(Ok(0), partitioner.partition_of_value(&Value::from("a")));
        assert!(partitioner.partition_of_value(&Value::Float(1.)).is_err());
    }

    #[test]
    fn test_equality_by_map_contents() {
        let records = records_with_counts(&[("a", 3), ("b", 2), ("c", 1)]);
        let p1 = config(2, 10, None).build(&records, "userId").unwrap();
        let p2 = config(2, 10, None).build(&records, "userId").unwrap();
        let p3 = config(3, 10, None).build(&records, "userId").unwrap();
        assert_eq!(p1, p2);
        assert_eq!(hash_of(&p1), hash_of(&p2));
        assert_ne!(p1, p3);
        p1.release();
        assert_eq!(1, p2.partition_of("b"));
    }

    #[test]
    fn test_hash_partition_is_fixed_across_processes() {
        assert_eq!(1, hash_partition("user42", 7));
        assert_eq!(5, hash_partition("user42", 16));
        assert_eq!(2, hash_partition("x", 7));
        assert_eq!(0, hash_partition("zzz", 5));
        assert_eq!(0, hash_partition("", 3));
    }

    #[test]
    fn test_check_loaded() {
        let records = records_with_counts(&[("a", 3), ("b", 2), ("c", 1)]);
        let partitioner = config(2, 10, None).build(&records, "userId").unwrap();
        assert_eq!(Ok(()), config(2, 10, Some(5)).check_loaded(&partitioner));
        match config(3, 10, None).check_loaded(&partitioner) {
            Err(Error::InvalidConfiguration { param, .. }) => assert_eq!("n_partitions", param),
            other => panic!("unexpected result {:?}", other),
        }
        match config(2, 2, None).check_loaded(&partitioner) {
            Err(Error::InvalidConfiguration { param, .. }) => assert_eq!("capacity", param),
            other => panic!("unexpected result {:?}", other),
        }
        match config(2, 10, Some(0)).check_loaded(&partitioner) {
            Err(Error::InvalidConfiguration { param, .. }) => {
                assert_eq!("active_data_upper_bound", param)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_save_load() {
        let records = records_with_counts(&[("a", 3), ("b", 2), ("c", 1)]);
        let partitioner = config(2, 10, None).build(&records, "userId").unwrap();
        let mut buffer = Vec::new();
        partitioner.save(&mut buffer).unwrap();
        let loaded = super::EntityPartitioner::load(&buffer[..]).unwrap();
        assert_eq!(partitioner, loaded);
        assert_eq!(2, loaded.n_partitions());
    }
}
