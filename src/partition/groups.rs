use super::EntityPartitioner;
use crate::data::{REId, Record};
use crate::error::Result;
use fasthash::murmur3::hash32_with_seed;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

/// Records grouped per entity, each entity living in exactly one partition.
#[derive(Debug)]
pub struct EntityGroups<'a> {
    /// Active records of each entity, indexed by partition.
    pub partitions: Vec<BTreeMap<REId, Vec<&'a Record>>>,
    /// Number of records dropped by the active-data upper bound.
    pub n_passive: usize,
}

impl<'a> EntityGroups<'a> {
    /// Shuffle records into the partitions chosen by `partitioner`.
    ///
    /// Records lacking `entity_field` are skipped. With an active-data upper bound,
    /// each entity keeps a random sample of at most that many records; the sample
    /// only depends on `seed` and the entity, not on how the work was scheduled.
    pub fn build(
        records: &'a [Record],
        partitioner: &EntityPartitioner,
        entity_field: &str,
        active_data_upper_bound: Option<usize>,
        seed: u64,
    ) -> Result<Self> {
        info!(
            "Grouping {} records by {} into {} partitions",
            records.len(),
            entity_field,
            partitioner.n_partitions()
        );
        let start_t = time::precise_time_s();

        let per_entity = group_by_entity(records, entity_field)?;

        let mut partitions = vec![BTreeMap::new(); partitioner.n_partitions()];
        let mut n_passive = 0;
        for (entity, mut group) in per_entity {
            if let Some(bound) = active_data_upper_bound {
                if group.len() > bound {
                    n_passive += group.len() - bound;
                    group = sample_active(group, bound, entity_seed(seed, entity));
                }
            }
            partitions[partitioner.partition_of(entity)].insert(entity.to_owned(), group);
        }

        info!(
            "Grouped records; {} passive records dropped; it took {:.2}s",
            n_passive,
            time::precise_time_s() - start_t
        );
        Ok(Self {
            partitions,
            n_passive,
        })
    }

    pub fn n_entities(&self) -> usize {
        self.partitions.iter().map(|p| p.len()).sum()
    }

    /// Number of active records in each partition.
    pub fn partition_sizes(&self) -> Vec<u64> {
        self.partitions
            .iter()
            .map(|p| p.values().map(|g| g.len() as u64).sum())
            .collect()
    }
}

fn group_by_entity<'a>(
    records: &'a [Record],
    entity_field: &str,
) -> Result<HashMap<&'a str, Vec<&'a Record>>> {
    records
        .par_iter()
        .filter_map(|r| {
            r.attribute(entity_field)
                .map(|v| super::entity_id(v).map(|id| (id, r)))
        }).try_fold(HashMap::new, |mut groups, pair| {
            let (id, r) = pair?;
            groups.entry(id).or_insert_with(Vec::new).push(r);
            Ok(groups)
        }).try_reduce(HashMap::new, |mut groups, other| {
            // Reduction keeps input order, so appending preserves record order
            for (id, mut group) in other {
                groups.entry(id).or_insert_with(Vec::new).append(&mut group);
            }
            Ok(groups)
        })
}

fn entity_seed(seed: u64, entity: &str) -> u64 {
    seed ^ u64::from(hash32_with_seed(&entity, 0))
}

/// Keep `bound` records picked at random, in their original order.
fn sample_active(group: Vec<&Record>, bound: usize, seed: u64) -> Vec<&Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices = rand::seq::index::sample(&mut rng, group.len(), bound).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|i| group[i]).collect()
}
