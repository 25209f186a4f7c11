#[macro_use]
extern crate log;
#[macro_use]
extern crate clap;

use photon_game::data::DataSet;
use photon_game::metrics::LoadStats;
use photon_game::partition::{EntityGroups, EntityPartitioner, PartitionerConfig};
use photon_game::score::CoordinateDataScores;
use photon_game::util::draw_async_progress_bar;
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

fn set_num_threads(arg_matches: &clap::ArgMatches) {
    let n_threads = arg_matches
        .value_of("n_threads")
        .and_then(|s| s.parse::<usize>().ok())
        .expect("Failed to parse n_threads");

    rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
        .unwrap();
}

macro_rules! parse_config {
    ($m:ident; $( $v:ident ),+) => {{
        let mut config = PartitionerConfig::default();
        $(
            if let Some($v) = $m.value_of(stringify!($v)) {
                config.$v = $v.parse().expect(&format!("Failed to parse {}", stringify!($v)));
            }
        )*
        config
    }};
}

fn exit_on_error<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    })
}

fn partition(arg_matches: &clap::ArgMatches) {
    set_num_threads(&arg_matches);
    let mut config = parse_config!(arg_matches; n_partitions, capacity);
    config.active_data_upper_bound = arg_matches
        .value_of("active_data_upper_bound")
        .map(|s| s.parse().expect("Failed to parse active_data_upper_bound"));
    let seed = value_t!(arg_matches, "seed", u64).unwrap_or_else(|e| e.exit());

    let records_path = arg_matches.value_of("records").unwrap();
    let entity_field = arg_matches.value_of("field").unwrap();
    let dataset = exit_on_error(DataSet::load_records_file(records_path));

    let partitioner = match arg_matches.value_of("map_path") {
        Some(map_path) if arg_matches.is_present("reuse_map") => {
            let map_file = exit_on_error(File::open(map_path));
            let partitioner = exit_on_error(EntityPartitioner::load(io::BufReader::new(map_file)));
            // Unset flags follow the saved map
            if !arg_matches.is_present("n_partitions") {
                config.n_partitions = partitioner.n_partitions();
            }
            if !arg_matches.is_present("capacity") {
                config.capacity = config.capacity.max(partitioner.partition_map().len());
            }
            exit_on_error(config.check_loaded(&partitioner));
            partitioner
        }
        map_path => {
            let partitioner = exit_on_error(config.build(&dataset.records, entity_field));
            if let Some(map_path) = map_path {
                let map_file = exit_on_error(File::create(map_path));
                exit_on_error(partitioner.save(BufWriter::new(map_file)));
            }
            partitioner
        }
    };

    let groups = exit_on_error(EntityGroups::build(
        &dataset.records,
        &partitioner,
        entity_field,
        config.active_data_upper_bound,
        seed,
    ));

    let (sender, handle) =
        draw_async_progress_bar(groups.partitions.len() as u64, "Summarizing partitions");
    let mut summaries = Vec::new();
    groups
        .partitions
        .par_iter()
        .enumerate()
        .map_with(sender, |sender, (p, partition)| {
            let n_records: usize = partition.values().map(|g| g.len()).sum();
            let largest = partition
                .iter()
                .max_by_key(|(_, g)| g.len())
                .map(|(entity, g)| format!("{} ({})", entity, g.len()))
                .unwrap_or_else(|| "-".to_owned());
            sender.send(1).unwrap();
            (p, partition.len(), n_records, largest)
        }).collect_into_vec(&mut summaries);
    handle.join().unwrap();

    for (p, n_entities, n_records, largest) in &summaries {
        info!(
            "Partition {}: {} entities, {} active records, largest entity {}",
            p, n_entities, n_records, largest
        );
    }
    info!(
        "{} entities in {} partitions, {} passive records; {}",
        groups.n_entities(),
        partitioner.n_partitions(),
        groups.n_passive,
        LoadStats::from_loads(&groups.partition_sizes())
    );
    partitioner.release();
}

fn combine(arg_matches: &clap::ArgMatches) {
    set_num_threads(&arg_matches);
    let left = exit_on_error(CoordinateDataScores::load_scores_file(
        arg_matches.value_of("left").unwrap(),
    ));
    let right = exit_on_error(CoordinateDataScores::load_scores_file(
        arg_matches.value_of("right").unwrap(),
    ));

    let start_t = time::precise_time_s();
    let combined = match arg_matches.value_of("op").unwrap() {
        "add" => &left + &right,
        "subtract" => &left - &right,
        op => {
            error!("Unknown op {}", op);
            process::exit(1);
        }
    };
    info!(
        "Combined {} and {} scores into {}; it took {:.2}s",
        left.len(),
        right.len(),
        combined.materialize(),
        time::precise_time_s() - start_t
    );

    match arg_matches.value_of("out_path") {
        Some(out_path) => {
            let out_file = exit_on_error(File::create(out_path));
            exit_on_error(combined.write_scores(BufWriter::new(out_file)));
        }
        None => {
            let stdout = io::stdout();
            exit_on_error(combined.write_scores(stdout.lock()));
            exit_on_error(io::stdout().flush());
        }
    }
}

fn main() {
    simple_logger::init().unwrap();

    let yaml = load_yaml!("cli.yml");
    let arg_matches = clap::App::from_yaml(yaml).get_matches();

    if let Some(arg_matches) = arg_matches.subcommand_matches("partition") {
        partition(&arg_matches);
    } else if let Some(arg_matches) = arg_matches.subcommand_matches("combine") {
        combine(&arg_matches);
    } else {
        println!("{}", arg_matches.usage());
    }
}
