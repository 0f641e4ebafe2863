#[macro_use]
extern crate log;

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;

use heapdom::cli::*;
use heapdom::*;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

fn load(path: &str, cancel: &CancelToken) -> Result<HeapSnapshot> {
    let start = Instant::now();
    let records = RecordStream::from_binpb_zst(path)?.into_records()?;
    info!(
        "Decoded {} records from {} in {} ms",
        records.len(),
        path,
        start.elapsed().as_micros() as f64 / 1000f64
    );
    let snapshot = HeapSnapshot::load(records, &mut LogProgress::new(path), cancel)?;
    if cfg!(debug_assertions) {
        let sanity_traced_objects = sanity_trace(&snapshot)?;
        info!(
            "Sanity trace reporting {} reachable objects",
            sanity_traced_objects
        );
    }
    Ok(snapshot)
}

fn print_path(snapshot: &HeapSnapshot, id: ObjectId) -> Result<()> {
    for step in snapshot.shortest_path_to_root(id)? {
        let via = step.field.map(|f| f.to_string()).unwrap_or_default();
        let class = snapshot.class_name(step.id)?.unwrap_or("?");
        println!(
            "{}{}\t{}\t{}",
            if step.is_dominator { "*" } else { " " },
            step.id,
            class,
            via
        );
    }
    Ok(())
}

fn print_nodes<'a>(nodes: impl IntoIterator<Item = NodeRef<'a>>, top: usize) {
    println!("id\tkind\tshallow\tretained");
    for node in nodes.into_iter().take(top) {
        println!(
            "{}\t{}\t{}\t{}",
            node.id(),
            node.kind(),
            node.shallow_size(),
            node.retained_size()
        );
    }
}

fn run_compare(args: &Args) -> Result<()> {
    if args.paths.len() != 2 {
        bail!("compare needs a baseline and a current record stream");
    }
    let baseline = RecordStream::from_binpb_zst(&args.paths[0])?.into_records()?;
    let current = RecordStream::from_binpb_zst(&args.paths[1])?.into_records()?;
    let (a, b) = load_pair(
        baseline,
        current,
        &mut LogProgress::new(&args.paths[0]),
        &mut LogProgress::new(&args.paths[1]),
        &CancelToken::new(),
        &CancelToken::new(),
    );
    let comparison = compare(&a.into_result()?, &b.into_result()?);
    println!("============================ Tabulate Statistics ============================");
    println!("baseline\tcurrent\tonly_baseline\tonly_current");
    println!(
        "{}\t{}\t{}\t{}",
        comparison.total_baseline,
        comparison.total_current,
        comparison.only_in_baseline.len(),
        comparison.only_in_current.len()
    );
    println!("-------------------------- End Tabulate Statistics --------------------------");
    println!("id\tbaseline\tcurrent\tdelta");
    for d in comparison.deltas.iter().take(args.top) {
        println!("{}\t{}\t{}\t{:+}", d.id, d.baseline, d.current, d.delta());
    }
    Ok(())
}

fn get_git_info() -> String {
    match (built_info::GIT_COMMIT_HASH, built_info::GIT_DIRTY) {
        (Some(hash), Some(dirty)) => format!(
            "{}{}",
            hash.split_at(7).0,
            if dirty { "-dirty" } else { "" }
        ),
        (Some(hash), None) => format!("{}{}", hash.split_at(7).0, "-?"),
        _ => "unknown-git-version".to_string(),
    }
}

pub fn main() -> Result<()> {
    env_logger::init();
    println!("heapdom {}", get_git_info());
    let args = Args::parse();
    if let Some(Commands::Compare) = args.command {
        return run_compare(&args);
    }
    let cancel = CancelToken::new();
    let snapshots = args
        .paths
        .iter()
        .map(|p| load(p, &cancel))
        .collect::<Result<Vec<_>>>()?;
    let snapshot = &snapshots[0];
    match &args.command {
        None | Some(Commands::Summary) => {
            for (path, s) in args.paths.iter().zip(&snapshots) {
                print_summary(path, s, args.top);
            }
        }
        Some(Commands::Dominator(a)) => match snapshot.dominator(a.id)? {
            Some(d) => println!("{}\t{}\t{}", d.id(), d.kind(), d.retained_size()),
            None => println!("<root>"),
        },
        Some(Commands::Path(a)) => print_path(snapshot, a.id)?,
        Some(Commands::Children(a)) => print_nodes(snapshot.children(a.id)?, args.top),
        Some(Commands::Retained(a)) => println!("{}", snapshot.retained_size(a.id)?),
        Some(Commands::Export(a)) => match a.format {
            ExportFormat::Csv => {
                let mut output_file = BufWriter::new(File::create(&a.output)?);
                write_csv(snapshot, &mut output_file)?;
            }
            ExportFormat::Parquet => write_parquet(snapshot, &a.output)?,
        },
        Some(Commands::Depth(a)) => {
            let all: Vec<&HeapSnapshot> = snapshots.iter().collect();
            dominator_depth(&all, &a.output)?;
        }
        Some(Commands::Compare) => panic!("Incorrect dispatch"),
    }
    Ok(())
}
