use crate::{HeapSnapshot, Idom};
use anyhow::Result;
use polars::functions::concat_df_diagonal;
use polars::prelude::*;
use std::{fs::File, iter, path::Path};

type Depth = u64;

/// Dominator-tree depth histogram of each snapshot, tagged with its position
/// in `snapshots`.
pub fn dominator_depth_frame(snapshots: &[&HeapSnapshot]) -> Result<DataFrame> {
    let mut dfs = vec![];
    for (i, snapshot) in snapshots.iter().enumerate() {
        let depth_hist = snapshot.dominator_depths();
        debug_assert_eq!(
            depth_hist.values().sum::<u64>() as usize,
            snapshot.reachable_count()
        );
        let (depth_vec, count_vec): (Vec<Depth>, Vec<u64>) = depth_hist.into_iter().unzip();
        let mut df = df! {
            "depth" => depth_vec,
            "counts" => count_vec
        }?;
        let iteration_series: Series = iter::repeat_n(i as u64, df.height()).collect();
        df.with_column(Series::new("iteration", iteration_series))?;
        dfs.push(df);
    }
    let mut df = concat_df_diagonal(&dfs)?;
    df.as_single_chunk_par();
    Ok(df)
}

pub fn dominator_depth(snapshots: &[&HeapSnapshot], output: impl AsRef<Path>) -> Result<()> {
    let mut df = dominator_depth_frame(snapshots)?;
    let file = File::create(output)?;
    let writer = ParquetWriter::new(file);
    writer.finish(&mut df)?;
    Ok(())
}

/// Prints the per-snapshot totals and the largest retainers.
pub fn print_summary(path: &str, snapshot: &HeapSnapshot, top: usize) {
    println!("============================ Tabulate Statistics ============================");
    println!("path\tobjects\treachable\troots\tdangling\tretained\tpasses");
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        path,
        snapshot.node_count(),
        snapshot.reachable_count(),
        snapshot.roots().len(),
        snapshot.dangling_roots().len(),
        snapshot.total_retained(),
        snapshot.dominator_passes()
    );
    println!("-------------------------- End Tabulate Statistics --------------------------");
    println!("id\tkind\tclass\tshallow\tretained\tdominator");
    for node in snapshot.top_retainers(top) {
        let class = snapshot.class_name(node.id()).ok().flatten().unwrap_or("?");
        let dominator = match node.immediate_dominator() {
            Some(Idom::Node(d)) => d.to_string(),
            _ => "<root>".to_string(),
        };
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            node.id(),
            node.kind(),
            class,
            node.shallow_size(),
            node.retained_size(),
            dominator
        );
    }
}
