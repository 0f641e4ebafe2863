use crate::{HeapSnapshot, Idom};
use anyhow::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes one `id,dominator,shallow,retained` row per reachable object,
/// ascending by id. `dominator` is empty for objects retained by the roots.
pub fn write_csv<W: Write>(snapshot: &HeapSnapshot, out: &mut W) -> Result<()> {
    writeln!(out, "id,dominator,shallow,retained")?;
    for node in snapshot.nodes() {
        let dominator = match node.immediate_dominator() {
            None => continue,
            Some(Idom::SuperRoot) => String::new(),
            Some(Idom::Node(d)) => d.0.to_string(),
        };
        writeln!(
            out,
            "{},{},{},{}",
            node.id().0,
            dominator,
            node.shallow_size(),
            node.retained_size()
        )?;
    }
    Ok(())
}

/// The same table as [`write_csv`], as a dataframe with a nullable
/// `dominator` column.
pub fn dominator_frame(snapshot: &HeapSnapshot) -> Result<DataFrame> {
    let mut ids: Vec<u64> = vec![];
    let mut dominators: Vec<Option<u64>> = vec![];
    let mut shallow: Vec<u64> = vec![];
    let mut retained: Vec<u64> = vec![];
    for node in snapshot.nodes() {
        let dominator = match node.immediate_dominator() {
            None => continue,
            Some(Idom::SuperRoot) => None,
            Some(Idom::Node(d)) => Some(d.0),
        };
        ids.push(node.id().0);
        dominators.push(dominator);
        shallow.push(node.shallow_size());
        retained.push(node.retained_size());
    }
    let df = df! {
        "id" => ids,
        "dominator" => dominators,
        "shallow" => shallow,
        "retained" => retained
    }?;
    Ok(df)
}

pub fn write_parquet(snapshot: &HeapSnapshot, path: impl AsRef<Path>) -> Result<()> {
    let mut df = dominator_frame(snapshot)?;
    let file = File::create(path)?;
    let writer = ParquetWriter::new(file);
    writer.finish(&mut df)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancelToken, NullProgress, ObjectRecord, Record, RootKind};

    fn snapshot() -> HeapSnapshot {
        HeapSnapshot::load(
            vec![
                Record::root(1, RootKind::Thread),
                Record::Instance(ObjectRecord::new(1, 10).field("b", 2).field("c", 3)),
                Record::Instance(ObjectRecord::new(2, 20).field("c", 3)),
                Record::Instance(ObjectRecord::new(3, 5)),
                Record::Instance(ObjectRecord::new(4, 1)),
            ],
            &mut NullProgress,
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn csv_lists_reachable_objects() {
        let mut out = vec![];
        write_csv(&snapshot(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id,dominator,shallow,retained\n1,,10,35\n2,1,20,20\n3,1,5,5\n"
        );
    }

    #[test]
    fn parquet_table_matches_csv() {
        let df = dominator_frame(&snapshot()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.column("dominator").unwrap().null_count(), 1);
        let dir = tempfile::tempdir().unwrap();
        write_parquet(&snapshot(), dir.path().join("dominators.parquet")).unwrap();
    }
}
