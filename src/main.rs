use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use bptree::buffer::BufferPoolManager;
use bptree::common::{BTreeOptions, DEFAULT_BUFFER_POOL_SIZE, DEFAULT_LRUK_K};
use bptree::index::{encode_integer_key, BTreeIndex, IntegerComparator};
use bptree::storage::disk::DiskManager;
use bptree::{RecordId, Result};

const DEMO_DB: &str = "demo.db";

/// Usage: `bptree [DB_FILE] [KEYS_FILE]`
///
/// Without a keys file the demo inserts and removes a range of integers on a
/// small-fanout tree and prints it after each phase.
fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();

    let mut args = std::env::args().skip(1);
    let db_path = args.next().unwrap_or_else(|| DEMO_DB.to_string());
    let keys_file = args.next();

    let disk_manager = Arc::new(DiskManager::new(&db_path)?);
    let bpm = Arc::new(BufferPoolManager::new(
        DEFAULT_BUFFER_POOL_SIZE,
        DEFAULT_LRUK_K,
        disk_manager,
    ));
    info!(path = %db_path, frames = DEFAULT_BUFFER_POOL_SIZE, "demo.open");

    match keys_file {
        Some(path) => {
            let mut index =
                BTreeIndex::new("bulk", bpm.clone(), IntegerComparator, BTreeOptions::default())?;
            let inserted = index.insert_from_file(&path)?;
            let stats = index.verify_integrity()?;
            info!(
                inserted,
                height = stats.height,
                leaves = stats.leaf_count,
                "demo.bulk_load"
            );
        }
        None => run_demo(&bpm)?,
    }

    bpm.flush_all_pages()?;
    if db_path == DEMO_DB {
        drop(bpm);
        std::fs::remove_file(&db_path)?;
    }
    Ok(())
}

fn run_demo(bpm: &Arc<BufferPoolManager>) -> Result<()> {
    let options = BTreeOptions::default().with_max_sizes(4, 4);
    let mut index = BTreeIndex::new("demo", Arc::clone(bpm), IntegerComparator, options)?;

    for value in 1..=20 {
        let key = encode_integer_key(value, options.key_size);
        index.insert(&key, RecordId::from_integer(value))?;
    }
    println!("After inserting 1..=20:\n{}\n", index.to_string_by_level(false)?);

    for value in (1..=20).filter(|v| v % 3 != 0) {
        let key = encode_integer_key(value, options.key_size);
        index.remove(&key)?;
    }
    println!("After removing all but multiples of 3:\n{}\n", index.to_string_by_level(true)?);

    let remaining = index
        .begin()?
        .map(|entry| entry.map(|(key, _)| IntegerComparator::decode(&key)))
        .collect::<Result<Vec<_>>>()?;
    println!("Scan: {remaining:?}");

    let stats = index.verify_integrity()?;
    info!(
        keys = stats.key_count,
        height = stats.height,
        "demo.done"
    );
    Ok(())
}
