//! Rebuilding a database from a checkpoint.

use crate::catalog::Catalog;
use crate::checkpoint::{CheckpointImage, CheckpointStore, JournalEntry};
use crate::config::DatabaseConfig;
use crate::error::CoreResult;
use crate::stats::DatabaseStats;
use crate::txn::{Clocks, Transaction, TransactionManager, TxnWrites};
use std::sync::Arc;

/// The state a database starts from.
pub(crate) struct Recovered {
    pub(crate) catalog: Catalog,
    pub(crate) txns: TransactionManager,
    pub(crate) checkpoints: CheckpointStore,
}

/// Recovers from the checkpoint `config` names, or the newest of `images`.
/// With no images the database starts empty.
pub(crate) fn recover(
    config: &DatabaseConfig,
    images: Vec<Arc<CheckpointImage>>,
    stats: &Arc<DatabaseStats>,
) -> CoreResult<Recovered> {
    let max_entries = config.leaf_page_max_entries;
    let checkpoints = CheckpointStore::new(images, max_entries, Arc::clone(stats));
    let chosen = match &config.recover_from {
        Some(name) => Some(checkpoints.image(name)?),
        None => checkpoints.newest(),
    };
    let Some(image) = chosen else {
        return Ok(Recovered {
            catalog: Catalog::new(max_entries, Arc::clone(stats)),
            txns: TransactionManager::new(Arc::clone(stats)),
            checkpoints,
        });
    };

    let catalog = Catalog::new(max_entries, Arc::clone(stats));
    for table in &image.tables {
        catalog.restore(
            &table.uri,
            table.config.clone(),
            table.index.clone(),
            table.to_tree(max_entries),
        );
    }
    catalog.link_indexes()?;

    let clocks = Clocks {
        oldest: image.oldest,
        stable: image.stable,
        last_checkpoint: image.stable,
    };
    let txns =
        TransactionManager::with_state(image.next_txn_id.as_u64(), clocks, Arc::clone(stats));

    let mut reinstated = 0;
    for entry in image.journal.entries() {
        let writes = journaled_writes(&catalog, entry)?;
        if config.preserve_prepared {
            let txn = Transaction::recovered(
                entry.txn,
                txns.current_snapshot(entry.txn),
                entry.prepare_ts,
                Some(entry.prepared_id),
                writes,
            );
            txns.adopt_prepared(txn);
            reinstated += 1;
        } else {
            writes.rollback(entry.txn);
            tracing::debug!(txn = %entry.txn, prepared_id = %entry.prepared_id, "rolled back prepared transaction");
        }
    }

    tracing::info!(
        checkpoint = %image.name,
        sequence = image.sequence,
        stable = %image.stable,
        tables = image.tables.len(),
        prepared = image.journal.len(),
        reinstated,
        "recovered from checkpoint"
    );
    Ok(Recovered {
        catalog,
        txns,
        checkpoints,
    })
}

fn journaled_writes(catalog: &Catalog, entry: &JournalEntry) -> CoreResult<TxnWrites> {
    let mut writes = TxnWrites::default();
    for (uri, keys) in &entry.tables {
        let table = catalog.get(uri)?;
        for key in keys {
            writes.record(&table, key.clone());
        }
    }
    Ok(writes)
}
