use std::io;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use crate::model::Record;
use crate::wal::Wal;

use super::{KeyValueStore, StoreError};

enum WalCommand {
    Append {
        record: Record,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Record>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while one fsync is in flight are
/// written together and share the next fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = match cmd {
            WalCommand::Append { record, response } => vec![(record, response)],
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { record, response }) => batch.push((record, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    debug!("wal writer stopped");
}

fn flush_batch(wal: &mut Wal, batch: &[(Record, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let append_err = batch
        .iter()
        .find_map(|(record, _)| wal.append_buffered(record).err());
    // Flush even after a failed append so half-written bytes do not ride
    // along with the next batch.
    let flush_err = wal.flush_sync().err();
    match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// Durable key-value store: an in-memory map rebuilt from a write-ahead log.
///
/// `put` returns once the record is fsynced. Must be opened inside a Tokio
/// runtime; the writer runs as a spawned task.
pub struct WalKv {
    entries: DashMap<(String, String), String>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Puts hold it shared, compaction exclusive, so a compaction snapshot
    /// never misses a record that is already in the log.
    compaction_gate: RwLock<()>,
}

impl WalKv {
    pub fn open(path: PathBuf) -> io::Result<Self> {
        let records = Wal::replay(&path)?;
        let wal = Wal::open(&path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let entries = DashMap::new();
        for record in records {
            match record {
                Record::Put {
                    namespace,
                    key,
                    value,
                } => {
                    entries.insert((namespace, key), value);
                }
            }
        }
        debug!(path = %path.display(), keys = entries.len(), "wal store replayed");

        Ok(Self {
            entries,
            wal_tx,
            compaction_gate: RwLock::new(()),
        })
    }

    async fn wal_append(&self, record: Record) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                record,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Closed("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Closed("WAL writer dropped response"))??;
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> Result<u64, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| StoreError::Closed("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Closed("WAL writer dropped response"))
    }

    /// Rewrite the log as one record per live key.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.write().await;
        let records: Vec<Record> = self
            .entries
            .iter()
            .map(|e| Record::Put {
                namespace: e.key().0.clone(),
                key: e.key().1.clone(),
                value: e.value().clone(),
            })
            .collect();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                records,
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Closed("WAL writer shut down"))?;
        rx.await
            .map_err(|_| StoreError::Closed("WAL writer dropped response"))??;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for WalKv {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn put(&self, namespace: &str, key: &str, value: String) -> Result<(), StoreError> {
        let _gate = self.compaction_gate.read().await;
        self.wal_append(Record::Put {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.clone(),
        })
        .await?;
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}
