//! Persistence actor for debounced mixer snapshots using sled
//!
//! Save requests are held as a pending snapshot; a newer request within the
//! debounce window replaces it (last-write-wins). Once the window expires
//! without new requests the pending snapshot is written to sled. Fader moves
//! therefore cost at most one write per window.

use super::MixerSnapshot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

const COMMAND_QUEUE: usize = 100;

const SNAPSHOT_KEY: &[u8] = b"mixer_snapshot";

#[derive(Debug)]
pub enum PersistenceCommand {
    Save(MixerSnapshot),
    Load(oneshot::Sender<Option<MixerSnapshot>>),
    Flush(oneshot::Sender<Result<()>>),
    /// Write what is queued, then stop
    Shutdown,
}

/// Where the engine sends snapshots and reads the startup state from
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Queue a snapshot for saving
    async fn save(&self, snapshot: MixerSnapshot) -> Result<()>;

    /// The last stored snapshot, if any
    async fn load(&self) -> Result<Option<MixerSnapshot>>;

    /// Write any queued snapshot now
    async fn flush(&self) -> Result<()>;
}

/// Owns the sled database; writes the newest snapshot once saves go quiet
pub struct PersistenceActor {
    db: sled::Db,
    command_rx: mpsc::Receiver<PersistenceCommand>,
    /// Newest unsaved snapshot
    pending: Option<MixerSnapshot>,
    /// When `pending` goes to disk; pushed back by every save
    write_deadline: Option<tokio::time::Instant>,
    debounce: Duration,
    writes: u64,
}

/// Handle to the persistence actor, cheap to clone
#[derive(Clone)]
pub struct PersistenceActorHandle {
    cmd_tx: mpsc::Sender<PersistenceCommand>,
}

impl PersistenceActor {
    /// Open the sled database and spawn the actor.
    ///
    /// A `debounce_ms` of 0 writes every snapshot immediately.
    pub fn spawn(db_path: impl AsRef<Path>, debounce_ms: u64) -> Result<PersistenceActorHandle> {
        let db_path = db_path.as_ref();
        let db = sled::open(db_path)
            .with_context(|| format!("Failed to open sled database at: {}", db_path.display()))?;
        info!(path = %db_path.display(), "Snapshot database opened");

        let (cmd_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let actor = PersistenceActor {
            db,
            command_rx,
            pending: None,
            write_deadline: None,
            debounce: Duration::from_millis(debounce_ms),
            writes: 0,
        };
        tokio::spawn(actor.run());

        Ok(PersistenceActorHandle { cmd_tx })
    }

    async fn run(mut self) {
        debug!(debounce = ?self.debounce, "Persistence actor running");

        loop {
            let deadline = self.write_deadline;
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(PersistenceCommand::Save(snapshot)) => self.queue(snapshot).await,
                    Some(PersistenceCommand::Load(reply)) => {
                        let _ = reply.send(self.read_stored());
                    }
                    Some(PersistenceCommand::Flush(reply)) => {
                        let _ = reply.send(self.write_pending().await);
                    }
                    Some(PersistenceCommand::Shutdown) | None => break,
                },
                _ = sleep_until_deadline(deadline) => {
                    if let Err(e) = self.write_pending().await {
                        error!("Debounced snapshot write failed: {:#}", e);
                    }
                }
            }
        }

        if let Err(e) = self.write_pending().await {
            error!("Final snapshot write failed: {:#}", e);
        }
        info!(writes = self.writes, "Persistence actor stopped");
    }

    /// Replace the pending snapshot (last write wins) and restart the window
    async fn queue(&mut self, snapshot: MixerSnapshot) {
        trace!(timestamp = snapshot.timestamp, "Snapshot queued");
        self.pending = Some(snapshot);
        if self.debounce.is_zero() {
            if let Err(e) = self.write_pending().await {
                error!("Snapshot write failed: {:#}", e);
            }
        } else {
            self.write_deadline = Some(tokio::time::Instant::now() + self.debounce);
        }
    }

    async fn write_pending(&mut self) -> Result<()> {
        self.write_deadline = None;
        let Some(snapshot) = self.pending.take() else {
            return Ok(());
        };

        let json = serde_json::to_vec(&snapshot).context("Failed to serialize mixer snapshot")?;
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), sled::Error> {
            db.insert(SNAPSHOT_KEY, json)?;
            db.flush()?;
            Ok(())
        })
        .await
        .context("Snapshot write task panicked")?
        .context("Failed to write snapshot to sled")?;

        self.writes += 1;
        trace!(write = self.writes, "Snapshot written");
        Ok(())
    }

    /// The stored snapshot; unreadable data counts as none
    fn read_stored(&self) -> Option<MixerSnapshot> {
        let bytes = match self.db.get(SNAPSHOT_KEY) {
            Ok(bytes) => bytes?,
            Err(e) => {
                error!("Snapshot read from sled failed: {}", e);
                return None;
            }
        };
        serde_json::from_slice::<MixerSnapshot>(&bytes)
            .map_err(|e| warn!("Stored snapshot is not decodable, ignoring it: {}", e))
            .ok()
    }
}

async fn sleep_until_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl PersistenceActorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PersistenceCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| anyhow::anyhow!("persistence actor is gone"))?;
        rx.await.context("persistence actor dropped the request")
    }

    /// Queue a snapshot; it reaches disk once saves pause for the debounce window
    pub async fn save_snapshot(&self, snapshot: MixerSnapshot) -> Result<()> {
        self.cmd_tx
            .send(PersistenceCommand::Save(snapshot))
            .await
            .map_err(|_| anyhow::anyhow!("persistence actor is gone"))
    }

    /// The snapshot on disk (a queued one is not visible until written)
    pub async fn load_snapshot(&self) -> Result<Option<MixerSnapshot>> {
        self.request(PersistenceCommand::Load).await
    }

    /// Write the queued snapshot now
    pub async fn flush(&self) -> Result<()> {
        self.request(PersistenceCommand::Flush).await?
    }

    /// Write the queued snapshot and stop the actor
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(PersistenceCommand::Shutdown);
    }
}

#[async_trait]
impl SnapshotStore for PersistenceActorHandle {
    async fn save(&self, snapshot: MixerSnapshot) -> Result<()> {
        self.save_snapshot(snapshot).await
    }

    async fn load(&self) -> Result<Option<MixerSnapshot>> {
        self.load_snapshot().await
    }

    async fn flush(&self) -> Result<()> {
        PersistenceActorHandle::flush(self).await
    }
}
