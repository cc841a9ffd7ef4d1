//! Append-only per-channel block log.
//!
//! Layout of a channel directory:
//!
//! ```text
//! <dir>/LOCK     advisory lock held while the log is open
//! <dir>/TIP      highest committed block number, rewritten atomically
//! <dir>/<n>.blk  canonical encoding of block n
//! ```
//!
//! A block file is made durable before `TIP` is rewritten, so a crash
//! between the two leaves the log readable at the previous tip and the
//! half-appended block invisible.

use crate::errors::StorageError;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vellum_types::{codec, crypto::Hash, Block, GENESIS_PREV_HASH};

struct LogState {
    /// Number the next appended block must carry; equals the height.
    expect: u64,
    tip_hash: Hash,
}

/// The ordered block chain of one channel.
pub struct BlockLog {
    channel_id: String,
    dir: PathBuf,
    state: Mutex<LogState>,
    _lock: File,
}

impl BlockLog {
    /// Open (or initialise) the log at `dir`, replaying the tip checkpoint.
    pub fn open(channel_id: &str, dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked(dir.display().to_string()))?;

        let state = match read_tip(&dir)? {
            Some(tip) => {
                let block = load_block(&dir, tip)?;
                info!(channel = %channel_id, height = tip + 1, "opened block log");
                LogState {
                    expect: tip + 1,
                    tip_hash: block.hash(),
                }
            }
            None => {
                info!(channel = %channel_id, "initialised empty block log");
                LogState {
                    expect: 0,
                    tip_hash: GENESIS_PREV_HASH,
                }
            }
        };

        Ok(Self {
            channel_id: channel_id.to_string(),
            dir,
            state: Mutex::new(state),
            _lock: lock_file,
        })
    }

    /// Whether block 0 has been committed.
    pub fn has_genesis(&self) -> bool {
        self.state.lock().expect > 0
    }

    /// The number of committed blocks; also the next expected number.
    pub fn height(&self) -> u64 {
        self.state.lock().expect
    }

    /// Highest committed block number and its hash, if any.
    pub fn tip(&self) -> Option<(u64, Hash)> {
        let state = self.state.lock();
        if state.expect == 0 {
            None
        } else {
            Some((state.expect - 1, state.tip_hash))
        }
    }

    /// Append the next block. Linkage is validated before any I/O.
    pub fn append(&self, block: &Block) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if block.header.number != state.expect {
            return Err(StorageError::SequenceGap {
                channel: self.channel_id.clone(),
                expected: state.expect,
                received: block.header.number,
            });
        }
        if block.is_genesis() {
            if block.header.prev_block != GENESIS_PREV_HASH {
                return Err(StorageError::BadGenesis {
                    channel: self.channel_id.clone(),
                });
            }
        } else if block.header.prev_block != state.tip_hash {
            return Err(StorageError::HashMismatch {
                channel: self.channel_id.clone(),
                number: block.header.number,
            });
        }

        let bytes = codec::to_bytes(block)?;
        write_atomic(&self.dir.join(format!("{}.blk", block.header.number)), &bytes)?;
        write_atomic(
            &self.dir.join("TIP"),
            block.header.number.to_string().as_bytes(),
        )?;

        state.tip_hash = block.hash();
        state.expect += 1;
        debug!(channel = %self.channel_id, number = block.header.number, "appended block");
        Ok(())
    }

    /// Load a committed block.
    pub fn get(&self, number: u64) -> Result<Block, StorageError> {
        if number >= self.state.lock().expect {
            return Err(StorageError::NotFound { number });
        }
        load_block(&self.dir, number)
    }
}

fn read_tip(dir: &Path) -> Result<Option<u64>, StorageError> {
    let path = dir.join("TIP");
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path)?;
    let tip = text
        .trim()
        .parse::<u64>()
        .map_err(|_| StorageError::Corrupt(format!("unreadable tip checkpoint in {}", dir.display())))?;
    Ok(Some(tip))
}

fn load_block(dir: &Path, number: u64) -> Result<Block, StorageError> {
    let bytes = fs::read(dir.join(format!("{number}.blk")))
        .map_err(|e| StorageError::Corrupt(format!("block {number} unreadable: {e}")))?;
    Ok(codec::from_bytes(&bytes)?)
}

/// Write via a temp file, fsync and rename so readers never observe a
/// partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
