//! Session plumbing around the encoder and decoder.
//!
//! The decode graph wants a single writer, so the session owns the decoder
//! and everything concurrent stays on the supply side: block fetch and
//! parsing happen off the critical path, candidates arrive through a
//! channel or a store listing, and the session feeds them into the graph
//! one at a time. Cancellation and the block budget both land as clean
//! terminal results rather than hangs; fountain codes give no hard bound
//! on how many blocks a decode needs, so every session must have a way
//! out.
//!
//! On the encode side, blocks are independent and the store is
//! content-addressed, so persistence fans out concurrently and one failed
//! write never aborts its siblings.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::config::DecodeConfig;
use crate::constants::PERSIST_CONCURRENCY;
use crate::decoder::PeelingDecoder;
use crate::encoder::Encoder;
use crate::error::DecodeError;
use crate::error::EncodeError;
use crate::error::SessionError;
use crate::record::source_hash;
use crate::record::EncodedBlock;
use crate::store::BlockStore;

/// Outcome of persisting one encoded set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    /// Blocks newly written.
    pub stored: u64,
    /// Blocks already present (content-addressed dedup).
    pub deduplicated: u64,
    /// Blocks whose write failed; the rest of the set is unaffected.
    pub failed: u64,
}

/// A retryable decode run: owns the peeling graph, survives exhaustion,
/// and can be driven from a channel or straight from a block store.
pub struct DecodeSession {
    decoder: PeelingDecoder,
    cancel: CancellationToken,
}

impl DecodeSession {
    /// Create a session with its own cancellation token.
    pub fn new(config: DecodeConfig) -> Result<Self, DecodeError> {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a session tied to an external cancellation token, typically
    /// a deadline the caller arms elsewhere.
    pub fn with_cancellation(config: DecodeConfig, cancel: CancellationToken) -> Result<Self, DecodeError> {
        Ok(Self {
            decoder: PeelingDecoder::new(config)?,
            cancel,
        })
    }

    /// Token that aborts this session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The underlying decoder, for progress inspection between retries.
    pub fn decoder(&self) -> &PeelingDecoder {
        &self.decoder
    }

    /// Drain candidate blocks from `rx` until the buffer is reconstructed,
    /// the channel closes short (`Exhausted`), the block budget runs out,
    /// or the session is cancelled.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<EncodedBlock>) -> Result<Vec<u8>, SessionError> {
        loop {
            if self.decoder.is_complete() {
                break;
            }
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(
                        resolved = self.decoder.resolved_count(),
                        required = self.decoder.required(),
                        "decode session cancelled"
                    );
                    return Err(SessionError::Cancelled {
                        resolved: self.decoder.resolved_count(),
                        required: self.decoder.required(),
                    });
                }
                block = rx.recv() => match block {
                    Some(block) => {
                        self.decoder.ingest(block)?;
                    }
                    None => break,
                },
            }
        }
        Ok(self.decoder.finish()?)
    }

    /// Fetch and ingest every persisted block of `source` until the buffer
    /// is reconstructed. Unreadable or unparseable records are skipped so
    /// one bad file never sinks the set; only a failed listing is fatal.
    #[instrument(skip_all, fields(source = %source.to_hex()))]
    pub async fn decode_from_store(
        &mut self,
        store: &dyn BlockStore,
        source: &blake3::Hash,
    ) -> Result<Vec<u8>, SessionError> {
        let keys = store.list_blocks(source).await?;
        debug!(candidates = keys.len(), "decoding from store listing");
        for key in keys {
            if self.decoder.is_complete() {
                break;
            }
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled {
                    resolved: self.decoder.resolved_count(),
                    required: self.decoder.required(),
                });
            }
            let bytes = match store.get_block(&key).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(%key, error = %e, "skipping unreadable block");
                    continue;
                }
            };
            let block = match EncodedBlock::from_bytes(&bytes) {
                Ok(block) => block,
                Err(e) => {
                    warn!(%key, error = %e, "skipping unparseable record");
                    continue;
                }
            };
            self.decoder.ingest(block)?;
        }
        Ok(self.decoder.finish()?)
    }
}

/// Persist an encoded set concurrently, isolating per-block failures.
pub async fn persist_blocks(
    store: Arc<dyn BlockStore>,
    source: blake3::Hash,
    blocks: Vec<EncodedBlock>,
) -> PersistSummary {
    let semaphore = Arc::new(Semaphore::new(PERSIST_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for (index, block) in blocks.into_iter().enumerate() {
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            store.put_block(&source, index as u64, &block).await
        });
    }

    let mut summary = PersistSummary::default();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(put)) if put.was_new => summary.stored += 1,
            Ok(Ok(_)) => summary.deduplicated += 1,
            Ok(Err(e)) => {
                summary.failed += 1;
                warn!(error = %e, "block persist failed");
            }
            Err(e) => {
                summary.failed += 1;
                warn!(error = %e, "block persist task failed");
            }
        }
    }
    summary
}

/// Encode `data` and persist the resulting set, returning the source hash
/// the blocks are keyed under.
pub async fn encode_to_store(
    encoder: &Encoder,
    store: Arc<dyn BlockStore>,
    data: &[u8],
) -> Result<(blake3::Hash, PersistSummary), EncodeError> {
    let source = source_hash(data);
    let blocks = encoder.encode(data)?;
    debug!(
        source = %source.to_hex(),
        blocks = blocks.len(),
        "persisting encoded set"
    );
    let summary = persist_blocks(store, source, blocks).await;
    Ok((source, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncodeConfig;
    use crate::store::MemoryBlockStore;

    fn encoder(block_size: u32, redundancy: f64) -> Encoder {
        Encoder::new(EncodeConfig {
            block_size,
            redundancy_factor: redundancy,
            ..EncodeConfig::default()
        })
        .expect("encoder")
    }

    #[tokio::test]
    async fn encode_persist_decode_round_trip() {
        let data: Vec<u8> = (0..7777u32).map(|i| (i * 31 % 256) as u8).collect();
        let store = Arc::new(MemoryBlockStore::new());

        let (source, summary) = encode_to_store(&encoder(500, 10.0), store.clone(), &data)
            .await
            .expect("encode");
        assert_eq!(summary.failed, 0);
        assert!(summary.stored > 0);

        let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");
        let decoded = session
            .decode_from_store(store.as_ref(), &source)
            .await
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[tokio::test]
    async fn channel_fed_session_round_trip() {
        let data = vec![0xCDu8; 4096];
        let blocks = encoder(512, 10.0).encode(&data).expect("encode");

        let (tx, rx) = mpsc::channel(16);
        let feeder = tokio::spawn(async move {
            for block in blocks {
                if tx.send(block).await.is_err() {
                    break;
                }
            }
        });

        let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");
        let decoded = session.run(rx).await.expect("decode");
        assert_eq!(decoded, data);
        feeder.await.expect("feeder");
    }

    #[tokio::test]
    async fn short_channel_reports_exhaustion() {
        let data = vec![0x77u8; 8000];
        let blocks = encoder(1000, 8.0).encode(&data).expect("encode");

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            // Far fewer blocks than K=8 can ever need.
            for block in blocks.into_iter().take(2) {
                let _ = tx.send(block).await;
            }
        });

        let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");
        let err = session.run(rx).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Decode {
                source: DecodeError::Exhausted { .. }
            }
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_the_session() {
        let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");
        let cancel = session.cancellation_token();

        // Channel stays open and empty; only cancellation can end the run.
        let (_tx, rx) = mpsc::channel::<EncodedBlock>(1);
        cancel.cancel();
        let err = session.run(rx).await.unwrap_err();
        assert!(matches!(err, SessionError::Cancelled { resolved: 0, required: 0 }));
    }

    #[tokio::test]
    async fn re_persisting_a_set_is_idempotent() {
        let data = vec![0x3Cu8; 3000];
        let blocks = encoder(1000, 4.0).encode(&data).expect("encode");
        let store = Arc::new(MemoryBlockStore::new());
        let source = source_hash(&data);

        let first = persist_blocks(store.clone(), source, blocks.clone()).await;
        assert_eq!(first.stored, blocks.len() as u64);
        assert_eq!(first.failed, 0);

        let second = persist_blocks(store.clone(), source, blocks.clone()).await;
        assert_eq!(second.deduplicated, blocks.len() as u64);
        assert_eq!(second.stored, 0);
        assert_eq!(store.len(), blocks.len());
    }
}
