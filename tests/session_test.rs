//! Decode session budget and cancellation behavior.

use std::time::Duration;

use fountain_store::DecodeConfig;
use fountain_store::DecodeError;
use fountain_store::DecodeSession;
use fountain_store::EncodeConfig;
use fountain_store::EncodedBlock;
use fountain_store::Encoder;
use fountain_store::SessionError;
use tokio::sync::mpsc;

fn blocks(len: usize, block_size: u32, redundancy: f64) -> Vec<EncodedBlock> {
    let data = vec![0xA5u8; len];
    Encoder::new(EncodeConfig {
        block_size,
        redundancy_factor: redundancy,
        ..EncodeConfig::default()
    })
    .expect("encoder")
    .encode(&data)
    .expect("encode")
}

#[tokio::test]
async fn block_budget_terminates_the_session() {
    let blocks = blocks(10_000, 1000, 12.0);

    let mut session = DecodeSession::new(DecodeConfig {
        // Fewer than K = 10 examined blocks can never resolve the buffer.
        max_blocks: Some(5),
        ..DecodeConfig::default()
    })
    .expect("session");

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        for block in blocks {
            if tx.send(block).await.is_err() {
                break;
            }
        }
    });

    let err = session.run(rx).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Decode {
            source: DecodeError::BudgetExhausted { budget: 5, .. }
        }
    ));
}

#[tokio::test]
async fn deadline_cancellation_reports_progress() {
    let blocks = blocks(10_000, 1000, 12.0);

    let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");
    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    // Feed a handful of blocks, then leave the channel open so only the
    // deadline can end the session.
    let (tx, rx) = mpsc::channel(8);
    let feeder = tokio::spawn(async move {
        for block in blocks.into_iter().take(4) {
            if tx.send(block).await.is_err() {
                return;
            }
        }
        // Hold the sender until well past the deadline.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let err = session.run(rx).await.unwrap_err();
    let SessionError::Cancelled { resolved, required } = err else {
        panic!("expected cancellation");
    };
    assert_eq!(required, 10);
    assert!(resolved < required);
    feeder.abort();
}

#[tokio::test]
async fn session_survives_exhaustion_and_retries() {
    let mut all = blocks(6_000, 1000, 10.0);
    let rest = all.split_off(2);

    let mut session = DecodeSession::new(DecodeConfig::default()).expect("session");

    // First attempt: too few blocks, the channel closes early.
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        for block in all {
            let _ = tx.send(block).await;
        }
    });
    let err = session.run(rx).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Decode {
            source: DecodeError::Exhausted { .. }
        }
    ));

    // Retry with the surviving remainder on the same session.
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        for block in rest {
            if tx.send(block).await.is_err() {
                break;
            }
        }
    });
    let decoded = session.run(rx).await.expect("retry decode");
    assert_eq!(decoded, vec![0xA5u8; 6_000]);
}
