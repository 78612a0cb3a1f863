use facerec_core::{Embedding, EmbeddingExtractor, ExtractError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("could not start engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Extract {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Embedding>, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Extract the embedding of the most prominent face, `None` if there is none.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Option<Embedding>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Run `extractor` on a dedicated OS thread.
///
/// Model sessions need exclusive access, so every extraction is serialized
/// through this thread; requests queue on a bounded channel.
pub fn spawn_engine(mut extractor: Box<dyn EmbeddingExtractor>) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facerec-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        let started = std::time::Instant::now();
                        let result = extractor.extract(&image);
                        tracing::debug!(
                            bytes = image.len(),
                            face = matches!(result, Ok(Some(_))),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "extraction finished"
                        );
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl EmbeddingExtractor for Echo {
        fn extract(&mut self, image_bytes: &[u8]) -> Result<Option<Embedding>, ExtractError> {
            if image_bytes.is_empty() {
                return Ok(None);
            }
            Ok(Some(Embedding::new(image_bytes.iter().map(|&b| b as f32).collect())))
        }
    }

    #[tokio::test]
    async fn test_extract_roundtrip() {
        let engine = spawn_engine(Box::new(Echo)).unwrap();
        let embedding = engine.extract(vec![1, 2, 3]).await.unwrap().unwrap();
        assert_eq!(embedding.values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_no_face() {
        let engine = spawn_engine(Box::new(Echo)).unwrap();
        assert!(engine.extract(Vec::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_callers() {
        let engine = spawn_engine(Box::new(Echo)).unwrap();
        let tasks: Vec<_> = (1..=8u8)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.extract(vec![i]).await })
            })
            .collect();

        for (i, task) in tasks.into_iter().enumerate() {
            let embedding = task.await.unwrap().unwrap().unwrap();
            assert_eq!(embedding.values, vec![(i + 1) as f32]);
        }
    }
}
