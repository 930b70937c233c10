use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use uuid::Uuid;

use percept_descriptor::{ClassificationElement, ClassificationFactory, Descriptor};

use crate::classifier::Classifier;
use crate::error::ClassifierError;

/// Options for [classify_async].
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Recompute and replace already-populated elements.
    pub overwrite: bool,
    /// Maximum in-flight compute items. 0 means the machine's available
    /// parallelism.
    pub concurrency: usize,
    /// Run each compute item on the blocking OS-thread pool instead of as an
    /// ordinary task. Use for classifiers whose compute holds native state
    /// or otherwise must not stall the async runtime.
    pub dedicated_pool: bool,
    /// Log queue/completion progress at most once per interval. Disabled
    /// when unset.
    pub progress_interval: Option<Duration>,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            concurrency: 0,
            dedicated_pool: false,
            progress_interval: None,
        }
    }
}

/// Classify a batch of descriptors with bounded fan-out.
///
/// The input is streamed: each descriptor's element is resolved as it
/// arrives, and elements already populated (without `overwrite`) are marked
/// complete without submitting work. Submitted items run concurrently up to
/// `opts.concurrency`; a failing item is logged with its descriptor identity
/// and does not abort its siblings.
///
/// Returns the uuid→element mapping once every submitted item has finished.
/// If any item failed, the call returns [`ClassifierError::Batch`] instead;
/// results of the items that succeeded were still written through `factory`
/// and stay readable there.
pub async fn classify_async<C, D, F>(
    classifier: Arc<C>,
    descriptors: impl IntoIterator<Item = D>,
    factory: &F,
    opts: ClassifyOptions,
) -> Result<HashMap<Uuid, ClassificationElement>, ClassifierError>
where
    C: Classifier<D> + 'static,
    D: Descriptor + Send + 'static,
    F: ClassificationFactory + ?Sized,
{
    let width = if opts.concurrency == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        opts.concurrency
    };
    let sem = Arc::new(Semaphore::new(width));

    info!(
        classifier = classifier.name(),
        width, "async classifying descriptors"
    );

    let mut results: HashMap<Uuid, ClassificationElement> = HashMap::new();
    let mut tasks: JoinSet<(Uuid, Result<HashMap<String, f64>, ClassifierError>)> =
        JoinSet::new();

    let mut scanned = 0usize;
    let mut queued = 0usize;
    let start = Instant::now();
    let mut last_report = start;

    for d in descriptors {
        let uuid = d.uuid();
        let elem = factory.new_classification(classifier.name(), uuid);
        let fresh = opts.overwrite || !elem.has_classifications();
        results.insert(uuid, elem);
        scanned += 1;

        if fresh {
            queued += 1;
            let c = classifier.clone();
            let sem = sem.clone();
            let dedicated = opts.dedicated_pool;
            tasks.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => {
                        return (uuid, Err(ClassifierError::Compute("worker pool closed".into())));
                    }
                };
                if dedicated {
                    match tokio::task::spawn_blocking(move || (uuid, c.classify_one(&d))).await {
                        Ok(out) => out,
                        Err(e) => (uuid, Err(ClassifierError::Compute(e.to_string()))),
                    }
                } else {
                    (uuid, c.classify_one(&d))
                }
            });
        }

        if let Some(interval) = opts.progress_interval {
            let now = Instant::now();
            if now.duration_since(last_report) >= interval {
                debug!(
                    scanned,
                    queued,
                    per_sec = scanned as f64 / start.elapsed().as_secs_f64(),
                    "queueing progress"
                );
                last_report = now;
            }
        }
    }

    let total = queued;
    let mut completed = 0usize;
    let mut failed = 0usize;
    let collect_start = Instant::now();
    let mut last_report = collect_start;

    while let Some(joined) = tasks.join_next().await {
        completed += 1;
        match joined {
            Ok((uuid, Ok(map))) => {
                if let Some(elem) = results.get(&uuid) {
                    if let Err(e) = elem.set_classification(map) {
                        failed += 1;
                        error!(uuid = %uuid, error = %e, "storing classification failed");
                    }
                }
            }
            Ok((uuid, Err(e))) => {
                failed += 1;
                error!(uuid = %uuid, error = %e, "descriptor classification failed");
            }
            Err(e) => {
                // Worker panicked or was cancelled before reporting identity.
                failed += 1;
                error!(error = %e, "classification worker aborted");
            }
        }

        if let Some(interval) = opts.progress_interval {
            let now = Instant::now();
            if now.duration_since(last_report) >= interval {
                debug!(
                    completed,
                    total,
                    per_sec = completed as f64 / collect_start.elapsed().as_secs_f64(),
                    "collection progress"
                );
                last_report = now;
            }
        }
    }

    if failed > 0 {
        return Err(ClassifierError::Batch { failed, total });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use percept_descriptor::{MemoryClassificationFactory, VectorDescriptor};

    use crate::classifier::tests::CentroidClassifier;

    fn trained() -> Arc<CentroidClassifier> {
        Arc::new(CentroidClassifier::trained(&[
            ("x", vec![1.0, 0.0]),
            ("y", vec![0.0, 1.0]),
        ]))
    }

    fn descriptors(n: usize) -> Vec<VectorDescriptor> {
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                VectorDescriptor::from_vec(vec![t, 1.0 - t])
            })
            .collect()
    }

    #[tokio::test]
    async fn test_batch_matches_synchronous() {
        let c = trained();
        let ds = descriptors(32);

        let async_factory = MemoryClassificationFactory::new();
        let results = classify_async(
            c.clone(),
            ds.clone(),
            &async_factory,
            ClassifyOptions {
                concurrency: 4,
                progress_interval: Some(Duration::from_millis(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.len(), ds.len());

        let sync_factory = MemoryClassificationFactory::new();
        for d in &ds {
            let expect = c.classify(d, &sync_factory, false).unwrap();
            let got = &results[&d.uuid()];
            assert_eq!(got.classification(), expect.classification());
        }
    }

    #[tokio::test]
    async fn test_partial_failures_aggregate() {
        let c = trained();
        let mut ds = descriptors(10);
        // Empty vectors make the compute primitive fail.
        ds.push(VectorDescriptor::from_vec(vec![]));
        ds.push(VectorDescriptor::from_vec(vec![]));
        let good: Vec<_> = ds[..10].to_vec();

        let factory = MemoryClassificationFactory::new();
        let err = classify_async(c.clone(), ds, &factory, ClassifyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Batch {
                failed: 2,
                total: 12
            }
        ));

        // Successful items were written through the factory and match what a
        // direct synchronous classify would produce.
        let sync_factory = MemoryClassificationFactory::new();
        for d in &good {
            let elem = factory.new_classification(c.name(), d.uuid());
            assert!(elem.has_classifications());
            let expect = c.classify(d, &sync_factory, false).unwrap();
            assert_eq!(elem.classification(), expect.classification());
        }
    }

    #[tokio::test]
    async fn test_populated_elements_skip_compute() {
        let c = trained();
        let ds = descriptors(8);
        let factory = MemoryClassificationFactory::new();

        for d in &ds[..3] {
            c.classify(d, &factory, false).unwrap();
        }
        let before = c.computes.load(Ordering::SeqCst);
        assert_eq!(before, 3);

        let results = classify_async(c.clone(), ds.clone(), &factory, ClassifyOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 8);
        // Only the five unpopulated descriptors were computed.
        assert_eq!(c.computes.load(Ordering::SeqCst), 8);

        // With overwrite, everything recomputes.
        classify_async(
            c.clone(),
            ds,
            &factory,
            ClassifyOptions {
                overwrite: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(c.computes.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_dedicated_pool() {
        let c = trained();
        let ds = descriptors(16);
        let factory = MemoryClassificationFactory::new();

        let results = classify_async(
            c,
            ds,
            &factory,
            ClassifyOptions {
                dedicated_pool: true,
                concurrency: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 16);
        assert!(results.values().all(|e| e.has_classifications()));
    }
}
