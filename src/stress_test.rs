use async_stream::stream;
use cnp_sdk::prelude::*;
use cnp_sdk::BufferMode;
use futures::stream::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shape of one stress run.
#[derive(Clone, Copy, Debug)]
pub struct StressConfig {
    pub producers: usize,
    pub consumers: usize,
    pub objects_per_producer: usize,
    pub max_object_size: usize,
    pub block_size: usize,
    pub capacity: usize,
    pub mode: BufferMode,
}

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub config: StressConfig,
    pub objects: usize,
    pub expected_blocks: usize,
    pub received_blocks: usize,
    pub verify_failures: usize,
    pub total_bytes: usize,
    pub total_time: Duration,
    pub avg_request_time: Duration,
    pub blocks_per_second: f64,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                        ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Producers / Consumers:     {:>30} ║", format!("{} / {}", self.config.producers, self.config.consumers));
        println!("║  Buffer:                    {:>30} ║", format!("{:?} x{}", self.config.mode, self.config.capacity));
        println!("║  Objects Published:         {:>30} ║", self.objects);
        println!("║  Blocks Expected/Received:  {:>30} ║", format!("{} / {}", self.expected_blocks, self.received_blocks));
        println!("║  Verification Failures:     {:>30} ║", self.verify_failures);
        println!("║  Bytes Published:           {:>30} ║", self.total_bytes);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Request Time:      {:>28}µs ║", self.avg_request_time.as_micros());
        println!("║  Blocks/Second:             {:>30.0} ║", self.blocks_per_second);
        println!("╚════════════════════════════════════════════════════════════╝");
    }

    pub fn is_complete(&self) -> bool {
        self.received_blocks == self.expected_blocks && self.verify_failures == 0
    }
}

/// Generator that yields (producer, content) pairs for the workload
fn workload_generator(config: StressConfig, seed: u64) -> impl Stream<Item = (usize, Vec<u8>)> {
    stream! {
        let mut rng = StdRng::seed_from_u64(seed);
        for producer in 0..config.producers {
            for _ in 0..config.objects_per_producer {
                let len = rng.gen_range(1..=config.max_object_size);
                let mut content = vec![0u8; len];
                rng.fill(content.as_mut_slice());
                yield (producer, content);
            }
        }
    }
}

/// Blocks the segmenter will produce for `len` bytes.
fn blocks_for(len: usize, block_size: usize) -> usize {
    if len < block_size {
        1
    } else {
        len.div_ceil(block_size)
    }
}

/// Concurrent producers segment and publish random objects into one buffer
/// while consumers pull and verify every block.
pub async fn stress_test_publish(config: StressConfig, seed: u64) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Publish/Pull Stress Test                            ║");
    println!("║  Producers: {} | Consumers: {} | Objects/Producer: {} ║",
             config.producers, config.consumers, config.objects_per_producer);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let buffer = FlowControlledBuffer::new(
        BufferConfig::builder()
            .capacity(config.capacity)
            .mode(config.mode)
            .put_timeout(Duration::from_secs(30))
            .drain_timeout(Duration::from_secs(5))
            .build(),
    );
    let keys = Arc::new(MemoryKeyStore::generate());
    let root = Name::parse("/stress").unwrap_or_default();

    println!("\n[Phase 1/3] Generating workload...");
    let mut work: Vec<Vec<Vec<u8>>> = vec![Vec::new(); config.producers];
    let mut workload = Box::pin(workload_generator(config, seed));
    while let Some((producer, content)) = workload.next().await {
        work[producer].push(content);
    }
    let objects: usize = work.iter().map(Vec::len).sum();
    let total_bytes: usize = work.iter().flatten().map(Vec::len).sum();
    let expected_blocks: usize = work
        .iter()
        .flatten()
        .map(|c| blocks_for(c.len(), config.block_size))
        .sum();
    println!("[Phase 1/3] ✓ {} objects, {} blocks", objects, expected_blocks);

    println!("[Phase 2/3] Publishing and pulling...");
    let received = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));

    let mut consumers = vec![];
    for _ in 0..config.consumers {
        let buffer = buffer.clone();
        let root = root.clone();
        let received = Arc::clone(&received);
        let failures = Arc::clone(&failures);
        consumers.push(tokio::spawn(async move {
            let mut request_times = vec![];
            while received.load(Ordering::Relaxed) < expected_blocks {
                let request_start = Instant::now();
                match buffer
                    .handle_request(root.clone(), Duration::from_millis(50))
                    .await
                {
                    Ok(Some(block)) => {
                        request_times.push(request_start.elapsed());
                        if verify_self_certified(&block).is_err() {
                            failures.fetch_add(1, Ordering::Relaxed);
                        }
                        let n = received.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % 1000 == 0 {
                            println!("  Blocks received: {}/{}", n, expected_blocks);
                        }
                    }
                    Ok(None) => tokio::task::yield_now().await,
                    Err(e) => {
                        warn!(error = %e, "consumer stopped");
                        break;
                    }
                }
            }
            request_times
        }));
    }

    let mut producers = vec![];
    for (idx, objects) in work.into_iter().enumerate() {
        let buffer = buffer.clone();
        let keys = Arc::clone(&keys);
        let root = root.clone();
        producers.push(tokio::spawn(async move {
            for (obj, content) in objects.into_iter().enumerate() {
                // One segmenter per object: numbering is per stream.
                let mut segmenter = Segmenter::block_segmenter(
                    buffer.clone(),
                    Arc::clone(&keys),
                    config.block_size,
                    1,
                )?;
                let name = root
                    .append(format!("p{}", idx).as_str())
                    .append(format!("o{}", obj).as_str());
                segmenter.finish(&name, &content, PutOptions::new()).await?;
            }
            Ok::<(), Error>(())
        }));
    }

    for handle in producers {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "producer failed"),
            Err(e) => warn!(error = %e, "producer panicked"),
        }
    }

    let mut request_times = vec![];
    let wait = tokio::time::timeout(Duration::from_secs(60), futures::future::join_all(consumers)).await;
    match wait {
        Ok(results) => {
            for times in results.into_iter().flatten() {
                request_times.extend(times);
            }
        }
        Err(_) => warn!("consumers did not finish in time"),
    }
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Closing buffer...");
    match buffer.close().await {
        Ok(report) => info!(?report, "buffer closed"),
        Err(e) => warn!(error = %e, "close failed"),
    }
    println!("[Phase 3/3] ✓ Completed");

    let total_time = start.elapsed();
    let received_blocks = received.load(Ordering::Relaxed);
    let avg_request_time = if !request_times.is_empty() {
        request_times.iter().sum::<Duration>() / request_times.len() as u32
    } else {
        Duration::ZERO
    };

    StressTestStats {
        config,
        objects,
        expected_blocks,
        received_blocks,
        verify_failures: failures.load(Ordering::Relaxed),
        total_bytes,
        total_time,
        avg_request_time,
        blocks_per_second: received_blocks as f64 / total_time.as_secs_f64(),
    }
}

/// Run the same workload against growing buffer capacities.
pub async fn stress_test_capacity_scaling(max_capacity: usize, step: usize) {
    println!("\n{:>10} | {:>10} | {:>12} | {:>12}", "Capacity", "Blocks", "Time (ms)", "Blocks/sec");
    println!("{:-<10}-+-{:-<10}-+-{:-<12}-+-{:-<12}", "", "", "", "");

    let mut capacity = step.max(1);
    while capacity <= max_capacity {
        let config = StressConfig {
            producers: 4,
            consumers: 4,
            objects_per_producer: 20,
            max_object_size: 8 * 1024,
            block_size: 1024,
            capacity,
            mode: BufferMode::BestEffort,
        };
        let stats = stress_test_publish(config, 7).await;
        println!(
            "{:>10} | {:>10} | {:>12.2} | {:>12.0}",
            capacity,
            stats.received_blocks,
            stats.total_time.as_secs_f64() * 1000.0,
            stats.blocks_per_second
        );
        capacity *= 2;
    }
}
