use cnp_sdk::BufferMode;
use stress_test::{stress_test_capacity_scaling, stress_test_publish, StressConfig};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

fn init_console(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    init_console("warn");

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            PUBLISHER STRESS TESTS                           ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let small = StressConfig {
        producers: 4,
        consumers: 4,
        objects_per_producer: 25,
        max_object_size: 16 * 1024,
        block_size: 1024,
        capacity: 64,
        mode: BufferMode::BestEffort,
    };

    // Test 1: small scale, roomy buffer
    let stats = stress_test_publish(small, 1).await;
    stats.print();
    let mut complete = stats.is_complete();

    // Test 2: tight buffer, producers spend most of their time blocked
    let stats = stress_test_publish(StressConfig { capacity: 4, ..small }, 2).await;
    stats.print();
    complete &= stats.is_complete();

    // Test 3: medium scale
    let medium = StressConfig {
        producers: 10,
        consumers: 10,
        objects_per_producer: 100,
        max_object_size: 32 * 1024,
        block_size: 4096,
        capacity: 256,
        mode: BufferMode::BestEffort,
    };
    let stats = stress_test_publish(medium, 3).await;
    stats.print();
    complete &= stats.is_complete();

    // Test 4: capacity scaling
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (buffer capacity)                ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_capacity_scaling(256, 2).await;

    if complete {
        println!("\n✓ All stress tests completed successfully!");
    } else {
        println!("\n✗ Some blocks were lost or failed verification");
    }
}
