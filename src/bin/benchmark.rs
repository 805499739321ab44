//! Load generator for a running RespVault server
//!
//! Runs a fixed set of workloads against `--addr` and prints throughput and
//! latency percentiles for each.

use clap::Parser;
use respvault::{Client, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Barrier;

#[derive(Parser, Debug)]
#[command(name = "respvault-benchmark")]
#[command(about = "Measure RespVault latency and throughput")]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4567")]
    addr: String,

    /// Requests per single-connection workload
    #[arg(short = 'n', long, default_value_t = 10_000)]
    requests: usize,

    /// Connections opened by the concurrent workload
    #[arg(short, long, default_value_t = 32)]
    clients: usize,

    /// Size of each stored value in bytes
    #[arg(long, default_value_t = 64)]
    value_size: usize,
}

/// Per-request latencies for one workload
#[derive(Default)]
struct Samples(Vec<Duration>);

impl Samples {
    fn with_capacity(n: usize) -> Self {
        Self(Vec::with_capacity(n))
    }

    async fn time<T, F>(&mut self, request: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let out = request.await?;
        self.0.push(started.elapsed());
        Ok(out)
    }

    fn extend(&mut self, other: Samples) {
        self.0.extend(other.0);
    }

    /// Nearest-rank percentile; expects sorted, non-empty samples
    fn percentile(&self, q: f64) -> Duration {
        let idx = ((self.0.len() - 1) as f64 * q).round() as usize;
        self.0[idx]
    }

    fn report(mut self, workload: &str, elapsed: Duration) {
        if self.0.is_empty() {
            println!("{:<22} no requests", workload);
            return;
        }
        self.0.sort_unstable();
        let pick = |q: f64| self.percentile(q).as_secs_f64() * 1e6;
        println!(
            "{:<22} {:>8} req {:>10.0} req/s   p50 {:>7.1}us  p95 {:>7.1}us  p99 {:>7.1}us  max {:>8.1}us",
            workload,
            self.0.len(),
            self.0.len() as f64 / elapsed.as_secs_f64(),
            pick(0.50),
            pick(0.95),
            pick(0.99),
            pick(1.0),
        );
    }
}

async fn bench_set(client: &mut Client, n: usize, value: &[u8]) -> Result<()> {
    let mut samples = Samples::with_capacity(n);
    let started = Instant::now();
    for i in 0..n {
        samples.time(client.set(format!("bench:{}", i), value)).await?;
    }
    samples.report("SET", started.elapsed());
    Ok(())
}

/// Reads keys written by `bench_set`, then keys nobody wrote
async fn bench_get(client: &mut Client, n: usize) -> Result<()> {
    for (workload, prefix) in [("GET (hit)", "bench"), ("GET (miss)", "absent")] {
        let mut samples = Samples::with_capacity(n);
        let started = Instant::now();
        for i in 0..n {
            samples.time(client.get(format!("{}:{}", prefix, i))).await?;
        }
        samples.report(workload, started.elapsed());
    }
    Ok(())
}

async fn bench_empty_values(client: &mut Client, n: usize) -> Result<()> {
    let mut samples = Samples::with_capacity(n * 2);
    let started = Instant::now();
    for i in 0..n {
        let key = format!("empty:{}", i);
        samples.time(client.set(&key, b"")).await?;
        samples.time(client.get(&key)).await?;
    }
    samples.report("SET+GET (empty)", started.elapsed());
    Ok(())
}

async fn bench_batches(client: &mut Client, n: usize, value: &[u8]) -> Result<()> {
    for batch in [1usize, 10, 100] {
        let rounds = (n / batch).max(1);
        let mut writes = Samples::with_capacity(rounds);
        let mut reads = Samples::with_capacity(rounds);
        let started = Instant::now();
        for round in 0..rounds {
            let keys: Vec<String> = (0..batch)
                .map(|j| format!("batch:{}:{}", round, j))
                .collect();
            writes
                .time(client.mset(keys.iter().map(|key| (key, value))))
                .await?;
            reads.time(client.mget(&keys)).await?;
        }
        let elapsed = started.elapsed();
        writes.report(&format!("MSET x{}", batch), elapsed);
        reads.report(&format!("MGET x{}", batch), elapsed);
    }
    Ok(())
}

/// Eight reads, one write and one delete out of every ten requests
async fn bench_mixed(client: &mut Client, n: usize, value: &[u8]) -> Result<()> {
    let mut samples = Samples::with_capacity(n);
    let started = Instant::now();
    for i in 0..n {
        let key = format!("mixed:{}", i % 1000);
        match i % 10 {
            0 => {
                samples.time(client.set(&key, value)).await?;
            }
            9 => {
                samples.time(client.delete(&key)).await?;
            }
            _ => {
                samples.time(client.get(&key)).await?;
            }
        }
    }
    samples.report("mixed", started.elapsed());
    Ok(())
}

/// One connection per task, all released at once
async fn bench_concurrent(addr: &str, clients: usize, n: usize, value: &[u8]) -> Result<()> {
    let per_client = (n / clients.max(1)).max(1);
    let start_line = Arc::new(Barrier::new(clients + 1));
    let value = Arc::new(value.to_vec());
    let mut tasks = Vec::with_capacity(clients);

    for id in 0..clients {
        let addr = addr.to_string();
        let start_line = Arc::clone(&start_line);
        let value = Arc::clone(&value);
        tasks.push(tokio::spawn(async move {
            // Reach the barrier even if connecting failed, or nobody starts
            let client = Client::connect(&addr).await;
            start_line.wait().await;
            let mut client = client?;
            let mut samples = Samples::with_capacity(per_client * 2);
            for i in 0..per_client {
                let key = format!("conc:{}:{}", id, i);
                samples.time(client.set(&key, value.as_slice())).await?;
                samples.time(client.get(&key)).await?;
            }
            client.close().await?;
            Ok::<_, respvault::RespVaultError>(samples)
        }));
    }

    start_line.wait().await;
    let started = Instant::now();
    let mut all = Samples::default();
    for task in tasks {
        match task.await {
            Ok(Ok(samples)) => all.extend(samples),
            Ok(Err(e)) => eprintln!("client failed: {}", e),
            Err(e) => eprintln!("client task panicked: {}", e),
        }
    }
    all.report(&format!("SET+GET x{} conns", clients), started.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let value = vec![b'v'; args.value_size];

    println!(
        "RespVault benchmark against {} ({} requests, {}-byte values)",
        args.addr, args.requests, args.value_size
    );

    let mut client = Client::connect(&args.addr).await?;
    bench_set(&mut client, args.requests, &value).await?;
    bench_get(&mut client, args.requests).await?;
    bench_empty_values(&mut client, args.requests / 2).await?;
    bench_batches(&mut client, args.requests, &value).await?;
    bench_mixed(&mut client, args.requests, &value).await?;
    client.close().await?;

    bench_concurrent(&args.addr, args.clients, args.requests, &value).await?;
    Ok(())
}
