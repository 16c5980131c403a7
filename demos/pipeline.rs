//! # Rate-limited pipeline
//!
//! Demonstrates basic taskqueue features:
//! - Rate-limited batches (`limited.batch.*` events)
//! - Sync and async handlers, failure and skip
//! - A per-task timeout that times out the run
//! - Built-in `LogWriter` rendering every event through `tracing`
//!
//! Run with: `cargo run --example pipeline --features logging`

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use taskqueue::{Handler, LogWriter, RunOutcome, Runner, RunnerConfig, Subscribe, TaskConfig};

fn fetch(id: u64, total: &Arc<AtomicU64>) -> TaskConfig {
    let total = Arc::clone(total);
    TaskConfig::named(format!("fetch #{id}")).handler(Handler::future(move |ctx| {
        let total = Arc::clone(&total);
        async move {
            tokio::time::sleep(Duration::from_millis(20 * id)).await;
            let sum = total.fetch_add(id, Ordering::Relaxed) + id;
            println!("📥 {}: running sum {sum}", ctx.name());
        }
    }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let runner = Runner::builder(RunnerConfig {
        name: "pipeline".into(),
        ..RunnerConfig::default()
    })
    .with_subscribers(subs)
    .build();
    runner.set_rate_limit(3, Duration::from_millis(250))?;
    runner.set_max_concurrent(2);

    let total = Arc::new(AtomicU64::new(0));
    for id in 1..=7 {
        runner.add(fetch(id, &total))?;
    }
    runner.add(TaskConfig::named("validate").handler(Handler::sync(|ctx| {
        println!("🔍 {}: rejecting input", ctx.name());
        ctx.fail();
    })))?;
    let optional = runner.add(Handler::sync(|_| println!("never printed")))?;
    optional.skip();

    let plan = runner.plan();
    println!(
        "📋 {} tasks, at least {:?}",
        plan.tasks_remaining,
        plan.minimum_duration.unwrap_or_default()
    );

    let outcome = runner.run(false).await;
    println!(
        "✅ first pass: {outcome:?}, sum = {}, {:.0}% settled",
        total.load(Ordering::Relaxed),
        runner.progress().ratio() * 100.0
    );

    // Second pass: a slow task trips its own timeout, so "report" never starts.
    runner.remove_rate_limit();
    runner.add(
        TaskConfig::named("slow")
            .timeout(Duration::from_millis(100))
            .handler(Handler::future(|_| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
            })),
    )?;
    runner.add(TaskConfig::named("report").handler(Handler::sync(|_| println!("never printed"))))?;
    let outcome = runner.run_sync().await;
    assert_eq!(outcome, RunOutcome::TimedOut);
    println!("⏱️  second pass: {outcome:?} (status = {})", runner.status());

    for row in runner.list() {
        println!("   {:>2}  {:<12} {}", row.number, row.name, row.status);
    }

    runner.shutdown().await;
    Ok(())
}
