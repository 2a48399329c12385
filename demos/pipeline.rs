//! # Number pipeline
//!
//! Demonstrates basic stepvisor features:
//! - Dependency ordering through capabilities
//! - Action wiring (`create`, `subscribe`, `connect`)
//! - Crash respawn of a failing worker
//! - Runtime setting changes and status lines
//! - Graceful shutdown (Ctrl-C, or automatically after a few seconds)
//!
//! Run with:
//! ```text
//! RUST_LOG=debug cargo run --example pipeline --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use stepvisor::{
    ComponentError, ComponentFn, ComponentSpec, Config, Context, Engine, LogWriter,
    RespawnBackoff, Settings, Subscribe,
};
use tracing_subscriber::EnvFilter;

/// Publishes an increasing number on `numbers` every 100ms.
fn generator() -> ComponentSpec {
    let counter = Arc::new(AtomicU64::new(0));
    ComponentSpec::new(
        ComponentFn::new("generator", move |ctx: &Context| {
            let n = counter.fetch_add(1, Ordering::Relaxed);
            ctx.actions().trigger_with("numbers", n)?;
            std::thread::sleep(Duration::from_millis(100));
            Ok(())
        })
        .provides("numbers")
        .on_update(|ctx| {
            ctx.actions().create("numbers", 0_u64);
            ctx.actions().create("audit", 0_u64);
            ctx.actions().connect("numbers", "audit")?;
            Ok(())
        }),
    )
}

/// Transforms the latest number and fails on every multiple of 13.
fn processor() -> ComponentSpec {
    let settings = Settings::new().with("mode", ["double", "square"], "double");
    let last_seen = Arc::new(AtomicU64::new(u64::MAX));
    ComponentSpec::new(
        ComponentFn::new("processor", move |ctx: &Context| {
            let n = ctx.actions().payload::<u64>("numbers").unwrap_or(0);
            if last_seen.swap(n, Ordering::Relaxed) == n {
                std::thread::sleep(Duration::from_millis(10));
                return Ok(());
            }
            if n > 0 && n % 13 == 0 {
                return Err(ComponentError::fail(format!("unlucky number {n}")));
            }
            let squared = ctx
                .engine()
                .and_then(|e| e.get("processor"))
                .and_then(|c| c.settings().and_then(|s| s.current("mode")))
                .is_some_and(|mode| mode == "square");
            let out = if squared { n * n } else { n * 2 };
            ctx.actions().trigger_with("results", out)?;
            Ok(())
        })
        .provides("results")
        .depends_on("numbers")
        .with_settings(settings)
        .on_update(|ctx| {
            ctx.actions().create("results", 0_u64);
            Ok(())
        }),
    )
}

/// Prints results and audit copies as they arrive.
fn sink() -> ComponentSpec {
    ComponentSpec::new(
        ComponentFn::new("sink", |_ctx: &Context| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(())
        })
        .depends_on("results")
        .on_update(|ctx| {
            ctx.actions().subscribe("results", |data| {
                if let Some(v) = data.get::<u64>() {
                    println!("sink: result {v}");
                }
            });
            ctx.actions().subscribe("audit", |data| {
                if let Some(v) = data.get::<u64>() {
                    println!("sink: audit {v}");
                }
            });
            Ok(())
        })
        .on_status(|| vec!["printing results".to_string()]),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        workers: 2,
        respawn_backoff: RespawnBackoff::exponential(Duration::from_millis(50), Duration::from_secs(1)),
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let engine = Engine::builder(cfg).with_subscribers(subs).build();

    // Registration order does not matter: the registry sorts by dependencies.
    let specs = vec![sink(), processor(), generator()];

    let driver = Arc::clone(&engine);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        if let Err(err) = driver.change_setting("processor", "mode", "square") {
            eprintln!("setting rejected: {err}");
        }
        for line in driver.status() {
            println!("status: {line}");
        }
        for w in driver.workers() {
            println!("{}: {:?} ({} passes)", w.id, w.attached, w.passes);
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        driver.cancel();
    });

    engine.run(specs).await?;
    for line in engine.test_components() {
        println!("{line}");
    }
    Ok(())
}
