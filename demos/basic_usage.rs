// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic composite-repository usage.
//!
//! Demonstrates:
//! 1. In-memory primary, Redis cache, SQLite secondary
//! 2. Writing a handful of JSON records
//! 3. Reads served by the cache, then by the secondary once the cache is gone
//! 4. Sync health and store connectivity
//! 5. Displaying captured metrics
//!
//! # Prerequisites
//!
//! A local Redis is optional; without it the cache is skipped:
//! ```bash
//! docker run --rm -p 6379:6379 redis:7-alpine
//! ```
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use composite_repo::{
    CancellationToken, CompositeConfig, CompositeRepository, InMemoryStore, PropagationMode, Record,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "composite_repo=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║          composite-repo: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Wire the stores
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = CompositeConfig {
        redis_url: Some("redis://localhost:6379".into()),
        redis_key_prefix: "citizen:".into(),
        sql_url: Some(format!("sqlite:{}?mode=rwc", dir.path().join("secondary.db").display())),
        propagation_mode: PropagationMode::Background,
        ..Default::default()
    };

    let primary = Arc::new(InMemoryStore::<String, Value>::new());
    let repo = CompositeRepository::<String, Value>::connect(primary.clone(), config).await;
    println!("📦 Stores (read order): {:?}", repo.roles());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Write
    // ─────────────────────────────────────────────────────────────────────────
    let token = CancellationToken::new();
    let entries = [
        ("alice", json!({"name": "Alice", "role": "admin"})),
        ("bob", json!({"name": "Bob", "role": "user"})),
        ("carol", json!({"name": "Carol", "role": "user"})),
    ];

    println!("\n✍️  Writing {} records...", entries.len());
    for (id, payload) in &entries {
        repo.add(&Record::new(id.to_string(), payload.clone()), &token).await?;
        println!("   └─ {id}");
    }

    let bob = repo.get(&"bob".to_string(), &token).await?;
    if let Some(bob) = bob {
        repo.update(&bob.revise(json!({"name": "Bob", "role": "admin"})), &token).await?;
    }

    // Let the background worker catch up before reading.
    repo.shutdown().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Read
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔎 Reading back:");
    for (id, _) in &entries {
        match repo.get(&id.to_string(), &token).await? {
            Some(record) => println!("   └─ {id}: v{} {}", record.version, record.payload),
            None => println!("   └─ {id}: not found"),
        }
    }

    let admins = repo
        .browse(&|r: &Record<String, Value>| r.payload["role"] == "admin", &token)
        .await?;
    println!("   └─ admins: {}", admins.len());
    println!("   └─ total:  {}", repo.count(&token).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Health
    // ─────────────────────────────────────────────────────────────────────────
    let check = repo.health_check(&token).await;
    println!("\n🩺 Health:");
    println!("   ├─ primary:   {}", check.primary_connected);
    println!("   ├─ cache:     {:?}", check.cache_connected);
    println!("   ├─ secondary: {:?}", check.secondary_connected);
    println!("   └─ sync:      {}", serde_json::to_string(&check.sync)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print captured metrics grouped by kind.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let key = composite_key.key();
            let labels: Vec<_> =
                key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let rendered = match value {
                DebugValue::Counter(v) => format!("{v}"),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
