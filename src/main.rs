//! Behavior Art CLI - Encode a behavior record and render frames headlessly.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};

use behavior_art::{
    compute::{
        SnapshotWorker,
        gpu::{GpuError, RenderPipeline},
    },
    schema::{BehaviorCategory, BehaviorRecord, EngineConfig},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "--example" {
        print_example();
        return;
    }

    if args.len() < 2 {
        eprintln!("Usage: {} <record.json> [frames]", args[0]);
        eprintln!();
        eprintln!("Encode a behavior record into art DNA and render frames.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  record.json  Path to a behavior record");
        eprintln!("  frames       Number of frames to render (default: 120)");
        eprintln!();
        eprintln!("An optional engine config is read from <record>.config.json.");
        eprintln!("Example files are printed with --example.");
        std::process::exit(1);
    }

    let record_path = PathBuf::from(&args[1]);
    let frames: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(120);

    // Load record
    let record_str = fs::read_to_string(&record_path).unwrap_or_else(|e| {
        eprintln!("Error reading record file: {}", e);
        std::process::exit(1);
    });
    let record: BehaviorRecord = serde_json::from_str(&record_str).unwrap_or_else(|e| {
        eprintln!("Error parsing record: {}", e);
        std::process::exit(1);
    });

    // Load or default config
    let config_path = record_path.with_extension("config.json");
    let config: EngineConfig = if config_path.exists() {
        let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
            eprintln!("Error reading config file: {}", e);
            std::process::exit(1);
        });
        serde_json::from_str(&config_str).unwrap_or_else(|e| {
            eprintln!("Error parsing config: {}", e);
            std::process::exit(1);
        })
    } else {
        EngineConfig::default()
    };
    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {}", e);
        std::process::exit(1);
    }

    // Encode off the main thread, as a live host would on record changes
    let worker = SnapshotWorker::spawn().unwrap_or_else(|e| {
        eprintln!("Error starting encoder thread: {}", e);
        std::process::exit(1);
    });
    let generation = worker.submit(record);
    let Some(snapshot) = worker.wait_for(generation) else {
        eprintln!("Encoder thread exited before producing a snapshot");
        std::process::exit(1);
    };

    println!("Behavior Art");
    println!("============");
    match serde_json::to_string_pretty(&snapshot.summary()) {
        Ok(json) => println!("{}", json),
        Err(e) => log::warn!("Could not serialize summary: {}", e),
    }
    println!();

    if frames == 0 {
        return;
    }

    let mut pipeline =
        match pollster::block_on(RenderPipeline::new(config, Arc::clone(&snapshot))) {
            Ok(p) => p,
            Err(GpuError::NoAdapter) => {
                log::warn!("No GPU adapter available; skipping rendering");
                return;
            }
            Err(e) => {
                eprintln!("Error creating render pipeline: {}", e);
                std::process::exit(1);
            }
        };

    println!(
        "Rendering {} frames at {}x{}...",
        frames,
        pipeline.config().width,
        pipeline.config().height
    );
    let start = Instant::now();
    let mut last_frame = Instant::now();

    for i in 0..frames {
        let now = Instant::now();
        let measured = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let stats = match pipeline.render_frame(measured, None) {
            Ok(stats) => stats,
            Err(e) => {
                log::warn!("Frame {} failed: {}", i, e);
                continue;
            }
        };

        // Print progress every 10%
        if (i + 1) % (frames / 10).max(1) == 0 {
            let fps = (i + 1) as f32 / start.elapsed().as_secs_f32();
            println!(
                "  Frame {}/{}: t={:.2}s, particles={}, {:.1} fps",
                i + 1,
                frames,
                stats.elapsed,
                stats.active_particles,
                fps
            );
        }
    }

    match pipeline.read_frame() {
        Ok(pixels) => {
            let lit = pixels
                .chunks(4)
                .filter(|p| p[0] > 8 || p[1] > 8 || p[2] > 8)
                .count();
            println!();
            println!(
                "Final frame: {} bytes, {:.1}% lit",
                pixels.len(),
                100.0 * lit as f32 / (pixels.len() / 4).max(1) as f32
            );
        }
        Err(e) => log::warn!("Frame readback failed: {}", e),
    }
}

fn print_example() {
    let now = Utc::now();
    let mut record = BehaviorRecord::new("morning-run", BehaviorCategory::Fitness, now - Duration::days(90));
    record.completion_rate = 0.8;
    record.streak_days = 21;
    record.intensity = 0.7;
    record.growth_rate = 0.4;
    record.history = (0..60).map(|i| i % 5 != 3).collect();
    record.timestamps = (0..10).map(|i| now - Duration::days(i * 2 + i % 3)).rev().collect();
    record.time_of_day = Some(7);

    let config = EngineConfig {
        particle_capacity: 200_000,
        ..Default::default()
    };

    println!("Example record (record.json):");
    match serde_json::to_string_pretty(&record) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing record: {}", e),
    }
    println!();
    println!("Example config (record.config.json):");
    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing config: {}", e),
    }
}
