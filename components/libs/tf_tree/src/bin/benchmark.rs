use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use std::time::Instant;
use tf_clock::TfTime;
use tf_spatial_payloads::{DVec3, RigidTransform};
use tf_tree::{TransformTree, TransformTreeConfig};

fn main() {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );

    println!("Transform Tree Performance Benchmark");
    println!("-----------------------------------");

    // Parameters
    let num_frames = 100;
    let num_lookups: u32 = 10000;
    let num_samples = 50u64;

    let mut tree = TransformTree::with_config(TransformTreeConfig::default());

    // Set up a chain of transforms: base -> frame1 -> frame2 -> ... -> frameN
    println!("Setting up {num_frames} frames in a chain, {num_samples} samples per edge");
    for i in 0..num_frames {
        let parent = if i == 0 {
            "base".to_string()
        } else {
            format!("frame{i}")
        };
        let child = format!("frame{}", i + 1);

        for s in 0..num_samples {
            let stamp = TfTime::from_millis(s * 10);
            let transform = RigidTransform::from_translation(DVec3::new(1.0 + s as f64, 0.0, 0.0));
            if let Err(e) = tree.add_transform(&parent, &child, stamp, transform) {
                eprintln!("Failed to add {parent} -> {child}: {e}");
                return;
            }
        }
    }
    let leaf = format!("frame{num_frames}");
    if let Ok(leaf_to_base) = tree.lookup_transform(&leaf, "base", TfTime::from_millis(105)) {
        let [x, _, _] = leaf_to_base.translation_length();
        info!("{leaf} is {:.1} m ahead of base at 105 ms", x.value);
    }

    // Same time over and over, served by the lookup cache
    println!("\nCached lookup benchmark:");
    let start = Instant::now();
    for _ in 0..num_lookups {
        let _ = tree.lookup_transform(&leaf, "base", TfTime::from_millis(105));
    }
    let elapsed = start.elapsed();
    println!("  {num_lookups} lookups in {elapsed:?}");
    println!("  Avg: {:?} per lookup", elapsed / num_lookups);

    // Monotonic playback, every lookup interpolates every edge
    println!("\nPlayback lookup benchmark:");
    let span = TfTime::from_millis((num_samples - 1) * 10).as_nanos();
    let start = Instant::now();
    for i in 0..num_lookups {
        let time = TfTime::from_nanos(span * i as u64 / num_lookups as u64);
        let _ = tree.lookup_transform(&leaf, "base", time);
    }
    let elapsed = start.elapsed();
    println!("  {num_lookups} lookups in {elapsed:?}");
    println!("  Avg: {:?} per lookup", elapsed / num_lookups);

    let stats = tree.cache_stats();
    info!(
        "Cache hits {} misses {} entries {}",
        stats.hits, stats.misses, stats.entries
    );
}
