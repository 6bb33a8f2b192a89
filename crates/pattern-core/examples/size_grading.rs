//! Example: Grading a Pattern Across Standard Sizes
//!
//! This example runs the synthetic torso through the engine once per
//! standard size and prints how the front piece and its darts change.
//!
//! Run with: `cargo run -p pattern-core --example size_grading`

use pattern_core::synthetic;
use pattern_core::{PatternConfig, PatternEngine, Session, SizeProfile, StandardSize};
use pattern_mesh::polygon::Bounds2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // =========================================================================
    // 1. Build an engine from a TOML configuration
    // =========================================================================

    let config = PatternConfig::from_toml(
        r#"
        seam_allowance = 1.5
        corner_join_policy = "miter"
        max_dart_width = 4.0
        worker_threads = 2
        "#,
    )?;
    let engine = PatternEngine::new(config)?;

    println!("=== Configuration ===\n{}", engine.config().to_toml()?);

    // =========================================================================
    // 2. Run the same garment at every standard size
    // =========================================================================

    for size in StandardSize::ALL {
        let session = Session::new(synthetic::torso_input()).with_size_profile(SizeProfile::Standard(size));
        let pattern = engine.run(&session)?;

        let Some(front) = pattern.piece("front") else {
            continue;
        };
        let (width, height) = Bounds2::from_points(&front.outline)
            .map_or((0.0, 0.0), |b| (b.width(), b.height()));
        let intake: f64 = front.darts.iter().map(|d| d.width).sum();

        println!(
            "{:>2}: front {:6.2} x {:5.2}, {} darts taking in {:5.2}, status {:?}",
            size,
            width,
            height,
            front.darts.len(),
            intake,
            pattern.overall_status
        );
    }

    // =========================================================================
    // 3. Serialize one pattern
    // =========================================================================

    let session = Session::new(synthetic::torso_input()).with_size_profile(SizeProfile::Standard(StandardSize::L));
    let pattern = engine.run(&session)?;
    let json = pattern.to_json()?;
    println!("\n=== Size L pattern: {} bytes of JSON ===", json.len());

    Ok(())
}
