//! Planet affinity walkthrough
//!
//! Builds the user × planet-type matrix from a handful of in-memory
//! interactions, compares final loss across a few ranks, then trains the
//! stage and prints each user's top planet types.
//!
//! Run with: cargo run --example planet_affinity

use anyhow::Result;
use poppy_affinity::{
    aggregate, sweep_ranks, AffinityStage, InteractionRecord, Reducer, SgdConfig, StageConfig,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let records = vec![
        InteractionRecord::new("U1", "Planet", "Dwarf Planet", 4.0),
        InteractionRecord::new("U1", "Planet", "Gas Giant", 2.0),
        InteractionRecord::new("U2", "Planet", "Dwarf Planet", 5.0),
        InteractionRecord::new("U2", "Planet", "Terrestrial", 3.0),
        InteractionRecord::new("U3", "Planet", "Gas Giant", 5.0),
        InteractionRecord::new("U3", "Planet", "Ice Giant", 4.0),
        InteractionRecord::new("U3", "Star_Type", "G", 5.0),
    ];

    let sgd = SgdConfig {
        epochs: 1500,
        ..SgdConfig::default()
    };

    let interactions = aggregate(&records, "Planet", Reducer::Max)?;
    println!("Rank sweep (final loss):");
    for (rank, loss) in sweep_ranks(&interactions.matrix, &[3, 4, 5], &sgd)? {
        println!("  K={}: {:.4}", rank, loss);
    }

    let stage = AffinityStage::new(StageConfig::new("Planet", Reducer::Max).with_sgd(sgd));
    let output = stage.run(&records)?;

    println!("\nTop planet types per user:");
    for user_id in &output.predictions.user_ids {
        if let Some(top) = output.predictions.top_categories(user_id, 2) {
            let formatted: Vec<String> = top
                .iter()
                .map(|(category, score)| format!("{} ({:.2})", category, score))
                .collect();
            println!("  {}: {}", user_id, formatted.join(", "));
        }
    }

    Ok(())
}
