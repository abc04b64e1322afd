//! Fits the built-in rate-law family to a synthetic product-inhibition assay.
//!
//! Run with `RUST_LOG=info cargo run --example fit_inhibition` to follow the fits.

use enzynetics::prelude::*;
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

const INITIAL_SUBSTRATE: [f64; 5] = [2.0, 5.0, 10.0, 25.0, 50.0];
const ENZYME: f64 = 0.05;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let experiment = synthetic_experiment()?;
    let library = RateLawLibrary::for_experiment(experiment.has_inhibitor());

    let mut orchestrator = fit_experiment(
        &experiment,
        library,
        &PreparationConfig::default(),
        FitConfig::default(),
    )?;

    let ranking = orchestrator.ranking();
    println!("{}", ranking);

    let best = ranking
        .best()
        .map(|entry| entry.name.clone())
        .ok_or_else(|| anyhow::anyhow!("No system was fitted"))?;

    if let Some(result) = orchestrator.system(&best).and_then(|s| s.result()) {
        println!("\n{}", result);
    }

    // Share k_cat and K_m of the best system with every other candidate
    let refit = orchestrator.refit_with_fixed(&best, &[ParameterName::KCat, ParameterName::Km])?;
    println!("\nWith k_cat and K_m of '{}' fixed\n{}", best, refit);

    Ok(())
}

/// Competitive product inhibition with a slowly inactivating enzyme, time in minutes
fn synthetic_experiment() -> anyhow::Result<Experiment> {
    let guesses = InitialGuesses::default();
    let system = ReactionSystem::new(vec![
        Reaction::new(
            KineticModel::new(
                COMPETITIVE_PRODUCT_INHIBITION,
                "substrate = -k_cat * catalyst * substrate / (K_m * (1 + product / K_ic) + substrate)",
                &guesses,
            )?,
            vec![],
        )?,
        Reaction::new(
            KineticModel::new(CATALYST_DECAY, "catalyst = -K_ie * catalyst", &guesses)?,
            vec![],
        )?,
    ])?;

    let times: Vec<f64> = (0..=30).map(|t| t as f64).collect();
    let n = INITIAL_SUBSTRATE.len();
    let initials = Array2::from_shape_fn((n, 3), |(i, j)| match j {
        0 => INITIAL_SUBSTRATE[i],
        1 => ENZYME,
        _ => 0.0,
    });
    let time = Array2::from_shape_fn((n, times.len()), |(_, j)| times[j]);
    let truth = ParameterValues::from([
        (ParameterName::KCat, 12.0),
        (ParameterName::Km, 8.0),
        (ParameterName::Kic, 3.0),
        (ParameterName::Kie, 0.02),
    ]);

    let setup = SimulationSetup::default();
    let simulated = system.simulate(
        &initials,
        &time,
        &Array1::zeros(n),
        &truth,
        &setup,
        setup.rkf45(),
    )?;

    let mut rng = StdRng::seed_from_u64(1);
    let mut builder = ExperimentBuilder::default();
    builder
        .name("product inhibition assay")
        .measured_species(SpeciesRole::Product);

    for (i, s0) in INITIAL_SUBSTRATE.iter().enumerate() {
        let product: Vec<f64> = (0..times.len())
            .map(|j| match j {
                0 => 0.0,
                _ => (s0 - simulated[[i, j, 0]] + rng.gen_range(-0.02..0.02)).clamp(0.0, *s0),
            })
            .collect();

        builder.to_measurements(
            MeasurementBuilder::default()
                .id(format!("assay_{}", i))
                .ph(7.5)
                .temperature(37.0)
                .temperature_unit("C")
                .to_species(
                    MeasurementSpeciesBuilder::default()
                        .id("glucose")
                        .role(SpeciesRole::Substrate)
                        .unit("mM")
                        .initial(*s0)
                        .build()?,
                )
                .to_species(
                    MeasurementSpeciesBuilder::default()
                        .id("gluconate")
                        .role(SpeciesRole::Product)
                        .unit("mM")
                        .initial(0.0)
                        .to_replicates(Replicate::new(times.clone(), product))
                        .build()?,
                )
                .to_species(
                    MeasurementSpeciesBuilder::default()
                        .id("glucose_oxidase")
                        .role(SpeciesRole::Catalyst)
                        .unit("uM")
                        .initial(ENZYME)
                        .build()?,
                )
                .build()?,
        );
    }

    Ok(builder.build()?)
}
