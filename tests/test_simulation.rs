//! Tests for integrating reaction systems.
//!
//! Covers the conservation and decay properties of the joint ODE system, the
//! dispatch of rate laws onto the shared state, and agreement between integrators.

#[cfg(test)]
mod test_simulation {
    use approx::assert_relative_eq;
    use enzynetics::prelude::*;
    use enzynetics::simulation::ReactionRhs;
    use ndarray::{array, Array1, Array2, Array3};

    const COMPETITIVE_PRODUCT: &str =
        "substrate = -k_cat * catalyst * substrate / (K_m * (1 + product / K_ic) + substrate)";
    const COMPETITIVE: &str =
        "substrate = -k_cat * catalyst * substrate / (K_m * (1 + inhibitor / K_ic) + substrate)";
    const DECAY: &str = "catalyst = -K_ie * catalyst";
    const MENTEN: &str = "substrate = -k_cat * catalyst * substrate / (K_m + substrate)";

    fn system(substrate_law: &str, catalyst_law: Option<&str>) -> ReactionSystem {
        let guesses = InitialGuesses::default();
        let mut reactions = vec![Reaction::new(
            KineticModel::new("substrate law", substrate_law, &guesses).unwrap(),
            vec![],
        )
        .unwrap()];
        if let Some(law) = catalyst_law {
            reactions.push(
                Reaction::new(KineticModel::new("catalyst law", law, &guesses).unwrap(), vec![])
                    .unwrap(),
            );
        }
        ReactionSystem::new(reactions).unwrap()
    }

    fn params() -> ParameterValues {
        ParameterValues::from([
            (ParameterName::KCat, 10.0),
            (ParameterName::Km, 5.0),
            (ParameterName::Kic, 2.0),
            (ParameterName::Kie, 0.05),
        ])
    }

    fn time(rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, 21), |(_, j)| j as f64 * 0.5)
    }

    fn simulate(
        system: &ReactionSystem,
        initials: &Array2<f64>,
        inhibitor: &Array1<f64>,
    ) -> Array3<f64> {
        let setup = SimulationSetup::default();
        system
            .simulate(
                initials,
                &time(initials.nrows()),
                inhibitor,
                &params(),
                &setup,
                setup.rkf45(),
            )
            .expect("Failed to simulate")
    }

    #[test]
    fn test_mass_conservation() {
        // ARRANGE
        let system = system(COMPETITIVE_PRODUCT, None);
        let initials = array![[1.0, 0.1, 0.0], [20.0, 0.1, 0.0], [50.0, 0.1, 5.0]];

        // ACT
        let output = simulate(&system, &initials, &Array1::zeros(3));

        // ASSERT
        assert_eq!(output.shape(), &[3, 21, 3]);
        for (row, initial) in initials.outer_iter().enumerate() {
            let total = initial[0] + initial[2];
            for t in 0..21 {
                assert_relative_eq!(
                    output[[row, t, 0]] + output[[row, t, 2]],
                    total,
                    max_relative = 1e-8
                );
                // The catalyst stays constant without an inactivation law
                assert_relative_eq!(output[[row, t, 1]], 0.1, epsilon = 1e-12);
            }
            assert!(output[[row, 20, 0]] < initial[0]);
        }
    }

    #[test]
    fn test_catalyst_decay() {
        // ARRANGE
        let system = system(COMPETITIVE_PRODUCT, Some(DECAY));
        let initials = array![[5.0, 0.1, 0.0]];

        // ACT
        let output = simulate(&system, &initials, &Array1::zeros(1));

        // ASSERT
        let times = time(1);
        for (t, &time) in times.row(0).iter().enumerate() {
            assert_relative_eq!(
                output[[0, t, 1]],
                0.1 * (-0.05 * time).exp(),
                max_relative = 1e-5
            );
            assert_relative_eq!(output[[0, t, 0]] + output[[0, t, 2]], 5.0, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_fast_catalyst_decay() {
        // ARRANGE
        let system = system(COMPETITIVE_PRODUCT, Some(DECAY));
        let initials = array![[5.0, 1.0, 0.0]];
        let mut params = params();
        params.insert(ParameterName::Kie, 5.0);
        let setup = SimulationSetup::default();

        // ACT
        let output = system
            .simulate(
                &initials,
                &time(1),
                &Array1::zeros(1),
                &params,
                &setup,
                setup.rkf45(),
            )
            .unwrap();

        // ASSERT
        for (t, &time) in time(1).row(0).iter().enumerate() {
            assert_relative_eq!(output[[0, t, 1]], (-5.0 * time).exp(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fast_turnover_follows_integrated_rate_law() {
        // ARRANGE
        let system = system(MENTEN, None);
        let initials = array![[1.0, 1.0, 0.0]];
        let times = array![[0.0, 0.25, 0.5, 1.0]];
        let params = ParameterValues::from([(ParameterName::KCat, 60.0), (ParameterName::Km, 10.0)]);
        let setup = SimulationSetup::default();

        // ACT
        let output = system
            .simulate(
                &initials,
                &times,
                &Array1::zeros(1),
                &params,
                &setup,
                setup.rkf45(),
            )
            .unwrap();

        // ASSERT
        // K_m * ln(s0 / s) + s0 - s = k_cat * catalyst * t
        for (t, &time) in times.row(0).iter().enumerate().skip(1) {
            let s = output[[0, t, 0]];
            assert_relative_eq!(10.0 * (1.0 / s).ln() + 1.0 - s, 60.0 * time, max_relative = 1e-5);
            assert_relative_eq!(s + output[[0, t, 2]], 1.0, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_inhibitor_slows_consumption() {
        // ARRANGE
        let system = system(COMPETITIVE, None);
        let initials = array![[10.0, 0.1, 0.0], [10.0, 0.1, 0.0]];
        let inhibitor = array![0.0, 4.0];

        // ACT
        let output = simulate(&system, &initials, &inhibitor);

        // ASSERT
        assert!(output[[1, 20, 0]] > output[[0, 20, 0]]);
    }

    #[test]
    fn test_integrators_agree() {
        // ARRANGE
        let system = system(COMPETITIVE_PRODUCT, Some(DECAY));
        let initials = array![[20.0, 0.1, 0.0]];
        let setup = SimulationSetupBuilder::default().dt(0.01).build().unwrap();

        // ACT
        let adaptive = simulate(&system, &initials, &Array1::zeros(1));
        let fixed = system
            .simulate(
                &initials,
                &time(1),
                &Array1::zeros(1),
                &params(),
                &setup,
                RK4,
            )
            .unwrap();
        let implicit = system
            .simulate(
                &initials,
                &time(1),
                &Array1::zeros(1),
                &params(),
                &setup,
                setup.gl4(),
            )
            .unwrap();

        // ASSERT
        for t in 0..21 {
            assert_relative_eq!(adaptive[[0, t, 0]], fixed[[0, t, 0]], max_relative = 1e-5);
            assert_relative_eq!(adaptive[[0, t, 0]], implicit[[0, t, 0]], max_relative = 1e-4);
        }
    }

    #[test]
    fn test_rhs_matches_rate_law() {
        // ARRANGE
        let system = system(COMPETITIVE_PRODUCT, Some(DECAY));
        let rhs: ReactionRhs = system.setup_rhs().unwrap();
        let recompiled = RateLaw::compile(COMPETITIVE_PRODUCT).unwrap();

        // ACT
        let dy = rhs.call(&[5.0, 0.1, 2.0], 0.0, &params(), 0.0).unwrap();

        // ASSERT
        // Arguments in alphabetical order: K_ic, K_m, catalyst, k_cat, product, substrate
        let expected = recompiled.call(&[2.0, 5.0, 0.1, 10.0, 2.0, 5.0]).unwrap();
        assert_relative_eq!(dy[0], expected, epsilon = 1e-12);
        assert_relative_eq!(dy[0], -1.0 * 0.1 * 5.0 / (5.0 * 2.0 + 5.0) * 10.0, epsilon = 1e-12);
        assert_relative_eq!(dy[1], -0.005, epsilon = 1e-12);
        assert_relative_eq!(dy[2], -dy[0]);
    }

    #[test]
    fn test_missing_parameter_value() {
        let system = system(COMPETITIVE_PRODUCT, None);
        let setup = SimulationSetup::default();
        let incomplete = ParameterValues::from([(ParameterName::KCat, 10.0)]);

        let result = system.simulate(
            &array![[5.0, 0.1, 0.0]],
            &time(1),
            &Array1::zeros(1),
            &incomplete,
            &setup,
            setup.rkf45(),
        );

        assert!(matches!(result, Err(FitError::Simulation(_))));
    }
}
