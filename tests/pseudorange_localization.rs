//! End-to-end 2D pseudorange localization.
//!
//! A receiver moves through three epochs while ranging against four beacons;
//! every range carries a shared constant clock offset. The graph estimates
//! positions and per-epoch offsets, ties consecutive offsets with constant
//! value factors, and recovers marginal covariances afterwards.

use argus_fusion::data::{Measurement, SensorDataSet, SensorElement, SensorType, Time};
use argus_fusion::graph::{FactorGraph, FactorKind, StateKind, StateList};
use argus_fusion::math::{GaussianComponent, GaussianMixture};
use argus_fusion::models::{ErrorModel, NormalizationPolicy};
use argus_fusion::solver::SolverOptions;
use nalgebra::{dvector, DVector};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

const BEACONS: [[f64; 2]; 4] = [[10.0, 10.0], [10.0, -10.0], [-10.0, 10.0], [-10.0, -10.0]];
const TRAJECTORY: [[f64; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
const OFFSET: f64 = 2.0;
const RANGE_STD: f64 = 0.25;

fn simulate_pseudoranges() -> SensorDataSet {
    simulate_with_bias(None)
}

/// Simulate exact pseudoranges, optionally adding `bias` to the measurement
/// of beacon `beacon_id` at epoch `epoch`.
fn simulate_with_bias(outlier: Option<(usize, usize, f64)>) -> SensorDataSet {
    let mut data = SensorDataSet::new();
    for (epoch, position) in TRAJECTORY.iter().enumerate() {
        let time = Time::new(epoch as f64);
        for (id, beacon) in BEACONS.iter().enumerate() {
            let mut range = ((position[0] - beacon[0]).powi(2)
                + (position[1] - beacon[1]).powi(2))
            .sqrt();
            if let Some((outlier_epoch, beacon_id, bias)) = outlier {
                if epoch == outlier_epoch && id == beacon_id {
                    range += bias;
                }
            }
            let mut measurement =
                Measurement::new(SensorType::Pseudorange2, time, dvector![range + OFFSET]);
            measurement.set_std_dev(dvector![RANGE_STD]);
            measurement.set_value(
                SensorElement::SatellitePosition,
                DVector::from_vec(beacon.to_vec()),
            );
            measurement.set_value(SensorElement::SatelliteId, dvector![id as f64]);
            data.add_element(measurement);
        }
    }
    data
}

/// Build the graph from the sensor data, attaching the given error model to
/// every pseudorange factor.
fn build_graph(data: &SensorDataSet, range_model: &ErrorModel) -> FactorGraph {
    let mut graph = FactorGraph::new();

    let tie_model = ErrorModel::gaussian_diagonal(dvector![0.1]).unwrap();
    let mut previous_time: Option<Time> = None;
    let mut time = data.time_first(SensorType::Pseudorange2);
    while let Some(t) = time {
        graph.add_state("Position", StateKind::Point2, t).unwrap();
        graph.add_state("Offset", StateKind::ClockError, t).unwrap();

        if let Some(previous) = previous_time {
            let mut tie = StateList::new();
            tie.add("Offset", previous);
            tie.add("Offset", t);
            graph
                .add_factor(FactorKind::ConstantValue, &tie, None, tie_model.clone())
                .unwrap();
        }

        let count = data.count_element(SensorType::Pseudorange2, t);
        for slot in 0..count {
            let measurement = data.get_element(SensorType::Pseudorange2, t, slot).unwrap();
            let mut states = StateList::new();
            states.add("Position", t);
            states.add("Offset", t);
            graph
                .add_factor(
                    FactorKind::Pseudorange2,
                    &states,
                    Some(measurement),
                    range_model.clone(),
                )
                .unwrap();
        }

        previous_time = Some(t);
        time = data.time_next(SensorType::Pseudorange2, t);
    }

    graph
}

#[test]
fn test_gaussian_localization_recovers_trajectory() {
    let data = simulate_pseudoranges();
    let model = ErrorModel::gaussian_diagonal(dvector![RANGE_STD]).unwrap();
    let mut graph = build_graph(&data, &model);

    let report = graph.solve(&SolverOptions::default()).unwrap();
    assert!(report.status.is_converged(), "{report}");
    assert!(report.final_cost < 1e-8, "{report}");

    for (epoch, truth) in TRAJECTORY.iter().enumerate() {
        let time = Time::new(epoch as f64);
        let position = graph.state_data().get_state("Position", time).unwrap();
        assert!(
            (position.value()[0] - truth[0]).abs() < 1e-4,
            "epoch {epoch}: x = {}",
            position.value()[0]
        );
        assert!(
            (position.value()[1] - truth[1]).abs() < 1e-4,
            "epoch {epoch}: y = {}",
            position.value()[1]
        );

        let offset = graph.state_data().get_state("Offset", time).unwrap();
        assert!(
            (offset.value()[0] - OFFSET).abs() < 1e-4,
            "epoch {epoch}: offset = {}",
            offset.value()[0]
        );
    }
}

#[test]
fn test_noisy_localization_stays_near_truth() {
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, RANGE_STD).unwrap();

    let mut data = SensorDataSet::new();
    for (epoch, position) in TRAJECTORY.iter().enumerate() {
        let time = Time::new(epoch as f64);
        for beacon in &BEACONS {
            let range = ((position[0] - beacon[0]).powi(2) + (position[1] - beacon[1]).powi(2))
                .sqrt()
                + noise.sample(&mut rng);
            let mut measurement =
                Measurement::new(SensorType::Pseudorange2, time, dvector![range + OFFSET]);
            measurement.set_std_dev(dvector![RANGE_STD]);
            measurement.set_value(
                SensorElement::SatellitePosition,
                DVector::from_vec(beacon.to_vec()),
            );
            data.add_element(measurement);
        }
    }

    let model = ErrorModel::gaussian_diagonal(dvector![RANGE_STD]).unwrap();
    let mut graph = build_graph(&data, &model);
    let report = graph.solve(&SolverOptions::default()).unwrap();
    assert!(report.status.is_converged(), "{report}");

    for (epoch, truth) in TRAJECTORY.iter().enumerate() {
        let position = graph
            .state_data()
            .get_state("Position", Time::new(epoch as f64))
            .unwrap();
        let error = ((position.value()[0] - truth[0]).powi(2)
            + (position.value()[1] - truth[1]).powi(2))
        .sqrt();
        assert!(error < 1.0, "epoch {epoch}: error = {error}");
    }
}

#[test]
fn test_covariance_recovery_after_solve() {
    let data = simulate_pseudoranges();
    let model = ErrorModel::gaussian_diagonal(dvector![RANGE_STD]).unwrap();
    let mut graph = build_graph(&data, &model);

    graph.solve(&SolverOptions::default()).unwrap();
    graph.compute_covariance("Position").unwrap();
    graph.compute_covariance("Offset").unwrap();

    for epoch in 0..TRAJECTORY.len() {
        let time = Time::new(epoch as f64);
        let position = graph.state_data().get_state("Position", time).unwrap();
        let cov = position.covariance().expect("covariance missing");
        assert_eq!(cov.nrows(), 2);
        // positive variance of roughly measurement scale
        assert!(cov[(0, 0)] > 0.0 && cov[(0, 0)] < 1.0, "var = {}", cov[(0, 0)]);
        assert!(cov[(1, 1)] > 0.0 && cov[(1, 1)] < 1.0, "var = {}", cov[(1, 1)]);

        let offset = graph.state_data().get_state("Offset", time).unwrap();
        assert!(offset.covariance().is_some());
    }
}

#[test]
fn test_covariance_before_solve_is_rejected() {
    let data = simulate_pseudoranges();
    let model = ErrorModel::gaussian_diagonal(dvector![RANGE_STD]).unwrap();
    let mut graph = build_graph(&data, &model);
    assert!(graph.compute_covariance("Position").is_err());
}

#[test]
fn test_unknown_state_name_is_rejected() {
    let data = simulate_pseudoranges();
    let model = ErrorModel::gaussian_diagonal(dvector![RANGE_STD]).unwrap();
    let mut graph = build_graph(&data, &model);
    graph.solve(&SolverOptions::default()).unwrap();
    assert!(graph.compute_covariance("Velocity").is_err());
}

fn robust_range_model(policy: NormalizationPolicy) -> ErrorModel {
    // Narrow inlier component plus a broad outlier component
    let mixture = GaussianMixture::new(vec![
        GaussianComponent::from_std_dev(0.9, dvector![0.0], dvector![RANGE_STD]).unwrap(),
        GaussianComponent::from_std_dev(0.1, dvector![0.0], dvector![10.0]).unwrap(),
    ])
    .unwrap();
    ErrorModel::sum_mixture(mixture, policy)
}

#[test]
fn test_sum_mixture_tolerates_an_outlier() {
    // Corrupt one range at the second epoch
    let data = simulate_with_bias(Some((1, 0, 15.0)));

    let model = robust_range_model(NormalizationPolicy::SumOfMaxima);
    let tie_model = ErrorModel::gaussian_diagonal(dvector![0.1]).unwrap();

    // The mixture cost is multimodal once an epoch carries a gross outlier,
    // so a batch solve from zero can stall in a spurious mode. Process the
    // epochs incrementally instead, seeding each new epoch from the previous
    // estimate so the solver linearizes near the inlier mode.
    let mut graph = FactorGraph::new();
    let mut previous_time: Option<Time> = None;
    let mut time = data.time_first(SensorType::Pseudorange2);
    while let Some(t) = time {
        graph.add_state("Position", StateKind::Point2, t).unwrap();
        graph.add_state("Offset", StateKind::ClockError, t).unwrap();

        if let Some(previous) = previous_time {
            let position = graph
                .state_data()
                .get_state("Position", previous)
                .unwrap()
                .value()
                .clone();
            let offset = graph
                .state_data()
                .get_state("Offset", previous)
                .unwrap()
                .value()
                .clone();
            graph.set_state_value("Position", t, position).unwrap();
            graph.set_state_value("Offset", t, offset).unwrap();

            let mut tie = StateList::new();
            tie.add("Offset", previous);
            tie.add("Offset", t);
            graph
                .add_factor(FactorKind::ConstantValue, &tie, None, tie_model.clone())
                .unwrap();
        }

        let count = data.count_element(SensorType::Pseudorange2, t);
        for slot in 0..count {
            let measurement = data.get_element(SensorType::Pseudorange2, t, slot).unwrap();
            let mut states = StateList::new();
            states.add("Position", t);
            states.add("Offset", t);
            graph
                .add_factor(
                    FactorKind::Pseudorange2,
                    &states,
                    Some(measurement),
                    model.clone(),
                )
                .unwrap();
        }

        let report = graph.solve(&SolverOptions::default()).unwrap();
        assert!(report.status.is_converged(), "{report}");

        previous_time = Some(t);
        time = data.time_next(SensorType::Pseudorange2, t);
    }

    for (epoch, truth) in TRAJECTORY.iter().enumerate() {
        let time = Time::new(epoch as f64);
        let position = graph.state_data().get_state("Position", time).unwrap();
        let error = ((position.value()[0] - truth[0]).powi(2)
            + (position.value()[1] - truth[1]).powi(2))
        .sqrt();
        assert!(error < 0.3, "epoch {epoch}: error = {error}");

        let offset = graph.state_data().get_state("Offset", time).unwrap();
        assert!(
            (offset.value()[0] - OFFSET).abs() < 0.3,
            "epoch {epoch}: offset = {}",
            offset.value()[0]
        );
    }
}

#[test]
fn test_max_mixture_tolerates_an_outlier() {
    let data = simulate_pseudoranges();

    let mixture = GaussianMixture::new(vec![
        GaussianComponent::from_std_dev(0.9, dvector![0.0], dvector![RANGE_STD]).unwrap(),
        GaussianComponent::from_std_dev(0.1, dvector![0.0], dvector![10.0]).unwrap(),
    ])
    .unwrap();
    let model = ErrorModel::max_mixture(mixture);

    let mut graph = build_graph(&data, &model);
    let report = graph.solve(&SolverOptions::default()).unwrap();
    assert!(report.status.is_converged(), "{report}");

    // Clean data, the robust model must not bias the estimate
    for (epoch, truth) in TRAJECTORY.iter().enumerate() {
        let position = graph
            .state_data()
            .get_state("Position", Time::new(epoch as f64))
            .unwrap();
        let error = ((position.value()[0] - truth[0]).powi(2)
            + (position.value()[1] - truth[1]).powi(2))
        .sqrt();
        assert!(error < 1e-3, "epoch {epoch}: error = {error}");
    }
}
