use causal_bounds::{
    BoundsConfig, BoundsError, CausalModel, DSeparationMethod, Dataset, Graph, OptimizerKind,
    SeparatorSelection,
};
use std::collections::HashMap;

const TOL: f64 = 1e-6;

fn cards(entries: &[(&str, usize)]) -> HashMap<String, usize> {
    entries.iter().map(|(label, card)| (label.to_string(), *card)).collect()
}

fn column_generation() -> BoundsConfig {
    BoundsConfig {
        optimizer: OptimizerKind::ColumnGeneration,
        ..BoundsConfig::default()
    }
}

fn model(
    edges: &str,
    latents: &[&str],
    cardinalities: &HashMap<String, usize>,
    data: Dataset,
) -> CausalModel {
    let graph = Graph::parse(edges, latents.iter().copied(), cardinalities).unwrap();
    CausalModel::new(graph, data, BoundsConfig::default()).unwrap()
}

fn assert_close(got: Option<f64>, expected: f64) {
    let got = got.expect("bound should exist");
    assert!((got - expected).abs() < TOL, "expected {}, got {}", expected, got);
}

const IV_EDGES: &str = "Z -> X, X -> Y, U1 -> X, U1 -> Y, U2 -> Z";

// Z independent of a four-state confounder U with P(U = u) proportional to u + 1.
fn iv_scm(z_card: usize, x_card: usize, do_x: Option<usize>) -> (Vec<(Vec<usize>, f64)>, f64) {
    let mut rows = Vec::new();
    let mut hits = 0.0;
    let mut total = 0.0;
    for z in 0..z_card {
        for u in 0..4 {
            let weight = ((z + 2) * (u + 1)) as f64;
            let y_of = |x: usize| (x * (u % 2) + u / 2) % 2;
            let x = (z * (u % 2) + u / 2) % x_card;
            rows.push((vec![z, x, y_of(x)], weight));
            if let Some(forced) = do_x {
                if y_of(forced) == 1 {
                    hits += weight;
                }
            }
            total += weight;
        }
    }
    (rows, hits / total)
}

mod confounding {
    use super::*;

    fn confounded() -> CausalModel {
        let data = Dataset::from_weighted_rows(
            ["X", "Y"],
            vec![
                (vec![0, 0], 0.15),
                (vec![0, 1], 0.25),
                (vec![1, 0], 0.35),
                (vec![1, 1], 0.25),
            ],
        )
        .unwrap();
        model("U1 -> X, U1 -> Y, X -> Y", &["U1"], &HashMap::new(), data)
    }

    #[test]
    fn natural_bounds_for_both_intervention_values() {
        let model = confounded();
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.25);
        assert_close(bounds.upper, 0.65);

        let bounds = model.bound(("X", 0), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.25);
        assert_close(bounds.upper, 0.85);
    }

    #[test]
    fn independent_confounders_point_identify() {
        let data = Dataset::from_weighted_rows(
            ["X", "Y"],
            vec![
                (vec![1, 1], 0.42),
                (vec![1, 0], 0.18),
                (vec![0, 1], 0.1),
                (vec![0, 0], 0.3),
            ],
        )
        .unwrap();
        let model = model("U1 -> X, U2 -> Y, X -> Y", &["U1", "U2"], &HashMap::new(), data);
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.7);
        assert_close(bounds.upper, 0.7);
    }
}

mod instrumental {
    use super::*;

    #[test]
    fn ineffective_instrument_gives_natural_bounds() {
        let joint = [(0, 0, 0.1), (0, 1, 0.3), (1, 0, 0.2), (1, 1, 0.4)];
        let rows = (0..2).flat_map(|z| {
            joint
                .iter()
                .map(move |(x, y, p)| (vec![z, *x, *y], p * (z + 1) as f64))
        });
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let model = model(IV_EDGES, &["U1", "U2"], &HashMap::new(), data);

        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.4);
        assert_close(bounds.upper, 0.8);
        let bounds = model.bound(("X", 0), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.3);
        assert_close(bounds.upper, 0.9);
    }

    #[test]
    fn perfect_compliance_point_identifies() {
        let mut rows = Vec::new();
        for (z, z_weight) in [(0, 0.4), (1, 0.6)] {
            for u in 0..4 {
                let x = z;
                let y = (x * (u % 2) + u / 2) % 2;
                rows.push((vec![z, x, y], z_weight * (u + 1) as f64 / 10.0));
            }
        }
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let model = model(IV_EDGES, &["U1", "U2"], &HashMap::new(), data);
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(bounds.lower, 0.5);
        assert_close(bounds.upper, 0.5);
    }

    #[test]
    fn bounds_contain_the_structural_truth() {
        let (rows, truth) = iv_scm(2, 2, Some(1));
        assert!((truth - 0.5).abs() < 1e-12);
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let model = model(IV_EDGES, &["U1", "U2"], &HashMap::new(), data);
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        let (lower, upper) = (bounds.lower.unwrap(), bounds.upper.unwrap());
        assert!(lower <= truth + TOL && truth <= upper + TOL, "{} not in {}", truth, bounds);

        // the instrument can only tighten the confounded bounds
        let p_x1y1_given_z = |z: usize| {
            model
                .dataset()
                .conditional_probability(&[("X", 1), ("Y", 1)], &[("Z", z)])
                .unwrap()
        };
        let p_x0_given_z = |z: usize| {
            model
                .dataset()
                .conditional_probability(&[("X", 0)], &[("Z", z)])
                .unwrap()
        };
        for z in 0..2 {
            assert!(lower + TOL >= p_x1y1_given_z(z));
            assert!(upper <= p_x1y1_given_z(z) + p_x0_given_z(z) + TOL);
        }
    }

    #[test]
    fn non_binary_instrument_and_treatment() {
        let (rows, truth) = iv_scm(3, 3, Some(2));
        assert!((truth - 0.7).abs() < 1e-12);
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let model = model(IV_EDGES, &["U1", "U2"], &cards(&[("Z", 3), ("X", 3)]), data);
        let bounds = model.bound(("X", 2), ("Y", 1)).unwrap();
        let (lower, upper) = (bounds.lower.unwrap(), bounds.upper.unwrap());
        assert!(0.0 <= lower && lower <= upper && upper <= 1.0);
        assert!(lower <= truth + TOL && truth <= upper + TOL, "{} not in {}", truth, bounds);
    }

    #[test]
    fn column_generation_matches_enumeration() {
        let (rows, _) = iv_scm(3, 3, None);
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let graph = Graph::parse(IV_EDGES, ["U1", "U2"], &cards(&[("Z", 3), ("X", 3)])).unwrap();
        let simplex =
            CausalModel::new(graph.clone(), data.clone(), BoundsConfig::default()).unwrap();
        let generated = CausalModel::new(graph, data, column_generation()).unwrap();
        for x in 0..3 {
            let expected = simplex.bound(("X", x), ("Y", 1)).unwrap();
            let got = generated.bound(("X", x), ("Y", 1)).unwrap();
            assert_close(got.lower, expected.lower.unwrap());
            assert_close(got.upper, expected.upper.unwrap());
        }
    }
}

mod front_door {
    use super::*;

    // X and Y share U1, M = X xor N with its own noise N.
    fn front_door_data() -> Dataset {
        let mut rows = Vec::new();
        for u in 0..4 {
            for (n, n_weight) in [(0, 7.0), (1, 3.0)] {
                let x = u % 2;
                let m = (x + n) % 2;
                let y = (m + u / 2) % 2;
                rows.push((vec![x, m, y], (u + 1) as f64 * n_weight));
            }
        }
        Dataset::from_weighted_rows(["X", "M", "Y"], rows).unwrap()
    }

    #[test]
    fn front_door_collapses_to_the_adjustment_formula() {
        let data = front_door_data();
        let mut expected = 0.0;
        for m in 0..2 {
            let p_m = data.conditional_probability(&[("M", m)], &[("X", 1)]).unwrap();
            for x in 0..2 {
                let p_y = data.conditional_probability(&[("Y", 1)], &[("M", m), ("X", x)]).unwrap();
                expected += p_m * p_y * data.probability(&[("X", x)]).unwrap();
            }
        }
        let model = model(
            "U1 -> X, U1 -> Y, X -> M, M -> Y, U2 -> M",
            &["U1", "U2"],
            &HashMap::new(),
            data,
        );
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(bounds.lower, expected);
        assert_close(bounds.upper, expected);
    }
}

mod copilot {
    use super::*;

    const EDGES: &str =
        "X -> Y, X -> D, D -> Y, E -> D, U1 -> Y, U1 -> X, U2 -> D, U3 -> E, U1 -> F";

    fn copilot_scm(do_x: Option<usize>) -> (Vec<(Vec<usize>, f64)>, f64) {
        let mut rows = Vec::new();
        let (mut hits, mut total) = (0.0, 0.0);
        for u1 in 0..4 {
            for (u2, w2) in [(0, 3.0), (1, 2.0)] {
                for (u3, w3) in [(0, 1.0), (1, 4.0)] {
                    let weight = (u1 + 1) as f64 * w2 * w3;
                    let unit = |x: usize| {
                        let e = u3;
                        let d = (x + e + u2) % 2;
                        let y = (d * x + u1 / 2) % 2;
                        let f = (u1 / 2 + u1 % 2) % 2;
                        vec![x, d, e, y, f]
                    };
                    rows.push((unit(u1 % 2), weight));
                    if let Some(forced) = do_x {
                        if unit(forced)[3] == 1 {
                            hits += weight;
                        }
                    }
                    total += weight;
                }
            }
        }
        (rows, hits / total)
    }

    fn copilot_model(config: BoundsConfig) -> CausalModel {
        let (rows, _) = copilot_scm(None);
        let data = Dataset::from_weighted_rows(["X", "D", "E", "Y", "F"], rows).unwrap();
        let graph = Graph::parse(EDGES, ["U1", "U2", "U3"], &HashMap::new()).unwrap();
        CausalModel::new(graph, data, config).unwrap()
    }

    #[test]
    fn bounds_contain_the_structural_truth() {
        let (_, truth) = copilot_scm(Some(1));
        let bounds = copilot_model(BoundsConfig::default()).bound(("X", 1), ("Y", 1)).unwrap();
        let (lower, upper) = (bounds.lower.unwrap(), bounds.upper.unwrap());
        assert!(0.0 <= lower && lower <= upper && upper <= 1.0);
        assert!(lower <= truth + TOL && truth <= upper + TOL, "{} not in {}", truth, bounds);
    }

    #[test]
    fn separator_rule_and_d_separation_method_agree() {
        let reference = copilot_model(BoundsConfig::default()).bound(("X", 1), ("Y", 1)).unwrap();
        let config = BoundsConfig {
            separator_selection: SeparatorSelection::FirstValid,
            d_separation: DSeparationMethod::Reachability,
            ..BoundsConfig::default()
        };
        let other = copilot_model(config).bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(other.lower, reference.lower.unwrap());
        assert_close(other.upper, reference.upper.unwrap());

        let generated = copilot_model(column_generation()).bound(("X", 1), ("Y", 1)).unwrap();
        assert_close(generated.lower, reference.lower.unwrap());
        assert_close(generated.upper, reference.upper.unwrap());
    }

    #[test]
    fn d_separation_queries() {
        let mut model = copilot_model(BoundsConfig::default());
        assert!(!model.are_d_separated_in_complete_graph(&["E"], &["X"], &["D"]).unwrap());
        assert!(model.are_d_separated_in_complete_graph(&["E"], &["X"], &[]).unwrap());
        assert!(model.are_d_separated_in_complete_graph(&["X"], &["F"], &["U1"]).unwrap());

        // without interventions the intervened graph is the complete graph
        assert!(!model.are_d_separated_in_intervened_graph(&["E"], &["Y"], &[]).unwrap());
        model.set_interventions(&[("D", 1)]).unwrap();
        assert!(model.are_d_separated_in_intervened_graph(&["E"], &["Y"], &[]).unwrap());
    }
}

mod queries {
    use super::*;

    #[test]
    fn csv_dataset_and_json_config() {
        let (rows, _) = iv_scm(2, 2, None);
        // integer weights, so the rows can be written out one per unit
        let mut csv = String::from("Z,X,Y\n");
        for (values, weight) in rows {
            for _ in 0..weight as usize {
                csv.push_str(&format!("{},{},{}\n", values[0], values[1], values[2]));
            }
        }
        let data = Dataset::from_csv_str(&csv).unwrap();
        let config = BoundsConfig::from_json_str(r#"{"optimizer": "column_generation"}"#).unwrap();
        let graph = Graph::parse(IV_EDGES, ["U1", "U2"], &HashMap::new()).unwrap();
        let mut model = CausalModel::new(graph, data, config).unwrap();
        model.set_interventions(&[("X", 1)]).unwrap();
        model.set_target("Y", 1).unwrap();
        let bounds = model.intervention_query().unwrap();
        assert!(bounds.lower.unwrap() <= 0.5 + TOL && 0.5 <= bounds.upper.unwrap() + TOL);

        let json = serde_json::to_value(bounds).unwrap();
        assert!(json["lower"].is_f64() && json["upper"].is_f64());
    }

    #[test]
    fn rejected_queries() {
        let (rows, _) = iv_scm(2, 2, None);
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let mut model = model(IV_EDGES, &["U1", "U2"], &HashMap::new(), data);
        assert!(matches!(
            model.bound(("U1", 0), ("Y", 1)),
            Err(BoundsError::NotObserved { .. })
        ));
        assert!(matches!(
            model.bound(("X", 2), ("Y", 1)),
            Err(BoundsError::ValueOutOfRange { .. })
        ));
        model.set_interventions(&[("X", 1), ("Z", 0)]).unwrap();
        model.set_target("Y", 1).unwrap();
        assert!(matches!(
            model.intervention_query(),
            Err(BoundsError::UnsupportedQuery { .. })
        ));
    }

    #[test]
    fn inconsistent_data_has_no_bounds() {
        // X never moves while Y copies Z, and only X could carry Z to Y
        let rows = vec![(vec![0, 0, 0], 1.0), (vec![1, 0, 1], 1.0)];
        let data = Dataset::from_weighted_rows(["Z", "X", "Y"], rows).unwrap();
        let model = model(IV_EDGES, &["U1", "U2"], &HashMap::new(), data);
        let bounds = model.bound(("X", 1), ("Y", 1)).unwrap();
        assert_eq!(bounds.lower, None);
        assert_eq!(bounds.upper, None);
    }
}
