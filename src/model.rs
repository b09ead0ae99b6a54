use crate::config::BoundsConfig;
use crate::constraints::ConstraintBuilder;
use crate::dataset::Dataset;
use crate::error::{BoundsError, Result};
use crate::good_set::{GoodSet, GoodSetFinder};
use crate::graph::{Graph, NodeId};
use crate::linear::LinearProgram;
use crate::mechanism::MechanismSpace;
use crate::objective::ObjectiveBuilder;
use crate::optimizer::{optimizer_for, solve_bounds, BoundsProblem, Optimizer, SimplexOptimizer};
use serde::Serialize;
use std::fmt;
use tracing::info;

/// Lower and upper bound of an interventional probability. A side is
/// `None` when the optimizer found no optimum for it.
#[derive(Serialize, Clone, Copy, PartialEq, Debug)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub fn width(&self) -> Option<f64> {
        Some(self.upper? - self.lower?)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |v: Option<f64>| v.map_or_else(|| "none".to_string(), |v| format!("{:.4}", v));
        write!(f, "[{}, {}]", side(self.lower), side(self.upper))
    }
}

/// A causal graph with observational data, queried for
/// P(target | do(intervention)).
pub struct CausalModel {
    graph: Graph,
    dataset: Dataset,
    config: BoundsConfig,
    interventions: Vec<(NodeId, usize)>,
    target: Option<(NodeId, usize)>,
}

impl CausalModel {
    /// Checks the dataset against the graph and the configuration.
    pub fn new(graph: Graph, dataset: Dataset, config: BoundsConfig) -> Result<CausalModel> {
        config.validate()?;
        dataset.validate(&graph)?;
        Ok(CausalModel {
            graph,
            dataset,
            config,
            interventions: Vec::new(),
            target: None,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn config(&self) -> &BoundsConfig {
        &self.config
    }

    // Resolves an observed label and checks the value against its cardinality.
    fn observed_value(&self, label: &str, value: usize) -> Result<(NodeId, usize)> {
        let node = self.graph.node_id(label)?;
        let cardinality = self.graph.node(node).cardinality;
        if self.graph.node(node).is_latent {
            return Err(BoundsError::NotObserved {
                node_id: label.to_string(),
            });
        }
        if value >= cardinality {
            return Err(BoundsError::ValueOutOfRange {
                node_id: label.to_string(),
                value,
                cardinality,
            });
        }
        Ok((node, value))
    }

    pub fn set_interventions<S: AsRef<str>>(&mut self, interventions: &[(S, usize)]) -> Result<()> {
        self.interventions = interventions
            .iter()
            .map(|(label, value)| self.observed_value(label.as_ref(), *value))
            .collect::<Result<Vec<_>>>()?;
        Ok(())
    }

    pub fn set_target(&mut self, label: &str, value: usize) -> Result<()> {
        self.target = Some(self.observed_value(label, value)?);
        Ok(())
    }

    /// Bounds the query set through `set_interventions` and `set_target`.
    pub fn intervention_query(&self) -> Result<Bounds> {
        let target = self.target.ok_or_else(|| BoundsError::UnsupportedQuery {
            reason: "no target set".to_string(),
        })?;
        match self.interventions.as_slice() {
            [] => Err(BoundsError::UnsupportedQuery {
                reason: "no intervention set".to_string(),
            }),
            [intervention] => self.bound_ids(*intervention, target),
            [_, _] => Err(BoundsError::UnsupportedQuery {
                reason: "two simultaneous interventions lead to a bilinear program".to_string(),
            }),
            more => Err(BoundsError::UnsupportedQuery {
                reason: format!("{} simultaneous interventions", more.len()),
            }),
        }
    }

    /// Bounds P(target | do(intervention)) for one `(label, value)` pair each.
    pub fn bound(&self, intervention: (&str, usize), target: (&str, usize)) -> Result<Bounds> {
        let intervention = self.observed_value(intervention.0, intervention.1)?;
        let target = self.observed_value(target.0, target.1)?;
        self.bound_ids(intervention, target)
    }

    #[cfg_attr(feature = "trace", tracing::instrument(skip_all))]
    fn bound_ids(&self, intervention: (NodeId, usize), target: (NodeId, usize)) -> Result<Bounds> {
        let problem = self.problem_ids(intervention, target)?.1;
        let mut optimizer: Box<dyn Optimizer> = optimizer_for(&self.config)?;
        let (lower, upper) = solve_bounds(optimizer.as_mut(), &problem)?;
        // the optimum is a probability, so only round-off can leave [0, 1]
        let bounds = Bounds {
            lower: lower.map(|v| v.clamp(0.0, 1.0)),
            upper: upper.map(|v| v.clamp(0.0, 1.0)),
        };
        info!(
            intervention = self.graph.label(intervention.0),
            intervention_value = intervention.1,
            target = self.graph.label(target.0),
            target_value = target.1,
            %bounds,
            "bounded interventional query"
        );
        Ok(bounds)
    }

    fn problem_ids(
        &self,
        intervention: (NodeId, usize),
        target: (NodeId, usize),
    ) -> Result<(GoodSet, BoundsProblem)> {
        if intervention.0 == target.0 {
            return Err(BoundsError::UnsupportedQuery {
                reason: format!("'{}' is both intervention and target", self.graph.label(target.0)),
            });
        }
        let graph = &self.graph;
        let good_set = GoodSetFinder::new(graph)
            .with_selection(self.config.separator_selection)
            .with_d_separation(self.config.d_separation)
            .find(intervention.0, target.0)?;
        let distribution = self.dataset.distribution(graph)?;
        let considered = good_set.considered_c_component(graph);
        let latent = good_set.intervention_latent;
        let space = MechanismSpace::new(graph, latent, &considered);
        let constraints =
            ConstraintBuilder::new(graph, &distribution).build(latent, &considered, &space)?;
        let objective = ObjectiveBuilder::new(graph, &distribution).build(
            &good_set,
            &space,
            intervention.1,
            target.1,
        )?;
        Ok((
            good_set,
            BoundsProblem {
                space,
                constraints,
                objective,
            },
        ))
    }

    /// The decomposition and LP inputs of a query, without solving it.
    pub fn problem(
        &self,
        intervention: (&str, usize),
        target: (&str, usize),
    ) -> Result<(GoodSet, BoundsProblem)> {
        let intervention = self.observed_value(intervention.0, intervention.1)?;
        let target = self.observed_value(target.0, target.1)?;
        self.problem_ids(intervention, target)
    }

    /// The fully enumerated minimization LP of a query, for dumps.
    pub fn linear_program(
        &self,
        intervention: (&str, usize),
        target: (&str, usize),
    ) -> Result<LinearProgram> {
        let (_, problem) = self.problem(intervention, target)?;
        let mut optimizer = SimplexOptimizer::new(crate::linear::DenseSimplex::default());
        optimizer.setup(&problem)?;
        optimizer.linear_program().cloned().ok_or_else(|| BoundsError::Solver {
            reason: "no linear program was built".to_string(),
        })
    }

    pub fn are_d_separated_in_complete_graph<S: AsRef<str>>(
        &self,
        x: &[S],
        y: &[S],
        z: &[S],
    ) -> Result<bool> {
        self.d_separated(x, y, z, &[])
    }

    /// d-separation after removing the out-edges of the current interventions.
    pub fn are_d_separated_in_intervened_graph<S: AsRef<str>>(
        &self,
        x: &[S],
        y: &[S],
        z: &[S],
    ) -> Result<bool> {
        let mutilated: Vec<&str> = self
            .interventions
            .iter()
            .map(|(node, _)| self.graph.label(*node))
            .collect();
        self.d_separated(x, y, z, &mutilated)
    }

    fn d_separated<S: AsRef<str>>(
        &self,
        x: &[S],
        y: &[S],
        z: &[S],
        mutilated: &[&str],
    ) -> Result<bool> {
        let labels =
            |set: &[S]| set.iter().map(|s| s.as_ref().to_string()).collect::<Vec<String>>();
        let mutilated: Vec<String> = mutilated.iter().map(|s| s.to_string()).collect();
        self.graph.d_separated_labels(
            self.config.d_separation,
            &labels(x),
            &labels(y),
            &labels(z),
            &mutilated,
        )
    }
}
