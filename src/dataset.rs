use crate::error::{BoundsError, Result};
use crate::graph::{Graph, NodeId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One distinct realization of the columns and how often it was observed.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct WeightedRow {
    pub values: Vec<usize>,
    pub weight: f64,
}

/// Integer-coded observational data.
///
/// Identical rows are merged into a single `WeightedRow`, so a dataset with
/// millions of samples over few variables stays small.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<WeightedRow>,
    total: f64,
}

impl Dataset {
    /// Builds a dataset where every row counts once.
    pub fn new<S>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<usize>>,
    ) -> Result<Dataset>
    where
        S: ToString,
    {
        Dataset::from_weighted_rows(columns, rows.into_iter().map(|row| (row, 1.0)))
    }

    /// Builds a dataset from `(row, multiplicity)` pairs.
    ///
    /// # Returns
    /// `MalformedRow` for rows of the wrong width or with a negative or
    /// non-finite weight, `EmptyDataset` when the total weight is zero.
    pub fn from_weighted_rows<S>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = (Vec<usize>, f64)>,
    ) -> Result<Dataset>
    where
        S: ToString,
    {
        let columns: Vec<String> = columns.into_iter().map(|c| c.to_string()).collect();
        let mut merged: IndexMap<Vec<usize>, f64> = IndexMap::new();
        for (line, (values, weight)) in rows.into_iter().enumerate() {
            if values.len() != columns.len() {
                return Err(BoundsError::MalformedRow {
                    line: line + 1,
                    reason: format!("expected {} values, got {}", columns.len(), values.len()),
                });
            }
            if !weight.is_finite() || weight < 0.0 {
                return Err(BoundsError::MalformedRow {
                    line: line + 1,
                    reason: format!("invalid weight {}", weight),
                });
            }
            *merged.entry(values).or_insert(0.0) += weight;
        }
        let total: f64 = merged.values().sum();
        if total <= 0.0 {
            return Err(BoundsError::EmptyDataset);
        }
        Ok(Dataset {
            columns,
            rows: merged
                .into_iter()
                .map(|(values, weight)| WeightedRow { values, weight })
                .collect(),
            total,
        })
    }

    /// Reads comma-separated text: a header with the column labels followed
    /// by one integer-coded row per line. Blank lines are skipped.
    pub fn from_csv_str(text: &str) -> Result<Dataset> {
        let mut lines = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());
        let header: Vec<String> = match lines.next() {
            Some((_, header)) => header.split(',').map(|c| c.trim().to_string()).collect(),
            None => return Err(BoundsError::EmptyDataset),
        };
        let mut rows = Vec::new();
        for (index, line) in lines {
            let row = line
                .split(',')
                .map(|cell| {
                    cell.trim().parse::<usize>().map_err(|_| BoundsError::MalformedRow {
                        line: index + 1,
                        reason: format!("'{}' is not a non-negative integer", cell.trim()),
                    })
                })
                .collect::<Result<Vec<usize>>>()?;
            if row.len() != header.len() {
                return Err(BoundsError::MalformedRow {
                    line: index + 1,
                    reason: format!("expected {} values, got {}", header.len(), row.len()),
                });
            }
            rows.push(row);
        }
        Dataset::new(header, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[WeightedRow] {
        &self.rows
    }

    pub fn total_mass(&self) -> f64 {
        self.total
    }

    pub fn column_index(&self, label: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| BoundsError::MissingColumn {
                column: label.to_string(),
            })
    }

    fn mass(&self, assignment: &[(usize, usize)]) -> f64 {
        self.rows
            .iter()
            .filter(|row| assignment.iter().all(|(col, value)| row.values[*col] == *value))
            .map(|row| row.weight)
            .sum()
    }

    /// Empirical joint probability of a label assignment.
    pub fn probability<S: AsRef<str>>(&self, assignment: &[(S, usize)]) -> Result<f64> {
        let indexed = self.index_assignment(assignment)?;
        Ok(self.mass(&indexed) / self.total)
    }

    /// P(target | condition), or 0 when the condition has no mass.
    pub fn conditional_probability<S: AsRef<str>>(
        &self,
        target: &[(S, usize)],
        condition: &[(S, usize)],
    ) -> Result<f64> {
        let target = self.index_assignment(target)?;
        let condition = self.index_assignment(condition)?;
        Ok(conditional(self.mass(&condition), || {
            self.mass(&[target, condition.clone()].concat())
        }))
    }

    fn index_assignment<S: AsRef<str>>(
        &self,
        assignment: &[(S, usize)],
    ) -> Result<Vec<(usize, usize)>> {
        assignment
            .iter()
            .map(|(label, value)| Ok((self.column_index(label.as_ref())?, *value)))
            .collect()
    }

    /// Checks that every observed node of `graph` has a column and that all
    /// values fit the node's cardinality.
    pub fn validate(&self, graph: &Graph) -> Result<()> {
        for node in graph.observed() {
            let column = self.column_index(graph.label(node))?;
            let cardinality = graph.node(node).cardinality;
            if let Some(row) = self.rows.iter().find(|row| row.values[column] >= cardinality) {
                return Err(BoundsError::ValueOutOfRange {
                    node_id: graph.label(node).to_string(),
                    value: row.values[column],
                    cardinality,
                });
            }
        }
        Ok(())
    }

    /// Binds the dataset to a graph so probabilities can be asked by node id.
    pub fn distribution<'a>(&'a self, graph: &Graph) -> Result<Distribution<'a>> {
        self.validate(graph)?;
        let columns = graph
            .nodes()
            .map(|(_, node)| {
                if node.is_latent {
                    None
                } else {
                    self.columns.iter().position(|c| *c == node.label)
                }
            })
            .collect();
        Ok(Distribution {
            dataset: self,
            columns,
        })
    }
}

fn conditional(condition_mass: f64, joint_mass: impl FnOnce() -> f64) -> f64 {
    if condition_mass <= 0.0 {
        0.0
    } else {
        joint_mass() / condition_mass
    }
}

/// Empirical distribution over the observed nodes of one graph.
#[derive(Clone, Debug)]
pub struct Distribution<'a> {
    dataset: &'a Dataset,
    columns: Vec<Option<usize>>,
}

impl Distribution<'_> {
    // Latent nodes have no column and are marginalized out.
    fn index(&self, assignment: &[(NodeId, usize)]) -> Vec<(usize, usize)> {
        assignment
            .iter()
            .filter_map(|(node, value)| {
                self.columns
                    .get(*node)
                    .copied()
                    .flatten()
                    .map(|c| (c, *value))
            })
            .collect()
    }

    pub fn probability(&self, assignment: &[(NodeId, usize)]) -> f64 {
        self.dataset.mass(&self.index(assignment)) / self.dataset.total
    }

    /// P(target | condition), 0 when P(condition) = 0.
    pub fn conditional(&self, target: &[(NodeId, usize)], condition: &[(NodeId, usize)]) -> f64 {
        let condition = self.index(condition);
        let joint: Vec<(usize, usize)> = self
            .index(target)
            .into_iter()
            .chain(condition.iter().copied())
            .collect();
        conditional(self.dataset.mass(&condition), || self.dataset.mass(&joint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_rows_are_merged() {
        let data = Dataset::new(["X", "Y"], vec![vec![0, 1], vec![0, 1], vec![1, 1]]).unwrap();
        assert_eq!(data.rows().len(), 2);
        assert!(approx(data.total_mass(), 3.0));
        assert!(approx(data.probability(&[("X", 0)]).unwrap(), 2.0 / 3.0));
        assert!(approx(data.probability(&[("X", 1), ("Y", 1)]).unwrap(), 1.0 / 3.0));
    }

    #[test]
    fn test_conditional_probability_with_empty_condition_is_zero() {
        let data = Dataset::new(["X", "Y"], vec![vec![0, 1], vec![0, 0]]).unwrap();
        assert!(approx(data.conditional_probability(&[("Y", 1)], &[("X", 0)]).unwrap(), 0.5));
        assert!(approx(data.conditional_probability(&[("Y", 1)], &[("X", 1)]).unwrap(), 0.0));
    }

    #[test]
    fn test_from_csv_str() {
        let data = Dataset::from_csv_str("X,Y\n0,1\n\n1,1\n1,0\n").unwrap();
        assert_eq!(data.columns(), &["X".to_string(), "Y".to_string()]);
        assert!(approx(data.probability(&[("Y", 1)]).unwrap(), 2.0 / 3.0));

        let err = Dataset::from_csv_str("X,Y\n0,a\n").unwrap_err();
        assert!(matches!(err, BoundsError::MalformedRow { line: 2, .. }));
        let err = Dataset::from_csv_str("X,Y\n0\n").unwrap_err();
        assert!(matches!(err, BoundsError::MalformedRow { line: 2, .. }));
        assert_eq!(Dataset::from_csv_str("").unwrap_err(), BoundsError::EmptyDataset);
        assert_eq!(Dataset::from_csv_str("X,Y\n").unwrap_err(), BoundsError::EmptyDataset);
    }

    #[test]
    fn test_unknown_column() {
        let data = Dataset::new(["X"], vec![vec![0]]).unwrap();
        assert_eq!(
            data.probability(&[("Z", 0)]).unwrap_err(),
            BoundsError::MissingColumn { column: "Z".into() }
        );
    }

    #[test]
    fn test_validate_against_graph() {
        let graph = Graph::parse("U1 -> X, U1 -> Y, X -> Y", ["U1"], &HashMap::new()).unwrap();
        let data = Dataset::new(["X", "Y"], vec![vec![0, 1], vec![1, 2]]).unwrap();
        assert_eq!(
            data.validate(&graph).unwrap_err(),
            BoundsError::ValueOutOfRange {
                node_id: "Y".into(),
                value: 2,
                cardinality: 2
            }
        );
        let data = Dataset::new(["X"], vec![vec![0]]).unwrap();
        assert!(matches!(data.validate(&graph), Err(BoundsError::MissingColumn { .. })));
    }

    #[test]
    fn test_distribution_by_node_id() {
        let graph = Graph::parse("U1 -> X, U1 -> Y, X -> Y", ["U1"], &HashMap::new()).unwrap();
        let data = Dataset::from_weighted_rows(
            ["Y", "X"],
            vec![(vec![1, 1], 3.0), (vec![0, 1], 1.0), (vec![0, 0], 4.0)],
        )
        .unwrap();
        let dist = data.distribution(&graph).unwrap();
        let (x, y) = (graph.node_id("X").unwrap(), graph.node_id("Y").unwrap());
        assert!(approx(dist.probability(&[(x, 1)]), 0.5));
        assert!(approx(dist.conditional(&[(y, 1)], &[(x, 1)]), 0.75));
        assert!(approx(dist.conditional(&[(y, 1)], &[]), 3.0 / 8.0));
    }
}
