//! Gaussian hidden Markov model with diagonal covariances.
//!
//! Trained by Baum-Welch over several observation sequences; forward and
//! backward passes run in log space so long or badly fitting sequences do
//! not underflow.

use crate::config::HmmConfig;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// Lloyd iterations used to seed the state means.
const KMEANS_ITERATIONS: usize = 10;

/// One observation sequence: `sequence[t][d]`.
pub type Sequence = Vec<Vec<f64>>;

/// Progress of the EM fit for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceMonitor {
    pub iterations: usize,
    pub converged: bool,
    pub tolerance: f64,
    /// Total log-likelihood after each E-step
    pub history: Vec<f64>,
}

impl ConvergenceMonitor {
    fn new(tolerance: f64) -> Self {
        Self {
            iterations: 0,
            converged: false,
            tolerance,
            history: Vec::new(),
        }
    }

    /// Record one iteration; returns true once the gain falls under tolerance.
    fn report(&mut self, log_likelihood: f64) -> bool {
        let previous = self.history.last().copied();
        self.iterations += 1;
        self.history.push(log_likelihood);
        if let Some(previous) = previous {
            if (log_likelihood - previous).abs() < self.tolerance {
                self.converged = true;
            }
        }
        self.converged
    }

    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.history.last().copied()
    }
}

/// Gaussian HMM over continuous feature vectors.
#[derive(Debug, Clone)]
pub struct GaussianHmm {
    config: HmmConfig,
    dims: usize,
    start_prob: Vec<f64>,
    transitions: Vec<Vec<f64>>,
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
    monitor: ConvergenceMonitor,
    fitted: bool,
}

/// Per-sequence posteriors from one forward-backward pass.
struct Posteriors {
    log_likelihood: f64,
    /// `gamma[t][state]`
    gamma: Vec<Vec<f64>>,
    /// Expected transition counts summed over time
    xi_sum: Vec<Vec<f64>>,
}

impl GaussianHmm {
    pub fn new(config: HmmConfig) -> Self {
        Self {
            config,
            dims: 0,
            start_prob: Vec::new(),
            transitions: Vec::new(),
            means: Vec::new(),
            variances: Vec::new(),
            monitor: ConvergenceMonitor::new(config.tolerance),
            fitted: false,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn n_states(&self) -> usize {
        self.config.states_per_class
    }

    pub fn monitor(&self) -> &ConvergenceMonitor {
        &self.monitor
    }

    pub fn start_prob(&self) -> &[f64] {
        &self.start_prob
    }

    pub fn transitions(&self) -> &[Vec<f64>] {
        &self.transitions
    }

    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    /// Fit the model to `sequences` with Baum-Welch.
    pub fn fit(&mut self, sequences: &[Sequence]) -> Result<()> {
        let n_states = self.config.states_per_class;
        if n_states == 0 {
            return Err(PipelineError::InputValidation(
                "an HMM needs at least one state".to_string(),
            ));
        }

        let observations: Vec<&[f64]> = sequences
            .iter()
            .flat_map(|sequence| sequence.iter().map(Vec::as_slice))
            .collect();
        let dims = observations.first().map_or(0, |o| o.len());
        if dims == 0 {
            return Err(PipelineError::InputValidation(
                "no observations to fit".to_string(),
            ));
        }
        if observations.iter().any(|o| o.len() != dims) {
            return Err(PipelineError::InputValidation(
                "observations differ in dimensionality".to_string(),
            ));
        }
        if observations.len() < n_states {
            return Err(PipelineError::InputValidation(format!(
                "{} observations cannot seed {n_states} states",
                observations.len()
            )));
        }

        self.dims = dims;
        self.initialize(&observations);
        self.monitor = ConvergenceMonitor::new(self.config.tolerance);

        for iteration in 0..self.config.max_iterations {
            let mut total_log_likelihood = 0.0;
            let mut start_acc = vec![0.0; n_states];
            let mut trans_acc = vec![vec![0.0; n_states]; n_states];
            let mut weight_acc = vec![0.0; n_states];
            let mut mean_acc = vec![vec![0.0; dims]; n_states];
            let mut square_acc = vec![vec![0.0; dims]; n_states];

            for sequence in sequences.iter().filter(|s| !s.is_empty()) {
                let posteriors = self.posteriors(sequence)?;
                if !posteriors.log_likelihood.is_finite() {
                    tracing::debug!("sequence has zero likelihood, left out of this iteration");
                    continue;
                }
                total_log_likelihood += posteriors.log_likelihood;

                for (acc, gamma) in start_acc.iter_mut().zip(&posteriors.gamma[0]) {
                    *acc += gamma;
                }
                for (row_acc, row) in trans_acc.iter_mut().zip(&posteriors.xi_sum) {
                    for (acc, xi) in row_acc.iter_mut().zip(row) {
                        *acc += xi;
                    }
                }
                for (observation, gamma) in sequence.iter().zip(&posteriors.gamma) {
                    for state in 0..n_states {
                        let weight = gamma[state];
                        weight_acc[state] += weight;
                        for (d, &x) in observation.iter().enumerate() {
                            mean_acc[state][d] += weight * x;
                            square_acc[state][d] += weight * x * x;
                        }
                    }
                }
            }

            tracing::debug!(
                "EM iteration {}: log-likelihood {:.4}",
                iteration + 1,
                total_log_likelihood
            );
            let converged = self.monitor.report(total_log_likelihood);

            self.maximize(&start_acc, &trans_acc, &weight_acc, &mean_acc, &square_acc);
            if converged {
                break;
            }
        }

        self.fitted = true;
        Ok(())
    }

    /// Log-likelihood of one observation sequence under the fitted model.
    pub fn score(&self, sequence: &[Vec<f64>]) -> Result<f64> {
        if !self.fitted {
            return Err(PipelineError::ModelNotFitted);
        }
        if sequence.is_empty() {
            return Err(PipelineError::InputValidation(
                "cannot score an empty sequence".to_string(),
            ));
        }
        if sequence.iter().any(|o| o.len() != self.dims) {
            return Err(PipelineError::InputValidation(format!(
                "model expects {}-dimensional observations",
                self.dims
            )));
        }

        let log_emissions = self.log_emissions(sequence)?;
        let log_alpha = self.forward(&log_emissions);
        Ok(log_sum_exp(log_alpha.last().map_or(&[][..], Vec::as_slice)))
    }

    /// Uniform start and transition probabilities, k-means means, pooled variances.
    fn initialize(&mut self, observations: &[&[f64]]) {
        let n_states = self.config.states_per_class;
        let uniform = 1.0 / n_states as f64;
        self.start_prob = vec![uniform; n_states];
        self.transitions = vec![vec![uniform; n_states]; n_states];
        self.means = kmeans(observations, n_states);

        let count = observations.len() as f64;
        let pooled: Vec<f64> = (0..self.dims)
            .map(|d| {
                let mean = observations.iter().map(|o| o[d]).sum::<f64>() / count;
                let variance =
                    observations.iter().map(|o| (o[d] - mean).powi(2)).sum::<f64>() / count;
                variance + self.config.min_covariance
            })
            .collect();
        self.variances = vec![pooled; n_states];
    }

    fn maximize(
        &mut self,
        start_acc: &[f64],
        trans_acc: &[Vec<f64>],
        weight_acc: &[f64],
        mean_acc: &[Vec<f64>],
        square_acc: &[Vec<f64>],
    ) {
        let start_total: f64 = start_acc.iter().sum();
        if start_total > 0.0 {
            self.start_prob = start_acc.iter().map(|v| v / start_total).collect();
        }

        for (row, acc) in self.transitions.iter_mut().zip(trans_acc) {
            let total: f64 = acc.iter().sum();
            if total > 0.0 {
                *row = acc.iter().map(|v| v / total).collect();
            }
        }

        for state in 0..self.config.states_per_class {
            let weight = weight_acc[state];
            // States nobody visited keep their parameters.
            if weight <= f64::EPSILON {
                continue;
            }
            for d in 0..self.dims {
                let mean = mean_acc[state][d] / weight;
                let variance = (square_acc[state][d] / weight - mean * mean).max(0.0);
                self.means[state][d] = mean;
                self.variances[state][d] = variance + self.config.min_covariance;
            }
        }
    }

    /// `log b_state(o_t)` for every step and state.
    fn log_emissions(&self, sequence: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        let densities = self
            .means
            .iter()
            .zip(&self.variances)
            .map(|(means, variances)| {
                means
                    .iter()
                    .zip(variances)
                    .map(|(&mean, &variance)| {
                        Normal::new(mean, variance.sqrt())
                            .map_err(|e| PipelineError::Numerical(e.to_string()))
                    })
                    .collect::<Result<Vec<Normal>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(sequence
            .iter()
            .map(|observation| {
                densities
                    .iter()
                    .map(|state| {
                        state
                            .iter()
                            .zip(observation)
                            .map(|(normal, &x)| normal.ln_pdf(x))
                            .sum::<f64>()
                    })
                    .collect()
            })
            .collect())
    }

    fn forward(&self, log_emissions: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let n_states = self.config.states_per_class;
        let log_start: Vec<f64> = self.start_prob.iter().map(|p| p.ln()).collect();
        let log_trans = self.log_transitions();

        let mut log_alpha: Vec<Vec<f64>> = Vec::with_capacity(log_emissions.len());
        for (t, emissions) in log_emissions.iter().enumerate() {
            let row: Vec<f64> = if t == 0 {
                (0..n_states).map(|j| log_start[j] + emissions[j]).collect()
            } else {
                let previous = &log_alpha[t - 1];
                (0..n_states)
                    .map(|j| {
                        let incoming: Vec<f64> =
                            (0..n_states).map(|i| previous[i] + log_trans[i][j]).collect();
                        log_sum_exp(&incoming) + emissions[j]
                    })
                    .collect()
            };
            log_alpha.push(row);
        }
        log_alpha
    }

    fn backward(&self, log_emissions: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let n_states = self.config.states_per_class;
        let steps = log_emissions.len();
        let log_trans = self.log_transitions();

        let mut log_beta = vec![vec![0.0; n_states]; steps];
        for t in (0..steps.saturating_sub(1)).rev() {
            for i in 0..n_states {
                let outgoing: Vec<f64> = (0..n_states)
                    .map(|j| log_trans[i][j] + log_emissions[t + 1][j] + log_beta[t + 1][j])
                    .collect();
                log_beta[t][i] = log_sum_exp(&outgoing);
            }
        }
        log_beta
    }

    fn posteriors(&self, sequence: &[Vec<f64>]) -> Result<Posteriors> {
        let n_states = self.config.states_per_class;
        let log_emissions = self.log_emissions(sequence)?;
        let log_alpha = self.forward(&log_emissions);
        let log_beta = self.backward(&log_emissions);
        let log_trans = self.log_transitions();

        let log_likelihood = log_sum_exp(log_alpha.last().map_or(&[][..], Vec::as_slice));
        if !log_likelihood.is_finite() {
            return Ok(Posteriors {
                log_likelihood,
                gamma: Vec::new(),
                xi_sum: Vec::new(),
            });
        }

        let gamma = log_alpha
            .iter()
            .zip(&log_beta)
            .map(|(alpha, beta)| {
                alpha
                    .iter()
                    .zip(beta)
                    .map(|(a, b)| (a + b - log_likelihood).exp())
                    .collect()
            })
            .collect();

        let mut xi_sum = vec![vec![0.0; n_states]; n_states];
        for t in 0..sequence.len().saturating_sub(1) {
            for i in 0..n_states {
                for j in 0..n_states {
                    let log_xi = log_alpha[t][i]
                        + log_trans[i][j]
                        + log_emissions[t + 1][j]
                        + log_beta[t + 1][j]
                        - log_likelihood;
                    xi_sum[i][j] += log_xi.exp();
                }
            }
        }

        Ok(Posteriors {
            log_likelihood,
            gamma,
            xi_sum,
        })
    }

    fn log_transitions(&self) -> Vec<Vec<f64>> {
        self.transitions
            .iter()
            .map(|row| row.iter().map(|p| p.ln()).collect())
            .collect()
    }
}

/// `ln(sum(exp(values)))`, or negative infinity for an empty or all-zero input.
fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Deterministic k-means: seeds spread evenly through the data, then Lloyd steps.
fn kmeans(observations: &[&[f64]], k: usize) -> Vec<Vec<f64>> {
    let count = observations.len();
    let mut centers: Vec<Vec<f64>> = (0..k)
        .map(|c| observations[c * count / k].to_vec())
        .collect();

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![vec![0.0; centers[0].len()]; k];
        let mut counts = vec![0usize; k];
        for observation in observations {
            let nearest = nearest_center(&centers, observation);
            counts[nearest] += 1;
            for (sum, x) in sums[nearest].iter_mut().zip(observation.iter()) {
                *sum += x;
            }
        }

        let mut moved = false;
        for (c, (sum, &n)) in sums.iter().zip(&counts).enumerate() {
            // Empty clusters keep their seed.
            if n == 0 {
                continue;
            }
            let updated: Vec<f64> = sum.iter().map(|s| s / n as f64).collect();
            if updated != centers[c] {
                moved = true;
                centers[c] = updated;
            }
        }
        if !moved {
            break;
        }
    }
    centers
}

fn nearest_center(centers: &[Vec<f64>], observation: &[f64]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, center) in centers.iter().enumerate() {
        let distance: f64 = center
            .iter()
            .zip(observation)
            .map(|(c, x)| (c - x).powi(2))
            .sum();
        if distance < best_distance {
            best = index;
            best_distance = distance;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(states: usize) -> HmmConfig {
        HmmConfig {
            states_per_class: states,
            ..HmmConfig::default()
        }
    }

    /// Short sequences that drift from `low` up to `high` and back.
    fn sequences(low: f64, high: f64, count: usize) -> Vec<Sequence> {
        (0..count)
            .map(|s| {
                let jitter = s as f64 * 0.01;
                vec![
                    vec![low + jitter, low],
                    vec![high - jitter, high],
                    vec![high + jitter, high - 0.05],
                    vec![low - jitter, low + 0.05],
                ]
            })
            .collect()
    }

    #[test]
    fn test_fit_produces_valid_distributions() {
        let mut hmm = GaussianHmm::new(config(2));
        hmm.fit(&sequences(0.1, 0.9, 5)).unwrap();

        assert!(hmm.is_fitted());
        let start: f64 = hmm.start_prob().iter().sum();
        assert!((start - 1.0).abs() < 1e-9);
        for row in hmm.transitions() {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        assert_eq!(hmm.means().len(), 2);
    }

    #[test]
    fn test_monitor_tracks_iterations() {
        let mut hmm = GaussianHmm::new(HmmConfig {
            states_per_class: 2,
            max_iterations: 5,
            ..HmmConfig::default()
        });
        hmm.fit(&sequences(0.2, 0.8, 6)).unwrap();

        let monitor = hmm.monitor();
        assert!(monitor.iterations >= 1 && monitor.iterations <= 5);
        assert_eq!(monitor.history.len(), monitor.iterations);
        assert!(monitor.history.iter().all(|ll| ll.is_finite()));
        if monitor.iterations < 5 {
            assert!(monitor.converged);
        }
    }

    #[test]
    fn test_own_data_scores_higher() {
        let mut low = GaussianHmm::new(config(2));
        low.fit(&sequences(0.0, 0.3, 5)).unwrap();
        let mut high = GaussianHmm::new(config(2));
        high.fit(&sequences(0.7, 1.0, 5)).unwrap();

        let probe = &sequences(0.0, 0.3, 1)[0];
        assert!(low.score(probe).unwrap() > high.score(probe).unwrap());
    }

    #[test]
    fn test_score_before_fit() {
        let hmm = GaussianHmm::new(config(2));
        assert_eq!(
            hmm.score(&[vec![0.0, 1.0]]).unwrap_err(),
            PipelineError::ModelNotFitted
        );
    }

    #[test]
    fn test_too_few_observations() {
        let mut hmm = GaussianHmm::new(config(3));
        let result = hmm.fit(&[vec![vec![0.0], vec![1.0]]]);
        assert!(matches!(result, Err(PipelineError::InputValidation(_))));
        assert!(!hmm.is_fitted());
    }

    #[test]
    fn test_score_rejects_wrong_dimension() {
        let mut hmm = GaussianHmm::new(config(2));
        hmm.fit(&sequences(0.1, 0.9, 3)).unwrap();
        assert!(matches!(
            hmm.score(&[vec![0.5]]),
            Err(PipelineError::InputValidation(_))
        ));
    }

    #[test]
    fn test_constant_data_stays_finite() {
        let mut hmm = GaussianHmm::new(config(2));
        let flat = vec![vec![vec![0.0; 3]; 4]; 3];
        hmm.fit(&flat).unwrap();
        assert!(hmm.score(&flat[0]).unwrap().is_finite());
    }

    #[test]
    fn test_log_sum_exp() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 2]), f64::NEG_INFINITY);
        let value = log_sum_exp(&[0.0_f64.ln(), 2.0_f64.ln(), 3.0_f64.ln()]);
        assert!((value - 5.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_kmeans_separates_clusters() {
        let data: Vec<Vec<f64>> = vec![
            vec![0.0],
            vec![0.1],
            vec![0.05],
            vec![5.0],
            vec![5.1],
            vec![4.9],
        ];
        let refs: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        let mut centers = kmeans(&refs, 2);
        centers.sort_by(|a, b| a[0].total_cmp(&b[0]));
        assert!((centers[0][0] - 0.05).abs() < 1e-9);
        assert!((centers[1][0] - 5.0).abs() < 1e-9);
    }
}
