//! # Forward-Backward com Escalonamento
//!
//! Calcula, para uma sequência, a função de partição `Z` e as marginais
//! `P(y_t = j | x)`. Em vez de trabalhar em log-space com log-sum-exp, cada
//! vetor forward é normalizado para somar 1 e o fator de normalização
//! (`scale[t]`) é guardado. Os laços internos ficam só com multiplicações.
//!
//! ```text
//! α[0][y]  = exp(state[0][y])                                 · scale[0]
//! α[t][y]  = exp(state[t][y]) · Σ_yp α[t-1][yp]·exp(trans[yp][y]) · scale[t]
//! β[T-1][y] = scale[T-1]
//! β[t][y]  = Σ_yn exp(trans[y][yn])·exp(state[t+1][yn])·β[t+1][yn] · scale[t]
//!
//! log Z = -Σ_t ln scale[t]
//! P(y_t = j)            = α[t][j]·β[t][j] / scale[t]
//! P(y_t-1 = i, y_t = j) = α[t-1][i]·exp(trans[i][j])·exp(state[t][j])·β[t][j]
//! ```

/// Resultado do forward-backward para uma sequência.
#[derive(Debug, Clone, Default)]
pub struct ForwardBackward {
    /// Log da função de partição.
    pub log_z: f64,
    /// `[T][L]` marginais por posição.
    pub marginals: Vec<Vec<f64>>,
    /// `[T][L]` variáveis forward escalonadas.
    pub alpha: Vec<Vec<f64>>,
    /// `[T][L]` variáveis backward escalonadas.
    pub beta: Vec<Vec<f64>>,
    /// `[T]` fatores de escala.
    pub scale: Vec<f64>,
    exp_state: Vec<Vec<f64>>,
    exp_trans: Vec<Vec<f64>>,
}

fn exp_matrix(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
    m.iter()
        .map(|row| row.iter().map(|v| v.exp()).collect())
        .collect()
}

/// Inverso da soma; 1.0 quando a soma é zero (linha sem massa).
fn inverse_or_one(sum: f64) -> f64 {
    if sum == 0.0 {
        1.0
    } else {
        1.0 / sum
    }
}

impl ForwardBackward {
    /// Executa o algoritmo.
    ///
    /// - `state`: `[T][L]` scores de estado.
    /// - `trans`: `[L][L]` scores de transição.
    pub fn compute(state: &[Vec<f64>], trans: &[Vec<f64>]) -> Self {
        let n = state.len();
        if n == 0 {
            return Self::default();
        }
        let l = state[0].len();
        let exp_state = exp_matrix(state);
        let exp_trans = exp_matrix(trans);

        // Forward
        let mut alpha = vec![vec![0.0; l]; n];
        let mut scale = vec![1.0; n];

        alpha[0].copy_from_slice(&exp_state[0]);
        scale[0] = inverse_or_one(alpha[0].iter().sum());
        for a in &mut alpha[0] {
            *a *= scale[0];
        }

        for t in 1..n {
            let mut sum = 0.0;
            for y in 0..l {
                let s: f64 = (0..l).map(|yp| alpha[t - 1][yp] * exp_trans[yp][y]).sum();
                alpha[t][y] = s * exp_state[t][y];
                sum += alpha[t][y];
            }
            scale[t] = inverse_or_one(sum);
            for a in &mut alpha[t] {
                *a *= scale[t];
            }
        }

        // Backward, reaproveitando os mesmos fatores de escala
        let mut beta = vec![vec![0.0; l]; n];
        for b in &mut beta[n - 1] {
            *b = scale[n - 1];
        }
        for t in (0..n - 1).rev() {
            for y in 0..l {
                let s: f64 = (0..l)
                    .map(|yn| exp_trans[y][yn] * exp_state[t + 1][yn] * beta[t + 1][yn])
                    .sum();
                beta[t][y] = s * scale[t];
            }
        }

        let log_z = -scale.iter().map(|s| s.ln()).sum::<f64>();

        let marginals = (0..n)
            .map(|t| (0..l).map(|y| alpha[t][y] * beta[t][y] / scale[t]).collect())
            .collect();

        Self {
            log_z,
            marginals,
            alpha,
            beta,
            scale,
            exp_state,
            exp_trans,
        }
    }

    /// Número de posições.
    pub fn len(&self) -> usize {
        self.alpha.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.is_empty()
    }

    /// `P(y_{t-1} = i, y_t = j | x)` para `1 <= t < T`.
    pub fn pairwise_marginal(&self, t: usize, i: usize, j: usize) -> f64 {
        self.alpha[t - 1][i] * self.exp_trans[i][j] * self.exp_state[t][j] * self.beta[t][j]
    }

    /// Todas as marginais de transição, `[T-1][L][L]`.
    pub fn pairwise_marginals(&self) -> Vec<Vec<Vec<f64>>> {
        let l = self.exp_trans.len();
        (1..self.len())
            .map(|t| {
                (0..l)
                    .map(|i| (0..l).map(|j| self.pairwise_marginal(t, i, j)).collect())
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crf::path_score;

    fn all_paths(len: usize, labels: usize) -> Vec<Vec<usize>> {
        let mut paths = vec![vec![]];
        for _ in 0..len {
            paths = paths
                .into_iter()
                .flat_map(|p| {
                    (0..labels).map(move |y| {
                        let mut q = p.clone();
                        q.push(y);
                        q
                    })
                })
                .collect();
        }
        paths
    }

    fn brute_force_log_z(state: &[Vec<f64>], trans: &[Vec<f64>]) -> f64 {
        all_paths(state.len(), state[0].len())
            .iter()
            .map(|p| path_score(state, trans, p).exp())
            .sum::<f64>()
            .ln()
    }

    #[test]
    fn test_log_z_matches_brute_force_two_labels() {
        let state = vec![vec![1.0, 0.5], vec![0.3, 2.0]];
        let trans = vec![vec![0.1, 0.2], vec![0.3, 0.1]];
        let fb = ForwardBackward::compute(&state, &trans);
        assert!(fb.log_z.is_finite());
        assert!((fb.log_z - brute_force_log_z(&state, &trans)).abs() < 1e-9);
    }

    #[test]
    fn test_log_z_matches_brute_force_three_labels() {
        let state = vec![
            vec![0.2, -1.0, 0.7],
            vec![1.5, 0.0, -0.3],
            vec![-0.4, 2.2, 0.9],
        ];
        let trans = vec![
            vec![0.5, -0.2, 0.0],
            vec![1.0, 0.3, -0.7],
            vec![-0.1, 0.4, 0.8],
        ];
        let fb = ForwardBackward::compute(&state, &trans);
        assert!((fb.log_z - brute_force_log_z(&state, &trans)).abs() < 1e-9);
    }

    #[test]
    fn test_marginals_sum_to_one() {
        let state = vec![vec![3.0, -2.0, 0.1], vec![0.0, 0.0, 0.0], vec![-5.0, 4.0, 1.0]];
        let trans = vec![vec![0.2; 3], vec![-1.0; 3], vec![0.7; 3]];
        let fb = ForwardBackward::compute(&state, &trans);
        for row in &fb.marginals {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_marginals_match_brute_force() {
        let state = vec![vec![1.0, 0.5], vec![0.3, 2.0], vec![0.0, -1.0]];
        let trans = vec![vec![0.1, 0.2], vec![0.3, 0.1]];
        let fb = ForwardBackward::compute(&state, &trans);

        let z: f64 = brute_force_log_z(&state, &trans).exp();
        let paths = all_paths(3, 2);
        for t in 0..3 {
            for y in 0..2 {
                let p: f64 = paths
                    .iter()
                    .filter(|path| path[t] == y)
                    .map(|path| path_score(&state, &trans, path).exp())
                    .sum::<f64>()
                    / z;
                assert!((fb.marginals[t][y] - p).abs() < 1e-9);
            }
        }
        // marginal de transição (posições 0→1, labels 1→0)
        let p: f64 = paths
            .iter()
            .filter(|path| path[0] == 1 && path[1] == 0)
            .map(|path| path_score(&state, &trans, path).exp())
            .sum::<f64>()
            / z;
        assert!((fb.pairwise_marginal(1, 1, 0) - p).abs() < 1e-9);
    }

    #[test]
    fn test_pairwise_marginals_sum_to_one() {
        let state = vec![vec![1.0, 0.5], vec![0.3, 2.0], vec![0.0, -1.0]];
        let trans = vec![vec![0.1, 0.2], vec![0.3, 0.1]];
        let fb = ForwardBackward::compute(&state, &trans);
        let pairwise = fb.pairwise_marginals();
        assert_eq!(pairwise.len(), 2);
        for matrix in &pairwise {
            let sum: f64 = matrix.iter().flatten().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let fb = ForwardBackward::compute(&[], &[vec![0.0]]);
        assert!(fb.is_empty());
        assert_eq!(fb.log_z, 0.0);
        assert!(fb.pairwise_marginals().is_empty());
    }
}
