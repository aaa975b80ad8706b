//! # Regressão Logística Multinomial (MaxEnt)
//!
//! Classificador discriminativo log-linear usado para o tipo do formulário.
//!
//! $$ P(c|x) = \frac{\exp(w_c \cdot x + b_c)}{\sum_k \exp(w_k \cdot x + b_k)} $$
//!
//! ## Treino
//!
//! Minimiza a entropia cruzada com regularização L2 nos coeficientes (o
//! intercepto não é penalizado), no estilo do `LogisticRegression` do
//! scikit-learn:
//!
//! ```text
//! f(W, b) = Σ_i -ln P(y_i | x_i) + 0.5·(1/C)·‖W‖²
//! ```
//!
//! O otimizador é L-BFGS com busca linear por bisseção do passo até o
//! objetivo diminuir. A soma sobre os exemplos roda em paralelo com rayon.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DitError, Result};
use crate::lbfgs::{dot, max_abs, Lbfgs, StopReason};
use crate::sparse::SparseVector;

/// Hiperparâmetros do treino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRegConfig {
    /// Inverso da força de regularização. Valores `<= 0` voltam ao default.
    pub c: f64,
    pub max_iter: usize,
    /// Tolerância em `max|g|`.
    pub epsilon: f64,
    pub memory: usize,
    pub max_linesearch: usize,
}

impl Default for LogRegConfig {
    fn default() -> Self {
        Self {
            c: 5.0,
            max_iter: 100,
            epsilon: 1e-5,
            memory: 10,
            max_linesearch: 20,
        }
    }
}

/// Modelo treinado: uma linha de coeficientes e um intercepto por classe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// Classes em ordem de primeira aparição no treino.
    pub classes: Vec<String>,
    /// `[K][D]`
    pub coef: Vec<Vec<f64>>,
    /// `[K]`
    pub intercept: Vec<f64>,
}

impl LogisticRegression {
    /// Treina a partir de vetores de mesma dimensão e seus labels.
    pub fn train(
        vectors: &[SparseVector],
        labels: &[String],
        config: &LogRegConfig,
    ) -> Result<Self> {
        if vectors.is_empty() {
            return Err(DitError::EmptyTrainingSet("nenhum vetor para a regressão logística"));
        }
        if vectors.len() != labels.len() {
            return Err(DitError::LabelCountMismatch {
                vectors: vectors.len(),
                labels: labels.len(),
            });
        }
        let dim = vectors[0].dim;
        if let Some((index, v)) = vectors.iter().enumerate().find(|(_, v)| v.dim != dim) {
            return Err(DitError::DimensionMismatch {
                index,
                expected: dim,
                found: v.dim,
            });
        }

        let mut classes: Vec<String> = Vec::new();
        let mut targets = Vec::with_capacity(labels.len());
        for label in labels {
            let id = match classes.iter().position(|c| c == label) {
                Some(id) => id,
                None => {
                    classes.push(label.clone());
                    classes.len() - 1
                }
            };
            targets.push(id);
        }

        info!(
            "Treinando regressão logística: {} exemplos, {} classes, {} features",
            vectors.len(),
            classes.len(),
            dim
        );

        let c = if config.c > 0.0 {
            config.c
        } else {
            let fallback = LogRegConfig::default().c;
            warn!("C = {} inválido; usando C = {}", config.c, fallback);
            fallback
        };
        let problem = Problem {
            vectors,
            targets: &targets,
            num_classes: classes.len(),
            dim,
            inv_c: 1.0 / c,
        };
        let initial = vec![0.0; problem.num_params()];
        let (params, stop) = minimize(initial, config, |p| problem.evaluate(p))?;
        debug!("Regressão logística terminou: {:?}", stop);

        let stride = dim + 1;
        let coef = (0..classes.len())
            .map(|k| params[k * stride..k * stride + dim].to_vec())
            .collect();
        let intercept = (0..classes.len()).map(|k| params[k * stride + dim]).collect();

        Ok(Self {
            classes,
            coef,
            intercept,
        })
    }

    /// Número de features esperado na entrada.
    pub fn dim(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    /// Scores lineares `w_c·x + b_c`, na ordem de `classes`.
    pub fn decision_function(&self, x: &SparseVector) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| x.dot(row) + b)
            .collect()
    }

    /// Classe de maior score (a primeira, em caso de empate).
    pub fn predict(&self, x: &SparseVector) -> Option<&str> {
        let scores = self.decision_function(x);
        let mut best: Option<(usize, f64)> = None;
        for (k, &s) in scores.iter().enumerate() {
            if best.map_or(true, |(_, b)| s > b) {
                best = Some((k, s));
            }
        }
        best.map(|(k, _)| self.classes[k].as_str())
    }

    /// Probabilidade de cada classe.
    pub fn predict_proba(&self, x: &SparseVector) -> HashMap<String, f64> {
        let probs = softmax(&self.decision_function(x));
        self.classes.iter().cloned().zip(probs).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.coef.len() != self.classes.len() || self.intercept.len() != self.classes.len() {
            return Err(DitError::InvalidModel(format!(
                "{} classes, {} linhas de coeficientes, {} interceptos",
                self.classes.len(),
                self.coef.len(),
                self.intercept.len()
            )));
        }
        let dim = self.dim();
        if self.coef.iter().any(|row| row.len() != dim) {
            return Err(DitError::InvalidModel(
                "linhas de coeficientes com tamanhos diferentes".into(),
            ));
        }
        Ok(())
    }
}

/// Softmax estabilizada (subtrai o máximo antes de exponenciar).
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Dados do problema de otimização. Parâmetros planos, por classe:
/// `[coef (D) | intercepto]`.
struct Problem<'a> {
    vectors: &'a [SparseVector],
    targets: &'a [usize],
    num_classes: usize,
    dim: usize,
    inv_c: f64,
}

impl Problem<'_> {
    fn num_params(&self) -> usize {
        self.num_classes * (self.dim + 1)
    }

    /// Objetivo regularizado e gradiente.
    fn evaluate(&self, params: &[f64]) -> (f64, Vec<f64>) {
        let n = params.len();
        let stride = self.dim + 1;

        let (mut f, mut g) = self
            .vectors
            .par_iter()
            .zip(self.targets.par_iter())
            .fold(
                || (0.0, vec![0.0; n]),
                |(mut f, mut g), (x, &y)| {
                    let scores: Vec<f64> = (0..self.num_classes)
                        .map(|k| {
                            let row = &params[k * stride..k * stride + self.dim];
                            x.dot(row) + params[k * stride + self.dim]
                        })
                        .collect();
                    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                    let log_sum = max + scores.iter().map(|s| (s - max).exp()).sum::<f64>().ln();
                    f += log_sum - scores[y];

                    for (k, s) in scores.iter().enumerate() {
                        let residual = (s - log_sum).exp() - if k == y { 1.0 } else { 0.0 };
                        let base = k * stride;
                        for (&i, &v) in x.indices.iter().zip(&x.values) {
                            if i < self.dim {
                                g[base + i] += residual * v;
                            }
                        }
                        g[base + self.dim] += residual;
                    }
                    (f, g)
                },
            )
            .reduce(
                || (0.0, vec![0.0; n]),
                |(f_left, mut g_left), (f_right, g_right)| {
                    for (a, b) in g_left.iter_mut().zip(g_right) {
                        *a += b;
                    }
                    (f_left + f_right, g_left)
                },
            );

        for k in 0..self.num_classes {
            for i in k * stride..k * stride + self.dim {
                f += 0.5 * self.inv_c * params[i] * params[i];
                g[i] += self.inv_c * params[i];
            }
        }
        (f, g)
    }
}

/// L-BFGS a partir de `params`. Uma tentativa da busca linear é aceita quando
/// o objetivo diminui; um valor não-finito conta como tentativa falha.
fn minimize<F>(
    mut params: Vec<f64>,
    config: &LogRegConfig,
    mut objective: F,
) -> Result<(Vec<f64>, StopReason)>
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    let (mut f, mut g) = objective(&params);
    if !f.is_finite() {
        return Err(DitError::NonFiniteObjective { iteration: 0 });
    }
    let mut history = Lbfgs::new(config.memory);

    for iteration in 1..=config.max_iter {
        if max_abs(&g) < config.epsilon {
            info!("Regressão logística convergiu após {} iterações", iteration - 1);
            return Ok((params, StopReason::Converged));
        }

        let d = history.direction(&g);
        let derivative = dot(&d, &g);
        if !(derivative < 0.0) {
            return Err(DitError::NonDescentDirection {
                iteration,
                derivative,
            });
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..config.max_linesearch {
            let trial: Vec<f64> = params.iter().zip(&d).map(|(p, dk)| p + step * dk).collect();
            let (f_new, g_new) = objective(&trial);
            if f_new.is_finite() && f_new < f {
                accepted = Some((trial, f_new, g_new));
                break;
            }
            step *= 0.5;
        }

        let Some((trial, f_new, g_new)) = accepted else {
            warn!(
                "Busca linear da regressão logística falhou na iteração {}; parando",
                iteration
            );
            return Ok((params, StopReason::LineSearchFailed));
        };

        let s: Vec<f64> = trial.iter().zip(&params).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = g_new.iter().zip(&g).map(|(a, b)| a - b).collect();
        history.update(s, y);

        params = trial;
        f = f_new;
        g = g_new;
        debug!(
            "Regressão logística iteração {}: objetivo {:.6}, passo {}, max|g| {:.3e}",
            iteration,
            f,
            step,
            max_abs(&g)
        );
    }

    if max_abs(&g) < config.epsilon {
        return Ok((params, StopReason::Converged));
    }
    info!(
        "Regressão logística parou no limite de {} iterações (objetivo {:.4})",
        config.max_iter, f
    );
    Ok((params, StopReason::MaxIterations))
}
