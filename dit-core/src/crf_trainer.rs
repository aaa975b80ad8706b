//! # Treino do CRF com OWL-QN
//!
//! Minimiza a log-verossimilhança negativa regularizada:
//!
//! ```text
//! f(w) = Σ_seq [log Z(x) - score(y*, x)] + 0.5·c2·‖w‖² + c1·Σ|w|
//! ```
//!
//! A parte suave (NLL + L2) é diferenciável; o termo L1 não é em `w = 0`.
//! O OWL-QN (Andrew & Gao, 2007) contorna isso trocando o gradiente por um
//! **pseudo-gradiente** e restringindo cada passo a um único orthant:
//!
//! 1. pseudo-gradiente `pg` a partir de `∇(NLL + L2)` e `c1`;
//! 2. direção L-BFGS sobre `pg`, zerando componentes cujo sinal não desce;
//! 3. busca linear com backtracking, projetando o ponto de teste no orthant
//!    de `w` (ou de `-pg` onde `w = 0`);
//! 4. histórico atualizado com `s = Δw` e `y = Δpg`.
//!
//! O gradiente de cada sequência é `E_modelo[f] - f(y*)`: marginais do
//! forward-backward menos as contagens do caminho anotado. A soma sobre as
//! sequências roda em paralelo com rayon.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alphabet::Alphabet;
use crate::crf::{path_score, CrfModel, TrainingSequence};
use crate::error::{DitError, Result};
use crate::forward_backward::ForwardBackward;
use crate::lbfgs::{dot, max_abs, Lbfgs};

pub use crate::lbfgs::StopReason;

/// Hiperparâmetros do treino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrfTrainerConfig {
    /// Coeficiente L1.
    pub c1: f64,
    /// Coeficiente L2.
    pub c2: f64,
    pub max_iterations: usize,
    /// Tolerância em `max|pg|`.
    pub epsilon: f64,
    /// Pares guardados pelo L-BFGS.
    pub memory: usize,
    pub max_linesearch: usize,
}

impl Default for CrfTrainerConfig {
    fn default() -> Self {
        Self {
            c1: 0.1655,
            c2: 0.0236,
            max_iterations: 100,
            epsilon: 1e-5,
            memory: 10,
            max_linesearch: 20,
        }
    }
}

const ARMIJO: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub iterations: usize,
    pub objective: f64,
    pub stop: StopReason,
}

/// Sequência com ids no lugar das strings. Os atributos de cada posição
/// ficam ordenados por id.
struct Encoded {
    features: Vec<Vec<(usize, f64)>>,
    labels: Vec<usize>,
}

/// Treina um CRF a partir das sequências anotadas.
pub fn train(sequences: &[TrainingSequence], config: &CrfTrainerConfig) -> Result<CrfModel> {
    train_with_summary(sequences, config).map(|(model, _)| model)
}

/// Como [`train`], devolvendo também o resumo da otimização.
pub fn train_with_summary(
    sequences: &[TrainingSequence],
    config: &CrfTrainerConfig,
) -> Result<(CrfModel, TrainSummary)> {
    check_sequences(sequences)?;

    let (labels, attributes) = build_alphabets(sequences);
    let encoded = encode(sequences, &labels, &attributes);
    let mut model = CrfModel::new(labels, attributes);

    info!(
        "Treinando CRF: {} sequências, {} labels, {} atributos, {} pesos",
        sequences.len(),
        model.num_labels,
        model.attributes.len(),
        model.num_weights()
    );

    let num_labels = model.num_labels;
    let trans_offset = model.trans_offset();
    let c2 = config.c2;
    let objective = |w: &[f64]| -> (f64, Vec<f64>) {
        let (mut f, mut g) = negative_log_likelihood(&encoded, w, num_labels, trans_offset);
        if c2 > 0.0 {
            f += 0.5 * c2 * dot(w, w);
            for (gk, wk) in g.iter_mut().zip(w) {
                *gk += c2 * wk;
            }
        }
        (f, g)
    };

    let summary = owlqn(&mut model.weights, config, objective)?;

    let active = model.weights.iter().filter(|w| **w != 0.0).count();
    info!(
        "CRF treinado em {} iterações ({:?}): objetivo {:.4}, {} pesos ativos",
        summary.iterations, summary.stop, summary.objective, active
    );
    Ok((model, summary))
}

fn check_sequences(sequences: &[TrainingSequence]) -> Result<()> {
    if sequences.is_empty() {
        return Err(DitError::EmptyTrainingSet("nenhuma sequência para o CRF"));
    }
    for (index, seq) in sequences.iter().enumerate() {
        if seq.features.len() != seq.labels.len() {
            return Err(DitError::LengthMismatch {
                index,
                features: seq.features.len(),
                labels: seq.labels.len(),
            });
        }
        if seq.labels.is_empty() {
            return Err(DitError::EmptySequence { index });
        }
    }
    Ok(())
}

/// Alfabetos em ordem de primeira aparição. Dentro de uma posição os
/// atributos são visitados em ordem lexicográfica.
fn build_alphabets(sequences: &[TrainingSequence]) -> (Alphabet, Alphabet) {
    let mut labels = Alphabet::new();
    let mut attributes = Alphabet::new();
    for seq in sequences {
        for label in &seq.labels {
            labels.add(label);
        }
        for position in &seq.features {
            let mut names: Vec<&String> = position.keys().collect();
            names.sort();
            for name in names {
                attributes.add(name);
            }
        }
    }
    (labels, attributes)
}

fn encode(
    sequences: &[TrainingSequence],
    labels: &Alphabet,
    attributes: &Alphabet,
) -> Vec<Encoded> {
    sequences
        .iter()
        .map(|seq| Encoded {
            features: seq
                .features
                .iter()
                .map(|position| {
                    let mut row: Vec<(usize, f64)> = position
                        .iter()
                        .filter_map(|(name, &v)| attributes.get(name).map(|a| (a, v)))
                        .collect();
                    row.sort_by_key(|&(a, _)| a);
                    row
                })
                .collect(),
            labels: seq.labels.iter().filter_map(|l| labels.get(l)).collect(),
        })
        .collect()
}

/// NLL e gradiente somados sobre todas as sequências (sem regularização).
fn negative_log_likelihood(
    encoded: &[Encoded],
    w: &[f64],
    num_labels: usize,
    trans_offset: usize,
) -> (f64, Vec<f64>) {
    let l = num_labels;
    let n = w.len();
    let trans: Vec<Vec<f64>> = (0..l)
        .map(|i| w[trans_offset + i * l..trans_offset + (i + 1) * l].to_vec())
        .collect();

    encoded
        .par_iter()
        .fold(
            || (0.0, vec![0.0; n]),
            |(mut f, mut g), seq| {
                let state: Vec<Vec<f64>> = seq
                    .features
                    .iter()
                    .map(|row| {
                        let mut scores = vec![0.0; l];
                        for &(a, v) in row {
                            for (y, s) in scores.iter_mut().enumerate() {
                                *s += w[a * l + y] * v;
                            }
                        }
                        scores
                    })
                    .collect();

                let fb = ForwardBackward::compute(&state, &trans);
                f += fb.log_z - path_score(&state, &trans, &seq.labels);

                for (t, row) in seq.features.iter().enumerate() {
                    let gold = seq.labels[t];
                    for &(a, v) in row {
                        for y in 0..l {
                            let observed = if y == gold { 1.0 } else { 0.0 };
                            g[a * l + y] += v * (fb.marginals[t][y] - observed);
                        }
                    }
                }
                for t in 1..seq.labels.len() {
                    for i in 0..l {
                        for j in 0..l {
                            g[trans_offset + i * l + j] += fb.pairwise_marginal(t, i, j);
                        }
                    }
                    g[trans_offset + seq.labels[t - 1] * l + seq.labels[t]] -= 1.0;
                }
                (f, g)
            },
        )
        .reduce(
            || (0.0, vec![0.0; n]),
            |(f_left, mut g_left), (f_right, g_right)| {
                for (x, y) in g_left.iter_mut().zip(g_right) {
                    *x += y;
                }
                (f_left + f_right, g_left)
            },
        )
}

/// `-1`, `0` ou `1`. (`f64::signum` devolve 1 para `+0.0`.)
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn l1_norm(w: &[f64]) -> f64 {
    w.iter().map(|x| x.abs()).sum()
}

/// Subgradiente de menor norma de `f + c1·‖w‖₁`.
fn pseudo_gradient(w: &[f64], grad: &[f64], c1: f64) -> Vec<f64> {
    w.iter()
        .zip(grad)
        .map(|(&wk, &gk)| {
            if wk > 0.0 {
                gk + c1
            } else if wk < 0.0 {
                gk - c1
            } else if gk + c1 < 0.0 {
                gk + c1
            } else if gk - c1 > 0.0 {
                gk - c1
            } else {
                0.0
            }
        })
        .collect()
}

/// Minimiza `objective(w) + c1·‖w‖₁` a partir de `w`, atualizando-o.
///
/// `objective` devolve o valor e o gradiente da parte suave; é avaliado uma
/// vez por ponto de teste e o resultado do ponto aceito é reaproveitado na
/// iteração seguinte.
fn owlqn<F>(w: &mut Vec<f64>, config: &CrfTrainerConfig, mut objective: F) -> Result<TrainSummary>
where
    F: FnMut(&[f64]) -> (f64, Vec<f64>),
{
    let c1 = config.c1;
    let (loss, grad) = objective(w);
    let mut f = loss + c1 * l1_norm(w);
    if !f.is_finite() {
        return Err(DitError::NonFiniteObjective { iteration: 0 });
    }
    let mut pg = pseudo_gradient(w, &grad, c1);
    let mut history = Lbfgs::new(config.memory);

    let mut iterations = 0;
    let mut stop = StopReason::MaxIterations;

    while iterations < config.max_iterations {
        if max_abs(&pg) < config.epsilon {
            stop = StopReason::Converged;
            break;
        }
        iterations += 1;

        let mut d = history.direction(&pg);
        for (dk, pk) in d.iter_mut().zip(&pg) {
            if *dk * pk >= 0.0 {
                *dk = 0.0;
            }
        }
        let derivative = dot(&d, &pg);
        if !(derivative < 0.0) {
            return Err(DitError::NonDescentDirection {
                iteration: iterations,
                derivative,
            });
        }

        let orthant: Vec<f64> = w
            .iter()
            .zip(&pg)
            .map(|(&wk, &pk)| if wk != 0.0 { sign(wk) } else { -sign(pk) })
            .collect();

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..config.max_linesearch {
            let w_new: Vec<f64> = w
                .iter()
                .zip(&d)
                .zip(&orthant)
                .map(|((&wk, &dk), &xi)| {
                    let v = wk + step * dk;
                    if v * xi <= 0.0 {
                        0.0
                    } else {
                        v
                    }
                })
                .collect();

            let (loss_new, grad_new) = objective(&w_new);
            let f_new = loss_new + c1 * l1_norm(&w_new);
            // passo grande demais estoura o exp(); conta como tentativa falha
            if !f_new.is_finite() {
                step *= 0.5;
                continue;
            }

            let decrease: f64 = pg
                .iter()
                .zip(w_new.iter().zip(w.iter()))
                .map(|(pk, (a, b))| pk * (a - b))
                .sum();
            if f_new <= f + ARMIJO * decrease {
                accepted = Some((w_new, f_new, grad_new));
                break;
            }
            step *= 0.5;
        }

        let Some((w_new, f_new, grad_new)) = accepted else {
            warn!(
                "Busca linear do CRF falhou na iteração {}; mantendo os últimos pesos aceitos",
                iterations
            );
            stop = StopReason::LineSearchFailed;
            break;
        };

        let pg_new = pseudo_gradient(&w_new, &grad_new, c1);
        let s: Vec<f64> = w_new.iter().zip(w.iter()).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = pg_new.iter().zip(&pg).map(|(a, b)| a - b).collect();
        history.update(s, y);

        *w = w_new;
        f = f_new;
        pg = pg_new;

        debug!(
            "CRF iteração {}: objetivo {:.6}, passo {}, max|pg| {:.3e}",
            iterations,
            f,
            step,
            max_abs(&pg)
        );
    }

    if stop == StopReason::MaxIterations && max_abs(&pg) < config.epsilon {
        stop = StopReason::Converged;
    }

    Ok(TrainSummary {
        iterations,
        objective: f,
        stop,
    })
}
