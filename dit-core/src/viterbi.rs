//! # Algoritmo de Viterbi
//!
//! Programação dinâmica que encontra a sequência de labels de maior score em
//! `O(T × L²)`, em vez de enumerar os `L^T` caminhos possíveis.
//!
//! ```text
//! Inicialização: δ[0][y] = state[0][y]
//!
//! Recursão: δ[t][y] = max_{yp} [δ[t-1][yp] + trans[yp][y]] + state[t][y]
//!
//! Backtracking: reconstrói o caminho ótimo de trás pra frente
//! ```
//!
//! Empates são resolvidos em favor do menor índice de label (comparação
//! estrita `>`).

/// Resultado do Viterbi.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiResult {
    /// Índices dos labels, um por posição.
    pub path: Vec<usize>,
    /// Score (não normalizado) do caminho.
    pub score: f64,
}

/// Decodifica a sequência de maior score.
///
/// - `state`: `[T][L]` scores de estado.
/// - `trans`: `[L][L]` scores de transição (`trans[from][to]`).
pub fn viterbi(state: &[Vec<f64>], trans: &[Vec<f64>]) -> ViterbiResult {
    if state.is_empty() {
        return ViterbiResult {
            path: vec![],
            score: 0.0,
        };
    }

    let n = state.len();
    let l = state[0].len();

    let mut delta: Vec<f64> = state[0].clone();
    // backptr[t][y] = label anterior que maximiza δ[t][y]
    let mut backptr: Vec<Vec<usize>> = vec![vec![0usize; l]; n];

    for t in 1..n {
        let mut next = vec![f64::NEG_INFINITY; l];
        for y in 0..l {
            let mut best_score = f64::NEG_INFINITY;
            let mut best_prev = 0;
            for yp in 0..l {
                let score = delta[yp] + trans[yp][y];
                if score > best_score {
                    best_score = score;
                    best_prev = yp;
                }
            }
            next[y] = best_score + state[t][y];
            backptr[t][y] = best_prev;
        }
        delta = next;
    }

    let (mut best_last, best_score) = best_in_slice(&delta);
    let mut path = vec![0usize; n];
    path[n - 1] = best_last;
    for t in (1..n).rev() {
        best_last = backptr[t][best_last];
        path[t - 1] = best_last;
    }

    ViterbiResult {
        path,
        score: best_score,
    }
}

/// (índice, valor) do primeiro máximo.
fn best_in_slice(scores: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, &v) in scores.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}
