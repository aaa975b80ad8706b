//! # Histórico L-BFGS
//!
//! Guarda os últimos `m` pares `(s, y)` (passo e variação do gradiente) e
//! calcula a direção quase-Newton pela recursão de dois laços. Compartilhado
//! pela regressão logística (L-BFGS puro) e pelo treino do CRF (OWL-QN, que
//! passa o pseudo-gradiente no lugar do gradiente).
//!
//! ```text
//! q = g
//! para i do mais novo ao mais velho:  a_i = ρ_i·s_i·q ;  q -= a_i·y_i
//! r = γ·q,  γ = s·y / y·y  (par mais novo)
//! para i do mais velho ao mais novo:  b = ρ_i·y_i·r ;  r += s_i·(a_i - b)
//! d = -r
//! ```

use std::collections::VecDeque;

/// Como o otimizador terminou.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    MaxIterations,
    LineSearchFailed,
}

/// Produto interno de dois vetores densos.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Maior valor absoluto (norma infinito).
pub fn max_abs(v: &[f64]) -> f64 {
    v.iter().fold(0.0f64, |m, x| m.max(x.abs()))
}

#[derive(Debug, Clone)]
struct Correction {
    s: Vec<f64>,
    y: Vec<f64>,
    rho: f64,
}

/// Memória limitada de correções.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    memory: usize,
    history: VecDeque<Correction>,
}

impl Lbfgs {
    pub fn new(memory: usize) -> Self {
        Self {
            memory: memory.max(1),
            history: VecDeque::with_capacity(memory.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Registra um par. Devolve `false` (e descarta o par) quando `s·y <= 0`,
    /// que quebraria a positividade da aproximação.
    pub fn update(&mut self, s: Vec<f64>, y: Vec<f64>) -> bool {
        let sy = dot(&s, &y);
        if !(sy > 0.0) {
            return false;
        }
        if self.history.len() == self.memory {
            self.history.pop_front();
        }
        self.history.push_back(Correction { s, y, rho: 1.0 / sy });
        true
    }

    /// Direção de busca para o gradiente `grad`. Sem histórico, é o
    /// gradiente negado.
    pub fn direction(&self, grad: &[f64]) -> Vec<f64> {
        let mut q = grad.to_vec();
        let mut alphas = vec![0.0; self.history.len()];

        for (i, c) in self.history.iter().enumerate().rev() {
            let a = c.rho * dot(&c.s, &q);
            alphas[i] = a;
            for (qk, yk) in q.iter_mut().zip(&c.y) {
                *qk -= a * yk;
            }
        }

        if let Some(last) = self.history.back() {
            let yy = dot(&last.y, &last.y);
            if yy > 0.0 {
                let gamma = dot(&last.s, &last.y) / yy;
                for qk in &mut q {
                    *qk *= gamma;
                }
            }
        }

        for (i, c) in self.history.iter().enumerate() {
            let b = c.rho * dot(&c.y, &q);
            let coeff = alphas[i] - b;
            for (qk, sk) in q.iter_mut().zip(&c.s) {
                *qk += coeff * sk;
            }
        }

        for qk in &mut q {
            *qk = -*qk;
        }
        q
    }
}
