//! # Vetor Esparso
//!
//! Representação `(índices, valores, dimensão)` usada por todos os vetorizadores
//! e pela regressão logística. A maior parte dos vetores de formulário tem
//! dezenas de entradas ativas num espaço de milhares de colunas, então guardar
//! só as entradas ativas é bem mais barato que um `Vec<f64>` denso.
//!
//! Índices fora da dimensão são ignorados silenciosamente em [`SparseVector::dot`]
//! e [`SparseVector::to_dense`]: o vocabulário pode crescer entre o `fit` de um
//! pipeline e o `transform` de outro, e isso nunca deve derrubar a inferência.

use serde::{Deserialize, Serialize};

/// Vetor esparso de dimensão fixa.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
    pub dim: usize,
}

impl SparseVector {
    /// Vetor vazio (todo zero) de dimensão `dim`.
    pub fn new(dim: usize) -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
            dim,
        }
    }

    /// Sobrescreve o valor em `idx` ou acrescenta uma nova entrada.
    ///
    /// Busca linear: os vetores têm poucas entradas ativas.
    pub fn set(&mut self, idx: usize, val: f64) {
        match self.indices.iter().position(|&i| i == idx) {
            Some(pos) => self.values[pos] = val,
            None => {
                self.indices.push(idx);
                self.values.push(val);
            }
        }
    }

    /// Valor armazenado em `idx` (zero se ausente).
    pub fn get(&self, idx: usize) -> f64 {
        self.indices
            .iter()
            .position(|&i| i == idx)
            .map(|pos| self.values[pos])
            .unwrap_or(0.0)
    }

    /// Número de entradas armazenadas.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Itera sobre os pares `(índice, valor)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Produto escalar com um vetor denso.
    ///
    /// $$ \text{dot} = \sum_i v_i \cdot d_{idx_i} $$
    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter()
            .filter(|&(idx, _)| idx < dense.len())
            .map(|(idx, val)| val * dense[idx])
            .sum()
    }

    pub fn to_dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.dim];
        for (idx, val) in self.iter() {
            if idx < self.dim {
                dense[idx] = val;
            }
        }
        dense
    }

    pub fn l2_norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    /// Multiplica todos os valores por `factor`.
    pub fn scale(&mut self, factor: f64) {
        for v in &mut self.values {
            *v *= factor;
        }
    }

    /// Concatena vetores deslocando os índices de cada um pela soma das
    /// dimensões anteriores. A dimensão do resultado é a soma das dimensões.
    ///
    /// É assim que os blocos de colunas de cada pipeline viram um único vetor
    /// de entrada para a regressão logística.
    pub fn concat(vectors: &[SparseVector]) -> SparseVector {
        let total_nnz = vectors.iter().map(SparseVector::nnz).sum();
        let mut result = SparseVector {
            indices: Vec::with_capacity(total_nnz),
            values: Vec::with_capacity(total_nnz),
            dim: 0,
        };
        for v in vectors {
            let offset = result.dim;
            for (idx, val) in v.iter() {
                result.indices.push(idx + offset);
                result.values.push(val);
            }
            result.dim += v.dim;
        }
        result
    }
}
