//! # CRF — Conditional Random Field Linear-Chain
//!
//! Modelo de marcação de sequências usado para os tipos de campo. Cada campo
//! de um formulário é uma posição da sequência; o label é o papel do campo
//! (`username`, `password`, ...).
//!
//! ## Estrutura do Modelo
//!
//! ```text
//! score(y, x) = Σ_t [state(t, y_t) + trans(y_{t-1}, y_t)]
//! state(t, y) = Σ_a  w[a·L + y] · x_t[a]
//! trans(i, j) = w[trans_offset + i·L + j]
//! ```
//!
//! Os pesos ficam num único vetor plano: primeiro o bloco de estado
//! (`|atributos| × L`), depois o bloco de transição (`L × L`). O otimizador
//! trabalha sobre esse vetor diretamente.
//!
//! A probabilidade é a softmax dos scores sobre todos os caminhos (via
//! [`ForwardBackward`]); a decodificação usa [`viterbi`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alphabet::Alphabet;
use crate::error::{DitError, Result};
use crate::features::AttributeMap;
use crate::forward_backward::ForwardBackward;
use crate::viterbi::viterbi;

/// Sequência anotada para o treino do CRF.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSequence {
    /// Atributos de cada posição.
    pub features: Vec<AttributeMap>,
    /// Label de cada posição.
    pub labels: Vec<String>,
    /// Grupo (ex.: domínio) usado na validação cruzada.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
}

impl TrainingSequence {
    pub fn new(features: Vec<AttributeMap>, labels: Vec<String>) -> Self {
        Self {
            features,
            labels,
            group: None,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Modelo CRF treinado.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrfModel {
    pub labels: Alphabet,
    pub attributes: Alphabet,
    pub weights: Vec<f64>,
    pub num_labels: usize,
}

impl CrfModel {
    /// Cria um modelo com pesos zerados para os alfabetos dados.
    pub fn new(labels: Alphabet, attributes: Alphabet) -> Self {
        let num_labels = labels.len();
        let mut model = Self {
            labels,
            attributes,
            weights: Vec::new(),
            num_labels,
        };
        model.weights = vec![0.0; model.num_weights()];
        model
    }

    /// Início do bloco de transição.
    pub fn trans_offset(&self) -> usize {
        self.attributes.len() * self.num_labels
    }

    pub fn num_weights(&self) -> usize {
        self.trans_offset() + self.num_labels * self.num_labels
    }

    pub fn state_index(&self, attr: usize, label: usize) -> usize {
        attr * self.num_labels + label
    }

    pub fn transition_index(&self, from: usize, to: usize) -> usize {
        self.trans_offset() + from * self.num_labels + to
    }

    /// Configura o peso de estado de `(atributo, label)`. Nomes desconhecidos
    /// são ignorados.
    pub fn set_state_weight(&mut self, attribute: &str, label: &str, weight: f64) {
        if let (Some(a), Some(y)) = (self.attributes.get(attribute), self.labels.get(label)) {
            let idx = self.state_index(a, y);
            self.weights[idx] = weight;
        }
    }

    /// Configura o peso de transição `from → to`.
    pub fn set_transition(&mut self, from: &str, to: &str, weight: f64) {
        if let (Some(i), Some(j)) = (self.labels.get(from), self.labels.get(to)) {
            let idx = self.transition_index(i, j);
            self.weights[idx] = weight;
        }
    }

    /// `[T][L]` scores de estado. Atributos fora do alfabeto contribuem zero.
    pub fn state_scores(&self, features: &[AttributeMap]) -> Vec<Vec<f64>> {
        let l = self.num_labels;
        features
            .iter()
            .map(|position| {
                let mut row = vec![0.0; l];
                for (name, &value) in position {
                    let Some(a) = self.attributes.get(name) else {
                        continue;
                    };
                    let base = self.state_index(a, 0);
                    for (y, score) in row.iter_mut().enumerate() {
                        *score += self.weights[base + y] * value;
                    }
                }
                row
            })
            .collect()
    }

    /// `[L][L]` matriz de transição.
    pub fn transition_scores(&self) -> Vec<Vec<f64>> {
        let l = self.num_labels;
        let offset = self.trans_offset();
        self.weights[offset..offset + l * l]
            .chunks(l.max(1))
            .map(|row| row.to_vec())
            .collect()
    }

    /// Sequência de labels mais provável.
    pub fn predict(&self, features: &[AttributeMap]) -> Vec<String> {
        if features.is_empty() || self.num_labels == 0 {
            return vec![];
        }
        let state = self.state_scores(features);
        let trans = self.transition_scores();
        viterbi(&state, &trans)
            .path
            .into_iter()
            .map(|y| self.labels.label(y).unwrap_or_default().to_string())
            .collect()
    }

    /// Marginais por posição: label → probabilidade.
    pub fn predict_marginals(&self, features: &[AttributeMap]) -> Vec<HashMap<String, f64>> {
        if features.is_empty() || self.num_labels == 0 {
            return vec![];
        }
        let state = self.state_scores(features);
        let trans = self.transition_scores();
        ForwardBackward::compute(&state, &trans)
            .marginals
            .into_iter()
            .map(|row| {
                self.labels
                    .to_str
                    .iter()
                    .cloned()
                    .zip(row)
                    .collect()
            })
            .collect()
    }

    /// Confere o layout dos pesos contra os alfabetos.
    pub fn validate(&self) -> Result<()> {
        if !self.labels.is_consistent() || !self.attributes.is_consistent() {
            return Err(DitError::InvalidModel("alfabeto inconsistente".into()));
        }
        if self.num_labels != self.labels.len() {
            return Err(DitError::InvalidModel(format!(
                "num_labels = {} mas o alfabeto tem {} labels",
                self.num_labels,
                self.labels.len()
            )));
        }
        if self.weights.len() != self.num_weights() {
            return Err(DitError::InvalidModel(format!(
                "{} pesos, esperado {}",
                self.weights.len(),
                self.num_weights()
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Desserializa e valida.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// Score de um caminho: `Σ state[t][y_t] + Σ trans[y_{t-1}][y_t]`.
pub fn path_score(state: &[Vec<f64>], trans: &[Vec<f64>], path: &[usize]) -> f64 {
    let mut score = 0.0;
    for (t, &y) in path.iter().enumerate() {
        score += state[t][y];
        if t > 0 {
            score += trans[path[t - 1]][y];
        }
    }
    score
}
