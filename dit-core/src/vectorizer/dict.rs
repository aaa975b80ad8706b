use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::Vectorizer;
use crate::features::{FeatureMap, FeatureValue};
use crate::sparse::SparseVector;

/// Vetorizador de mapas de features tipadas (equivalente ao `DictVectorizer`
/// do scikit-learn).
///
/// - texto: coluna `"nome=valor"` com valor 1.0 (indicador de presença);
/// - lista de textos: uma coluna `"nome=item"` por item;
/// - booleano / número: coluna `"nome"` com o próprio valor (`true` → 1.0).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictVectorizer {
    /// Nomes das colunas, em ordem de índice.
    pub feature_names: Vec<String>,
    /// Nome da coluna → índice.
    pub vocabulary: BTreeMap<String, usize>,
}

impl DictVectorizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colunas e valores gerados por uma feature.
    fn entries(name: &str, value: &FeatureValue) -> Vec<(String, f64)> {
        match value {
            FeatureValue::Str(s) => vec![(format!("{name}={s}"), 1.0)],
            FeatureValue::List(items) => items
                .iter()
                .map(|item| (format!("{name}={item}"), 1.0))
                .collect(),
            FeatureValue::Bool(b) => vec![(name.to_string(), if *b { 1.0 } else { 0.0 })],
            FeatureValue::Int(v) => vec![(name.to_string(), *v as f64)],
            FeatureValue::Float(v) => vec![(name.to_string(), *v)],
        }
    }
}

impl Vectorizer for DictVectorizer {
    type Item = FeatureMap;

    fn fit(&mut self, corpus: &[FeatureMap]) {
        let names: BTreeSet<String> = corpus
            .iter()
            .flat_map(|features| features.iter())
            .flat_map(|(name, value)| Self::entries(name, value))
            .map(|(key, _)| key)
            .collect();

        self.feature_names = names.into_iter().collect();
        self.vocabulary = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
    }

    fn transform(&self, features: &FeatureMap) -> SparseVector {
        let mut sv = SparseVector::new(self.vocab_size());
        for (name, value) in features {
            for (key, val) in Self::entries(name, value) {
                if val == 0.0 {
                    continue;
                }
                if let Some(&idx) = self.vocabulary.get(&key) {
                    sv.set(idx, val);
                }
            }
        }
        sv
    }

    fn vocab_size(&self) -> usize {
        self.feature_names.len()
    }
}
