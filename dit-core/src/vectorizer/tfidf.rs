use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Analyzer, CountVectorizer, Vectorizer};
use crate::sparse::SparseVector;

/// Vetorizador TF‑IDF (equivalente ao `TfidfVectorizer` com `smooth_idf=True`
/// e `norm="l2"`).
///
/// ## IDF suavizado
///
/// $$ \text{idf}(t) = \ln\frac{1 + N}{1 + \text{df}(t)} + 1 $$
///
/// onde `N` é o número de documentos do corpus de `fit`. Somar 1 no numerador
/// e no denominador equivale a ver um documento extra contendo todos os termos,
/// o que evita divisão por zero.
///
/// ## Stop words
///
/// A lista de stop words só é aplicada com o analisador `word`. Com
/// `char_wb` ela é ignorada: os modelos já treinados assumem essa assimetria.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub count_vec: CountVectorizer,
    /// IDF por coluna do vocabulário.
    pub idf: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_words: Option<BTreeSet<String>>,
}

impl TfidfVectorizer {
    pub fn new(
        ngram_range: (usize, usize),
        min_df: usize,
        binary: bool,
        analyzer: Analyzer,
        stop_words: Option<BTreeSet<String>>,
    ) -> Self {
        Self {
            count_vec: CountVectorizer::new(ngram_range, binary, analyzer, min_df),
            idf: Vec::new(),
            stop_words,
        }
    }

    /// Stop words efetivamente aplicadas (nenhuma sob `char_wb`).
    fn active_stop_words(&self) -> Option<&BTreeSet<String>> {
        match self.count_vec.analyzer {
            Analyzer::Word => self.stop_words.as_ref().filter(|s| !s.is_empty()),
            Analyzer::CharWb => None,
        }
    }

    pub fn transform_text(&self, text: &str) -> SparseVector {
        let mut sv = self.count_vec.transform_with(text, self.active_stop_words());
        for (i, &idx) in sv.indices.iter().enumerate() {
            if let Some(idf) = self.idf.get(idx) {
                sv.values[i] *= idf;
            }
        }

        let norm = sv.l2_norm();
        if norm > 0.0 {
            sv.scale(1.0 / norm);
        }
        sv
    }
}

impl Vectorizer for TfidfVectorizer {
    type Item = String;

    fn fit(&mut self, corpus: &[String]) {
        let stop_words = self.active_stop_words().cloned();
        self.count_vec.fit_with(corpus, stop_words.as_ref());

        let mut df = vec![0.0f64; self.count_vec.vocab_size()];
        for doc in corpus {
            let sv = self.count_vec.transform_with(doc, stop_words.as_ref());
            for &idx in &sv.indices {
                df[idx] += 1.0;
            }
        }

        let n_docs = corpus.len() as f64;
        self.idf = df
            .iter()
            .map(|&d| ((1.0 + n_docs) / (1.0 + d)).ln() + 1.0)
            .collect();
    }

    fn transform(&self, text: &String) -> SparseVector {
        self.transform_text(text)
    }

    fn vocab_size(&self) -> usize {
        self.count_vec.vocab_size()
    }
}
