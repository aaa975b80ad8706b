use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::Vectorizer;
use crate::sparse::SparseVector;
use crate::text::{char_ngrams, token_ngrams, tokenize};

/// Como o texto é quebrado em termos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Analyzer {
    /// N-gramas de tokens de palavra.
    #[default]
    Word,
    /// N-gramas de caracteres dentro de cada palavra, com a palavra cercada
    /// por um espaço de cada lado (preserva a informação de fronteira).
    CharWb,
}

/// Vetorizador de contagem de n-gramas (equivalente ao `CountVectorizer`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountVectorizer {
    /// Termo → coluna. Colunas atribuídas em ordem lexicográfica.
    pub vocabulary: BTreeMap<String, usize>,
    /// Intervalo inclusivo `[min, max]` de tamanhos de n-grama.
    pub ngram_range: (usize, usize),
    /// Presença (1.0) em vez da contagem bruta.
    pub binary: bool,
    pub analyzer: Analyzer,
    /// Frequência mínima de documentos para um termo entrar no vocabulário.
    pub min_df: usize,
}

impl CountVectorizer {
    pub fn new(
        ngram_range: (usize, usize),
        binary: bool,
        analyzer: Analyzer,
        min_df: usize,
    ) -> Self {
        Self {
            vocabulary: BTreeMap::new(),
            ngram_range,
            binary,
            analyzer,
            min_df: min_df.max(1),
        }
    }

    /// Extrai os termos de um documento.
    ///
    /// `stop_words` só tem efeito no analisador `word`: os tokens são
    /// filtrados antes de formar os n-gramas.
    pub(crate) fn analyze(&self, text: &str, stop_words: Option<&BTreeSet<String>>) -> Vec<String> {
        let lower = text.to_lowercase();
        let tokens = tokenize(&lower);
        let (min_n, max_n) = self.ngram_range;
        match self.analyzer {
            Analyzer::Word => {
                let tokens: Vec<String> = match stop_words {
                    Some(stop) => tokens.into_iter().filter(|t| !stop.contains(t)).collect(),
                    None => tokens,
                };
                token_ngrams(&tokens, min_n, max_n)
            }
            Analyzer::CharWb => tokens
                .iter()
                .flat_map(|token| char_ngrams(&format!(" {token} "), min_n, max_n))
                .collect(),
        }
    }

    pub(crate) fn fit_with(&mut self, corpus: &[String], stop_words: Option<&BTreeSet<String>>) {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            let unique: HashSet<String> = self.analyze(doc, stop_words).into_iter().collect();
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        let mut terms: Vec<String> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.min_df)
            .map(|(term, _)| term)
            .collect();
        terms.sort();

        self.vocabulary = terms.into_iter().enumerate().map(|(i, t)| (t, i)).collect();
    }

    pub(crate) fn transform_with(
        &self,
        text: &str,
        stop_words: Option<&BTreeSet<String>>,
    ) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyze(text, stop_words) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut sv = SparseVector::new(self.vocab_size());
        for (idx, count) in counts {
            sv.indices.push(idx);
            sv.values.push(if self.binary { 1.0 } else { count });
        }
        sv
    }

    /// [`Vectorizer::transform`] para `&str`.
    pub fn transform_text(&self, text: &str) -> SparseVector {
        self.transform_with(text, None)
    }
}

impl Vectorizer for CountVectorizer {
    type Item = String;

    fn fit(&mut self, corpus: &[String]) {
        self.fit_with(corpus, None);
    }

    fn transform(&self, text: &String) -> SparseVector {
        self.transform_text(text)
    }

    fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(docs: &[&str]) -> Vec<String> {
        docs.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_word_bigrams_binary() {
        let mut cv = CountVectorizer::new((1, 2), true, Analyzer::Word, 1);
        let vectors = cv.fit_transform(&corpus(&["hello world", "world hello"]));

        for term in ["hello", "world", "hello world", "world hello"] {
            assert!(cv.vocabulary.contains_key(term), "faltando '{term}'");
        }
        assert_eq!(cv.vocab_size(), 4);
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            assert!(v.values.iter().all(|&x| x == 1.0));
        }
    }

    #[test]
    fn test_vocabulary_is_sorted_and_in_range() {
        let mut cv = CountVectorizer::new((1, 1), false, Analyzer::Word, 1);
        let vectors = cv.fit_transform(&corpus(&["b a c", "a d"]));
        let terms: Vec<&String> = cv.vocabulary.keys().collect();
        assert_eq!(terms, vec!["a", "b", "c", "d"]);
        assert_eq!(cv.vocabulary["a"], 0);
        for v in &vectors {
            assert!(v.indices.iter().all(|&i| i < cv.vocab_size()));
        }
    }

    #[test]
    fn test_raw_counts() {
        let mut cv = CountVectorizer::new((1, 1), false, Analyzer::Word, 1);
        cv.fit(&corpus(&["go go go stop"]));
        let sv = cv.transform_text("Go go STOP");
        assert_eq!(sv.get(cv.vocabulary["go"]), 2.0);
        assert_eq!(sv.get(cv.vocabulary["stop"]), 1.0);
    }

    #[test]
    fn test_char_wb_trigrams() {
        let mut cv = CountVectorizer::new((3, 3), true, Analyzer::CharWb, 1);
        cv.fit(&corpus(&["hello"]));
        // " hello " → " he", "hel", "ell", "llo", "lo "
        assert_eq!(cv.vocab_size(), 5);
        assert!(cv.vocabulary.contains_key(" he"));
        assert!(cv.vocabulary.contains_key("lo "));
    }

    #[test]
    fn test_min_df_filters_rare_terms() {
        let mut cv = CountVectorizer::new((1, 1), true, Analyzer::Word, 2);
        cv.fit(&corpus(&["hello world", "hello universe"]));
        assert!(cv.vocabulary.contains_key("hello"));
        assert!(!cv.vocabulary.contains_key("world"));
        assert_eq!(cv.vocab_size(), 1);
    }

    #[test]
    fn test_unknown_terms_are_dropped() {
        let mut cv = CountVectorizer::new((1, 1), true, Analyzer::Word, 1);
        cv.fit(&corpus(&["login"]));
        let sv = cv.transform_text("register now");
        assert_eq!(sv.nnz(), 0);
        assert_eq!(sv.dim, 1);
    }
}
