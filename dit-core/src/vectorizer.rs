//! # Vetorizadores
//!
//! Transformam a saída crua dos extratores de features em [`SparseVector`]s
//! com um vocabulário ajustado (`fit`) e serializável.
//!
//! Os três vetorizadores reproduzem as convenções numéricas do scikit-learn
//! (regex de tokens, IDF suavizado, normalização L2), porque os modelos
//! treinados dependem exatamente desses números:
//!
//! - [`DictVectorizer`]: mapa de features tipadas → colunas `nome` / `nome=valor`.
//! - [`CountVectorizer`]: texto → contagem (ou presença) de n-gramas.
//! - [`TfidfVectorizer`]: contagens × IDF, normalizadas em L2.
//!
//! O vocabulário é sempre ordenado lexicograficamente, de modo que a coluna de
//! cada termo não depende da ordem do corpus.

mod count;
mod dict;
mod stop_words;
mod tfidf;

pub use count::{Analyzer, CountVectorizer};
pub use dict::DictVectorizer;
pub use stop_words::english_stop_words;
pub use tfidf::TfidfVectorizer;

use crate::sparse::SparseVector;

/// Contrato comum dos vetorizadores.
pub trait Vectorizer {
    /// Tipo de cada item do corpus (texto ou mapa de features).
    type Item;

    /// Constrói o vocabulário a partir do corpus.
    fn fit(&mut self, corpus: &[Self::Item]);

    /// Converte um item em vetor esparso com o vocabulário já ajustado.
    /// Termos desconhecidos são descartados.
    fn transform(&self, item: &Self::Item) -> SparseVector;

    /// Número de colunas produzidas por [`Vectorizer::transform`].
    fn vocab_size(&self) -> usize;

    fn fit_transform(&mut self, corpus: &[Self::Item]) -> Vec<SparseVector> {
        self.fit(corpus);
        corpus.iter().map(|item| self.transform(item)).collect()
    }
}
