//! # Erros do dit
//!
//! Todos os caminhos falíveis do crate retornam [`DitError`]. Há três famílias:
//!
//! - **Estruturais**: dados de treino vazios ou inconsistentes. Falham cedo,
//!   antes de qualquer otimização.
//! - **Numéricos**: objetivo não-finito ou direção que não desce. Abortam o
//!   treino; o modelo parcial não é devolvido.
//! - **Persistência**: JSON inválido, I/O, ou um modelo carregado cujo layout
//!   não bate com os próprios metadados.
//!
//! Termos ou atributos desconhecidos durante a inferência **não** são erros:
//! simplesmente contribuem com peso zero.

use thiserror::Error;

/// Erro único do crate.
#[derive(Debug, Error)]
pub enum DitError {
    #[error("conjunto de treino vazio: {0}")]
    EmptyTrainingSet(&'static str),

    #[error("sequência {index} não tem nenhuma posição")]
    EmptySequence { index: usize },

    #[error("sequência {index}: {features} posições de features mas {labels} labels")]
    LengthMismatch {
        index: usize,
        features: usize,
        labels: usize,
    },

    #[error("exemplo {index}: dimensão {found}, esperado {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("{vectors} vetores mas {labels} labels")]
    LabelCountMismatch { vectors: usize, labels: usize },

    #[error("objetivo não-finito na iteração {iteration}")]
    NonFiniteObjective { iteration: usize },

    #[error("direção não é de descida na iteração {iteration} (derivada {derivative})")]
    NonDescentDirection { iteration: usize, derivative: f64 },

    #[error("validação cruzada exige n_folds >= 2 e 2 grupos ({n_folds} folds, {groups} grupos)")]
    InvalidFolds { n_folds: usize, groups: usize },

    #[error("pipeline '{pipeline}' espera entrada do tipo {expected}")]
    FeatureKindMismatch {
        pipeline: String,
        expected: &'static str,
    },

    #[error("modelo inválido: {0}")]
    InvalidModel(String),

    #[error("erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DitError>;
