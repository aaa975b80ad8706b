//! # dit-core — Classificação de Formulários e Campos HTML
//!
//! Este crate implementa os dois modelos estatísticos que classificam
//! formulários HTML (`login`, `search`, `registration`, ...) e o papel de cada
//! campo (`username`, `password`, ...), sem depender de runtime de ML externo.
//!
//! ## Arquitetura
//!
//! 1.  **Entrada**: features já extraídas do HTML por um colaborador externo:
//!     mapas tipados ([`features`]) e textos por extrator ([`pipeline::FormFeatures`]).
//! 2.  **Vetorização** ([`vectorizer`]): Dict / Count / TF‑IDF com as convenções
//!     numéricas do scikit-learn, produzindo [`SparseVector`]s.
//! 3.  **Tipo do formulário** ([`pipeline`], [`maxent`]): regressão logística
//!     multinomial sobre a concatenação dos pipelines, treinada com L-BFGS.
//! 4.  **Tipo dos campos** ([`tagger`], [`crf`]): CRF linear-chain com
//!     forward-backward escalonado, Viterbi e treino OWL-QN ([`crf_trainer`]).
//! 5.  **Saída**: [`model::FormResult`] / [`model::FormResultProba`].
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use dit_core::model::{AnnotatedForm, FormFieldModel, TrainConfig};
//! use dit_core::pipeline::{FormFeatures, PipelineConfig, VecType};
//!
//! let mut login = FormFeatures::new();
//! login.insert("SubmitText".into(), "log in".into());
//! let mut search = FormFeatures::new();
//! search.insert("SubmitText".into(), "search".into());
//!
//! let forms = vec![
//!     AnnotatedForm {
//!         form_type: "login".into(),
//!         features: login.clone(),
//!         ..Default::default()
//!     },
//!     AnnotatedForm {
//!         form_type: "search".into(),
//!         features: search.clone(),
//!         ..Default::default()
//!     },
//! ];
//! let config = TrainConfig {
//!     pipelines: vec![PipelineConfig {
//!         name: "submit text".into(),
//!         extractor_type: "SubmitText".into(),
//!         vec_type: VecType::Count,
//!         ..Default::default()
//!     }],
//!     ..Default::default()
//! };
//!
//! let model = FormFieldModel::train(&forms, &config)?;
//! assert_eq!(model.classify(&login, &[]).form_type, "login");
//! # Ok::<(), dit_core::DitError>(())
//! ```
//!
//! ## Módulos Principais
//!
//! - [`model`]: modelo combinado, configuração de treino e persistência.
//! - [`crf`] / [`crf_trainer`]: CRF e seu otimizador.
//! - [`evaluate`]: validação cruzada por grupo e métricas.

pub mod alphabet;
pub mod crf;
pub mod crf_trainer;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod forward_backward;
pub mod lbfgs;
pub mod maxent;
pub mod model;
pub mod pipeline;
pub mod sparse;
pub mod tagger;
pub mod text;
pub mod vectorizer;
pub mod viterbi;

pub use crf::{CrfModel, TrainingSequence};
pub use error::{DitError, Result};
pub use features::{FeatureMap, FeatureValue};
pub use model::{AnnotatedForm, FormFieldModel, FormResult, FormResultProba, TrainConfig};
pub use pipeline::{FormFeatures, FormTypeModel};
pub use sparse::SparseVector;
pub use tagger::{FieldFeatures, FieldTypeModel};
