//! # Pipelines de Features — Modelo de Tipo de Formulário
//!
//! Cada pipeline liga a saída de um extrator (externo ao crate) a um
//! vetorizador. Os vetores de todos os pipelines são concatenados, na ordem
//! da configuração, e alimentam a regressão logística.
//!
//! ```text
//! FormFeatures ──► [form elements → Dict ]──┐
//!              ──► [submit text   → Count]──┼─► concat ─► LogisticRegression
//!              ──► [form url      → TF-IDF]─┘
//! ```
//!
//! O extrator de cada pipeline produz ou um mapa de features tipadas (dict)
//! ou um texto (count / TF‑IDF). Na inferência, uma saída ausente ou do tipo
//! errado conta como entrada vazia; no treino o tipo errado é um erro.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DitError, Result};
use crate::features::FeatureMap;
use crate::maxent::{LogRegConfig, LogisticRegression};
use crate::sparse::SparseVector;
use crate::vectorizer::{
    english_stop_words, Analyzer, CountVectorizer, DictVectorizer, TfidfVectorizer, Vectorizer,
};

/// Tipo de vetorizador de um pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VecType {
    #[default]
    Dict,
    Count,
    Tfidf,
}

/// Lista de stop words de um pipeline TF‑IDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWords {
    /// Lista em inglês do scikit-learn.
    English,
    Custom(BTreeSet<String>),
}

impl StopWords {
    fn resolve(&self) -> BTreeSet<String> {
        match self {
            StopWords::English => english_stop_words(),
            StopWords::Custom(words) => words.clone(),
        }
    }
}

/// Configuração de um pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub name: String,
    /// Chave da saída do extrator em [`FormFeatures`].
    pub extractor_type: String,
    pub vec_type: VecType,
    pub ngram_range: (usize, usize),
    pub min_df: usize,
    pub binary: bool,
    pub analyzer: Analyzer,
    pub stop_words: Option<StopWords>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            extractor_type: String::new(),
            vec_type: VecType::Dict,
            ngram_range: (1, 1),
            min_df: 1,
            binary: false,
            analyzer: Analyzer::Word,
            stop_words: None,
        }
    }
}

impl PipelineConfig {
    fn tfidf(
        name: &str,
        extractor: &str,
        ngram_range: (usize, usize),
        min_df: usize,
        analyzer: Analyzer,
    ) -> Self {
        Self {
            name: name.into(),
            extractor_type: extractor.into(),
            vec_type: VecType::Tfidf,
            ngram_range,
            min_df,
            binary: true,
            analyzer,
            stop_words: None,
        }
    }
}

/// Os nove pipelines usados pelo modelo de tipo de formulário.
pub fn default_pipelines() -> Vec<PipelineConfig> {
    let and_or_of: BTreeSet<String> = ["and", "or", "of"].iter().map(|w| w.to_string()).collect();
    vec![
        PipelineConfig {
            name: "form elements".into(),
            extractor_type: "FormElements".into(),
            vec_type: VecType::Dict,
            ..Default::default()
        },
        PipelineConfig {
            name: "submit text".into(),
            extractor_type: "SubmitText".into(),
            vec_type: VecType::Count,
            ngram_range: (1, 2),
            min_df: 1,
            binary: true,
            analyzer: Analyzer::Word,
            stop_words: None,
        },
        PipelineConfig {
            stop_words: Some(StopWords::Custom(and_or_of)),
            ..PipelineConfig::tfidf("links text", "FormLinksText", (1, 2), 4, Analyzer::Word)
        },
        PipelineConfig {
            stop_words: Some(StopWords::English),
            ..PipelineConfig::tfidf("label text", "FormLabelText", (1, 2), 3, Analyzer::Word)
        },
        PipelineConfig::tfidf("form url", "FormURL", (5, 6), 4, Analyzer::CharWb),
        PipelineConfig::tfidf("form css", "FormCSS", (4, 5), 3, Analyzer::CharWb),
        PipelineConfig::tfidf("input css", "FormInputCSS", (4, 5), 5, Analyzer::CharWb),
        PipelineConfig::tfidf("input names", "FormInputNames", (5, 6), 3, Analyzer::CharWb),
        PipelineConfig::tfidf("input title", "FormInputTitle", (5, 6), 3, Analyzer::CharWb),
    ]
}

/// Saída de um extrator de features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractedFeature {
    Dict(FeatureMap),
    Text(String),
}

impl From<FeatureMap> for ExtractedFeature {
    fn from(map: FeatureMap) -> Self {
        ExtractedFeature::Dict(map)
    }
}

impl From<&str> for ExtractedFeature {
    fn from(text: &str) -> Self {
        ExtractedFeature::Text(text.to_string())
    }
}

impl From<String> for ExtractedFeature {
    fn from(text: String) -> Self {
        ExtractedFeature::Text(text)
    }
}

/// Saídas de todos os extratores para um formulário, por `extractor_type`.
pub type FormFeatures = BTreeMap<String, ExtractedFeature>;

/// Pipeline ajustado, no formato persistido do modelo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedPipeline {
    pub name: String,
    pub extractor_type: String,
    pub vec_type: VecType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dict_vec: Option<DictVectorizer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_vec: Option<CountVectorizer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tfidf_vec: Option<TfidfVectorizer>,
}

impl SerializedPipeline {
    /// Ajusta o vetorizador do pipeline e devolve os vetores do corpus.
    pub fn fit(
        config: &PipelineConfig,
        forms: &[FormFeatures],
    ) -> Result<(Self, Vec<SparseVector>)> {
        let mut pipeline = Self {
            name: config.name.clone(),
            extractor_type: config.extractor_type.clone(),
            vec_type: config.vec_type,
            dict_vec: None,
            count_vec: None,
            tfidf_vec: None,
        };

        let vectors = match config.vec_type {
            VecType::Dict => {
                let corpus = forms
                    .iter()
                    .map(|form| pipeline.training_dict(form))
                    .collect::<Result<Vec<_>>>()?;
                let mut dv = DictVectorizer::new();
                let vectors = dv.fit_transform(&corpus);
                pipeline.dict_vec = Some(dv);
                vectors
            }
            VecType::Count => {
                let corpus = pipeline.training_texts(forms)?;
                let mut cv = CountVectorizer::new(
                    config.ngram_range,
                    config.binary,
                    config.analyzer,
                    config.min_df,
                );
                let vectors = cv.fit_transform(&corpus);
                pipeline.count_vec = Some(cv);
                vectors
            }
            VecType::Tfidf => {
                let corpus = pipeline.training_texts(forms)?;
                let mut tv = TfidfVectorizer::new(
                    config.ngram_range,
                    config.min_df,
                    config.binary,
                    config.analyzer,
                    config.stop_words.as_ref().map(StopWords::resolve),
                );
                let vectors = tv.fit_transform(&corpus);
                pipeline.tfidf_vec = Some(tv);
                vectors
            }
        };

        debug!("Pipeline '{}': {} colunas", pipeline.name, pipeline.dim());
        Ok((pipeline, vectors))
    }

    fn training_dict(&self, form: &FormFeatures) -> Result<FeatureMap> {
        match form.get(&self.extractor_type) {
            Some(ExtractedFeature::Dict(map)) => Ok(map.clone()),
            None => Ok(FeatureMap::new()),
            Some(ExtractedFeature::Text(_)) => Err(DitError::FeatureKindMismatch {
                pipeline: self.name.clone(),
                expected: "dict",
            }),
        }
    }

    fn training_texts(&self, forms: &[FormFeatures]) -> Result<Vec<String>> {
        forms
            .iter()
            .map(|form| match form.get(&self.extractor_type) {
                Some(ExtractedFeature::Text(text)) => Ok(text.clone()),
                None => Ok(String::new()),
                Some(ExtractedFeature::Dict(_)) => Err(DitError::FeatureKindMismatch {
                    pipeline: self.name.clone(),
                    expected: "text",
                }),
            })
            .collect()
    }

    /// Vetoriza um formulário. Saída ausente ou de outro tipo vira entrada
    /// vazia.
    pub fn transform(&self, form: &FormFeatures) -> SparseVector {
        let input = form.get(&self.extractor_type);
        match self.vec_type {
            VecType::Dict => {
                let Some(dv) = &self.dict_vec else {
                    return SparseVector::default();
                };
                match input {
                    Some(ExtractedFeature::Dict(map)) => dv.transform(map),
                    _ => dv.transform(&FeatureMap::new()),
                }
            }
            VecType::Count | VecType::Tfidf => {
                let text = match input {
                    Some(ExtractedFeature::Text(text)) => text.as_str(),
                    _ => "",
                };
                match (&self.count_vec, &self.tfidf_vec) {
                    (Some(cv), _) if self.vec_type == VecType::Count => cv.transform_text(text),
                    (_, Some(tv)) if self.vec_type == VecType::Tfidf => tv.transform_text(text),
                    _ => SparseVector::default(),
                }
            }
        }
    }

    /// Número de colunas contribuídas.
    pub fn dim(&self) -> usize {
        match self.vec_type {
            VecType::Dict => self.dict_vec.as_ref().map_or(0, |v| v.vocab_size()),
            VecType::Count => self.count_vec.as_ref().map_or(0, |v| v.vocab_size()),
            VecType::Tfidf => self.tfidf_vec.as_ref().map_or(0, |v| v.vocab_size()),
        }
    }

    /// O vetorizador correspondente a `vec_type` está presente e consistente.
    pub fn validate(&self) -> Result<()> {
        let ok = match self.vec_type {
            VecType::Dict => self
                .dict_vec
                .as_ref()
                .is_some_and(|v| v.vocabulary.len() == v.feature_names.len()),
            VecType::Count => self.count_vec.is_some(),
            VecType::Tfidf => self
                .tfidf_vec
                .as_ref()
                .is_some_and(|v| v.idf.len() == v.vocab_size()),
        };
        if ok {
            Ok(())
        } else {
            Err(DitError::InvalidModel(format!(
                "pipeline '{}' sem vetorizador {:?} válido",
                self.name, self.vec_type
            )))
        }
    }
}

/// Classificador de tipo de formulário: pipelines + regressão logística.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormTypeModel {
    #[serde(flatten)]
    pub classifier: LogisticRegression,
    pub pipelines: Vec<SerializedPipeline>,
}

impl FormTypeModel {
    pub fn train(
        forms: &[FormFeatures],
        labels: &[String],
        pipelines: &[PipelineConfig],
        config: &LogRegConfig,
    ) -> Result<Self> {
        if forms.is_empty() {
            return Err(DitError::EmptyTrainingSet("nenhum formulário anotado"));
        }
        if forms.len() != labels.len() {
            return Err(DitError::LabelCountMismatch {
                vectors: forms.len(),
                labels: labels.len(),
            });
        }

        let mut fitted = Vec::with_capacity(pipelines.len());
        let mut blocks: Vec<Vec<SparseVector>> = Vec::with_capacity(pipelines.len());
        for pipeline_config in pipelines {
            let (pipeline, vectors) = SerializedPipeline::fit(pipeline_config, forms)?;
            fitted.push(pipeline);
            blocks.push(vectors);
        }

        let vectors: Vec<SparseVector> = (0..forms.len())
            .map(|j| {
                let parts: Vec<SparseVector> = blocks.iter().map(|b| b[j].clone()).collect();
                SparseVector::concat(&parts)
            })
            .collect();

        info!(
            "{} pipelines ajustados, {} colunas no total",
            fitted.len(),
            vectors.first().map_or(0, |v| v.dim)
        );

        let classifier = LogisticRegression::train(&vectors, labels, config)?;
        Ok(Self {
            classifier,
            pipelines: fitted,
        })
    }

    /// Vetor concatenado de todos os pipelines.
    pub fn vectorize(&self, form: &FormFeatures) -> SparseVector {
        let parts: Vec<SparseVector> = self.pipelines.iter().map(|p| p.transform(form)).collect();
        SparseVector::concat(&parts)
    }

    pub fn classes(&self) -> &[String] {
        &self.classifier.classes
    }

    /// Tipo mais provável.
    pub fn classify(&self, form: &FormFeatures) -> String {
        self.classifier
            .predict(&self.vectorize(form))
            .unwrap_or_default()
            .to_string()
    }

    pub fn classify_proba(&self, form: &FormFeatures) -> HashMap<String, f64> {
        self.classifier.predict_proba(&self.vectorize(form))
    }

    /// Valida cada pipeline e confere a soma das dimensões contra os
    /// coeficientes.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        for pipeline in &self.pipelines {
            pipeline.validate()?;
        }
        let total: usize = self.pipelines.iter().map(SerializedPipeline::dim).sum();
        if !self.classifier.classes.is_empty() && total != self.classifier.dim() {
            return Err(DitError::InvalidModel(format!(
                "pipelines somam {} colunas, coeficientes têm {}",
                total,
                self.classifier.dim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    fn elements(pairs: &[(&str, FeatureValue)]) -> ExtractedFeature {
        ExtractedFeature::Dict(pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect())
    }

    fn form(tag_count: i64, submit: &str, url: &str) -> FormFeatures {
        let mut f = FormFeatures::new();
        f.insert(
            "FormElements".into(),
            elements(&[("input-count", tag_count.into()), ("method", "post".into())]),
        );
        f.insert("SubmitText".into(), submit.into());
        f.insert("FormURL".into(), url.into());
        f
    }

    fn small_pipelines() -> Vec<PipelineConfig> {
        vec![
            PipelineConfig {
                name: "form elements".into(),
                extractor_type: "FormElements".into(),
                ..Default::default()
            },
            PipelineConfig {
                name: "submit text".into(),
                extractor_type: "SubmitText".into(),
                vec_type: VecType::Count,
                ngram_range: (1, 2),
                binary: true,
                ..Default::default()
            },
            PipelineConfig::tfidf("form url", "FormURL", (3, 4), 1, Analyzer::CharWb),
        ]
    }

    fn training_set() -> (Vec<FormFeatures>, Vec<String>) {
        let forms = vec![
            form(2, "log in", "/login"),
            form(2, "sign in", "/session/login"),
            form(1, "search", "/search"),
            form(1, "go search", "/find"),
        ];
        let labels = ["login", "login", "search", "search"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        (forms, labels)
    }

    #[test]
    fn test_default_pipelines() {
        let pipelines = default_pipelines();
        assert_eq!(pipelines.len(), 9);
        assert_eq!(pipelines[0].vec_type, VecType::Dict);
        assert_eq!(pipelines[1].vec_type, VecType::Count);
        assert!(pipelines[2..].iter().all(|p| p.vec_type == VecType::Tfidf && p.binary));
        assert_eq!(pipelines[3].stop_words, Some(StopWords::English));
        assert_eq!(pipelines[4].analyzer, Analyzer::CharWb);
        assert_eq!(pipelines[6].min_df, 5);
    }

    #[test]
    fn test_train_and_classify() {
        let (forms, labels) = training_set();
        let model =
            FormTypeModel::train(&forms, &labels, &small_pipelines(), &LogRegConfig::default())
                .unwrap();
        assert!(model.validate().is_ok());
        assert_eq!(model.classes(), ["login", "search"]);

        for (f, label) in forms.iter().zip(&labels) {
            assert_eq!(&model.classify(f), label);
        }
        let proba = model.classify_proba(&form(2, "log in now", "/login"));
        assert!((proba.values().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba["login"] > proba["search"]);
    }

    #[test]
    fn test_missing_or_mismatched_input_is_empty_at_inference() {
        let (forms, labels) = training_set();
        let model =
            FormTypeModel::train(&forms, &labels, &small_pipelines(), &LogRegConfig::default())
                .unwrap();

        let mut odd = FormFeatures::new();
        odd.insert("SubmitText".into(), elements(&[("x", true.into())]));
        let v = model.vectorize(&odd);
        assert_eq!(v.nnz(), 0);
        assert_eq!(v.dim, model.classifier.dim());
        assert!(!model.classify(&odd).is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_error_at_training() {
        let (mut forms, labels) = training_set();
        forms[1].insert("SubmitText".into(), elements(&[]));
        let err =
            FormTypeModel::train(&forms, &labels, &small_pipelines(), &LogRegConfig::default());
        assert!(matches!(err, Err(DitError::FeatureKindMismatch { expected: "text", .. })));
    }

    #[test]
    fn test_json_round_trip_and_validation() {
        let (forms, labels) = training_set();
        let model =
            FormTypeModel::train(&forms, &labels, &small_pipelines(), &LogRegConfig::default())
                .unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"classes\""));
        assert!(json.contains("\"vec_type\":\"tfidf\""));

        let restored: FormTypeModel = serde_json::from_str(&json).unwrap();
        assert!(restored.validate().is_ok());
        assert_eq!(restored.classify(&forms[2]), "search");

        let mut broken = restored.clone();
        broken.pipelines[2].tfidf_vec = None;
        assert!(matches!(broken.validate(), Err(DitError::InvalidModel(_))));
    }

    #[test]
    fn test_pipeline_config_from_json() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"name": "label text", "extractor_type": "FormLabelText", "vec_type": "tfidf",
                "ngram_range": [1, 2], "stop_words": "english"}"#,
        )
        .unwrap();
        assert_eq!(config.vec_type, VecType::Tfidf);
        assert_eq!(config.ngram_range, (1, 2));
        assert_eq!(config.min_df, 1);
        assert_eq!(config.stop_words, Some(StopWords::English));
    }
}
