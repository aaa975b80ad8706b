//! # Modelo Combinado Formulário + Campos
//!
//! Classificação em dois estágios:
//!
//! 1. a regressão logística decide o tipo do formulário (`login`, `search`, ...);
//! 2. o tipo previsto entra como feature `form-type` de cada campo e o CRF
//!    rotula os campos.
//!
//! O modelo inteiro é persistido num único JSON; `load` valida cada
//! submodelo antes de devolvê-lo.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::crf::TrainingSequence;
use crate::crf_trainer::CrfTrainerConfig;
use crate::error::Result;
use crate::features::{features_to_attributes, FeatureMap, FeatureValue};
use crate::maxent::LogRegConfig;
use crate::pipeline::{default_pipelines, FormFeatures, FormTypeModel, PipelineConfig};
use crate::tagger::{FieldFeatures, FieldTypeModel};

/// Feature injetada em cada campo com o tipo do formulário.
pub const FORM_TYPE_FEATURE: &str = "form-type";

/// Configuração completa do treino.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub form: LogRegConfig,
    pub field: CrfTrainerConfig,
    pub pipelines: Vec<PipelineConfig>,
    /// Treina também o modelo de campos.
    pub train_fields: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            form: LogRegConfig::default(),
            field: CrfTrainerConfig::default(),
            pipelines: default_pipelines(),
            train_fields: true,
        }
    }
}

/// Campo anotado.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedField {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub features: FeatureMap,
}

/// Formulário anotado: uma linha dos arquivos JSON-lines de treino.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedForm {
    /// Página de origem; o domínio agrupa formulários na validação cruzada.
    #[serde(default)]
    pub url: String,
    pub form_type: String,
    #[serde(default)]
    pub features: FormFeatures,
    #[serde(default)]
    pub fields: Vec<AnnotatedField>,
}

impl AnnotatedForm {
    /// Domínio da URL (sem esquema, porta e `www.`), usado como grupo.
    pub fn domain(&self) -> String {
        let rest = self
            .url
            .split_once("://")
            .map_or(self.url.as_str(), |(_, rest)| rest);
        let host = rest.split(&['/', '?', '#'][..]).next().unwrap_or_default();
        let host = host.rsplit('@').next().unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default().to_lowercase();
        host.trim_start_matches("www.").to_string()
    }

    pub fn field_features(&self) -> Vec<FieldFeatures> {
        self.fields
            .iter()
            .map(|f| FieldFeatures {
                name: f.name.clone(),
                features: f.features.clone(),
            })
            .collect()
    }

    /// Sequência de treino do CRF com `form_type` injetado nos campos.
    pub fn to_sequence(&self, form_type: &str) -> TrainingSequence {
        let fields = with_form_type(&self.field_features(), form_type);
        TrainingSequence::new(
            fields.iter().map(|f| features_to_attributes(&f.features)).collect(),
            self.fields.iter().map(|f| f.label.clone()).collect(),
        )
    }
}

/// Cópia dos campos com a feature `form-type` preenchida.
pub fn with_form_type(fields: &[FieldFeatures], form_type: &str) -> Vec<FieldFeatures> {
    fields
        .iter()
        .map(|f| {
            let mut f = f.clone();
            f.features
                .insert(FORM_TYPE_FEATURE.to_string(), FeatureValue::from(form_type));
            f
        })
        .collect()
}

/// Resultado da classificação de um formulário.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormResult {
    #[serde(rename = "type")]
    pub form_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

/// Resultado probabilístico; probabilidades abaixo do limiar são omitidas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormResultProba {
    #[serde(rename = "type")]
    pub form_type: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Classificador completo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormFieldModel {
    pub form_model: FormTypeModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_model: Option<FieldTypeModel>,
}

impl FormFieldModel {
    /// Treina os dois estágios. O CRF vê o tipo anotado de cada formulário;
    /// formulários sem campos anotados ficam de fora do treino de campos.
    pub fn train(forms: &[AnnotatedForm], config: &TrainConfig) -> Result<Self> {
        let features: Vec<FormFeatures> = forms.iter().map(|f| f.features.clone()).collect();
        let labels: Vec<String> = forms.iter().map(|f| f.form_type.clone()).collect();
        let form_model = FormTypeModel::train(&features, &labels, &config.pipelines, &config.form)?;

        let field_model = if config.train_fields {
            let sequences: Vec<TrainingSequence> = forms
                .iter()
                .filter(|f| !f.fields.is_empty())
                .map(|f| f.to_sequence(&f.form_type))
                .collect();
            if sequences.is_empty() {
                warn!("Nenhum formulário com campos anotados; modelo de campos não treinado");
                None
            } else {
                Some(FieldTypeModel::train(&sequences, &config.field)?)
            }
        } else {
            None
        };

        info!(
            "Modelo treinado: {} tipos de formulário, modelo de campos: {}",
            form_model.classes().len(),
            field_model.is_some()
        );
        Ok(Self {
            form_model,
            field_model,
        })
    }

    /// Tipo do formulário e label de cada campo.
    pub fn classify(&self, form: &FormFeatures, fields: &[FieldFeatures]) -> FormResult {
        let form_type = self.form_model.classify(form);
        let fields = match &self.field_model {
            Some(model) if !fields.is_empty() => model
                .classify(&with_form_type(fields, &form_type))
                .into_iter()
                .collect(),
            _ => BTreeMap::new(),
        };
        FormResult { form_type, fields }
    }

    /// Como [`classify`](Self::classify), com probabilidades. Valores abaixo
    /// de `threshold` são descartados.
    pub fn classify_proba(
        &self,
        form: &FormFeatures,
        fields: &[FieldFeatures],
        threshold: f64,
    ) -> FormResultProba {
        let form_proba = self.form_model.classify_proba(form);
        let form_type = self.form_model.classify(form);

        let fields = match &self.field_model {
            Some(model) if !fields.is_empty() => model
                .classify_proba(&with_form_type(fields, &form_type))
                .into_iter()
                .map(|(name, probs)| (name, filter_threshold(probs, threshold)))
                .collect(),
            _ => BTreeMap::new(),
        };

        FormResultProba {
            form_type: filter_threshold(form_proba, threshold),
            fields,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.form_model.validate()?;
        if let Some(field_model) = &self.field_model {
            field_model.validate()?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)?;
        model.validate()?;
        Ok(model)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        info!("Modelo salvo em {}", path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

fn filter_threshold<I>(probs: I, threshold: f64) -> BTreeMap<String, f64>
where
    I: IntoIterator<Item = (String, f64)>,
{
    probs.into_iter().filter(|(_, p)| *p >= threshold).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DitError;
    use crate::pipeline::{ExtractedFeature, VecType};

    fn field(name: &str, kind: &str, label: &str) -> AnnotatedField {
        let mut features = FeatureMap::new();
        features.insert("type".into(), FeatureValue::from(kind));
        AnnotatedField {
            name: name.into(),
            label: label.into(),
            features,
        }
    }

    fn annotated(
        url: &str,
        form_type: &str,
        submit: &str,
        fields: Vec<AnnotatedField>,
    ) -> AnnotatedForm {
        let mut features = FormFeatures::new();
        features.insert("SubmitText".into(), ExtractedFeature::from(submit));
        AnnotatedForm {
            url: url.into(),
            form_type: form_type.into(),
            features,
            fields,
        }
    }

    fn training_forms() -> Vec<AnnotatedForm> {
        vec![
            annotated(
                "https://a.com/login",
                "login",
                "log in",
                vec![field("user", "text", "username"), field("pass", "password", "password")],
            ),
            annotated(
                "https://b.com/signin",
                "login",
                "sign in",
                vec![field("login", "text", "username"), field("pw", "password", "password")],
            ),
            annotated(
                "https://c.com/",
                "search",
                "search",
                vec![field("q", "text", "search query")],
            ),
            annotated(
                "https://d.com/find",
                "search",
                "go search",
                vec![field("query", "text", "search query")],
            ),
        ]
    }

    fn config() -> TrainConfig {
        TrainConfig {
            pipelines: vec![PipelineConfig {
                name: "submit text".into(),
                extractor_type: "SubmitText".into(),
                vec_type: VecType::Count,
                ngram_range: (1, 2),
                binary: true,
                ..Default::default()
            }],
            field: CrfTrainerConfig {
                c1: 0.0,
                c2: 0.1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fields_of(form: &AnnotatedForm) -> Vec<FieldFeatures> {
        form.field_features()
    }

    #[test]
    fn test_form_type_is_injected_into_fields() {
        let forms = training_forms();
        let seq = forms[0].to_sequence("login");
        assert_eq!(seq.features[0]["form-type=login"], 1.0);
        assert_eq!(seq.labels, vec!["username", "password"]);
    }

    #[test]
    fn test_train_and_classify() {
        let forms = training_forms();
        let model = FormFieldModel::train(&forms, &config()).unwrap();

        let result = model.classify(&forms[0].features, &fields_of(&forms[0]));
        assert_eq!(result.form_type, "login");
        assert_eq!(result.fields["user"], "username");
        assert_eq!(result.fields["pass"], "password");

        let result = model.classify(&forms[2].features, &fields_of(&forms[2]));
        assert_eq!(result.form_type, "search");
        assert_eq!(result.fields["q"], "search query");
    }

    #[test]
    fn test_classify_proba_threshold() {
        let forms = training_forms();
        let model = FormFieldModel::train(&forms, &config()).unwrap();

        let all = model.classify_proba(&forms[0].features, &fields_of(&forms[0]), 0.0);
        assert_eq!(all.form_type.len(), 2);
        assert!((all.form_type.values().sum::<f64>() - 1.0).abs() < 1e-9);

        let confident = model.classify_proba(&forms[0].features, &fields_of(&forms[0]), 0.5);
        assert_eq!(confident.form_type.len(), 1);
        assert!(confident.form_type.contains_key("login"));
        for probs in confident.fields.values() {
            assert!(probs.values().all(|p| *p >= 0.5));
        }
    }

    #[test]
    fn test_no_fields_skips_field_model() {
        let forms = training_forms();
        let model = FormFieldModel::train(&forms, &config()).unwrap();
        let result = model.classify(&forms[3].features, &[]);
        assert_eq!(result.form_type, "search");
        assert!(result.fields.is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let forms = training_forms();
        let model = FormFieldModel::train(&forms, &config()).unwrap();
        let restored = FormFieldModel::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(
            restored.classify(&forms[1].features, &fields_of(&forms[1])),
            model.classify(&forms[1].features, &fields_of(&forms[1]))
        );
    }

    #[test]
    fn test_save_and_load() {
        let forms = training_forms();
        let model = FormFieldModel::train(&forms, &config()).unwrap();
        let path = std::env::temp_dir().join(format!("dit-model-{}.json", std::process::id()));
        model.save(&path).unwrap();
        let loaded = FormFieldModel::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.form_model.classes(), model.form_model.classes());
        assert!(loaded.field_model.is_some());
    }

    #[test]
    fn test_load_rejects_corrupted_model() {
        let forms = training_forms();
        let mut model = FormFieldModel::train(&forms, &config()).unwrap();
        if let Some(field_model) = model.field_model.as_mut() {
            field_model.crf.weights.push(0.0);
        }
        let json = serde_json::to_string(&model).unwrap();
        assert!(matches!(
            FormFieldModel::from_json(&json),
            Err(DitError::InvalidModel(_))
        ));
        assert!(matches!(FormFieldModel::from_json("{"), Err(DitError::Json(_))));
    }

    #[test]
    fn test_domain() {
        let form = annotated("https://www.Example.com:8080/login?next=/", "login", "", vec![]);
        assert_eq!(form.domain(), "example.com");
        let form = annotated("example.org/path", "login", "", vec![]);
        assert_eq!(form.domain(), "example.org");
    }

    #[test]
    fn test_train_config_from_partial_json() {
        let json = r#"{"form": {"c": 1.0}, "train_fields": false}"#;
        let config: TrainConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.form.c, 1.0);
        assert_eq!(config.form.max_iter, 100);
        assert!(!config.train_fields);
        assert_eq!(config.pipelines.len(), 9);
    }
}
