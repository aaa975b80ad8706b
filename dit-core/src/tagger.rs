//! # Tipo de Campo — Marcação com CRF
//!
//! Os campos de um formulário, na ordem do documento, formam uma sequência.
//! O CRF rotula todos de uma vez, de modo que o label de um campo influencia
//! o do vizinho (`password` costuma vir depois de `username`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crf::{CrfModel, TrainingSequence};
use crate::crf_trainer::{self, CrfTrainerConfig};
use crate::error::Result;
use crate::features::{features_to_attributes, AttributeMap, FeatureMap};

/// Features de um campo, extraídas do HTML por um colaborador externo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldFeatures {
    /// Atributo `name` do campo.
    pub name: String,
    #[serde(default)]
    pub features: FeatureMap,
}

/// Modelo de tipo de campo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTypeModel {
    pub crf: CrfModel,
}

impl FieldTypeModel {
    pub fn train(sequences: &[TrainingSequence], config: &CrfTrainerConfig) -> Result<Self> {
        Ok(Self {
            crf: crf_trainer::train(sequences, config)?,
        })
    }

    /// `(nome do campo, label)` na ordem dos campos.
    pub fn classify(&self, fields: &[FieldFeatures]) -> Vec<(String, String)> {
        let labels = self.crf.predict(&attributes(fields));
        fields.iter().map(|f| f.name.clone()).zip(labels).collect()
    }

    /// `(nome do campo, label → probabilidade)` na ordem dos campos.
    pub fn classify_proba(&self, fields: &[FieldFeatures]) -> Vec<(String, HashMap<String, f64>)> {
        let marginals = self.crf.predict_marginals(&attributes(fields));
        fields.iter().map(|f| f.name.clone()).zip(marginals).collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.crf.validate()
    }
}

/// Converte as features tipadas de cada campo em atributos do CRF.
pub fn attributes(fields: &[FieldFeatures]) -> Vec<AttributeMap> {
    fields
        .iter()
        .map(|f| features_to_attributes(&f.features))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureValue;

    fn field(name: &str, kind: &str) -> FieldFeatures {
        let mut features = FeatureMap::new();
        features.insert("type".into(), FeatureValue::from(kind));
        features.insert("bias".into(), FeatureValue::from(true));
        FieldFeatures {
            name: name.into(),
            features,
        }
    }

    fn sequence(fields: &[FieldFeatures], labels: &[&str]) -> TrainingSequence {
        TrainingSequence::new(attributes(fields), labels.iter().map(|l| l.to_string()).collect())
    }

    #[test]
    fn test_classify_pairs_names_with_labels() {
        let login = [field("user", "text"), field("pass", "password")];
        let signup = [field("email", "email"), field("pw", "password"), field("pw2", "password")];
        let data = vec![
            sequence(&login, &["username", "password"]),
            sequence(&signup, &["email", "password", "password confirmation"]),
            sequence(&login, &["username", "password"]),
        ];
        let config = CrfTrainerConfig {
            c1: 0.0,
            c2: 0.1,
            ..Default::default()
        };
        let model = FieldTypeModel::train(&data, &config).unwrap();

        let result = model.classify(&login);
        assert_eq!(
            result,
            vec![
                ("user".to_string(), "username".to_string()),
                ("pass".to_string(), "password".to_string())
            ]
        );

        let proba = model.classify_proba(&login);
        assert_eq!(proba.len(), 2);
        assert_eq!(proba[0].0, "user");
        assert!((proba[1].1.values().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_attributes_conversion() {
        let attrs = attributes(&[field("q", "search")]);
        assert_eq!(attrs[0]["type=search"], 1.0);
        assert_eq!(attrs[0]["bias"], 1.0);
    }

    #[test]
    fn test_no_fields() {
        let data = vec![sequence(&[field("q", "search")], &["search query"])];
        let model = FieldTypeModel::train(&data, &CrfTrainerConfig::default()).unwrap();
        assert!(model.classify(&[]).is_empty());
        assert!(model.classify_proba(&[]).is_empty());
    }
}
