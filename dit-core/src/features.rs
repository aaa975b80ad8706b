//! # Features Tipadas
//!
//! Os extratores de features (fora deste crate) descrevem cada formulário e
//! cada campo como um mapa `nome → valor`, onde o valor pode ser booleano,
//! número, texto ou lista de textos. Este módulo define esse formato e a
//! conversão para os atributos numéricos que o CRF consome.
//!
//! ## Conversão para atributos do CRF
//!
//! | Valor                    | Atributo(s) gerado(s)     |
//! |--------------------------|---------------------------|
//! | `"tag": "input"`         | `tag=input` → 1.0         |
//! | `"name": ["user","id"]`  | `name:user`, `name:id` → 1.0 |
//! | `"is-first": true`       | `is-first` → 1.0          |
//! | `"is-last": false`       | (nenhum)                  |
//! | `"bias": 1`              | `bias` → 1.0              |

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Valor de uma feature extraída do HTML.
///
/// A ordem das variantes importa para o `serde(untagged)`: `1` em JSON vira
/// `Int`, `1.5` vira `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Float(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Str(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Str(v)
    }
}

impl From<Vec<String>> for FeatureValue {
    fn from(v: Vec<String>) -> Self {
        FeatureValue::List(v)
    }
}

/// Mapa de features de uma entidade (formulário ou campo).
///
/// `BTreeMap` para que a iteração (e portanto a ordem das somas) seja
/// determinística.
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// Atributos numéricos de uma posição da sequência do CRF.
pub type AttributeMap = HashMap<String, f64>;

/// Converte features tipadas em atributos `String → f64` para o CRF.
pub fn features_to_attributes(features: &FeatureMap) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    for (key, value) in features {
        match value {
            FeatureValue::Str(s) => {
                attrs.insert(format!("{key}={s}"), 1.0);
            }
            FeatureValue::List(items) => {
                for item in items {
                    attrs.insert(format!("{key}:{item}"), 1.0);
                }
            }
            FeatureValue::Bool(true) => {
                attrs.insert(key.clone(), 1.0);
            }
            FeatureValue::Bool(false) => {}
            FeatureValue::Int(v) => {
                attrs.insert(key.clone(), *v as f64);
            }
            FeatureValue::Float(v) => {
                attrs.insert(key.clone(), *v);
            }
        }
    }
    attrs
}
