//! # Avaliação por Validação Cruzada
//!
//! Formulários do mesmo site tendem a ser quase idênticos; se um deles cai no
//! treino e outro no teste, a acurácia fica inflada. Por isso os folds são
//! formados por **grupos** (em geral o domínio): um grupo inteiro fica de um
//! lado só.
//!
//! - [`group_k_fold`]: particiona os índices em folds disjuntos por grupo.
//! - [`evaluate_form_types`]: acurácia do modelo de formulário + [`ClassReport`].
//! - [`evaluate_field_types`]: acurácia por campo e por sequência do CRF, com o
//!   tipo de formulário anotado injetado nos campos.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use tracing::info;

use crate::crf::TrainingSequence;
use crate::error::{DitError, Result};
use crate::model::{AnnotatedForm, TrainConfig};
use crate::pipeline::{FormFeatures, FormTypeModel};
use crate::tagger::FieldTypeModel;

/// Um fold: índices de treino e de teste.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Ids de grupo em ordem de primeira aparição das chaves.
pub fn group_ids<S: AsRef<str>>(keys: &[S]) -> Vec<usize> {
    let mut ids: HashMap<&str, usize> = HashMap::new();
    keys.iter()
        .map(|k| {
            let next = ids.len();
            *ids.entry(k.as_ref()).or_insert(next)
        })
        .collect()
}

/// K-fold por grupo. Os grupos distintos são ordenados e distribuídos em
/// rodízio entre os folds; `n_folds` é limitado ao número de grupos.
///
/// Com menos de dois folds (ou de dois grupos) algum fold ficaria sem
/// treino, então isso é rejeitado com [`DitError::InvalidFolds`].
pub fn group_k_fold(groups: &[usize], n_folds: usize) -> Result<Vec<Fold>> {
    let unique: Vec<usize> = groups
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if n_folds < 2 || unique.len() < 2 {
        return Err(DitError::InvalidFolds {
            n_folds,
            groups: unique.len(),
        });
    }
    let k = n_folds.min(unique.len());
    let fold_of: HashMap<usize, usize> = unique
        .iter()
        .enumerate()
        .map(|(i, &g)| (g, i % k))
        .collect();

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..groups.len()).partition(|&i| fold_of[&groups[i]] == fold);
            Fold { train, test }
        })
        .collect())
}

/// Métricas de uma classe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Matriz de confusão e métricas por classe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassReport {
    /// Classes em ordem lexicográfica.
    pub labels: Vec<String>,
    /// `confusion[verdadeiro][previsto]`.
    pub confusion: Vec<Vec<usize>>,
}

impl ClassReport {
    pub fn from_predictions<S: AsRef<str>>(truth: &[S], predicted: &[S]) -> Self {
        let labels: Vec<String> = truth
            .iter()
            .chain(predicted)
            .map(|s| s.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let mut confusion = vec![vec![0; labels.len()]; labels.len()];
        for (t, p) in truth.iter().zip(predicted) {
            confusion[index[t.as_ref()]][index[p.as_ref()]] += 1;
        }
        Self { labels, confusion }
    }

    pub fn total(&self) -> usize {
        self.confusion.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.confusion[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    pub fn metrics(&self) -> Vec<ClassMetrics> {
        let n = self.labels.len();
        (0..n)
            .map(|i| {
                let tp = self.confusion[i][i];
                let support: usize = self.confusion[i].iter().sum();
                let predicted: usize = (0..n).map(|r| self.confusion[r][i]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: self.labels[i].clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Média simples do F1 entre as classes.
    pub fn macro_f1(&self) -> f64 {
        let metrics = self.metrics();
        if metrics.is_empty() {
            return 0.0;
        }
        metrics.iter().map(|m| m.f1).sum::<f64>() / metrics.len() as f64
    }

    /// F1 médio ponderado pelo suporte.
    pub fn weighted_f1(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.metrics()
            .iter()
            .map(|m| m.f1 * m.support as f64)
            .sum::<f64>()
            / total as f64
    }
}

impl fmt::Display for ClassReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.labels.iter().map(String::len).max().unwrap_or(5).max(5);
        writeln!(
            f,
            "{:>width$}  {:>6}  {:>6}  {:>6}  {:>7}",
            "class", "prec", "recall", "f1", "support"
        )?;
        for m in self.metrics() {
            writeln!(
                f,
                "{:>width$}  {:>5.1}%  {:>5.1}%  {:>5.1}%  {:>7}",
                m.label,
                m.precision * 100.0,
                m.recall * 100.0,
                m.f1 * 100.0,
                m.support
            )?;
        }
        writeln!(
            f,
            "acurácia {:.1}%  macro F1 {:.1}%  weighted F1 {:.1}%",
            self.accuracy() * 100.0,
            self.macro_f1() * 100.0,
            self.weighted_f1() * 100.0
        )
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Resultado da avaliação do modelo de formulário.
#[derive(Debug, Clone, Serialize)]
pub struct FormTypeEvaluation {
    pub correct: usize,
    pub total: usize,
    pub accuracy: f64,
    pub report: ClassReport,
}

/// Resultado da avaliação do modelo de campos.
#[derive(Debug, Clone, Serialize)]
pub struct FieldTypeEvaluation {
    pub field_correct: usize,
    pub field_total: usize,
    pub field_accuracy: f64,
    pub sequence_correct: usize,
    pub sequence_total: usize,
    pub sequence_accuracy: f64,
    pub report: ClassReport,
}

/// Validação cruzada do tipo de formulário.
pub fn evaluate_form_types(
    forms: &[AnnotatedForm],
    groups: &[usize],
    n_folds: usize,
    config: &TrainConfig,
) -> Result<FormTypeEvaluation> {
    if forms.is_empty() {
        return Err(DitError::EmptyTrainingSet("nenhum formulário para avaliar"));
    }
    if forms.len() != groups.len() {
        return Err(DitError::LabelCountMismatch {
            vectors: forms.len(),
            labels: groups.len(),
        });
    }

    let mut truth = Vec::new();
    let mut predicted = Vec::new();
    for (i, fold) in group_k_fold(groups, n_folds)?.iter().enumerate() {
        let features: Vec<FormFeatures> = fold
            .train
            .iter()
            .map(|&j| forms[j].features.clone())
            .collect();
        let labels: Vec<String> = fold
            .train
            .iter()
            .map(|&j| forms[j].form_type.clone())
            .collect();
        let model = FormTypeModel::train(&features, &labels, &config.pipelines, &config.form)?;

        let before = truth.len();
        for &j in &fold.test {
            truth.push(forms[j].form_type.clone());
            predicted.push(model.classify(&forms[j].features));
        }
        let fold_correct = (before..truth.len()).filter(|&k| truth[k] == predicted[k]).count();
        info!("Fold {}: {}/{} formulários corretos", i + 1, fold_correct, fold.test.len());
    }

    let report = ClassReport::from_predictions(&truth, &predicted);
    Ok(FormTypeEvaluation {
        correct: report.correct(),
        total: report.total(),
        accuracy: report.accuracy(),
        report,
    })
}

/// Validação cruzada do tipo de campo. Formulários sem campos são ignorados.
pub fn evaluate_field_types(
    forms: &[AnnotatedForm],
    groups: &[usize],
    n_folds: usize,
    config: &TrainConfig,
) -> Result<FieldTypeEvaluation> {
    if forms.len() != groups.len() {
        return Err(DitError::LabelCountMismatch {
            vectors: forms.len(),
            labels: groups.len(),
        });
    }
    let (sequences, seq_groups): (Vec<TrainingSequence>, Vec<usize>) = forms
        .iter()
        .zip(groups)
        .filter(|(f, _)| !f.fields.is_empty())
        .map(|(f, &g)| {
            let mut seq = f.to_sequence(&f.form_type);
            seq.group = Some(g);
            (seq, g)
        })
        .unzip();
    if sequences.is_empty() {
        return Err(DitError::EmptyTrainingSet("nenhum formulário com campos anotados"));
    }

    let mut truth = Vec::new();
    let mut predicted = Vec::new();
    let mut sequence_correct = 0;
    for (i, fold) in group_k_fold(&seq_groups, n_folds)?.iter().enumerate() {
        let train: Vec<TrainingSequence> =
            fold.train.iter().map(|&j| sequences[j].clone()).collect();
        let model = FieldTypeModel::train(&train, &config.field)?;

        let mut fold_correct = 0;
        for &j in &fold.test {
            let seq = &sequences[j];
            let labels = model.crf.predict(&seq.features);
            if labels == seq.labels {
                sequence_correct += 1;
                fold_correct += 1;
            }
            truth.extend(seq.labels.iter().cloned());
            predicted.extend(labels);
        }
        info!("Fold {}: {}/{} sequências corretas", i + 1, fold_correct, fold.test.len());
    }

    let report = ClassReport::from_predictions(&truth, &predicted);
    let sequence_total = sequences.len();
    Ok(FieldTypeEvaluation {
        field_correct: report.correct(),
        field_total: report.total(),
        field_accuracy: report.accuracy(),
        sequence_correct,
        sequence_total,
        sequence_accuracy: ratio(sequence_correct, sequence_total),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crf_trainer::CrfTrainerConfig;
    use crate::features::{FeatureMap, FeatureValue};
    use crate::model::AnnotatedField;
    use crate::pipeline::{ExtractedFeature, PipelineConfig, VecType};

    #[test]
    fn test_group_ids_first_seen() {
        assert_eq!(group_ids(&["b.com", "a.com", "b.com", "c.com"]), vec![0, 1, 0, 2]);
    }

    #[test]
    fn test_group_k_fold_keeps_groups_disjoint() {
        let groups = vec![0, 0, 1, 2, 2, 3, 4, 4, 4];
        let folds = group_k_fold(&groups, 3).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..groups.len()).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), groups.len());
            for &i in &fold.test {
                assert!(fold.train.iter().all(|&j| groups[j] != groups[i]));
            }
        }
        // grupos ordenados em rodízio: 0 e 3 no fold 0
        assert_eq!(folds[0].test, vec![0, 1, 5]);
    }

    #[test]
    fn test_group_k_fold_clamps_folds() {
        let folds = group_k_fold(&[7, 7, 9], 10).unwrap();
        assert_eq!(folds.len(), 2);
        assert!(folds.iter().all(|f| !f.train.is_empty()));
    }

    #[test]
    fn test_group_k_fold_rejects_folds_without_training_data() {
        assert!(matches!(
            group_k_fold(&[3, 3, 3], 5),
            Err(DitError::InvalidFolds { n_folds: 5, groups: 1 })
        ));
        assert!(matches!(
            group_k_fold(&[0, 1, 2], 1),
            Err(DitError::InvalidFolds { n_folds: 1, groups: 3 })
        ));
        assert!(matches!(
            group_k_fold(&[], 5),
            Err(DitError::InvalidFolds { n_folds: 5, groups: 0 })
        ));
    }

    #[test]
    fn test_evaluate_single_domain_is_rejected() {
        let forms: Vec<AnnotatedForm> = dataset()
            .into_iter()
            .map(|mut f| {
                f.url = "https://example.com/".into();
                f
            })
            .collect();
        let keys: Vec<String> = forms.iter().map(AnnotatedForm::domain).collect();
        let groups = group_ids(&keys);
        assert!(matches!(
            evaluate_form_types(&forms, &groups, 3, &config()),
            Err(DitError::InvalidFolds { groups: 1, .. })
        ));
        assert!(matches!(
            evaluate_field_types(&forms, &groups, 3, &config()),
            Err(DitError::InvalidFolds { groups: 1, .. })
        ));
    }

    #[test]
    fn test_class_report_metrics() {
        let truth = ["a", "a", "a", "b", "b", "c"];
        let predicted = ["a", "a", "b", "b", "b", "a"];
        let report = ClassReport::from_predictions(&truth, &predicted);

        assert_eq!(report.labels, vec!["a", "b", "c"]);
        assert_eq!(report.confusion[0], vec![2, 1, 0]);
        assert_eq!(report.total(), 6);
        assert_eq!(report.correct(), 4);

        let m = report.metrics();
        // a: tp=2, previsto 3, suporte 3
        assert!((m[0].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m[0].recall - 2.0 / 3.0).abs() < 1e-12);
        // b: tp=2, previsto 3, suporte 2
        assert!((m[1].recall - 1.0).abs() < 1e-12);
        assert!((m[1].f1 - 0.8).abs() < 1e-12);
        // c: nunca previsto
        assert_eq!(m[2].f1, 0.0);
        assert_eq!(m[2].support, 1);

        let expected_macro = (2.0 / 3.0 + 0.8 + 0.0) / 3.0;
        assert!((report.macro_f1() - expected_macro).abs() < 1e-12);
        let expected_weighted = (2.0 / 3.0 * 3.0 + 0.8 * 2.0) / 6.0;
        assert!((report.weighted_f1() - expected_weighted).abs() < 1e-12);

        let text = report.to_string();
        assert!(text.contains("support"));
    }

    fn annotated(
        domain: &str,
        form_type: &str,
        submit: &str,
        fields: &[(&str, &str, &str)],
    ) -> AnnotatedForm {
        let mut features = FormFeatures::new();
        features.insert("SubmitText".into(), ExtractedFeature::from(submit));
        AnnotatedForm {
            url: format!("https://{domain}/"),
            form_type: form_type.into(),
            features,
            fields: fields
                .iter()
                .map(|(name, kind, label)| {
                    let mut f = FeatureMap::new();
                    f.insert("type".into(), FeatureValue::from(*kind));
                    AnnotatedField {
                        name: name.to_string(),
                        label: label.to_string(),
                        features: f,
                    }
                })
                .collect(),
        }
    }

    fn dataset() -> Vec<AnnotatedForm> {
        let mut forms = Vec::new();
        for i in 0..3 {
            forms.push(annotated(
                &format!("login{i}.com"),
                "login",
                "log in",
                &[("u", "text", "username"), ("p", "password", "password")],
            ));
            forms.push(annotated(
                &format!("search{i}.com"),
                "search",
                "search",
                &[("q", "search", "search query")],
            ));
        }
        forms
    }

    fn config() -> TrainConfig {
        TrainConfig {
            pipelines: vec![PipelineConfig {
                name: "submit text".into(),
                extractor_type: "SubmitText".into(),
                vec_type: VecType::Count,
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

    #[test]
    fn test_evaluate_form_types() {
        let forms = dataset();
        let keys: Vec<String> = forms.iter().map(AnnotatedForm::domain).collect();
        let groups = group_ids(&keys);
        let result = evaluate_form_types(&forms, &groups, 3, &config()).unwrap();
        assert_eq!(result.total, 6);
        assert_eq!(result.correct, 6);
        assert!((result.accuracy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_field_types() {
        let forms = dataset();
        let keys: Vec<String> = forms.iter().map(AnnotatedForm::domain).collect();
        let groups = group_ids(&keys);
        let result = evaluate_field_types(&forms, &groups, 3, &config()).unwrap();
        assert_eq!(result.field_total, 9);
        assert_eq!(result.sequence_total, 6);
        assert_eq!(result.field_correct, 9);
        assert_eq!(result.sequence_correct, 6);
    }
}
