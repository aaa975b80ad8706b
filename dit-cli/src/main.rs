//! Linha de comando do dit: treina, avalia e aplica os modelos sobre
//! arquivos JSON-lines de features já extraídas do HTML.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dit_core::evaluate::{evaluate_field_types, evaluate_form_types, group_ids};
use dit_core::{AnnotatedForm, FieldFeatures, FormFeatures, FormFieldModel, TrainConfig};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Classificação de formulários e campos HTML.", version)]
struct Args {
    /// Logs de depuração (equivale a RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Treina o modelo a partir de formulários anotados
    Train {
        /// Arquivos JSON-lines de formulários anotados
        #[arg(long, required = true)]
        data: Vec<PathBuf>,

        /// Arquivo onde o modelo treinado é gravado
        #[arg(long, default_value = "model.json")]
        model: PathBuf,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Avalia os modelos com validação cruzada agrupada por domínio
    Evaluate {
        /// Arquivos JSON-lines de formulários anotados
        #[arg(long, required = true)]
        data: Vec<PathBuf>,

        /// Número de folds
        #[arg(long, default_value = "10")]
        cv: usize,

        #[command(flatten)]
        training: TrainingArgs,
    },

    /// Classifica formulários (uma requisição JSON por linha)
    Classify {
        /// Modelo treinado
        #[arg(long, default_value = "model.json")]
        model: PathBuf,

        /// Arquivo de entrada; lê da entrada padrão quando omitido
        #[arg(long)]
        input: Option<PathBuf>,

        /// Emite probabilidades em vez de labels
        #[arg(long)]
        proba: bool,

        /// Probabilidades abaixo deste valor são omitidas (com --proba)
        #[arg(long, default_value = "0.05")]
        threshold: f64,
    },
}

#[derive(clap::Args, Debug)]
struct TrainingArgs {
    /// Configuração de treino em JSON (campos ausentes usam os defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inverso da regularização da regressão logística
    #[arg(long)]
    c: Option<f64>,

    /// Coeficiente L1 do CRF
    #[arg(long)]
    c1: Option<f64>,

    /// Coeficiente L2 do CRF
    #[arg(long)]
    c2: Option<f64>,

    /// Limite de iterações dos dois otimizadores
    #[arg(long)]
    max_iter: Option<usize>,

    /// Treina apenas o modelo de tipo de formulário
    #[arg(long)]
    no_fields: bool,
}

impl TrainingArgs {
    fn load(&self) -> anyhow::Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("lendo configuração {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("configuração inválida em {}", path.display()))?
            }
            None => TrainConfig::default(),
        };
        if let Some(c) = self.c {
            config.form.c = c;
        }
        if let Some(c1) = self.c1 {
            config.field.c1 = c1;
        }
        if let Some(c2) = self.c2 {
            config.field.c2 = c2;
        }
        if let Some(max_iter) = self.max_iter {
            config.form.max_iter = max_iter;
            config.field.max_iterations = max_iter;
        }
        if self.no_fields {
            config.train_fields = false;
        }
        Ok(config)
    }
}

/// Uma linha da entrada do `classify`.
#[derive(Deserialize, Debug)]
struct ClassifyRequest {
    #[serde(default)]
    features: FormFeatures,
    #[serde(default)]
    fields: Vec<FieldFeatures>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Train {
            data,
            model,
            training,
        } => train(&data, &model, &training),
        Command::Evaluate { data, cv, training } => evaluate(&data, cv, &training),
        Command::Classify {
            model,
            input,
            proba,
            threshold,
        } => classify(&model, input.as_deref(), proba, threshold),
    }
}

fn train(data: &[PathBuf], model_path: &Path, training: &TrainingArgs) -> anyhow::Result<()> {
    let config = training.load()?;
    let forms = load_annotations(data)?;
    let model = FormFieldModel::train(&forms, &config)?;
    model
        .save(model_path)
        .with_context(|| format!("gravando {}", model_path.display()))?;
    Ok(())
}

fn evaluate(data: &[PathBuf], cv: usize, training: &TrainingArgs) -> anyhow::Result<()> {
    let config = training.load()?;
    let forms = load_annotations(data)?;
    let domains: Vec<String> = forms.iter().map(AnnotatedForm::domain).collect();
    let groups = group_ids(&domains);
    info!(
        "Avaliando {} formulários de {} domínios, {} folds",
        forms.len(),
        groups.iter().max().map_or(0, |g| g + 1),
        cv
    );

    let forms_result = evaluate_form_types(&forms, &groups, cv, &config)?;
    println!(
        "Acurácia do tipo de formulário: {:.1}% ({}/{})",
        forms_result.accuracy * 100.0,
        forms_result.correct,
        forms_result.total
    );
    println!("\n{}", forms_result.report);

    if config.train_fields && forms.iter().any(|f| !f.fields.is_empty()) {
        let fields_result = evaluate_field_types(&forms, &groups, cv, &config)?;
        println!(
            "Acurácia do tipo de campo: {:.1}% ({}/{} campos)",
            fields_result.field_accuracy * 100.0,
            fields_result.field_correct,
            fields_result.field_total
        );
        println!(
            "Acurácia por sequência: {:.1}% ({}/{} formulários)",
            fields_result.sequence_accuracy * 100.0,
            fields_result.sequence_correct,
            fields_result.sequence_total
        );
        println!("\n{}", fields_result.report);
    }
    Ok(())
}

fn classify(
    model_path: &Path,
    input: Option<&Path>,
    proba: bool,
    threshold: f64,
) -> anyhow::Result<()> {
    let model = FormFieldModel::load(model_path)
        .with_context(|| format!("carregando modelo {}", model_path.display()))?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("abrindo {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let mut out = BufWriter::new(io::stdout().lock());

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: ClassifyRequest = serde_json::from_str(&line)
            .with_context(|| format!("linha {}: requisição inválida", i + 1))?;
        if proba {
            let result = model.classify_proba(&request.features, &request.fields, threshold);
            serde_json::to_writer(&mut out, &result)?;
        } else {
            let result = model.classify(&request.features, &request.fields);
            serde_json::to_writer(&mut out, &result)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn load_annotations(paths: &[PathBuf]) -> anyhow::Result<Vec<AnnotatedForm>> {
    let mut forms = Vec::new();
    for path in paths {
        info!("Carregando {} ...", path.display());
        let file = File::open(path).with_context(|| format!("abrindo {}", path.display()))?;
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let form: AnnotatedForm = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: anotação inválida", path.display(), i + 1))?;
            forms.push(form);
        }
    }
    if forms.is_empty() {
        bail!("nenhuma anotação encontrada");
    }
    info!("{} formulários anotados", forms.len());
    Ok(forms)
}
