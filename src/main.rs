use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use sic_classifier::records::normalize_entity_name;
use sic_classifier::{
    load_companies, AccuracyValue, Classifier, ClassifierConfig, CompanyRecord, CorrectionRequest,
    ReconciliationReport,
};

const USAGE: &str = "Usage:
  sic-classifier predict   <config.json> <description> [top_n]
  sic-classifier score     <config.json> <companies.csv>
  sic-classifier correct   <config.json> <companies.csv> <company name> <new code> [confidence]
  sic-classifier reconcile <config.json> <companies.csv>
  sic-classifier history   <config.json> <company name>";

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let config = ClassifierConfig::from_file(&args[2])?;
    let classifier = Classifier::from_config(&config)?;

    match (args[1].as_str(), &args[3..]) {
        ("predict", [description, rest @ ..]) => {
            let top_n = match rest.first() {
                Some(n) => n.parse().context("top_n must be a positive integer")?,
                None => 3,
            };
            run_predict(&classifier, description, top_n)
        }
        ("score", [companies]) => run_score(&classifier, Path::new(companies)),
        ("correct", [companies, name, code, rest @ ..]) => {
            let confidence = match rest.first() {
                Some(c) => Some(c.parse::<f64>().context("confidence must be a number")?),
                None => None,
            };
            run_correct(&classifier, Path::new(companies), name, code, confidence)
        }
        ("reconcile", [companies]) => run_reconcile(&classifier, Path::new(companies)),
        ("history", [name]) => run_history(&classifier, name),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }
}

fn run_predict(classifier: &Classifier, description: &str, top_n: usize) -> Result<()> {
    println!("🎯 Top {} codes for: {}", top_n, description);

    let candidates = classifier.predict(description, top_n);
    if candidates.is_empty() {
        println!("   (no candidates)");
    }
    for (rank, c) in candidates.iter().enumerate() {
        println!(
            "{:>2}. {} {:>5.1}%  {}  [activity: {}, boost: {}]",
            rank + 1,
            c.code,
            c.score,
            c.description,
            c.extracted_activity,
            c.boost_applied
        );
    }
    Ok(())
}

fn run_score(classifier: &Classifier, companies: &Path) -> Result<()> {
    let records = load_companies(companies)?;
    println!("📊 Scoring {} companies\n", records.len());

    for scored in classifier.score_batch(&records) {
        let old = &scored.accuracy.old;
        let new = &scored.accuracy.new;
        println!(
            "{}: old {} {:.1}% {}  |  suggested {} {:.1}% {}",
            scored.record.entity_name,
            old.assigned_code.as_deref().unwrap_or("-"),
            old.old_accuracy,
            if old.is_accurate { "✓" } else { "✗" },
            new.predicted_code.as_deref().unwrap_or("-"),
            new.new_accuracy,
            if new.is_accurate { "✓" } else { "✗" },
        );
    }
    Ok(())
}

fn run_correct(
    classifier: &Classifier,
    companies: &Path,
    name: &str,
    code: &str,
    confidence: Option<f64>,
) -> Result<()> {
    let records = load_companies(companies)?;
    let key = normalize_entity_name(name);
    let record: CompanyRecord = match records.into_iter().find(|r| r.normalized_name() == key) {
        Some(r) => r,
        None => bail!("No company named {:?} in {}", name, companies.display()),
    };

    let mut request = CorrectionRequest::new(record, code).with_author("cli");
    if let Some(c) = confidence {
        request = request.with_confidence(c);
    }

    // Lock timeouts clear on their own; retry once before giving up
    let event = match classifier.submit_correction(request.clone()) {
        Err(e) if e.is_retryable() => {
            log::warn!("{}; retrying once", e);
            classifier.submit_correction(request)?
        }
        other => other?,
    };

    println!(
        "✅ {} ({}): {:?} -> {:?}, accuracy {:.1}% -> {:.1}%",
        event.entity_name,
        event.identity_key,
        event.previous_code,
        event.new_code,
        event.previous_accuracy,
        event.new_accuracy
    );
    Ok(())
}

fn run_reconcile(classifier: &Classifier, companies: &Path) -> Result<()> {
    let records = load_companies(companies)?;
    let view = classifier.reconciled_view(&records)?;

    for entry in &view {
        println!(
            "{}: code {}  old {}  new {}{}",
            entry.record.entity_name,
            entry.assigned_code.as_deref().unwrap_or("-"),
            show(entry.old_accuracy),
            show(entry.new_accuracy),
            if entry.is_corrected() { "  (reviewed)" } else { "" }
        );
    }

    let report = ReconciliationReport::from_records(&view, classifier.config());
    println!("\n{}", report.summary());
    Ok(())
}

fn run_history(classifier: &Classifier, name: &str) -> Result<()> {
    let history = classifier.history(name)?;
    println!("🕒 {} correction(s) for {}", history.len(), name);

    for event in history {
        println!(
            "{}  {:?} -> {:?}  {:.1}%  by {}",
            event.timestamp, event.previous_code, event.new_code, event.new_accuracy, event.author
        );
    }
    Ok(())
}

fn show(value: AccuracyValue) -> String {
    match value {
        AccuracyValue::Unset => "unset".to_string(),
        AccuracyValue::Automatic(v) => format!("{:.1}% (auto)", v),
        AccuracyValue::Reviewed(v) => format!("{:.1}%", v),
    }
}
