//! Subcommand implementations. Every call goes through the gateway.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use medchat_core::conversation::SUGGESTED_QUESTIONS;
use medchat_core::timeouts::DEFAULT_CALLER_REPORT_MARGIN_SECS;
use medchat_core::{
    Attachment, ChatTurn, ConfigError, Conversation, Endpoints, HttpInferenceClient,
    InferenceClient, MediaType, PatientSummary, ReportRequest, Role, TimeoutPolicy, UploadBatch,
    UploadLimits,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Caller-side budgets derived from the table the gateway is running with.
///
/// Without an explicit report timeout the gateway's report budget plus the
/// default margin is used. The result must enclose `gateway`, otherwise the
/// CLI would abandon reports the gateway is still waiting on.
pub fn caller_timeouts(
    gateway: &TimeoutPolicy,
    report_timeout_secs: Option<u64>,
) -> Result<TimeoutPolicy, ConfigError> {
    let policy = match report_timeout_secs {
        Some(secs) => TimeoutPolicy {
            generate_report: Duration::from_secs(secs),
            ..gateway.clone()
        },
        None => gateway.caller_policy(Duration::from_secs(DEFAULT_CALLER_REPORT_MARGIN_SECS)),
    };
    policy.validate()?;
    policy.encloses(gateway)?;
    Ok(policy)
}

/// Builds the client after reading the gateway's published timeouts.
///
/// An unreachable gateway falls back to the default table so that `health`
/// can still report it; any other failure to read the table is an error.
pub async fn connect(
    gateway_url: &str,
    report_timeout_secs: Option<u64>,
) -> anyhow::Result<HttpInferenceClient> {
    let probe = HttpInferenceClient::new(
        gateway_url,
        Endpoints::gateway(),
        TimeoutPolicy::default(),
        UploadLimits::default(),
    )?;
    let gateway = match probe.published_timeouts().await {
        Ok(policy) => policy,
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "Could not read gateway timeouts, assuming defaults");
            TimeoutPolicy::default()
        }
        Err(e) => return Err(e).context("failed to read gateway timeouts"),
    };

    let timeouts = caller_timeouts(&gateway, report_timeout_secs)?;
    let client = HttpInferenceClient::new(
        gateway_url,
        Endpoints::gateway(),
        timeouts,
        UploadLimits::default(),
    )?;
    debug!(
        base_url = client.base_url(),
        gateway_report_secs = gateway.generate_report.as_secs(),
        report_secs = client.timeouts().generate_report.as_secs(),
        "Caller timeouts"
    );
    Ok(client)
}

pub async fn list_patients(client: &dyn InferenceClient) -> anyhow::Result<()> {
    let patients = client.list_patients().await?;
    if patients.is_empty() {
        println!("No patients available.");
        return Ok(());
    }
    for patient in &patients {
        println!("{}", describe_patient(patient));
    }
    Ok(())
}

fn describe_patient(patient: &PatientSummary) -> String {
    let mut line = format!(
        "{:<10} {} ({}, {})",
        patient.patient_id, patient.name, patient.age, patient.gender
    );
    if let Some(department) = &patient.department {
        line.push_str(&format!(" - {}", department));
    }
    if let Some(admitted) = &patient.admission_date {
        line.push_str(&format!(", admitted {}", admitted));
    }
    line.push_str(&format!(", {} documents", patient.document_count));
    line
}

fn find_patient<'a>(
    patients: &'a [PatientSummary],
    patient_id: &str,
) -> anyhow::Result<&'a PatientSummary> {
    match patients.iter().find(|p| p.patient_id == patient_id) {
        Some(patient) => Ok(patient),
        None => bail!("unknown patient {patient_id}"),
    }
}

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Quit,
    Switch(String),
    Question(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line == "/quit" || line == "/exit" {
        return Input::Quit;
    }
    if let Some(id) = line.strip_prefix("/switch") {
        return Input::Switch(id.trim().to_string());
    }
    // A bare number picks a suggested question
    if let Ok(n) = line.parse::<usize>() {
        if (1..=SUGGESTED_QUESTIONS.len()).contains(&n) {
            return Input::Question(SUGGESTED_QUESTIONS[n - 1].to_string());
        }
    }
    Input::Question(line.to_string())
}

fn print_turn(turn: &ChatTurn) {
    let speaker = match turn.role {
        Role::User => "Sie",
        Role::Assistant => "Assistent",
    };
    println!("\n{}: {}", speaker, turn.content);
    if let Some(sources) = &turn.sources {
        for source in sources {
            println!("    [{} / {}] ({:.2})", source.source, source.section, source.score);
        }
    }
    println!();
}

fn print_suggestions() {
    println!("Vorgeschlagene Fragen:");
    for (i, question) in SUGGESTED_QUESTIONS.iter().enumerate() {
        println!("  {}. {}", i + 1, question);
    }
    println!("(/switch <patient_id> wechselt den Patienten, /quit beendet)\n");
}

pub async fn chat(client: &dyn InferenceClient, patient_id: &str) -> anyhow::Result<()> {
    let patients = client.list_patients().await?;
    let mut conversation = Conversation::for_patient(find_patient(&patients, patient_id)?);

    if let Some(greeting) = conversation.last_turn() {
        print_turn(greeting);
    }
    print_suggestions();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Switch(id) => match find_patient(&patients, &id) {
                Ok(patient) => {
                    conversation.switch_patient(patient);
                    if let Some(greeting) = conversation.last_turn() {
                        print_turn(greeting);
                    }
                }
                Err(e) => eprintln!("{e}"),
            },
            Input::Question(question) => match conversation.ask(client, &question).await {
                Ok(answer) => print_turn(answer),
                Err(e) => {
                    if let Some(apology) = conversation.last_turn() {
                        print_turn(apology);
                    }
                    eprintln!("{e}");
                }
            },
        }
    }
    Ok(())
}

pub fn report_filename(patient_id: &str, date: NaiveDate) -> String {
    format!("bericht_{}_{}.json", patient_id, date.format("%Y-%m-%d"))
}

pub async fn report(
    client: &dyn InferenceClient,
    patient_id: &str,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("Generating discharge report for {patient_id}. This can take a few minutes...");

    let request = ReportRequest {
        patient_id: patient_id.to_string(),
    };
    let response = client.generate_report(&request).await?;

    let path = out
        .unwrap_or_else(|| PathBuf::from(report_filename(patient_id, Utc::now().date_naive())));
    let content = serde_json::to_string_pretty(&response.report)?;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("Report saved to {}", path.display());
    Ok(())
}

/// Declared type for a local file, guessed from its extension.
fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => MediaType::Json.as_mime(),
        Some("pdf") => MediaType::Pdf.as_mime(),
        Some("txt") => MediaType::PlainText.as_mime(),
        _ => "application/octet-stream",
    }
}

pub async fn upload(
    client: &dyn InferenceClient,
    patient_id: &str,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    let mut attachments = Vec::with_capacity(files.len());
    for path in &files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();
        attachments.push(Attachment::new(filename, media_type_for(path), data));
    }

    let ack = client
        .upload_documents(UploadBatch::new(patient_id, attachments))
        .await?;
    println!("{}", serde_json::to_string_pretty(&ack)?);
    Ok(())
}

pub async fn health(client: &dyn InferenceClient) -> anyhow::Result<()> {
    if client.health_check().await {
        println!("Gateway is healthy");
        Ok(())
    } else {
        bail!("gateway is not reachable")
    }
}
