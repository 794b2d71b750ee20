//! pdf-remediate CLI - PDF accessibility audit and remediation tool

mod services;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Runtime;

use pdf_remediate::audit::action_title;
use pdf_remediate::report::ScoreVariant;
use pdf_remediate::{
    build_evidence_pack, classify_source, displayed_score, parse_file_with_options, AuditResult,
    CircuitBreaker, DocumentOutcome, DocumentStatus, GuardedService, ParseOptions, Recognizer,
    RemediationOptions, Remediator, ServicePolicy, Severity, Verifier,
};

use services::{HttpRecognizer, HttpVerifier, DEFAULT_PROFILE};

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "pdf-remediate")]
#[command(version)]
#[command(about = "Audit and remediate PDF accessibility", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct ServiceArgs {
    /// Verification service base URL
    #[arg(long, env = "VERAPDF_SERVICE_URL", value_name = "URL")]
    verifier_url: Option<String>,

    /// Bearer token for the verification service
    #[arg(long, env = "VERAPDF_SERVICE_TOKEN", hide_env_values = true)]
    verifier_token: Option<String>,

    /// Validation profile
    #[arg(long, env = "VERAPDF_VALIDATION_PROFILE", default_value = DEFAULT_PROFILE)]
    profile: String,

    /// Text recognition service URL
    #[arg(long, env = "OCR_SERVICE_URL", value_name = "URL")]
    ocr_url: Option<String>,

    /// Bearer token for the recognition service
    #[arg(long, env = "OCR_SERVICE_TOKEN", hide_env_values = true)]
    ocr_token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "90")]
    timeout: u64,
}

#[derive(clap::Args, Clone)]
struct RemediateArgs {
    /// Output language (BCP 47), the document's own by default
    #[arg(long = "lang", value_name = "TAG")]
    language: Option<String>,

    /// Overlay all text as an invisible layer
    #[arg(long)]
    text_layer: bool,

    /// Stricter metadata (display the document title)
    #[arg(long)]
    strict: bool,

    /// Maximum remediation passes
    #[arg(long, default_value = "3")]
    max_iterations: u32,
}

impl RemediateArgs {
    fn options(&self) -> RemediationOptions {
        let mut options = RemediationOptions::new()
            .with_text_layer(self.text_layer)
            .with_max_iterations(self.max_iterations);
        options.parse = ParseOptions::new().lenient();
        if let Some(language) = &self.language {
            options = options.with_language(language.clone());
        }
        if self.strict {
            options = options.strict();
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a PDF and list findings
    Audit {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Print the audit as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify an upload as a content document or a checker report
    Classify {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show document information
    Info {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Remediate a PDF
    Remediate {
        /// Input PDF file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Output file (defaults to <name>.accessible.pdf)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Write the evidence pack as JSON
        #[arg(long, value_name = "FILE")]
        evidence: Option<PathBuf>,

        #[command(flatten)]
        remediate: RemediateArgs,

        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Remediate every PDF in a directory
    Batch {
        /// Input directory
        #[arg(value_name = "DIR")]
        input: PathBuf,

        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        #[command(flatten)]
        remediate: RemediateArgs,

        #[command(flatten)]
        services: ServiceArgs,
    },

    /// Show version information
    Version,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Audit { input, json } => cmd_audit(&input, json),
        Commands::Classify { input } => cmd_classify(&input),
        Commands::Info { input } => cmd_info(&input),
        Commands::Remediate {
            input,
            output,
            evidence,
            remediate,
            services,
        } => cmd_remediate(&input, output.as_deref(), evidence.as_deref(), &remediate, &services),
        Commands::Batch {
            input,
            output,
            remediate,
            services,
        } => cmd_batch(&input, output.as_deref(), &remediate, &services),
        Commands::Version => {
            cmd_version();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Service clients configured from the command line, each with its own breaker.
struct Services {
    verifier: Option<GuardedService<HttpVerifier>>,
    recognizer: Option<GuardedService<HttpRecognizer>>,
}

impl Services {
    fn connect(args: &ServiceArgs) -> Result<Self, Box<dyn std::error::Error>> {
        if args.verifier_url.is_none() && args.ocr_url.is_none() {
            return Ok(Self {
                verifier: None,
                recognizer: None,
            });
        }

        let runtime = Arc::new(Runtime::new()?);
        let policy = ServicePolicy::default().with_timeout(Duration::from_secs(args.timeout));

        let verifier = match &args.verifier_url {
            Some(url) => {
                let client = HttpVerifier::new(
                    runtime.clone(),
                    url,
                    &args.profile,
                    args.verifier_token.clone(),
                    policy.timeout,
                )?;
                let breaker = Arc::new(CircuitBreaker::new(policy.cooldown));
                Some(GuardedService::new(client, policy.clone(), breaker))
            }
            None => None,
        };

        let recognizer = match &args.ocr_url {
            Some(url) => {
                let client = HttpRecognizer::new(runtime, url, args.ocr_token.clone(), policy.timeout)?;
                let breaker = Arc::new(CircuitBreaker::new(policy.cooldown));
                Some(GuardedService::new(client, policy, breaker))
            }
            None => None,
        };

        Ok(Self { verifier, recognizer })
    }

    fn remediator(&self, options: RemediationOptions) -> Remediator<'_> {
        let mut remediator = Remediator::new(options);
        if let Some(verifier) = &self.verifier {
            remediator = remediator.with_verifier(verifier as &dyn Verifier);
        }
        if let Some(recognizer) = &self.recognizer {
            remediator = remediator.with_recognizer(recognizer as &dyn Recognizer);
        }
        remediator
    }
}

fn severity_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "critical".red().bold(),
        Severity::Major => "major".yellow().bold(),
        Severity::Minor => "minor".blue(),
    }
}

fn score_label(score: u32) -> ColoredString {
    let text = score.to_string();
    let text = text.as_str();
    if score >= 90 {
        text.green().bold()
    } else if score >= 60 {
        text.yellow().bold()
    } else {
        text.red().bold()
    }
}

fn print_findings(audit: &AuditResult) {
    if audit.findings.is_empty() {
        println!("{}", "No findings".green());
        return;
    }
    for (category, findings) in audit.grouped() {
        println!();
        println!("{}", category.label().cyan().bold());
        println!("{}", "─".repeat(40).dimmed());
        for finding in findings {
            let page = finding
                .location
                .page
                .map(|p| format!(" (page {})", p))
                .unwrap_or_default();
            println!(
                "  [{}] {}{}",
                severity_label(finding.severity),
                action_title(&finding.rule_id, finding.category),
                page.as_str().dimmed()
            );
            println!("      {}", finding.description);
            println!(
                "      {} {}",
                format!("WCAG {}:", finding.wcag_criterion).as_str().dimmed(),
                finding.recommendation
            );
        }
    }
}

fn cmd_audit(input: &Path, json: bool) -> CliResult {
    let doc = parse_file_with_options(input, ParseOptions::new().lenient())?;
    let audit = pdf_remediate::evaluate(&doc);

    if json {
        println!("{}", serde_json::to_string_pretty(&audit)?);
        return Ok(());
    }

    println!("{}", "Accessibility Audit".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Score".bold(), score_label(audit.score));
    println!(
        "{}: {} critical, {} major, {} minor",
        "Findings".bold(),
        audit.count(Severity::Critical),
        audit.count(Severity::Major),
        audit.count(Severity::Minor)
    );
    if audit.likely_scanned {
        println!("{}", "Document appears to be scanned or image-only".yellow());
    }
    print_findings(&audit);

    Ok(())
}

fn cmd_classify(input: &Path) -> CliResult {
    let doc = parse_file_with_options(input, ParseOptions::new().lenient())?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let assessment = classify_source(&name, &doc);

    println!("{}: {}", "Type".bold(), assessment.source_type.to_string().as_str().cyan());
    println!("{}: {}", "Confidence".bold(), assessment.confidence);
    for reason in &assessment.reasons {
        println!("  {} {}", "-".dimmed(), reason);
    }
    println!("{}: {}", "Suggested action".bold(), assessment.suggested_action);

    Ok(())
}

fn cmd_info(input: &Path) -> CliResult {
    let doc = parse_file_with_options(input, ParseOptions::new().lenient())?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Pages".bold(), doc.page_count);
    if let Some(ref title) = doc.title {
        println!("{}: {}", "Title".bold(), title);
    }
    if let Some(ref language) = doc.language {
        println!("{}: {}", "Language".bold(), language);
    }
    for key in ["Author", "Creator", "Producer", "pdfuaid:part"] {
        if let Some(value) = doc.meta(key) {
            println!("{}: {}", key.bold(), value);
        }
    }

    println!();
    println!("{}", "Structure".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    println!(
        "{}: {}",
        "Tagged".bold(),
        if doc.has_structure_tree { "Yes" } else { "No" }
    );
    println!("{}: {}", "Tags".bold(), doc.tags.len());
    if let Some(ref binding) = doc.structure_binding {
        println!(
            "{}: {} of {} elements reference content",
            "Bound".bold(),
            binding.struct_elem_with_mcid + binding.struct_elem_with_mcr,
            binding.struct_elem_count
        );
    }
    if let Some(mode) = doc.remediation_mode {
        println!("{}: {}", "Remediation mode".bold(), mode.as_str());
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let text = doc.plain_text();
    println!("{}: {}", "Words".bold(), text.split_whitespace().count());
    println!("{}: {}", "Images".bold(), doc.images.len());
    println!("{}: {}", "Links".bold(), doc.links.len());
    println!("{}: {}", "Form fields".bold(), doc.forms.len());
    println!("{}: {}", "Bookmarks".bold(), doc.outlines.len());

    Ok(())
}

fn default_output(input: &Path, dir: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let name = format!("{}.accessible.pdf", stem);
    match dir.or_else(|| input.parent()) {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn print_outcome(outcome: &DocumentOutcome) {
    let before = displayed_score(outcome.audit.as_ref(), ScoreVariant::Original, None);
    let after = displayed_score(
        outcome.post_audit(),
        ScoreVariant::Remediated,
        outcome.verification(),
    );
    match (before, after) {
        (Some(before), Some(after)) => println!(
            "{}: {} -> {}",
            "Score".bold(),
            score_label(before),
            score_label(after)
        ),
        (Some(before), None) => println!("{}: {}", "Score".bold(), score_label(before)),
        _ => {}
    }
    if let Some(remediation) = &outcome.remediation {
        println!(
            "{}: {} ({})",
            "Iterations".bold(),
            remediation.iterations.len(),
            remediation.stop_reason
        );
    }
    if let Some(mode) = outcome.remediation_mode() {
        println!("{}: {}", "Mode".bold(), mode.as_str());
    }
    if let Some(verification) = outcome.verification() {
        println!("{}: {:?}", "Verification".bold(), verification.verdict());
    }
    if outcome.ocr.attempted || outcome.ocr.reason.is_some() {
        let status = if outcome.ocr.applied {
            "applied".to_string()
        } else {
            outcome.ocr.reason.clone().unwrap_or_else(|| "not applied".to_string())
        };
        println!("{}: {}", "Recognition".bold(), status);
    }
}

fn cmd_remediate(
    input: &Path,
    output: Option<&Path>,
    evidence: Option<&Path>,
    args: &RemediateArgs,
    service_args: &ServiceArgs,
) -> CliResult {
    let services = Services::connect(service_args)?;
    let remediator = services.remediator(args.options());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Remediating {}...", input.display()));
    let outcome = remediator.process_file(input);
    pb.finish_and_clear();

    if let Some(path) = evidence {
        let pack = build_evidence_pack(&outcome, chrono::Utc::now());
        fs::write(path, pack.to_json()?)?;
        println!("{} {}", "Evidence saved to".green(), path.display());
    }

    print_outcome(&outcome);

    match outcome.status {
        DocumentStatus::Remediated => {
            let path = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| default_output(input, None));
            if let Some(bytes) = outcome.remediated_bytes() {
                fs::write(&path, bytes)?;
                println!("{} {}", "Saved to".green(), path.display());
            }
            Ok(())
        }
        _ => Err(outcome
            .message
            .unwrap_or_else(|| "remediation failed".to_string())
            .into()),
    }
}

fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
                && !path.to_string_lossy().ends_with(".accessible.pdf")
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn cmd_batch(
    input: &Path,
    output: Option<&Path>,
    args: &RemediateArgs,
    service_args: &ServiceArgs,
) -> CliResult {
    let paths = collect_pdfs(input)?;
    if paths.is_empty() {
        println!("{}", "No PDF files found".yellow());
        return Ok(());
    }
    let output_dir = output.unwrap_or(input);
    fs::create_dir_all(output_dir)?;

    let services = Services::connect(service_args)?;
    let remediator = services.remediator(args.options());

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("Remediating...");
    let outcomes = pdf_remediate::process_paths(&remediator, &paths);
    pb.set_position(paths.len() as u64);
    pb.finish_with_message("Done!");

    println!();
    let mut failed = 0;
    for (path, outcome) in paths.iter().zip(&outcomes) {
        match (outcome.status, outcome.remediated_bytes()) {
            (DocumentStatus::Remediated, Some(bytes)) => {
                let target = default_output(path, Some(output_dir));
                fs::write(&target, bytes)?;
                let after = displayed_score(
                    outcome.post_audit(),
                    ScoreVariant::Remediated,
                    outcome.verification(),
                )
                .unwrap_or_default();
                let before = outcome.audit.as_ref().map(|a| a.score).unwrap_or_default();
                println!(
                    "  {} {} ({} -> {})",
                    "├─".dimmed(),
                    outcome.name,
                    score_label(before),
                    score_label(after)
                );
            }
            _ => {
                failed += 1;
                println!(
                    "  {} {} {}",
                    "├─".dimmed(),
                    outcome.name,
                    outcome.message.as_deref().unwrap_or("failed").red()
                );
            }
        }
    }

    println!(
        "\n{} {} remediated, {} failed",
        "Done!".green().bold(),
        outcomes.len() - failed,
        failed
    );

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "pdf-remediate".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("PDF accessibility audit and remediation tool");
    println!();
    println!("License: MIT");
}
