use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use phishhunter::classifier::{Classifier, Predictor};
use phishhunter::cli::{AnalyzeView, Cli, Commands};
use phishhunter::config::{self, AppConfig};
use phishhunter::dataset::{self, DatasetWriter, Label};
use phishhunter::dns::DnsResolver;
use phishhunter::features::FeatureExtractor;
use phishhunter::liveness::LivenessGate;
use phishhunter::logger::{HuntLogger, VerbosityLevel};
use phishhunter::pipeline::{
    decision_from_answer, verdict_line, BatchOptions, InterruptDecision, InterruptFlag, InterruptHandler, Labeler,
    Pipeline, PipelineObserver, UrlOutcome,
};
use phishhunter::whois::WhoisClient;

const BANNER: &str = "Phish Hunter v1.0.0: phishing URL classifier";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run phishhunter again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let Some(command) = &cli.command else {
        // Nothing to do: show usage and fail
        let _ = Cli::command().print_help();
        eprintln!();
        std::process::exit(1);
    };

    if let Err(e) = cli.validate() {
        eprintln!("❌ Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let app_config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if !cli.no_banner {
        eprintln!("{}", BANNER);
    }

    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match &cli.log_file {
        Some(path) => HuntLogger::with_log_file(verbosity, path.clone()),
        None => HuntLogger::new(verbosity),
    };

    let result = run(command, &cli, app_config, &logger).await;

    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            eprintln!("⚠️  Failed to write log file: {}", e);
        }
    }

    if let Err(e) = result {
        logger.error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "phishhunter=info",
        _ => "phishhunter=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, config::ConfigError> {
    match path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
}

async fn run(command: &Commands, cli: &Cli, config: AppConfig, logger: &HuntLogger) -> Result<()> {
    let resolver = Arc::new(DnsResolver::from_config(&config.dns).context("Failed to create DNS resolver")?);
    let whois = Arc::new(WhoisClient::from_config(&config.whois));
    let options = cli.extractor_options();

    match command {
        Commands::Analyze { url, array, source, .. } => {
            let extractor = FeatureExtractor::new(config, resolver, whois, options)?;
            analyze(&extractor, url, AnalyzeView::from_flags(*array, *source)).await
        }
        Commands::Hunt { url, input, append_to, model, limit } => {
            let model_path = model.clone().unwrap_or_else(|| config.classifier.model_path.clone());
            let classifier = Classifier::load(&model_path)
                .with_context(|| format!("Failed to load model {}", model_path.display()))?;
            let delay = Duration::from_millis(config.batch.request_delay_ms);
            let liveness = LivenessGate::new(resolver.clone(), whois.clone());
            let extractor = FeatureExtractor::new(config, resolver, whois, options)?;

            let writer = append_to.as_deref().map(DatasetWriter::append);
            let interrupt = InterruptFlag::new();
            let mut pipeline = Pipeline::new(&liveness, &extractor, interrupt.clone());
            if let Some(writer) = &writer {
                pipeline = pipeline.with_writer(writer);
            }

            match (url, input) {
                (Some(url), _) => hunt_single(&pipeline, &classifier, url, logger).await,
                (None, Some(input)) => {
                    install_interrupt_handler(interrupt);
                    let urls = dataset::read_reference_csv(input)?;
                    logger.info(&format!(
                        "Loaded {} phishing and {} legitimate URLs from {}",
                        urls.phish.len(),
                        urls.legitimate.len(),
                        input.display()
                    ));
                    let mut observer = HuntObserver::new(logger);
                    let summary = pipeline
                        .run_pairs(
                            &urls,
                            Some(&classifier as &dyn Predictor),
                            BatchOptions { limit: *limit, request_delay: delay },
                            &mut StdinInterruptHandler,
                            &mut observer,
                        )
                        .await?;
                    logger.print_batch_summary(&summary, append_to.as_deref());
                    Ok(())
                }
                (None, None) => anyhow::bail!("Either --url or --input is required"),
            }
        }
        Commands::BuildDataset { input, output, append, limit } => {
            let delay = Duration::from_millis(config.batch.request_delay_ms);
            let liveness = LivenessGate::new(resolver.clone(), whois.clone());
            let extractor = FeatureExtractor::new(config, resolver, whois, options)?;
            build_dataset(&liveness, &extractor, input, output, *append, *limit, delay, logger).await
        }
    }
}

async fn analyze(extractor: &FeatureExtractor, url: &str, view: AnalyzeView) -> Result<()> {
    println!("Length of URL: {} : {}", url.chars().count(), url);
    match view {
        AnalyzeView::Array => {
            let vector = extractor.extract(url).await;
            println!("{:?}", vector.to_array());
        }
        AnalyzeView::Mapping => {
            let vector = extractor.extract(url).await;
            println!("{}", serde_json::to_string_pretty(&vector.to_mapping())?);
        }
        AnalyzeView::Source => {
            println!("{}", extractor.page_source(url).await);
        }
    }
    Ok(())
}

async fn hunt_single(pipeline: &Pipeline<'_>, classifier: &dyn Predictor, url: &str, logger: &HuntLogger) -> Result<()> {
    let outcome = pipeline.process_url(url, &Labeler::Model(classifier)).await?;
    logger.result(&verdict_line(0, url, &outcome));
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn build_dataset(
    liveness: &LivenessGate,
    extractor: &FeatureExtractor,
    input: &Path,
    output: &Path,
    append: bool,
    limit: Option<usize>,
    delay: Duration,
    logger: &HuntLogger,
) -> Result<()> {
    logger.info("Loading input data for phish/legitimate website urls...");
    let urls = dataset::read_reference_csv(input)?;
    logger.info(&format!("Loading {} phishing URLs...", urls.phish.len()));
    logger.info(&format!("Loading {} legitimate URLs...", urls.legitimate.len()));

    let writer = if append {
        DatasetWriter::append(output)
    } else {
        DatasetWriter::create(output)?
    };

    let interrupt = InterruptFlag::new();
    install_interrupt_handler(interrupt.clone());
    let pipeline = Pipeline::new(liveness, extractor, interrupt).with_writer(&writer);

    let pairs = urls.pairs().count() as u64 * 2;
    logger.start_progress(limit.map(|l| (l as u64).min(pairs)).unwrap_or(pairs));

    let mut observer = BuildObserver { logger, kind: "phish" };
    let summary = pipeline
        .run_pairs(
            &urls,
            None,
            BatchOptions { limit, request_delay: delay },
            &mut StdinInterruptHandler,
            &mut observer,
        )
        .await?;

    logger.print_batch_summary(&summary, Some(output));
    if !summary.aborted {
        logger.result(&format!(
            "Phish Hunter's training data file '{}' has been written successfully.",
            output.display()
        ));
    }
    Ok(())
}

/// Ctrl-C raises the interrupt flag; a second Ctrl-C before the batch
/// loop has noticed the first one exits straight away.
fn install_interrupt_handler(flag: InterruptFlag) {
    ctrlc::set_handler(move || {
        if flag.is_raised() {
            eprintln!("\n⚠️  Second interrupt received. Exiting.");
            std::process::exit(130);
        }
        flag.raise();
        eprintln!("\n⚠️  Interrupt received. Finishing the current URL...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupts will end the run.", e);
    });
}

/// Asks on the terminal whether to skip the current URL or end the run.
struct StdinInterruptHandler;

impl InterruptHandler for StdinInterruptHandler {
    fn decide(&mut self, url: &str) -> InterruptDecision {
        eprint!("Interrupted at {}. (S)kip or (E)xit? ", url);
        let _ = io::stderr().flush();
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => decision_from_answer(&answer),
            Err(_) => InterruptDecision::Skip,
        }
    }
}

/// Prints one verdict line per classified URL, numbered from 1.
struct HuntObserver<'a> {
    logger: &'a HuntLogger,
    classified: usize,
}

impl<'a> HuntObserver<'a> {
    fn new(logger: &'a HuntLogger) -> Self {
        Self { logger, classified: 0 }
    }
}

impl PipelineObserver for HuntObserver<'_> {
    fn on_start(&mut self, url: &str, _label: Option<Label>) {
        self.logger.debug(&format!("Checking {}", url));
    }

    fn on_outcome(&mut self, _index: usize, url: &str, outcome: &UrlOutcome) {
        match outcome {
            UrlOutcome::Skipped => self.logger.log_skipped(url),
            UrlOutcome::SkippedDead(_) => self.logger.result(&verdict_line(0, url, outcome)),
            _ => {
                self.classified += 1;
                self.logger.result(&verdict_line(self.classified, url, outcome));
            }
        }
    }
}

struct BuildObserver<'a> {
    logger: &'a HuntLogger,
    kind: &'static str,
}

impl PipelineObserver for BuildObserver<'_> {
    fn on_start(&mut self, url: &str, label: Option<Label>) {
        self.kind = match label {
            Some(Label::Phish) => "Phish",
            _ => "Legitimate",
        };
        self.logger.log_processing(&self.kind.to_lowercase(), url);
    }

    fn on_outcome(&mut self, _index: usize, url: &str, outcome: &UrlOutcome) {
        match outcome {
            UrlOutcome::SkippedDead(liveness) => {
                self.logger.log_offline(self.kind, url, liveness.dns.label());
            }
            UrlOutcome::Skipped => self.logger.log_skipped(url),
            UrlOutcome::Persisted { .. } => self.logger.advance_progress(),
            UrlOutcome::Classified { .. } => {}
        }
    }
}
