// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `train`   — fine-tunes T5 or GPT-2 on a CSV dataset
//   2. `predict` — runs the fine-tuned model on one input
//   3. `serve`   — starts the HTTP API + demo page
//   4. `upload`  — publishes trained models to the hub

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, ServeArgs, TrainArgs, UploadArgs};

use crate::domain::traits::GenerationParams;

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "summarize-ai",
    version,
    about = "Fine-tune and serve a T5 summarizer and a GPT-2 summary-to-text generator."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::Serve(args)   => run_serve(args),
            Commands::Upload(args)  => run_upload(args),
        }
    }
}

/// Handles the `train` subcommand.
fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.to_config()?;
    tracing::info!(
        "Fine-tuning {} on '{}'",
        config.model.model_name,
        config.data.data_path.display()
    );

    let summary = TrainUseCase::new(config).execute()?;
    println!(
        "Training complete: {} train / {} validation examples, {} steps. Model saved to '{}'.",
        summary.train_examples, summary.eval_examples, summary.global_step, summary.model_dir
    );
    Ok(())
}

/// Handles the `predict` subcommand.
fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let config   = args.to_config()?;
    let params   = GenerationParams::from(&args);
    let use_case = PredictUseCase::new(&config)?;
    let out      = use_case.execute(&args.text, &params)?;

    println!("\n{}", out.text);
    println!("\n({} words → {} words)", out.input_length, out.output_length);
    Ok(())
}

/// Handles the `serve` subcommand.
/// The model load is best effort: the server starts either way.
fn run_serve(args: ServeArgs) -> Result<()> {
    use crate::api::{start_server, ServiceContext};
    use crate::application::predict_use_case::load_generator;

    let config    = args.to_config()?;
    let generator = load_generator(&config);
    let ctx       = ServiceContext::new(&config, generator);

    actix_web::rt::System::new().block_on(start_server(ctx, config.server_address()))?;
    Ok(())
}

/// Handles the `upload` subcommand.
fn run_upload(args: UploadArgs) -> Result<()> {
    use crate::application::upload_use_case::{UploadTarget, UploadUseCase};
    use crate::infra::hub::HubClient;

    let targets: Vec<UploadTarget> = args.to_configs()?.iter().map(UploadTarget::from).collect();
    let hub      = HubClient::from_env()?;
    let uploaded = UploadUseCase::new(targets).execute(&hub)?;

    println!("\nUploaded {uploaded} model(s).");
    Ok(())
}
