use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, ValueHint};
use log::LevelFilter;

use churn_core::io::tables::parse_timestamp;
use churn_core::pipeline::{run, PipelineConfig, PipelineOutput};
use churn_core::scorer::Population;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Info)
        .parse_env(env_logger::Env::default().filter_or("CHURN_LOG", "info"))
        .init();

    let matches = Command::new("churn")
        .version(clap::crate_version!())
        .about("Churn-risk prediction for gym membership data")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("train")
                .about("Train a churn model from the member and visit tables")
                .args(table_args())
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .required(true)
                        .help("Where to write the trained model artifact")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("score")
                .about("Score members by churn risk, training first if no usable model is stored")
                .args(table_args())
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .help("Model artifact to reuse (retrained and rewritten when unusable)")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Write all scores as CSV to this path")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("top")
                        .long("top")
                        .help("How many of the riskiest members to print")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    Arg::new("all")
                        .long("all")
                        .help("Score every member, not just active ones")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("train", sub)) => train_command(sub),
        Some(("score", sub)) => score_command(sub),
        _ => unreachable!("subcommand is required"),
    }
}

fn table_args() -> Vec<Arg> {
    vec![
        Arg::new("members")
            .long("members")
            .required(true)
            .help("Path to the member table CSV")
            .value_parser(clap::value_parser!(PathBuf))
            .value_hint(ValueHint::FilePath),
        Arg::new("visits")
            .long("visits")
            .required(true)
            .help("Path to the visit table CSV")
            .value_parser(clap::value_parser!(PathBuf))
            .value_hint(ValueHint::FilePath),
        Arg::new("reference")
            .long("reference")
            .help("As-of date for labeling and features (YYYY-MM-DD or ISO-8601; default: now)")
            .value_parser(clap::builder::NonEmptyStringValueParser::new()),
    ]
}

fn base_config(matches: &ArgMatches) -> Result<PipelineConfig> {
    let members = matches
        .get_one::<PathBuf>("members")
        .expect("members is required")
        .clone();
    let visits = matches
        .get_one::<PathBuf>("visits")
        .expect("visits is required")
        .clone();
    let mut config = PipelineConfig::new(members, visits);
    if let Some(raw) = matches.get_one::<String>("reference") {
        config.reference_date = Some(
            parse_timestamp(raw).ok_or_else(|| anyhow!("unparsable reference date '{raw}'"))?,
        );
    }
    Ok(config)
}

fn train_command(matches: &ArgMatches) -> Result<()> {
    let mut config = base_config(matches)?;
    config.model_path = matches.get_one::<PathBuf>("model").cloned();
    config.force_retrain = true;

    let output = run(&config)?;
    report_model(&output);
    Ok(())
}

fn score_command(matches: &ArgMatches) -> Result<()> {
    let mut config = base_config(matches)?;
    config.model_path = matches.get_one::<PathBuf>("model").cloned();
    if matches.get_flag("all") {
        config.population = Population::All;
    }

    let output = run(&config)?;
    report_model(&output);

    if let Some(path) = matches.get_one::<PathBuf>("output") {
        write_scores_csv(&output, path)?;
        log::info!("wrote {} scores to {}", output.scores.len(), path.display());
    }

    let top = *matches.get_one::<usize>("top").expect("has default");
    println!("member_id  probability  tier");
    for score in output.scores.iter().take(top) {
        println!(
            "{:>9}  {:>11.4}  {}",
            score.member_id,
            score.probability,
            score.tier.as_str()
        );
    }
    Ok(())
}

fn report_model(output: &PipelineOutput) {
    if output.retrained {
        log::info!("model trained at {}", output.trained_at);
    } else {
        log::info!("reused model trained at {}", output.trained_at);
    }
    if output.degenerate {
        log::warn!("training data contained a single label class; scores are not informative");
    }
    let m = &output.metrics;
    log::info!(
        "evaluation: accuracy {:.3}, precision {:.3}, recall {:.3}, F1 {:.3}",
        m.accuracy,
        m.precision,
        m.recall,
        m.f1
    );
    for (name, weight) in output.importance.iter().take(5) {
        log::info!("feature importance: {name} = {weight:.4}");
    }
    let skipped = output.member_ingestion.rows_skipped + output.visit_ingestion.rows_skipped;
    if skipped > 0 {
        log::warn!("{skipped} input rows were skipped during ingestion");
    }
}

fn write_scores_csv(output: &PipelineOutput, path: &PathBuf) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create score output {}", path.display()))?;
    writer.write_record(["USER_ID", "CHURN_PROBABILITY", "RISK_TIER"])?;
    for score in &output.scores {
        writer.write_record([
            score.member_id.to_string(),
            format!("{:.6}", score.probability),
            score.tier.as_str().to_string(),
        ])?;
    }
    writer.flush().context("failed to flush score output")?;
    Ok(())
}
