mod args;
mod io;
mod output;
mod pipeline;
mod util;

use args::{AlignArgs, Cli, SubCommands, ValidateArgs};
use io::read_profiles;
use pipeline::{align_all, PairPlan};
use util::{init_logging, set_threads, PathBufExt};

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use log::info;

fn align(args: &AlignArgs) -> anyhow::Result<()> {
    let queries = read_profiles(&args.query_path)?;
    let templates = read_profiles(&args.template_path)?;
    let config = args.hhpair_args.config(templates.len())?;
    let plan = PairPlan::from(&args.hhpair_args);

    let results = align_all(&queries, &templates, &config, &plan);

    let output_args = &args.output_args;
    let allow_overwrite = args.common_args.allow_overwrite;

    let mut table = output_args.tbl_results_path.open(allow_overwrite)?;
    let rows = output::write_table(
        &mut table,
        &results,
        &queries,
        &templates,
        output_args.e_value_threshold,
    )?;
    table.flush().context("failed to write tabular output")?;
    info!(
        "{rows} alignments written to {}",
        output_args.tbl_results_path.to_string_lossy()
    );

    if let Some(path) = &output_args.ali_results_path {
        let mut out = path.open(allow_overwrite)?;
        output::write_alignments(
            &mut out,
            &results,
            &queries,
            &templates,
            output_args.e_value_threshold,
        )?;
        out.flush().context("failed to write alignment output")?;
    }

    if let Some(path) = &output_args.json_results_path {
        let mut out = path.open(allow_overwrite)?;
        output::write_json(
            &mut out,
            &results,
            &queries,
            &templates,
            output_args.e_value_threshold,
        )?;
        out.flush().context("failed to write JSON output")?;
    }

    Ok(())
}

fn validate(args: &ValidateArgs) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for path in &args.paths {
        for profile in read_profiles(path)? {
            writeln!(
                out,
                "{}\t{}\tcolumns={}\talphabet={}\tdssp={}\tpredicted={}",
                path.to_string_lossy(),
                profile.name,
                profile.length,
                profile.alphabet_size,
                profile.has_observed_ss(),
                profile.has_predicted_ss(),
            )?;
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        SubCommands::Align(args) => {
            set_threads(args.common_args.num_threads)?;
            align(&args)?;
        }
        SubCommands::Validate(args) => {
            validate(&args)?;
        }
    }
    Ok(())
}
