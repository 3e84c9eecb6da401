use anyhow::Result;
use rv_web::views::{self, ListParams, PageParams, RunsListContext, SummaryParams};
use rv_web::AppState;

use crate::cli::RunsCommands;
use crate::commands::{format_time, print_page_footer, print_runs};

pub async fn handle(cmd: RunsCommands, state: &AppState) -> Result<()> {
    match cmd {
        RunsCommands::List {
            instrument,
            sort,
            filter,
            page,
            per_page,
        } => {
            let params = ListParams {
                filter: Some(filter),
                sort: Some(sort),
                page: PageParams { page, per_page },
            };
            let context = views::runs_list(state, &instrument, &params).await?;
            print_list(&context);
        }
        RunsCommands::Show {
            instrument,
            run_number,
            version,
            windows,
        } => {
            let params = SummaryParams {
                path_type: windows.then(|| "windows".to_string()),
                sort: None,
            };
            let summary =
                views::run_summary(state, &instrument, run_number, version, &params).await?;
            let run = &summary.run;

            println!(
                "Run {} (version {}) on {}",
                summary.runs, summary.run_version, run.instrument
            );
            println!("  Status: {}", run.status.label());
            println!("  Experiment: RB{}", run.experiment_reference);
            if let Some(started_by) = &summary.started_by {
                println!("  Started by: {}", started_by);
            }
            println!("  Created: {}", format_time(run.created));
            println!("  Last updated: {}", format_time(run.last_updated));
            if !run.run_description.is_empty() {
                println!("  Description: {}", run.run_description);
            }
            if let Some(message) = &run.message {
                println!("  Message: {}", message);
            }
            if !summary.data_location.is_empty() {
                println!("  Data: {}", summary.data_location);
            }
            if !summary.reduction_location.is_empty() {
                println!("  Reduced data: {}", summary.reduction_location);
                println!("  Data analysis: {}", summary.data_analysis_link_url);
            }

            if !summary.arguments.standard_vars.is_empty() {
                println!("\n  Standard variables:");
                for (name, value) in &summary.arguments.standard_vars {
                    println!("    {} = {} (default {})", name, value.current, value.default);
                }
            }
            if !summary.arguments.advanced_vars.is_empty() {
                println!("\n  Advanced variables:");
                for (name, value) in &summary.arguments.advanced_vars {
                    println!("    {} = {} (default {})", name, value.current, value.default);
                }
            }

            if summary.is_rerun {
                let versions: Vec<String> = summary
                    .history
                    .iter()
                    .map(|row| format!("{} ({})", row.run.run_version, row.run.status.label()))
                    .collect();
                println!("\n  Versions: {}", versions.join(", "));
            }

            let navigation = &summary.navigation;
            let previous = navigation.previous.as_ref().map(|target| target.link.as_str());
            let next = navigation.next.as_ref().map(|target| target.link.as_str());
            println!(
                "\n  Previous: {}  Next: {}",
                previous.unwrap_or("-"),
                next.unwrap_or("-")
            );
        }
    }

    Ok(())
}

fn print_list(context: &RunsListContext) {
    let instrument = &context.instrument;
    let state = match (instrument.is_active, instrument.is_paused) {
        (_, true) => "paused",
        (true, false) => "active",
        (false, false) => "inactive",
    };
    println!(
        "{} ({})  queued: {}  processing: {}",
        instrument.name, state, context.queued, context.processing
    );
    if !context.error_reason.is_empty() {
        println!("  {}", context.error_reason);
    }

    if let Some(message) = &context.message {
        println!("{}", message);
        return;
    }

    if let Some(runs) = &context.runs {
        println!();
        print_runs(&runs.records);
        print_page_footer(&runs.pagination);
    }

    if let Some(experiments) = &context.experiments {
        for experiment in experiments {
            println!("\nRB{}", experiment.reference_number);
            print_runs(&experiment.runs);
        }
    }
}
