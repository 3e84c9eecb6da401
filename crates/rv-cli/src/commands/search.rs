use anyhow::Result;
use rv_web::views::{self, PageParams, SearchParams};
use rv_web::AppState;

use crate::cli::SearchArgs;
use crate::commands::{print_page_footer, print_runs};

pub async fn handle(args: SearchArgs, state: &AppState) -> Result<()> {
    let params = match args.experiment {
        Some(reference) => SearchParams {
            experiment_reference: Some(reference),
            page: PageParams {
                page: args.page,
                per_page: args.per_page,
            },
            ..Default::default()
        },
        None => SearchParams {
            // An empty run query matches every run
            run_number: Some(args.run_number.unwrap_or_default()),
            instrument: args.instrument,
            run_description: args.description,
            run_description_qualifier: Some(
                if args.exact { "exact" } else { "contains" }.to_string(),
            ),
            created_after: args.from,
            created_before: args.to,
            status: args.status,
            experiment_reference: None,
            page: PageParams {
                page: args.page,
                per_page: args.per_page,
            },
        },
    };

    let context = views::search(state, &params).await?;

    if let Some(runs) = &context.runs {
        if runs.is_empty() {
            println!("{}", context.run_message);
        } else {
            print_runs(&runs.records);
            print_page_footer(&runs.pagination);
        }
    }

    if let Some(experiments) = &context.experiments {
        if experiments.is_empty() {
            println!("{}", context.experiment_message);
        } else {
            println!("Experiments:");
            for experiment in &experiments.records {
                println!("  RB{}", experiment.reference_number);
            }
            print_page_footer(&experiments.pagination);
        }
    }

    Ok(())
}
