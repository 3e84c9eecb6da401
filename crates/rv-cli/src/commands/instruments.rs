use anyhow::Result;
use rv_core::ReductionArguments;
use rv_web::AppState;
use rv_web::variables::{self, DeleteVariables, VariablesByRun};
use rv_web::views;

use crate::cli::InstrumentCommands;

pub async fn handle(cmd: InstrumentCommands, state: &AppState) -> Result<()> {
    match cmd {
        InstrumentCommands::List => {
            let instruments = views::instruments(state).await?;
            if instruments.is_empty() {
                println!("No instruments found.");
                return Ok(());
            }

            println!("Instruments:");
            for instrument in instruments {
                let mut flags = vec![if instrument.is_active { "active" } else { "inactive" }];
                if instrument.is_paused {
                    flags.push("paused");
                }
                println!("  {:<12} {}", instrument.name, flags.join(", "));
            }
        }
        InstrumentCommands::Sync => {
            let report = views::sync_instruments(state).await?;
            let changed: Vec<_> = report.iter().filter(|activity| activity.changed).collect();
            if changed.is_empty() {
                println!("✓ All {} instruments up to date", report.len());
            }
            for activity in changed {
                println!(
                    "✓ {} is now {}",
                    activity.name,
                    if activity.is_active { "active" } else { "inactive" }
                );
            }
        }
        InstrumentCommands::Pause { name } => {
            let instrument = views::set_instrument_paused(state, &name, true).await?;
            println!("✓ Paused {}", instrument.name);
        }
        InstrumentCommands::Resume { name } => {
            let instrument = views::set_instrument_paused(state, &name, false).await?;
            println!("✓ Resumed {}", instrument.name);
        }
        InstrumentCommands::Variables { name } => {
            let summary = variables::variables_summary(state, &name).await?;
            match &summary.current_variables {
                Some(current) => {
                    println!("Current variables ({}):", run_span(current));
                    print_arguments(&current.arguments);
                }
                None => println!("No current variables."),
            }
            for upcoming in &summary.upcoming_arguments_by_run {
                println!("\nUpcoming ({}):", run_span(upcoming));
                print_arguments(&upcoming.arguments);
            }
            for upcoming in &summary.upcoming_arguments_by_experiment {
                println!("\nUpcoming for RB{}:", upcoming.experiment);
                print_arguments(&upcoming.arguments);
            }
        }
        InstrumentCommands::Defaults { name } => {
            let defaults = variables::default_variables(state, &name).await?;
            if let Some(message) = &defaults.message {
                println!("{}", message);
                return Ok(());
            }
            println!("Default variables for {}:", defaults.instrument);
            for (variable, value) in defaults
                .standard_variables
                .iter()
                .chain(defaults.advanced_variables.iter())
            {
                println!("  {} = {}", variable, value);
            }
        }
        InstrumentCommands::DeleteVariables {
            name,
            start,
            end,
            experiment,
        } => {
            let request = DeleteVariables {
                start,
                end,
                experiment_reference: experiment,
            };
            let outcome = variables::delete_variables(state, &name, &request).await?;
            println!("✓ Deleted {} variable sets from {}", outcome.deleted, outcome.instrument);
        }
    }

    Ok(())
}

fn run_span(variables: &VariablesByRun) -> String {
    if variables.run_end == 0 {
        format!("runs {} onwards", variables.run_start)
    } else {
        format!("runs {}-{}", variables.run_start, variables.run_end)
    }
}

fn print_arguments(arguments: &ReductionArguments) {
    for (name, value) in arguments.standard_vars.iter().chain(arguments.advanced_vars.iter()) {
        println!("  {} = {}", name, value);
    }
}
