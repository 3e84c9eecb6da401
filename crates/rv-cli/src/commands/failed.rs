use anyhow::{bail, Result};
use rv_web::views::{self, FailQueueAction, PageParams};
use rv_web::AppState;

use crate::cli::FailedCommands;
use crate::commands::{print_page_footer, print_runs};

pub async fn handle(cmd: FailedCommands, state: &AppState) -> Result<()> {
    match cmd {
        FailedCommands::List { page, per_page } => {
            let failed = views::fail_queue(state, &PageParams { page, per_page }).await?;
            if failed.is_empty() {
                println!("No failed runs.");
                return Ok(());
            }
            print_runs(&failed.records);
            print_page_footer(&failed.pagination);
        }
        FailedCommands::Hide {
            instrument,
            run_number,
            version,
        } => {
            let action = FailQueueAction {
                action: "hide".to_string(),
                selected_runs: vec![(instrument.clone(), run_number, version)],
            };
            let outcome = views::fail_queue_action(state, &action).await?;
            if let Some(message) = outcome.message {
                bail!(message);
            }
            println!("✓ Hid {} run {} version {}", instrument, run_number, version);
        }
    }

    Ok(())
}
