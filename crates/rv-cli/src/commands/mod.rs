pub mod config;
pub mod failed;
pub mod instruments;
pub mod runs;
pub mod search;
pub mod serve;

use rv_core::PageResult;
use rv_web::views::RunRow;
use time::macros::format_description;
use time::OffsetDateTime;

pub fn format_time(value: OffsetDateTime) -> String {
    value
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| value.to_string())
}

/// Print runs as an aligned table
pub fn print_runs(rows: &[RunRow]) {
    println!(
        "  {:<24} {:<8} {:<11} {:<19} {}",
        "Run", "Version", "Status", "Last updated", "Description"
    );
    for row in rows {
        println!(
            "  {:<24} {:<8} {:<11} {:<19} {}",
            row.run_numbers,
            row.run.run_version,
            row.run.status.label(),
            format_time(row.run.last_updated),
            row.run.run_description
        );
    }
}

pub fn print_page_footer(pagination: &PageResult) {
    if pagination.last_page <= 1 {
        return;
    }
    let pages: Vec<String> = pagination
        .page_list
        .iter()
        .map(|page| {
            if *page == pagination.current_page {
                format!("[{}]", page)
            } else {
                page.to_string()
            }
        })
        .collect();
    println!(
        "\nPage {} of {} ({} total): {}",
        pagination.current_page,
        pagination.last_page,
        pagination.total_items,
        pages.join(" ")
    );
}
