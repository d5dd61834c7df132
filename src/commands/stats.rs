use anyhow::Result;
use log::info;

use crate::cli::StatsArgs;
use crate::common::setup_logging;
use crate::store::{CorpusStats, GroupStats, Store};

fn log_group_table(title: &str, groups: &[GroupStats]) {
    info!("");
    info!("{}", title);
    info!(
        "  {:<40} {:>8} {:>7} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "", "Papers", "Score", "Pct", "COI", "Fund", "Reg", "Data", "Code"
    );
    for group in groups {
        info!(
            "  {:<40} {:>8} {:>7.2} {:>6.1}% {:>5.1}% {:>5.1}% {:>5.1}% {:>5.1}% {:>5.1}%",
            group.label,
            group.papers,
            group.avg_score,
            group.avg_percentage,
            group.coi_pct,
            group.funding_pct,
            group.registration_pct,
            group.open_data_pct,
            group.open_code_pct
        );
    }
}

pub fn run_stats(args: StatsArgs) -> Result<CorpusStats> {
    setup_logging(&args.log_level)?;

    let store = Store::open(&args.database)?;
    let corpus = store.corpus_stats()?;
    let categories = store.category_stats()?;

    info!("==================== TRANSPARENCY STATISTICS ====================");
    info!("Database: {}", args.database);
    info!("Papers: {}", corpus.papers);
    info!(
        "  Linked to a journal: {} ({:.1}%)",
        corpus.linked_papers,
        corpus.link_rate()
    );
    info!("Journals: {}", corpus.journals);
    info!("Average transparency: {:.1}%", corpus.avg_percentage);

    log_group_table("By broad subject category:", &categories);

    if args.by_year {
        let years = store.year_stats()?;
        log_group_table("By publication year:", &years);
    }
    info!("=================================================================");

    Ok(corpus)
}
