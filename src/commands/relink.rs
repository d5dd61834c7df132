use anyhow::Result;
use log::{info, warn};
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::cli::RelinkArgs;
use crate::common::{
    create_relink_progress, format_elapsed, install_signal_handlers, percent, setup_logging,
    shutdown_flag, RelinkStats,
};
use crate::directory::{JournalDirectory, LinkerConfig};
use crate::normalize::split_issns;
use crate::store::{LinkUpdate, Store};

/// Recompute journal links for stored papers, one page per transaction
pub fn relink_papers(
    store: &mut Store,
    directory: &JournalDirectory,
    linker: &LinkerConfig,
    page_size: usize,
    only_unlinked: bool,
    mut on_page: impl FnMut(&RelinkStats),
) -> Result<RelinkStats> {
    let mut stats = RelinkStats::default();
    let mut after_id = 0;

    loop {
        let page = store.link_candidates(after_id, page_size, only_unlinked)?;
        let Some(last) = page.last() else {
            break;
        };
        after_id = last.id;

        let mut updates = Vec::new();
        for paper in &page {
            stats.papers_scanned += 1;
            let stored_issns = paper.journal_issns.as_deref().or(paper.journal_issn.as_deref());
            let issns = split_issns(stored_issns);
            let link = directory.link(&issns, paper.journal_title.as_deref(), linker);
            let journal_id = link.map(|m| m.entry.id);
            if link.is_some() {
                stats.matched += 1;
            } else {
                stats.unmatched += 1;
            }
            if journal_id != paper.journal_id {
                updates.push(LinkUpdate {
                    id: paper.id,
                    journal_id,
                    category: link.and_then(|m| m.entry.primary_subject().map(String::from)),
                });
            }
        }

        stats.changed += store.apply_links(&updates)?;
        on_page(&stats);

        if shutdown_flag().load(Ordering::SeqCst) {
            warn!("Stop requested; relinking ended after {} papers", stats.papers_scanned);
            break;
        }
    }

    Ok(stats)
}

pub fn run_relink(args: RelinkArgs) -> Result<RelinkStats> {
    let start_time = Instant::now();

    setup_logging(&args.log_level)?;
    install_signal_handlers()?;

    info!("Starting journal relinking");
    info!("Database: {}", args.database);

    let mut store = Store::open(&args.database)?;
    let directory = JournalDirectory::from_entries(store.load_journals()?);
    info!("Journal directory: {} journals", directory.len());

    let total = store.count_link_candidates(args.only_unlinked)?;
    info!(
        "Papers to check: {}{}",
        total,
        if args.only_unlinked { " (unlinked only)" } else { "" }
    );

    let linker = LinkerConfig {
        partial_titles: args.partial_titles,
        min_partial_ratio: args.min_title_ratio,
    };
    let pb = create_relink_progress(total);
    let stats = relink_papers(
        &mut store,
        &directory,
        &linker,
        args.batch_size,
        args.only_unlinked,
        |stats| {
            pb.set_position(stats.papers_scanned as u64);
            pb.set_message(format!("{} changed", stats.changed));
        },
    )?;
    pb.finish_and_clear();

    info!("");
    info!("==================== RELINK SUMMARY ====================");
    info!("Total execution time: {}", format_elapsed(start_time.elapsed()));
    info!("Papers scanned: {}", stats.papers_scanned);
    info!(
        "  Matched: {} ({:.1}%)",
        stats.matched,
        percent(stats.matched, stats.papers_scanned)
    );
    info!("  Unmatched: {}", stats.unmatched);
    info!("  Links changed: {}", stats.changed);
    info!("========================================================");

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::JournalEntry;
    use crate::store::papers::tests::paper;
    use crate::store::WriteMode;

    #[test]
    fn test_relink_links_papers_loaded_before_directory() {
        let mut store = Store::open_in_memory().unwrap();
        let rows: Vec<_> = (1..=3).map(|i| paper(&format!("PMID{}", i), "T")).collect();
        store.write_papers(&rows, WriteMode::CreateOnly).unwrap();

        store
            .upsert_journals(&[JournalEntry {
                journal_key: "nlm:1".into(),
                title_full: Some("Journal of Dental Research".into()),
                issn_print: Some("0022-0345".into()),
                subject_terms: vec!["Dentistry".into()],
                ..Default::default()
            }])
            .unwrap();
        let directory = JournalDirectory::from_entries(store.load_journals().unwrap());

        let mut pages = 0;
        let stats = relink_papers(
            &mut store,
            &directory,
            &LinkerConfig::default(),
            2,
            false,
            |_| pages += 1,
        )
        .unwrap();

        assert_eq!(pages, 2);
        assert_eq!(stats.papers_scanned, 3);
        assert_eq!(stats.matched, 3);
        assert_eq!(stats.changed, 3);
        let stored = store.get_paper("PMID2").unwrap().unwrap();
        assert_eq!(stored.broad_subject_category.as_deref(), Some("Dentistry"));

        // a second pass finds nothing to change
        let again = relink_papers(&mut store, &directory, &LinkerConfig::default(), 2, true, |_| {})
            .unwrap();
        assert_eq!(again.papers_scanned, 0);
        assert_eq!(again.changed, 0);
    }

    #[test]
    fn test_relink_keeps_link_made_through_second_issn() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .upsert_journals(&[JournalEntry {
                journal_key: "issn:1111-2222".into(),
                title_full: Some("Known Journal".into()),
                issn_print: Some("1111-2222".into()),
                subject_terms: vec!["Dentistry".into()],
                ..Default::default()
            }])
            .unwrap();
        let directory = JournalDirectory::from_entries(store.load_journals().unwrap());

        let mut row = paper("PMID1", "T");
        row.record.journal_title = Some("Unknown Title".into());
        row.record.journal_issn = Some("9999-9999".into());
        row.record.issns = split_issns(Some("9999-9999; 1111-2222"));
        let linked = directory
            .link(&row.record.issns, row.record.journal_title.as_deref(), &LinkerConfig::default())
            .unwrap();
        row.journal_id = Some(linked.entry.id);
        row.category = Some("Dentistry".into());
        store.write_papers(&[row], WriteMode::CreateOnly).unwrap();

        let stats = relink_papers(&mut store, &directory, &LinkerConfig::default(), 10, false, |_| {})
            .unwrap();

        assert_eq!(stats.matched, 1);
        assert_eq!(stats.unmatched, 0);
        assert_eq!(stats.changed, 0);
        let stored = store.get_paper("PMID1").unwrap().unwrap();
        assert_eq!(stored.journal_id, Some(linked.entry.id));
        assert_eq!(stored.broad_subject_category.as_deref(), Some("Dentistry"));
    }
}
