//! Linking a paper's journal ISSN/title to a directory entry.
//!
//! Strategies are tried in fixed order and the first that produces a
//! candidate wins: electronic ISSN, print ISSN, linking ISSN, exact full
//! title, exact abbreviated title, and finally (when enabled) a partial
//! title match where either title contains the other.

use super::{IssnKind, JournalDirectory, JournalEntry, TitleKind};
use crate::normalize::normalize_title;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which strategy produced a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ElectronicIssn,
    PrintIssn,
    LinkingIssn,
    FullTitle,
    AbbreviatedTitle,
    PartialTitle,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::ElectronicIssn => "electronic_issn",
            MatchMethod::PrintIssn => "print_issn",
            MatchMethod::LinkingIssn => "linking_issn",
            MatchMethod::FullTitle => "full_title",
            MatchMethod::AbbreviatedTitle => "abbreviated_title",
            MatchMethod::PartialTitle => "partial_title",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JournalMatch<'d> {
    pub entry: &'d JournalEntry,
    pub method: MatchMethod,
}

#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// Allow the substring title fallback
    pub partial_titles: bool,
    /// When set, the partial fallback picks the candidate whose title length
    /// is closest to the query's, requiring at least this shorter/longer
    /// ratio; when unset the first containing title in directory order wins
    pub min_partial_ratio: Option<f64>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            partial_titles: true,
            min_partial_ratio: None,
        }
    }
}

fn length_ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (a.chars().count(), b.chars().count());
    let (shorter, longer) = if a <= b { (a, b) } else { (b, a) };
    if longer == 0 {
        0.0
    } else {
        shorter as f64 / longer as f64
    }
}

impl JournalDirectory {
    /// Resolve a paper's journal. `issns` must already be normalised
    /// (see [`crate::normalize::split_issns`]); `title` is the raw journal title.
    pub fn link(
        &self,
        issns: &[String],
        title: Option<&str>,
        config: &LinkerConfig,
    ) -> Option<JournalMatch<'_>> {
        self.link_by_issn(issns)
            .or_else(|| {
                let title = title.map(normalize_title).filter(|t| !t.is_empty())?;
                self.link_by_title(&title)
                    .or_else(|| self.link_by_partial_title(&title, config))
            })
    }

    fn link_by_issn(&self, issns: &[String]) -> Option<JournalMatch<'_>> {
        for (kind, method) in [
            (IssnKind::Electronic, MatchMethod::ElectronicIssn),
            (IssnKind::Print, MatchMethod::PrintIssn),
            (IssnKind::Linking, MatchMethod::LinkingIssn),
        ] {
            for issn in issns {
                let Some(candidates) = self.by_issn.get(issn) else {
                    continue;
                };
                if let Some((_, idx)) = candidates.iter().find(|(k, _)| *k == kind) {
                    return Some(JournalMatch {
                        entry: &self.entries[*idx],
                        method,
                    });
                }
            }
        }
        None
    }

    fn link_by_title(&self, title: &str) -> Option<JournalMatch<'_>> {
        let candidates = self.by_title.get(title)?;
        [
            (TitleKind::Full, MatchMethod::FullTitle),
            (TitleKind::Abbreviated, MatchMethod::AbbreviatedTitle),
        ]
        .into_iter()
        .find_map(|(kind, method)| {
            candidates
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, idx)| JournalMatch {
                    entry: &self.entries[*idx],
                    method,
                })
        })
    }

    fn link_by_partial_title(&self, title: &str, config: &LinkerConfig) -> Option<JournalMatch<'_>> {
        if !config.partial_titles {
            return None;
        }

        let mut containing = self
            .full_titles
            .iter()
            .enumerate()
            .filter_map(|(idx, full)| full.as_deref().map(|full| (idx, full)))
            .filter(|(_, full)| full.contains(title) || title.contains(full));

        let idx = match config.min_partial_ratio {
            None => containing.next().map(|(idx, _)| idx),
            Some(min_ratio) => {
                let mut best: Option<(usize, f64)> = None;
                for (idx, full) in containing {
                    let ratio = length_ratio(title, full);
                    if ratio < min_ratio {
                        continue;
                    }
                    if best.map_or(true, |(_, best_ratio)| ratio > best_ratio) {
                        best = Some((idx, ratio));
                    }
                }
                best.map(|(idx, _)| idx)
            }
        }?;

        Some(JournalMatch {
            entry: &self.entries[idx],
            method: MatchMethod::PartialTitle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::tests::entry;

    fn directory() -> JournalDirectory {
        let mut dental = entry(1, "Journal of Dental Research", Some("0022-0345"), &["Dentistry"]);
        dental.issn_electronic = Some("1544-0591".into());
        dental.title_abbreviation = Some("J Dent Res".into());

        let mut linking_only = entry(2, "Oral Diseases", None, &["Dentistry", "Medicine"]);
        linking_only.issn_linking = Some("1354-523X".into());

        // shares its print ISSN with entry 1's electronic ISSN
        let clash = entry(3, "Clash Journal", Some("1544-0591"), &["Other"]);

        let long = entry(4, "International Journal of Dental Research Methods", None, &[]);

        JournalDirectory::from_entries(vec![dental, linking_only, clash, long])
    }

    fn issns(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_electronic_issn_beats_print_issn() {
        let d = directory();
        let m = d.link(&issns(&["1544-0591"]), None, &LinkerConfig::default()).unwrap();
        assert_eq!(m.entry.id, 1);
        assert_eq!(m.method, MatchMethod::ElectronicIssn);
    }

    #[test]
    fn test_print_and_linking_issn() {
        let d = directory();
        let m = d.link(&issns(&["0022-0345"]), None, &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (1, MatchMethod::PrintIssn));

        let m = d.link(&issns(&["1354-523X"]), None, &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (2, MatchMethod::LinkingIssn));
    }

    #[test]
    fn test_issn_match_ignores_case_and_whitespace() {
        let d = JournalDirectory::from_entries(vec![entry(9, "X Journal", Some(" 1234-567x "), &[])]);
        let query = crate::normalize::split_issns(Some("  1234-567X"));
        let m = d.link(&query, None, &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (9, MatchMethod::PrintIssn));
    }

    #[test]
    fn test_issn_takes_priority_over_title() {
        let d = directory();
        let m = d
            .link(&issns(&["1354-523X"]), Some("Journal of Dental Research"), &LinkerConfig::default())
            .unwrap();
        assert_eq!(m.entry.id, 2);
    }

    #[test]
    fn test_title_matches_are_case_insensitive() {
        let d = directory();
        let m = d.link(&[], Some("JOURNAL OF DENTAL  RESEARCH"), &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (1, MatchMethod::FullTitle));

        let m = d.link(&[], Some("j dent res"), &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (1, MatchMethod::AbbreviatedTitle));
    }

    #[test]
    fn test_unknown_issn_falls_through_to_title() {
        let d = directory();
        let m = d
            .link(&issns(&["9999-9999"]), Some("Oral Diseases"), &LinkerConfig::default())
            .unwrap();
        assert_eq!((m.entry.id, m.method), (2, MatchMethod::FullTitle));
    }

    #[test]
    fn test_partial_title_first_match_wins() {
        let d = directory();
        let m = d.link(&[], Some("Dental Research"), &LinkerConfig::default()).unwrap();
        assert_eq!((m.entry.id, m.method), (1, MatchMethod::PartialTitle));

        // query contains the directory title
        let m = d.link(&[], Some("Oral Diseases (Online)"), &LinkerConfig::default()).unwrap();
        assert_eq!(m.entry.id, 2);
    }

    #[test]
    fn test_partial_title_best_ratio() {
        let d = directory();
        let config = LinkerConfig {
            partial_titles: true,
            min_partial_ratio: Some(0.5),
        };
        let m = d.link(&[], Some("of Dental Research Methods"), &config).unwrap();
        assert_eq!(m.entry.id, 4);

        let strict = LinkerConfig {
            partial_titles: true,
            min_partial_ratio: Some(0.95),
        };
        assert!(d.link(&[], Some("Dental Research"), &strict).is_none());
    }

    #[test]
    fn test_partial_titles_disabled() {
        let d = directory();
        let config = LinkerConfig {
            partial_titles: false,
            min_partial_ratio: None,
        };
        assert!(d.link(&[], Some("Dental Research"), &config).is_none());
    }

    #[test]
    fn test_no_inputs_no_match() {
        let d = directory();
        assert!(d.link(&[], None, &LinkerConfig::default()).is_none());
        assert!(d.link(&[], Some("   "), &LinkerConfig::default()).is_none());
        assert!(JournalDirectory::new()
            .link(&issns(&["0022-0345"]), Some("x"), &LinkerConfig::default())
            .is_none());
    }

    #[test]
    fn test_length_ratio() {
        assert_eq!(length_ratio("abcd", "ab"), 0.5);
        assert_eq!(length_ratio("", ""), 0.0);
    }
}
