//! Source citations derived from the final chunk ranking.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::retrieve::RetrievedChunk;
use crate::text::normalize;
use crate::types::SourceRef;

/// Group the final ranking into one citation per source document.
///
/// Sources keep the order of their first-ranked chunk; pages from all of a
/// source's chunks are unioned and sorted.
pub fn aggregate_sources(retrieved: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut order: Vec<String> = Vec::new();
    let mut pages: HashMap<String, BTreeSet<u32>> = HashMap::new();

    for retrieved_chunk in retrieved {
        let name = &retrieved_chunk.chunk.source_name;
        if !pages.contains_key(name) {
            order.push(name.clone());
        }
        let entry = pages.entry(name.clone()).or_default();
        if let Some(page) = retrieved_chunk.chunk.page {
            entry.insert(page);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let page_set = pages.remove(&name).unwrap_or_default();
            SourceRef {
                source_name: name,
                pages: page_set.into_iter().collect(),
            }
        })
        .collect()
}

/// Render sorted page numbers compactly: runs become "start–end", gaps
/// separate groups ("3–5, 9").
pub fn compress_pages(pages: &[u32]) -> String {
    let mut groups: Vec<String> = Vec::new();
    let mut i = 0;

    while i < pages.len() {
        let start = pages[i];
        let mut end = start;
        while i + 1 < pages.len() && pages[i + 1] == end + 1 {
            i += 1;
            end = pages[i];
        }
        if start == end {
            groups.push(start.to_string());
        } else {
            groups.push(format!("{}–{}", start, end));
        }
        i += 1;
    }

    groups.join(", ")
}

impl SourceRef {
    /// Human-readable citation label, e.g. "manual.pdf (pp. 3–5, 9)".
    pub fn label(&self) -> String {
        match self.pages.len() {
            0 => self.source_name.clone(),
            1 => format!("{} (p. {})", self.source_name, self.pages[0]),
            _ => format!("{} (pp. {})", self.source_name, compress_pages(&self.pages)),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Drop answer lines that are nothing but a source title.
///
/// Models sometimes echo the document name as a heading before the
/// answer. Lines equal to a source name, or to its filename stem, are
/// removed after accent folding; everything else stays untouched.
pub fn strip_title_lines(answer: &str, sources: &[SourceRef]) -> String {
    if sources.is_empty() {
        return answer.trim().to_string();
    }

    let mut titles: HashSet<String> = HashSet::new();
    for source in sources {
        titles.insert(normalize(source.source_name.trim()));
        if let Some((stem, _)) = source.source_name.rsplit_once('.') {
            titles.insert(normalize(stem.trim()));
        }
    }

    answer
        .lines()
        .filter(|line| {
            let folded = normalize(line.trim());
            folded.is_empty() || !titles.contains(&folded)
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
