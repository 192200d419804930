//! Bookmark weaving.
//!
//! `/bookmark [name]` captures the recent exchange into a dated markdown
//! file under the workspace. When web results are still held from the last
//! search, they land in a Sources section with the query that produced
//! them. The written file's sha256 goes into the event metadata so later
//! edits are detectable.

use chrono::Local;
use sha2::{Digest, Sha256};
use sovwren_core::message::{ChatMessage, Role};
use sovwren_core::Error;
use sovwren_search::SearchResult;
use std::path::{Path, PathBuf};
use tracing::info;

const HISTORY_TAIL: usize = 10;

pub struct WovenBookmark {
    pub path: PathBuf,
    pub filename: String,
    pub sha256: String,
}

/// Weave and write a bookmark file. Returns the path and content hash.
pub fn weave(
    bookmarks_dir: &Path,
    name: Option<&str>,
    history: &[ChatMessage],
    last_search_query: &str,
    last_search_results: &[SearchResult],
) -> Result<WovenBookmark, Error> {
    let date = Local::now().format("%Y-%m-%d").to_string();
    let title = name.unwrap_or("Session");
    let slug = slugify(title);
    let filename = format!("{date}-{slug}.md");

    let tail = &history[history.len().saturating_sub(HISTORY_TAIL)..];
    let context = if tail.is_empty() {
        "(empty session)".to_string()
    } else {
        tail.iter()
            .map(|m| {
                let marker = if m.role == Role::Steward { ">" } else { "<" };
                let head: String = m.content.chars().take(200).collect();
                format!("{marker} {head}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let sources = if last_search_results.is_empty() {
        String::new()
    } else {
        let citations = last_search_results
            .iter()
            .map(|r| r.to_citation())
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n## Sources\n\nQuery: \"{last_search_query}\"\n\n{citations}\n")
    };

    let content = format!(
        "# {date} — {title}\n\n## Context\n\n{context}\n\n## Notes\n\n(What emerged?)\n{sources}"
    );

    std::fs::create_dir_all(bookmarks_dir)
        .map_err(|e| Error::Internal(format!("cannot create bookmarks dir: {e}")))?;
    let path = bookmarks_dir.join(&filename);
    std::fs::write(&path, &content)
        .map_err(|e| Error::Internal(format!("cannot write bookmark {}: {e}", path.display())))?;

    let sha256 = hex_digest(&content);
    info!(file = %path.display(), "bookmark woven");

    Ok(WovenBookmark {
        path,
        filename,
        sha256,
    })
}

fn slugify(title: &str) -> String {
    let mut slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    while slug.contains("--") {
        slug = slug.replace("--", "-");
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "session".to_string()
    } else {
        slug.to_string()
    }
}

fn hex_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_are_filesystem_safe() {
        assert_eq!(slugify("Retriever notes!"), "retriever-notes");
        assert_eq!(slugify("  ... "), "session");
        assert_eq!(slugify("a/b\\c"), "a-b-c");
    }

    #[test]
    fn weave_writes_dated_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let history = vec![
            ChatMessage::steward("how do lifetimes work?"),
            ChatMessage::node("they bound how long references live."),
        ];

        let woven = weave(dir.path(), Some("lifetimes"), &history, "", &[]).unwrap();
        assert!(woven.filename.ends_with("-lifetimes.md"));

        let content = std::fs::read_to_string(&woven.path).unwrap();
        assert!(content.contains("## Context"));
        assert!(content.contains("> how do lifetimes work?"));
        assert!(content.contains("## Notes"));
        assert!(!content.contains("## Sources"));
        assert_eq!(woven.sha256, hex_digest(&content));
    }

    #[test]
    fn held_search_results_become_sources() {
        let dir = tempfile::tempdir().unwrap();
        let results = vec![SearchResult::new(
            "https://example.com/doc",
            "Example Doc",
            "a snippet",
            "duckduckgo",
        )];

        let woven = weave(dir.path(), None, &[], "rust lifetimes", &results).unwrap();
        let content = std::fs::read_to_string(&woven.path).unwrap();
        assert!(content.contains("## Sources"));
        assert!(content.contains("Query: \"rust lifetimes\""));
        assert!(content.contains("[Example Doc](https://example.com/doc)"));
    }
}
