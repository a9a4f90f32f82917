//! Automatic entry/tag association.
//!
//! A tag is associated with an entry when the tag's name appears as a whole
//! token in the entry's `learned` text. Matching is case-sensitive: the tag
//! `go` does not match the text `I love Go`.
//!
//! Every operation takes an explicit connection. Callers pass a transaction
//! (`&mut *tx`) so the entry or tag mutation and the association changes it
//! triggers commit together.

use std::collections::HashSet;

use sqlx::SqliteConnection;

use crate::models::{Entry, Tag};

/// Punctuation characters that form single-character tokens.
const PUNCTUATION: [char; 5] = ['.', ',', '!', '?', ';'];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split `text` into word tokens and single punctuation tokens.
///
/// Runs of word characters become one token, each of `. , ! ? ;` is a token
/// on its own, and everything else (whitespace included) only separates.
pub fn tokenize(text: &str) -> HashSet<&str> {
    let mut tokens = HashSet::new();
    let mut word_start = None;

    for (i, c) in text.char_indices() {
        if is_word_char(c) {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            tokens.insert(&text[start..i]);
        }
        if PUNCTUATION.contains(&c) {
            tokens.insert(&text[i..i + c.len_utf8()]);
        }
    }
    if let Some(start) = word_start {
        tokens.insert(&text[start..]);
    }

    tokens
}

/// True when `label` is exactly one word token, i.e. something the matcher
/// can ever find in entry text.
pub fn is_single_word(label: &str) -> bool {
    !label.is_empty() && label.chars().all(is_word_char)
}

/// Whether `tag` matches `entry` under the whole-token rule.
pub fn matches(entry: &Entry, tag: &Tag) -> bool {
    tokenize(&entry.learned).contains(tag.name.as_str())
}

/// Insert the association unless it already exists. Returns 1 when a row was
/// created and 0 when the pair was already associated.
async fn associate(
    conn: &mut SqliteConnection,
    entry_id: &str,
    tag_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?, ?)")
        .bind(entry_id)
        .bind(tag_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Associate every existing tag whose name appears in the entry's text.
///
/// Safe to call repeatedly: pairs that are already associated are left alone.
/// Returns the number of associations created.
pub async fn tag_new_entry(conn: &mut SqliteConnection, entry: &Entry) -> Result<u64, sqlx::Error> {
    let tokens = tokenize(&entry.learned);
    let tags: Vec<Tag> = sqlx::query_as("SELECT * FROM tags")
        .fetch_all(&mut *conn)
        .await?;

    let mut added = 0;
    for tag in tags.iter().filter(|t| tokens.contains(t.name.as_str())) {
        added += associate(&mut *conn, &entry.id, &tag.id).await?;
    }

    tracing::debug!(entry_id = %entry.id, added, "associated tags with entry");
    Ok(added)
}

/// Back-fill a newly created tag onto every entry whose text contains it.
///
/// Returns the number of associations created.
pub async fn tag_current_entries(conn: &mut SqliteConnection, tag: &Tag) -> Result<u64, sqlx::Error> {
    // instr() is a case-sensitive substring test; it narrows the candidates
    // before the whole-token check.
    let candidates: Vec<Entry> = sqlx::query_as("SELECT * FROM entries WHERE instr(learned, ?) > 0")
        .bind(&tag.name)
        .fetch_all(&mut *conn)
        .await?;

    let mut added = 0;
    for entry in candidates.iter().filter(|e| matches(e, tag)) {
        added += associate(&mut *conn, &entry.id, &tag.id).await?;
    }

    tracing::debug!(tag = %tag.name, added, "back-filled tag onto entries");
    Ok(added)
}

/// Drop associations whose tag no longer appears in the entry's text.
///
/// An entry with no associations is a no-op. Returns the number of
/// associations removed.
pub async fn remove_tag(conn: &mut SqliteConnection, entry: &Entry) -> Result<u64, sqlx::Error> {
    let tokens = tokenize(&entry.learned);
    let current = tags_for_entry(&mut *conn, &entry.id).await?;

    let mut removed = 0;
    for tag in current.iter().filter(|t| !tokens.contains(t.name.as_str())) {
        let result = sqlx::query("DELETE FROM entry_tags WHERE entry_id = ? AND tag_id = ?")
            .bind(&entry.id)
            .bind(&tag.id)
            .execute(&mut *conn)
            .await?;
        removed += result.rows_affected();
    }

    tracing::debug!(entry_id = %entry.id, removed, "pruned stale tags from entry");
    Ok(removed)
}

/// Outcome of [`retag_entry`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Retagged {
    pub removed: u64,
    pub added: u64,
}

/// Recompute an edited entry's associations: prune first, then add.
///
/// Pruning must only see the associations that existed before the edit, so
/// it always runs first.
pub async fn retag_entry(conn: &mut SqliteConnection, entry: &Entry) -> Result<Retagged, sqlx::Error> {
    let removed = remove_tag(&mut *conn, entry).await?;
    let added = tag_new_entry(&mut *conn, entry).await?;
    Ok(Retagged { removed, added })
}

/// Tags associated with an entry, ordered by name.
pub async fn tags_for_entry(conn: &mut SqliteConnection, entry_id: &str) -> Result<Vec<Tag>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT t.* FROM tags t
        JOIN entry_tags et ON et.tag_id = t.id
        WHERE et.entry_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(entry_id)
    .fetch_all(conn)
    .await
}
