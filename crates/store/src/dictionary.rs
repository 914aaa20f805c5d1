use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use inkgloss_core::{GlossError, GlossRow, GlossSource};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, Row};
use tracing::debug;

static COLUMN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS lemmas (
        id INTEGER PRIMARY KEY,
        lemma TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS senses (
        id INTEGER PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 1,
        lemma_id INTEGER NOT NULL,
        pos TEXT NOT NULL,
        short_def TEXT,
        full_def TEXT,
        example TEXT,
        ipa TEXT,
        FOREIGN KEY(lemma_id) REFERENCES lemmas(id)
    );
    CREATE TABLE IF NOT EXISTS forms (
        form TEXT NOT NULL,
        pos TEXT NOT NULL,
        lemma_id INTEGER NOT NULL,
        FOREIGN KEY(lemma_id) REFERENCES lemmas(id)
    );
    CREATE INDEX IF NOT EXISTS idx_lemmas_lemma ON lemmas(lemma);
    CREATE INDEX IF NOT EXISTS idx_senses_lemma ON senses(lemma_id, pos);
    CREATE INDEX IF NOT EXISTS idx_forms_form ON forms(form);
"#;

#[derive(Debug, Clone, Default)]
pub struct SenseInsert {
    pub pos: String,
    pub short_def: String,
    pub full_def: String,
    pub example: Option<String>,
    pub ipa: Option<String>,
    pub enabled: bool,
}

/// SQLite dictionary of lemmas, senses and inflected forms.
pub struct DictionaryStore {
    path: PathBuf,
    conn: Connection,
    lemma_lang: String,
    select: String,
}

impl DictionaryStore {
    /// Opens an existing dictionary. `ipa_column` names the pronunciation
    /// column when the dictionary carries several.
    pub fn open<P: AsRef<Path>>(path: P, lemma_lang: &str, ipa_column: Option<&str>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            bail!("dictionary {} does not exist", path.display());
        }
        let conn = Connection::open(&path)?;
        Self::with_connection(path, conn, lemma_lang, ipa_column)
    }

    /// Creates the schema if missing; used to build dictionaries.
    pub fn create<P: AsRef<Path>>(path: P, lemma_lang: &str) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        Self::with_connection(path, conn, lemma_lang, None)
    }

    fn with_connection(path: PathBuf, conn: Connection, lemma_lang: &str, ipa_column: Option<&str>) -> Result<Self> {
        let ipa_column = ipa_column.unwrap_or("ipa");
        if !COLUMN_RE.is_match(ipa_column) {
            bail!("invalid pronunciation column name {ipa_column:?}");
        }
        Ok(Self {
            path,
            conn,
            lemma_lang: lemma_lang.to_string(),
            select: format!(
                "SELECT short_def, full_def, example, {ipa_column} FROM senses JOIN lemmas ON senses.lemma_id = lemmas.id "
            ),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert_lemma(&self, lemma: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO lemmas (lemma) VALUES (?1)", params![lemma])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_sense(&self, lemma_id: i64, sense: &SenseInsert) -> Result<()> {
        self.conn.execute(
            "INSERT INTO senses (enabled, lemma_id, pos, short_def, full_def, example, ipa) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                sense.enabled,
                lemma_id,
                sense.pos,
                sense.short_def,
                sense.full_def,
                sense.example,
                sense.ipa
            ],
        )?;
        Ok(())
    }

    pub fn insert_form(&self, lemma_id: i64, pos: &str, form: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO forms (form, pos, lemma_id) VALUES (?1, ?2, ?3)",
            params![form, pos, lemma_id],
        )?;
        Ok(())
    }

    fn query(&self, filter: &str, args: &[&str]) -> Result<Vec<GlossRow>> {
        let sql = format!("{}{}", self.select, filter);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), gloss_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Senses for `lemma` under a dictionary part-of-speech heading. Phrases
    /// fall back to inflected forms, and Chinese falls back to forms of the
    /// same part of speech.
    pub fn glosses_with_pos(&self, lemma: &str, pos: &str) -> Result<Vec<GlossRow>> {
        let rows = self.query("WHERE lemma = ?1 AND pos = ?2", &[lemma, pos])?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        if lemma.contains(' ') {
            self.query(
                "JOIN forms ON senses.lemma_id = forms.lemma_id AND senses.pos = forms.pos WHERE form = ?1",
                &[lemma],
            )
        } else if self.lemma_lang == "zh" {
            self.query(
                "JOIN forms ON senses.lemma_id = forms.lemma_id AND senses.pos = forms.pos WHERE form = ?1 AND forms.pos = ?2",
                &[lemma, pos],
            )
        } else {
            Ok(rows)
        }
    }

    /// The first enabled sense of `lemma`, or of a lemma it is a form of.
    pub fn glosses_without_pos(&self, lemma: &str) -> Result<Vec<GlossRow>> {
        let rows = self.query("WHERE lemma = ?1 AND enabled = 1 LIMIT 1", &[lemma])?;
        if !rows.is_empty() {
            return Ok(rows);
        }
        self.query(
            "JOIN forms ON senses.lemma_id = forms.lemma_id AND senses.pos = forms.pos WHERE form = ?1 AND enabled = 1 LIMIT 1",
            &[lemma],
        )
    }
}

fn gloss_row(row: &Row<'_>) -> rusqlite::Result<GlossRow> {
    Ok(GlossRow {
        short_gloss: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
        full_gloss: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        example: row.get(2)?,
        pronunciation: row.get(3)?,
    })
}

impl GlossSource for DictionaryStore {
    fn lookup(&self, lemma: &str, pos: Option<&str>) -> inkgloss_core::Result<Vec<GlossRow>> {
        let rows = match pos {
            Some(pos) => self.glosses_with_pos(lemma, pos),
            None => self.glosses_without_pos(lemma),
        }
        .map_err(|err| GlossError::Lookup(format!("{lemma}: {err}")))?;
        debug!(lemma, pos, rows = rows.len(), "dictionary lookup");
        Ok(rows)
    }
}
