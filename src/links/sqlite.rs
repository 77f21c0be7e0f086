//! SQLite-backed link store
//!
//! [`SqliteStore`] borrows a connection owned by the caller. It never
//! commits: multi-statement updates are wrapped in a savepoint so that a
//! failure leaves the caller's transaction as it was.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::orchestrator::DocStatus;

use super::descriptor::{document_fragments, ActiveStatus, DocId, VersionCheckMode};
use super::store::{DocumentInfo, LinkRow, LinkStore};

const TABLES: [(&str, &str); 5] = [
    (
        "doc_type",
        "CREATE TABLE IF NOT EXISTS doc_type (
            name TEXT PRIMARY KEY,
            schema_xml TEXT NOT NULL
        )",
    ),
    (
        "document",
        "CREATE TABLE IF NOT EXISTS document (
            id INTEGER PRIMARY KEY,
            doc_type TEXT NOT NULL,
            active_status TEXT NOT NULL DEFAULT 'A',
            title TEXT,
            xml TEXT NOT NULL,
            val_status TEXT,
            val_date TEXT
        )",
    ),
    (
        "doc_version",
        "CREATE TABLE IF NOT EXISTS doc_version (
            doc_id INTEGER NOT NULL,
            num INTEGER NOT NULL,
            publishable INTEGER NOT NULL DEFAULT 0,
            xml TEXT NOT NULL,
            PRIMARY KEY (doc_id, num)
        )",
    ),
    (
        "link_net",
        "CREATE TABLE IF NOT EXISTS link_net (
            link_type TEXT NOT NULL,
            source_doc INTEGER NOT NULL,
            source_elem TEXT NOT NULL,
            target_doc INTEGER,
            target_frag TEXT,
            url TEXT,
            ordinal INTEGER NOT NULL
        )",
    ),
    (
        "link_fragment",
        "CREATE TABLE IF NOT EXISTS link_fragment (
            doc_id INTEGER NOT NULL,
            fragment TEXT NOT NULL,
            PRIMARY KEY (doc_id, fragment)
        )",
    ),
];

/// Create the tables used by [`SqliteStore`] if they do not exist
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    for (name, sql) in TABLES {
        conn.execute(sql, [])
            .map_err(|e| Error::Infrastructure(format!("Failed to create {} table: {}", name, e)))?;
    }
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_link_net_target ON link_net(target_doc)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_link_net_source ON link_net(source_doc)",
        [],
    )?;
    debug!("Link store schema initialized");
    Ok(())
}

/// [`LinkStore`] over a borrowed SQLite connection
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    /// Wrap a connection whose schema has been initialized
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// The borrowed connection
    pub fn connection(&self) -> &Connection {
        self.conn
    }

    /// Store or replace the schema of a document type
    pub fn add_schema(&self, doc_type: &str, xml: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO doc_type (name, schema_xml) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET schema_xml = excluded.schema_xml",
            params![doc_type, xml],
        )?;
        Ok(())
    }

    /// Store or replace the current working copy of a document
    pub fn add_document(&self, id: DocId, doc_type: &str, xml: &str, title: Option<&str>) -> Result<()> {
        let (fragments, _) = document_fragments(&Document::from_string(xml)?);
        self.conn.execute(
            "INSERT INTO document (id, doc_type, active_status, title, xml) VALUES (?1, ?2, 'A', ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET doc_type = excluded.doc_type,
                 title = excluded.title, xml = excluded.xml",
            params![id.0, doc_type, title, xml],
        )?;
        self.replace_fragments(id, &fragments)
    }

    /// Append a saved version of a document, returning its number
    pub fn add_version(&self, id: DocId, publishable: bool, xml: &str) -> Result<i64> {
        Document::from_string(xml)?;
        let num: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(num), 0) + 1 FROM doc_version WHERE doc_id = ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO doc_version (doc_id, num, publishable, xml) VALUES (?1, ?2, ?3, ?4)",
            params![id.0, num, publishable, xml],
        )?;
        Ok(num)
    }

    /// Mark a document deleted
    pub fn mark_deleted(&self, id: DocId) -> Result<()> {
        self.conn.execute(
            "UPDATE document SET active_status = ?1 WHERE id = ?2",
            params![ActiveStatus::Deleted.code(), id.0],
        )?;
        Ok(())
    }

    /// Last recorded validation status and date
    pub fn validation_status(&self, id: DocId) -> Result<Option<(DocStatus, String)>> {
        let row: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT val_status, val_date FROM document WHERE id = ?1",
                params![id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(code), Some(date))) => DocStatus::from_code(&code).map(|s| (s, date)),
            _ => None,
        })
    }

    fn within_savepoint<T>(&self, name: &str, work: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        match work() {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {}", name))?;
                Ok(value)
            }
            Err(e) => {
                warn!(savepoint = name, error = %e, "Rolling back link store update");
                self.conn
                    .execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", name))?;
                Err(e)
            }
        }
    }

    fn read_rows(&self, sql: &str, id: DocId) -> Result<Vec<LinkRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![id.0], |row| {
                Ok(LinkRow {
                    link_type: row.get(0)?,
                    source_doc: DocId(row.get(1)?),
                    source_field: row.get(2)?,
                    target_doc: row.get::<_, Option<i64>>(3)?.map(DocId),
                    target_fragment: row.get(4)?,
                    url: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    ordinal: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl LinkStore for SqliteStore<'_> {
    fn resolve_document(&self, id: DocId) -> Result<Option<DocumentInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT doc_type, active_status, title FROM document WHERE id = ?1",
                params![id.0],
                |row| {
                    let status: String = row.get(1)?;
                    Ok(DocumentInfo {
                        doc_type: row.get(0)?,
                        status: ActiveStatus::from_code(&status),
                        title: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    fn fragment_ids(&self, id: DocId, mode: VersionCheckMode) -> Result<Option<BTreeSet<String>>> {
        let xml: Option<String> = match mode {
            VersionCheckMode::CurrentWorkingCopy => {
                let mut stmt = self
                    .conn
                    .prepare("SELECT fragment FROM link_fragment WHERE doc_id = ?1")?;
                let fragments = stmt
                    .query_map(params![id.0], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<BTreeSet<_>>>()?;
                return Ok(Some(fragments));
            }
            VersionCheckMode::LastPublishable => self
                .conn
                .query_row(
                    "SELECT xml FROM doc_version WHERE doc_id = ?1 AND publishable = 1
                     ORDER BY num DESC LIMIT 1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?,
            VersionCheckMode::AnyVersion => self
                .conn
                .query_row(
                    "SELECT xml FROM doc_version WHERE doc_id = ?1 ORDER BY num DESC LIMIT 1",
                    params![id.0],
                    |row| row.get(0),
                )
                .optional()?,
        };
        match xml {
            Some(xml) => {
                let (fragments, _) = document_fragments(&Document::from_string(&xml)?);
                Ok(Some(fragments))
            }
            None => Ok(None),
        }
    }

    fn field_values(&self, id: DocId, path: &str) -> Result<Vec<String>> {
        let xml: Option<String> = self
            .conn
            .query_row(
                "SELECT xml FROM document WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        match xml {
            Some(xml) => Ok(Document::from_string(&xml)?.select_values(path)),
            None => Ok(Vec::new()),
        }
    }

    fn links_from(&self, source: DocId) -> Result<Vec<LinkRow>> {
        self.read_rows(
            "SELECT link_type, source_doc, source_elem, target_doc, target_frag, url, ordinal
             FROM link_net WHERE source_doc = ?1 ORDER BY ordinal",
            source,
        )
    }

    fn links_to(&self, target: DocId) -> Result<Vec<LinkRow>> {
        self.read_rows(
            "SELECT link_type, source_doc, source_elem, target_doc, target_frag, url, ordinal
             FROM link_net WHERE target_doc = ?1 ORDER BY source_doc, ordinal",
            target,
        )
    }

    fn replace_links(&self, source: DocId, links: &[LinkRow]) -> Result<()> {
        self.within_savepoint("replace_links", || {
            self.conn
                .execute("DELETE FROM link_net WHERE source_doc = ?1", params![source.0])?;
            let mut stmt = self.conn.prepare(
                "INSERT INTO link_net
                 (link_type, source_doc, source_elem, target_doc, target_frag, url, ordinal)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for link in links {
                stmt.execute(params![
                    link.link_type,
                    link.source_doc.0,
                    link.source_field,
                    link.target_doc.map(|d| d.0),
                    link.target_fragment,
                    link.url,
                    link.ordinal,
                ])?;
            }
            debug!(source = %source, rows = links.len(), "link_net rows replaced");
            Ok(())
        })
    }

    fn delete_links_from(&self, source: DocId) -> Result<()> {
        self.conn
            .execute("DELETE FROM link_net WHERE source_doc = ?1", params![source.0])?;
        Ok(())
    }

    fn replace_fragments(&self, doc: DocId, fragments: &BTreeSet<String>) -> Result<()> {
        self.within_savepoint("replace_fragments", || {
            self.conn
                .execute("DELETE FROM link_fragment WHERE doc_id = ?1", params![doc.0])?;
            let mut stmt = self
                .conn
                .prepare("INSERT INTO link_fragment (doc_id, fragment) VALUES (?1, ?2)")?;
            for fragment in fragments {
                stmt.execute(params![doc.0, fragment])?;
            }
            Ok(())
        })
    }

    fn set_validation_status(&self, doc: DocId, status: DocStatus) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE document SET val_status = ?1, val_date = ?2 WHERE id = ?3",
            params![status.code(), now, doc.0],
        )?;
        if updated == 0 {
            return Err(Error::Infrastructure(format!(
                "Cannot record validation status: document {} not found",
                doc
            )));
        }
        Ok(())
    }

    fn schema_source(&self, doc_type: &str) -> Result<Option<String>> {
        let xml = self
            .conn
            .query_row(
                "SELECT schema_xml FROM doc_type WHERE name = ?1",
                params![doc_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_initialize_twice() {
        let conn = open();
        initialize_schema(&conn).unwrap();
    }

    #[test]
    fn test_documents_and_versions() {
        let conn = open();
        let store = SqliteStore::new(&conn);
        store
            .add_document(DocId(4), "Term", r#"<Term><A cdr:id="_1"/></Term>"#, Some("Aspirin"))
            .unwrap();

        let info = store.resolve_document(DocId(4)).unwrap().unwrap();
        assert_eq!(info.doc_type, "Term");
        assert_eq!(info.title.as_deref(), Some("Aspirin"));
        assert_eq!(info.status, ActiveStatus::Active);

        let current = store.fragment_ids(DocId(4), VersionCheckMode::CurrentWorkingCopy).unwrap();
        assert!(current.unwrap().contains("_1"));
        assert!(store.fragment_ids(DocId(4), VersionCheckMode::AnyVersion).unwrap().is_none());

        assert_eq!(store.add_version(DocId(4), false, "<Term/>").unwrap(), 1);
        assert_eq!(store.add_version(DocId(4), true, r#"<Term><A cdr:id="_7"/></Term>"#).unwrap(), 2);
        let publishable = store.fragment_ids(DocId(4), VersionCheckMode::LastPublishable).unwrap().unwrap();
        assert!(publishable.contains("_7"));

        store.mark_deleted(DocId(4)).unwrap();
        let info = store.resolve_document(DocId(4)).unwrap().unwrap();
        assert_eq!(info.status, ActiveStatus::Deleted);
    }

    #[test]
    fn test_replace_links_twice() {
        let conn = open();
        let store = SqliteStore::new(&conn);
        let row = LinkRow {
            link_type: "Summary-Term".to_string(),
            source_doc: DocId(1),
            source_field: "TermRef".to_string(),
            target_doc: Some(DocId(2)),
            target_fragment: Some("_3".to_string()),
            url: "CDR2#_3".to_string(),
            ordinal: 0,
        };
        store.replace_links(DocId(1), &[row.clone()]).unwrap();
        store.replace_links(DocId(1), &[row.clone()]).unwrap();
        assert_eq!(store.links_from(DocId(1)).unwrap(), vec![row.clone()]);
        assert_eq!(store.links_to(DocId(2)).unwrap(), vec![row]);

        store.delete_links_from(DocId(1)).unwrap();
        assert!(store.links_to(DocId(2)).unwrap().is_empty());
    }

    #[test]
    fn test_validation_status() {
        let conn = open();
        let store = SqliteStore::new(&conn);
        assert!(store.set_validation_status(DocId(1), DocStatus::Valid).is_err());

        store.add_document(DocId(1), "Term", "<Term/>", None).unwrap();
        store.set_validation_status(DocId(1), DocStatus::Invalid).unwrap();
        let (status, date) = store.validation_status(DocId(1)).unwrap().unwrap();
        assert_eq!(status, DocStatus::Invalid);
        assert!(!date.is_empty());
    }

    #[test]
    fn test_schema_source() {
        let conn = open();
        let store = SqliteStore::new(&conn);
        assert!(store.schema_source("Term").unwrap().is_none());
        store.add_schema("Term", "<schema/>").unwrap();
        store.add_schema("Term", "<schema2/>").unwrap();
        assert_eq!(store.schema_source("Term").unwrap().as_deref(), Some("<schema2/>"));
    }
}
