//! Entry operations on a single named store.
//!
//! Entries are keyed by request identity (method + URL). Only GET requests
//! can be matched or stored; a put overwrites any previous entry for the
//! same request.

use super::connection::CacheDb;
use super::hash::compute_cache_key;
use crate::Error;
use crate::exchange::{Request, Response, headers_from_pairs, headers_to_pairs};
use bytes::Bytes;
use http::{Method, StatusCode};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;
use url::Url;

/// A handle to one named store.
///
/// Cheap to create and clone; holds no state beyond the shared connection,
/// so callers open one per use and drop it afterwards.
#[derive(Clone, Debug)]
pub struct CacheStore {
    db: CacheDb,
    name: String,
}

/// An entry ready to be written.
struct EntryRow {
    key_hash: String,
    method: String,
    url: String,
    status: i64,
    headers_json: String,
    body: Vec<u8>,
    response_url: Option<String>,
}

impl EntryRow {
    fn encode(request: &Request, response: &Response) -> Result<Self, Error> {
        if request.method != Method::GET {
            return Err(Error::UnsupportedMethod(format!(
                "cannot store {} {}",
                request.method,
                request.url_str()
            )));
        }
        if response.status == StatusCode::PARTIAL_CONTENT {
            return Err(Error::InvalidInput(format!("cannot store partial response for {}", request.url_str())));
        }

        let headers_json = serde_json::to_string(&headers_to_pairs(&response.headers))
            .map_err(|e| Error::InvalidInput(format!("failed to encode headers: {e}")))?;

        Ok(Self {
            key_hash: compute_cache_key(request.method.as_str(), request.url_str()),
            method: request.method.to_string(),
            url: request.url_str().to_string(),
            status: i64::from(response.status.as_u16()),
            headers_json,
            body: response.body.to_vec(),
            response_url: response.url.as_ref().map(|u| u.to_string()),
        })
    }
}

fn insert_row(conn: &rusqlite::Connection, store: &str, row: &EntryRow, stored_at: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT INTO entries (
            store_name, key_hash, method, url, status, headers_json, body, response_url, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(store_name, key_hash) DO UPDATE SET
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            response_url = excluded.response_url,
            stored_at = excluded.stored_at",
        params![
            store,
            &row.key_hash,
            &row.method,
            &row.url,
            row.status,
            &row.headers_json,
            &row.body,
            &row.response_url,
            stored_at,
        ],
    )?;
    Ok(())
}

fn decode_response(status: i64, headers_json: &str, body: Vec<u8>, response_url: Option<String>) -> Result<Response, Error> {
    let status = u16::try_from(status)
        .ok()
        .and_then(|s| StatusCode::from_u16(s).ok())
        .ok_or_else(|| Error::CorruptEntry(format!("invalid status {status}")))?;

    let pairs: Vec<(String, String)> =
        serde_json::from_str(headers_json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
    let headers = headers_from_pairs(pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())))
        .map_err(|e| Error::CorruptEntry(e.to_string()))?;

    let url = response_url
        .map(|u| Url::parse(&u))
        .transpose()
        .map_err(|e| Error::CorruptEntry(format!("response url: {e}")))?;

    Ok(Response { url, status, headers, body: Bytes::from(body) })
}

impl CacheStore {
    pub(crate) fn new(db: CacheDb, name: &str) -> Self {
        Self { db, name: name.to_string() }
    }

    /// Name of this store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up the stored response for `request`.
    ///
    /// Returns None for non-GET requests and for requests never stored.
    pub async fn match_request(&self, request: &Request) -> Result<Option<Response>, Error> {
        if request.method != Method::GET {
            return Ok(None);
        }

        let store = self.name.clone();
        let key_hash = compute_cache_key(request.method.as_str(), request.url_str());
        self.db
            .conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, headers_json, body, response_url
                     FROM entries WHERE store_name = ?1 AND key_hash = ?2",
                )?;

                let result = stmt.query_row(params![store, key_hash], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                });

                match result {
                    Ok((status, headers_json, body, response_url)) => {
                        decode_response(status, &headers_json, body, response_url).map(Some)
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Store `response` for `request`, overwriting any previous entry.
    ///
    /// Fails if the request is not a GET or if the store has been deleted.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        let row = EntryRow::encode(request, response)?;
        let store = self.name.clone();
        let stored_at = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| insert_row(conn, &store, &row, &stored_at))
            .await
            .map_err(Error::from)
    }

    /// Store every pair in a single transaction.
    ///
    /// Either all entries are written or none are.
    pub async fn put_all(&self, entries: &[(Request, Response)]) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::encode(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let store = self.name.clone();
        let stored_at = chrono::Utc::now().to_rfc3339();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                for row in &rows {
                    insert_row(&tx, &store, row, &stored_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// URLs of all stored requests, sorted.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let store = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE store_name = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![store], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}
