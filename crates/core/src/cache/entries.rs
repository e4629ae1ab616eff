//! SQLite implementation of the named cache store.

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, Connection, OptionalExtension};

use super::connection::CacheDb;
use super::{CacheStore, ensure_storable};
use crate::Error;
use crate::http::{Request, Response, ResponseType};

/// Raw column values of one cache_entries row.
struct EntryRow {
    status: u16,
    status_text: String,
    response_type: String,
    response_url: String,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn into_response(self) -> Result<Response, Error> {
        let response_type = ResponseType::parse(&self.response_type)
            .ok_or_else(|| Error::Serialization(format!("unknown response type {}", self.response_type)))?;
        let mut response = Response::new(self.status, self.response_url, self.body)
            .with_status_text(self.status_text)
            .with_type(response_type);
        response.headers = serde_json::from_str(&self.headers_json)?;
        Ok(response)
    }
}

fn create_cache(conn: &Connection, name: &str) -> Result<(), Error> {
    conn.execute(
        "INSERT OR IGNORE INTO caches (name, created_at) VALUES (?1, ?2)",
        params![name, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn upsert_entry(conn: &Connection, name: &str, request: &Request, response: &Response) -> Result<(), Error> {
    let headers_json = serde_json::to_string(&response.headers)?;
    let body = response.clone().into_body();
    conn.execute(
        "INSERT INTO cache_entries (
            cache_name, request_key, method, request_url,
            status, status_text, response_type, response_url,
            headers_json, body, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(cache_name, request_key) DO UPDATE SET
            status = excluded.status,
            status_text = excluded.status_text,
            response_type = excluded.response_type,
            response_url = excluded.response_url,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            name,
            request.cache_key(),
            &request.method,
            &request.url,
            response.status,
            &response.status_text,
            response.response_type.as_str(),
            &response.url,
            headers_json,
            body.as_ref(),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl CacheStore for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> { create_cache(conn, &name) })
            .await
            .map_err(Error::from)
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM caches WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY rowid")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM caches WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        let name = name.to_string();
        let key = request.cache_key();
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let row = conn
                    .query_row(
                        "SELECT status, status_text, response_type, response_url, headers_json, body
                        FROM cache_entries WHERE cache_name = ?1 AND request_key = ?2",
                        params![name, key],
                        |row| {
                            Ok(EntryRow {
                                status: row.get(0)?,
                                status_text: row.get(1)?,
                                response_type: row.get(2)?,
                                response_url: row.get(3)?,
                                headers_json: row.get(4)?,
                                body: row.get(5)?,
                            })
                        },
                    )
                    .optional()?;

                row.map(EntryRow::into_response).transpose()
            })
            .await
            .map_err(Error::from)
    }

    async fn put(&self, name: &str, request: &Request, response: Response) -> Result<(), Error> {
        ensure_storable(request)?;
        let name = name.to_string();
        let request = request.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                create_cache(&tx, &name)?;
                upsert_entry(&tx, &name, &request, &response)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        for (request, _) in &entries {
            ensure_storable(request)?;
        }
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                create_cache(&tx, &name)?;
                for (request, response) in &entries {
                    upsert_entry(&tx, &name, request, response)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn entries(&self, name: &str) -> Result<Vec<Request>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<Request>, Error> {
                let mut stmt = conn
                    .prepare("SELECT method, request_url FROM cache_entries WHERE cache_name = ?1 ORDER BY rowid")?;
                let requests = stmt
                    .query_map(params![name], |row| {
                        Ok(Request { method: row.get(0)?, url: row.get(1)? })
                    })?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(requests)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "video-reverser-cache-v1";
    const V2: &str = "video-reverser-cache-v2";

    fn asset(path: &str) -> (Request, Response) {
        let url = format!("http://localhost:8080/video-reverser/{path}");
        let response = Response::new(200, url.clone(), format!("body of {path}"))
            .with_status_text("OK")
            .with_header("content-type", "text/html");
        (Request::get(url), response)
    }

    #[tokio::test]
    async fn test_open_creates_store_once() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(!db.has(V1).await.unwrap());

        db.open(V1).await.unwrap();
        db.open(V1).await.unwrap();

        assert!(db.has(V1).await.unwrap());
        assert_eq!(db.keys().await.unwrap(), vec![V1.to_string()]);
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (request, response) = asset("index.html");

        db.put(V1, &request, response.clone()).await.unwrap();

        let found = db.match_request(V1, &request).await.unwrap().unwrap();
        assert_eq!(found, response);
        assert!(db.has(V1).await.unwrap());
    }

    #[tokio::test]
    async fn test_match_is_scoped_to_store() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (request, response) = asset("index.html");
        db.put(V1, &request, response).await.unwrap();

        assert!(db.match_request(V2, &request).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (request, first) = asset("index.html");
        let second = Response::new(200, request.url.clone(), "newer");

        db.put(V1, &request, first).await.unwrap();
        db.put(V1, &request, second.clone()).await.unwrap();

        let found = db.match_request(V1, &request).await.unwrap().unwrap();
        assert_eq!(found.into_body(), second.into_body());
        assert_eq!(db.entries(V1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let request = Request::new("POST", "http://localhost:8080/video-reverser/upload");
        let response = Response::new(200, request.url.clone(), "");

        let result = db.put(V1, &request, response).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!db.has(V1).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_all_is_atomic() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let post = Request::new("POST", "http://localhost:8080/video-reverser/x");
        let batch = vec![asset("index.html"), (post.clone(), Response::new(200, post.url.clone(), ""))];

        assert!(db.put_all(V1, batch).await.is_err());
        assert!(db.entries(V1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_all_and_entries_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let batch = vec![asset("index.html"), asset("manifest.json"), asset("icons/icon-72x72.png")];
        let expected: Vec<Request> = batch.iter().map(|(r, _)| r.clone()).collect();

        db.put_all(V1, batch).await.unwrap();

        assert_eq!(db.entries(V1).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_delete_cascades_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let (request, response) = asset("index.html");
        db.put(V1, &request, response.clone()).await.unwrap();
        db.put(V2, &request, response).await.unwrap();

        assert!(db.delete(V1).await.unwrap());
        assert!(!db.delete(V1).await.unwrap());

        assert_eq!(db.keys().await.unwrap(), vec![V2.to_string()]);
        assert!(db.entries(V1).await.unwrap().is_empty());
        assert!(db.match_request(V2, &request).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_in_creation_order() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.open(V2).await.unwrap();
        db.open(V1).await.unwrap();
        assert_eq!(db.keys().await.unwrap(), vec![V2.to_string(), V1.to_string()]);
    }
}
