//! MBTiles archive source.
//!
//! Tiles are addressed in TMS order inside the archive, so the row is
//! flipped on every lookup. Tile blobs are usually gzip-compressed.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::{Number, Value as JsonValue};
use tracing::{debug, info};

use super::http::inflate;
use super::{BoxFuture, FetchedTile, RequestContext, SourceError, TileJson, TileSource};
use crate::coord::TileCoord;

/// Metadata keys holding integers.
const NUMERIC_KEYS: &[&str] = &["minzoom", "maxzoom"];

/// Metadata keys holding comma-separated numbers.
const LIST_KEYS: &[&str] = &["bounds", "center"];

impl From<rusqlite::Error> for SourceError {
    fn from(e: rusqlite::Error) -> Self {
        SourceError::unavailable(format!("MBTiles query failed: {}", e))
    }
}

/// Read-only MBTiles archive.
///
/// One connection, shared behind a mutex; queries run on the blocking pool.
pub struct MbtilesSource {
    name: String,
    conn: Arc<Mutex<Connection>>,
    metadata: TileJson,
}

impl MbtilesSource {
    /// Opens an archive and reads its metadata table.
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let name = name.into();
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            SourceError::InvalidConfig(format!("cannot open MBTiles {}: {}", path.display(), e))
        })?;

        let metadata = read_metadata(&conn)?;
        info!(source = %name, path = %path.display(), "Opened MBTiles archive");

        Ok(Self {
            name,
            conn: Arc::new(Mutex::new(conn)),
            metadata,
        })
    }

    fn read_tile(conn: &Connection, coord: TileCoord) -> Result<Option<Vec<u8>>, SourceError> {
        let blob = conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![coord.z, coord.x, coord.tms_y()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }
}

fn read_metadata(conn: &Connection) -> Result<TileJson, SourceError> {
    let mut stmt = conn.prepare("SELECT name, value FROM metadata")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut document = TileJson::new();
    for row in rows {
        let (key, value) = row?;
        if key == "json" {
            // Vector layer descriptions live in an embedded JSON object
            if let Ok(JsonValue::Object(extra)) = serde_json::from_str::<JsonValue>(&value) {
                document.extend(extra);
            }
        } else if NUMERIC_KEYS.contains(&key.as_str()) {
            let number = value
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .unwrap_or(JsonValue::String(value));
            document.insert(key, number);
        } else if LIST_KEYS.contains(&key.as_str()) {
            let numbers: Option<Vec<JsonValue>> = value
                .split(',')
                .map(|n| {
                    n.trim()
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .map(JsonValue::Number)
                })
                .collect();
            document.insert(key, numbers.map(JsonValue::Array).unwrap_or(JsonValue::String(value)));
        } else {
            document.insert(key, JsonValue::String(value));
        }
    }
    Ok(document)
}

impl TileSource for MbtilesSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tile<'a>(
        &'a self,
        coord: TileCoord,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Option<FetchedTile>, SourceError>> {
        Box::pin(async move {
            let conn = Arc::clone(&self.conn);
            let blob = tokio::task::spawn_blocking(move || Self::read_tile(&conn.lock(), coord))
                .await
                .map_err(|e| SourceError::unavailable(format!("MBTiles task failed: {}", e)))??;

            match blob {
                Some(blob) => Ok(Some(FetchedTile::decode(inflate(Bytes::from(blob))?)?)),
                None => {
                    debug!(source = %self.name, tile = %coord, "No tile in archive");
                    Ok(None)
                }
            }
        })
    }

    fn tile_metadata<'a>(&'a self, _ctx: &'a RequestContext) -> BoxFuture<'a, Result<TileJson, SourceError>> {
        Box::pin(async move { Ok(self.metadata.clone()) })
    }
}
