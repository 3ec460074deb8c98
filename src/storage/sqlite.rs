use crate::model::StorageError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

/// One finalized price of a catalog row at a storefront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceObservation {
    pub storefront: String,
    pub catalog_key: String,
    pub price_raw: String,
    pub price_value: Option<u64>,
    pub url: String,
    pub observed_at: DateTime<Utc>,
}

pub struct PriceHistory {
    conn: Connection,
}

impl PriceHistory {
    /// Opens the database file and creates the schema if needed.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                storefront TEXT NOT NULL,
                catalog_key TEXT NOT NULL,
                price_raw TEXT NOT NULL,
                url TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_observations_row
                ON observations (storefront, catalog_key, observed_at);
            ",
        )?;

        ensure_price_value_column(&conn)?;

        Ok(Self { conn })
    }

    pub fn record(&self, observation: &PriceObservation) -> Result<(), StorageError> {
        let price_value = observation
            .price_value
            .map(i64::try_from)
            .transpose()
            .map_err(|_| StorageError::InvalidValue(format!("price out of range: {}", observation.price_raw)))?;

        self.conn.execute(
            "INSERT INTO observations (storefront, catalog_key, price_raw, price_value, url, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &observation.storefront,
                &observation.catalog_key,
                &observation.price_raw,
                price_value,
                &observation.url,
                // Fixed-width timestamps keep text ordering chronological.
                &observation.observed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    /// Most recent observation of a row at a storefront.
    pub fn previous(&self, storefront: &str, catalog_key: &str) -> Result<Option<PriceObservation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT storefront, catalog_key, price_raw, price_value, url, observed_at
             FROM observations WHERE storefront = ?1 AND catalog_key = ?2
             ORDER BY observed_at DESC, id DESC LIMIT 1",
        )?;

        let mut rows = stmt.query(params![storefront, catalog_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::map_observation(row)?)),
            None => Ok(None),
        }
    }

    /// Every observation of a row, oldest first.
    pub fn history(&self, storefront: &str, catalog_key: &str) -> Result<Vec<PriceObservation>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT storefront, catalog_key, price_raw, price_value, url, observed_at
             FROM observations WHERE storefront = ?1 AND catalog_key = ?2
             ORDER BY observed_at ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![storefront, catalog_key], Self::map_observation)?;
        let mut observations = Vec::new();
        for row in rows {
            observations.push(row?);
        }
        Ok(observations)
    }

    /// Lowest parsed price ever seen for a row at a storefront.
    pub fn lowest(&self, storefront: &str, catalog_key: &str) -> Result<Option<PriceObservation>, StorageError> {
        Ok(self
            .history(storefront, catalog_key)?
            .into_iter()
            .filter(|o| o.price_value.is_some())
            .min_by_key(|o| o.price_value))
    }

    fn map_observation(row: &Row) -> Result<PriceObservation, rusqlite::Error> {
        let observed_at_str: String = row.get(5)?;
        let observed_at = DateTime::parse_from_rfc3339(&observed_at_str)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        let price_value: Option<i64> = row.get(3)?;

        Ok(PriceObservation {
            storefront: row.get(0)?,
            catalog_key: row.get(1)?,
            price_raw: row.get(2)?,
            price_value: price_value.and_then(|v| u64::try_from(v).ok()),
            url: row.get(4)?,
            observed_at,
        })
    }
}

/// Observation tables written before parsed prices were stored lack `price_value`.
fn ensure_price_value_column(conn: &Connection) -> Result<(), StorageError> {
    let present = conn
        .prepare("SELECT 1 FROM pragma_table_info('observations') WHERE name = 'price_value'")?
        .exists([])?;
    if !present {
        conn.execute("ALTER TABLE observations ADD COLUMN price_value INTEGER", [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn observation(price: &str, value: Option<u64>, at: DateTime<Utc>) -> PriceObservation {
        PriceObservation {
            storefront: "mysurface".into(),
            catalog_key: "surface pro 11|ultra 7|16gb|512gb|platinum".into(),
            price_raw: price.into(),
            price_value: value,
            url: "https://mysurface.ir/p/11".into(),
            observed_at: at,
        }
    }

    #[test]
    fn test_previous_returns_latest() {
        let history = PriceHistory::in_memory().unwrap();
        let key = "surface pro 11|ultra 7|16gb|512gb|platinum";
        assert_eq!(history.previous("mysurface", key).unwrap(), None);

        let now = Utc::now();
        history.record(&observation("52000000", Some(52_000_000), now - Duration::days(1))).unwrap();
        history.record(&observation("49500000", Some(49_500_000), now)).unwrap();

        let latest = history.previous("mysurface", key).unwrap().unwrap();
        assert_eq!(latest.price_value, Some(49_500_000));
        assert_eq!(history.history("mysurface", key).unwrap().len(), 2);
        assert_eq!(history.previous("parsanme", key).unwrap(), None);
    }

    #[test]
    fn test_lowest_ignores_unparsed_prices() {
        let history = PriceHistory::in_memory().unwrap();
        let key = "surface pro 11|ultra 7|16gb|512gb|platinum";
        let now = Utc::now();
        history.record(&observation("49500000", Some(49_500_000), now - Duration::days(2))).unwrap();
        history.record(&observation("تماس بگیرید", None, now - Duration::days(1))).unwrap();
        history.record(&observation("52000000", Some(52_000_000), now)).unwrap();

        let lowest = history.lowest("mysurface", key).unwrap().unwrap();
        assert_eq!(lowest.price_value, Some(49_500_000));
        assert_eq!(history.lowest("parsanme", key).unwrap(), None);
    }

    #[test]
    fn test_old_database_gains_price_value_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE observations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    storefront TEXT NOT NULL,
                    catalog_key TEXT NOT NULL,
                    price_raw TEXT NOT NULL,
                    url TEXT NOT NULL,
                    observed_at TEXT NOT NULL
                );",
            )
            .unwrap();

        let history = PriceHistory::new(path.to_str().unwrap()).unwrap();
        history.record(&observation("52000000", Some(52_000_000), Utc::now())).unwrap();
        let stored = history
            .previous("mysurface", "surface pro 11|ultra 7|16gb|512gb|platinum")
            .unwrap()
            .unwrap();
        assert_eq!(stored.price_value, Some(52_000_000));

        // Reopening must not try to add the column twice.
        PriceHistory::new(path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn test_unparsed_price_is_kept_raw() {
        let history = PriceHistory::in_memory().unwrap();
        history.record(&observation("تماس بگیرید", None, Utc::now())).unwrap();
        let stored = history
            .previous("mysurface", "surface pro 11|ultra 7|16gb|512gb|platinum")
            .unwrap()
            .unwrap();
        assert_eq!(stored.price_raw, "تماس بگیرید");
        assert_eq!(stored.price_value, None);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let path = path.to_str().unwrap();
        PriceHistory::new(path)
            .unwrap()
            .record(&observation("52000000", Some(52_000_000), Utc::now()))
            .unwrap();

        let reopened = PriceHistory::new(path).unwrap();
        assert!(reopened
            .previous("mysurface", "surface pro 11|ultra 7|16gb|512gb|platinum")
            .unwrap()
            .is_some());
    }
}
