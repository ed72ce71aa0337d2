//! SQLite-backed observation store.
//!
//! One connection sits behind one mutex, so every operation runs alone just
//! like in the in-memory store. Work happens on tokio's blocking pool; when
//! the caller stops waiting (timeout or dropped future) the running statement
//! is interrupted and the call reports [`StoreError::Cancelled`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::{params, Connection, InterruptHandle, OptionalExtension, Row};
use tracing::{error, info};

use super::{ObservationStore, StoreError, StoreResult};
use crate::model::{Location, Observation, Wind};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// AUTOINCREMENT keeps deleted ids from ever being handed out again.
const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS weather (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp      TEXT    NOT NULL,
    latitude       REAL    NOT NULL,
    longitude      REAL    NOT NULL,
    city           TEXT    NOT NULL,
    country        TEXT    NOT NULL,
    temperature    REAL    NOT NULL,
    humidity       REAL    NOT NULL,
    pressure       REAL    NOT NULL,
    wind_speed     REAL    NOT NULL,
    wind_direction REAL    NOT NULL,
    weather_status TEXT    NOT NULL
);";

const COLUMNS: &str = "id, timestamp, latitude, longitude, city, country, temperature, \
    humidity, pressure, wind_speed, wind_direction, weather_status";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    interrupt: Arc<InterruptHandle>,
    timeout: Duration,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref();
        let started_at = Instant::now();
        info!(event = "db_open", mode = "file", path = %path.display(), "opening weather database");
        let conn = Connection::open(path).and_then(bootstrap);
        Self::finish_open(conn, "file", started_at, timeout)
    }

    pub fn open_in_memory(timeout: Duration) -> StoreResult<Self> {
        let started_at = Instant::now();
        info!(event = "db_open", mode = "memory", "opening weather database");
        let conn = Connection::open_in_memory().and_then(bootstrap);
        Self::finish_open(conn, "memory", started_at, timeout)
    }

    fn finish_open(
        conn: rusqlite::Result<Connection>,
        mode: &'static str,
        started_at: Instant,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match conn {
            Ok(conn) => {
                info!(event = "db_open", mode, duration_ms = elapsed_ms, "weather database ready");
                let interrupt = Arc::new(conn.get_interrupt_handle());
                Ok(Self { conn: Arc::new(Mutex::new(conn)), interrupt, timeout })
            }
            Err(err) => {
                error!(event = "db_open", mode, duration_ms = elapsed_ms, error = %err, "failed to open weather database");
                Err(err.into())
            }
        }
    }

    /// Runs `op` against the connection on the blocking pool, bounded by the
    /// configured timeout.
    async fn call<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let call = Arc::new(CallState::default());
        let guard = CancelOnDrop { call: Arc::clone(&call), interrupt: Arc::clone(&self.interrupt) };

        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
            if !call.start() {
                return Err(StoreError::Cancelled);
            }
            let result = op(&conn);
            // still holding the connection, so a late interrupt cannot hit the next caller
            call.finish();
            result
        });

        let outcome = tokio::time::timeout(self.timeout, task).await;
        drop(guard);
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Unavailable(format!("storage worker failed: {join_err}"))),
            Err(_) => Err(StoreError::Cancelled),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Running,
    Finished,
    Cancelled,
}

#[derive(Debug)]
struct CallState {
    phase: Mutex<Phase>,
}

impl Default for CallState {
    fn default() -> Self {
        Self { phase: Mutex::new(Phase::Pending) }
    }
}

impl CallState {
    fn start(&self) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Cancelled {
            return false;
        }
        *phase = Phase::Running;
        true
    }

    fn finish(&self) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if *phase == Phase::Running {
            *phase = Phase::Finished;
        }
    }

    fn cancel(&self, interrupt: &InterruptHandle) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        match *phase {
            Phase::Pending => *phase = Phase::Cancelled,
            Phase::Running => {
                interrupt.interrupt();
                *phase = Phase::Cancelled;
            }
            Phase::Finished | Phase::Cancelled => {}
        }
    }
}

/// Cancels the associated call unless it already finished.
struct CancelOnDrop {
    call: Arc<CallState>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.call.cancel(&self.interrupt);
    }
}

fn bootstrap(conn: Connection) -> rusqlite::Result<Connection> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}

fn parse_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get("id")?,
        timestamp: row.get("timestamp")?,
        location: Location {
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
            city: row.get("city")?,
            country: row.get("country")?,
        },
        temperature: row.get("temperature")?,
        humidity: row.get("humidity")?,
        pressure: row.get("pressure")?,
        wind: Wind {
            speed: row.get("wind_speed")?,
            direction: row.get("wind_direction")?,
        },
        weather_status: row.get("weather_status")?,
    })
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn add(&self, ob: Observation) -> StoreResult<i64> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO weather (
                    timestamp, latitude, longitude, city, country, temperature,
                    humidity, pressure, wind_speed, wind_direction, weather_status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
                params![
                    ob.timestamp,
                    ob.location.latitude,
                    ob.location.longitude,
                    ob.location.city,
                    ob.location.country,
                    ob.temperature,
                    ob.humidity,
                    ob.pressure,
                    ob.wind.speed,
                    ob.wind.direction,
                    ob.weather_status,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    async fn get(&self, id: i64) -> StoreResult<Observation> {
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM weather WHERE id = ?1;"),
                [id],
                parse_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn update(&self, ob: Observation) -> StoreResult<()> {
        self.call(move |conn| {
            let changed = conn.execute(
                "UPDATE weather
                 SET
                    timestamp = ?1,
                    latitude = ?2,
                    longitude = ?3,
                    city = ?4,
                    country = ?5,
                    temperature = ?6,
                    humidity = ?7,
                    pressure = ?8,
                    wind_speed = ?9,
                    wind_direction = ?10,
                    weather_status = ?11
                 WHERE id = ?12;",
                params![
                    ob.timestamp,
                    ob.location.latitude,
                    ob.location.longitude,
                    ob.location.city,
                    ob.location.country,
                    ob.temperature,
                    ob.humidity,
                    ob.pressure,
                    ob.wind.speed,
                    ob.wind.direction,
                    ob.weather_status,
                    ob.id,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(ob.id));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: i64) -> StoreResult<Observation> {
        self.call(move |conn| {
            conn.query_row(
                &format!("DELETE FROM weather WHERE id = ?1 RETURNING {COLUMNS};"),
                [id],
                parse_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<Observation>> {
        self.call(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM weather ORDER BY id ASC;"))?;
            let rows = stmt.query_map([], parse_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
        .await
    }
}
