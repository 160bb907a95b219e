//! [`SqliteStore`], the SQLite implementation of [`DripStore`].

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use dripflow_core::{
  clock::{Clock, SystemClock},
  event::{Event, EventUpdate, NewEvent},
  reference::Reference,
  store::DripStore,
  stream::{NewStream, Stream, StreamUpdate},
  subscription::Subscription,
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, RawEvent, RawStream, RawSubscription, STREAM_COLUMNS,
    SUBSCRIPTION_COLUMNS, encode_dt, encode_unlock_mode, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Dripflow store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  clock: Arc<dyn Clock>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, clock: Arc::new(SystemClock) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Stamp `created_at`/`updated_at` from `clock` instead of the wall clock.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    debug!("schema initialised");
    Ok(())
  }

  /// Shared body of the two subscription writes. `on_conflict` is the
  /// `ON CONFLICT` action for the subscription triple.
  async fn write_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
    on_conflict: &'static str,
  ) -> Result<Subscription> {
    let now_str         = encode_dt(self.clock.now());
    let id_str          = encode_uuid(Uuid::new_v4());
    let stream_str      = encode_uuid(stream_id);
    let subscriber_type = subscriber.kind.clone();
    let subscriber_id   = subscriber.id;
    let joined_str      = encode_dt(joined_at);

    let insert_sql = format!(
      "INSERT INTO drip_subscriptions (
         subscription_id, subscriber_type, subscriber_id, stream_id,
         joined_at, created_at, updated_at
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
       ON CONFLICT (subscriber_type, subscriber_id, stream_id) {on_conflict}"
    );
    let select_sql = format!(
      "SELECT {SUBSCRIPTION_COLUMNS} FROM drip_subscriptions
       WHERE subscriber_type = ?1 AND subscriber_id = ?2 AND stream_id = ?3"
    );

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !stream_exists(&tx, &stream_str)? {
          return Ok(None);
        }
        tx.execute(
          &insert_sql,
          rusqlite::params![
            id_str,
            subscriber_type,
            subscriber_id,
            stream_str,
            joined_str,
            now_str,
          ],
        )?;
        let raw = tx.query_row(
          &select_sql,
          rusqlite::params![subscriber_type, subscriber_id, stream_str],
          RawSubscription::from_row,
        )?;
        tx.commit()?;
        Ok(Some(raw))
      })
      .await?;

    raw
      .ok_or(dripflow_core::Error::StreamNotFound(stream_id))?
      .into_subscription()
  }
}

fn stream_exists(
  conn: &rusqlite::Connection,
  stream_id: &str,
) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM drip_streams WHERE stream_id = ?1",
        rusqlite::params![stream_id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

// ─── DripStore impl ──────────────────────────────────────────────────────────

impl DripStore for SqliteStore {
  type Error = Error;

  // ── Streams ───────────────────────────────────────────────────────────────

  async fn create_stream(&self, input: NewStream) -> Result<Stream> {
    input.validate()?;
    let now = self.clock.now();
    let stream = Stream {
      stream_id:   Uuid::new_v4(),
      origin:      input.origin,
      is_public:   input.is_public,
      unlock_mode: input.unlock_mode,
      start_date:  input.start_date,
      is_active:   input.is_active,
      created_at:  now,
      updated_at:  now,
    };

    let id_str      = encode_uuid(stream.stream_id);
    let origin_type = stream.origin.kind.clone();
    let origin_id   = stream.origin.id;
    let is_public   = stream.is_public;
    let mode_str    = encode_unlock_mode(stream.unlock_mode);
    let start_str   = stream.start_date.map(encode_dt);
    let is_active   = stream.is_active;
    let now_str     = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO drip_streams (
             stream_id, origin_type, origin_id, is_public, unlock_mode,
             start_date, is_active, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          rusqlite::params![
            id_str,
            origin_type,
            origin_id,
            is_public,
            mode_str,
            start_str,
            is_active,
            now_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    debug!(stream_id = %stream.stream_id, origin = %stream.origin, mode = %stream.unlock_mode, "created stream");
    Ok(stream)
  }

  async fn update_stream(
    &self,
    stream_id: Uuid,
    update: StreamUpdate,
  ) -> Result<Stream> {
    let current = self
      .get_stream(stream_id)
      .await?
      .ok_or(dripflow_core::Error::StreamNotFound(stream_id))?;
    let next = update.apply(&current, self.clock.now())?;

    let id_str      = encode_uuid(stream_id);
    let is_public   = next.is_public;
    let mode_str    = encode_unlock_mode(next.unlock_mode);
    let start_str   = next.start_date.map(encode_dt);
    let is_active   = next.is_active;
    let updated_str = encode_dt(next.updated_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE drip_streams
           SET is_public = ?2, unlock_mode = ?3, start_date = ?4,
               is_active = ?5, updated_at = ?6
           WHERE stream_id = ?1",
          rusqlite::params![
            id_str,
            is_public,
            mode_str,
            start_str,
            is_active,
            updated_str,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(dripflow_core::Error::StreamNotFound(stream_id).into());
    }
    debug!(stream_id = %stream_id, "updated stream");
    Ok(next)
  }

  async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
    let id_str = encode_uuid(stream_id);
    let sql =
      format!("SELECT {STREAM_COLUMNS} FROM drip_streams WHERE stream_id = ?1");

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawStream::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStream::into_stream).transpose()
  }

  async fn get_stream_by_origin(
    &self,
    origin: &Reference,
  ) -> Result<Option<Stream>> {
    let origin_type = origin.kind.clone();
    let origin_id = origin.id;
    let sql = format!(
      "SELECT {STREAM_COLUMNS} FROM drip_streams
       WHERE origin_type = ?1 AND origin_id = ?2
       ORDER BY rowid LIMIT 1"
    );

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![origin_type, origin_id],
              RawStream::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStream::into_stream).transpose()
  }

  async fn delete_stream(&self, stream_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(stream_id);

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM drip_streams WHERE stream_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    if deleted > 0 {
      debug!(stream_id = %stream_id, "deleted stream");
    }
    Ok(deleted > 0)
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn add_event(&self, input: NewEvent) -> Result<Event> {
    let now = self.clock.now();
    let event = Event {
      event_id:        Uuid::new_v4(),
      stream_id:       input.stream_id,
      content:         input.content,
      offset_interval: input.offset_interval,
      is_visible:      input.is_visible,
      created_at:      now,
      updated_at:      now,
    };

    let id_str         = encode_uuid(event.event_id);
    let stream_str     = encode_uuid(event.stream_id);
    let eventable_type = event.content.kind.clone();
    let eventable_id   = event.content.id;
    let offset         = event.offset_interval.clone();
    let is_visible     = event.is_visible;
    let now_str        = encode_dt(now);

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !stream_exists(&tx, &stream_str)? {
          return Ok(false);
        }
        tx.execute(
          "INSERT INTO drip_events (
             event_id, stream_id, eventable_type, eventable_id,
             offset_interval, is_visible, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          rusqlite::params![
            id_str,
            stream_str,
            eventable_type,
            eventable_id,
            offset,
            is_visible,
            now_str,
          ],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(dripflow_core::Error::StreamNotFound(event.stream_id).into());
    }
    Ok(event)
  }

  async fn update_event(&self, event_id: Uuid, update: EventUpdate) -> Result<Event> {
    let current = self
      .get_event(event_id)
      .await?
      .ok_or(dripflow_core::Error::EventNotFound(event_id))?;
    let next = update.apply(&current, self.clock.now());

    let id_str      = encode_uuid(event_id);
    let offset      = next.offset_interval.clone();
    let is_visible  = next.is_visible;
    let updated_str = encode_dt(next.updated_at);

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE drip_events
           SET offset_interval = ?2, is_visible = ?3, updated_at = ?4
           WHERE event_id = ?1",
          rusqlite::params![id_str, offset, is_visible, updated_str],
        )?)
      })
      .await?;

    if changed == 0 {
      return Err(dripflow_core::Error::EventNotFound(event_id).into());
    }
    Ok(next)
  }

  async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
    let id_str = encode_uuid(event_id);
    let sql = format!("SELECT {EVENT_COLUMNS} FROM drip_events WHERE event_id = ?1");

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawEvent::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }

  async fn list_visible_events(&self, stream_id: Uuid) -> Result<Vec<Event>> {
    let stream_str = encode_uuid(stream_id);
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM drip_events
       WHERE stream_id = ?1 AND is_visible = 1
       ORDER BY rowid"
    );

    let rows: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![stream_str], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawEvent::into_event).collect()
  }

  // ── Subscriptions ─────────────────────────────────────────────────────────

  async fn find_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
  ) -> Result<Option<Subscription>> {
    let subscriber_type = subscriber.kind.clone();
    let subscriber_id = subscriber.id;
    let stream_str = encode_uuid(stream_id);
    let sql = format!(
      "SELECT {SUBSCRIPTION_COLUMNS} FROM drip_subscriptions
       WHERE subscriber_type = ?1 AND subscriber_id = ?2 AND stream_id = ?3"
    );

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &sql,
              rusqlite::params![subscriber_type, subscriber_id, stream_str],
              RawSubscription::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubscription::into_subscription).transpose()
  }

  async fn insert_subscription_if_absent(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<Subscription> {
    self
      .write_subscription(subscriber, stream_id, joined_at, "DO NOTHING")
      .await
  }

  async fn upsert_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
    joined_at: DateTime<Utc>,
  ) -> Result<Subscription> {
    self
      .write_subscription(
        subscriber,
        stream_id,
        joined_at,
        "DO UPDATE SET joined_at = excluded.joined_at, \
         updated_at = excluded.updated_at",
      )
      .await
  }

  async fn delete_subscription(
    &self,
    subscriber: &Reference,
    stream_id: Uuid,
  ) -> Result<u64> {
    let subscriber_type = subscriber.kind.clone();
    let subscriber_id = subscriber.id;
    let stream_str = encode_uuid(stream_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM drip_subscriptions
           WHERE subscriber_type = ?1 AND subscriber_id = ?2 AND stream_id = ?3",
          rusqlite::params![subscriber_type, subscriber_id, stream_str],
        )?)
      })
      .await?;

    Ok(removed as u64)
  }

  async fn list_subscriptions(
    &self,
    subscriber: &Reference,
  ) -> Result<Vec<Subscription>> {
    let subscriber_type = subscriber.kind.clone();
    let subscriber_id = subscriber.id;
    let sql = format!(
      "SELECT {SUBSCRIPTION_COLUMNS} FROM drip_subscriptions
       WHERE subscriber_type = ?1 AND subscriber_id = ?2
       ORDER BY rowid"
    );

    let rows: Vec<RawSubscription> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![subscriber_type, subscriber_id],
            RawSubscription::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawSubscription::into_subscription).collect()
  }
}
