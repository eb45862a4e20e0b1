use anyhow::Result;
use rusqlite::Connection;
use uuid::Uuid;

use swaphub_types::models::{DEFAULT_MAX_PARTICIPANTS, Participant, Session};
use swaphub_types::Error;

use crate::models::{ParticipantRow, SessionRow};
use crate::{now_ts, parse_ts, Database, OptionalExt};

impl Database {
    /// Create a collaborative session. The room id is trimmed and must be
    /// globally unique; the creator joins immediately as an active
    /// participant.
    pub fn create_session(
        &self,
        room_id: &str,
        title: &str,
        creator: Uuid,
        max_participants: Option<u32>,
        is_public: Option<bool>,
    ) -> Result<Session, Error> {
        let room_id = room_id.trim();
        if room_id.is_empty() {
            return Err(Error::validation("room id cannot be empty"));
        }

        let session_id = Uuid::new_v4();
        let session = self.with_conn(|conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE room_id = ?1)",
                [room_id],
                |row| row.get(0),
            )?;
            if taken {
                return Ok(None);
            }

            let now = now_ts();
            conn.execute(
                "INSERT INTO sessions
                    (id, room_id, title, created_by, created_at, max_participants, is_public)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    session_id.to_string(),
                    room_id,
                    title,
                    creator.to_string(),
                    now,
                    max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
                    is_public.unwrap_or(true),
                ],
            )?;
            conn.execute(
                "INSERT INTO session_participants (session_id, user_id, joined_at, is_active)
                 VALUES (?1, ?2, ?3, 1)",
                (session_id.to_string(), creator.to_string(), now),
            )?;

            load_session(conn, session_id)
        })?;

        session.ok_or_else(|| Error::conflict("a session with this room id already exists"))
    }

    /// Join a session. A returning participant is reactivated in place —
    /// never duplicated, and never bounced off the capacity check. The
    /// capacity check and the roster write share one connection hold, so
    /// two racing joins cannot both slip under the cap.
    pub fn join_session(&self, session_id: Uuid, user_id: Uuid) -> Result<Session, Error> {
        self.with_conn(|conn| {
            let Some(session) = load_session(conn, session_id)? else {
                return Ok(Err(Error::not_found("session not found")));
            };
            if !session.is_active {
                return Ok(Err(Error::validation("session is not active")));
            }

            let returning = session.participants.iter().any(|p| p.user_id == user_id);
            if !returning
                && session.active_participant_count() >= session.max_participants as usize
            {
                return Ok(Err(Error::conflict("max participants reached")));
            }

            if returning {
                conn.execute(
                    "UPDATE session_participants SET is_active = 1
                     WHERE session_id = ?1 AND user_id = ?2",
                    (session_id.to_string(), user_id.to_string()),
                )?;
            } else {
                conn.execute(
                    "INSERT INTO session_participants (session_id, user_id, joined_at, is_active)
                     VALUES (?1, ?2, ?3, 1)",
                    (session_id.to_string(), user_id.to_string(), now_ts()),
                )?;
            }

            let joined = load_session(conn, session_id)?
                .ok_or_else(|| anyhow::anyhow!("session vanished mid-join"))?;
            Ok(Ok(joined))
        })?
    }

    /// Deactivate a participant entry. History is retained, not removed.
    pub fn leave_session(&self, session_id: Uuid, user_id: Uuid) -> Result<Session, Error> {
        let session = self.get_session(session_id)?;
        if !session.participants.iter().any(|p| p.user_id == user_id) {
            return Err(Error::validation("user is not a participant of this session"));
        }

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE session_participants SET is_active = 0
                 WHERE session_id = ?1 AND user_id = ?2",
                (session_id.to_string(), user_id.to_string()),
            )?;
            Ok(())
        })?;

        self.get_session(session_id)
    }

    /// Checkpoint the canvas wholesale. Last writer wins; there is no merge
    /// and no version check. Only currently-active participants may save.
    pub fn save_canvas(&self, session_id: Uuid, user_id: Uuid, data: &str) -> Result<(), Error> {
        let session = self.get_session(session_id)?;
        if !session.is_active_participant(user_id) {
            return Err(Error::forbidden(
                "only an active participant can save the canvas",
            ));
        }

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET canvas_data = ?1 WHERE id = ?2",
                (data, session_id.to_string()),
            )?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_canvas(&self, session_id: Uuid) -> Result<Option<String>, Error> {
        // Existence check first so a missing session is NotFound, not None.
        self.get_session(session_id)?;
        self.with_conn(|conn| {
            let data: Option<String> = conn.query_row(
                "SELECT canvas_data FROM sessions WHERE id = ?1",
                [session_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(data)
        })
        .map_err(Error::from)
    }

    /// Remove a session and its roster. Creator-only.
    pub fn delete_session(&self, session_id: Uuid, caller: Uuid) -> Result<(), Error> {
        let session = self.get_session(session_id)?;
        if session.created_by != caller {
            return Err(Error::forbidden("only the creator can delete a session"));
        }

        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM session_participants WHERE session_id = ?1",
                [session_id.to_string()],
            )?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", [session_id.to_string()])?;
            Ok(())
        })?;
        Ok(())
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<Session, Error> {
        let session = self.with_conn(|conn| load_session(conn, session_id))?;
        session.ok_or_else(|| Error::not_found("session not found"))
    }

    pub fn get_session_by_room(&self, room_id: &str) -> Result<Session, Error> {
        let session = self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM sessions WHERE room_id = ?1",
                    [room_id.trim()],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => load_session(conn, id.parse()?),
                None => Ok(None),
            }
        })?;
        session.ok_or_else(|| Error::not_found("session not found"))
    }
}

fn load_session(conn: &Connection, session_id: Uuid) -> Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, room_id, title, created_by, created_at, canvas_data,
                is_active, max_participants, is_public
         FROM sessions WHERE id = ?1",
    )?;
    let row = stmt
        .query_row([session_id.to_string()], |row| {
            Ok(SessionRow {
                id: row.get(0)?,
                room_id: row.get(1)?,
                title: row.get(2)?,
                created_by: row.get(3)?,
                created_at: row.get(4)?,
                canvas_data: row.get(5)?,
                is_active: row.get(6)?,
                max_participants: row.get(7)?,
                is_public: row.get(8)?,
            })
        })
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id, joined_at, is_active FROM session_participants
         WHERE session_id = ?1 ORDER BY joined_at, user_id",
    )?;
    let participants = stmt
        .query_map([session_id.to_string()], |row| {
            Ok(ParticipantRow {
                user_id: row.get(0)?,
                joined_at: row.get(1)?,
                is_active: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|p| {
            Ok(Participant {
                user_id: p.user_id.parse()?,
                joined_at: parse_ts(&p.joined_at)?,
                is_active: p.is_active,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(Session {
        id: row.id.parse()?,
        room_id: row.room_id,
        title: row.title,
        created_by: row.created_by.parse()?,
        created_at: parse_ts(&row.created_at)?,
        participants,
        canvas_data: row.canvas_data,
        is_active: row.is_active,
        max_participants: row.max_participants,
        is_public: row.is_public,
    }))
}
