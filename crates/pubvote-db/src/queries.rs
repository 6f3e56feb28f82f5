use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Params, Transaction, TransactionBehavior, params};
use tracing::debug;

use pubvote_types::models::{NewRound, Round};

use crate::models::{ROUND_COLUMNS, RoundRow};
use crate::{Database, RoundStore, StoreError, VoteInsert};

/// Row is visible: never expires, or expires after `:now`.
const LIVE: &str = "(expires_at IS NULL OR expires_at > :now)";

impl RoundStore for Database {
    fn create_if_absent(&self, round: &NewRound) -> Result<Round, StoreError> {
        let now = Utc::now().timestamp();
        // An expired row is replaced in the same statement, as if the store had
        // already dropped it.
        let sql = format!(
            "INSERT INTO rounds (channel_id, owner_id, votes, expires_at)
             VALUES (:channel_id, :owner_id, '[]', :expires_at)
             ON CONFLICT(channel_id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 votes = '[]',
                 expires_at = excluded.expires_at,
                 created_at = datetime('now')
             WHERE rounds.expires_at IS NOT NULL AND rounds.expires_at <= :now
             RETURNING {ROUND_COLUMNS}"
        );

        self.with_conn(|conn| {
            let created = query_round(
                conn,
                &sql,
                rusqlite::named_params! {
                    ":channel_id": round.channel_id,
                    ":owner_id": round.owner_id,
                    ":expires_at": round.expires_at.map(|at| at.timestamp()),
                    ":now": now,
                },
            )?;
            created.ok_or(StoreError::AlreadyExists)
        })
    }

    fn read(&self, channel_id: &str) -> Result<Option<Round>, StoreError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            "SELECT {ROUND_COLUMNS} FROM rounds WHERE channel_id = :channel_id AND {LIVE}"
        );
        self.with_conn(|conn| {
            query_round(
                conn,
                &sql,
                rusqlite::named_params! { ":channel_id": channel_id, ":now": now },
            )
        })
    }

    fn append_vote(&self, channel_id: &str, user_id: &str) -> Result<Option<Round>, StoreError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            "UPDATE rounds SET votes = json_insert(votes, '$[#]', :user_id)
             WHERE channel_id = :channel_id AND {LIVE}
             RETURNING {ROUND_COLUMNS}"
        );
        self.with_conn(|conn| {
            query_round(
                conn,
                &sql,
                rusqlite::named_params! {
                    ":channel_id": channel_id,
                    ":user_id": user_id,
                    ":now": now,
                },
            )
        })
    }

    fn add_vote_if_absent(&self, channel_id: &str, user_id: &str) -> Result<VoteInsert, StoreError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            "UPDATE rounds SET votes = json_insert(votes, '$[#]', :user_id)
             WHERE channel_id = :channel_id AND {LIVE}
               AND NOT EXISTS (
                   SELECT 1 FROM json_each(rounds.votes) WHERE json_each.value = :user_id
               )
             RETURNING {ROUND_COLUMNS}"
        );

        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let added = query_round(
                &tx,
                &sql,
                rusqlite::named_params! {
                    ":channel_id": channel_id,
                    ":user_id": user_id,
                    ":now": now,
                },
            )?;

            let result = match added {
                Some(round) => VoteInsert::Added(round),
                // Nothing updated: either the vote is already there or there is no round
                None => match read_live(&tx, channel_id, now)? {
                    Some(round) => VoteInsert::AlreadyPresent(round),
                    None => VoteInsert::NoRound,
                },
            };

            tx.commit()?;
            Ok(result)
        })
    }

    fn replace_votes(
        &self,
        channel_id: &str,
        previous: &[String],
        votes: &[String],
    ) -> Result<Option<Round>, StoreError> {
        let now = Utc::now().timestamp();
        let previous = serde_json::to_string(previous)?;
        let votes = serde_json::to_string(votes)?;
        let sql = format!(
            "UPDATE rounds SET votes = :votes
             WHERE channel_id = :channel_id AND {LIVE}
               AND json(votes) = json(:previous)
             RETURNING {ROUND_COLUMNS}"
        );

        self.with_conn(|conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let replaced = query_round(
                &tx,
                &sql,
                rusqlite::named_params! {
                    ":channel_id": channel_id,
                    ":votes": votes,
                    ":previous": previous,
                    ":now": now,
                },
            )?;

            let result = match replaced {
                Some(round) => Ok(Some(round)),
                None => match read_live(&tx, channel_id, now)? {
                    Some(_) => Err(StoreError::StaleVotes),
                    None => Ok(None),
                },
            };

            tx.commit()?;
            result
        })
    }

    fn delete_if_owned_by(&self, channel_id: &str, owner_id: &str) -> Result<Round, StoreError> {
        let now = Utc::now().timestamp();
        let sql = format!(
            "DELETE FROM rounds
             WHERE channel_id = :channel_id AND {LIVE}
               AND (owner_id IS NULL OR owner_id = :owner_id)
             RETURNING {ROUND_COLUMNS}"
        );
        self.with_conn(|conn| {
            query_round(
                conn,
                &sql,
                rusqlite::named_params! {
                    ":channel_id": channel_id,
                    ":owner_id": owner_id,
                    ":now": now,
                },
            )?
            .ok_or(StoreError::NotOwner)
        })
    }

    fn delete(&self, channel_id: &str) -> Result<Option<Round>, StoreError> {
        let now = Utc::now();
        let sql = format!("DELETE FROM rounds WHERE channel_id = ?1 RETURNING {ROUND_COLUMNS}");
        let deleted = self.with_conn(|conn| query_round(conn, &sql, params![channel_id]))?;
        // An expired row is removed too, but it was already gone as far as callers know
        Ok(deleted.filter(|round| !round.is_expired(now)))
    }

    fn delete_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let count = self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM rounds WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )?)
        })?;
        debug!("Deleted {} expired rounds", count);
        Ok(count)
    }
}

fn read_live(conn: &Connection, channel_id: &str, now: i64) -> Result<Option<Round>, StoreError> {
    let sql = format!("SELECT {ROUND_COLUMNS} FROM rounds WHERE channel_id = :channel_id AND {LIVE}");
    query_round(
        conn,
        &sql,
        rusqlite::named_params! { ":channel_id": channel_id, ":now": now },
    )
}

fn query_round<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<Round>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row(params, RoundRow::from_row).optional()?;
    row.map(Round::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn new_round(channel_id: &str, owner_id: Option<&str>) -> NewRound {
        NewRound {
            channel_id: channel_id.to_string(),
            owner_id: owner_id.map(str::to_string),
            expires_at: None,
        }
    }

    fn votes(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn create_then_conflict() {
        let db = Database::open_in_memory().unwrap();

        let round = db.create_if_absent(&new_round("C1", Some("U1"))).unwrap();
        assert_eq!(round.channel_id, "C1");
        assert_eq!(round.owner_id.as_deref(), Some("U1"));
        assert!(round.votes.is_empty());

        let err = db.create_if_absent(&new_round("C1", Some("U2"))).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));
        assert!(err.is_conflict());

        // The first owner is untouched
        let stored = db.read("C1").unwrap().unwrap();
        assert_eq!(stored.owner_id.as_deref(), Some("U1"));

        // Other channels are independent
        db.create_if_absent(&new_round("C2", None)).unwrap();
    }

    #[test]
    fn read_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.read("nope").unwrap().is_none());
    }

    #[test]
    fn expired_round_is_absent_and_replaceable() {
        let db = Database::open_in_memory().unwrap();
        let mut stale = new_round("C1", Some("U1"));
        stale.expires_at = Some(Utc::now() - Duration::hours(1));
        db.create_if_absent(&stale).unwrap();
        db.append_vote("C1", "old").unwrap();

        assert!(db.read("C1").unwrap().is_none());
        assert_eq!(db.add_vote_if_absent("C1", "U2").unwrap(), VoteInsert::NoRound);
        assert!(matches!(db.delete_if_owned_by("C1", "U1"), Err(StoreError::NotOwner)));

        let mut fresh = new_round("C1", Some("U2"));
        fresh.expires_at = Some(Utc::now() + Duration::hours(1));
        let round = db.create_if_absent(&fresh).unwrap();
        assert_eq!(round.owner_id.as_deref(), Some("U2"));
        assert!(round.votes.is_empty());
        assert!(round.expires_at.is_some());
    }

    #[test]
    fn delete_expired_only_removes_stale_rows() {
        let db = Database::open_in_memory().unwrap();
        let mut stale = new_round("old", None);
        stale.expires_at = Some(Utc::now() - Duration::minutes(5));
        db.create_if_absent(&stale).unwrap();
        let mut live = new_round("live", None);
        live.expires_at = Some(Utc::now() + Duration::hours(2));
        db.create_if_absent(&live).unwrap();
        db.create_if_absent(&new_round("forever", None)).unwrap();

        assert_eq!(db.delete_expired().unwrap(), 1);
        assert_eq!(db.delete_expired().unwrap(), 0);
        assert!(db.read("live").unwrap().is_some());
        assert!(db.read("forever").unwrap().is_some());
    }

    #[test]
    fn append_vote_keeps_order_and_duplicates() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", None)).unwrap();

        db.append_vote("C1", "a").unwrap();
        db.append_vote("C1", "b").unwrap();
        let round = db.append_vote("C1", "a").unwrap().unwrap();
        assert_eq!(round.votes, votes(&["a", "b", "a"]));

        assert!(db.append_vote("missing", "a").unwrap().is_none());
    }

    #[test]
    fn add_vote_if_absent_suppresses_duplicates() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", None)).unwrap();

        let VoteInsert::Added(round) = db.add_vote_if_absent("C1", "a").unwrap() else {
            panic!("first vote should be added");
        };
        assert_eq!(round.votes, votes(&["a"]));

        let VoteInsert::AlreadyPresent(round) = db.add_vote_if_absent("C1", "a").unwrap() else {
            panic!("second vote should be rejected");
        };
        assert_eq!(round.votes, votes(&["a"]));

        db.add_vote_if_absent("C1", "b").unwrap();
        assert_eq!(db.read("C1").unwrap().unwrap().votes, votes(&["a", "b"]));
        assert_eq!(db.add_vote_if_absent("C2", "a").unwrap(), VoteInsert::NoRound);
    }

    #[test]
    fn user_ids_with_json_metacharacters() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", None)).unwrap();
        let odd = r#"U"1\x"#;

        assert!(matches!(db.add_vote_if_absent("C1", odd).unwrap(), VoteInsert::Added(_)));
        assert!(matches!(
            db.add_vote_if_absent("C1", odd).unwrap(),
            VoteInsert::AlreadyPresent(_)
        ));

        let round = db.read("C1").unwrap().unwrap();
        assert_eq!(round.votes, vec![odd.to_string()]);
        db.replace_votes("C1", &round.votes, &[]).unwrap();
    }

    #[test]
    fn replace_votes_detects_stale_snapshot() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", None)).unwrap();
        db.add_vote_if_absent("C1", "a").unwrap();
        db.add_vote_if_absent("C1", "b").unwrap();

        let snapshot = db.read("C1").unwrap().unwrap().votes;
        db.add_vote_if_absent("C1", "c").unwrap();

        let err = db.replace_votes("C1", &snapshot, &votes(&["b"])).unwrap_err();
        assert!(matches!(err, StoreError::StaleVotes));

        let current = db.read("C1").unwrap().unwrap().votes;
        let round = db
            .replace_votes("C1", &current, &votes(&["b", "c"]))
            .unwrap()
            .unwrap();
        assert_eq!(round.votes, votes(&["b", "c"]));

        assert!(db.replace_votes("missing", &[], &[]).unwrap().is_none());
    }

    #[test]
    fn delete_if_owned_by_checks_owner() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", Some("U1"))).unwrap();
        db.add_vote_if_absent("C1", "a").unwrap();

        assert!(matches!(db.delete_if_owned_by("C1", "U2"), Err(StoreError::NotOwner)));
        assert!(db.read("C1").unwrap().is_some());

        let last = db.delete_if_owned_by("C1", "U1").unwrap();
        assert_eq!(last.votes, votes(&["a"]));
        assert!(db.read("C1").unwrap().is_none());

        // Missing rows look the same as someone else's
        assert!(matches!(db.delete_if_owned_by("C1", "U1"), Err(StoreError::NotOwner)));
    }

    #[test]
    fn ownerless_round_can_be_ended_by_anyone() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", None)).unwrap();
        let last = db.delete_if_owned_by("C1", "anyone").unwrap();
        assert_eq!(last.owner_id, None);
    }

    #[test]
    fn unconditional_delete() {
        let db = Database::open_in_memory().unwrap();
        db.create_if_absent(&new_round("C1", Some("U1"))).unwrap();
        db.add_vote_if_absent("C1", "a").unwrap();

        let last = db.delete("C1").unwrap().unwrap();
        assert_eq!(last.votes, votes(&["a"]));
        assert!(db.delete("C1").unwrap().is_none());
        db.create_if_absent(&new_round("C1", Some("U2"))).unwrap();
    }

    fn db_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("rounds.db")
    }

    #[test]
    fn many_processes_open_a_fresh_file_at_once() {
        for _ in 0..10 {
            let dir = tempfile::tempdir().unwrap();
            let path = db_path(&dir);

            let opened: Vec<_> = std::thread::scope(|s| {
                let handles: Vec<_> = (0..8).map(|_| s.spawn(|| Database::open(&path))).collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let failures: Vec<String> = opened
                .iter()
                .filter_map(|r| r.as_ref().err().map(|e| e.to_string()))
                .collect();
            assert!(failures.is_empty(), "failed opens: {:?}", failures);

            let db = opened.into_iter().next().unwrap().unwrap();
            let version: i64 = db
                .with_conn(|conn| {
                    Ok(conn.query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))?)
                })
                .unwrap();
            assert_eq!(version, 1);
            db.create_if_absent(&new_round("C1", None)).unwrap();
        }
    }

    #[test]
    fn separate_handles_race_for_one_round() {
        let dir = tempfile::tempdir().unwrap();
        let first = Arc::new(Database::open(&db_path(&dir)).unwrap());
        let second = Arc::new(Database::open(&db_path(&dir)).unwrap());

        let results: Vec<_> = std::thread::scope(|s| {
            let a = s.spawn(|| first.create_if_absent(&new_round("C1", Some("U1"))));
            let b = s.spawn(|| second.create_if_absent(&new_round("C1", Some("U2"))));
            vec![a.join().unwrap(), b.join().unwrap()]
        });

        let created = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::AlreadyExists)))
            .count();
        assert_eq!((created, conflicts), (1, 1));
    }

    #[test]
    fn separate_handles_never_duplicate_a_vote() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..4).map(|_| Database::open(&db_path(&dir)).unwrap()).collect();
        handles[0].create_if_absent(&new_round("C1", None)).unwrap();

        std::thread::scope(|s| {
            for db in &handles {
                s.spawn(move || {
                    for _ in 0..10 {
                        db.add_vote_if_absent("C1", "U1").unwrap();
                    }
                });
            }
        });

        assert_eq!(handles[0].read("C1").unwrap().unwrap().votes, votes(&["U1"]));
    }
}
