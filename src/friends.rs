//! Friend-request state machine. A pair of users holds at most one edge,
//! stored on the canonicalized (user_lo, user_hi) row; every transition is a
//! single conditional statement so concurrent callers serialize on that row.

use chrono::{NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{delete as diesel_delete, insert_into, select, update as diesel_update};

use crate::db::schema::friend_edges;
use crate::types::{ApiError, Conflict, ValidationError};

/// Canonical unordered user pair, `lo < hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairKey {
    pub lo: i32,
    pub hi: i32,
}

impl PairKey {
    pub fn new(a: i32, b: i32) -> Result<PairKey, ApiError> {
        if a == b {
            return Err(ValidationError::from("user", "cannot befriend yourself").into());
        }
        if a < b {
            Ok(PairKey { lo: a, hi: b })
        } else {
            Ok(PairKey { lo: b, hi: a })
        }
    }
}

/// Relationship of a pair; absence of an edge is the `None` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendState {
    Pending { requester: i32 },
    Accepted,
}

/// What sending a request does to the current pair state.
pub fn request_transition(
    current: Option<FriendState>,
    caller: i32,
) -> Result<FriendState, ApiError> {
    match current {
        None => Ok(FriendState::Pending { requester: caller }),
        Some(FriendState::Pending { .. }) => Err(Conflict::AlreadyPending.into()),
        Some(FriendState::Accepted) => Err(Conflict::AlreadyFriends.into()),
    }
}

/// Recipient-only acceptance: the pending edge must have been requested by
/// `target`, which makes the caller the recipient.
pub fn accept_transition(
    current: Option<FriendState>,
    target: i32,
) -> Result<FriendState, ApiError> {
    match current {
        Some(FriendState::Pending { requester }) if requester == target => {
            Ok(FriendState::Accepted)
        }
        _ => Err(Conflict::NoSuchRequest.into()),
    }
}

/// Unfriend and decline are one operation: any edge goes away.
pub fn unfriend_transition(current: Option<FriendState>) -> Result<(), ApiError> {
    match current {
        Some(_) => Ok(()),
        None => Err(Conflict::NoRelationship.into()),
    }
}

#[derive(Debug, Queryable, Identifiable)]
#[table_name = "friend_edges"]
pub struct FriendEdge {
    pub id: i32,
    pub user_lo: i32,
    pub user_hi: i32,
    pub requester_id: i32,
    pub accepted: bool,
    pub created_at: NaiveDateTime,
}

impl FriendEdge {
    pub fn state(&self) -> FriendState {
        if self.accepted {
            FriendState::Accepted
        } else {
            FriendState::Pending {
                requester: self.requester_id,
            }
        }
    }
}

pub fn load_edge(pair: PairKey, connection: &PgConnection) -> Result<Option<FriendEdge>, ApiError> {
    use crate::db::schema::friend_edges::dsl::*;
    friend_edges
        .filter(user_lo.eq(pair.lo))
        .filter(user_hi.eq(pair.hi))
        .first::<FriendEdge>(connection)
        .optional()
        .map_err(|e| e.into())
}

pub fn send_request(caller: i32, target: i32, connection: &PgConnection) -> Result<(), ApiError> {
    use crate::db::schema::friend_edges::dsl::*;

    let pair = PairKey::new(caller, target)?;
    let current = load_edge(pair, connection)?.map(|e| e.state());
    request_transition(current, caller)?;

    let inserted = insert_into(friend_edges)
        .values((
            user_lo.eq(pair.lo),
            user_hi.eq(pair.hi),
            requester_id.eq(caller),
            accepted.eq(false),
            created_at.eq(Utc::now().naive_utc()),
        ))
        .on_conflict((user_lo, user_hi))
        .do_nothing()
        .execute(connection)?;

    if inserted == 0 {
        // A concurrent writer claimed the pair between the read and the
        // insert; name the conflict against whatever is there now.
        let current = load_edge(pair, connection)?.map(|e| e.state());
        return match request_transition(current, caller) {
            Err(e) => Err(e),
            Ok(_) => Err(Conflict::AlreadyPending.into()),
        };
    }

    Ok(())
}

pub fn pending_request(
    caller: i32,
    target: i32,
    connection: &PgConnection,
) -> Result<FriendEdge, ApiError> {
    let pair = PairKey::new(caller, target)?;
    match load_edge(pair, connection)? {
        Some(ref edge) if edge.accepted => Err(ApiError::NotFound),
        Some(edge) => Ok(edge),
        None => Err(ApiError::NotFound),
    }
}

pub fn accept(caller: i32, target: i32, connection: &PgConnection) -> Result<(), ApiError> {
    use crate::db::schema::friend_edges::dsl::*;

    let pair = PairKey::new(caller, target)?;
    let current = load_edge(pair, connection)?.map(|e| e.state());
    accept_transition(current, target)?;

    // the update is predicated on the state the transition allowed; a racing
    // writer leaves zero rows behind
    let updated = diesel_update(
        friend_edges
            .filter(user_lo.eq(pair.lo))
            .filter(user_hi.eq(pair.hi))
            .filter(accepted.eq(false))
            .filter(requester_id.eq(target)),
    )
    .set(accepted.eq(true))
    .execute(connection)?;

    if updated == 0 {
        Err(Conflict::NoSuchRequest.into())
    } else {
        Ok(())
    }
}

pub fn unfriend(caller: i32, target: i32, connection: &PgConnection) -> Result<(), ApiError> {
    use crate::db::schema::friend_edges::dsl::*;

    let pair = PairKey::new(caller, target)?;
    let current = load_edge(pair, connection)?.map(|e| e.state());
    unfriend_transition(current)?;

    let removed = diesel_delete(
        friend_edges
            .filter(user_lo.eq(pair.lo))
            .filter(user_hi.eq(pair.hi)),
    )
    .execute(connection)?;

    if removed == 0 {
        Err(Conflict::NoRelationship.into())
    } else {
        Ok(())
    }
}

pub fn is_following(viewer: i32, target: i32, connection: &PgConnection) -> Result<bool, ApiError> {
    use crate::db::schema::friend_edges::dsl::*;

    if viewer == target {
        return Ok(false);
    }
    let pair = PairKey::new(viewer, target)?;
    let query = select(exists(
        friend_edges
            .filter(user_lo.eq(pair.lo))
            .filter(user_hi.eq(pair.hi))
            .filter(accepted.eq(true)),
    ));
    query.get_result::<bool>(connection).map_err(|e| e.into())
}

/// Ids of everyone sharing an accepted edge with `viewer`. Feed membership.
pub fn following_ids(viewer: i32, connection: &PgConnection) -> Result<Vec<i32>, ApiError> {
    use crate::db::schema::friend_edges::dsl::*;

    let edges = friend_edges
        .filter(accepted.eq(true))
        .filter(user_lo.eq(viewer).or(user_hi.eq(viewer)))
        .load::<FriendEdge>(connection)?;

    Ok(edges
        .into_iter()
        .map(|edge| {
            if edge.user_lo == viewer {
                edge.user_hi
            } else {
                edge.user_lo
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiError;

    const ALICE: i32 = 1;
    const BOB: i32 = 2;

    #[test]
    fn pair_key_is_canonical() {
        assert_eq!(PairKey::new(BOB, ALICE).unwrap(), PairKey { lo: 1, hi: 2 });
        assert_eq!(
            PairKey::new(ALICE, BOB).unwrap(),
            PairKey::new(BOB, ALICE).unwrap()
        );
    }

    #[test]
    fn self_reference_is_invalid_input() {
        assert!(matches!(
            PairKey::new(ALICE, ALICE),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn request_on_empty_pair_becomes_pending() {
        let next = request_transition(None, ALICE).unwrap();
        assert_eq!(next, FriendState::Pending { requester: ALICE });
    }

    #[test]
    fn duplicate_request_fails_loudly_from_either_side() {
        let pending = Some(FriendState::Pending { requester: ALICE });
        assert!(matches!(
            request_transition(pending, ALICE),
            Err(ApiError::Conflict(Conflict::AlreadyPending))
        ));
        assert!(matches!(
            request_transition(pending, BOB),
            Err(ApiError::Conflict(Conflict::AlreadyPending))
        ));
    }

    #[test]
    fn request_between_friends_is_already_friends() {
        assert!(matches!(
            request_transition(Some(FriendState::Accepted), ALICE),
            Err(ApiError::Conflict(Conflict::AlreadyFriends))
        ));
    }

    #[test]
    fn recipient_accepts_pending_request() {
        // alice asked; bob accepts, naming alice as the requester
        let pending = Some(FriendState::Pending { requester: ALICE });
        assert_eq!(accept_transition(pending, ALICE).unwrap(), FriendState::Accepted);
    }

    #[test]
    fn requester_cannot_accept_own_request() {
        // alice asked; alice "accepting" names bob, who never requested
        let pending = Some(FriendState::Pending { requester: ALICE });
        assert!(matches!(
            accept_transition(pending, BOB),
            Err(ApiError::Conflict(Conflict::NoSuchRequest))
        ));
    }

    #[test]
    fn accept_without_request_or_twice_is_no_such_request() {
        assert!(matches!(
            accept_transition(None, ALICE),
            Err(ApiError::Conflict(Conflict::NoSuchRequest))
        ));
        assert!(matches!(
            accept_transition(Some(FriendState::Accepted), ALICE),
            Err(ApiError::Conflict(Conflict::NoSuchRequest))
        ));
    }

    #[test]
    fn unfriend_clears_pending_and_accepted_but_not_nothing() {
        assert!(unfriend_transition(Some(FriendState::Pending { requester: ALICE })).is_ok());
        assert!(unfriend_transition(Some(FriendState::Accepted)).is_ok());
        assert!(matches!(
            unfriend_transition(None),
            Err(ApiError::Conflict(Conflict::NoRelationship))
        ));
    }

    #[test]
    fn full_lifecycle_round_trip() {
        // None -> Pending(alice) -> Accepted -> None -> Pending again
        let mut state = None;
        state = Some(request_transition(state, ALICE).unwrap());
        state = Some(accept_transition(state, ALICE).unwrap());
        assert_eq!(state, Some(FriendState::Accepted));

        unfriend_transition(state).unwrap();
        state = None;
        let next = request_transition(state, BOB).unwrap();
        assert_eq!(next, FriendState::Pending { requester: BOB });
    }

    #[test]
    fn accepted_edge_reads_the_same_from_both_sides() {
        // both members key into the same canonical row, so following is
        // symmetric once accepted no matter who requested
        let edge = FriendEdge {
            id: 1,
            user_lo: ALICE,
            user_hi: BOB,
            requester_id: BOB,
            accepted: true,
            created_at: chrono::Utc::now().naive_utc(),
        };
        assert_eq!(edge.state(), FriendState::Accepted);
        assert_eq!(
            PairKey::new(ALICE, BOB).unwrap(),
            PairKey::new(BOB, ALICE).unwrap()
        );
    }
}
