//! Friendship handshake over the directed edge trees.
//!
//! An edge `A → B` lives in `friendships` under `A ‖ B` and is mirrored in
//! `friendships_incoming` under `B ‖ A`. A request creates a PENDING edge; the
//! friendship becomes CONFIRMED in both directions once the other side confirms
//! or requests back.
//!
//! Writers hold the store's edge lock exclusively. Readers hold it shared for
//! the whole operation, so both directions of an edge and both friend sets
//! of `common_friends` come from the same state.

use crate::database::{deserialize_id, pair_key, require_user, serialize_id, Store, UserDb};
use crate::error::{abort, decode, encode, Error, Result};
use crate::model::{FriendshipStatus, User};
use log::{debug, info};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Transactional;
use std::collections::BTreeSet;

fn put_edge(
    friendships: &TransactionalTree,
    incoming: &TransactionalTree,
    from: u64,
    to: u64,
    status: FriendshipStatus,
) -> ConflictableTransactionResult<(), Error> {
    let data = encode(&status)?;
    friendships.insert(&pair_key(from, to)[..], data.as_slice())?;
    incoming.insert(&pair_key(to, from)[..], data.as_slice())?;
    Ok(())
}

fn get_edge(
    friendships: &TransactionalTree,
    from: u64,
    to: u64,
) -> ConflictableTransactionResult<Option<FriendshipStatus>, Error> {
    match friendships.get(&pair_key(from, to)[..])? {
        Some(data) => Ok(Some(decode(&data)?)),
        None => Ok(None),
    }
}

/// Ids of the edges under `prefix` in `tree` whose status is `wanted`.
fn edge_ids(tree: &sled::Tree, prefix: u64, wanted: FriendshipStatus) -> Result<BTreeSet<u64>> {
    let mut ids = BTreeSet::new();
    for entry in tree.scan_prefix(serialize_id(prefix)) {
        let (key, data) = entry?;
        let status: FriendshipStatus = bincode::deserialize(&data)?;
        if status == wanted {
            ids.insert(deserialize_id(&key[8..])?);
        }
    }
    Ok(ids)
}

pub trait FriendshipDb {
    /// Sends a friend request and returns the resulting status of `user → friend`.
    fn request_friend(&self, user_id: u64, friend_id: u64) -> Result<FriendshipStatus>;
    /// `user` accepts the pending request that `friend` sent earlier.
    fn confirm_friend(&self, user_id: u64, friend_id: u64) -> Result<()>;
    fn remove_friend(&self, user_id: u64, friend_id: u64) -> Result<()>;
    fn friendship_status(&self, user_id: u64, friend_id: u64) -> Result<Option<FriendshipStatus>>;
    fn friends_of(&self, user_id: u64) -> Result<Vec<User>>;
    fn pending_requests_for(&self, user_id: u64) -> Result<Vec<User>>;
    fn common_friends(&self, user_id: u64, other_id: u64) -> Result<Vec<User>>;
}

// Callers hold the edge lock.
impl Store {
    fn confirmed_ids(&self, user_id: u64) -> Result<BTreeSet<u64>> {
        self.get_user(user_id)?;
        edge_ids(&self.friendships, user_id, FriendshipStatus::Confirmed)
    }

    fn edge_status(&self, from: u64, to: u64) -> Result<Option<FriendshipStatus>> {
        match self.friendships.get(pair_key(from, to))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

impl FriendshipDb for Store {
    fn request_friend(&self, user_id: u64, friend_id: u64) -> Result<FriendshipStatus> {
        if user_id == friend_id {
            return Err(Error::InvalidState(format!(
                "User {} cannot befriend themselves",
                user_id
            )));
        }
        let _edges = self.write_edges();
        let trees = (&self.users, &self.friendships, &self.friendships_incoming);
        let status = trees.transaction(|(users, friendships, incoming)| {
            require_user(users, user_id)?;
            require_user(users, friend_id)?;
            if let Some(existing) = get_edge(friendships, user_id, friend_id)? {
                return Ok(existing);
            }
            if get_edge(friendships, friend_id, user_id)? == Some(FriendshipStatus::Pending) {
                put_edge(friendships, incoming, user_id, friend_id, FriendshipStatus::Confirmed)?;
                put_edge(friendships, incoming, friend_id, user_id, FriendshipStatus::Confirmed)?;
                return Ok(FriendshipStatus::Confirmed);
            }
            put_edge(friendships, incoming, user_id, friend_id, FriendshipStatus::Pending)?;
            Ok(FriendshipStatus::Pending)
        })?;
        match status {
            FriendshipStatus::Confirmed => {
                info!("Users {} and {} are now friends", user_id, friend_id)
            }
            FriendshipStatus::Pending => {
                debug!("User {} requested friendship with {}", user_id, friend_id)
            }
        }
        Ok(status)
    }

    fn confirm_friend(&self, user_id: u64, friend_id: u64) -> Result<()> {
        let _edges = self.write_edges();
        let trees = (&self.users, &self.friendships, &self.friendships_incoming);
        trees.transaction(|(users, friendships, incoming)| {
            require_user(users, user_id)?;
            require_user(users, friend_id)?;
            if get_edge(friendships, friend_id, user_id)? != Some(FriendshipStatus::Pending) {
                return abort(Error::InvalidState(format!(
                    "No pending friend request from user {} to user {}",
                    friend_id, user_id
                )));
            }
            put_edge(friendships, incoming, user_id, friend_id, FriendshipStatus::Confirmed)?;
            put_edge(friendships, incoming, friend_id, user_id, FriendshipStatus::Confirmed)?;
            Ok(())
        })?;
        info!("User {} confirmed friendship with {}", user_id, friend_id);
        Ok(())
    }

    fn remove_friend(&self, user_id: u64, friend_id: u64) -> Result<()> {
        let _edges = self.write_edges();
        let trees = (&self.users, &self.friendships, &self.friendships_incoming);
        trees.transaction(|(users, friendships, incoming)| {
            require_user(users, user_id)?;
            require_user(users, friend_id)?;
            let forward = friendships.remove(&pair_key(user_id, friend_id)[..])?;
            let backward = friendships.remove(&pair_key(friend_id, user_id)[..])?;
            if forward.is_none() && backward.is_none() {
                return abort(Error::NotFound(format!(
                    "User {} has no friendship with user {}",
                    user_id, friend_id
                )));
            }
            incoming.remove(&pair_key(friend_id, user_id)[..])?;
            incoming.remove(&pair_key(user_id, friend_id)[..])?;
            Ok(())
        })?;
        info!("Removed friendship between {} and {}", user_id, friend_id);
        Ok(())
    }

    fn friendship_status(&self, user_id: u64, friend_id: u64) -> Result<Option<FriendshipStatus>> {
        let _edges = self.read_edges();
        self.edge_status(user_id, friend_id)
    }

    fn friends_of(&self, user_id: u64) -> Result<Vec<User>> {
        let _edges = self.read_edges();
        let ids = self.confirmed_ids(user_id)?;
        self.users_by_ids(ids)
    }

    fn pending_requests_for(&self, user_id: u64) -> Result<Vec<User>> {
        let _edges = self.read_edges();
        self.get_user(user_id)?;
        let ids = edge_ids(&self.friendships_incoming, user_id, FriendshipStatus::Pending)?;
        self.users_by_ids(ids)
    }

    fn common_friends(&self, user_id: u64, other_id: u64) -> Result<Vec<User>> {
        let _edges = self.read_edges();
        let mine = self.confirmed_ids(user_id)?;
        let theirs = self.confirmed_ids(other_id)?;
        self.users_by_ids(mine.intersection(&theirs).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::temporary_store;
    use crate::validation::tests::user;
    use std::thread;

    fn ids(users: Vec<User>) -> Vec<u64> {
        users.into_iter().map(|u| u.id).collect()
    }

    fn store_with_users(n: usize) -> Store {
        let store = temporary_store();
        for i in 0..n {
            store.add_user(user(&format!("user{}", i + 1))).unwrap();
        }
        store
    }

    #[test]
    fn request_stays_pending() {
        let store = store_with_users(2);
        assert_eq!(store.request_friend(1, 2).unwrap(), FriendshipStatus::Pending);
        assert!(store.friends_of(1).unwrap().is_empty());
        assert!(store.friends_of(2).unwrap().is_empty());
        assert_eq!(ids(store.pending_requests_for(2).unwrap()), vec![1]);
        assert!(store.pending_requests_for(1).unwrap().is_empty());
        assert_eq!(store.friendship_status(2, 1).unwrap(), None);
    }

    #[test]
    fn repeated_request_is_noop() {
        let store = store_with_users(2);
        store.request_friend(1, 2).unwrap();
        assert_eq!(store.request_friend(1, 2).unwrap(), FriendshipStatus::Pending);
        assert_eq!(ids(store.pending_requests_for(2).unwrap()), vec![1]);
        assert_eq!(
            store.friendship_status(1, 2).unwrap(),
            Some(FriendshipStatus::Pending)
        );
    }

    #[test]
    fn mutual_request_confirms() {
        let store = store_with_users(2);
        store.request_friend(1, 2).unwrap();
        assert_eq!(store.request_friend(2, 1).unwrap(), FriendshipStatus::Confirmed);
        assert_eq!(ids(store.friends_of(1).unwrap()), vec![2]);
        assert_eq!(ids(store.friends_of(2).unwrap()), vec![1]);
        assert!(store.pending_requests_for(1).unwrap().is_empty());
        assert!(store.pending_requests_for(2).unwrap().is_empty());
        assert_eq!(store.request_friend(1, 2).unwrap(), FriendshipStatus::Confirmed);
    }

    #[test]
    fn confirm_request() {
        let store = store_with_users(2);
        store.request_friend(1, 2).unwrap();
        // Only the receiving side can confirm.
        assert!(matches!(store.confirm_friend(1, 2), Err(Error::InvalidState(_))));
        store.confirm_friend(2, 1).unwrap();
        assert_eq!(ids(store.friends_of(1).unwrap()), vec![2]);
        assert_eq!(ids(store.friends_of(2).unwrap()), vec![1]);
        assert_eq!(
            store.friendship_status(2, 1).unwrap(),
            Some(FriendshipStatus::Confirmed)
        );
        // Already confirmed, nothing pending any more.
        assert!(matches!(store.confirm_friend(2, 1), Err(Error::InvalidState(_))));
    }

    #[test]
    fn confirm_without_request() {
        let store = store_with_users(2);
        assert!(matches!(store.confirm_friend(1, 2), Err(Error::InvalidState(_))));
        assert!(matches!(store.confirm_friend(1, 9), Err(Error::NotFound(_))));
    }

    #[test]
    fn remove_both_directions() {
        let store = store_with_users(2);
        store.request_friend(1, 2).unwrap();
        store.request_friend(2, 1).unwrap();
        store.remove_friend(1, 2).unwrap();
        assert!(store.friends_of(1).unwrap().is_empty());
        assert!(store.friends_of(2).unwrap().is_empty());
        assert_eq!(store.friendship_status(1, 2).unwrap(), None);
        assert_eq!(store.friendship_status(2, 1).unwrap(), None);
        assert!(store.friendships_incoming.is_empty());
    }

    #[test]
    fn remove_declines_request() {
        let store = store_with_users(2);
        store.request_friend(1, 2).unwrap();
        store.remove_friend(2, 1).unwrap();
        assert!(store.pending_requests_for(2).unwrap().is_empty());
        assert_eq!(store.friendship_status(1, 2).unwrap(), None);
    }

    #[test]
    fn remove_missing_edge() {
        let store = store_with_users(2);
        match store.remove_friend(1, 2) {
            Err(Error::NotFound(message)) => assert!(message.contains("no friendship")),
            other => panic!("unexpected result: {:?}", other),
        }
        match store.remove_friend(1, 3) {
            Err(Error::NotFound(message)) => assert!(message.contains("User with id 3")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unknown_users() {
        let store = store_with_users(1);
        assert!(matches!(store.request_friend(1, 2), Err(Error::NotFound(_))));
        assert!(matches!(store.request_friend(2, 1), Err(Error::NotFound(_))));
        assert!(matches!(store.friends_of(2), Err(Error::NotFound(_))));
        assert!(matches!(store.pending_requests_for(2), Err(Error::NotFound(_))));
        assert!(matches!(store.common_friends(1, 2), Err(Error::NotFound(_))));
        assert!(store.friendships.is_empty());
    }

    #[test]
    fn self_request() {
        let store = store_with_users(1);
        assert!(matches!(store.request_friend(1, 1), Err(Error::InvalidState(_))));
    }

    #[test]
    fn common_friends_is_intersection() {
        let store = store_with_users(5);
        for (a, b) in [(1, 3), (1, 4), (2, 3), (2, 4), (2, 5)] {
            store.request_friend(a, b).unwrap();
            store.request_friend(b, a).unwrap();
        }
        // Pending only, must not count.
        store.request_friend(1, 5).unwrap();

        assert_eq!(ids(store.common_friends(1, 2).unwrap()), vec![3, 4]);
        assert_eq!(ids(store.common_friends(2, 1).unwrap()), vec![3, 4]);
        for a in 1..=5 {
            for b in 1..=5 {
                let mine = ids(store.friends_of(a).unwrap());
                let theirs = ids(store.friends_of(b).unwrap());
                let expected = mine
                    .into_iter()
                    .filter(|id| theirs.contains(id))
                    .collect::<Vec<_>>();
                assert_eq!(ids(store.common_friends(a, b).unwrap()), expected);
            }
        }
    }

    #[test]
    fn deleted_user_edges_are_swept() {
        let store = store_with_users(3);
        store.request_friend(1, 2).unwrap();
        store.request_friend(2, 1).unwrap();
        store.request_friend(3, 1).unwrap();
        store.delete_user(1).unwrap();
        assert!(store.friends_of(2).unwrap().is_empty());
        assert_eq!(store.friendship_status(3, 1).unwrap(), None);
        assert!(store.friendships.is_empty());
        assert!(store.friendships_incoming.is_empty());
    }

    fn befriend(store: &Store, a: u64, b: u64) {
        store.request_friend(a, b).unwrap();
        store.request_friend(b, a).unwrap();
    }

    #[test]
    fn mirrored_edges_change_together() {
        let store = store_with_users(2);
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    befriend(&store, 1, 2);
                    store.remove_friend(1, 2).unwrap();
                }
            })
        };
        while !writer.is_finished() {
            let edges = store.read_edges();
            let forward = store.edge_status(1, 2).unwrap();
            let backward = store.edge_status(2, 1).unwrap();
            drop(edges);
            match (forward, backward) {
                (None, None)
                | (Some(FriendshipStatus::Pending), None)
                | (Some(FriendshipStatus::Confirmed), Some(FriendshipStatus::Confirmed)) => {}
                other => panic!("half-applied edge: {:?}", other),
            }
        }
        writer.join().unwrap();
        assert!(store.friendships.is_empty());
        assert!(store.friendships_incoming.is_empty());
    }

    #[test]
    fn common_friends_reads_one_state() {
        // 3 is a friend of 1 or of 2, never of both at once.
        let store = store_with_users(3);
        befriend(&store, 1, 3);
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..300 {
                    store.remove_friend(1, 3).unwrap();
                    befriend(&store, 2, 3);
                    store.remove_friend(2, 3).unwrap();
                    befriend(&store, 1, 3);
                }
            })
        };
        while !writer.is_finished() {
            assert!(store.common_friends(1, 2).unwrap().is_empty());
        }
        writer.join().unwrap();
        assert_eq!(ids(store.friends_of(3).unwrap()), vec![1]);
    }
}
