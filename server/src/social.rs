//! Friendships, friend requests and game privacy.
//!
//! Friendships are stored on the accounts and survive restarts. Requests
//! live on the recipient's connection only: a request to an offline player
//! is not stored, and a pending request disappears when either side
//! disconnects.

use crate::accounts::{AccountStore, FriendAdd};
use crate::client_manager::{ClientId, ClientManager};
use crate::error::CommandError;
use crate::game::GameSession;
use crate::outbox::Outbox;
use log::debug;
use shared::protocol::{Notice, Username};

/// True when `viewer` may watch `game`: every player in private mode must
/// count `viewer` among their friends.
pub fn can_observe(
    game: &GameSession,
    clients: &ClientManager,
    accounts: &AccountStore,
    viewer: &str,
) -> bool {
    game.players
        .iter()
        .zip(&game.names)
        .all(|(&player, name)| {
            let private = clients.get(player).is_some_and(|client| client.private_mode);
            !private || accounts.is_friend(name.as_str(), viewer)
        })
}

fn own_name(clients: &ClientManager, me: ClientId) -> Result<Username, CommandError> {
    clients
        .username_of(me)
        .cloned()
        .ok_or(CommandError::AccountNotFound)
}

/// `FRIEND <user>`
pub fn send_request(
    clients: &mut ClientManager,
    accounts: &AccountStore,
    me: ClientId,
    target: &str,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let my_name = own_name(clients, me)?;
    if my_name.matches(target) {
        return Err(CommandError::SelfTarget("friend"));
    }
    let target_name = accounts
        .find(target)
        .map(|account| account.username.clone())
        .ok_or(CommandError::UnknownUser)?;

    if accounts.is_friend(my_name.as_str(), target_name.as_str()) {
        out.send(me, "Already friends");
        return Ok(());
    }

    let Some(target_id) = clients.find_by_username(target_name.as_str()) else {
        debug!("Friend request from {} to offline {} dropped", my_name, target_name);
        out.send(me, "Friend request sent (user offline)");
        return Ok(());
    };

    let recorded = clients
        .get_mut(target_id)
        .is_some_and(|client| client.friend_requests.insert(my_name.clone()));
    if !recorded {
        return Err(CommandError::RequestsFull(target_name.to_string()));
    }

    out.send(target_id, Notice::FriendRequest(my_name));
    out.send(me, "Friend request sent");
    Ok(())
}

/// `ACCEPT_FRIEND <user>`: only answers a request that is actually pending
pub fn accept_request(
    clients: &mut ClientManager,
    accounts: &mut AccountStore,
    me: ClientId,
    requester: &str,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let my_name = own_name(clients, me)?;
    let requester_name = accounts
        .find(requester)
        .map(|account| account.username.clone())
        .ok_or(CommandError::UnknownUser)?;

    let pending = clients
        .get(me)
        .is_some_and(|client| client.friend_requests.contains(requester_name.as_str()));
    if !pending {
        return Err(CommandError::NoFriendRequest(requester_name.to_string()));
    }

    match accounts.befriend(&my_name, &requester_name)? {
        FriendAdd::Added => debug!("{} and {} are now friends", my_name, requester_name),
        FriendAdd::AlreadyFriends => {}
    }
    if let Some(client) = clients.get_mut(me) {
        client.friend_requests.remove(requester_name.as_str());
    }

    out.send(me, "Friend request accepted !");
    if let Some(requester_id) = clients.find_by_username(requester_name.as_str()) {
        out.send(requester_id, Notice::FriendAccepted(my_name));
    }
    Ok(())
}

/// `DECLINE_FRIEND <user>`
pub fn decline_request(
    clients: &mut ClientManager,
    me: ClientId,
    requester: &str,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let my_name = own_name(clients, me)?;
    let removed = clients
        .get_mut(me)
        .is_some_and(|client| client.friend_requests.remove(requester));
    if !removed {
        return Err(CommandError::NoFriendRequest(requester.to_string()));
    }

    out.send(me, "Friend request declined");
    if let Some(requester_id) = clients.find_by_username(requester) {
        out.send(requester_id, Notice::FriendDeclined(my_name));
    }
    Ok(())
}

/// `UNFRIEND <user>`: removes the friendship from both accounts
pub fn unfriend(
    clients: &ClientManager,
    accounts: &mut AccountStore,
    me: ClientId,
    target: &str,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let my_name = own_name(clients, me)?;
    if my_name.matches(target) {
        return Err(CommandError::SelfTarget("unfriend"));
    }

    let removed = accounts.remove_friend(my_name.as_str(), target)?;
    if accounts.exists(target) {
        accounts.remove_friend(target, my_name.as_str())?;
    }

    out.send(me, if removed { "Friend removed !" } else { "No such friend" });
    Ok(())
}

/// `MY_FRIENDS`
pub fn list_friends(
    clients: &ClientManager,
    accounts: &AccountStore,
    me: ClientId,
    out: &mut Outbox,
) -> Result<(), CommandError> {
    let my_name = own_name(clients, me)?;
    let account = accounts
        .find(my_name.as_str())
        .ok_or(CommandError::AccountNotFound)?;

    if account.friends().is_empty() {
        out.send(me, "MY_FRIENDS:\n  (no friends yet)");
    } else {
        let names: Vec<&str> = account.friends().iter().map(Username::as_str).collect();
        out.send(me, format!("MY_FRIENDS: {}", names.join(" ")));
    }
    Ok(())
}
