//! Friend requests and game invites
//!
//! Both request kinds share one lifecycle: `Pending` moves to `Accepted` or
//! `Rejected` exactly once. Resolving a request detaches it from the pending
//! lists of both parties. Friend acceptance adds each party to the other's
//! friend set; accepting an invite only resolves the request, the caller
//! then starts the match.

use crate::player::Player;
use shared::{GameType, PlayerId, RequestStatus};
use std::collections::HashMap;

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq)]
pub struct FriendRequest {
    pub id: RequestId,
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InviteRequest {
    pub id: RequestId,
    pub sender: PlayerId,
    pub recipient: PlayerId,
    pub status: RequestStatus,
    pub game_type: GameType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingRequest {
    Friend(FriendRequest),
    Invite(InviteRequest),
}

fn detach(players: &mut HashMap<PlayerId, Player>, id: RequestId, sender: &str, recipient: &str) {
    for party in [sender, recipient] {
        if let Some(player) = players.get_mut(party) {
            player.remove_request(id);
        }
    }
}

impl FriendRequest {
    pub fn new(id: RequestId, sender: impl Into<PlayerId>, recipient: impl Into<PlayerId>) -> Self {
        Self {
            id,
            sender: sender.into(),
            recipient: recipient.into(),
            status: RequestStatus::Pending,
        }
    }

    /// Makes both parties friends (at most once each) and consumes the request
    pub fn accept(&mut self, players: &mut HashMap<PlayerId, Player>) -> bool {
        if self.status != RequestStatus::Pending {
            return false;
        }
        self.status = RequestStatus::Accepted;

        if let Some(sender) = players.get_mut(&self.sender) {
            sender.add_friend(&self.recipient);
        }
        if let Some(recipient) = players.get_mut(&self.recipient) {
            recipient.add_friend(&self.sender);
        }
        detach(players, self.id, &self.sender, &self.recipient);
        true
    }

    pub fn decline(&mut self, players: &mut HashMap<PlayerId, Player>) -> bool {
        if self.status != RequestStatus::Pending {
            return false;
        }
        self.status = RequestStatus::Rejected;
        detach(players, self.id, &self.sender, &self.recipient);
        true
    }
}

impl InviteRequest {
    pub fn new(
        id: RequestId,
        sender: impl Into<PlayerId>,
        recipient: impl Into<PlayerId>,
        game_type: GameType,
    ) -> Self {
        Self {
            id,
            sender: sender.into(),
            recipient: recipient.into(),
            status: RequestStatus::Pending,
            game_type,
        }
    }

    pub fn accept(&mut self, players: &mut HashMap<PlayerId, Player>) -> bool {
        if self.status != RequestStatus::Pending {
            return false;
        }
        self.status = RequestStatus::Accepted;
        detach(players, self.id, &self.sender, &self.recipient);
        true
    }

    pub fn decline(&mut self, players: &mut HashMap<PlayerId, Player>) -> bool {
        if self.status != RequestStatus::Pending {
            return false;
        }
        self.status = RequestStatus::Rejected;
        detach(players, self.id, &self.sender, &self.recipient);
        true
    }
}

impl PendingRequest {
    pub fn id(&self) -> RequestId {
        match self {
            PendingRequest::Friend(r) => r.id,
            PendingRequest::Invite(r) => r.id,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            PendingRequest::Friend(r) => &r.sender,
            PendingRequest::Invite(r) => &r.sender,
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            PendingRequest::Friend(r) => &r.recipient,
            PendingRequest::Invite(r) => &r.recipient,
        }
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            PendingRequest::Friend(r) => r.status,
            PendingRequest::Invite(r) => r.status,
        }
    }

    pub fn is_friend_request(&self) -> bool {
        matches!(self, PendingRequest::Friend(_))
    }

    pub fn is_invite(&self) -> bool {
        matches!(self, PendingRequest::Invite(_))
    }
}
