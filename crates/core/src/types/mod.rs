//! Shared identifier and table type aliases

use std::collections::HashMap;

/// One isolated chat space with its own ledger and roster
pub type CommunityId = String;

/// A member of a community
pub type ParticipantId = String;

/// A content-pool asset identifier (the pool file name)
pub type AssetId = String;

/// Signed point balance
pub type Points = i64;

/// Persisted ledger shape: community -> participant -> balance
pub type BalanceTable = HashMap<CommunityId, HashMap<ParticipantId, Points>>;

/// Persisted collection shape: community -> participant -> won asset ids (ordered, duplicates allowed)
pub type CollectionTable = HashMap<CommunityId, HashMap<ParticipantId, Vec<AssetId>>>;
