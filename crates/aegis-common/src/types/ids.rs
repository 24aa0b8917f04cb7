//! Participant identities
//!
//! Every party that can own vault attributions, debt or asset tokens is a
//! [`Holder`]:
//! - Account: an external participant (depositor, policy buyer, keeper)
//! - Pool / Index: protocol components acting on their own behalf
//! - Reserve: the compensation backstop
//! - Vault / Strategy: token accounts of the vault and its yield controller
//! - System: sentinel that carries socialized debt

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Risk pool identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregator (index) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(pub Uuid);

impl IndexId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for IndexId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant of the ledger.
///
/// Serialized as its display string so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Holder {
    Account(String),
    Pool(PoolId),
    Index(IndexId),
    Reserve,
    Vault,
    Strategy,
    System,
}

impl Holder {
    /// Convenience constructor for external accounts
    pub fn account(id: impl Into<String>) -> Self {
        Holder::Account(id.into())
    }

    /// The zero-address equivalent: an account with a blank identifier
    pub fn is_null(&self) -> bool {
        matches!(self, Holder::Account(id) if id.trim().is_empty())
    }

    /// Whether this holder is one of the engine's own token accounts, which
    /// must never receive attributions directly
    pub fn is_internal(&self) -> bool {
        matches!(self, Holder::Vault | Holder::Strategy | Holder::System)
    }

    pub fn as_index(&self) -> Option<IndexId> {
        match self {
            Holder::Index(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_pool(&self) -> Option<PoolId> {
        match self {
            Holder::Pool(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<PoolId> for Holder {
    fn from(id: PoolId) -> Self {
        Holder::Pool(id)
    }
}

impl From<IndexId> for Holder {
    fn from(id: IndexId) -> Self {
        Holder::Index(id)
    }
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(id) => write!(f, "account:{}", id),
            Holder::Pool(id) => write!(f, "pool:{}", id),
            Holder::Index(id) => write!(f, "index:{}", id),
            Holder::Reserve => write!(f, "reserve"),
            Holder::Vault => write!(f, "vault"),
            Holder::Strategy => write!(f, "strategy"),
            Holder::System => write!(f, "system"),
        }
    }
}

impl FromStr for Holder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserve" => return Ok(Holder::Reserve),
            "vault" => return Ok(Holder::Vault),
            "strategy" => return Ok(Holder::Strategy),
            "system" => return Ok(Holder::System),
            _ => {}
        }

        let (kind, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid holder format: {}", s))?;
        match kind {
            "account" => Ok(Holder::Account(rest.to_string())),
            "pool" => Uuid::parse_str(rest)
                .map(|u| Holder::Pool(PoolId(u)))
                .map_err(|e| format!("Invalid pool id {}: {}", rest, e)),
            "index" => Uuid::parse_str(rest)
                .map(|u| Holder::Index(IndexId(u)))
                .map_err(|e| format!("Invalid index id {}: {}", rest, e)),
            other => Err(format!("Unknown holder kind: {}", other)),
        }
    }
}

impl From<Holder> for String {
    fn from(holder: Holder) -> Self {
        holder.to_string()
    }
}

impl TryFrom<String> for Holder {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_holder_round_trip_through_string() {
        let pool = Holder::Pool(PoolId::new());
        let parsed: Holder = pool.to_string().parse().unwrap();
        assert_eq!(parsed, pool);

        let account = Holder::account("alice:savings");
        let parsed: Holder = account.to_string().parse().unwrap();
        assert_eq!(parsed, account);
    }

    #[test]
    fn test_null_account() {
        assert!(Holder::account("").is_null());
        assert!(Holder::account("  ").is_null());
        assert!(!Holder::account("bob").is_null());
        assert!(!Holder::System.is_null());
    }

    #[test]
    fn test_holder_keys_json_maps() {
        let mut map = BTreeMap::new();
        map.insert(Holder::account("alice"), 10u64);
        map.insert(Holder::Reserve, 5u64);

        let json = serde_json::to_string(&map).unwrap();
        assert!(json.contains("account:alice"));

        let back: BTreeMap<Holder, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!("wallet:abc".parse::<Holder>().is_err());
        assert!("pool:not-a-uuid".parse::<Holder>().is_err());
    }
}
