//! Policies and incidents

use aegis_common::crypto::Hash;
use aegis_common::error::MathError;
use aegis_common::{mul_div_floor, Holder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsuranceStatus {
    /// Capital is locked against the policy
    Active,
    /// A claim was paid out
    Redeemed,
    /// Expired and released
    Unlocked,
}

/// An insurance policy sold by a risk pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insurance {
    pub id: u64,
    /// Coverage start (Unix seconds)
    pub start: i64,
    /// Coverage end (Unix seconds)
    pub end: i64,
    /// Insured amount
    pub amount: Decimal,
    /// Premium paid
    pub premium: Decimal,
    /// Identifier of the covered risk
    pub target: String,
    pub insured: Holder,
    /// Referrer credited with the sale, if any
    pub agent: Option<Holder>,
    pub status: InsuranceStatus,
}

impl Insurance {
    pub fn is_active(&self) -> bool {
        self.status == InsuranceStatus::Active
    }

    /// Whether `timestamp` falls inside the coverage window
    pub fn covers(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

/// Parameters of a declared incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub payout_numerator: u64,
    pub payout_denominator: u64,
    /// When the insured event happened
    pub incident_timestamp: i64,
    /// Root of the claim tree for this incident
    #[serde(with = "hex_root")]
    pub merkle_root: Hash,
    /// Covered risks affected by the incident
    pub targets: Vec<String>,
    /// End of the reporting window; claims open afterwards
    pub pending_end: i64,
    /// Last second at which claims may be redeemed
    pub claim_end: i64,
}

impl Incident {
    pub fn affects(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }

    /// `min(amount, loss) * numerator / denominator`, rounded down
    pub fn payout_for(&self, amount: Decimal, loss: Decimal) -> Result<Decimal, MathError> {
        mul_div_floor(
            amount.min(loss),
            Decimal::from(self.payout_numerator),
            Decimal::from(self.payout_denominator),
        )
    }
}

mod hex_root {
    use aegis_common::crypto::{Hash, HASH_SIZE};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(root: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(root))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        <[u8; HASH_SIZE]>::try_from(bytes.as_slice())
            .map_err(|_| D::Error::custom(format!("expected {} bytes", HASH_SIZE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn incident() -> Incident {
        Incident {
            payout_numerator: 5000,
            payout_denominator: 10000,
            incident_timestamp: 500,
            merkle_root: [7u8; 32],
            targets: vec!["bridge".into()],
            pending_end: 1_000,
            claim_end: 2_000,
        }
    }

    #[test]
    fn test_payout_is_capped_by_amount() {
        let incident = incident();
        assert_eq!(incident.payout_for(dec!(10000), dec!(20000)).unwrap(), dec!(5000));
        assert_eq!(incident.payout_for(dec!(10000), dec!(3001)).unwrap(), dec!(1500));
    }

    #[test]
    fn test_payout_with_fine_grained_ratio() {
        let incident = Incident {
            payout_numerator: 500_000_000_000_000_000,
            payout_denominator: 1_000_000_000_000_000_000,
            ..incident()
        };
        let amount = Decimal::from(1_000_000_000_000u64);
        assert_eq!(
            incident.payout_for(amount, amount).unwrap(),
            Decimal::from(500_000_000_000u64)
        );

        let full = Incident {
            payout_numerator: u64::MAX,
            payout_denominator: u64::MAX,
            ..self::incident()
        };
        assert_eq!(full.payout_for(amount, amount).unwrap(), amount);
    }

    #[test]
    fn test_incident_serializes_root_as_hex() {
        let incident = incident();
        let json = serde_json::to_string(&incident).unwrap();
        assert!(json.contains(&"07".repeat(32)));
        let back: Incident = serde_json::from_str(&json).unwrap();
        assert_eq!(back, incident);
    }

    #[test]
    fn test_coverage_window() {
        let policy = Insurance {
            id: 0,
            start: 100,
            end: 200,
            amount: dec!(1),
            premium: dec!(1),
            target: "bridge".into(),
            insured: Holder::account("alice"),
            agent: None,
            status: InsuranceStatus::Active,
        };
        assert!(policy.covers(100));
        assert!(policy.covers(200));
        assert!(!policy.covers(201));
        assert!(incident().affects("bridge"));
        assert!(!incident().affects("dex"));
    }
}
