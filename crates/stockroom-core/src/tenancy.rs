//! # Tenancy Guard
//!
//! Resolves which shop an administrative call may touch.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  requested shop_id (body/query)     operator            effective scope │
//! │  ─────────────────────────────      ────────────        ─────────────── │
//! │  0 (unspecified)                    non-root, shop 2    shop 2          │
//! │  0 (unspecified), read              root                all shops       │
//! │  0 (unspecified), write             root                operator's shop │
//! │  2                                  non-root, shop 2    shop 2          │
//! │  1                                  non-root, shop 2    CrossShopAccess │
//! │  1                                  root                shop 1          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every ledger or order mutation that takes a shop id from the request must
//! go through [`Operator::write_shop`] before it opens a transaction. A
//! rejection here is final.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};

/// The authenticated back-office operator, as supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Operator {
    pub operator_id: i64,
    pub name: String,
    /// The operator's own shop.
    pub shop_id: i64,
    /// Root operators are exempt from shop scoping.
    pub is_root: bool,
}

/// Shops a read may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopScope {
    All,
    Shop(i64),
}

impl ShopScope {
    /// Whether a row owned by `shop_id` is visible in this scope.
    pub fn allows(&self, shop_id: i64) -> bool {
        match self {
            ShopScope::All => true,
            ShopScope::Shop(own) => *own == shop_id,
        }
    }

    /// The single shop, or `None` for all shops.
    pub fn shop_id(&self) -> Option<i64> {
        match self {
            ShopScope::All => None,
            ShopScope::Shop(id) => Some(*id),
        }
    }
}

impl Operator {
    pub fn new(operator_id: i64, name: impl Into<String>, shop_id: i64, is_root: bool) -> Self {
        Self {
            operator_id,
            name: name.into(),
            shop_id,
            is_root,
        }
    }

    /// Resolves the single shop a mutation is scoped to.
    ///
    /// `requested == 0` means "not specified" and falls back to the
    /// operator's own shop, for root operators too.
    pub fn write_shop(&self, requested: i64) -> CoreResult<i64> {
        match self.checked_target(requested)? {
            None => Ok(self.shop_id),
            Some(target) => Ok(target),
        }
    }

    /// Resolves the scope of a read. Root operators that name no shop see
    /// every shop.
    pub fn read_scope(&self, requested: i64) -> CoreResult<ShopScope> {
        match self.checked_target(requested)? {
            Some(target) => Ok(ShopScope::Shop(target)),
            None if self.is_root => Ok(ShopScope::All),
            None => Ok(ShopScope::Shop(self.shop_id)),
        }
    }

    /// Rejects access to a row that lives in another shop.
    pub fn ensure_can_access(&self, shop_id: i64) -> CoreResult<()> {
        if self.is_root || self.shop_id == shop_id {
            return Ok(());
        }
        Err(CoreError::CrossShopAccess {
            operator_shop: self.shop_id,
            target_shop: shop_id,
        })
    }

    fn checked_target(&self, requested: i64) -> CoreResult<Option<i64>> {
        if requested < 0 {
            return Err(ValidationError::MustBePositive {
                field: "shop_id".to_string(),
            }
            .into());
        }
        if requested == 0 {
            return Ok(None);
        }
        self.ensure_can_access(requested)?;
        Ok(Some(requested))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn clerk() -> Operator {
        Operator::new(11, "clerk", 2, false)
    }

    fn root() -> Operator {
        Operator::new(1, "root", 1, true)
    }

    #[test]
    fn test_unspecified_defaults_to_own_shop() {
        assert_eq!(clerk().write_shop(0).unwrap(), 2);
        assert_eq!(clerk().read_scope(0).unwrap(), ShopScope::Shop(2));
        assert_eq!(root().write_shop(0).unwrap(), 1);
    }

    #[test]
    fn test_root_reads_all_shops_when_unspecified() {
        assert_eq!(root().read_scope(0).unwrap(), ShopScope::All);
        assert_eq!(root().read_scope(7).unwrap(), ShopScope::Shop(7));
        assert_eq!(root().write_shop(7).unwrap(), 7);
    }

    #[test]
    fn test_non_root_cannot_target_other_shop() {
        let err = clerk().write_shop(1).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CrossShopAccess {
                operator_shop: 2,
                target_shop: 1
            }
        ));
        assert!(clerk().read_scope(1).is_err());
        assert_eq!(clerk().write_shop(2).unwrap(), 2);
    }

    #[test]
    fn test_negative_shop_is_invalid() {
        assert!(matches!(
            root().write_shop(-1),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_scope_allows() {
        assert!(ShopScope::All.allows(9));
        assert!(ShopScope::Shop(2).allows(2));
        assert!(!ShopScope::Shop(2).allows(1));
        assert_eq!(ShopScope::All.shop_id(), None);
    }

    #[test]
    fn test_ensure_can_access() {
        assert!(clerk().ensure_can_access(2).is_ok());
        assert!(clerk().ensure_can_access(3).is_err());
        assert!(root().ensure_can_access(3).is_ok());
    }
}
