//! # Catalogue Records
//!
//! The three shapes the reconciler moves around:
//!
//! ```text
//! VaultRecord          one discovered vault, produced by a provider, consumed once
//! TokenEntry           a catalogued staking token      (lp_tokens row)
//! AuthorizationEntry   a whitelisted vault contract    (contracts row)
//! ```
//!
//! Providers never build a [`VaultRecord`] directly. They describe what the
//! upstream said as a [`VaultListing`] and let [`VaultListing::into_record`]
//! do the address canonicalisation and name fallbacks, so the rules exist
//! exactly once.

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressError};

// ---------------------------------------------------------------------------
// VaultRecord
// ---------------------------------------------------------------------------

/// A discovered vault in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// The vault contract to whitelist.
    pub vault_address: Address,
    /// The staking token the vault accepts.
    pub token_address: Address,
    /// Name written to the `contracts` row.
    pub display_name: String,
    /// Label passed to `setProtocolOfTarget` and written to `contracts`.
    pub protocol_label: String,
    /// Protocol written to the `lp_tokens` row.
    pub token_protocol: String,
    /// Name written to the `lp_tokens` row.
    pub token_name: String,
}

impl VaultRecord {
    /// The token row this record would create if the token is new.
    pub fn token_entry(&self) -> TokenEntry {
        TokenEntry {
            address: self.token_address,
            protocol: self.token_protocol.clone(),
            name: self.token_name.clone(),
            authorized: true,
        }
    }

    /// The contract row written once the registry confirms the vault.
    pub fn authorization_entry(&self) -> AuthorizationEntry {
        AuthorizationEntry {
            address: self.vault_address,
            is_allowed: true,
            protocol: self.protocol_label.clone(),
            name: Some(self.display_name.clone()),
            token_address: Some(self.token_address),
        }
    }
}

// ---------------------------------------------------------------------------
// VaultListing
// ---------------------------------------------------------------------------

/// What an upstream catalogue said about one vault, before canonicalisation.
#[derive(Debug, Clone, Default)]
pub struct VaultListing {
    pub vault: String,
    pub token: String,
    /// The provider's preferred display name, if it sent one.
    pub preferred_name: Option<String>,
    /// Used when `preferred_name` is missing or blank.
    pub fallback_name: Option<String>,
    /// Token protocol; defaults to the provider label.
    pub token_protocol: Option<String>,
    /// Prepended to the vault's display name (`"Infrared <name>"`).
    pub vault_name_prefix: Option<&'static str>,
}

/// A listing field that failed canonicalisation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {source}")]
pub struct ListingError {
    pub field: &'static str,
    #[source]
    pub source: AddressError,
}

impl VaultListing {
    /// Canonicalises addresses and resolves names.
    ///
    /// Name resolution order: preferred, fallback, then the checksummed
    /// vault address. Blank strings count as missing.
    pub fn into_record(self, protocol_label: &str) -> Result<VaultRecord, ListingError> {
        let vault_address = Address::parse(&self.vault).map_err(|source| ListingError {
            field: "vault",
            source,
        })?;
        let token_address = Address::parse(&self.token).map_err(|source| ListingError {
            field: "token",
            source,
        })?;

        let token_name = non_blank(self.preferred_name)
            .or_else(|| non_blank(self.fallback_name))
            .unwrap_or_else(|| vault_address.to_checksum());

        let display_name = match self.vault_name_prefix {
            Some(prefix) => format!("{prefix} {token_name}"),
            None => token_name.clone(),
        };

        let token_protocol =
            non_blank(self.token_protocol).unwrap_or_else(|| protocol_label.to_string());

        Ok(VaultRecord {
            vault_address,
            token_address,
            display_name,
            protocol_label: protocol_label.to_string(),
            token_protocol,
            token_name,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Persisted Entries
// ---------------------------------------------------------------------------

/// A catalogued staking token. Mirrors the `lp_tokens` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub address: Address,
    pub protocol: String,
    pub name: String,
    pub authorized: bool,
}

/// A whitelisted vault contract. Mirrors the `contracts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationEntry {
    pub address: Address,
    pub is_allowed: bool,
    pub protocol: String,
    pub name: Option<String>,
    pub token_address: Option<Address>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const VAULT: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const TOKEN: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";

    fn listing() -> VaultListing {
        VaultListing {
            vault: VAULT.to_string(),
            token: TOKEN.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn preferred_name_wins() {
        let record = VaultListing {
            preferred_name: Some("HONEY-WBERA".into()),
            fallback_name: Some("ignored".into()),
            ..listing()
        }
        .into_record("BGT Station")
        .unwrap();

        assert_eq!(record.display_name, "HONEY-WBERA");
        assert_eq!(record.token_name, "HONEY-WBERA");
        assert_eq!(record.protocol_label, "BGT Station");
        assert_eq!(record.token_protocol, "BGT Station");
    }

    #[test]
    fn blank_preferred_name_falls_back() {
        let record = VaultListing {
            preferred_name: Some("   ".into()),
            fallback_name: Some("Kodiak Island".into()),
            vault_name_prefix: Some("Infrared"),
            ..listing()
        }
        .into_record("Infrared")
        .unwrap();

        assert_eq!(record.token_name, "Kodiak Island");
        assert_eq!(record.display_name, "Infrared Kodiak Island");
    }

    #[test]
    fn missing_names_use_vault_address() {
        let record = listing().into_record("Infrared").unwrap();
        assert_eq!(record.token_name, "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn token_protocol_override() {
        let record = VaultListing {
            token_protocol: Some("Kodiak".into()),
            ..listing()
        }
        .into_record("Infrared")
        .unwrap();
        assert_eq!(record.token_protocol, "Kodiak");
        assert_eq!(record.protocol_label, "Infrared");
    }

    #[test]
    fn addresses_are_canonicalised() {
        let record = listing().into_record("Infrared").unwrap();
        assert_eq!(
            record.vault_address.to_checksum(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        assert_eq!(record.token_address.to_checksum(), TOKEN);
    }

    #[test]
    fn bad_token_address_names_the_field() {
        let err = VaultListing {
            token: "not-an-address".into(),
            ..listing()
        }
        .into_record("Infrared")
        .unwrap_err();
        assert_eq!(err.field, "token");
    }

    #[test]
    fn entries_carry_record_fields() {
        let record = VaultListing {
            preferred_name: Some("BEX HONEY-WBERA".into()),
            token_protocol: Some("BEX".into()),
            ..listing()
        }
        .into_record("BGT Station")
        .unwrap();

        let token = record.token_entry();
        assert_eq!(token.address, record.token_address);
        assert_eq!(token.protocol, "BEX");
        assert!(token.authorized);

        let auth = record.authorization_entry();
        assert_eq!(auth.address, record.vault_address);
        assert!(auth.is_allowed);
        assert_eq!(auth.protocol, "BGT Station");
        assert_eq!(auth.token_address, Some(record.token_address));
        assert_eq!(auth.name.as_deref(), Some("BEX HONEY-WBERA"));
    }
}
