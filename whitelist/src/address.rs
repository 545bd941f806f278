//! # Canonical Addresses
//!
//! Every address the reconciler touches goes through [`Address`] before it
//! is used as a store key or a ledger argument. Upstream catalogues hand us
//! lowercase, uppercase and checksummed strings for the same contract; the
//! newtype parses any of them into the same 20 bytes and renders them back
//! in EIP-55 checksummed form, so `0xabc…` and `0xABC…` can never become two
//! rows.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address as EvmAddress;

/// Errors produced while parsing an address string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid address {input:?}: {reason}")]
    Invalid { input: String, reason: String },
}

/// A 20-byte EVM address with checksummed string form.
///
/// Equality, hashing and ordering work on the raw bytes, never on the
/// textual representation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(EvmAddress);

impl Address {
    /// Wraps an alloy address.
    pub const fn new(inner: EvmAddress) -> Self {
        Self(inner)
    }

    /// Parses any hex casing, with or without the `0x` prefix.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        EvmAddress::from_str(trimmed)
            .map(Self)
            .map_err(|e| AddressError::Invalid {
                input: trimmed.to_string(),
                reason: e.to_string(),
            })
    }

    /// EIP-55 checksummed form. This is the store key.
    pub fn to_checksum(&self) -> String {
        self.0.to_checksum(None)
    }

    /// The underlying alloy address, for contract calls.
    pub const fn as_evm(&self) -> EvmAddress {
        self.0
    }
}

impl From<EvmAddress> for Address {
    fn from(inner: EvmAddress) -> Self {
        Self(inner)
    }
}

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_checksum()
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}
