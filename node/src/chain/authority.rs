//! Signature and authority checks of transactions.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::chain::error::{ChainError, Result};
use crate::types::{AccountName, Authority, AuthorityLevel, RequiredAuthorities, SignedTransaction};
use crate::utilities::crypto::{Certificate, PublicKey};
use crate::utilities::hash::HashType;

/// Tracks which provided keys were used while evaluating authorities.
pub(crate) struct SignState<F>
where
    F: Fn(&AccountName) -> Option<Authority>,
{
    provided: BTreeMap<PublicKey, bool>,
    approved_by: BTreeSet<AccountName>,
    get_authority: F,
    max_recursion: u32,
}

impl<F> SignState<F>
where
    F: Fn(&AccountName) -> Option<Authority>,
{
    pub(crate) fn new(keys: &BTreeSet<PublicKey>, get_authority: F, max_recursion: u32) -> Self {
        Self {
            provided: keys.iter().map(|key| (*key, false)).collect(),
            approved_by: BTreeSet::new(),
            get_authority,
            max_recursion,
        }
    }

    fn signed_by(&mut self, key: &PublicKey) -> bool {
        match self.provided.get_mut(key) {
            Some(used) => {
                *used = true;
                true
            }
            None => false,
        }
    }

    /// Checks the account's authority as resolved by this state's level.
    pub(crate) fn check_account(&mut self, account: &AccountName) -> bool {
        if self.approved_by.contains(account) {
            return true;
        }
        match (self.get_authority)(account) {
            Some(authority) => self.check_authority(&authority, 0),
            None => false,
        }
    }

    pub(crate) fn check_authority(&mut self, authority: &Authority, depth: u32) -> bool {
        let threshold = u64::from(authority.weight_threshold);
        let mut total_weight = 0u64;

        for (key, weight) in &authority.key_auths {
            if self.signed_by(key) {
                total_weight += u64::from(*weight);
                if total_weight >= threshold {
                    return true;
                }
            }
        }

        for (account, weight) in &authority.account_auths {
            let approved = if self.approved_by.contains(account) {
                true
            } else if depth >= self.max_recursion {
                false
            } else {
                let nested = (self.get_authority)(account);
                let satisfied = nested.map_or(false, |nested| self.check_authority(&nested, depth + 1));
                if satisfied {
                    self.approved_by.insert(account.clone());
                }
                satisfied
            };
            if approved {
                total_weight += u64::from(*weight);
                if total_weight >= threshold {
                    return true;
                }
            }
        }

        total_weight >= threshold
    }

    /// Drops keys that contributed to nothing and reports whether there were any.
    pub(crate) fn remove_unused_signatures(&mut self) -> bool {
        let before = self.provided.len();
        self.provided.retain(|_, used| *used);
        self.provided.len() != before
    }
}

/// Authorities of one account, as stored in state.
#[derive(Clone, Debug)]
pub(crate) struct AccountAuthorities {
    pub(crate) owner: Authority,
    pub(crate) active: Authority,
    pub(crate) posting: Authority,
}

/// Checks that `keys` satisfy every required authority and that none of them is superfluous.
///
/// Posting authority is satisfied by posting, active or owner; active by active or owner;
/// owner only by owner. Nested account authorities resolve through the same level.
pub(crate) fn verify_authority<G>(
    required: &RequiredAuthorities,
    keys: &BTreeSet<PublicKey>,
    get_account: G,
    max_recursion: u32,
) -> Result<()>
where
    G: Fn(&AccountName) -> Option<AccountAuthorities>,
{
    if !required.posting.is_empty() {
        if !required.active.is_empty() || !required.owner.is_empty() {
            return Err(ChainError::MixedAuthority);
        }

        let mut state = SignState::new(keys, |a| get_account(a).map(|a| a.posting), max_recursion);
        for account in &required.posting {
            let authorities = get_account(account);
            let satisfied = state.check_account(account)
                || authorities.as_ref().map_or(false, |a| {
                    state.check_authority(&a.active, 0) || state.check_authority(&a.owner, 0)
                });
            if !satisfied {
                return Err(ChainError::MissingAuthority {
                    level: AuthorityLevel::Posting,
                    account: account.clone(),
                });
            }
        }
        if state.remove_unused_signatures() {
            return Err(ChainError::IrrelevantSignature);
        }
        return Ok(());
    }

    let mut state = SignState::new(keys, |a| get_account(a).map(|a| a.active), max_recursion);
    for account in &required.active {
        let satisfied = state.check_account(account)
            || get_account(account).map_or(false, |a| state.check_authority(&a.owner, 0));
        if !satisfied {
            return Err(ChainError::MissingAuthority {
                level: AuthorityLevel::Active,
                account: account.clone(),
            });
        }
    }
    for account in &required.owner {
        let satisfied = get_account(account).map_or(false, |a| state.check_authority(&a.owner, 0));
        if !satisfied {
            return Err(ChainError::MissingAuthority {
                level: AuthorityLevel::Owner,
                account: account.clone(),
            });
        }
    }

    if state.remove_unused_signatures() {
        return Err(ChainError::IrrelevantSignature);
    }
    Ok(())
}

/// Checks every certificate of a transaction and returns the signing keys.
///
/// Verified (digest, certificate) pairs are remembered so that a transaction seen as
/// pending is not verified again when it arrives in a block.
pub(crate) struct SignatureVerifier {
    verified: LruCache<HashType, HashSet<Certificate>>,
}

impl SignatureVerifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            verified: LruCache::new(capacity),
        }
    }

    pub(crate) fn signing_keys(
        &mut self,
        trx: &SignedTransaction,
        chain_id: &HashType,
        verify: bool,
        max_signatures: usize,
    ) -> Result<BTreeSet<PublicKey>> {
        if trx.signatures.len() > max_signatures {
            return Err(ChainError::TooManySignatures {
                count: trx.signatures.len(),
                max: max_signatures,
            });
        }

        let digest = trx.transaction.sig_digest(chain_id)?;
        let mut keys = BTreeSet::new();
        for certificate in &trx.signatures {
            if !keys.insert(certificate.public_key) {
                return Err(ChainError::DuplicateSignature(certificate.public_key));
            }
            if verify && !self.verify(&digest, certificate) {
                return Err(ChainError::InvalidSignature(certificate.public_key));
            }
        }
        Ok(keys)
    }

    fn verify(&mut self, digest: &HashType, certificate: &Certificate) -> bool {
        if self
            .verified
            .get(digest)
            .map_or(false, |certificates| certificates.contains(certificate))
        {
            log::trace!("Signature by {} already verified", certificate.public_key);
            return true;
        }
        if !certificate.verify(digest) {
            return false;
        }
        self.verified
            .get_or_insert_mut(*digest, HashSet::new)
            .insert(certificate.clone());
        true
    }
}
