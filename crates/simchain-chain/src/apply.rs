//! Native execution of actions.
//!
//! The harness runs no contract bytecode; the engine under test is the
//! guest module itself, not code deployed on the chain. Actions aimed at
//! the system account dispatch to built-in handlers; actions on any other
//! account succeed as no-ops once their declared authorizations are
//! satisfied, mirroring how a production chain treats codeless accounts.

use crate::state::StateDb;
use borsh::{BorshDeserialize, BorshSerialize};
use simchain_types::{AccountName, Action, PublicKeyBytes};
use std::collections::BTreeSet;

const fn name_from_ascii(bytes: &[u8; 8]) -> AccountName {
    AccountName::new(u64::from_le_bytes(*bytes))
}

/// The privileged account built-in actions live on.
pub const SYSTEM_ACCOUNT: AccountName = name_from_ascii(b"system\0\0");
/// Default permission name used for every account key.
pub const ACTIVE_PERMISSION: AccountName = name_from_ascii(b"active\0\0");

pub const ACTION_NEWACCOUNT: AccountName = name_from_ascii(b"newaccnt");
pub const ACTION_SETCODE: AccountName = name_from_ascii(b"setcode\0");
pub const ACTION_SETABI: AccountName = name_from_ascii(b"setabi\0\0");
pub const ACTION_UPDATEAUTH: AccountName = name_from_ascii(b"updauth\0");

/// Payload of `newaccnt`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct NewAccount {
    pub creator: AccountName,
    pub name: AccountName,
    pub key: PublicKeyBytes,
}

/// Payload of `setcode`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SetCode {
    pub account: AccountName,
    pub code: Vec<u8>,
}

/// Payload of `setabi`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct SetAbi {
    pub account: AccountName,
    pub abi: Vec<u8>,
}

/// Payload of `updauth`.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct UpdateAuth {
    pub account: AccountName,
    pub permission: AccountName,
    pub key: PublicKeyBytes,
}

/// A failure while applying one action. Carried into the trace's
/// `except` field; never a harness error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub message: String,
}

impl ApplyFailure {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Check that every declared authorization of `act` is covered by one of the
/// verified signer keys.
pub fn check_authorization(
    state: &StateDb,
    act: &Action,
    signer_keys: &BTreeSet<PublicKeyBytes>,
) -> Result<(), ApplyFailure> {
    for auth in &act.authorization {
        if !state.has_account(auth.actor) {
            return Err(ApplyFailure::new(format!(
                "authorizing account {} does not exist",
                auth.actor
            )));
        }
        let key = state
            .permission_key(auth.actor, auth.permission)
            .ok_or_else(|| {
                ApplyFailure::new(format!(
                    "account {} has no permission {}",
                    auth.actor, auth.permission
                ))
            })?;
        if !signer_keys.contains(&key) {
            return Err(ApplyFailure::new(format!(
                "missing authority of {}",
                auth.actor
            )));
        }
    }
    Ok(())
}

fn decode<T: BorshDeserialize>(act: &Action) -> Result<T, ApplyFailure> {
    borsh::from_slice(&act.data)
        .map_err(|e| ApplyFailure::new(format!("malformed action payload: {e}")))
}

fn require_declared(act: &Action, actor: AccountName) -> Result<(), ApplyFailure> {
    if act.authorization.iter().any(|a| a.actor == actor) {
        Ok(())
    } else {
        Err(ApplyFailure::new(format!("missing authority of {actor}")))
    }
}

/// Apply one action whose authorizations already checked out.
pub fn apply_action(state: &mut StateDb, act: &Action) -> Result<(), ApplyFailure> {
    if act.account != SYSTEM_ACCOUNT {
        // Codeless receiver: the action is recorded but has no effect.
        return Ok(());
    }
    match act.name {
        ACTION_NEWACCOUNT => {
            let args: NewAccount = decode(act)?;
            require_declared(act, args.creator)?;
            if !state.create_account(args.name, ACTIVE_PERMISSION, args.key) {
                return Err(ApplyFailure::new(format!(
                    "account {} already exists",
                    args.name
                )));
            }
            Ok(())
        }
        ACTION_SETCODE => {
            let args: SetCode = decode(act)?;
            require_declared(act, args.account)?;
            let meta = state
                .account_mut(args.account)
                .ok_or_else(|| ApplyFailure::new(format!("account {} does not exist", args.account)))?;
            meta.code = args.code;
            meta.code_sequence += 1;
            Ok(())
        }
        ACTION_SETABI => {
            let args: SetAbi = decode(act)?;
            require_declared(act, args.account)?;
            let meta = state
                .account_mut(args.account)
                .ok_or_else(|| ApplyFailure::new(format!("account {} does not exist", args.account)))?;
            meta.abi = args.abi;
            meta.abi_sequence += 1;
            Ok(())
        }
        ACTION_UPDATEAUTH => {
            let args: UpdateAuth = decode(act)?;
            require_declared(act, args.account)?;
            if !state.set_permission_key(args.account, args.permission, args.key) {
                return Err(ApplyFailure::new(format!(
                    "account {} does not exist",
                    args.account
                )));
            }
            Ok(())
        }
        other => Err(ApplyFailure::new(format!(
            "unknown system action {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simchain_types::PermissionLevel;

    fn system_key() -> PublicKeyBytes {
        PublicKeyBytes([1u8; 32])
    }

    fn base_state() -> StateDb {
        let mut state = StateDb::new();
        state.create_account(SYSTEM_ACCOUNT, ACTIVE_PERMISSION, system_key());
        state
    }

    fn system_auth() -> Vec<PermissionLevel> {
        vec![PermissionLevel::new(SYSTEM_ACCOUNT, ACTIVE_PERMISSION)]
    }

    fn newaccount_action(name: AccountName, key: PublicKeyBytes) -> Action {
        Action {
            account: SYSTEM_ACCOUNT,
            name: ACTION_NEWACCOUNT,
            authorization: system_auth(),
            data: borsh::to_vec(&NewAccount {
                creator: SYSTEM_ACCOUNT,
                name,
                key,
            })
            .unwrap(),
        }
    }

    #[test]
    fn test_authorization_requires_signer_key() {
        let state = base_state();
        let act = newaccount_action(AccountName::new(5), PublicKeyBytes([2u8; 32]));

        let mut keys = BTreeSet::new();
        assert!(check_authorization(&state, &act, &keys).is_err());

        keys.insert(system_key());
        assert!(check_authorization(&state, &act, &keys).is_ok());
    }

    #[test]
    fn test_authorization_unknown_actor_fails() {
        let state = base_state();
        let act = Action {
            account: AccountName::new(77),
            name: AccountName::new(1),
            authorization: vec![PermissionLevel::new(
                AccountName::new(77),
                ACTIVE_PERMISSION,
            )],
            data: vec![],
        };
        let err = check_authorization(&state, &act, &BTreeSet::new()).unwrap_err();
        assert!(err.message.contains("does not exist"));
    }

    #[test]
    fn test_newaccount_then_duplicate_fails() {
        let mut state = base_state();
        let act = newaccount_action(AccountName::new(5), PublicKeyBytes([2u8; 32]));

        apply_action(&mut state, &act).unwrap();
        assert!(state.has_account(AccountName::new(5)));

        let err = apply_action(&mut state, &act).unwrap_err();
        assert!(err.message.contains("already exists"));
    }

    #[test]
    fn test_setcode_bumps_sequence() {
        let mut state = base_state();
        apply_action(
            &mut state,
            &newaccount_action(AccountName::new(5), PublicKeyBytes([2u8; 32])),
        )
        .unwrap();

        let act = Action {
            account: SYSTEM_ACCOUNT,
            name: ACTION_SETCODE,
            authorization: vec![PermissionLevel::new(AccountName::new(5), ACTIVE_PERMISSION)],
            data: borsh::to_vec(&SetCode {
                account: AccountName::new(5),
                code: vec![0, 97, 115, 109],
            })
            .unwrap(),
        };
        apply_action(&mut state, &act).unwrap();
        let meta = state.account(AccountName::new(5)).unwrap();
        assert_eq!(meta.code_sequence, 1);
        assert_eq!(&meta.code[..4], b"\0asm");
    }

    #[test]
    fn test_codeless_account_action_is_noop_success() {
        let mut state = base_state();
        let act = Action {
            account: AccountName::new(123),
            name: AccountName::new(9),
            authorization: vec![],
            data: vec![1, 2, 3],
        };
        assert!(apply_action(&mut state, &act).is_ok());
    }

    #[test]
    fn test_malformed_payload_fails_softly() {
        let mut state = base_state();
        let act = Action {
            account: SYSTEM_ACCOUNT,
            name: ACTION_NEWACCOUNT,
            authorization: system_auth(),
            data: vec![1],
        };
        let err = apply_action(&mut state, &act).unwrap_err();
        assert!(err.message.contains("malformed"));
    }
}
