//! Row-level permission resolution
//!
//! Maps (table policy, caller) to the scope a data operation must run under.
//! Callers resolve the scope before building any query or finalizing any
//! mutation payload.

use tabula_commons::{AccessContext, AccessPolicy, CallerId};

use crate::error::SessionError;

/// Rows a caller may read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadScope {
    /// No filtering
    Unrestricted,
    /// Only rows whose owner column equals the caller id
    OwnedBy {
        owner_column: String,
        caller_id: CallerId,
    },
    /// Nothing is visible; listings are empty, lookups find nothing
    Empty,
}

/// Rows a caller may create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteScope {
    Unrestricted,
    /// Creates are stamped with the caller id; updates and deletes target
    /// owned rows only
    OwnedBy {
        owner_column: String,
        caller_id: CallerId,
    },
}

/// Resolve the read scope.
///
/// # Access Rules
/// - **public**: unrestricted for every caller kind
/// - **private**: admin/api_key unrestricted, end_user filtered to owned
///   rows, no identity yields `Empty`
/// - **system**: elevated callers only
pub fn read_scope(
    table: &str,
    policy: AccessPolicy,
    owner_column: &str,
    ctx: &AccessContext,
) -> Result<ReadScope, SessionError> {
    match policy {
        AccessPolicy::Public => Ok(ReadScope::Unrestricted),
        AccessPolicy::Private => match ctx {
            // api_key is admin-equivalent for now; it should be scoped by
            // explicit capability grants instead
            AccessContext::Admin { .. } | AccessContext::ApiKey { .. } => {
                Ok(ReadScope::Unrestricted)
            }
            AccessContext::EndUser {
                caller_id: Some(caller_id),
            } => Ok(ReadScope::OwnedBy {
                owner_column: owner_column.to_string(),
                caller_id: caller_id.clone(),
            }),
            AccessContext::EndUser { caller_id: None } | AccessContext::Anonymous => {
                log::debug!(
                    "No caller id for private table '{}', returning empty scope",
                    table
                );
                Ok(ReadScope::Empty)
            }
        },
        AccessPolicy::System => system_scope(table, ctx, "read").map(|_| ReadScope::Unrestricted),
    }
}

/// Resolve the write scope.
///
/// Private tables never accept a write without a resolved caller id.
pub fn write_scope(
    table: &str,
    policy: AccessPolicy,
    owner_column: &str,
    ctx: &AccessContext,
) -> Result<WriteScope, SessionError> {
    match policy {
        AccessPolicy::Public => Ok(WriteScope::Unrestricted),
        AccessPolicy::Private => match ctx {
            AccessContext::Admin { .. } | AccessContext::ApiKey { .. } => {
                Ok(WriteScope::Unrestricted)
            }
            AccessContext::EndUser {
                caller_id: Some(caller_id),
            } => Ok(WriteScope::OwnedBy {
                owner_column: owner_column.to_string(),
                caller_id: caller_id.clone(),
            }),
            AccessContext::EndUser { caller_id: None } | AccessContext::Anonymous => {
                log::warn!(
                    "❌ Write to private table '{}' rejected: no caller id ({})",
                    table,
                    ctx.kind()
                );
                Err(SessionError::AuthenticationRequired {
                    table: table.to_string(),
                    operation: "write to".to_string(),
                })
            }
        },
        AccessPolicy::System => system_scope(table, ctx, "write to").map(|_| WriteScope::Unrestricted),
    }
}

fn system_scope(table: &str, ctx: &AccessContext, operation: &str) -> Result<(), SessionError> {
    match ctx {
        AccessContext::Admin { .. } | AccessContext::ApiKey { .. } => Ok(()),
        AccessContext::EndUser { .. } => {
            log::warn!("❌ End user {} denied access to system table '{}'", ctx.display_id(), table);
            Err(SessionError::AccessDenied {
                table: table.to_string(),
                caller: ctx.display_id(),
                reason: "System tables require an elevated caller.".to_string(),
            })
        }
        AccessContext::Anonymous => Err(SessionError::AuthenticationRequired {
            table: table.to_string(),
            operation: operation.to_string(),
        }),
    }
}
