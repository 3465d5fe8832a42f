use crate::errors::RelayError;
use crate::models::{ApiDefinition, CallContext, GroupMembership};
use std::collections::HashMap;

fn member_of_any(
    allowed: &[String],
    membership: &HashMap<String, Vec<String>>,
    id: &str,
) -> bool {
    allowed.iter().any(|name| {
        membership
            .get(name)
            .map(|members| members.iter().any(|member| member == id))
            .unwrap_or(false)
    })
}

/// Applies `require_admin`, `allowed_user_groups` and `allowed_group_groups`,
/// in that order. Legacy `allowed_users` / `allowed_groups` fields are not read.
pub fn check_permission(
    api: &ApiDefinition,
    ctx: &CallContext,
    groups: &GroupMembership,
) -> Result<(), RelayError> {
    if api.require_admin && !ctx.is_admin {
        return Err(RelayError::denied("This API requires administrator privileges."));
    }

    if !api.allowed_user_groups.is_empty() {
        let allowed = ctx
            .user_id
            .as_deref()
            .map(|uid| member_of_any(&api.allowed_user_groups, &groups.user_groups, uid))
            .unwrap_or(false);
        if !allowed {
            return Err(RelayError::denied(
                "You are not in any user group allowed to call this API.",
            ));
        }
    }

    if !api.allowed_group_groups.is_empty() {
        let Some(group_id) = ctx.group_id.as_deref() else {
            return Err(RelayError::denied("This API can only be used in a group chat."));
        };
        if !member_of_any(&api.allowed_group_groups, &groups.group_groups, group_id) {
            return Err(RelayError::denied(
                "This group is not allowed to call this API.",
            ));
        }
    }

    Ok(())
}
